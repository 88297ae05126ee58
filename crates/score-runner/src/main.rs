//! Runs a scoring pass and a decile backtest over a JSON fixture and prints
//! the results as JSON.
//!
//! Usage:
//!   score-runner --fixture demos/ic_fixture.json
//!   score-runner --fixture demos/ic_fixture.json --dry-run

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use backtest_engine::{
    generate_periods, BacktestEngine, BacktestError, BacktestOutcome, BacktestReport,
};
use chrono::NaiveDate;
use factor_scoring::{
    AggregatorConfig, LifecycleClassifier, PipelineSummary, ScoreAggregator, ScoringPipeline,
    TickerInput,
};
use score_core::InMemoryScoreStore;
use serde_json::json;
use tokio_util::sync::CancellationToken;

mod config;
mod fixture;

use config::RunnerConfig;
use fixture::Fixture;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let default_filter = "score_runner=info,backtest_engine=info,factor_scoring=info";
    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
            )
            .init();
    }

    let args: Vec<String> = std::env::args().collect();
    let dry_run = args.iter().any(|a| a == "--dry-run");
    let fixture_arg = args
        .iter()
        .position(|a| a == "--fixture")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from);

    let config = RunnerConfig::from_env()?;
    let Some(fixture_path) = fixture_arg.or_else(|| config.fixture_path.clone()) else {
        eprintln!("Usage:");
        eprintln!("  score-runner --fixture PATH    Score and backtest the fixture at PATH");
        eprintln!();
        eprintln!("Options:");
        eprintln!("  --dry-run          Validate the fixture and print the plan only");
        eprintln!();
        eprintln!("IC_FIXTURE_PATH may be set instead of --fixture.");
        std::process::exit(1);
    };

    let fixture = Fixture::load(&fixture_path)?;
    tracing::info!(
        path = %fixture_path.display(),
        tickers = fixture.tickers.len(),
        seeded_scores = fixture.scores.len(),
        priced = fixture.prices.len(),
        sector_inputs = fixture.sector_stats.len(),
        "Fixture loaded"
    );

    let backtest_config = config.backtest_config(fixture.span())?;

    if dry_run {
        let periods = match &backtest_config {
            Some(bt) => generate_periods(bt.start_date, bt.end_date, bt.rebalance_frequency)?.len(),
            None => 0,
        };
        let plan = json!({
            "dry_run": true,
            "tickers_to_score": fixture.tickers.len(),
            "seeded_scores": fixture.scores.len(),
            "backtest": backtest_config,
            "rebalance_periods": periods,
        });
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let store = Arc::new(InMemoryScoreStore::new());
    fixture.seed_scores(&store).await?;
    let prices = Arc::new(fixture.price_history());
    let sector_stats = Arc::new(fixture.sector_statistics());

    let aggregator = ScoreAggregator::new(AggregatorConfig {
        min_coverage: config.min_coverage,
        ..AggregatorConfig::default()
    })
    .context("Invalid aggregator configuration")?;
    let pipeline = ScoringPipeline::new(
        sector_stats,
        store.clone(),
        LifecycleClassifier::default(),
        aggregator,
    );
    let scoring = score_in_date_order(&pipeline, &fixture.tickers).await;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current period");
            ctrl_c.cancel();
        }
    });

    let backtest = match backtest_config {
        Some(bt) => {
            let engine = BacktestEngine::new(bt, store.clone(), prices)?;
            match engine.run(&cancel).await {
                Ok(BacktestOutcome::Completed(results)) => {
                    let report = BacktestReport::from_results(&results);
                    json!({ "status": "completed", "report": report.to_json(), "results": results })
                }
                Ok(BacktestOutcome::Cancelled(checkpoint)) => {
                    json!({ "status": "cancelled", "checkpoint": checkpoint })
                }
                Err(BacktestError::Score(e)) if e.is_insufficient_data() => {
                    tracing::warn!(error = %e, "Backtest produced no usable periods");
                    json!({ "status": "insufficient_data", "reason": e.to_string() })
                }
                Err(e) => return Err(e).context("Backtest failed"),
            }
        }
        None => {
            tracing::info!("No backtest window available, skipping backtest");
            serde_json::Value::Null
        }
    };

    let output = json!({ "scoring": scoring, "backtest": backtest });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Score each as-of date in turn so later scores are explained against
/// earlier ones.
async fn score_in_date_order(pipeline: &ScoringPipeline, inputs: &[TickerInput]) -> PipelineSummary {
    let mut by_date: BTreeMap<NaiveDate, Vec<TickerInput>> = BTreeMap::new();
    for input in inputs {
        by_date.entry(input.as_of).or_default().push(input.clone());
    }

    let mut total = PipelineSummary::default();
    for (as_of, batch) in by_date {
        tracing::info!(%as_of, tickers = batch.len(), "Scoring batch");
        let summary = pipeline.run(&batch).await;
        total.scored += summary.scored;
        total.insufficient += summary.insufficient;
        total.failed += summary.failed;
        total.outcomes.extend(summary.outcomes);
    }
    total
}
