use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use score_core::{
    CompositeScore, ConfidenceLevel, InMemoryPriceHistory, InMemoryScoreStore, PriceProvider,
    Rating, ScoreError, ScoreStore,
};
use tokio_util::sync::CancellationToken;

use crate::engine::{aggregate_results, BacktestEngine};
use crate::error::BacktestError;
use crate::models::*;
use crate::report::BacktestReport;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Helper: a stored composite score with only the fields the backtest reads.
fn composite(ticker: &str, date: NaiveDate, overall: f64, sector: Option<&str>) -> CompositeScore {
    CompositeScore {
        ticker: ticker.to_string(),
        date,
        sector: sector.map(str::to_string),
        overall_score: overall,
        rating: Rating::from_score(overall),
        factor_scores: BTreeMap::new(),
        factor_details: Vec::new(),
        excluded_factors: Vec::new(),
        weights_used: BTreeMap::new(),
        confidence_level: ConfidenceLevel::High,
        data_completeness: 1.0,
        lifecycle_stage: None,
        warnings: Vec::new(),
    }
}

fn month_starts() -> Vec<NaiveDate> {
    (1..=7).map(|m| d(2024, m, 1)).collect()
}

/// Helper: monthly closes compounding at `rate` from 100.
fn monthly_prices(prices: &InMemoryPriceHistory, ticker: &str, rate: f64) {
    prices.extend(
        ticker,
        month_starts()
            .into_iter()
            .enumerate()
            .map(|(k, date)| (date, 100.0 * (1.0 + rate).powi(k as i32))),
    );
}

fn ticker(i: usize) -> String {
    format!("T{i:02}")
}

/// Helper: 20 tickers scored once before the test window, where a higher
/// score earns a higher steady monthly return. SPY gains 1% a month.
async fn ranked_universe() -> (Arc<InMemoryScoreStore>, Arc<InMemoryPriceHistory>) {
    let store = Arc::new(InMemoryScoreStore::new());
    let prices = Arc::new(InMemoryPriceHistory::new());
    for i in 0..20 {
        let t = ticker(i);
        store
            .upsert(composite(&t, d(2023, 12, 29), 100.0 - 5.0 * i as f64, Some("Technology")))
            .await
            .unwrap();
        monthly_prices(&prices, &t, 0.02 - 0.002 * i as f64);
    }
    monthly_prices(&prices, "SPY", 0.01);
    (store, prices)
}

fn half_year() -> BacktestConfig {
    BacktestConfig::builder(d(2024, 1, 1), d(2024, 7, 1)).build().unwrap()
}

fn completed(outcome: BacktestOutcome) -> BacktestResults {
    match outcome {
        BacktestOutcome::Completed(results) => results,
        BacktestOutcome::Cancelled(cp) => panic!("unexpected cancellation after {} periods", cp.completed_periods),
    }
}

/// Helper: a period result carrying only a decile return.
fn period_row(start: NaiveDate, decile: u8, period_return: f64) -> PeriodResult {
    PeriodResult {
        period_start: start,
        period_end: start + chrono::Days::new(30),
        decile,
        holdings: vec![format!("D{decile}")],
        num_holdings: 1,
        period_return,
        benchmark_return: 0.0,
        excess_return: period_return,
        avg_score: 50.0,
        turnover: 0.0,
    }
}

/// Cancels its token the first time a price on `cancel_on` is requested.
struct CancellingPrices {
    inner: Arc<InMemoryPriceHistory>,
    token: CancellationToken,
    cancel_on: NaiveDate,
}

#[async_trait]
impl PriceProvider for CancellingPrices {
    async fn close_at_or_before(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        if date == self.cancel_on {
            self.token.cancel();
        }
        self.inner.close_at_or_before(ticker, date).await
    }
}

/// Fails snapshot reads on one date.
struct FlakyStore {
    inner: Arc<InMemoryScoreStore>,
    fail_on: NaiveDate,
}

#[async_trait]
impl ScoreStore for FlakyStore {
    async fn upsert(&self, score: CompositeScore) -> Result<(), ScoreError> {
        self.inner.upsert(score).await
    }

    async fn latest_before(&self, ticker: &str, date: NaiveDate) -> Result<Option<CompositeScore>, ScoreError> {
        self.inner.latest_before(ticker, date).await
    }

    async fn scores_as_of(&self, date: NaiveDate, universe: &[String]) -> Result<Vec<CompositeScore>, ScoreError> {
        if date == self.fail_on {
            return Err(ScoreError::StoreError("connection reset".to_string()));
        }
        self.inner.scores_as_of(date, universe).await
    }
}

// --- Config ---

#[test]
fn test_config_defaults() {
    let config = half_year();
    assert_eq!(config.rebalance_frequency, RebalanceFrequency::Monthly);
    assert_eq!(config.benchmark, "SPY");
    assert_eq!(config.transaction_cost_bps, 10.0);
    assert_eq!(config.slippage_bps, 5.0);
    assert!(config.use_smoothed_scores);
    assert_eq!(config.aggregation_mode, AggregationMode::PerPeriod);
    assert!((config.cost_drag() - 0.0015).abs() < 1e-12);
}

#[test]
fn test_config_rejects_bad_ranges() {
    let inverted = BacktestConfig::builder(d(2024, 6, 1), d(2024, 1, 1)).build();
    assert!(matches!(inverted, Err(BacktestError::InvalidConfig(_))));

    let negative = BacktestConfig::builder(d(2024, 1, 1), d(2024, 6, 1))
        .slippage_bps(-1.0)
        .build();
    assert!(negative.is_err());

    let no_benchmark = BacktestConfig::builder(d(2024, 1, 1), d(2024, 6, 1))
        .benchmark("  ")
        .build();
    assert!(no_benchmark.is_err());

    let nan_cost = BacktestConfig::builder(d(2024, 1, 1), d(2024, 6, 1))
        .transaction_cost_bps(f64::NAN)
        .build();
    assert!(nan_cost.is_err());
}

#[test]
fn test_deserialized_config_is_validated() {
    let config = half_year();
    let json = serde_json::to_value(&config).unwrap();
    let restored: BacktestConfig = serde_json::from_value(json.clone()).unwrap();
    assert_eq!(restored, config);

    let mut inverted = json.clone();
    inverted["end_date"] = serde_json::json!("2023-06-01");
    let err = serde_json::from_value::<BacktestConfig>(inverted).unwrap_err();
    assert!(err.to_string().contains("must be after start date"), "{err}");

    let mut negative = json;
    negative["slippage_bps"] = serde_json::json!(-3.0);
    assert!(serde_json::from_value::<BacktestConfig>(negative).is_err());
}

#[test]
fn test_sector_admission() {
    let config = BacktestConfig::builder(d(2024, 1, 1), d(2024, 6, 1))
        .exclude_financials(true)
        .exclude_utilities(true)
        .build()
        .unwrap();
    assert!(config.admits_sector(Some("Technology")));
    assert!(config.admits_sector(None));
    assert!(!config.admits_sector(Some("Financial Services")));
    assert!(!config.admits_sector(Some("Utilities")));

    let only_energy = BacktestConfig::builder(d(2024, 1, 1), d(2024, 6, 1))
        .sectors(["Energy"])
        .build()
        .unwrap();
    assert!(only_energy.admits_sector(Some("energy")));
    assert!(!only_energy.admits_sector(Some("Technology")));
    assert!(!only_energy.admits_sector(None));
}

#[test]
fn test_frequency_parsing() {
    assert_eq!("Quarterly".parse::<RebalanceFrequency>().unwrap(), RebalanceFrequency::Quarterly);
    assert_eq!(RebalanceFrequency::Weekly.periods_per_year(), 52.0);
    assert!("hourly".parse::<RebalanceFrequency>().is_err());
    assert_eq!(
        "pooled_deciles".parse::<AggregationMode>().unwrap(),
        AggregationMode::PooledDeciles
    );
}

// --- Engine ---

#[tokio::test]
async fn test_ranked_universe_is_perfectly_monotonic() {
    let (store, prices) = ranked_universe().await;
    let engine = BacktestEngine::new(half_year(), store, prices).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());

    assert_eq!(results.num_periods, 6);
    assert_eq!(results.period_results.len(), 60);
    assert!(results.failed_periods.is_empty());
    assert_eq!(results.hit_rate, 1.0);
    assert_eq!(results.monotonicity_score, 1.0);

    // top decile: (2.0% + 1.8%) / 2 - 0.15%, bottom: (-1.6% - 1.8%) / 2 - 0.15%
    assert!((results.top_bottom_spread - 0.036).abs() < 1e-9);

    let top = results.decile(1).unwrap();
    assert_eq!(top.num_periods, 6);
    assert!((top.total_return - (1.0175f64.powi(6) - 1.0)).abs() < 1e-9);
    assert_eq!(top.max_drawdown, 0.0);
    assert_eq!(top.avg_holdings, 2.0);
    // full turnover at the first rebalance only
    assert!((top.avg_turnover - 1.0 / 6.0).abs() < 1e-9);

    assert_eq!(top.win_rate, 1.0);
    assert_eq!((top.max_consecutive_wins, top.max_consecutive_losses), (6, 0));
    // no losing period and a flat benchmark leave these undefined
    assert_eq!(top.sortino_ratio, None);
    assert_eq!(top.calmar_ratio, None);
    assert_eq!(top.beta, None);
    assert!(top.tracking_error.unwrap() < 1e-9);

    let bottom = results.decile(10).unwrap();
    assert!(bottom.max_drawdown > 0.0);
    assert!(bottom.annualized_return < 0.0);
    assert_eq!(bottom.win_rate, 0.0);
    assert_eq!(bottom.max_consecutive_losses, 6);
    // every period loses the same amount
    assert!((bottom.sortino_ratio.unwrap() + 12f64.sqrt()).abs() < 1e-6);
    assert!(bottom.calmar_ratio.unwrap() < 0.0);

    assert!((results.benchmark_total_return - (1.01f64.powi(6) - 1.0)).abs() < 1e-9);
    assert!(results.top_decile_excess_annualized > 0.0);
    for pair in results.decile_stats.windows(2) {
        assert!(pair[0].annualized_return > pair[1].annualized_return);
    }
}

#[tokio::test]
async fn test_deciles_partition_each_period() {
    let (store, prices) = ranked_universe().await;
    let engine = BacktestEngine::new(half_year(), store, prices).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());

    let first = d(2024, 1, 1);
    let mut held: Vec<String> = results
        .period_results
        .iter()
        .filter(|r| r.period_start == first)
        .flat_map(|r| r.holdings.clone())
        .collect();
    held.sort();
    let expected: Vec<String> = (0..20).map(ticker).collect();
    assert_eq!(held, expected);

    let top = results
        .period_results
        .iter()
        .find(|r| r.period_start == first && r.decile == 1)
        .unwrap();
    assert_eq!(top.holdings, vec!["T00".to_string(), "T01".to_string()]);
    assert_eq!(top.turnover, 1.0);
    assert!((top.avg_score - 97.5).abs() < 1e-9);
    assert!((top.excess_return - (top.period_return - top.benchmark_return)).abs() < 1e-12);
}

#[tokio::test]
async fn test_cancelled_run_resumes_to_same_results() {
    let (store, prices) = ranked_universe().await;

    let uninterrupted = BacktestEngine::new(half_year(), store.clone(), prices.clone()).unwrap();
    let expected = completed(uninterrupted.run(&CancellationToken::new()).await.unwrap());

    let token = CancellationToken::new();
    let cancelling = Arc::new(CancellingPrices {
        inner: prices.clone(),
        token: token.clone(),
        cancel_on: d(2024, 4, 1),
    });
    let engine = BacktestEngine::new(half_year(), store.clone(), cancelling).unwrap();
    let checkpoint = match engine.run(&token).await.unwrap() {
        BacktestOutcome::Cancelled(cp) => cp,
        BacktestOutcome::Completed(_) => panic!("run should have been cancelled"),
    };
    // the period ending on the cancel date still completes
    assert_eq!(checkpoint.completed_periods, 3);
    assert_eq!(checkpoint.period_results.len(), 30);

    let resumer = BacktestEngine::new(half_year(), store, prices).unwrap();
    let resumed = completed(resumer.resume(checkpoint, &CancellationToken::new()).await.unwrap());
    assert_eq!(resumed, expected);
}

#[tokio::test]
async fn test_checkpoint_survives_serialization() {
    let (store, prices) = ranked_universe().await;
    let engine = BacktestEngine::new(half_year(), store, prices).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let checkpoint = match engine.run(&token).await.unwrap() {
        BacktestOutcome::Cancelled(cp) => cp,
        BacktestOutcome::Completed(_) => panic!("pre-cancelled run should not complete"),
    };
    assert_eq!(checkpoint.completed_periods, 0);

    let json = serde_json::to_string(&checkpoint).unwrap();
    let restored: BacktestCheckpoint = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, checkpoint);

    let results = completed(engine.resume(restored, &CancellationToken::new()).await.unwrap());
    assert_eq!(results.num_periods, 6);
}

#[tokio::test]
async fn test_resume_rejects_foreign_checkpoint() {
    let (store, prices) = ranked_universe().await;
    let engine = BacktestEngine::new(half_year(), store, prices).unwrap();
    let other = BacktestConfig::builder(d(2024, 1, 1), d(2024, 3, 1)).build().unwrap();
    let err = engine
        .resume(BacktestCheckpoint::new(other), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BacktestError::InvalidConfig(_)));
}

#[tokio::test]
async fn test_failed_period_is_recorded_and_excluded() {
    let (store, prices) = ranked_universe().await;
    let flaky = Arc::new(FlakyStore {
        inner: store,
        fail_on: d(2024, 3, 1),
    });
    let engine = BacktestEngine::new(half_year(), flaky, prices).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());

    assert_eq!(results.num_periods, 5);
    assert_eq!(results.failed_periods.len(), 1);
    assert_eq!(results.failed_periods[0].period_start, d(2024, 3, 1));
    assert!(results.failed_periods[0].reason.contains("connection reset"));
    assert!(results.period_results.iter().all(|r| r.period_start != d(2024, 3, 1)));
    assert_eq!(results.hit_rate, 1.0);
}

#[tokio::test]
async fn test_periods_without_scores_are_skipped() {
    let store = Arc::new(InMemoryScoreStore::new());
    let prices = Arc::new(InMemoryPriceHistory::new());
    for i in 0..10 {
        let t = ticker(i);
        store
            .upsert(composite(&t, d(2024, 2, 15), 90.0 - i as f64, None))
            .await
            .unwrap();
        monthly_prices(&prices, &t, 0.01);
    }
    let config = BacktestConfig::builder(d(2024, 1, 1), d(2024, 4, 1)).build().unwrap();
    let engine = BacktestEngine::new(config, store, prices).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());

    assert_eq!(results.num_periods, 1);
    assert!(results.failed_periods.is_empty());
    assert!(results.period_results.iter().all(|r| r.period_start == d(2024, 3, 1)));
}

#[tokio::test]
async fn test_run_without_usable_periods_is_insufficient_data() {
    let prices = Arc::new(InMemoryPriceHistory::new());
    monthly_prices(&prices, "SPY", 0.01);
    let engine = BacktestEngine::new(half_year(), Arc::new(InMemoryScoreStore::new()), prices.clone()).unwrap();
    let err = engine.run(&CancellationToken::new()).await.unwrap_err();
    match err {
        BacktestError::Score(ScoreError::InsufficientData(reason)) => {
            assert!(reason.contains("6 without scores"), "{reason}");
            assert!(reason.contains("0 failed"), "{reason}");
        }
        other => panic!("expected insufficient data, got {other:?}"),
    }

    // every period failing is no better
    let (store, _) = ranked_universe().await;
    let one_period = BacktestConfig::builder(d(2024, 3, 1), d(2024, 4, 1)).build().unwrap();
    let flaky = Arc::new(FlakyStore {
        inner: store,
        fail_on: d(2024, 3, 1),
    });
    let engine = BacktestEngine::new(one_period, flaky, prices).unwrap();
    let err = engine.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(&err, BacktestError::Score(e) if e.is_insufficient_data()));
    assert!(err.to_string().contains("1 failed"));
}

#[tokio::test]
async fn test_exclusion_flags_filter_universe() {
    let (store, prices) = ranked_universe().await;
    store
        .upsert(composite("BANK", d(2023, 12, 29), 99.0, Some("Financial Services")))
        .await
        .unwrap();
    store
        .upsert(composite("POWR", d(2023, 12, 29), 98.0, Some("Utilities")))
        .await
        .unwrap();
    monthly_prices(&prices, "BANK", 0.05);
    monthly_prices(&prices, "POWR", 0.05);

    let config = BacktestConfig::builder(d(2024, 1, 1), d(2024, 2, 1))
        .exclude_financials(true)
        .exclude_utilities(true)
        .build()
        .unwrap();
    let engine = BacktestEngine::new(config, store.clone(), prices.clone()).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());
    let held: Vec<&String> = results.period_results.iter().flat_map(|r| &r.holdings).collect();
    assert_eq!(held.len(), 20);
    assert!(!held.iter().any(|t| *t == "BANK" || *t == "POWR"));

    let config = BacktestConfig::builder(d(2024, 1, 1), d(2024, 2, 1))
        .sectors(["Utilities"])
        .build()
        .unwrap();
    let engine = BacktestEngine::new(config, store, prices).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());
    assert_eq!(results.period_results.len(), 1);
    assert_eq!(results.period_results[0].holdings, vec!["POWR".to_string()]);
}

#[tokio::test]
async fn test_restricted_universe() {
    let (store, prices) = ranked_universe().await;
    let config = BacktestConfig::builder(d(2024, 1, 1), d(2024, 2, 1))
        .universe(["T05", "T06", "NOPE"])
        .build()
        .unwrap();
    let engine = BacktestEngine::new(config, store, prices).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());
    assert_eq!(results.period_results.len(), 2);
    assert_eq!(results.period_results[0].holdings, vec!["T05".to_string()]);
}

#[tokio::test]
async fn test_smoothing_dampens_score_moves() {
    let store = Arc::new(InMemoryScoreStore::new());
    let prices = Arc::new(InMemoryPriceHistory::new());
    store.upsert(composite("AAA", d(2023, 12, 29), 80.0, None)).await.unwrap();
    store.upsert(composite("AAA", d(2024, 1, 31), 40.0, None)).await.unwrap();
    monthly_prices(&prices, "AAA", 0.01);
    monthly_prices(&prices, "SPY", 0.01);

    let second_period_score = |results: &BacktestResults| {
        results
            .period_results
            .iter()
            .find(|r| r.period_start == d(2024, 2, 1))
            .map(|r| r.avg_score)
            .unwrap()
    };

    let smoothed = BacktestConfig::builder(d(2024, 1, 1), d(2024, 3, 1)).build().unwrap();
    let engine = BacktestEngine::new(smoothed, store.clone(), prices.clone()).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());
    assert!((second_period_score(&results) - 52.0).abs() < 1e-9);

    let raw = BacktestConfig::builder(d(2024, 1, 1), d(2024, 3, 1))
        .use_smoothed_scores(false)
        .build()
        .unwrap();
    let engine = BacktestEngine::new(raw, store, prices).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());
    assert_eq!(second_period_score(&results), 40.0);
}

#[tokio::test]
async fn test_missing_benchmark_counts_as_flat() {
    let (store, prices) = ranked_universe().await;
    let config = BacktestConfig::builder(d(2024, 1, 1), d(2024, 2, 1))
        .benchmark("QQQ")
        .build()
        .unwrap();
    let engine = BacktestEngine::new(config, store, prices).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());
    for r in &results.period_results {
        assert_eq!(r.benchmark_return, 0.0);
        assert_eq!(r.excess_return, r.period_return);
    }
}

// --- Aggregation ---

#[test]
fn test_monotonicity_modes_differ() {
    let p1 = d(2024, 1, 1);
    let p2 = d(2024, 2, 1);
    let rows = vec![
        period_row(p1, 1, 0.5),
        period_row(p1, 2, 0.25),
        period_row(p1, 3, 0.375),
        period_row(p2, 1, 0.0),
        period_row(p2, 2, 0.25),
        period_row(p2, 3, 0.125),
    ];

    let per_period = BacktestConfig::builder(p1, d(2024, 3, 1)).build().unwrap();
    let results = aggregate_results(&per_period, &rows);
    assert_eq!(results.monotonicity_score, 0.5);
    assert_eq!(results.aggregation_mode, AggregationMode::PerPeriod);

    let pooled = BacktestConfig::builder(p1, d(2024, 3, 1))
        .aggregation_mode(AggregationMode::PooledDeciles)
        .build()
        .unwrap();
    let results = aggregate_results(&pooled, &rows);
    // every decile averages 0.25, so no pair strictly falls
    assert_eq!(results.monotonicity_score, 0.0);
}

#[test]
fn test_spread_and_hit_rate() {
    let config = BacktestConfig::builder(d(2024, 1, 1), d(2024, 4, 1)).build().unwrap();
    let rows = vec![
        period_row(d(2024, 1, 1), 1, 0.04),
        period_row(d(2024, 1, 1), 10, 0.01),
        period_row(d(2024, 2, 1), 1, -0.02),
        period_row(d(2024, 2, 1), 10, 0.01),
        period_row(d(2024, 3, 1), 1, 0.03),
        period_row(d(2024, 3, 1), 10, -0.01),
    ];
    let results = aggregate_results(&config, &rows);
    assert_eq!(results.num_periods, 3);
    assert!((results.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    assert!((results.top_bottom_spread - (0.05 / 3.0 - 0.01 / 3.0)).abs() < 1e-9);
    assert_eq!(results.decile_stats.len(), 2);
}

#[test]
fn test_aggregate_of_nothing() {
    let results = aggregate_results(&half_year(), &[]);
    assert_eq!(results.num_periods, 0);
    assert_eq!(results.hit_rate, 0.0);
    assert_eq!(results.top_bottom_spread, 0.0);
    assert_eq!(results.monotonicity_score, 0.0);
    assert!(results.decile_stats.is_empty());
    assert!(results.information_ratio.is_none());
}

// --- Report ---

#[tokio::test]
async fn test_report_summarizes_deciles() {
    let (store, prices) = ranked_universe().await;
    let engine = BacktestEngine::new(half_year(), store, prices).unwrap();
    let results = completed(engine.run(&CancellationToken::new()).await.unwrap());

    let report = BacktestReport::from_results(&results);
    assert_eq!(report.deciles.len(), 10);
    assert_eq!(report.num_periods, 6);
    assert_eq!(report.period, "2024-01-01 to 2024-07-01");
    assert!(report.top_decile_cagr_percent > report.benchmark_cagr_percent);
    assert!(report.spread_cagr_percent > 0.0);
    assert_eq!(report.hit_rate_percent, 100.0);
    assert_eq!(report.top_decile_max_drawdown_percent, 0.0);

    assert_eq!(report.deciles[0].win_rate_percent, 100.0);
    assert_eq!(report.deciles[9].max_consecutive_losses, 6);

    assert_eq!(report.cumulative_returns.len(), 10);
    let top_curve = &report.cumulative_returns[&1];
    assert_eq!(top_curve.len(), 6);
    assert_eq!(top_curve[0].date, d(2024, 1, 1));
    assert!((top_curve[0].value - (1.0 + top_curve[0].period_return)).abs() < 1e-12);
    let top_total = results.decile(1).unwrap().total_return;
    assert!((top_curve[5].value - (1.0 + top_total)).abs() < 1e-9);
    assert!(report.cumulative_returns[&10][5].value < 1.0);

    let sheet = report.to_json();
    assert_eq!(sheet["summary"]["num_periods"], 6);
    assert_eq!(sheet["summary"]["rebalance_frequency"], "monthly");
    assert_eq!(sheet["deciles"].as_array().map(Vec::len), Some(10));
    assert_eq!(sheet["cumulative_returns"]["d1"].as_array().map(Vec::len), Some(6));
    assert!(sheet["top_decile"]["beta"].is_null());
}
