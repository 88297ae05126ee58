use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use factor_scoring::ScoreStabilizer;
use rayon::prelude::*;
use score_core::stats::mean;
use score_core::{PriceProvider, ScoreError, ScoreStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BacktestError;
use crate::metrics::{
    alpha_beta, annualized_return, annualized_volatility, calculate_max_drawdown,
    calculate_monotonicity, calmar_ratio, compound_return, sharpe_ratio, sortino_ratio, streaks,
    tracking_error, win_rate,
};
use crate::models::*;
use crate::periods::generate_periods;
use crate::portfolio::{
    calculate_turnover, create_decile_portfolios, fetch_ticker_returns, portfolio_return,
    NUM_DECILES,
};

/// Replays stored composite scores against price history, one rebalance
/// period at a time, to measure how well score deciles rank future returns.
///
/// A run can be cancelled between periods; the returned checkpoint resumes
/// exactly where it stopped.
pub struct BacktestEngine {
    config: BacktestConfig,
    scores: Arc<dyn ScoreStore>,
    prices: Arc<dyn PriceProvider>,
    stabilizer: ScoreStabilizer,
}

impl BacktestEngine {
    pub fn new(
        config: BacktestConfig,
        scores: Arc<dyn ScoreStore>,
        prices: Arc<dyn PriceProvider>,
    ) -> Result<Self, BacktestError> {
        config.validate()?;
        Ok(Self {
            config,
            scores,
            prices,
            stabilizer: ScoreStabilizer::default(),
        })
    }

    pub fn with_stabilizer(mut self, stabilizer: ScoreStabilizer) -> Self {
        self.stabilizer = stabilizer;
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<BacktestOutcome, BacktestError> {
        self.resume(BacktestCheckpoint::new(self.config.clone()), cancel).await
    }

    /// Continue from `checkpoint`, checking `cancel` before every period.
    pub async fn resume(
        &self,
        mut checkpoint: BacktestCheckpoint,
        cancel: &CancellationToken,
    ) -> Result<BacktestOutcome, BacktestError> {
        if checkpoint.config != self.config {
            return Err(BacktestError::InvalidConfig(
                "checkpoint was taken under a different configuration".to_string(),
            ));
        }

        let periods = generate_periods(
            self.config.start_date,
            self.config.end_date,
            self.config.rebalance_frequency,
        )?;
        info!(
            periods = periods.len(),
            completed = checkpoint.completed_periods,
            frequency = %self.config.rebalance_frequency,
            "Running decile backtest"
        );

        for (index, &(start, end)) in periods.iter().enumerate().skip(checkpoint.completed_periods) {
            if cancel.is_cancelled() {
                info!(
                    completed = checkpoint.completed_periods,
                    remaining = periods.len() - index,
                    "Backtest cancelled"
                );
                return Ok(BacktestOutcome::Cancelled(checkpoint));
            }

            match self.run_period(start, end, &mut checkpoint).await {
                Ok(results) if results.is_empty() => {
                    warn!(%start, %end, "No scores available, skipping period");
                }
                Ok(results) => checkpoint.period_results.extend(results),
                Err(e) => {
                    warn!(%start, %end, error = %e, "Period failed");
                    checkpoint.failed_periods.push(FailedPeriod {
                        period_start: start,
                        period_end: end,
                        reason: e.to_string(),
                    });
                }
            }
            checkpoint.completed_periods = index + 1;
        }

        if checkpoint.period_results.is_empty() {
            let failed = checkpoint.failed_periods.len();
            let skipped = checkpoint.completed_periods.saturating_sub(failed);
            warn!(skipped, failed, "No period produced decile returns");
            return Err(ScoreError::InsufficientData(format!(
                "no rebalance period produced decile returns ({skipped} without scores, {failed} failed, of {} periods)",
                periods.len()
            ))
            .into());
        }

        let mut results = aggregate_results(&self.config, &checkpoint.period_results);
        results.failed_periods = checkpoint.failed_periods;
        info!(
            periods = results.num_periods,
            failed = results.failed_periods.len(),
            spread = results.top_bottom_spread,
            hit_rate = results.hit_rate,
            monotonicity = results.monotonicity_score,
            "Backtest complete"
        );
        Ok(BacktestOutcome::Completed(results))
    }

    async fn run_period(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        checkpoint: &mut BacktestCheckpoint,
    ) -> Result<Vec<PeriodResult>, BacktestError> {
        let scores = self.scores.scores_as_of(start, &self.config.universe).await?;

        let mut ranked: BTreeMap<String, f64> = BTreeMap::new();
        for score in scores {
            if !self.config.admits_sector(score.sector.as_deref()) {
                continue;
            }
            let value = if self.config.use_smoothed_scores {
                let previous = checkpoint.smoothed_scores.get(&score.ticker).copied();
                let smoothed = self.stabilizer.stabilize(score.overall_score, previous, &[]);
                checkpoint
                    .smoothed_scores
                    .insert(score.ticker.clone(), smoothed.final_score);
                smoothed.final_score
            } else {
                score.overall_score
            };
            ranked.insert(score.ticker, value);
        }
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let deciles = create_decile_portfolios(&ranked);

        let mut tickers: Vec<String> = ranked.keys().cloned().collect();
        if !ranked.contains_key(&self.config.benchmark) {
            tickers.push(self.config.benchmark.clone());
        }
        let returns = fetch_ticker_returns(self.prices.as_ref(), &tickers, start, end).await;

        let benchmark_return = match returns.get(&self.config.benchmark).copied().flatten() {
            Some(r) => r,
            None => {
                warn!(benchmark = %self.config.benchmark, %start, %end, "Benchmark price missing, using 0 return");
                0.0
            }
        };

        let cost_drag = self.config.cost_drag();
        let mut results = Vec::new();
        for (decile, holdings) in deciles {
            if holdings.is_empty() {
                continue;
            }
            let period_return = portfolio_return(&holdings, &returns, cost_drag);
            let held_scores: Vec<f64> = holdings.iter().filter_map(|t| ranked.get(t).copied()).collect();
            let previous = checkpoint
                .previous_holdings
                .get(&decile)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let turnover = calculate_turnover(previous, &holdings);
            debug!(decile, holdings = holdings.len(), period_return, turnover, "Decile evaluated");

            checkpoint.previous_holdings.insert(decile, holdings.clone());
            results.push(PeriodResult {
                period_start: start,
                period_end: end,
                decile,
                num_holdings: holdings.len(),
                holdings,
                period_return,
                benchmark_return,
                excess_return: period_return - benchmark_return,
                avg_score: mean(&held_scores),
                turnover,
            });
        }
        Ok(results)
    }
}

/// Reduce per-period decile results into backtest statistics.
pub fn aggregate_results(config: &BacktestConfig, period_results: &[PeriodResult]) -> BacktestResults {
    let mut by_period: BTreeMap<NaiveDate, BTreeMap<u8, &PeriodResult>> = BTreeMap::new();
    for r in period_results {
        by_period.entry(r.period_start).or_default().insert(r.decile, r);
    }
    let periods_per_year = config.rebalance_frequency.periods_per_year();

    let decile_returns = |decile: u8| -> Vec<f64> {
        by_period
            .values()
            .filter_map(|p| p.get(&decile).map(|r| r.period_return))
            .collect()
    };
    let top = decile_returns(1);
    let bottom = decile_returns(NUM_DECILES);
    let top_bottom_spread = if top.is_empty() || bottom.is_empty() {
        0.0
    } else {
        mean(&top) - mean(&bottom)
    };

    let head_to_head: Vec<bool> = by_period
        .values()
        .filter_map(|p| match (p.get(&1), p.get(&NUM_DECILES)) {
            (Some(t), Some(b)) => Some(t.period_return > b.period_return),
            _ => None,
        })
        .collect();
    let hit_rate = if head_to_head.is_empty() {
        0.0
    } else {
        head_to_head.iter().filter(|won| **won).count() as f64 / head_to_head.len() as f64
    };

    let monotonicity_score = match config.aggregation_mode {
        AggregationMode::PerPeriod => {
            let per_period: Vec<f64> = by_period
                .values()
                .filter(|p| p.len() >= 2)
                .map(|p| {
                    let returns: BTreeMap<u8, f64> = p.iter().map(|(d, r)| (*d, r.period_return)).collect();
                    calculate_monotonicity(&returns)
                })
                .collect();
            mean(&per_period)
        }
        AggregationMode::PooledDeciles => {
            let pooled: BTreeMap<u8, f64> = (1..=NUM_DECILES)
                .filter_map(|d| {
                    let returns = decile_returns(d);
                    (!returns.is_empty()).then(|| (d, mean(&returns)))
                })
                .collect();
            calculate_monotonicity(&pooled)
        }
    };

    let decile_stats: Vec<DecileStats> = (1..=NUM_DECILES)
        .into_par_iter()
        .filter_map(|decile| {
            let rows: Vec<&PeriodResult> = by_period.values().filter_map(|p| p.get(&decile).copied()).collect();
            summarize_decile(decile, &rows, periods_per_year)
        })
        .collect();

    // one benchmark observation per period
    let benchmark: Vec<f64> = by_period
        .values()
        .filter_map(|p| p.values().next().map(|r| r.benchmark_return))
        .collect();
    let benchmark_total_return = compound_return(&benchmark);
    let benchmark_annualized_return = annualized_return(
        benchmark_total_return,
        span_days(by_period.values().flat_map(|p| p.values().copied())),
    );

    let top_annualized = decile_stats
        .iter()
        .find(|s| s.decile == 1)
        .map(|s| s.annualized_return)
        .unwrap_or(0.0);
    let top_excess: Vec<f64> = by_period
        .values()
        .filter_map(|p| p.get(&1).map(|r| r.excess_return))
        .collect();

    BacktestResults {
        config: config.clone(),
        num_periods: by_period.len(),
        decile_stats,
        top_bottom_spread,
        hit_rate,
        monotonicity_score,
        aggregation_mode: config.aggregation_mode,
        benchmark_total_return,
        benchmark_annualized_return,
        top_decile_excess_annualized: top_annualized - benchmark_annualized_return,
        information_ratio: sharpe_ratio(&top_excess, periods_per_year),
        period_results: period_results.to_vec(),
        failed_periods: Vec::new(),
    }
}

fn summarize_decile(decile: u8, rows: &[&PeriodResult], periods_per_year: f64) -> Option<DecileStats> {
    if rows.is_empty() {
        return None;
    }
    let returns: Vec<f64> = rows.iter().map(|r| r.period_return).collect();
    let benchmark: Vec<f64> = rows.iter().map(|r| r.benchmark_return).collect();
    let turnover: Vec<f64> = rows.iter().map(|r| r.turnover).collect();
    let holdings: Vec<f64> = rows.iter().map(|r| r.num_holdings as f64).collect();
    let total_return = compound_return(&returns);
    let annualized = annualized_return(total_return, span_days(rows.iter().copied()));
    let max_drawdown = calculate_max_drawdown(&returns);
    let relative = alpha_beta(&returns, &benchmark, periods_per_year);
    let (max_consecutive_wins, max_consecutive_losses) = streaks(&returns);

    Some(DecileStats {
        decile,
        num_periods: rows.len(),
        total_return,
        annualized_return: annualized,
        avg_period_return: mean(&returns),
        volatility: annualized_volatility(&returns, periods_per_year),
        sharpe_ratio: sharpe_ratio(&returns, periods_per_year),
        sortino_ratio: sortino_ratio(&returns, periods_per_year),
        calmar_ratio: calmar_ratio(annualized, max_drawdown),
        max_drawdown,
        alpha: relative.map(|(alpha, _)| alpha),
        beta: relative.map(|(_, beta)| beta),
        tracking_error: tracking_error(&returns, &benchmark, periods_per_year),
        win_rate: win_rate(&returns),
        max_consecutive_wins,
        max_consecutive_losses,
        avg_turnover: mean(&turnover),
        avg_holdings: mean(&holdings),
    })
}

/// Calendar days from the earliest period start to the latest period end.
fn span_days<'a>(rows: impl Iterator<Item = &'a PeriodResult>) -> i64 {
    let mut first: Option<NaiveDate> = None;
    let mut last: Option<NaiveDate> = None;
    for r in rows {
        first = Some(first.map_or(r.period_start, |f| f.min(r.period_start)));
        last = Some(last.map_or(r.period_end, |l| l.max(r.period_end)));
    }
    match (first, last) {
        (Some(f), Some(l)) => (l - f).num_days(),
        _ => 0,
    }
}
