use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use backtest_engine::{AggregationMode, BacktestConfig, RebalanceFrequency};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub fixture_path: Option<PathBuf>,

    // Backtest window; derived from the fixture when unset
    pub backtest_start: Option<NaiveDate>,
    pub backtest_end: Option<NaiveDate>,

    pub rebalance: RebalanceFrequency,
    pub benchmark: String,
    pub tx_cost_bps: f64,   // 10
    pub slippage_bps: f64,  // 5
    pub use_smoothed_scores: bool,
    pub monotonicity_mode: AggregationMode,

    // Aggregator
    pub min_coverage: f64,  // 0.40
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let date = |key: &str| -> Result<Option<NaiveDate>> {
            var(key)
                .map(|v| {
                    NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")
                        .with_context(|| format!("{key} must be YYYY-MM-DD, got '{v}'"))
                })
                .transpose()
        };

        let config = Self {
            fixture_path: var("IC_FIXTURE_PATH").map(PathBuf::from),
            backtest_start: date("IC_BACKTEST_START")?,
            backtest_end: date("IC_BACKTEST_END")?,
            rebalance: var("IC_REBALANCE")
                .unwrap_or_else(|| "monthly".to_string())
                .parse()?,
            benchmark: var("IC_BENCHMARK").unwrap_or_else(|| "SPY".to_string()),
            tx_cost_bps: var("IC_TX_COST_BPS")
                .unwrap_or_else(|| "10".to_string())
                .parse()
                .context("IC_TX_COST_BPS must be a number")?,
            slippage_bps: var("IC_SLIPPAGE_BPS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .context("IC_SLIPPAGE_BPS must be a number")?,
            use_smoothed_scores: var("IC_USE_SMOOTHED_SCORES")
                .unwrap_or_else(|| "true".to_string())
                .parse()
                .context("IC_USE_SMOOTHED_SCORES must be true or false")?,
            monotonicity_mode: var("IC_MONOTONICITY_MODE")
                .unwrap_or_else(|| "per_period".to_string())
                .parse()?,
            min_coverage: var("IC_MIN_COVERAGE")
                .unwrap_or_else(|| "0.40".to_string())
                .parse()
                .context("IC_MIN_COVERAGE must be a number")?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_coverage) {
            bail!("IC_MIN_COVERAGE must be within [0, 1], got {}", self.min_coverage);
        }
        if let (Some(start), Some(end)) = (self.backtest_start, self.backtest_end) {
            if end <= start {
                bail!("IC_BACKTEST_END ({end}) must be after IC_BACKTEST_START ({start})");
            }
        }
        Ok(())
    }

    /// Build the backtest config, filling an unset window bound from
    /// `fallback`. `None` only when no bound is configured and there is no
    /// usable fallback window; a configured bound that cannot form a window
    /// is an error.
    pub fn backtest_config(&self, fallback: Option<(NaiveDate, NaiveDate)>) -> Result<Option<BacktestConfig>> {
        let explicit = self.backtest_start.is_some() || self.backtest_end.is_some();
        let (start, end) = match (self.backtest_start, self.backtest_end, fallback) {
            (Some(s), Some(e), _) => (s, e),
            (s, e, Some((fs, fe))) => (s.unwrap_or(fs), e.unwrap_or(fe)),
            (s, e, None) if explicit => bail!(
                "IC_BACKTEST_START and IC_BACKTEST_END must both be set when the fixture has no dated data \
                 (start: {s:?}, end: {e:?})"
            ),
            _ => return Ok(None),
        };
        if end <= start {
            if explicit {
                bail!("Backtest window is empty: end {end} is not after start {start}");
            }
            return Ok(None);
        }
        let config = BacktestConfig::builder(start, end)
            .rebalance_frequency(self.rebalance)
            .benchmark(self.benchmark.clone())
            .transaction_cost_bps(self.tx_cost_bps)
            .slippage_bps(self.slippage_bps)
            .use_smoothed_scores(self.use_smoothed_scores)
            .aggregation_mode(self.monotonicity_mode)
            .build()?;
        Ok(Some(config))
    }
}
