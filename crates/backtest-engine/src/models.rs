use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
}

impl RebalanceFrequency {
    /// Periods per year, used to annualize volatility and Sharpe.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            RebalanceFrequency::Daily => 252.0,
            RebalanceFrequency::Weekly => 52.0,
            RebalanceFrequency::Monthly => 12.0,
            RebalanceFrequency::Quarterly => 4.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceFrequency::Daily => "daily",
            RebalanceFrequency::Weekly => "weekly",
            RebalanceFrequency::Monthly => "monthly",
            RebalanceFrequency::Quarterly => "quarterly",
        }
    }
}

impl fmt::Display for RebalanceFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RebalanceFrequency {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(RebalanceFrequency::Daily),
            "weekly" => Ok(RebalanceFrequency::Weekly),
            "monthly" => Ok(RebalanceFrequency::Monthly),
            "quarterly" => Ok(RebalanceFrequency::Quarterly),
            other => Err(BacktestError::InvalidConfig(format!(
                "unknown rebalance frequency '{other}'"
            ))),
        }
    }
}

/// How the monotonicity statistic is reduced across periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Score each period's decile ordering, then average.
    #[default]
    PerPeriod,
    /// Average each decile's returns over all periods, then score once.
    PooledDeciles,
}

impl FromStr for AggregationMode {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_period" => Ok(AggregationMode::PerPeriod),
            "pooled_deciles" => Ok(AggregationMode::PooledDeciles),
            other => Err(BacktestError::InvalidConfig(format!(
                "unknown aggregation mode '{other}'"
            ))),
        }
    }
}

/// Configuration for one decile backtest. Build it with
/// [`BacktestConfig::builder`], which validates ranges up front; a
/// deserialized config goes through the same validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedBacktestConfig")]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rebalance_frequency: RebalanceFrequency,
    /// Empty means every ticker with a score.
    pub universe: Vec<String>,
    pub benchmark: String,
    pub transaction_cost_bps: f64,
    pub slippage_bps: f64,
    pub exclude_financials: bool,
    pub exclude_utilities: bool,
    /// Only these sectors, when set.
    pub sectors: Option<Vec<String>>,
    pub use_smoothed_scores: bool,
    pub aggregation_mode: AggregationMode,
}

#[derive(Deserialize)]
struct UncheckedBacktestConfig {
    start_date: NaiveDate,
    end_date: NaiveDate,
    rebalance_frequency: RebalanceFrequency,
    universe: Vec<String>,
    benchmark: String,
    transaction_cost_bps: f64,
    slippage_bps: f64,
    exclude_financials: bool,
    exclude_utilities: bool,
    #[serde(default)]
    sectors: Option<Vec<String>>,
    use_smoothed_scores: bool,
    #[serde(default)]
    aggregation_mode: AggregationMode,
}

impl TryFrom<UncheckedBacktestConfig> for BacktestConfig {
    type Error = BacktestError;

    fn try_from(raw: UncheckedBacktestConfig) -> Result<Self, Self::Error> {
        let config = BacktestConfig {
            start_date: raw.start_date,
            end_date: raw.end_date,
            rebalance_frequency: raw.rebalance_frequency,
            universe: raw.universe,
            benchmark: raw.benchmark,
            transaction_cost_bps: raw.transaction_cost_bps,
            slippage_bps: raw.slippage_bps,
            exclude_financials: raw.exclude_financials,
            exclude_utilities: raw.exclude_utilities,
            sectors: raw.sectors,
            use_smoothed_scores: raw.use_smoothed_scores,
            aggregation_mode: raw.aggregation_mode,
        };
        config.validate()?;
        Ok(config)
    }
}

impl BacktestConfig {
    pub fn builder(start_date: NaiveDate, end_date: NaiveDate) -> BacktestConfigBuilder {
        BacktestConfigBuilder::new(start_date, end_date)
    }

    pub fn validate(&self) -> Result<(), BacktestError> {
        if self.end_date <= self.start_date {
            return Err(BacktestError::InvalidConfig(format!(
                "end date {} must be after start date {}",
                self.end_date, self.start_date
            )));
        }
        for (name, bps) in [
            ("transaction_cost_bps", self.transaction_cost_bps),
            ("slippage_bps", self.slippage_bps),
        ] {
            if !bps.is_finite() || bps < 0.0 {
                return Err(BacktestError::InvalidConfig(format!(
                    "{name} must be a non-negative number, got {bps}"
                )));
            }
        }
        if self.benchmark.trim().is_empty() {
            return Err(BacktestError::InvalidConfig(
                "benchmark ticker must not be empty".to_string(),
            ));
        }
        if matches!(&self.sectors, Some(s) if s.is_empty()) {
            return Err(BacktestError::InvalidConfig(
                "sector allow-list must not be empty when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Combined per-rebalance cost as a return fraction.
    pub fn cost_drag(&self) -> f64 {
        (self.transaction_cost_bps + self.slippage_bps) / 10_000.0
    }

    /// Whether a score recorded under `sector` passes the exclusion flags.
    /// A score with no sector passes unless an allow-list is set.
    pub fn admits_sector(&self, sector: Option<&str>) -> bool {
        let Some(sector) = sector else {
            return self.sectors.is_none();
        };
        let lower = sector.to_lowercase();
        if self.exclude_financials && lower.contains("financ") {
            return false;
        }
        if self.exclude_utilities && lower.contains("utilit") {
            return false;
        }
        match &self.sectors {
            Some(allowed) => allowed.iter().any(|s| s.eq_ignore_ascii_case(sector)),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestConfigBuilder {
    config: BacktestConfig,
}

impl BacktestConfigBuilder {
    fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            config: BacktestConfig {
                start_date,
                end_date,
                rebalance_frequency: RebalanceFrequency::Monthly,
                universe: Vec::new(),
                benchmark: "SPY".to_string(),
                transaction_cost_bps: 10.0,
                slippage_bps: 5.0,
                exclude_financials: false,
                exclude_utilities: false,
                sectors: None,
                use_smoothed_scores: true,
                aggregation_mode: AggregationMode::PerPeriod,
            },
        }
    }

    pub fn rebalance_frequency(mut self, frequency: RebalanceFrequency) -> Self {
        self.config.rebalance_frequency = frequency;
        self
    }

    pub fn universe<I, S>(mut self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.universe = tickers.into_iter().map(Into::into).collect();
        self
    }

    pub fn benchmark(mut self, ticker: impl Into<String>) -> Self {
        self.config.benchmark = ticker.into();
        self
    }

    pub fn transaction_cost_bps(mut self, bps: f64) -> Self {
        self.config.transaction_cost_bps = bps;
        self
    }

    pub fn slippage_bps(mut self, bps: f64) -> Self {
        self.config.slippage_bps = bps;
        self
    }

    pub fn exclude_financials(mut self, exclude: bool) -> Self {
        self.config.exclude_financials = exclude;
        self
    }

    pub fn exclude_utilities(mut self, exclude: bool) -> Self {
        self.config.exclude_utilities = exclude;
        self
    }

    pub fn sectors<I, S>(mut self, sectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.sectors = Some(sectors.into_iter().map(Into::into).collect());
        self
    }

    pub fn use_smoothed_scores(mut self, smoothed: bool) -> Self {
        self.config.use_smoothed_scores = smoothed;
        self
    }

    pub fn aggregation_mode(mut self, mode: AggregationMode) -> Self {
        self.config.aggregation_mode = mode;
        self
    }

    pub fn build(self) -> Result<BacktestConfig, BacktestError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// One decile's holdings and performance over one rebalance period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodResult {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub decile: u8,
    pub holdings: Vec<String>,
    pub num_holdings: usize,
    pub period_return: f64,
    pub benchmark_return: f64,
    pub excess_return: f64,
    pub avg_score: f64,
    pub turnover: f64,
}

/// A period that could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedPeriod {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecileStats {
    pub decile: u8,
    pub num_periods: usize,
    /// Compounded over all periods.
    pub total_return: f64,
    pub annualized_return: f64,
    pub avg_period_return: f64,
    /// Annualized standard deviation of period returns.
    pub volatility: f64,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub calmar_ratio: Option<f64>,
    pub max_drawdown: f64,
    /// Annualized, against the benchmark return of the same periods.
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
    pub tracking_error: Option<f64>,
    pub win_rate: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub avg_turnover: f64,
    pub avg_holdings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResults {
    pub config: BacktestConfig,
    pub num_periods: usize,
    pub decile_stats: Vec<DecileStats>,
    pub top_bottom_spread: f64,
    pub hit_rate: f64,
    pub monotonicity_score: f64,
    pub aggregation_mode: AggregationMode,
    pub benchmark_total_return: f64,
    pub benchmark_annualized_return: f64,
    /// Top decile annualized return minus the benchmark's.
    pub top_decile_excess_annualized: f64,
    pub information_ratio: Option<f64>,
    pub period_results: Vec<PeriodResult>,
    pub failed_periods: Vec<FailedPeriod>,
}

impl BacktestResults {
    pub fn decile(&self, decile: u8) -> Option<&DecileStats> {
        self.decile_stats.iter().find(|s| s.decile == decile)
    }
}

/// Engine state between two periods. Serializable so a cancelled run can be
/// resumed later, or aggregated as it stands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestCheckpoint {
    pub config: BacktestConfig,
    /// Number of generated periods already processed.
    pub completed_periods: usize,
    pub period_results: Vec<PeriodResult>,
    pub failed_periods: Vec<FailedPeriod>,
    /// Last holdings per decile, for turnover.
    pub previous_holdings: BTreeMap<u8, Vec<String>>,
    /// Last smoothed score per ticker.
    pub smoothed_scores: BTreeMap<String, f64>,
}

impl BacktestCheckpoint {
    pub fn new(config: BacktestConfig) -> Self {
        Self {
            config,
            completed_periods: 0,
            period_results: Vec::new(),
            failed_periods: Vec::new(),
            previous_holdings: BTreeMap::new(),
            smoothed_scores: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BacktestOutcome {
    Completed(BacktestResults),
    Cancelled(BacktestCheckpoint),
}
