use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::stats;

/// Lowest and highest value any score may take.
pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;
/// Score assigned when a metric cannot be compared against its sector.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// A scoring factor slot.
///
/// The thirteen canonical slots make up the IC Score. `Custom` carries a score
/// produced elsewhere (e.g. a dividend-quality detector) under its own name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Factor {
    Value,
    IntrinsicValue,
    HistoricalValue,
    Growth,
    Profitability,
    FinancialHealth,
    Momentum,
    Technical,
    AnalystConsensus,
    InsiderActivity,
    Institutional,
    NewsSentiment,
    EarningsRevisions,
    Custom(String),
}

impl Factor {
    pub const ALL: [Factor; 13] = [
        Factor::Value,
        Factor::IntrinsicValue,
        Factor::HistoricalValue,
        Factor::Growth,
        Factor::Profitability,
        Factor::FinancialHealth,
        Factor::Momentum,
        Factor::Technical,
        Factor::AnalystConsensus,
        Factor::InsiderActivity,
        Factor::Institutional,
        Factor::NewsSentiment,
        Factor::EarningsRevisions,
    ];

    /// Factors that must be present for a composite score to mean anything.
    pub const CORE: [Factor; 4] = [
        Factor::Value,
        Factor::Growth,
        Factor::Profitability,
        Factor::FinancialHealth,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Factor::Value => "value",
            Factor::IntrinsicValue => "intrinsic_value",
            Factor::HistoricalValue => "historical_value",
            Factor::Growth => "growth",
            Factor::Profitability => "profitability",
            Factor::FinancialHealth => "financial_health",
            Factor::Momentum => "momentum",
            Factor::Technical => "technical",
            Factor::AnalystConsensus => "analyst_consensus",
            Factor::InsiderActivity => "insider_activity",
            Factor::Institutional => "institutional",
            Factor::NewsSentiment => "news_sentiment",
            Factor::EarningsRevisions => "earnings_revisions",
            Factor::Custom(name) => name,
        }
    }

    /// Human-readable name, e.g. "financial health".
    pub fn display_name(&self) -> String {
        self.as_str().replace('_', " ")
    }

    pub fn is_core(&self) -> bool {
        Factor::CORE.contains(self)
    }
}

impl From<String> for Factor {
    fn from(name: String) -> Self {
        match name.as_str() {
            "value" => Factor::Value,
            "intrinsic_value" => Factor::IntrinsicValue,
            "historical_value" => Factor::HistoricalValue,
            "growth" => Factor::Growth,
            "profitability" => Factor::Profitability,
            "financial_health" => Factor::FinancialHealth,
            "momentum" => Factor::Momentum,
            "technical" => Factor::Technical,
            "analyst_consensus" => Factor::AnalystConsensus,
            "insider_activity" => Factor::InsiderActivity,
            "institutional" => Factor::Institutional,
            "news_sentiment" => Factor::NewsSentiment,
            "earnings_revisions" => Factor::EarningsRevisions,
            _ => Factor::Custom(name),
        }
    }
}

impl From<&str> for Factor {
    fn from(name: &str) -> Self {
        Factor::from(name.to_string())
    }
}

impl From<Factor> for String {
    fn from(factor: Factor) -> Self {
        match factor {
            Factor::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Age bucket of the newest data behind a factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreshnessStatus {
    /// Under 7 days old
    Fresh,
    /// 7 to 30 days old
    Recent,
    /// Over 30 days old
    Stale,
    #[default]
    Unknown,
}

impl FreshnessStatus {
    pub const FRESH_DAYS: i64 = 7;
    pub const STALE_DAYS: i64 = 30;

    pub fn from_age_days(days: i64) -> Self {
        if days < Self::FRESH_DAYS {
            FreshnessStatus::Fresh
        } else if days <= Self::STALE_DAYS {
            FreshnessStatus::Recent
        } else {
            FreshnessStatus::Stale
        }
    }

    pub fn from_dates(data_date: Option<NaiveDate>, as_of: NaiveDate) -> Self {
        match data_date {
            Some(d) => Self::from_age_days((as_of - d).num_days()),
            None => FreshnessStatus::Unknown,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, FreshnessStatus::Stale)
    }
}

/// One factor's contribution to a scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub factor: Factor,
    #[serde(default)]
    pub raw_value: Option<f64>,
    /// `None` means the factor had no usable data. `Some(0.0)` is a measured zero.
    pub score: Option<f64>,
    /// Weight the factor carried in the final sum (0 when excluded).
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub freshness: FreshnessStatus,
    #[serde(default)]
    pub data_date: Option<NaiveDate>,
}

impl FactorScore {
    pub fn available(factor: Factor, score: f64) -> Self {
        Self {
            factor,
            raw_value: None,
            score: Some(stats::clamp_score(score)),
            weight: 0.0,
            freshness: FreshnessStatus::Unknown,
            data_date: None,
        }
    }

    pub fn unavailable(factor: Factor) -> Self {
        Self {
            factor,
            raw_value: None,
            score: None,
            weight: 0.0,
            freshness: FreshnessStatus::Unknown,
            data_date: None,
        }
    }

    pub fn with_raw_value(mut self, raw_value: f64) -> Self {
        self.raw_value = Some(raw_value);
        self
    }

    /// Record when the factor's newest input was observed.
    pub fn observed_on(mut self, data_date: NaiveDate, as_of: NaiveDate) -> Self {
        self.data_date = Some(data_date);
        self.freshness = FreshnessStatus::from_dates(Some(data_date), as_of);
        self
    }

    pub fn is_available(&self) -> bool {
        matches!(self.score, Some(s) if s.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    StrongBuy,
    Buy,
    #[default]
    Hold,
    Underperform,
    Sell,
}

impl Rating {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Rating::StrongBuy
        } else if score >= 65.0 {
            Rating::Buy
        } else if score >= 50.0 {
            Rating::Hold
        } else if score >= 35.0 {
            Rating::Underperform
        } else {
            Rating::Sell
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rating::StrongBuy => "Strong Buy",
            Rating::Buy => "Buy",
            Rating::Hold => "Hold",
            Rating::Underperform => "Underperform",
            Rating::Sell => "Sell",
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfidenceLevel {
    High,
    Medium,
    #[default]
    Low,
}

impl ConfidenceLevel {
    /// High at 90% completeness or more, Medium from 50%, Low below.
    pub fn from_completeness(completeness: f64) -> Self {
        if completeness >= 0.9 {
            ConfidenceLevel::High
        } else if completeness >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    pub fn downgrade(self) -> Self {
        match self {
            ConfidenceLevel::High => ConfidenceLevel::Medium,
            ConfidenceLevel::Medium | ConfidenceLevel::Low => ConfidenceLevel::Low,
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceLevel::High => "High",
            ConfidenceLevel::Medium => "Medium",
            ConfidenceLevel::Low => "Low",
        };
        f.write_str(s)
    }
}

/// Business lifecycle stage used to reweight factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    Hypergrowth,
    Growth,
    Mature,
    Value,
    Turnaround,
}

impl LifecycleStage {
    pub const ALL: [LifecycleStage; 5] = [
        LifecycleStage::Hypergrowth,
        LifecycleStage::Growth,
        LifecycleStage::Mature,
        LifecycleStage::Value,
        LifecycleStage::Turnaround,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleStage::Hypergrowth => "hypergrowth",
            LifecycleStage::Growth => "growth",
            LifecycleStage::Mature => "mature",
            LifecycleStage::Value => "value",
            LifecycleStage::Turnaround => "turnaround",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            LifecycleStage::Hypergrowth => {
                "Revenue growing above 50% a year; growth is weighted up and valuation down"
            }
            LifecycleStage::Growth => {
                "Revenue growing 20-50% a year; growth carries extra weight"
            }
            LifecycleStage::Mature => {
                "Stable business; profitability, value and balance sheet are emphasized"
            }
            LifecycleStage::Value => {
                "Profitable and cheap on earnings; valuation factors are emphasized"
            }
            LifecycleStage::Turnaround => {
                "Revenue shrinking; balance sheet strength and momentum are emphasized"
            }
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The IC Score for one ticker on one date.
///
/// Stored one row per `(ticker, date)`; writing the same key again replaces
/// the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub ticker: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub sector: Option<String>,
    pub overall_score: f64,
    #[serde(default)]
    pub rating: Rating,
    #[serde(default)]
    pub factor_scores: BTreeMap<Factor, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub factor_details: Vec<FactorScore>,
    #[serde(default)]
    pub excluded_factors: Vec<Factor>,
    #[serde(default)]
    pub weights_used: BTreeMap<Factor, f64>,
    #[serde(default)]
    pub confidence_level: ConfidenceLevel,
    #[serde(default)]
    pub data_completeness: f64,
    #[serde(default)]
    pub lifecycle_stage: Option<LifecycleStage>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Distribution of one metric across the companies of a sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorStatistics {
    pub sector: String,
    pub metric_name: String,
    pub min: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    pub sample_count: usize,
}

impl SectorStatistics {
    /// Fewest peer values a distribution is built from.
    pub const MIN_SAMPLE_SIZE: usize = 5;

    /// Build the distribution from peer values.
    ///
    /// Non-finite values are ignored. With more than ten values, points
    /// beyond three standard deviations of the mean are dropped as outliers.
    /// Returns `None` when fewer than [`Self::MIN_SAMPLE_SIZE`] values remain.
    pub fn from_values(sector: &str, metric_name: &str, values: &[f64]) -> Option<Self> {
        let mut clean: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if clean.len() > 10 {
            let m = stats::mean(&clean);
            let sd = stats::std_dev(&clean);
            if sd > 0.0 {
                clean.retain(|v| (v - m).abs() <= 3.0 * sd);
            }
        }
        if clean.len() < Self::MIN_SAMPLE_SIZE {
            return None;
        }
        Some(Self {
            sector: sector.to_string(),
            metric_name: metric_name.to_string(),
            min: stats::percentile_value(&clean, 0.0),
            p10: stats::percentile_value(&clean, 10.0),
            p25: stats::percentile_value(&clean, 25.0),
            p50: stats::percentile_value(&clean, 50.0),
            p75: stats::percentile_value(&clean, 75.0),
            p90: stats::percentile_value(&clean, 90.0),
            max: stats::percentile_value(&clean, 100.0),
            mean: stats::mean(&clean),
            std_dev: stats::std_dev(&clean),
            sample_count: clean.len(),
        })
    }

    /// `(value, percentile)` pairs in ascending order.
    pub fn breakpoints(&self) -> [(f64, f64); 7] {
        [
            (self.min, 0.0),
            (self.p10, 10.0),
            (self.p25, 25.0),
            (self.p50, 50.0),
            (self.p75, 75.0),
            (self.p90, 90.0),
            (self.max, 100.0),
        ]
    }

    /// Finite, non-decreasing breakpoints with some spread, backed by at
    /// least one sample.
    pub fn is_well_formed(&self) -> bool {
        let points = self.breakpoints();
        self.sample_count > 0
            && points.iter().all(|(v, _)| v.is_finite())
            && points.windows(2).all(|w| w[0].0 <= w[1].0)
            && self.max > self.min
    }
}
