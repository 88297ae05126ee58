//! Sector-relative scoring of raw metric values.
//!
//! A raw metric (P/E, ROE, revenue growth, ...) only means something next to
//! its sector peers. When the full peer distribution is known, the value is
//! placed on it by piecewise-linear interpolation between the stored
//! percentile breakpoints. When only the sector median is known, the ratio to
//! the median is mapped through a fixed curve. Both paths return a score in
//! [0, 100] where higher is always better.

use score_core::stats::{clamp_score, interpolate};
use score_core::{Factor, FactorScore, SectorStatistics, NEUTRAL_SCORE};
use serde::{Deserialize, Serialize};

/// Metrics where a lower value is the better one.
pub const LOWER_IS_BETTER_METRICS: &[&str] = &[
    "pe_ratio",
    "ps_ratio",
    "pb_ratio",
    "ev_ebitda",
    "peg_ratio",
    "debt_to_equity",
    "net_debt_to_ebitda",
];

pub fn is_lower_better(metric_name: &str) -> bool {
    LOWER_IS_BETTER_METRICS.contains(&metric_name)
}

// Ratio curve shape
const RATIO_CEILING: f64 = 95.0;
const RATIO_FLOOR: f64 = 5.0;

/// A way of turning a raw value into a sector-relative score.
pub trait ScoringStrategy {
    /// Score in [0, 100], or `None` when the value cannot be compared.
    fn score(&self, raw_value: f64, lower_is_better: bool) -> Option<f64>;
}

/// Interpolates against a full sector distribution.
#[derive(Debug, Clone, Copy)]
pub struct DistributionCurve<'a> {
    stats: &'a SectorStatistics,
}

impl<'a> DistributionCurve<'a> {
    pub fn new(stats: &'a SectorStatistics) -> Self {
        Self { stats }
    }

    /// Raw percentile of `value` on the distribution, before orientation.
    fn percentile(&self, value: f64) -> f64 {
        let points = self.stats.breakpoints();
        let (min, max) = (points[0].0, points[points.len() - 1].0);
        if value <= min {
            return 0.0;
        }
        if value >= max {
            return 100.0;
        }
        points
            .windows(2)
            .find(|w| w[0].0 <= value && value <= w[1].0)
            .map(|w| interpolate(value, w[0], w[1]))
            .unwrap_or(NEUTRAL_SCORE)
    }
}

impl ScoringStrategy for DistributionCurve<'_> {
    fn score(&self, raw_value: f64, lower_is_better: bool) -> Option<f64> {
        if !raw_value.is_finite() {
            return None;
        }
        let pct = clamp_score(self.percentile(raw_value));
        Some(if lower_is_better { 100.0 - pct } else { pct })
    }
}

/// Maps the ratio of a value to its sector median through a fixed curve.
#[derive(Debug, Clone, Copy)]
pub struct MedianRatioCurve {
    median: f64,
}

impl MedianRatioCurve {
    pub fn new(median: f64) -> Self {
        Self { median }
    }

    fn higher_is_better(ratio: f64) -> f64 {
        if ratio >= 2.0 {
            RATIO_CEILING
        } else if ratio >= 1.5 {
            75.0 + (ratio - 1.5) * 40.0
        } else if ratio >= 1.0 {
            50.0 + (ratio - 1.0) * 50.0
        } else if ratio >= 0.5 {
            25.0 + (ratio - 0.5) * 50.0
        } else {
            (ratio * 50.0).max(RATIO_FLOOR)
        }
    }

    fn lower_is_better(ratio: f64) -> f64 {
        if ratio <= 0.5 {
            RATIO_CEILING
        } else if ratio <= 0.75 {
            75.0 + (0.75 - ratio) * 80.0
        } else if ratio <= 1.0 {
            50.0 + (1.0 - ratio) * 100.0
        } else if ratio <= 1.5 {
            50.0 - (ratio - 1.0) * 60.0
        } else {
            (20.0 - (ratio - 1.5) * 30.0).max(RATIO_FLOOR)
        }
    }
}

impl ScoringStrategy for MedianRatioCurve {
    fn score(&self, raw_value: f64, lower_is_better: bool) -> Option<f64> {
        if !raw_value.is_finite() || !self.median.is_finite() || self.median <= 0.0 {
            return None;
        }
        // A negative multiple (e.g. P/E on losses) is not "cheap".
        if lower_is_better && raw_value <= 0.0 {
            return None;
        }
        let ratio = raw_value / self.median;
        let score = if lower_is_better {
            Self::lower_is_better(ratio)
        } else {
            Self::higher_is_better(ratio)
        };
        Some(clamp_score(score))
    }
}

/// What is known about the sector for one metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorBenchmark {
    Distribution(SectorStatistics),
    Median(f64),
}

impl SectorBenchmark {
    fn score(&self, raw_value: f64, lower_is_better: bool) -> Option<f64> {
        match self {
            SectorBenchmark::Distribution(stats) if stats.is_well_formed() => {
                DistributionCurve::new(stats).score(raw_value, lower_is_better)
            }
            // A degenerate distribution still has a usable median.
            SectorBenchmark::Distribution(stats) => {
                MedianRatioCurve::new(stats.p50).score(raw_value, lower_is_better)
            }
            SectorBenchmark::Median(median) => {
                MedianRatioCurve::new(*median).score(raw_value, lower_is_better)
            }
        }
    }
}

/// Result of scoring one metric. Unavailable results carry the neutral score
/// so they can be displayed, but are never counted as data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileScore {
    pub score: f64,
    pub available: bool,
}

impl PercentileScore {
    pub fn unavailable() -> Self {
        Self {
            score: NEUTRAL_SCORE,
            available: false,
        }
    }
}

pub struct SectorPercentileScorer;

impl SectorPercentileScorer {
    pub fn score(
        raw_value: Option<f64>,
        benchmark: Option<&SectorBenchmark>,
        lower_is_better: bool,
    ) -> PercentileScore {
        let (Some(raw), Some(benchmark)) = (raw_value, benchmark) else {
            return PercentileScore::unavailable();
        };
        match benchmark.score(raw, lower_is_better) {
            Some(score) => PercentileScore {
                score,
                available: true,
            },
            None => PercentileScore::unavailable(),
        }
    }

    /// Score a named metric, looking up its orientation.
    pub fn score_metric(
        metric_name: &str,
        raw_value: Option<f64>,
        benchmark: Option<&SectorBenchmark>,
    ) -> PercentileScore {
        Self::score(raw_value, benchmark, is_lower_better(metric_name))
    }

    /// Collapse a factor's metric scores into one factor score: the mean of
    /// the available ones, or unavailable when none are.
    pub fn combine(factor: Factor, metric_scores: &[PercentileScore]) -> FactorScore {
        let available: Vec<f64> = metric_scores
            .iter()
            .filter(|s| s.available)
            .map(|s| s.score)
            .collect();
        if available.is_empty() {
            return FactorScore::unavailable(factor);
        }
        let mean = available.iter().sum::<f64>() / available.len() as f64;
        FactorScore::available(factor, mean)
    }
}
