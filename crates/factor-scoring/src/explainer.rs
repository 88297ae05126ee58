//! Explains why a ticker's IC Score moved between two snapshots.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use score_core::{
    CompositeScore, ConfidenceLevel, Factor, FreshnessProvider, FreshnessStatus, ScoreError,
    ScoreStore,
};
use serde::{Deserialize, Serialize};

use crate::aggregator::{assess_confidence, stale_warning};
use crate::weights::FactorWeights;

/// Factor moves smaller than this are noise.
const SIGNIFICANT_FACTOR_DELTA: f64 = 3.0;
/// A top factor move at least this large makes the change "significant".
const MAJOR_FACTOR_DELTA: f64 = 10.0;
const UNCHANGED_THRESHOLD: f64 = 0.5;
const MAX_REASONS: usize = 5;

/// The part of a composite score the explainer compares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub overall_score: f64,
    pub factor_scores: BTreeMap<Factor, f64>,
}

impl From<&CompositeScore> for ScoreSnapshot {
    fn from(score: &CompositeScore) -> Self {
        Self {
            overall_score: score.overall_score,
            factor_scores: score.factor_scores.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreChangeReason {
    pub factor: Factor,
    pub previous_score: f64,
    pub current_score: f64,
    pub delta: f64,
    /// `delta` scaled by the factor's weight.
    pub contribution: f64,
    pub explanation: String,
}

/// A factor that has data in only one of the two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", content = "factor", rename_all = "snake_case")]
pub enum CoverageChange {
    Gained(Factor),
    Lost(Factor),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreChangeExplanation {
    pub ticker: String,
    pub previous_score: Option<f64>,
    pub current_score: f64,
    pub delta: f64,
    pub reasons: Vec<ScoreChangeReason>,
    pub coverage_changes: Vec<CoverageChange>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorDataStatus {
    pub available: bool,
    pub freshness: FreshnessStatus,
    pub freshness_days: Option<i64>,
    pub warning: Option<String>,
    pub missing_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GranularConfidence {
    pub level: ConfidenceLevel,
    /// Share of factor slots with data, 0-100.
    pub percentage: f64,
    pub factors: BTreeMap<Factor, FactorDataStatus>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ScoreChangeExplainer {
    weights: FactorWeights,
}

impl Default for ScoreChangeExplainer {
    fn default() -> Self {
        Self::standard()
    }
}

impl ScoreChangeExplainer {
    pub fn new(weights: FactorWeights) -> Self {
        Self { weights }
    }

    pub fn standard() -> Self {
        Self::new(FactorWeights::standard())
    }

    pub fn explain_change(
        &self,
        ticker: &str,
        current: &ScoreSnapshot,
        previous: Option<&ScoreSnapshot>,
    ) -> ScoreChangeExplanation {
        self.explain_weighted(ticker, current, previous, |factor| self.weights.get(factor))
    }

    /// Contributions use `weight_of` instead of the explainer's own table.
    fn explain_weighted<W>(
        &self,
        ticker: &str,
        current: &ScoreSnapshot,
        previous: Option<&ScoreSnapshot>,
        weight_of: W,
    ) -> ScoreChangeExplanation
    where
        W: Fn(&Factor) -> f64,
    {
        let Some(previous) = previous else {
            return ScoreChangeExplanation {
                ticker: ticker.to_string(),
                previous_score: None,
                current_score: current.overall_score,
                delta: 0.0,
                reasons: Vec::new(),
                coverage_changes: Vec::new(),
                summary: format!(
                    "{ticker}'s first IC Score is {:.1}; no prior score to compare",
                    current.overall_score
                ),
            };
        };

        let mut reasons = Vec::new();
        let mut coverage_changes = Vec::new();

        for (factor, &now) in &current.factor_scores {
            match previous.factor_scores.get(factor) {
                Some(&before) => {
                    let delta = now - before;
                    if delta.abs() < SIGNIFICANT_FACTOR_DELTA {
                        continue;
                    }
                    reasons.push(ScoreChangeReason {
                        factor: factor.clone(),
                        previous_score: before,
                        current_score: now,
                        delta,
                        contribution: delta * weight_of(factor),
                        explanation: explanation_for(factor, delta),
                    });
                }
                None => coverage_changes.push(CoverageChange::Gained(factor.clone())),
            }
        }
        for factor in previous.factor_scores.keys() {
            if !current.factor_scores.contains_key(factor) {
                coverage_changes.push(CoverageChange::Lost(factor.clone()));
            }
        }

        reasons.sort_by(|a, b| {
            b.contribution
                .abs()
                .total_cmp(&a.contribution.abs())
                .then_with(|| a.factor.cmp(&b.factor))
        });
        reasons.truncate(MAX_REASONS);

        let delta = current.overall_score - previous.overall_score;
        let summary = summarize(ticker, delta, &reasons);

        ScoreChangeExplanation {
            ticker: ticker.to_string(),
            previous_score: Some(previous.overall_score),
            current_score: current.overall_score,
            delta,
            reasons,
            coverage_changes,
            summary,
        }
    }

    /// Explain `current` against the most recent stored score before it.
    ///
    /// Contributions are weighted with the weights `current` was aggregated
    /// with; the explainer's table applies only when none were recorded.
    pub async fn explain_latest<S>(
        &self,
        store: &S,
        current: &CompositeScore,
    ) -> Result<ScoreChangeExplanation, ScoreError>
    where
        S: ScoreStore + ?Sized,
    {
        let previous = store.latest_before(&current.ticker, current.date).await?;
        let previous = previous.as_ref().map(ScoreSnapshot::from);
        let snapshot = ScoreSnapshot::from(current);
        if current.weights_used.is_empty() {
            return Ok(self.explain_change(&current.ticker, &snapshot, previous.as_ref()));
        }
        Ok(self.explain_weighted(&current.ticker, &snapshot, previous.as_ref(), |factor| {
            current.weights_used.get(factor).copied().unwrap_or(0.0)
        }))
    }

    /// Per-factor data availability and freshness for one snapshot.
    ///
    /// Covers the thirteen canonical slots plus any custom factor present in
    /// the snapshot. Completeness and staleness are scored the same way the
    /// aggregator scores them.
    pub async fn granular_confidence<F>(
        &self,
        ticker: &str,
        snapshot: &ScoreSnapshot,
        as_of: NaiveDate,
        freshness: &F,
    ) -> GranularConfidence
    where
        F: FreshnessProvider + ?Sized,
    {
        let mut slots: Vec<Factor> = Factor::ALL.to_vec();
        for factor in snapshot.factor_scores.keys() {
            if !slots.contains(factor) {
                slots.push(factor.clone());
            }
        }

        let mut factors = BTreeMap::new();
        let mut stale = Vec::new();
        let mut available_count = 0usize;

        for factor in &slots {
            if !snapshot.factor_scores.contains_key(factor) {
                factors.insert(
                    factor.clone(),
                    FactorDataStatus {
                        available: false,
                        freshness: FreshnessStatus::Unknown,
                        freshness_days: None,
                        warning: None,
                        missing_reason: Some(missing_reason(factor).to_string()),
                    },
                );
                continue;
            }

            available_count += 1;
            let data_date = freshness.latest_data_date(ticker, factor).await;
            let days = data_date.map(|d| (as_of - d).num_days());
            let status = FreshnessStatus::from_dates(data_date, as_of);
            let warning = match status {
                FreshnessStatus::Recent => days.map(|d| format!("Data is {d} days old")),
                FreshnessStatus::Stale => stale_warning(factor, data_date, as_of),
                _ => None,
            };
            if status.is_stale() {
                if let Some(w) = &warning {
                    stale.push(w.clone());
                }
            }
            factors.insert(
                factor.clone(),
                FactorDataStatus {
                    available: true,
                    freshness: status,
                    freshness_days: days,
                    warning,
                    missing_reason: None,
                },
            );
        }

        let completeness = available_count as f64 / slots.len() as f64;
        let assessment = assess_confidence(completeness, stale);

        GranularConfidence {
            level: assessment.level,
            percentage: (completeness * 1000.0).round() / 10.0,
            factors,
            warnings: assessment.warnings,
        }
    }
}

fn explanation_for(factor: &Factor, delta: f64) -> String {
    let up = delta > 0.0;
    let (positive, negative) = match factor {
        Factor::Value => (
            "Stock became more undervalued vs sector peers",
            "Stock became more overvalued vs sector peers",
        ),
        Factor::IntrinsicValue => (
            "Price moved further below estimated fair value",
            "Price moved closer to or above estimated fair value",
        ),
        Factor::HistoricalValue => (
            "Valuation became cheaper than its own history",
            "Valuation became richer than its own history",
        ),
        Factor::Growth => (
            "Revenue and earnings growth improved",
            "Growth metrics declined",
        ),
        Factor::Profitability => ("Profitability margins improved", "Profitability margins contracted"),
        Factor::FinancialHealth => (
            "Balance sheet strength improved",
            "Debt or liquidity metrics worsened",
        ),
        Factor::Momentum => ("Price momentum strengthened", "Price momentum weakened"),
        Factor::Technical => (
            "Technical indicators turned bullish",
            "Technical indicators turned bearish",
        ),
        Factor::AnalystConsensus => ("Analyst ratings upgraded", "Analyst ratings downgraded"),
        Factor::InsiderActivity => ("Insider buying increased", "Insider selling increased"),
        Factor::Institutional => (
            "Institutional ownership increased",
            "Institutional ownership decreased",
        ),
        Factor::NewsSentiment => ("News sentiment improved", "News sentiment worsened"),
        Factor::EarningsRevisions => (
            "Analysts revised earnings estimates up",
            "Analysts revised earnings estimates down",
        ),
        Factor::Custom(_) => {
            let name = capitalize(&factor.display_name());
            return if up {
                format!("{name} improved")
            } else {
                format!("{name} declined")
            };
        }
    };
    let text = if up { positive } else { negative };
    text.to_string()
}

fn missing_reason(factor: &Factor) -> &'static str {
    match factor {
        Factor::Value => "Missing valuation data (P/E, P/B, P/S)",
        Factor::IntrinsicValue => "No fair value estimate",
        Factor::HistoricalValue => "Insufficient valuation history",
        Factor::Growth => "Insufficient historical financial data",
        Factor::Profitability => "Missing profitability metrics",
        Factor::FinancialHealth => "Missing balance sheet data",
        Factor::Momentum => "Missing price data",
        Factor::Technical => "Missing technical indicators",
        Factor::AnalystConsensus => "No analyst coverage",
        Factor::InsiderActivity => "No insider trades reported",
        Factor::Institutional => "No institutional holdings data",
        Factor::NewsSentiment => "No recent news articles",
        Factor::EarningsRevisions => "No earnings estimate history",
        Factor::Custom(_) => "Data not available",
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn summarize(ticker: &str, delta: f64, reasons: &[ScoreChangeReason]) -> String {
    if delta.abs() < UNCHANGED_THRESHOLD {
        return format!("{ticker}'s IC Score is unchanged");
    }
    let direction = if delta > 0.0 { "improved" } else { "declined" };
    let Some(top) = reasons.first() else {
        return format!("{ticker}'s IC Score {direction} slightly ({delta:+.1} points)");
    };
    let qualifier = if top.delta.abs() >= MAJOR_FACTOR_DELTA {
        " significantly"
    } else {
        ""
    };
    format!(
        "{ticker}'s IC Score {direction}{qualifier} ({delta:+.1} points), primarily due to {} ({:+.1})",
        top.factor.display_name(),
        top.delta
    )
}
