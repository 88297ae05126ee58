use std::collections::BTreeMap;

use chrono::NaiveDate;
use score_core::stats::{clamp_score, round_to};
use score_core::{CompositeScore, ConfidenceLevel, Factor, FactorScore, Rating, ScoreError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::weights::FactorWeights;

/// Thresholds below which the aggregator refuses to produce a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Minimum fraction of weighted factors that must have data.
    pub min_coverage: f64,
    /// Minimum number of core factors (value, growth, profitability,
    /// financial health) that must have data. Zero disables the check.
    pub min_core_factors: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            min_coverage: 0.4,
            min_core_factors: 2,
        }
    }
}

impl AggregatorConfig {
    pub fn validate(&self) -> Result<(), ScoreError> {
        if !(0.0..=1.0).contains(&self.min_coverage) {
            return Err(ScoreError::InvalidConfig(format!(
                "min_coverage must be within [0, 1], got {}",
                self.min_coverage
            )));
        }
        if self.min_core_factors > Factor::CORE.len() {
            return Err(ScoreError::InvalidConfig(format!(
                "min_core_factors cannot exceed {}, got {}",
                Factor::CORE.len(),
                self.min_core_factors
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceAssessment {
    pub level: ConfidenceLevel,
    pub completeness: f64,
    pub warnings: Vec<String>,
}

/// Confidence tier from data completeness, dropped one tier when any factor
/// has stale data. Each stale factor contributes one warning.
pub fn assess_confidence(completeness: f64, stale_warnings: Vec<String>) -> ConfidenceAssessment {
    let mut level = ConfidenceLevel::from_completeness(completeness);
    if !stale_warnings.is_empty() {
        level = level.downgrade();
    }
    ConfidenceAssessment {
        level,
        completeness,
        warnings: stale_warnings,
    }
}

/// Staleness warning for one factor, or `None` when its data is not stale.
pub(crate) fn stale_warning(factor: &Factor, data_date: Option<NaiveDate>, as_of: NaiveDate) -> Option<String> {
    let date = data_date?;
    let days = (as_of - date).num_days();
    if days > score_core::FreshnessStatus::STALE_DAYS {
        Some(format!("{factor}: data is {days} days old (may be outdated)"))
    } else {
        None
    }
}

/// Combines factor scores into a composite IC Score.
#[derive(Debug, Clone, Default)]
pub struct ScoreAggregator {
    config: AggregatorConfig,
}

impl ScoreAggregator {
    pub fn new(config: AggregatorConfig) -> Result<Self, ScoreError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Weighted average of the available factor scores.
    ///
    /// The factor universe is every factor with a positive weight. Factors
    /// without data are excluded and listed in `excluded_factors`; the
    /// remaining weights are rescaled to sum to 1.0. Returns
    /// `InsufficientData` when coverage or core-factor thresholds are not met.
    pub fn aggregate(
        &self,
        ticker: &str,
        date: NaiveDate,
        factor_scores: &[FactorScore],
        weights: &FactorWeights,
    ) -> Result<CompositeScore, ScoreError> {
        let universe: Vec<&Factor> = weights.active_factors().collect();
        if universe.is_empty() {
            return Err(ScoreError::InvalidConfig("no factor carries a positive weight".to_string()));
        }

        let mut by_factor: BTreeMap<&Factor, &FactorScore> = BTreeMap::new();
        for fs in factor_scores {
            if weights.get(&fs.factor) > 0.0 {
                by_factor.insert(&fs.factor, fs);
            } else {
                debug!(ticker, factor = %fs.factor, "Ignoring factor without weight");
            }
        }

        let available: Vec<(&Factor, f64)> = universe
            .iter()
            .filter_map(|f| {
                by_factor
                    .get(f)
                    .filter(|fs| fs.is_available())
                    .and_then(|fs| fs.score)
                    .map(|s| (*f, s))
            })
            .collect();

        let total = universe.len();
        let completeness = available.len() as f64 / total as f64;
        if completeness < self.config.min_coverage {
            return Err(ScoreError::InsufficientData(format!(
                "{ticker}: only {} of {total} factors have data (minimum coverage {:.0}%)",
                available.len(),
                self.config.min_coverage * 100.0
            )));
        }

        let core_in_universe = universe.iter().filter(|f| f.is_core()).count();
        let core_required = self.config.min_core_factors.min(core_in_universe);
        let core_available = available.iter().filter(|(f, _)| f.is_core()).count();
        if core_available < core_required {
            return Err(ScoreError::InsufficientData(format!(
                "{ticker}: only {core_available} core factors have data, {core_required} required"
            )));
        }

        let weight_sum: f64 = available.iter().map(|(f, _)| weights.get(f)).sum();
        if weight_sum <= 0.0 {
            return Err(ScoreError::InsufficientData(format!(
                "{ticker}: available factors carry no weight"
            )));
        }

        let weights_used: BTreeMap<Factor, f64> = available
            .iter()
            .map(|(f, _)| ((*f).clone(), weights.get(f) / weight_sum))
            .collect();
        let raw_overall: f64 = available
            .iter()
            .map(|(f, score)| score * weights_used.get(*f).copied().unwrap_or(0.0))
            .sum();
        let overall_score = round_to(clamp_score(raw_overall), 2);

        let factor_details: Vec<FactorScore> = universe
            .iter()
            .map(|f| {
                let mut detail = by_factor
                    .get(f)
                    .map(|fs| (*fs).clone())
                    .unwrap_or_else(|| FactorScore::unavailable((*f).clone()));
                detail.weight = weights_used.get(*f).copied().unwrap_or(0.0);
                detail
            })
            .collect();

        let excluded_factors: Vec<Factor> = universe
            .iter()
            .filter(|f| !weights_used.contains_key(**f))
            .map(|f| (*f).clone())
            .collect();

        let stale: Vec<String> = factor_details
            .iter()
            .filter(|d| d.is_available() && d.freshness.is_stale())
            .map(|d| {
                stale_warning(&d.factor, d.data_date, date)
                    .unwrap_or_else(|| format!("{}: data is stale", d.factor))
            })
            .collect();
        let confidence = assess_confidence(completeness, stale);

        let mut warnings = confidence.warnings;
        if !excluded_factors.is_empty() {
            let names: Vec<&str> = excluded_factors.iter().map(|f| f.as_str()).collect();
            warnings.push(format!("Excluded factors without data: {}", names.join(", ")));
        }

        debug!(
            ticker,
            overall_score,
            available = available.len(),
            total,
            "Aggregated composite score"
        );

        Ok(CompositeScore {
            ticker: ticker.to_string(),
            date,
            sector: None,
            overall_score,
            rating: Rating::from_score(overall_score),
            factor_scores: available.iter().map(|(f, s)| ((*f).clone(), *s)).collect(),
            factor_details,
            excluded_factors,
            weights_used,
            confidence_level: confidence.level,
            data_completeness: completeness,
            lifecycle_stage: None,
            warnings,
        })
    }
}
