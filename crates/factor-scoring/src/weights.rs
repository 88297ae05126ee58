use std::collections::BTreeMap;

use score_core::{Factor, LifecycleStage, ScoreError};
use serde::{Deserialize, Serialize};

/// Weight per factor.
///
/// Backed by an ordered map so every sum over the weights runs in the same
/// order, which keeps repeated aggregations bit-identical.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorWeights(BTreeMap<Factor, f64>);

impl FactorWeights {
    /// Validated weights: every entry finite and non-negative, total positive.
    pub fn new(weights: BTreeMap<Factor, f64>) -> Result<Self, ScoreError> {
        if let Some((factor, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(ScoreError::InvalidConfig(format!(
                "weight for {factor} must be finite and non-negative, got {w}"
            )));
        }
        let total: f64 = weights.values().sum();
        if total <= 0.0 {
            return Err(ScoreError::InvalidConfig(
                "factor weights must sum to a positive total".to_string(),
            ));
        }
        Ok(Self(weights))
    }

    /// Base weights of the thirteen canonical factors. Sums to 1.0.
    pub fn standard() -> Self {
        let weights = [
            (Factor::Value, 0.10),
            (Factor::IntrinsicValue, 0.08),
            (Factor::HistoricalValue, 0.06),
            (Factor::Growth, 0.14),
            (Factor::Profitability, 0.13),
            (Factor::FinancialHealth, 0.10),
            (Factor::Momentum, 0.08),
            (Factor::Technical, 0.06),
            (Factor::AnalystConsensus, 0.06),
            (Factor::InsiderActivity, 0.04),
            (Factor::Institutional, 0.05),
            (Factor::NewsSentiment, 0.04),
            (Factor::EarningsRevisions, 0.06),
        ];
        Self(weights.into_iter().collect())
    }

    pub fn get(&self, factor: &Factor) -> f64 {
        self.0.get(factor).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Factor, &f64)> {
        self.0.iter()
    }

    /// Factors carrying a positive weight.
    pub fn active_factors(&self) -> impl Iterator<Item = &Factor> {
        self.0.iter().filter(|(_, w)| **w > 0.0).map(|(f, _)| f)
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Same proportions, rescaled to sum to 1.0.
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= 0.0 {
            return self.clone();
        }
        Self(self.0.iter().map(|(f, w)| (f.clone(), w / total)).collect())
    }

    pub fn as_map(&self) -> &BTreeMap<Factor, f64> {
        &self.0
    }

    pub fn into_map(self) -> BTreeMap<Factor, f64> {
        self.0
    }
}

/// Base weights plus the per-stage multipliers applied on top of them.
///
/// Immutable once built; share one table between classifiers, or build a
/// separate table per backtest to compare weighting schemes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    base: FactorWeights,
    multipliers: BTreeMap<LifecycleStage, BTreeMap<Factor, f64>>,
}

impl WeightTable {
    pub fn new(
        base: FactorWeights,
        multipliers: BTreeMap<LifecycleStage, BTreeMap<Factor, f64>>,
    ) -> Result<Self, ScoreError> {
        for (stage, table) in &multipliers {
            if let Some((factor, m)) = table.iter().find(|(_, m)| !m.is_finite() || **m <= 0.0) {
                return Err(ScoreError::InvalidConfig(format!(
                    "{stage} multiplier for {factor} must be finite and positive, got {m}"
                )));
            }
        }
        let base = FactorWeights::new(base.into_map())?;
        Ok(Self { base, multipliers })
    }

    pub fn standard() -> Self {
        use Factor::*;
        use LifecycleStage as S;

        let table: [(LifecycleStage, &[(Factor, f64)]); 5] = [
            (
                S::Hypergrowth,
                &[(Growth, 1.4), (Profitability, 0.6), (Value, 0.5), (IntrinsicValue, 0.5)],
            ),
            (S::Growth, &[(Growth, 1.2), (Profitability, 0.9), (Value, 0.8)]),
            (
                S::Mature,
                &[(Profitability, 1.1), (Value, 1.1), (FinancialHealth, 1.1)],
            ),
            (
                S::Value,
                &[(Value, 1.3), (Profitability, 1.1), (Growth, 0.7), (IntrinsicValue, 1.2)],
            ),
            (
                S::Turnaround,
                &[(FinancialHealth, 1.3), (Momentum, 1.2), (Value, 1.2)],
            ),
        ];

        let multipliers = table
            .iter()
            .map(|(stage, entries)| (*stage, entries.iter().cloned().collect()))
            .collect();

        Self {
            base: FactorWeights::standard(),
            multipliers,
        }
    }

    pub fn base(&self) -> &FactorWeights {
        &self.base
    }

    /// Multiplier for `factor` in `stage`; 1.0 when the stage leaves it alone.
    pub fn multiplier(&self, stage: LifecycleStage, factor: &Factor) -> f64 {
        self.multipliers
            .get(&stage)
            .and_then(|m| m.get(factor))
            .copied()
            .unwrap_or(1.0)
    }

    /// Apply the stage multipliers to `weights` and renormalize the whole set,
    /// untouched factors included, back to a total of 1.0.
    pub fn adjust(&self, weights: &FactorWeights, stage: LifecycleStage) -> FactorWeights {
        let scaled: BTreeMap<Factor, f64> = weights
            .iter()
            .map(|(factor, w)| (factor.clone(), w * self.multiplier(stage, factor)))
            .collect();
        FactorWeights(scaled).normalized()
    }

    /// Stage-adjusted base weights.
    pub fn for_stage(&self, stage: LifecycleStage) -> FactorWeights {
        self.adjust(&self.base, stage)
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::standard()
    }
}
