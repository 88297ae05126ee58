use std::collections::BTreeMap;

use score_core::{LifecycleStage, ScoreError};
use serde::{Deserialize, Serialize};

use crate::weights::{FactorWeights, WeightTable};

/// Inputs to lifecycle classification, all in percent except `pe_ratio`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LifecycleMetrics {
    pub revenue_growth_yoy: Option<f64>,
    pub net_margin: Option<f64>,
    pub pe_ratio: Option<f64>,
}

/// One reported fiscal quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterlyFinancials {
    pub fiscal_year: i32,
    pub fiscal_quarter: u8,
    pub revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub eps: Option<f64>,
}

impl LifecycleMetrics {
    /// Derive the metrics from quarterly financials, newest quarter first.
    ///
    /// Revenue growth compares the trailing four quarters with the four before
    /// them. Each window needs at least three reported quarters and is scaled
    /// up to a full year when one is missing.
    pub fn from_quarterly(
        quarters: &[QuarterlyFinancials],
        price: Option<f64>,
    ) -> Result<Self, ScoreError> {
        if quarters.len() < 4 {
            return Err(ScoreError::InsufficientData(format!(
                "need at least 4 quarters to classify lifecycle, got {}",
                quarters.len()
            )));
        }

        fn sum_ttm(quarters: &[QuarterlyFinancials], accessor: fn(&QuarterlyFinancials) -> Option<f64>) -> Option<f64> {
            let values: Vec<f64> = quarters.iter().filter_map(accessor).collect();
            if values.is_empty() { None } else { Some(values.iter().sum()) }
        }

        let ttm = &quarters[..4];
        let ttm_revenue = sum_ttm(ttm, |q| q.revenue);
        let ttm_net_income = sum_ttm(ttm, |q| q.net_income);
        let ttm_eps = sum_ttm(ttm, |q| q.eps);

        let revenue_growth_yoy = if quarters.len() >= 5 {
            let prior = &quarters[4..quarters.len().min(8)];
            let current_count = ttm.iter().filter(|q| q.revenue.is_some()).count();
            let prior_count = prior.iter().filter(|q| q.revenue.is_some()).count();
            let current_ttm: f64 = ttm.iter().filter_map(|q| q.revenue).sum();
            let prior_ttm: f64 = prior.iter().filter_map(|q| q.revenue).sum();
            if current_count >= 3 && prior_count >= 3 && prior_ttm > 0.0 {
                let current_norm = current_ttm / current_count as f64 * 4.0;
                let prior_norm = prior_ttm / prior_count as f64 * 4.0;
                Some((current_norm - prior_norm) / prior_norm * 100.0)
            } else {
                None
            }
        } else {
            None
        };

        let net_margin = match (ttm_net_income, ttm_revenue) {
            (Some(ni), Some(rev)) if rev > 0.0 => Some(ni / rev * 100.0),
            _ => None,
        };

        let pe_ratio = match (price, ttm_eps) {
            (Some(p), Some(eps)) if p > 0.0 && eps > 0.0 => Some(p / eps),
            _ => None,
        };

        Ok(Self {
            revenue_growth_yoy,
            net_margin,
            pe_ratio,
        })
    }

    /// Present inputs by name.
    fn present(&self) -> BTreeMap<String, f64> {
        [
            ("revenue_growth_yoy", self.revenue_growth_yoy),
            ("net_margin", self.net_margin),
            ("pe_ratio", self.pe_ratio),
        ]
        .into_iter()
        .filter_map(|(name, v)| v.filter(|x| x.is_finite()).map(|x| (name.to_string(), x)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleClassification {
    pub stage: LifecycleStage,
    pub confidence: f64,
    pub metrics_used: BTreeMap<String, f64>,
    pub adjusted_weights: FactorWeights,
}

/// Assigns a lifecycle stage and the matching factor weights.
#[derive(Debug, Clone, Default)]
pub struct LifecycleClassifier {
    table: WeightTable,
}

impl LifecycleClassifier {
    pub fn new(table: WeightTable) -> Self {
        Self { table }
    }

    pub fn weight_table(&self) -> &WeightTable {
        &self.table
    }

    /// First matching rule wins; missing inputs never match.
    pub fn classify(&self, metrics: &LifecycleMetrics) -> LifecycleClassification {
        let (stage, confidence) = Self::stage_for(metrics);
        LifecycleClassification {
            stage,
            confidence,
            metrics_used: metrics.present(),
            adjusted_weights: self.table.for_stage(stage),
        }
    }

    pub fn adjust_weights(&self, base: &FactorWeights, stage: LifecycleStage) -> FactorWeights {
        self.table.adjust(base, stage)
    }

    fn stage_for(metrics: &LifecycleMetrics) -> (LifecycleStage, f64) {
        let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
        let growth = finite(metrics.revenue_growth_yoy);
        let margin = finite(metrics.net_margin);
        let pe = finite(metrics.pe_ratio);

        if let Some(g) = growth {
            if g > 50.0 {
                return (LifecycleStage::Hypergrowth, (0.7 + (g - 50.0) / 50.0).min(0.99));
            }
            if g > 20.0 {
                return (LifecycleStage::Growth, (0.6 + (g - 20.0) / 60.0).min(0.95));
            }
            if g <= -5.0 {
                return (LifecycleStage::Turnaround, (0.5 + g.abs() / 20.0).min(0.99));
            }
        }

        if let (Some(m), Some(p)) = (margin, pe) {
            if m > 5.0 && p < 12.0 {
                let confidence = 0.5 + (12.0 - p) / 12.0 * 0.3 + (m / 20.0).min(0.5);
                return (LifecycleStage::Value, confidence.min(0.99));
            }
        }

        let steady = matches!(growth, Some(g) if g > 0.0 && g < 15.0)
            && matches!(margin, Some(m) if m > 0.0);
        (LifecycleStage::Mature, if steady { 0.8 } else { 0.6 })
    }
}
