//! Batch scoring: sector statistics in, composite scores out.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use futures_util::future::join_all;
use rayon::prelude::*;
use score_core::{
    CompositeScore, Factor, FactorScore, Rating, ScoreError, ScoreStore, SectorStatistics,
    SectorStatsProvider,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregator::ScoreAggregator;
use crate::explainer::ScoreChangeExplainer;
use crate::lifecycle::{LifecycleClassifier, LifecycleMetrics};
use crate::percentile::{is_lower_better, PercentileScore, SectorBenchmark, SectorPercentileScorer};

/// One raw metric feeding a factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricInput {
    pub name: String,
    pub value: Option<f64>,
    /// Overrides the built-in orientation for `name`.
    #[serde(default)]
    pub lower_is_better: Option<bool>,
    /// Used when the sector has no stored distribution for this metric.
    #[serde(default)]
    pub sector_median: Option<f64>,
}

/// Inputs for one factor: raw metrics to normalize against the sector, or a
/// score computed elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorInput {
    pub factor: Factor,
    #[serde(default)]
    pub metrics: Vec<MetricInput>,
    #[serde(default)]
    pub precomputed_score: Option<f64>,
    #[serde(default)]
    pub observed_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerInput {
    pub ticker: String,
    pub sector: String,
    pub as_of: NaiveDate,
    #[serde(default)]
    pub lifecycle: LifecycleMetrics,
    #[serde(default)]
    pub factors: Vec<FactorInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TickerOutcome {
    Scored {
        ticker: String,
        overall_score: f64,
        rating: Rating,
        change_summary: String,
    },
    Insufficient {
        ticker: String,
        reason: String,
    },
    Failed {
        ticker: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub scored: usize,
    pub insufficient: usize,
    pub failed: usize,
    pub outcomes: Vec<TickerOutcome>,
}

type StatsKey = (String, String);

pub struct ScoringPipeline {
    sector_stats: Arc<dyn SectorStatsProvider>,
    store: Arc<dyn ScoreStore>,
    classifier: LifecycleClassifier,
    aggregator: ScoreAggregator,
    explainer: ScoreChangeExplainer,
}

impl ScoringPipeline {
    pub fn new(
        sector_stats: Arc<dyn SectorStatsProvider>,
        store: Arc<dyn ScoreStore>,
        classifier: LifecycleClassifier,
        aggregator: ScoreAggregator,
    ) -> Self {
        let explainer = ScoreChangeExplainer::new(classifier.weight_table().base().clone());
        Self {
            sector_stats,
            store,
            classifier,
            aggregator,
            explainer,
        }
    }

    /// Score every input and upsert the results.
    ///
    /// A ticker without enough data, or one the store rejects, is recorded in
    /// the summary and never stops the batch.
    pub async fn run(&self, inputs: &[TickerInput]) -> PipelineSummary {
        info!(tickers = inputs.len(), "Starting scoring batch");
        let stats = self.fetch_sector_stats(inputs).await;

        let results: Vec<(String, Result<CompositeScore, ScoreError>)> = inputs
            .par_iter()
            .map(|input| (input.ticker.clone(), self.score_ticker(input, &stats)))
            .collect();

        let mut summary = PipelineSummary::default();
        for (ticker, result) in results {
            let outcome = match result {
                Ok(score) => self.persist(score).await,
                Err(ScoreError::InsufficientData(reason)) => {
                    warn!(%ticker, %reason, "Insufficient data, ticker not scored");
                    TickerOutcome::Insufficient { ticker, reason }
                }
                Err(e) => {
                    warn!(%ticker, error = %e, "Scoring failed");
                    TickerOutcome::Failed {
                        ticker,
                        reason: e.to_string(),
                    }
                }
            };
            match outcome {
                TickerOutcome::Scored { .. } => summary.scored += 1,
                TickerOutcome::Insufficient { .. } => summary.insufficient += 1,
                TickerOutcome::Failed { .. } => summary.failed += 1,
            }
            summary.outcomes.push(outcome);
        }

        info!(
            scored = summary.scored,
            insufficient = summary.insufficient,
            failed = summary.failed,
            "Scoring batch complete"
        );
        summary
    }

    /// Score one ticker from already-fetched sector statistics.
    pub fn score_ticker(
        &self,
        input: &TickerInput,
        stats: &HashMap<StatsKey, SectorStatistics>,
    ) -> Result<CompositeScore, ScoreError> {
        let classification = self.classifier.classify(&input.lifecycle);

        let factor_scores: Vec<FactorScore> = input
            .factors
            .iter()
            .map(|fi| {
                let score = match fi.precomputed_score {
                    Some(s) if s.is_finite() => FactorScore::available(fi.factor.clone(), s),
                    _ => {
                        let metric_scores: Vec<PercentileScore> = fi
                            .metrics
                            .iter()
                            .map(|m| score_metric(&input.sector, m, stats))
                            .collect();
                        let mut fs = SectorPercentileScorer::combine(fi.factor.clone(), &metric_scores);
                        if let [single] = fi.metrics.as_slice() {
                            fs.raw_value = single.value;
                        }
                        fs
                    }
                };
                match fi.observed_on {
                    Some(date) => score.observed_on(date, input.as_of),
                    None => score,
                }
            })
            .collect();

        let mut composite = self.aggregator.aggregate(
            &input.ticker,
            input.as_of,
            &factor_scores,
            &classification.adjusted_weights,
        )?;
        composite.sector = Some(input.sector.clone());
        composite.lifecycle_stage = Some(classification.stage);
        Ok(composite)
    }

    async fn persist(&self, score: CompositeScore) -> TickerOutcome {
        let ticker = score.ticker.clone();
        let change_summary = match self.explainer.explain_latest(self.store.as_ref(), &score).await {
            Ok(explanation) => explanation.summary,
            Err(e) => {
                warn!(%ticker, error = %e, "Could not read prior score");
                String::new()
            }
        };
        let (overall_score, rating) = (score.overall_score, score.rating);
        match self.store.upsert(score).await {
            Ok(()) => TickerOutcome::Scored {
                ticker,
                overall_score,
                rating,
                change_summary,
            },
            Err(e) => {
                warn!(%ticker, error = %e, "Failed to store score");
                TickerOutcome::Failed {
                    ticker,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn fetch_sector_stats(&self, inputs: &[TickerInput]) -> HashMap<StatsKey, SectorStatistics> {
        let keys: BTreeSet<StatsKey> = inputs
            .iter()
            .flat_map(|input| {
                input
                    .factors
                    .iter()
                    .filter(|f| f.precomputed_score.is_none())
                    .flat_map(|f| f.metrics.iter())
                    .map(|m| (input.sector.clone(), m.name.clone()))
            })
            .collect();

        let fetches = keys.into_iter().map(|(sector, metric)| async move {
            let stats = self.sector_stats.sector_stats(&sector, &metric).await;
            ((sector, metric), stats)
        });

        join_all(fetches)
            .await
            .into_iter()
            .filter_map(|(key, stats)| stats.map(|s| (key, s)))
            .collect()
    }
}

fn score_metric(
    sector: &str,
    metric: &MetricInput,
    stats: &HashMap<StatsKey, SectorStatistics>,
) -> PercentileScore {
    let benchmark = stats
        .get(&(sector.to_string(), metric.name.clone()))
        .cloned()
        .map(SectorBenchmark::Distribution)
        .or_else(|| metric.sector_median.map(SectorBenchmark::Median));
    let lower_is_better = metric
        .lower_is_better
        .unwrap_or_else(|| is_lower_better(&metric.name));
    SectorPercentileScorer::score(metric.value, benchmark.as_ref(), lower_is_better)
}

#[cfg(test)]
mod tests {
    use super::*;
    use score_core::{InMemoryScoreStore, InMemorySectorStats, LifecycleStage};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn metric(name: &str, value: f64) -> MetricInput {
        MetricInput {
            name: name.to_string(),
            value: Some(value),
            lower_is_better: None,
            sector_median: None,
        }
    }

    fn precomputed(factor: Factor, score: f64) -> FactorInput {
        FactorInput {
            factor,
            metrics: Vec::new(),
            precomputed_score: Some(score),
            observed_on: None,
        }
    }

    fn sector_stats() -> Arc<InMemorySectorStats> {
        let stats = InMemorySectorStats::new();
        let pe: Vec<f64> = (10..=30).map(|v| v as f64).collect();
        stats.insert(SectorStatistics::from_values("Technology", "pe_ratio", &pe).unwrap());
        let roe: Vec<f64> = (0..=20).map(|v| v as f64).collect();
        stats.insert(SectorStatistics::from_values("Technology", "roe", &roe).unwrap());
        Arc::new(stats)
    }

    fn full_input(ticker: &str, as_of: NaiveDate, pe: f64) -> TickerInput {
        let mut factors = vec![
            FactorInput {
                factor: Factor::Value,
                metrics: vec![metric("pe_ratio", pe)],
                precomputed_score: None,
                observed_on: Some(as_of),
            },
            FactorInput {
                factor: Factor::Profitability,
                metrics: vec![metric("roe", 15.0)],
                precomputed_score: None,
                observed_on: None,
            },
        ];
        for f in Factor::ALL.iter().filter(|f| **f != Factor::Value && **f != Factor::Profitability) {
            factors.push(precomputed(f.clone(), 60.0));
        }
        TickerInput {
            ticker: ticker.to_string(),
            sector: "Technology".to_string(),
            as_of,
            lifecycle: LifecycleMetrics {
                revenue_growth_yoy: Some(8.0),
                net_margin: Some(12.0),
                pe_ratio: Some(pe),
            },
            factors,
        }
    }

    #[tokio::test]
    async fn test_pipeline_scores_and_stores() {
        let store = Arc::new(InMemoryScoreStore::new());
        let pipeline = ScoringPipeline::new(
            sector_stats(),
            store.clone(),
            LifecycleClassifier::default(),
            ScoreAggregator::default(),
        );

        let thin = TickerInput {
            ticker: "THIN".to_string(),
            sector: "Technology".to_string(),
            as_of: d(2024, 6, 28),
            lifecycle: LifecycleMetrics::default(),
            factors: vec![precomputed(Factor::Momentum, 70.0)],
        };
        let inputs = vec![full_input("AAPL", d(2024, 6, 28), 20.0), thin];

        let summary = pipeline.run(&inputs).await;
        assert_eq!(summary.scored, 1);
        assert_eq!(summary.insufficient, 1);
        assert_eq!(summary.failed, 0);

        let stored = store.get("AAPL", d(2024, 6, 28)).unwrap();
        assert_eq!(stored.sector.as_deref(), Some("Technology"));
        assert_eq!(stored.lifecycle_stage, Some(LifecycleStage::Mature));
        assert_eq!(stored.data_completeness, 1.0);
        // P/E of 20 sits at the sector median, so value is neutral
        assert!((stored.factor_scores[&Factor::Value] - 50.0).abs() < 1e-9);
        assert!(store.get("THIN", d(2024, 6, 28)).is_none());
    }

    #[tokio::test]
    async fn test_pipeline_explains_against_prior_score() {
        let store = Arc::new(InMemoryScoreStore::new());
        let pipeline = ScoringPipeline::new(
            sector_stats(),
            store.clone(),
            LifecycleClassifier::default(),
            ScoreAggregator::default(),
        );

        pipeline.run(&[full_input("MSFT", d(2024, 5, 31), 28.0)]).await;
        let summary = pipeline.run(&[full_input("MSFT", d(2024, 6, 28), 12.0)]).await;

        match &summary.outcomes[0] {
            TickerOutcome::Scored { change_summary, .. } => {
                assert!(change_summary.contains("improved"), "{change_summary}");
                assert!(change_summary.contains("value"), "{change_summary}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_median_fallback_when_sector_has_no_distribution() {
        let store = Arc::new(InMemoryScoreStore::new());
        let pipeline = ScoringPipeline::new(
            Arc::new(InMemorySectorStats::new()),
            store.clone(),
            LifecycleClassifier::default(),
            ScoreAggregator::default(),
        );

        let mut input = full_input("XOM", d(2024, 6, 28), 6.0);
        input.sector = "Energy".to_string();
        input.factors[0].metrics[0].sector_median = Some(12.0);

        let stats = pipeline.fetch_sector_stats(std::slice::from_ref(&input)).await;
        assert!(stats.is_empty());

        let score = pipeline.score_ticker(&input, &stats).unwrap();
        assert_eq!(score.factor_scores[&Factor::Value], 95.0);
        // roe had neither a distribution nor a median
        assert!(score.excluded_factors.contains(&Factor::Profitability));
    }
}
