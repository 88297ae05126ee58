//! JSON fixture: the data a run would otherwise pull from the data services.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use factor_scoring::TickerInput;
use score_core::{
    CompositeScore, InMemoryPriceHistory, InMemoryScoreStore, InMemorySectorStats, ScoreStore,
    SectorStatistics,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Sector data either as precomputed statistics or as raw peer values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectorInput {
    Samples {
        sector: String,
        metric_name: String,
        values: Vec<f64>,
    },
    Statistics(SectorStatistics),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub prices: BTreeMap<String, Vec<PricePoint>>,
    #[serde(default)]
    pub sector_stats: Vec<SectorInput>,
    /// Historical composite scores to seed the store with.
    #[serde(default)]
    pub scores: Vec<CompositeScore>,
    /// Tickers to score in this run.
    #[serde(default)]
    pub tickers: Vec<TickerInput>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse fixture {}", path.display()))
    }

    pub fn price_history(&self) -> InMemoryPriceHistory {
        let history = InMemoryPriceHistory::new();
        for (ticker, points) in &self.prices {
            history.extend(ticker, points.iter().map(|p| (p.date, p.close)));
        }
        history
    }

    pub fn sector_statistics(&self) -> InMemorySectorStats {
        let stats = InMemorySectorStats::new();
        for input in &self.sector_stats {
            match input {
                SectorInput::Statistics(s) => stats.insert(s.clone()),
                SectorInput::Samples {
                    sector,
                    metric_name,
                    values,
                } => match SectorStatistics::from_values(sector, metric_name, values) {
                    Some(s) => stats.insert(s),
                    None => tracing::warn!(
                        %sector,
                        metric = %metric_name,
                        samples = values.len(),
                        "Too few peer values for sector statistics, skipping"
                    ),
                },
            }
        }
        stats
    }

    pub async fn seed_scores(&self, store: &InMemoryScoreStore) -> Result<usize> {
        for score in &self.scores {
            store
                .upsert(score.clone())
                .await
                .with_context(|| format!("Failed to seed score for {}", score.ticker))?;
        }
        Ok(self.scores.len())
    }

    /// Earliest score or input date to latest price date.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let start = self
            .scores
            .iter()
            .map(|s| s.date)
            .chain(self.tickers.iter().map(|t| t.as_of))
            .min()?;
        let end = self.prices.values().flatten().map(|p| p.date).max()?;
        Some((start, end))
    }
}
