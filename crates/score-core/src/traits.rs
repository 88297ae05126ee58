use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{CompositeScore, Factor, ScoreError, SectorStatistics};

/// Source of historical closing prices.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Latest close at or before `date`, or `None` when the ticker has no
    /// price by then. Missing data is never an error.
    async fn close_at_or_before(&self, ticker: &str, date: NaiveDate) -> Option<f64>;
}

/// Source of per-sector metric distributions.
#[async_trait]
pub trait SectorStatsProvider: Send + Sync {
    async fn sector_stats(&self, sector: &str, metric_name: &str) -> Option<SectorStatistics>;
}

/// Historical composite scores, keyed by `(ticker, date)`.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    /// Insert or replace the score stored for `(score.ticker, score.date)`.
    async fn upsert(&self, score: CompositeScore) -> Result<(), ScoreError>;

    /// Most recent score strictly before `date`.
    async fn latest_before(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<Option<CompositeScore>, ScoreError>;

    /// For each ticker, its latest score at or before `date`. An empty
    /// universe means every ticker in the store. Results are ordered by ticker.
    async fn scores_as_of(
        &self,
        date: NaiveDate,
        universe: &[String],
    ) -> Result<Vec<CompositeScore>, ScoreError>;
}

/// Date of the newest input behind each factor.
#[async_trait]
pub trait FreshnessProvider: Send + Sync {
    async fn latest_data_date(&self, ticker: &str, factor: &Factor) -> Option<NaiveDate>;
}
