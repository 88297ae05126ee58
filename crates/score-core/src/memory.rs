//! In-memory collaborators, used by the runner and by tests.
//!
//! Each store is a `DashMap` keyed by ticker (or by sector/metric), so an
//! instance can be shared behind an `Arc` across concurrent tasks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::{
    CompositeScore, Factor, FreshnessProvider, PriceProvider, ScoreError, ScoreStore,
    SectorStatistics, SectorStatsProvider,
};

/// Daily closes per ticker.
#[derive(Debug, Default)]
pub struct InMemoryPriceHistory {
    closes: DashMap<String, BTreeMap<NaiveDate, f64>>,
}

impl InMemoryPriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ticker: &str, date: NaiveDate, close: f64) {
        self.closes
            .entry(ticker.to_string())
            .or_default()
            .insert(date, close);
    }

    pub fn extend<I>(&self, ticker: &str, closes: I)
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        self.closes
            .entry(ticker.to_string())
            .or_default()
            .extend(closes);
    }

    pub fn tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> = self.closes.iter().map(|e| e.key().clone()).collect();
        tickers.sort();
        tickers
    }
}

#[async_trait]
impl PriceProvider for InMemoryPriceHistory {
    async fn close_at_or_before(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        let series = self.closes.get(ticker)?;
        series.range(..=date).next_back().map(|(_, close)| *close)
    }
}

/// Sector distributions keyed by `(sector, metric_name)`.
#[derive(Debug, Default)]
pub struct InMemorySectorStats {
    stats: DashMap<(String, String), SectorStatistics>,
}

impl InMemorySectorStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, stats: SectorStatistics) {
        self.stats
            .insert((stats.sector.clone(), stats.metric_name.clone()), stats);
    }
}

#[async_trait]
impl SectorStatsProvider for InMemorySectorStats {
    async fn sector_stats(&self, sector: &str, metric_name: &str) -> Option<SectorStatistics> {
        self.stats
            .get(&(sector.to_string(), metric_name.to_string()))
            .map(|s| s.value().clone())
    }
}

/// Composite score history, one entry per `(ticker, date)`.
#[derive(Debug, Default)]
pub struct InMemoryScoreStore {
    scores: DashMap<String, BTreeMap<NaiveDate, CompositeScore>>,
}

impl InMemoryScoreStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, ticker: &str, date: NaiveDate) -> Option<CompositeScore> {
        self.scores.get(ticker)?.get(&date).cloned()
    }

    /// Total number of stored rows.
    pub fn len(&self) -> usize {
        self.scores.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ScoreStore for InMemoryScoreStore {
    async fn upsert(&self, score: CompositeScore) -> Result<(), ScoreError> {
        if score.ticker.is_empty() {
            return Err(ScoreError::StoreError("score has an empty ticker".to_string()));
        }
        self.scores
            .entry(score.ticker.clone())
            .or_default()
            .insert(score.date, score);
        Ok(())
    }

    async fn latest_before(
        &self,
        ticker: &str,
        date: NaiveDate,
    ) -> Result<Option<CompositeScore>, ScoreError> {
        Ok(self
            .scores
            .get(ticker)
            .and_then(|history| history.range(..date).next_back().map(|(_, s)| s.clone())))
    }

    async fn scores_as_of(
        &self,
        date: NaiveDate,
        universe: &[String],
    ) -> Result<Vec<CompositeScore>, ScoreError> {
        let latest = |history: &BTreeMap<NaiveDate, CompositeScore>| {
            history.range(..=date).next_back().map(|(_, s)| s.clone())
        };

        let mut out: Vec<CompositeScore> = if universe.is_empty() {
            self.scores.iter().filter_map(|e| latest(e.value())).collect()
        } else {
            universe
                .iter()
                .filter_map(|ticker| self.scores.get(ticker).and_then(|h| latest(h.value())))
                .collect()
        };
        out.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        out.dedup_by(|a, b| a.ticker == b.ticker);
        Ok(out)
    }
}

/// Newest data date per `(ticker, factor)`.
#[derive(Debug, Default)]
pub struct InMemoryFreshness {
    dates: DashMap<(String, Factor), NaiveDate>,
}

impl InMemoryFreshness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ticker: &str, factor: Factor, date: NaiveDate) {
        self.dates.insert((ticker.to_string(), factor), date);
    }
}

#[async_trait]
impl FreshnessProvider for InMemoryFreshness {
    async fn latest_data_date(&self, ticker: &str, factor: &Factor) -> Option<NaiveDate> {
        self.dates
            .get(&(ticker.to_string(), factor.clone()))
            .map(|d| *d.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfidenceLevel, Rating};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn score(ticker: &str, date: NaiveDate, overall: f64) -> CompositeScore {
        CompositeScore {
            ticker: ticker.to_string(),
            date,
            sector: None,
            overall_score: overall,
            rating: Rating::from_score(overall),
            factor_scores: BTreeMap::new(),
            factor_details: Vec::new(),
            excluded_factors: Vec::new(),
            weights_used: BTreeMap::new(),
            confidence_level: ConfidenceLevel::High,
            data_completeness: 1.0,
            lifecycle_stage: None,
            warnings: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_price_lookup_uses_latest_prior_close() {
        let prices = InMemoryPriceHistory::new();
        prices.insert("AAPL", d(2024, 1, 2), 185.0);
        prices.insert("AAPL", d(2024, 1, 5), 181.0);

        assert_eq!(prices.close_at_or_before("AAPL", d(2024, 1, 4)).await, Some(185.0));
        assert_eq!(prices.close_at_or_before("AAPL", d(2024, 1, 5)).await, Some(181.0));
        assert_eq!(prices.close_at_or_before("AAPL", d(2024, 1, 1)).await, None);
        assert_eq!(prices.close_at_or_before("MSFT", d(2024, 1, 5)).await, None);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_per_key() {
        let store = InMemoryScoreStore::new();
        store.upsert(score("AAPL", d(2024, 1, 31), 70.0)).await.unwrap();
        store.upsert(score("AAPL", d(2024, 1, 31), 72.5)).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("AAPL", d(2024, 1, 31)).unwrap().overall_score, 72.5);
    }

    #[tokio::test]
    async fn test_latest_before_is_strict() {
        let store = InMemoryScoreStore::new();
        store.upsert(score("AAPL", d(2024, 1, 31), 70.0)).await.unwrap();
        store.upsert(score("AAPL", d(2024, 2, 29), 74.0)).await.unwrap();

        let prior = store.latest_before("AAPL", d(2024, 2, 29)).await.unwrap().unwrap();
        assert_eq!(prior.date, d(2024, 1, 31));
        assert!(store.latest_before("AAPL", d(2024, 1, 31)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scores_as_of_filters_universe() {
        let store = InMemoryScoreStore::new();
        store.upsert(score("MSFT", d(2024, 1, 31), 60.0)).await.unwrap();
        store.upsert(score("AAPL", d(2024, 1, 31), 70.0)).await.unwrap();
        store.upsert(score("AAPL", d(2024, 3, 1), 40.0)).await.unwrap();
        store.upsert(score("NVDA", d(2024, 3, 1), 90.0)).await.unwrap();

        let all = store.scores_as_of(d(2024, 2, 15), &[]).await.unwrap();
        let tickers: Vec<&str> = all.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAPL", "MSFT"]);
        assert_eq!(all[0].overall_score, 70.0);

        let some = store
            .scores_as_of(d(2024, 3, 1), &["AAPL".to_string(), "TSLA".to_string()])
            .await
            .unwrap();
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].overall_score, 40.0);
    }

    #[tokio::test]
    async fn test_sector_stats_and_freshness_lookup() {
        let sectors = InMemorySectorStats::new();
        let stats = SectorStatistics::from_values("Energy", "pe_ratio", &[8.0, 9.0, 10.0, 11.0, 12.0]).unwrap();
        sectors.insert(stats.clone());
        assert_eq!(sectors.sector_stats("Energy", "pe_ratio").await, Some(stats));
        assert!(sectors.sector_stats("Energy", "roe").await.is_none());

        let freshness = InMemoryFreshness::new();
        freshness.insert("XOM", Factor::Momentum, d(2024, 5, 1));
        assert_eq!(
            freshness.latest_data_date("XOM", &Factor::Momentum).await,
            Some(d(2024, 5, 1))
        );
        assert!(freshness.latest_data_date("XOM", &Factor::Growth).await.is_none());
    }
}
