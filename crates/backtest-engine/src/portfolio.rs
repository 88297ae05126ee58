//! Decile portfolio construction, returns and turnover.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use futures_util::future::join_all;
use score_core::PriceProvider;

pub const NUM_DECILES: u8 = 10;

/// Sort tickers by score (descending, ties by ticker) and cut them into ten
/// near-equal deciles, 1 being the best. With `n` tickers, decile `i` holds
/// `n / 10` of them plus one more while `i <= n % 10`.
///
/// Every decile key is present for a non-empty input.
pub fn create_decile_portfolios(scores: &BTreeMap<String, f64>) -> BTreeMap<u8, Vec<String>> {
    if scores.is_empty() {
        return BTreeMap::new();
    }

    let mut ranked: Vec<(&String, f64)> = scores.iter().map(|(t, s)| (t, *s)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let n = ranked.len();
    let base = n / NUM_DECILES as usize;
    let extra = n % NUM_DECILES as usize;

    let mut deciles = BTreeMap::new();
    let mut ranked = ranked.into_iter();
    for decile in 1..=NUM_DECILES {
        let size = base + usize::from((decile as usize) <= extra);
        let members: Vec<String> = ranked.by_ref().take(size).map(|(t, _)| t.clone()).collect();
        deciles.insert(decile, members);
    }
    deciles
}

/// Simple return between two closes. Missing or non-positive prices are
/// unresolvable.
pub fn ticker_return(start_price: Option<f64>, end_price: Option<f64>) -> Option<f64> {
    match (start_price, end_price) {
        (Some(s), Some(e)) if s > 0.0 && e > 0.0 && s.is_finite() && e.is_finite() => Some(e / s - 1.0),
        _ => None,
    }
}

/// Fetch the `[start, end)` return of every ticker concurrently.
pub async fn fetch_ticker_returns<P>(
    prices: &P,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
) -> BTreeMap<String, Option<f64>>
where
    P: PriceProvider + ?Sized,
{
    let fetches = tickers.iter().map(|ticker| async move {
        let start_price = prices.close_at_or_before(ticker, start).await;
        let end_price = prices.close_at_or_before(ticker, end).await;
        (ticker.clone(), ticker_return(start_price, end_price))
    });
    join_all(fetches).await.into_iter().collect()
}

/// Equal-weight return of `holdings` net of a one-off cost drag, floored at
/// a total loss. Unresolvable tickers drop out of the average; with none
/// resolvable the return is 0.
pub fn portfolio_return(
    holdings: &[String],
    returns: &BTreeMap<String, Option<f64>>,
    cost_drag: f64,
) -> f64 {
    let resolved: Vec<f64> = holdings
        .iter()
        .filter_map(|t| returns.get(t).copied().flatten())
        .collect();
    if resolved.is_empty() {
        return 0.0;
    }
    (resolved.iter().sum::<f64>() / resolved.len() as f64 - cost_drag).max(-1.0)
}

pub async fn calculate_portfolio_return<P>(
    prices: &P,
    tickers: &[String],
    start: NaiveDate,
    end: NaiveDate,
    transaction_cost_bps: f64,
    slippage_bps: f64,
) -> f64
where
    P: PriceProvider + ?Sized,
{
    let returns = fetch_ticker_returns(prices, tickers, start, end).await;
    portfolio_return(tickers, &returns, (transaction_cost_bps + slippage_bps) / 10_000.0)
}

/// Share of `current` not held in `previous`. A fresh portfolio is full
/// turnover; an empty one is none.
pub fn calculate_turnover(previous: &[String], current: &[String]) -> f64 {
    if current.is_empty() {
        return 0.0;
    }
    if previous.is_empty() {
        return 1.0;
    }
    let previous: HashSet<&String> = previous.iter().collect();
    let current: HashSet<&String> = current.iter().collect();
    let new_names = current.iter().filter(|t| !previous.contains(*t)).count();
    new_names as f64 / current.len() as f64
}
