use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::metrics::cumulative_returns;
use crate::models::*;
use crate::portfolio::NUM_DECILES;

/// One decile's row in the performance table, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecilePerformance {
    pub decile: u8,
    pub total_return_percent: f64,
    pub annualized_return_percent: f64,
    pub volatility_percent: f64,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub calmar_ratio: Option<f64>,
    pub max_drawdown_percent: f64,
    pub alpha_percent: Option<f64>,
    pub beta: Option<f64>,
    pub tracking_error_percent: Option<f64>,
    pub win_rate_percent: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub avg_turnover_percent: f64,
    pub avg_holdings: f64,
}

/// Growth of 1 invested in a decile, after each period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumulativePoint {
    pub date: NaiveDate,
    pub value: f64,
    pub period_return: f64,
}

/// Display summary of a finished backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub period: String,
    pub rebalance_frequency: RebalanceFrequency,
    pub num_periods: usize,
    pub failed_periods: usize,
    pub deciles: Vec<DecilePerformance>,
    pub top_decile_cagr_percent: f64,
    pub bottom_decile_cagr_percent: f64,
    pub spread_cagr_percent: f64,
    pub benchmark_cagr_percent: f64,
    pub hit_rate_percent: f64,
    pub monotonicity_score: f64,
    pub top_decile_sharpe: Option<f64>,
    pub top_decile_max_drawdown_percent: f64,
    pub top_decile_alpha_percent: Option<f64>,
    pub top_decile_beta: Option<f64>,
    /// Keyed by decile, ordered by period start.
    pub cumulative_returns: BTreeMap<u8, Vec<CumulativePoint>>,
}

fn pct(value: f64) -> f64 {
    (value * 10_000.0).round() / 100.0
}

fn ratio(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn cumulative_series(period_results: &[PeriodResult]) -> BTreeMap<u8, Vec<CumulativePoint>> {
    let mut by_decile: BTreeMap<u8, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for r in period_results {
        by_decile.entry(r.decile).or_default().insert(r.period_start, r.period_return);
    }
    by_decile
        .into_iter()
        .map(|(decile, periods)| {
            let returns: Vec<f64> = periods.values().copied().collect();
            let points = periods
                .into_iter()
                .zip(cumulative_returns(&returns))
                .map(|((date, period_return), value)| CumulativePoint {
                    date,
                    value,
                    period_return,
                })
                .collect();
            (decile, points)
        })
        .collect()
}

impl BacktestReport {
    pub fn from_results(results: &BacktestResults) -> Self {
        let deciles: Vec<DecilePerformance> = results
            .decile_stats
            .iter()
            .map(|s| DecilePerformance {
                decile: s.decile,
                total_return_percent: pct(s.total_return),
                annualized_return_percent: pct(s.annualized_return),
                volatility_percent: pct(s.volatility),
                sharpe_ratio: s.sharpe_ratio.map(ratio),
                sortino_ratio: s.sortino_ratio.map(ratio),
                calmar_ratio: s.calmar_ratio.map(ratio),
                max_drawdown_percent: pct(s.max_drawdown),
                alpha_percent: s.alpha.map(pct),
                beta: s.beta.map(ratio),
                tracking_error_percent: s.tracking_error.map(pct),
                win_rate_percent: pct(s.win_rate),
                max_consecutive_wins: s.max_consecutive_wins,
                max_consecutive_losses: s.max_consecutive_losses,
                avg_turnover_percent: pct(s.avg_turnover),
                avg_holdings: (s.avg_holdings * 10.0).round() / 10.0,
            })
            .collect();

        let top = results.decile(1);
        let bottom = results.decile(NUM_DECILES);
        let top_cagr = top.map(|s| s.annualized_return).unwrap_or(0.0);
        let bottom_cagr = bottom.map(|s| s.annualized_return).unwrap_or(0.0);

        Self {
            period: format!("{} to {}", results.config.start_date, results.config.end_date),
            rebalance_frequency: results.config.rebalance_frequency,
            num_periods: results.num_periods,
            failed_periods: results.failed_periods.len(),
            deciles,
            top_decile_cagr_percent: pct(top_cagr),
            bottom_decile_cagr_percent: pct(bottom_cagr),
            spread_cagr_percent: pct(top_cagr - bottom_cagr),
            benchmark_cagr_percent: pct(results.benchmark_annualized_return),
            hit_rate_percent: pct(results.hit_rate),
            monotonicity_score: (results.monotonicity_score * 1000.0).round() / 1000.0,
            top_decile_sharpe: top.and_then(|s| s.sharpe_ratio).map(ratio),
            top_decile_max_drawdown_percent: top.map(|s| pct(s.max_drawdown)).unwrap_or(0.0),
            top_decile_alpha_percent: top.and_then(|s| s.alpha).map(pct),
            top_decile_beta: top.and_then(|s| s.beta).map(ratio),
            cumulative_returns: cumulative_series(&results.period_results),
        }
    }

    /// Sectioned JSON view for printing.
    pub fn to_json(&self) -> serde_json::Value {
        let mut sheet = json!({
            "summary": {
                "period": self.period,
                "rebalance_frequency": self.rebalance_frequency,
                "num_periods": self.num_periods,
                "failed_periods": self.failed_periods,
            },
            "signal_quality": {
                "top_decile_cagr_percent": self.top_decile_cagr_percent,
                "bottom_decile_cagr_percent": self.bottom_decile_cagr_percent,
                "spread_cagr_percent": self.spread_cagr_percent,
                "hit_rate_percent": self.hit_rate_percent,
                "monotonicity_score": self.monotonicity_score,
            },
            "top_decile": {
                "sharpe_ratio": self.top_decile_sharpe,
                "max_drawdown_percent": self.top_decile_max_drawdown_percent,
                "alpha_percent": self.top_decile_alpha_percent,
                "beta": self.top_decile_beta,
                "excess_vs_benchmark_percent": self.top_decile_cagr_percent - self.benchmark_cagr_percent,
            },
            "benchmark": {
                "cagr_percent": self.benchmark_cagr_percent,
            },
        });

        sheet["deciles"] = json!(self.deciles);
        sheet["cumulative_returns"] = self
            .cumulative_returns
            .iter()
            .map(|(decile, points)| (format!("d{decile}"), json!(points)))
            .collect::<serde_json::Map<String, serde_json::Value>>()
            .into();
        sheet
    }
}
