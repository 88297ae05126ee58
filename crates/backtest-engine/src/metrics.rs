use std::collections::BTreeMap;

use statrs::statistics::Statistics;

/// Largest peak-to-trough fall of the compounded wealth index, as a fraction
/// of the peak.
pub fn calculate_max_drawdown(period_returns: &[f64]) -> f64 {
    let mut wealth = 1.0;
    let mut peak = 1.0;
    let mut max_drawdown: f64 = 0.0;
    for r in period_returns {
        wealth *= 1.0 + r;
        if wealth > peak {
            peak = wealth;
        }
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - wealth) / peak);
        }
    }
    max_drawdown
}

/// Fraction of adjacent decile pairs whose return strictly falls from the
/// better decile to the worse one. Fewer than two deciles scores 0.
pub fn calculate_monotonicity(decile_returns: &BTreeMap<u8, f64>) -> f64 {
    let returns: Vec<f64> = decile_returns.values().copied().collect();
    if returns.len() < 2 {
        return 0.0;
    }
    let pairs = returns.len() - 1;
    let descending = returns.windows(2).filter(|w| w[0] > w[1]).count();
    descending as f64 / pairs as f64
}

pub fn compound_return(period_returns: &[f64]) -> f64 {
    period_returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

/// Annualize a total return earned over `days` calendar days.
pub fn annualized_return(total_return: f64, days: i64) -> f64 {
    if days <= 0 {
        return total_return;
    }
    let growth = 1.0 + total_return;
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(365.25 / days as f64) - 1.0
}

/// Annualized standard deviation of period returns.
pub fn annualized_volatility(period_returns: &[f64], periods_per_year: f64) -> f64 {
    if period_returns.len() < 2 {
        return 0.0;
    }
    period_returns.std_dev() * periods_per_year.sqrt()
}

/// Annualized mean over standard deviation. Also serves as the information
/// ratio when fed excess returns.
pub fn sharpe_ratio(period_returns: &[f64], periods_per_year: f64) -> Option<f64> {
    if period_returns.len() < 2 {
        return None;
    }
    let std_dev = period_returns.std_dev();
    if !std_dev.is_finite() || std_dev <= 1e-12 {
        return None;
    }
    Some(period_returns.mean() / std_dev * periods_per_year.sqrt())
}

/// Root mean square of the losing periods. 0 when nothing lost.
pub fn downside_deviation(period_returns: &[f64]) -> f64 {
    let losses: Vec<f64> = period_returns.iter().copied().filter(|r| *r < 0.0).collect();
    if losses.is_empty() {
        return 0.0;
    }
    losses.quadratic_mean()
}

/// Like Sharpe, but penalizes only downside volatility.
pub fn sortino_ratio(period_returns: &[f64], periods_per_year: f64) -> Option<f64> {
    if period_returns.len() < 2 {
        return None;
    }
    let downside = downside_deviation(period_returns);
    if downside <= 1e-12 {
        return None;
    }
    Some(period_returns.mean() * periods_per_year.sqrt() / downside)
}

/// Annualized return per unit of max drawdown.
pub fn calmar_ratio(annualized_return: f64, max_drawdown: f64) -> Option<f64> {
    (max_drawdown > 1e-12).then(|| annualized_return / max_drawdown)
}

/// Annualized alpha and beta against paired benchmark returns.
pub fn alpha_beta(period_returns: &[f64], benchmark_returns: &[f64], periods_per_year: f64) -> Option<(f64, f64)> {
    if period_returns.len() < 2 || period_returns.len() != benchmark_returns.len() {
        return None;
    }
    let variance = benchmark_returns.variance();
    if !variance.is_finite() || variance <= 1e-12 {
        return None;
    }
    let beta = period_returns.covariance(benchmark_returns) / variance;
    let alpha = period_returns.mean() - beta * benchmark_returns.mean();
    Some((alpha * periods_per_year, beta))
}

/// Annualized standard deviation of returns in excess of the benchmark.
pub fn tracking_error(period_returns: &[f64], benchmark_returns: &[f64], periods_per_year: f64) -> Option<f64> {
    if period_returns.len() < 2 || period_returns.len() != benchmark_returns.len() {
        return None;
    }
    let excess: Vec<f64> = period_returns
        .iter()
        .zip(benchmark_returns)
        .map(|(r, b)| r - b)
        .collect();
    Some(annualized_volatility(&excess, periods_per_year))
}

/// Share of periods with a positive return.
pub fn win_rate(period_returns: &[f64]) -> f64 {
    if period_returns.is_empty() {
        return 0.0;
    }
    period_returns.iter().filter(|r| **r > 0.0).count() as f64 / period_returns.len() as f64
}

/// Longest runs of consecutive gains and losses. A flat period breaks both.
pub fn streaks(period_returns: &[f64]) -> (usize, usize) {
    let (mut wins, mut losses) = (0, 0);
    let (mut max_wins, mut max_losses) = (0, 0);
    for r in period_returns {
        if *r > 0.0 {
            wins += 1;
            losses = 0;
        } else if *r < 0.0 {
            losses += 1;
            wins = 0;
        } else {
            wins = 0;
            losses = 0;
        }
        max_wins = max_wins.max(wins);
        max_losses = max_losses.max(losses);
    }
    (max_wins, max_losses)
}

/// Wealth index after each period, starting from 1.
pub fn cumulative_returns(period_returns: &[f64]) -> Vec<f64> {
    period_returns
        .iter()
        .scan(1.0, |wealth, r| {
            *wealth *= 1.0 + r;
            Some(*wealth)
        })
        .collect()
}
