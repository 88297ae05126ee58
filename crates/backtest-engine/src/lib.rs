pub mod engine;
pub mod error;
pub mod metrics;
pub mod models;
pub mod periods;
pub mod portfolio;
pub mod report;

#[cfg(test)]
mod tests;

pub use engine::{aggregate_results, BacktestEngine};
pub use error::{BacktestError, BacktestResult};
pub use metrics::{calculate_max_drawdown, calculate_monotonicity};
pub use models::*;
pub use periods::generate_periods;
pub use portfolio::{calculate_portfolio_return, calculate_turnover, create_decile_portfolios};
pub use report::{BacktestReport, DecilePerformance};
