use score_core::ScoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Invalid backtest config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Score(#[from] ScoreError),
}

pub type BacktestResult<T> = Result<T, BacktestError>;
