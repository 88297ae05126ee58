use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// Too little input to produce a confident result. Callers treat this as
    /// an absent result, not a failure of the run.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Store error: {0}")]
    StoreError(String),
}

impl ScoreError {
    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, ScoreError::InsufficientData(_))
    }
}

pub type ScoreResult<T> = Result<T, ScoreError>;
