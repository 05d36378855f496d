//! Error types for qarun

use thiserror::Error;

/// Result type alias using the qarun Error
pub type Result<T> = std::result::Result<T, Error>;

/// qarun error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Ledger error: {0}")]
    Ledger(String),
}
