use thiserror::Error;

use crate::types::JobId;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Staging error in '{batch}' row {row}: {reason}")]
    Staging {
        batch: String,
        row: usize,
        reason: String,
    },

    #[error("Batch '{batch}' is missing column '{column}'")]
    MissingColumn { batch: String, column: String },

    #[error("Invalid month '{0}': expected YYYY-MM")]
    InvalidMonth(String),

    #[error("Invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Job {0} not found")]
    JobNotFound(JobId),

    #[error("Job {0} already finished")]
    JobAlreadyFinished(JobId),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type EtlResult<T> = Result<T, EtlError>;
