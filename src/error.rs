//! Error types for the scheduling core

use crate::scheduler::SchedulerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite operation error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested card or deck does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Scheduling error that must not be recovered by the fallback
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the remote scheduler rejected our credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Scheduler(SchedulerError::Unauthorized(_)))
    }
}
