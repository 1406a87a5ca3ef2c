//! Scheduling capability and its implementations.
//!
//! The authoritative algorithm runs in a remote scoring service. When it
//! cannot be reached, [`ResilientScheduler`] degrades to the local
//! [`FallbackScheduler`]; only authorization failures reach the caller.

pub mod breaker;
pub mod fallback;
pub mod remote;
pub mod resilient;

pub use breaker::CircuitBreaker;
pub use fallback::{FallbackScheduler, compute_next_review};
pub use remote::RemoteScheduler;
pub use resilient::ResilientScheduler;

use crate::models::{MemoryState, Rating, ReviewLog, ScheduleUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// New memory state for a card plus the audit record describing the change.
#[derive(Clone, Debug, PartialEq)]
pub struct ReviewOutcome {
    pub update: ScheduleUpdate,
    pub log: ReviewLog,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("scheduler rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("scheduler request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Transport(String),

    #[error("scheduler server error {0}: {1}")]
    Server(u16, String),

    #[error("scheduler rejected request {0}: {1}")]
    Rejected(u16, String),

    #[error("invalid scheduler response: {0}")]
    InvalidResponse(String),
}

impl SchedulerError {
    /// Whether the local fallback may stand in for the failed call.
    /// Credentials problems must not be papered over with a different
    /// schedule, everything else may.
    pub fn allows_fallback(&self) -> bool {
        !matches!(self, SchedulerError::Unauthorized(_))
    }
}

/// Computes the next memory state of a card for a rating.
#[async_trait]
pub trait Scheduler: Send + Sync {
    fn name(&self) -> &str;

    async fn schedule(
        &self,
        card: &MemoryState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, SchedulerError>;
}
