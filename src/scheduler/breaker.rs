//! Consecutive-failure circuit breaker for the remote scheduler.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    trial_in_flight: bool,
}

/// Opens after `failure_threshold` consecutive failures and stays open for
/// `cooldown`. Once the cooldown has passed a single trial call is let
/// through; another failure reopens it immediately. A threshold of zero
/// disables the breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn allows(&self, now: Instant) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match state.open_until {
            None => true,
            Some(until) if now < until => false,
            // Half open: exactly one caller gets to try the remote
            Some(_) if state.trial_in_flight => false,
            Some(_) => {
                state.trial_in_flight = true;
                true
            }
        }
    }

    /// Ends a trial call that neither proved nor disproved the remote,
    /// e.g. one rejected for bad credentials.
    pub fn release_trial(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.trial_in_flight = false;
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.open_until.is_some() {
            tracing::info!("Remote scheduler recovered, closing circuit");
        }
        *state = BreakerState::default();
    }

    pub fn record_failure(&self, now: Instant) {
        if self.failure_threshold == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.trial_in_flight = false;
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        if state.consecutive_failures >= self.failure_threshold {
            tracing::warn!(
                failures = state.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Opening circuit to remote scheduler"
            );
            state.open_until = Some(now + self.cooldown);
        }
    }
}
