use super::{CircuitBreaker, FallbackScheduler, ReviewOutcome, Scheduler, SchedulerError};
use crate::models::{MemoryState, Rating};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

/// Primary scheduler with graceful degradation to the local fallback.
///
/// Transient failures (timeouts, network errors, 5xx, unexpected 4xx,
/// malformed responses) are logged and answered by [`FallbackScheduler`].
/// Authorization failures are returned to the caller untouched.
pub struct ResilientScheduler {
    primary: Option<Arc<dyn Scheduler>>,
    fallback: FallbackScheduler,
    breaker: CircuitBreaker,
}

impl ResilientScheduler {
    pub fn new(primary: Arc<dyn Scheduler>, breaker: CircuitBreaker) -> Self {
        Self {
            primary: Some(primary),
            fallback: FallbackScheduler,
            breaker,
        }
    }

    /// No remote configured: every review is scheduled locally.
    pub fn local_only() -> Self {
        Self {
            primary: None,
            fallback: FallbackScheduler,
            breaker: CircuitBreaker::disabled(),
        }
    }

    pub async fn schedule(
        &self,
        card: &MemoryState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, SchedulerError> {
        if let Some(primary) = &self.primary {
            if self.breaker.allows(Instant::now()) {
                match primary.schedule(card, rating, now).await {
                    Ok(outcome) => {
                        self.breaker.record_success();
                        tracing::debug!(card_id = %card.id, scheduler = primary.name(), "Review scheduled");
                        return Ok(outcome);
                    }
                    Err(e) if !e.allows_fallback() => {
                        self.breaker.release_trial();
                        tracing::error!(card_id = %card.id, error = %e, "Remote scheduler refused review");
                        return Err(e);
                    }
                    Err(e) => {
                        self.breaker.record_failure(Instant::now());
                        tracing::warn!(
                            card_id = %card.id,
                            %rating,
                            error = %e,
                            "Remote scheduling failed, using local fallback"
                        );
                    }
                }
            } else {
                tracing::debug!(card_id = %card.id, "Circuit open, skipping remote scheduler");
            }
        }

        Ok(self.fallback.outcome(card, rating, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CardState;
    use crate::scheduler::compute_next_review;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails every call with a fixed error and counts how often it was asked.
    struct Failing {
        error: SchedulerError,
        calls: AtomicUsize,
    }

    impl Failing {
        fn new(error: SchedulerError) -> Arc<Self> {
            Arc::new(Self {
                error,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Scheduler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn schedule(
            &self,
            _card: &MemoryState,
            _rating: Rating,
            _now: DateTime<Utc>,
        ) -> Result<ReviewOutcome, SchedulerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(self.error.clone())
        }
    }

    /// Returns the queued errors in order, then keeps failing with a 503.
    struct Scripted {
        errors: std::sync::Mutex<Vec<SchedulerError>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Scheduler for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn schedule(
            &self,
            _card: &MemoryState,
            _rating: Rating,
            _now: DateTime<Utc>,
        ) -> Result<ReviewOutcome, SchedulerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut errors = self.errors.lock().unwrap();
            if errors.is_empty() {
                Err(SchedulerError::Server(503, String::new()))
            } else {
                Err(errors.remove(0))
            }
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn review_card() -> MemoryState {
        let mut card = MemoryState::new("card-1", "deck-1", now());
        card.state = CardState::Review;
        card.difficulty = 2.0;
        card.stability = 10.0;
        card
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let primary = Failing::new(SchedulerError::Timeout);
        let scheduler = ResilientScheduler::new(primary.clone(), CircuitBreaker::disabled());

        let outcome = scheduler.schedule(&review_card(), Rating::Again, now()).await.unwrap();
        assert_eq!(outcome.update, compute_next_review(&review_card(), Rating::Again, now()));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unauthorized_is_surfaced() {
        let primary = Failing::new(SchedulerError::Unauthorized(401));
        let scheduler = ResilientScheduler::new(primary, CircuitBreaker::disabled());

        let err = scheduler.schedule(&review_card(), Rating::Good, now()).await.unwrap_err();
        assert_eq!(err, SchedulerError::Unauthorized(401));
    }

    #[tokio::test]
    async fn test_open_circuit_skips_primary() {
        let primary = Failing::new(SchedulerError::Server(503, String::new()));
        let scheduler =
            ResilientScheduler::new(primary.clone(), CircuitBreaker::new(2, Duration::from_secs(60)));

        for _ in 0..5 {
            assert!(scheduler.schedule(&review_card(), Rating::Good, now()).await.is_ok());
        }
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_failures_do_not_trip_breaker() {
        let primary = Failing::new(SchedulerError::Unauthorized(403));
        let scheduler =
            ResilientScheduler::new(primary.clone(), CircuitBreaker::new(1, Duration::from_secs(60)));

        for _ in 0..3 {
            assert!(scheduler.schedule(&review_card(), Rating::Good, now()).await.is_err());
        }
        assert_eq!(primary.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_failure_on_trial_frees_the_trial() {
        let primary = Arc::new(Scripted {
            errors: std::sync::Mutex::new(vec![
                SchedulerError::Timeout,
                SchedulerError::Unauthorized(401),
            ]),
            calls: AtomicUsize::new(0),
        });
        // Zero cooldown: the circuit is half open right after it trips
        let scheduler = ResilientScheduler::new(primary.clone(), CircuitBreaker::new(1, Duration::ZERO));

        assert!(scheduler.schedule(&review_card(), Rating::Good, now()).await.is_ok());
        assert!(scheduler.schedule(&review_card(), Rating::Good, now()).await.is_err());
        // The refused trial must not keep the circuit shut
        assert!(scheduler.schedule(&review_card(), Rating::Good, now()).await.is_ok());
        assert_eq!(primary.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_local_only() {
        let scheduler = ResilientScheduler::local_only();
        let outcome = scheduler.schedule(&review_card(), Rating::Easy, now()).await.unwrap();
        assert_eq!(outcome.update.state, CardState::Review);
        assert!((outcome.update.stability - 16.0).abs() < 1e-9);
    }
}
