//! Local fallback scheduling used when the remote scorer is unavailable.
//!
//! A deliberately simple heuristic, not full FSRS:
//! - AGAIN raises difficulty by 0.8 and shrinks stability by 20%, sending the card to relearning
//! - HARD raises difficulty by 0.15 and grows stability by 20%
//! - GOOD lowers difficulty by 0.1 and grows stability by 30%
//! - EASY lowers difficulty by 0.2 and grows stability by 60%, always landing in review
//! - Difficulty stays within [0, 10], stability never drops below 0.1 days
//! - The next review is `round(max(1, stability))` days away

use super::{ReviewOutcome, Scheduler, SchedulerError};
use crate::models::{CardState, MemoryState, Rating, ReviewLog, ScheduleUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub const MIN_DIFFICULTY: f64 = 0.0;
pub const MAX_DIFFICULTY: f64 = 10.0;
pub const MIN_STABILITY: f64 = 0.1;

/// Calculates the next memory state for a card. Never fails: malformed
/// input is clamped rather than rejected.
pub fn compute_next_review(card: &MemoryState, rating: Rating, now: DateTime<Utc>) -> ScheduleUpdate {
    // Bring NaN, infinite or negative values back into range first
    let difficulty = sanitize(card.difficulty, MIN_DIFFICULTY);
    let stability = sanitize(card.stability, MIN_STABILITY);

    let (difficulty_delta, stability_factor) = match rating {
        Rating::Again => (0.8, 0.8),
        Rating::Hard => (0.15, 1.2),
        Rating::Good => (-0.1, 1.3),
        Rating::Easy => (-0.2, 1.6),
    };

    let new_difficulty = (difficulty + difficulty_delta).clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);

    // Stability has no ceiling, but an overflowing product stays finite
    let mut new_stability = stability * stability_factor;
    if !new_stability.is_finite() {
        new_stability = f64::MAX;
    }
    // Stability should not fall below 0.1 days
    let new_stability = new_stability.max(MIN_STABILITY);

    let new_state = match rating {
        Rating::Again => CardState::Relearning,
        Rating::Hard | Rating::Good if card.state == CardState::New => CardState::Learning,
        Rating::Hard | Rating::Good => CardState::Review,
        Rating::Easy => CardState::Review,
    };

    // A lapse restarts the learning steps
    let step = match (rating, new_state) {
        (Rating::Again, _) => 0,
        (_, CardState::Learning) => card.step.saturating_add(1),
        _ => card.step,
    };

    ScheduleUpdate {
        state: new_state,
        difficulty: new_difficulty,
        stability: new_stability,
        retrievability: None,
        last_review: now,
        next_review: review_date(now, interval_days(new_stability)),
        step,
    }
}

/// Whole days until the next review, at least one. Saturates at `i64::MAX`.
pub fn interval_days(stability: f64) -> i64 {
    stability.max(1.0).round() as i64
}

/// `now + days`, pinned to the last representable instant when the
/// interval runs past chrono's range.
pub fn review_date(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days)
        .and_then(|interval| now.checked_add_signed(interval))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn sanitize(value: f64, floor: f64) -> f64 {
    if value.is_finite() { value.max(floor) } else { floor }
}

/// [`compute_next_review`] behind the [`Scheduler`] capability.
#[derive(Clone, Copy, Debug, Default)]
pub struct FallbackScheduler;

impl FallbackScheduler {
    pub fn outcome(&self, card: &MemoryState, rating: Rating, now: DateTime<Utc>) -> ReviewOutcome {
        let update = compute_next_review(card, rating, now);
        let log = ReviewLog::between(card, &update, rating);
        ReviewOutcome { update, log }
    }
}

#[async_trait]
impl Scheduler for FallbackScheduler {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn schedule(
        &self,
        card: &MemoryState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, SchedulerError> {
        Ok(self.outcome(card, rating, now))
    }
}
