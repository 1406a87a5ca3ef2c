use super::{CardState, MemoryState, Rating, ScheduleUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit record of a single review. Never modified after creation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLog {
    pub card_id: String,
    pub rating: Rating,
    pub previous_state: CardState,
    pub new_state: CardState,
    pub previous_difficulty: f64,
    pub new_difficulty: f64,
    pub previous_stability: f64,
    pub new_stability: f64,
    pub next_review: DateTime<Utc>,
    pub reviewed_at: DateTime<Utc>,
}

impl ReviewLog {
    pub fn between(card: &MemoryState, update: &ScheduleUpdate, rating: Rating) -> Self {
        Self {
            card_id: card.id.clone(),
            rating,
            previous_state: card.state,
            new_state: update.state,
            previous_difficulty: card.difficulty,
            new_difficulty: update.difficulty,
            previous_stability: card.stability,
            new_stability: update.stability,
            next_review: update.next_review,
            reviewed_at: update.last_review,
        }
    }
}
