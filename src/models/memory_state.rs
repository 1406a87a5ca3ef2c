//! Per-card memory state tracked by the scheduler.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a card inside the spaced repetition system.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardState {
    #[default]
    New,
    Learning,
    Review,
    Relearning,
}

impl CardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardState::New => "NEW",
            CardState::Learning => "LEARNING",
            CardState::Review => "REVIEW",
            CardState::Relearning => "RELEARNING",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NEW" => Some(CardState::New),
            "LEARNING" => Some(CardState::Learning),
            "REVIEW" => Some(CardState::Review),
            "RELEARNING" => Some(CardState::Relearning),
            _ => None,
        }
    }
}

impl std::fmt::Display for CardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const INITIAL_DIFFICULTY: f64 = 0.0;
pub const INITIAL_STABILITY: f64 = 1.0;

/// A flashcard as seen by the scheduler. Card content lives elsewhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryState {
    pub id: String,
    pub deck_id: String,
    pub state: CardState,
    pub difficulty: f64,
    /// Days until recall probability decays to the reference threshold.
    pub stability: f64,
    #[serde(default)]
    pub retrievability: Option<f64>,
    #[serde(default)]
    pub last_review: Option<DateTime<Utc>>,
    /// `None` means the card has never been scheduled and is due now.
    #[serde(default)]
    pub next_review: Option<DateTime<Utc>>,
    #[serde(default)]
    pub step: u32,
    pub created_at: DateTime<Utc>,
}

impl MemoryState {
    pub fn new(id: impl Into<String>, deck_id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            deck_id: deck_id.into(),
            state: CardState::New,
            difficulty: INITIAL_DIFFICULTY,
            stability: INITIAL_STABILITY,
            retrievability: None,
            last_review: None,
            next_review: None,
            step: 0,
            created_at,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review.is_none_or(|next| next <= now)
    }

    pub fn schedule(&self) -> Option<ScheduleUpdate> {
        Some(ScheduleUpdate {
            state: self.state,
            difficulty: self.difficulty,
            stability: self.stability,
            retrievability: self.retrievability,
            last_review: self.last_review?,
            next_review: self.next_review?,
            step: self.step,
        })
    }

    /// Replaces every scheduling field at once.
    pub fn apply(&mut self, update: &ScheduleUpdate) {
        self.state = update.state;
        self.difficulty = update.difficulty;
        self.stability = update.stability;
        self.retrievability = update.retrievability;
        self.last_review = Some(update.last_review);
        self.next_review = Some(update.next_review);
        self.step = update.step;
    }
}

/// The fields a review rewrites. They are only ever persisted together.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    pub state: CardState,
    pub difficulty: f64,
    pub stability: f64,
    #[serde(default)]
    pub retrievability: Option<f64>,
    pub last_review: DateTime<Utc>,
    pub next_review: DateTime<Utc>,
    pub step: u32,
}

impl ScheduleUpdate {
    /// Checks the invariants every persisted update must hold.
    pub fn validate(&self, reviewed_at: DateTime<Utc>) -> Result<(), String> {
        if !self.difficulty.is_finite() {
            return Err(format!("difficulty is not finite: {}", self.difficulty));
        }
        if !self.stability.is_finite() || self.stability <= 0.0 {
            return Err(format!("stability must be positive: {}", self.stability));
        }
        if let Some(r) = self.retrievability {
            if !r.is_finite() {
                return Err(format!("retrievability is not finite: {r}"));
            }
        }
        if self.next_review < reviewed_at {
            return Err(format!(
                "next review {} precedes review time {}",
                self.next_review, reviewed_at
            ));
        }
        Ok(())
    }
}
