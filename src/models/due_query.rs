use chrono::{DateTime, Utc};

/// Filter for the due-card queue: cards owned by `owner_id`, optionally
/// narrowed to one deck, that are due at `now`.
#[derive(Clone, Debug, PartialEq)]
pub struct DueQuery {
    pub owner_id: String,
    pub deck_id: Option<String>,
    pub now: DateTime<Utc>,
    pub limit: Option<usize>,
}

impl DueQuery {
    pub fn new(owner_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            owner_id: owner_id.into(),
            deck_id: None,
            now,
            limit: None,
        }
    }

    pub fn in_deck(mut self, deck_id: impl Into<String>) -> Self {
        self.deck_id = Some(deck_id.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
