//! Due-card selection for building study queues.
//!
//! Listing is advisory: a failing query is logged and reported as an empty
//! queue instead of an error.

use crate::database::CardStore;
use crate::models::{DueQuery, MemoryState};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct DueCardSelector {
    store: Arc<dyn CardStore>,
    default_limit: Option<usize>,
}

impl DueCardSelector {
    pub fn new(store: Arc<dyn CardStore>, default_limit: Option<usize>) -> Self {
        Self {
            store,
            default_limit,
        }
    }

    pub async fn due_cards(
        &self,
        owner_id: &str,
        deck_id: Option<&str>,
        limit: Option<usize>,
    ) -> Vec<MemoryState> {
        self.due_cards_at(owner_id, deck_id, limit, Utc::now()).await
    }

    pub async fn due_cards_at(
        &self,
        owner_id: &str,
        deck_id: Option<&str>,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Vec<MemoryState> {
        let query = DueQuery {
            owner_id: owner_id.to_string(),
            deck_id: deck_id.map(str::to_string),
            now,
            limit: limit.or(self.default_limit),
        };

        match self.store.query_due(&query).await {
            Ok(cards) => {
                tracing::debug!(owner_id, ?deck_id, count = cards.len(), "Loaded due cards");
                cards
            }
            Err(e) => {
                tracing::warn!(owner_id, ?deck_id, error = %e, "Due card query failed, returning empty queue");
                Vec::new()
            }
        }
    }

    pub async fn due_count(&self, owner_id: &str, deck_id: Option<&str>) -> usize {
        self.due_count_at(owner_id, deck_id, Utc::now()).await
    }

    pub async fn due_count_at(
        &self,
        owner_id: &str,
        deck_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> usize {
        let mut query = DueQuery::new(owner_id, now);
        query.deck_id = deck_id.map(str::to_string);

        self.store.count_due(&query).await.unwrap_or_else(|e| {
            tracing::warn!(owner_id, ?deck_id, error = %e, "Due card count failed, reporting zero");
            0
        })
    }
}
