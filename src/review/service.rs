//! Review orchestration: lock the card, schedule it, persist the result.

use super::CardLocks;
use crate::database::CardStore;
use crate::error::{Error, Result};
use crate::models::{MemoryState, Rating, ReviewLog};
use crate::scheduler::ResilientScheduler;
use chrono::{DateTime, Utc};
use std::sync::Arc;

struct Inner {
    store: Arc<dyn CardStore>,
    scheduler: ResilientScheduler,
    locks: CardLocks,
}

/// Entry point for study sessions submitting ratings.
///
/// A review either completes fully (state, interval and step stored
/// together) or fails with an error; the caller is never told a review
/// succeeded before it was persisted. Reviews of the same card are
/// serialized, and each one runs on its own task so that dropping the
/// caller's future cannot abandon it halfway.
#[derive(Clone)]
pub struct ReviewService {
    inner: Arc<Inner>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn CardStore>, scheduler: ResilientScheduler) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                scheduler,
                locks: CardLocks::new(),
            }),
        }
    }

    pub async fn submit_review(&self, card_id: &str, rating: Rating) -> Result<(MemoryState, ReviewLog)> {
        self.submit_review_at(card_id, rating, Utc::now()).await
    }

    pub async fn submit_review_at(
        &self,
        card_id: &str,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<(MemoryState, ReviewLog)> {
        let inner = self.inner.clone();
        let card_id = card_id.to_string();
        tokio::spawn(async move { inner.apply_review(&card_id, rating, now).await })
            .await
            .map_err(|e| Error::Internal(format!("review task failed: {e}")))?
    }

    /// Reviews `card` and returns its persisted state. The stored record is
    /// authoritative; the fields of the passed copy other than its id are
    /// not used.
    pub async fn process_review(&self, card: &MemoryState, rating: Rating) -> Result<MemoryState> {
        self.process_review_at(card, rating, Utc::now()).await
    }

    pub async fn process_review_at(
        &self,
        card: &MemoryState,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<MemoryState> {
        let (updated, _) = self.submit_review_at(&card.id, rating, now).await?;
        Ok(updated)
    }
}

impl Inner {
    async fn apply_review(
        &self,
        card_id: &str,
        rating: Rating,
        now: DateTime<Utc>,
    ) -> Result<(MemoryState, ReviewLog)> {
        let _guard = self.locks.acquire(card_id).await;

        let card = self.store.read(card_id).await?;
        let outcome = self.scheduler.schedule(&card, rating, now).await?;
        let updated = self.store.update(card_id, &outcome.update).await?;

        if let Err(e) = self.store.record_review(&outcome.log).await {
            tracing::warn!(card_id, error = %e, "Failed to record review history");
        }

        tracing::info!(
            card_id,
            %rating,
            from = %card.state,
            to = %updated.state,
            stability = updated.stability,
            next_review = ?updated.next_review,
            "Review applied"
        );

        Ok((updated, outcome.log))
    }
}
