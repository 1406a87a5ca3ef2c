//! Persistence seam used by the review orchestrator and due-card selector.

use super::db;
use crate::error::{Error, Result};
use crate::models::{DueQuery, MemoryState, ReviewLog, ScheduleUpdate};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Record store holding card memory states.
#[async_trait]
pub trait CardStore: Send + Sync {
    async fn read(&self, card_id: &str) -> Result<MemoryState>;

    /// Replaces all scheduling fields of a card atomically.
    async fn update(&self, card_id: &str, update: &ScheduleUpdate) -> Result<MemoryState>;

    async fn query_due(&self, query: &DueQuery) -> Result<Vec<MemoryState>>;

    /// Same predicate as [`CardStore::query_due`], without loading the cards.
    async fn count_due(&self, query: &DueQuery) -> Result<usize>;

    async fn record_review(&self, log: &ReviewLog) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteCardStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCardStore {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(db::open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(db::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` with exclusive access to the connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| Error::Internal("database connection lock poisoned".to_string()))?;
        f(&mut conn)
    }

    /// [`SqliteCardStore::with_connection`] on tokio's blocking pool.
    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_connection(f))
            .await
            .map_err(|e| Error::Internal(format!("database task failed: {e}")))?
    }
}

#[async_trait]
impl CardStore for SqliteCardStore {
    async fn read(&self, card_id: &str) -> Result<MemoryState> {
        let card_id = card_id.to_string();
        self.run_blocking(move |conn| db::get_card(&card_id, conn)).await
    }

    async fn update(&self, card_id: &str, update: &ScheduleUpdate) -> Result<MemoryState> {
        let card_id = card_id.to_string();
        let update = update.clone();
        self.run_blocking(move |conn| db::update_schedule(&card_id, &update, conn))
            .await
    }

    async fn query_due(&self, query: &DueQuery) -> Result<Vec<MemoryState>> {
        let query = query.clone();
        self.run_blocking(move |conn| db::get_cards_due_for_review(&query, conn))
            .await
    }

    async fn count_due(&self, query: &DueQuery) -> Result<usize> {
        let query = query.clone();
        self.run_blocking(move |conn| db::count_cards_due_for_review(&query, conn))
            .await
    }

    async fn record_review(&self, log: &ReviewLog) -> Result<()> {
        let log = log.clone();
        self.run_blocking(move |conn| db::insert_review_log(&log, conn)).await
    }
}
