//! SQLite operations for the scheduling core
//!
//! Handles database initialization, deck/card creation, atomic schedule
//! updates, due-card queries and the review history table. Timestamps are
//! stored as Unix milliseconds.

use crate::error::{Error, Result};
use crate::models::{CardState, DueQuery, MemoryState, Rating, ReviewLog, ScheduleUpdate};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;

const CARD_COLUMNS: &str = "c.id, c.deck_id, c.state, c.difficulty, c.stability, c.retrievability,
     c.last_review, c.next_review, c.step, c.created_at";

// Both the listing and the count go through this predicate so they can never disagree.
const DUE_PREDICATE: &str = "FROM cards c
     JOIN decks d ON d.id = c.deck_id
     WHERE d.owner_id = ?1
       AND (?2 IS NULL OR c.deck_id = ?2)
       AND (c.next_review IS NULL OR c.next_review <= ?3)";

impl ToSql for CardState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CardState {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        CardState::parse(value.as_str()?).ok_or(FromSqlError::InvalidType)
    }
}

/// Opens (or creates) the database file and makes sure the schema exists.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Creates tables for decks, cards and review history.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    // Create decks table, scoped to an owner
    conn.execute(
        "CREATE TABLE IF NOT EXISTS decks (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )",
        (),
    )?;

    // Create cards table holding the full memory state
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cards (
            id TEXT PRIMARY KEY,
            deck_id TEXT NOT NULL,
            state TEXT NOT NULL DEFAULT 'NEW',
            difficulty REAL NOT NULL DEFAULT 0.0,
            stability REAL NOT NULL DEFAULT 1.0,
            retrievability REAL,
            last_review INTEGER,
            next_review INTEGER,
            step INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
        )",
        (),
    )?;

    // Indexes for the due query
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_cards_deck_next_review ON cards(deck_id, next_review)",
        (),
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_decks_owner ON decks(owner_id)", ())?;

    // Create review_logs table, append only
    conn.execute(
        "CREATE TABLE IF NOT EXISTS review_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id TEXT NOT NULL,
            rating INTEGER NOT NULL,
            previous_state TEXT NOT NULL,
            new_state TEXT NOT NULL,
            previous_difficulty REAL NOT NULL,
            new_difficulty REAL NOT NULL,
            previous_stability REAL NOT NULL,
            new_stability REAL NOT NULL,
            next_review INTEGER NOT NULL,
            reviewed_at INTEGER NOT NULL,
            FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
        )",
        (),
    )?;

    Ok(())
}

fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

fn from_millis(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, millis))
}

fn optional_from_millis(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => from_millis(row, idx).map(Some),
        None => Ok(None),
    }
}

fn card_from_row(row: &Row) -> rusqlite::Result<MemoryState> {
    Ok(MemoryState {
        id: row.get(0)?,
        deck_id: row.get(1)?,
        state: row.get(2)?,
        difficulty: row.get(3)?,
        stability: row.get(4)?,
        retrievability: row.get(5)?,
        last_review: optional_from_millis(row, 6)?,
        next_review: optional_from_millis(row, 7)?,
        step: row.get(8)?,
        created_at: from_millis(row, 9)?,
    })
}

/// Creates a deck owned by `owner_id` and returns its generated id.
pub fn new_deck(owner_id: &str, name: &str, conn: &Connection) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO decks (id, owner_id, name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![id, owner_id, name, to_millis(Utc::now())],
    )?;
    tracing::debug!(deck_id = %id, owner_id, name, "Deck created");
    Ok(id)
}

/// Adds a fresh NEW card to a deck.
pub fn add_card(deck_id: &str, conn: &Connection) -> Result<MemoryState> {
    let card = MemoryState::new(uuid::Uuid::new_v4().to_string(), deck_id, Utc::now());
    insert_card(&card, conn)?;
    Ok(card)
}

/// Inserts a card with whatever memory state it already carries.
pub fn insert_card(card: &MemoryState, conn: &Connection) -> Result<()> {
    let deck_exists: Option<i64> = conn
        .query_row("SELECT 1 FROM decks WHERE id = ?1", params![card.deck_id], |row| row.get(0))
        .optional()?;
    if deck_exists.is_none() {
        return Err(Error::NotFound(format!("deck {}", card.deck_id)));
    }

    conn.execute(
        "INSERT INTO cards (id, deck_id, state, difficulty, stability, retrievability,
                            last_review, next_review, step, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            card.id,
            card.deck_id,
            card.state,
            card.difficulty,
            card.stability,
            card.retrievability,
            card.last_review.map(to_millis),
            card.next_review.map(to_millis),
            card.step,
            to_millis(card.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_card(card_id: &str, conn: &Connection) -> Result<MemoryState> {
    conn.query_row(
        &format!("SELECT {CARD_COLUMNS} FROM cards c WHERE c.id = ?1"),
        params![card_id],
        card_from_row,
    )
    .optional()?
    .ok_or_else(|| Error::NotFound(format!("card {card_id}")))
}

/// Writes every scheduling field of a card in one transaction and returns
/// the stored result.
pub fn update_schedule(
    card_id: &str,
    update: &ScheduleUpdate,
    conn: &mut Connection,
) -> Result<MemoryState> {
    let tx = conn.transaction()?;

    // Every scheduling column goes in the same statement
    let changed = tx.execute(
        "UPDATE cards
         SET state = ?1, difficulty = ?2, stability = ?3, retrievability = ?4,
             last_review = ?5, next_review = ?6, step = ?7
         WHERE id = ?8",
        params![
            update.state,
            update.difficulty,
            update.stability,
            update.retrievability,
            to_millis(update.last_review),
            to_millis(update.next_review),
            update.step,
            card_id,
        ],
    )?;
    if changed == 0 {
        // Dropping the transaction rolls it back
        return Err(Error::NotFound(format!("card {card_id}")));
    }

    // Read back inside the transaction so the caller sees what was committed
    let card = get_card(card_id, &tx)?;
    tx.commit()?;
    Ok(card)
}

/// Retrieves cards due at `query.now`.
///
/// Scheduled cards come first, soonest due first; never scheduled cards
/// follow in creation order.
pub fn get_cards_due_for_review(query: &DueQuery, conn: &Connection) -> Result<Vec<MemoryState>> {
    let limit = query
        .limit
        .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
        .unwrap_or(-1);

    let mut stmt = conn.prepare(&format!(
        "SELECT {CARD_COLUMNS}
         {DUE_PREDICATE}
         ORDER BY c.next_review IS NULL, c.next_review ASC, c.created_at ASC, c.rowid ASC
         LIMIT ?4"
    ))?;

    let cards = stmt
        .query_map(
            params![query.owner_id, query.deck_id, to_millis(query.now), limit],
            card_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(cards)
}

pub fn count_cards_due_for_review(query: &DueQuery, conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {DUE_PREDICATE}"),
        params![query.owner_id, query.deck_id, to_millis(query.now)],
        |row| row.get(0),
    )?;
    Ok(usize::try_from(count).unwrap_or(0))
}

pub fn insert_review_log(log: &ReviewLog, conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT INTO review_logs (card_id, rating, previous_state, new_state,
                                  previous_difficulty, new_difficulty,
                                  previous_stability, new_stability,
                                  next_review, reviewed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            log.card_id,
            u8::from(log.rating),
            log.previous_state,
            log.new_state,
            log.previous_difficulty,
            log.new_difficulty,
            log.previous_stability,
            log.new_stability,
            to_millis(log.next_review),
            to_millis(log.reviewed_at),
        ],
    )?;
    Ok(())
}

/// Review history of a card, oldest first.
pub fn get_review_logs(card_id: &str, conn: &Connection) -> Result<Vec<ReviewLog>> {
    let mut stmt = conn.prepare(
        "SELECT card_id, rating, previous_state, new_state, previous_difficulty, new_difficulty,
                previous_stability, new_stability, next_review, reviewed_at
         FROM review_logs WHERE card_id = ?1 ORDER BY id ASC",
    )?;

    let logs = stmt
        .query_map(params![card_id], |row| {
            let raw_rating: u8 = row.get(1)?;
            let rating = Rating::try_from(raw_rating).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(1, Type::Integer, Box::new(e))
            })?;
            Ok(ReviewLog {
                card_id: row.get(0)?,
                rating,
                previous_state: row.get(2)?,
                new_state: row.get(3)?,
                previous_difficulty: row.get(4)?,
                new_difficulty: row.get(5)?,
                previous_stability: row.get(6)?,
                new_stability: row.get(7)?,
                next_review: from_millis(row, 8)?,
                reviewed_at: from_millis(row, 9)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(logs)
}
