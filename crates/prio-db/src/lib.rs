//! Storage layer for the prioritization engine.
//!
//! Provides persistence for lists, items, rating history and the daily quota
//! using `rusqlite`, and implements [`prio_core::Store`] on top of it.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` can be moved between threads but not shared without a `Mutex`.
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2025-01-15T10:30:00.000Z`), so lexicographic order matches
//! chronological order. Quota dates are stored as `YYYY-MM-DD`.
//!
//! The quota lives in a single-row table; the row is created on first save.

use std::path::Path;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use prio_core::{Item, ItemId, ListId, QuotaState, RatingDelta, Store, StoreError, ValidationError};
use rusqlite::{
    Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter,
};
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp for {row}: {timestamp}")]
    TimestampParse {
        row: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row violates a core invariant (e.g. an empty ID).
    #[error("invalid row {row}")]
    InvalidRow {
        row: String,
        #[source]
        source: ValidationError,
    },
    /// A rating delta referenced an item that does not exist.
    #[error("unknown item: {0}")]
    UnknownItem(String),
    /// An item's stored rating no longer matches the delta's `before`.
    #[error("stale rating for {0}")]
    StaleRating(String),
    /// An item referenced a list that does not exist.
    #[error("unknown list: {0}")]
    UnknownList(String),
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A list and whether it takes part in duels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRecord {
    pub id: String,
    pub name: String,
    pub duel_enabled: bool,
    pub item_count: usize,
}

/// One recorded rating change.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingHistoryRecord {
    pub item_id: String,
    pub before: f64,
    pub after: f64,
    pub recorded_at: String,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS lists (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                duel_enabled INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                list_id TEXT NOT NULL,
                title TEXT NOT NULL,
                rating REAL NOT NULL DEFAULT 1200.0,
                last_dueled_at TEXT,
                FOREIGN KEY (list_id) REFERENCES lists(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_items_list ON items(list_id);

            -- Audit trail: one row per rating change
            CREATE TABLE IF NOT EXISTS rating_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id TEXT NOT NULL,
                before REAL NOT NULL,
                after REAL NOT NULL,
                recorded_at TEXT NOT NULL,
                FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_rating_history_item ON rating_history(item_id);

            CREATE TABLE IF NOT EXISTS quota_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                date TEXT,
                duels_used_today INTEGER NOT NULL DEFAULT 0,
                daily_limit INTEGER
            );
            ",
        )?;
        Ok(())
    }

    /// Creates a list if it does not exist yet. Returns whether it was created.
    pub fn ensure_list(&mut self, id: &ListId, name: &str) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO lists (id, name, duel_enabled) VALUES (?, ?, 1)",
            params![id.as_str(), name],
        )?;
        Ok(inserted > 0)
    }

    /// Enables or disables a list for duels. Returns whether the list exists.
    pub fn set_list_enabled(&mut self, id: &ListId, enabled: bool) -> Result<bool, DbError> {
        let updated = self.conn.execute(
            "UPDATE lists SET duel_enabled = ? WHERE id = ?",
            params![enabled, id.as_str()],
        )?;
        Ok(updated > 0)
    }

    /// Lists all lists with their item counts, ordered by ID.
    pub fn list_lists(&self) -> Result<Vec<ListRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT l.id, l.name, l.duel_enabled, COUNT(i.id)
            FROM lists l
            LEFT JOIN items i ON i.list_id = l.id
            GROUP BY l.id
            ORDER BY l.id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            let count: i64 = row.get(3)?;
            Ok(ListRecord {
                id: row.get(0)?,
                name: row.get(1)?,
                duel_enabled: row.get(2)?,
                item_count: usize::try_from(count).unwrap_or_default(),
            })
        })?;
        let mut lists = Vec::new();
        for row in rows {
            lists.push(row?);
        }
        Ok(lists)
    }

    /// IDs of lists enabled for duels, ordered by ID.
    pub fn enabled_list_ids(&self) -> Result<Vec<ListId>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM lists WHERE duel_enabled = 1 ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            let id = row?;
            ids.push(ListId::new(id.clone()).map_err(|source| DbError::InvalidRow {
                row: format!("lists/{id}"),
                source,
            })?);
        }
        Ok(ids)
    }

    /// Inserts a batch of items, ignoring duplicates by ID.
    ///
    /// Every item's list must already exist.
    pub fn insert_items(&mut self, items: &[Item]) -> Result<usize, DbError> {
        if items.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut list_stmt = tx.prepare("SELECT 1 FROM lists WHERE id = ?")?;
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO items (id, list_id, title, rating, last_dueled_at)
                VALUES (?, ?, ?, ?, ?)
                ",
            )?;
            for item in items {
                if !list_stmt.exists([item.list_id.as_str()])? {
                    return Err(DbError::UnknownList(item.list_id.to_string()));
                }
                inserted += stmt.execute(params![
                    item.id.as_str(),
                    item.list_id.as_str(),
                    item.title,
                    item.rating,
                    item.last_dueled_at.map(format_timestamp),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Lists items, optionally restricted to one list, ordered by ID.
    pub fn list_items(&self, list_id: Option<&ListId>) -> Result<Vec<Item>, DbError> {
        match list_id {
            Some(list_id) => self.items_in(std::slice::from_ref(list_id)),
            None => {
                let mut stmt = self.conn.prepare(
                    "
                    SELECT id, list_id, title, rating, last_dueled_at
                    FROM items
                    ORDER BY id ASC
                    ",
                )?;
                let rows = stmt.query_map([], ItemRow::from_row)?;
                collect_items(rows)
            }
        }
    }

    /// Rating changes for one item, oldest first.
    pub fn rating_history(&self, item_id: &ItemId) -> Result<Vec<RatingHistoryRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT item_id, before, after, recorded_at
            FROM rating_history
            WHERE item_id = ?
            ORDER BY id ASC
            ",
        )?;
        let rows = stmt.query_map([item_id.as_str()], |row| {
            Ok(RatingHistoryRecord {
                item_id: row.get(0)?,
                before: row.get(1)?,
                after: row.get(2)?,
                recorded_at: row.get(3)?,
            })
        })?;
        let mut history = Vec::new();
        for row in rows {
            history.push(row?);
        }
        Ok(history)
    }

    fn items_in(&self, list_ids: &[ListId]) -> Result<Vec<Item>, DbError> {
        if list_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; list_ids.len()].join(", ");
        let sql = format!(
            "
            SELECT id, list_id, title, rating, last_dueled_at
            FROM items
            WHERE list_id IN ({placeholders})
            ORDER BY id ASC
            "
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(list_ids.iter().map(ListId::as_str)),
            ItemRow::from_row,
        )?;
        collect_items(rows)
    }

    fn write_rating_deltas(
        &mut self,
        deltas: &[RatingDelta],
        last_dueled_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let recorded_at = format_timestamp(last_dueled_at);
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut update_stmt = tx.prepare(
                "
                UPDATE items
                SET rating = ?, last_dueled_at = ?
                WHERE id = ? AND rating = ?
                ",
            )?;
            let mut exists_stmt = tx.prepare("SELECT 1 FROM items WHERE id = ?")?;
            let mut history_stmt = tx.prepare(
                "
                INSERT INTO rating_history (item_id, before, after, recorded_at)
                VALUES (?, ?, ?, ?)
                ",
            )?;
            for delta in deltas {
                let updated = update_stmt.execute(params![
                    delta.after,
                    recorded_at,
                    delta.item_id.as_str(),
                    delta.before,
                ])?;
                if updated == 0 {
                    // Dropping the transaction rolls back earlier updates.
                    let id = delta.item_id.to_string();
                    return Err(if exists_stmt.exists([id.as_str()])? {
                        DbError::StaleRating(id)
                    } else {
                        DbError::UnknownItem(id)
                    });
                }
                history_stmt.execute(params![
                    delta.item_id.as_str(),
                    delta.before,
                    delta.after,
                    recorded_at,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(deltas = deltas.len(), "saved rating deltas");
        Ok(())
    }

    /// Spends one duel inside an immediate transaction.
    ///
    /// The write lock is taken before the state is read, so a second
    /// connection consuming at the same time waits and then sees this duel.
    fn consume_quota(
        &mut self,
        today: NaiveDate,
        daily_limit: Option<u32>,
    ) -> Result<Option<QuotaState>, DbError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let Some(next) = read_quota_state(&tx)?.consume_on(today, daily_limit) else {
            return Ok(None);
        };
        write_quota_state(&tx, &next)?;
        tx.commit()?;
        Ok(Some(next))
    }
}

impl Store for Database {
    fn load_items(&self, list_ids: &[ListId]) -> Result<Vec<Item>, StoreError> {
        self.items_in(list_ids)
            .map_err(|err| StoreError::with_source("failed to load items", err))
    }

    fn save_rating_deltas(
        &mut self,
        deltas: &[RatingDelta],
        last_dueled_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.write_rating_deltas(deltas, last_dueled_at)
            .map_err(|err| StoreError::with_source("failed to save rating deltas", err))
    }

    fn load_quota_state(&self) -> Result<QuotaState, StoreError> {
        read_quota_state(&self.conn)
            .map_err(|err| StoreError::with_source("failed to load quota state", err))
    }

    fn save_quota_state(&mut self, state: &QuotaState) -> Result<(), StoreError> {
        write_quota_state(&self.conn, state)
            .map_err(|err| StoreError::with_source("failed to save quota state", err))
    }

    fn try_consume_quota(
        &mut self,
        today: NaiveDate,
        daily_limit: Option<u32>,
    ) -> Result<Option<QuotaState>, StoreError> {
        self.consume_quota(today, daily_limit)
            .map_err(|err| StoreError::with_source("failed to consume quota", err))
    }
}

#[derive(Debug)]
struct ItemRow {
    id: String,
    list_id: String,
    title: String,
    rating: f64,
    last_dueled_at: Option<String>,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            list_id: row.get(1)?,
            title: row.get(2)?,
            rating: row.get(3)?,
            last_dueled_at: row.get(4)?,
        })
    }

    fn into_item(self) -> Result<Item, DbError> {
        let row = format!("items/{}", self.id);
        let invalid = |source| DbError::InvalidRow {
            row: row.clone(),
            source,
        };
        let last_dueled_at = self
            .last_dueled_at
            .map(|raw| parse_timestamp(&raw, &row))
            .transpose()?;
        Ok(Item {
            id: ItemId::new(self.id).map_err(invalid)?,
            title: self.title,
            rating: self.rating,
            list_id: ListId::new(self.list_id).map_err(invalid)?,
            last_dueled_at,
        })
    }
}

fn read_quota_state(conn: &Connection) -> Result<QuotaState, DbError> {
    let row = conn
        .query_row(
            "SELECT date, duels_used_today, daily_limit FROM quota_state WHERE id = 1",
            [],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((date, duels_used_today, daily_limit)) = row else {
        return Ok(QuotaState::default());
    };
    let date = date
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|source| {
                DbError::TimestampParse {
                    row: "quota_state".to_string(),
                    timestamp: raw.clone(),
                    source,
                }
            })
        })
        .transpose()?;
    Ok(QuotaState {
        date,
        duels_used_today,
        daily_limit,
    })
}

fn write_quota_state(conn: &Connection, state: &QuotaState) -> Result<(), DbError> {
    conn.execute(
        "
        INSERT INTO quota_state (id, date, duels_used_today, daily_limit)
        VALUES (1, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            date = excluded.date,
            duels_used_today = excluded.duels_used_today,
            daily_limit = excluded.daily_limit
        ",
        params![
            state.date.map(|date| date.format(DATE_FORMAT).to_string()),
            state.duels_used_today,
            state.daily_limit,
        ],
    )?;
    Ok(())
}

fn collect_items(
    rows: impl Iterator<Item = rusqlite::Result<ItemRow>>,
) -> Result<Vec<Item>, DbError> {
    let mut items = Vec::new();
    for row in rows {
        items.push(row?.into_item()?);
    }
    Ok(items)
}

fn parse_timestamp(timestamp: &str, row: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            row: row.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;

    use chrono::TimeZone;
    use prio_core::{
        DEFAULT_K_FACTOR, DayBoundary, DuelError, DuelMode, DuelSession, DuelSettings, DuelVerdict,
        Outcome, QuotaError, QuotaTracker, Remaining, RoundResult, SessionPhase, update_pair,
    };
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn list(id: &str) -> ListId {
        ListId::new(id).unwrap()
    }

    fn item(id: &str, list_id: &str) -> Item {
        Item::new(ItemId::new(id).unwrap(), format!("Task {id}"), list(list_id))
    }

    fn seeded_db() -> Database {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        db.ensure_list(&list("work"), "Work").unwrap();
        db.ensure_list(&list("home"), "Home").unwrap();
        db.insert_items(&[
            item("w1", "work"),
            item("w2", "work"),
            item("w3", "work"),
            item("h1", "home"),
        ])
        .unwrap();
        db
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 14, hour, 0, 0).unwrap()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");
        assert_eq!(
            table_columns(&db.conn, "lists"),
            vec!["id", "name", "duel_enabled"]
        );
        assert_eq!(
            table_columns(&db.conn, "items"),
            vec!["id", "list_id", "title", "rating", "last_dueled_at"]
        );
        assert_eq!(
            table_columns(&db.conn, "rating_history"),
            vec!["id", "item_id", "before", "after", "recorded_at"]
        );
        assert_eq!(
            table_columns(&db.conn, "quota_state"),
            vec!["id", "date", "duels_used_today", "daily_limit"]
        );
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("column name")).collect()
    }

    #[test]
    fn open_is_idempotent_on_disk() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("prio.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.ensure_list(&list("work"), "Work").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_lists().unwrap().len(), 1);
    }

    #[test]
    fn ensure_list_keeps_existing_name() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(db.ensure_list(&list("work"), "Work").unwrap());
        assert!(!db.ensure_list(&list("work"), "Renamed").unwrap());
        let lists = db.list_lists().unwrap();
        assert_eq!(lists[0].name, "Work");
    }

    #[test]
    fn enabling_and_disabling_lists() {
        let mut db = seeded_db();
        assert_eq!(db.enabled_list_ids().unwrap(), vec![list("home"), list("work")]);

        assert!(db.set_list_enabled(&list("home"), false).unwrap());
        assert_eq!(db.enabled_list_ids().unwrap(), vec![list("work")]);
        assert!(!db.set_list_enabled(&list("missing"), true).unwrap());

        let lists = db.list_lists().unwrap();
        assert_eq!(
            lists,
            vec![
                ListRecord {
                    id: "home".to_string(),
                    name: "Home".to_string(),
                    duel_enabled: false,
                    item_count: 1,
                },
                ListRecord {
                    id: "work".to_string(),
                    name: "Work".to_string(),
                    duel_enabled: true,
                    item_count: 3,
                },
            ]
        );
    }

    #[test]
    fn insert_items_is_idempotent() {
        let mut db = seeded_db();
        let inserted = db.insert_items(&[item("w1", "work"), item("w4", "work")]).unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(db.list_items(None).unwrap().len(), 5);
    }

    #[test]
    fn insert_items_requires_existing_list() {
        let mut db = seeded_db();
        let err = db.insert_items(&[item("x1", "nowhere")]).unwrap_err();
        assert!(matches!(err, DbError::UnknownList(ref id) if id == "nowhere"));
    }

    #[test]
    fn load_items_filters_by_list() {
        let db = seeded_db();
        let items = db.load_items(&[list("work")]).unwrap();
        let ids: Vec<&str> = items.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["w1", "w2", "w3"]);
        assert!(db.load_items(&[]).unwrap().is_empty());
        assert_eq!(db.load_items(&[list("work"), list("home")]).unwrap().len(), 4);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "ratings round-trip exactly through REAL")]
    fn save_rating_deltas_updates_items_and_history() {
        let mut db = seeded_db();
        let deltas = vec![
            RatingDelta {
                item_id: ItemId::new("w1").unwrap(),
                before: 1200.0,
                after: 1216.0,
            },
            RatingDelta {
                item_id: ItemId::new("w2").unwrap(),
                before: 1200.0,
                after: 1184.0,
            },
        ];
        db.save_rating_deltas(&deltas, at(9)).unwrap();

        let items = db.list_items(Some(&list("work"))).unwrap();
        assert_eq!(items[0].rating, 1216.0);
        assert_eq!(items[0].last_dueled_at, Some(at(9)));
        assert_eq!(items[1].rating, 1184.0);
        assert_eq!(items[2].last_dueled_at, None);

        let history = db.rating_history(&ItemId::new("w1").unwrap()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].after, 1216.0);
        assert_eq!(history[0].recorded_at, "2025-02-14T09:00:00.000Z");
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "untouched ratings keep their default")]
    fn save_rating_deltas_is_all_or_nothing() {
        let mut db = seeded_db();
        let deltas = vec![
            RatingDelta {
                item_id: ItemId::new("w1").unwrap(),
                before: 1200.0,
                after: 1216.0,
            },
            RatingDelta {
                item_id: ItemId::new("ghost").unwrap(),
                before: 1200.0,
                after: 1184.0,
            },
        ];
        let err = db.save_rating_deltas(&deltas, at(9)).unwrap_err();
        assert_eq!(err.to_string(), "failed to save rating deltas");

        let items = db.list_items(Some(&list("work"))).unwrap();
        assert_eq!(items[0].rating, 1200.0);
        assert!(items[0].last_dueled_at.is_none());
        assert!(db.rating_history(&ItemId::new("w1").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn quota_state_roundtrip() {
        let mut db = Database::open_in_memory().unwrap();
        assert_eq!(db.load_quota_state().unwrap(), QuotaState::default());

        let state = QuotaState {
            date: NaiveDate::from_ymd_opt(2025, 2, 14),
            duels_used_today: 3,
            daily_limit: Some(10),
        };
        db.save_quota_state(&state).unwrap();
        assert_eq!(db.load_quota_state().unwrap(), state);

        let next = QuotaState {
            date: NaiveDate::from_ymd_opt(2025, 2, 15),
            duels_used_today: 1,
            daily_limit: None,
        };
        db.save_quota_state(&next).unwrap();
        assert_eq!(db.load_quota_state().unwrap(), next);
    }

    #[test]
    fn session_runs_against_database() {
        let mut db = seeded_db();
        db.set_list_enabled(&list("home"), false).unwrap();
        let enabled = db.enabled_list_ids().unwrap();
        let mut session = DuelSession::new(
            &mut db,
            QuotaTracker::new(Some(2), DayBoundary::Utc),
            DuelSettings {
                strict_verdicts: false,
                ..DuelSettings::with_lists(enabled)
            },
            StdRng::seed_from_u64(17),
        );

        let candidates = session.start(DuelMode::Ranking, at(8)).unwrap();
        let drawn: HashSet<&str> = candidates.ids().map(ItemId::as_str).collect();
        assert_eq!(drawn, HashSet::from(["w1", "w2", "w3"]));

        let order: Vec<ItemId> = candidates.ids().cloned().collect();
        let result = session
            .submit(DuelVerdict::Ranking(order.clone()), at(8))
            .unwrap();
        assert!(matches!(result, RoundResult::Completed(_)));

        let items = db.list_items(Some(&list("work"))).unwrap();
        let best = items.iter().find(|item| item.id == order[0]).unwrap();
        let worst = items.iter().find(|item| item.id == order[2]).unwrap();
        assert!(best.rating > worst.rating);
        assert!(items.iter().all(|item| item.last_dueled_at == Some(at(8))));
        assert_eq!(db.load_quota_state().unwrap().duels_used_today, 1);
        assert_eq!(db.rating_history(&order[1]).unwrap().len(), 1);
    }

    /// Two connections to one on-disk database holding a single pair.
    fn shared_pair() -> (tempfile::TempDir, Database, Database) {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("prio.db");
        let mut first = Database::open(&path).unwrap();
        first.ensure_list(&list("work"), "Work").unwrap();
        first
            .insert_items(&[item("x", "work"), item("y", "work")])
            .unwrap();
        let second = Database::open(&path).unwrap();
        (temp, first, second)
    }

    fn pair_session(db: &mut Database, limit: Option<u32>) -> DuelSession<&mut Database, StdRng> {
        DuelSession::new(
            db,
            QuotaTracker::new(limit, DayBoundary::Utc),
            DuelSettings {
                strict_verdicts: false,
                ..DuelSettings::with_lists(vec![list("work")])
            },
            StdRng::seed_from_u64(3),
        )
    }

    fn rating_of(db: &Database, id: &str) -> f64 {
        db.list_items(None)
            .unwrap()
            .into_iter()
            .find(|item| item.id.as_str() == id)
            .map(|item| item.rating)
            .unwrap()
    }

    #[test]
    fn last_duel_cannot_be_spent_twice_across_connections() {
        let (_temp, mut this, mut other) = shared_pair();
        let tracker = QuotaTracker::new(Some(1), DayBoundary::Utc);

        // Both connections see one duel left before either spends it.
        assert_eq!(tracker.remaining(&this, at(9)).unwrap(), Remaining::Limited(1));
        assert_eq!(tracker.remaining(&other, at(9)).unwrap(), Remaining::Limited(1));

        assert_eq!(tracker.consume(&mut other, at(9)).unwrap().duels_used_today, 1);
        assert!(matches!(
            tracker.consume(&mut this, at(9)),
            Err(QuotaError::Exhausted)
        ));
        assert_eq!(this.load_quota_state().unwrap().duels_used_today, 1);
        assert_eq!(
            this.try_consume_quota(at(9).date_naive(), Some(1)).unwrap(),
            None
        );
    }

    #[test]
    fn concurrent_sessions_share_the_daily_limit() {
        let (_temp, mut this, mut other) = shared_pair();
        let mut first = pair_session(&mut this, Some(1));
        let mut second = pair_session(&mut other, Some(1));
        first.start(DuelMode::Winner, at(9)).unwrap();
        second.start(DuelMode::Winner, at(9)).unwrap();

        let x = ItemId::new("x").unwrap();
        second
            .submit(DuelVerdict::Winner(x.clone()), at(9))
            .unwrap();
        let err = first.submit(DuelVerdict::Winner(x), at(9)).unwrap_err();
        assert!(matches!(err, DuelError::QuotaExhausted));
        assert_eq!(first.phase(), SessionPhase::Idle);
        drop(first);
        drop(second);

        assert!((rating_of(&this, "x") - 1216.0).abs() < 1e-9);
        assert_eq!(this.load_quota_state().unwrap().duels_used_today, 1);
        assert_eq!(this.rating_history(&ItemId::new("x").unwrap()).unwrap().len(), 1);
    }

    #[test]
    fn rounds_resolved_elsewhere_are_built_upon() {
        let (_temp, mut this, mut other) = shared_pair();
        let mut first = pair_session(&mut this, None);
        let mut second = pair_session(&mut other, None);
        first.start(DuelMode::Winner, at(9)).unwrap();
        second.start(DuelMode::Winner, at(9)).unwrap();

        let x = ItemId::new("x").unwrap();
        second
            .submit(DuelVerdict::Winner(x.clone()), at(9))
            .unwrap();
        let RoundResult::Completed(outcome) =
            first.submit(DuelVerdict::Winner(x.clone()), at(10)).unwrap()
        else {
            panic!("expected completed round");
        };
        drop(first);
        drop(second);

        let (x_after, y_after) = update_pair(1216.0, 1184.0, Outcome::AWins, DEFAULT_K_FACTOR);
        assert!((outcome.deltas[0].before - 1216.0).abs() < 1e-9);
        assert!((rating_of(&this, "x") - x_after).abs() < 1e-9);
        assert!((rating_of(&this, "y") - y_after).abs() < 1e-9);

        let history = this.rating_history(&x).unwrap();
        assert_eq!(history.len(), 2);
        assert!((history[1].before - history[0].after).abs() < 1e-9);
        assert!((history[1].after - x_after).abs() < 1e-9);
    }

    #[test]
    fn stale_deltas_are_refused() {
        let (_temp, mut this, mut other) = shared_pair();
        let won = |before: f64, after: f64| RatingDelta {
            item_id: ItemId::new("x").unwrap(),
            before,
            after,
        };
        other.save_rating_deltas(&[won(1200.0, 1216.0)], at(9)).unwrap();

        let err = this
            .write_rating_deltas(&[won(1200.0, 1216.0)], at(10))
            .unwrap_err();
        assert!(matches!(err, DbError::StaleRating(ref id) if id == "x"));
        assert!((rating_of(&this, "x") - 1216.0).abs() < 1e-9);
        assert_eq!(this.rating_history(&ItemId::new("x").unwrap()).unwrap().len(), 1);
    }
}
