//! SQLite storage for reconciled records.
//!
//! The pipeline talks to storage through the [`Store`] trait; the SQLite
//! implementation here is the default collaborator. `upsert_or_skip` relies
//! on `INSERT OR IGNORE` against the canonical-key primary key, so a lost
//! race between workers surfaces as `Skipped`, never as a duplicate row.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::dedup::{CanonicalKey, RecordType};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Outcome of an idempotent insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A record with the same canonical key already exists.
    Skipped,
}

/// One legislator row, as needed to build the resolver's name index and to
/// partition per-legislator collection.
#[derive(Debug, Clone)]
pub struct LegislatorRow {
    pub id: i64,
    /// The id assigned by the upstream API.
    pub external_id: String,
    pub name: String,
    pub author_code: Option<i64>,
}

/// Storage contract the pipeline depends on.
pub trait Store: Send + Sync {
    /// Inserts the payload under its canonical key, or skips when a record
    /// with that key already exists.
    fn upsert_or_skip(
        &self,
        record_type: RecordType,
        key: &CanonicalKey,
        payload: &Value,
    ) -> Result<UpsertOutcome, StoreError>;

    /// True when a record with this canonical key is persisted.
    fn record_exists(&self, record_type: RecordType, key: &CanonicalKey)
        -> Result<bool, StoreError>;

    /// Looks up a persisted entity id by a natural key. For legislators the
    /// key may be the source's external id or a numeric author code.
    fn find_entity_by_natural_key(
        &self,
        record_type: RecordType,
        key: &str,
    ) -> Result<Option<i64>, StoreError>;

    /// All stored legislators, for building the resolution index.
    fn legislators(&self) -> Result<Vec<LegislatorRow>, StoreError>;

    /// Number of persisted records of one type.
    fn count(&self, record_type: RecordType) -> Result<i64, StoreError>;
}

/// SQLite-backed [`Store`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn init(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            conn.execute_batch(include_str!("../schema/sqlite.sql"))?;
            conn.pragma_update(None, "user_version", 1)?;
        }

        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Store for SqliteStore {
    fn upsert_or_skip(
        &self,
        record_type: RecordType,
        key: &CanonicalKey,
        payload: &Value,
    ) -> Result<UpsertOutcome, StoreError> {
        let conn = self.lock();
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO records (record_type, canonical_key, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record_type.as_str(),
                key.as_str(),
                serde_json::to_string(payload)?,
                now
            ],
        )?;

        if changed == 0 {
            return Ok(UpsertOutcome::Skipped);
        }

        if record_type == RecordType::Legislator {
            conn.execute(
                "INSERT OR IGNORE INTO legislators
                     (external_id, name, party, state, author_code, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    payload.get("external_id").and_then(|v| v.as_str()),
                    payload
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default(),
                    payload.get("party").and_then(|v| v.as_str()),
                    payload.get("state").and_then(|v| v.as_str()),
                    payload.get("author_code").and_then(|v| v.as_i64()),
                    now
                ],
            )?;
        }

        Ok(UpsertOutcome::Inserted)
    }

    fn record_exists(
        &self,
        record_type: RecordType,
        key: &CanonicalKey,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM records WHERE record_type = ?1 AND canonical_key = ?2",
                params![record_type.as_str(), key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn find_entity_by_natural_key(
        &self,
        record_type: RecordType,
        key: &str,
    ) -> Result<Option<i64>, StoreError> {
        let conn = self.lock();
        match record_type {
            RecordType::Legislator => {
                let by_external: Option<i64> = conn
                    .query_row(
                        "SELECT id FROM legislators WHERE external_id = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                if by_external.is_some() {
                    return Ok(by_external);
                }
                let Ok(code) = key.parse::<i64>() else {
                    return Ok(None);
                };
                Ok(conn
                    .query_row(
                        "SELECT id FROM legislators WHERE author_code = ?1",
                        params![code],
                        |row| row.get(0),
                    )
                    .optional()?)
            }
            _ => Ok(conn
                .query_row(
                    "SELECT rowid FROM records
                     WHERE record_type = ?1 AND canonical_key = ?2",
                    params![record_type.as_str(), key],
                    |row| row.get(0),
                )
                .optional()?),
        }
    }

    fn legislators(&self) -> Result<Vec<LegislatorRow>, StoreError> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT id, external_id, name, author_code FROM legislators")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LegislatorRow {
                    id: row.get(0)?,
                    external_id: row.get(1)?,
                    name: row.get(2)?,
                    author_code: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn count(&self, record_type: RecordType) -> Result<i64, StoreError> {
        let conn = self.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM records WHERE record_type = ?1",
            params![record_type.as_str()],
            |row| row.get(0),
        )?)
    }
}
