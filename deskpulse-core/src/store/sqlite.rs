//! SQLite-backed document store
//!
//! Rows are stored losslessly as JSON payloads next to the two columns the
//! resolver queries on: the dedup key and the creation instant.

use super::RecordStore;
use crate::error::{Error, Result};
use crate::normalize::columns::{self, Field};
use crate::types::{Domain, RawRow, TimeWindow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: record table
    r#"
    CREATE TABLE IF NOT EXISTS records (
        domain       TEXT NOT NULL,
        record_id    TEXT NOT NULL,
        created_at   INTEGER,
        payload      JSON NOT NULL,
        synced_at    DATETIME NOT NULL,
        PRIMARY KEY (domain, record_id)
    );

    CREATE INDEX IF NOT EXISTS idx_records_created ON records(domain, created_at);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}

/// Document store over one SQLite file.
///
/// Used for the primary live store and, with a second file, the mirror.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    name: String,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(name: &str, path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self::from_connection(name, conn))
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory(name: &str) -> Result<Self> {
        Ok(Self::from_connection(name, Connection::open_in_memory()?))
    }

    fn from_connection(name: &str, conn: Connection) -> Self {
        Self {
            name: name.to_string(),
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run migrations on this store
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        run_migrations(&conn)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::backend(&self.name, format!("connection lock poisoned: {e}")))
    }

    /// Insert or replace rows, keyed by `(domain, record id)`.
    ///
    /// Rows without a recognizable record id are skipped. Returns the number
    /// of rows written.
    pub fn upsert_rows(&self, domain: Domain, rows: &[RawRow]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO records (domain, record_id, created_at, payload, synced_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(domain, record_id) DO UPDATE SET
                    created_at = excluded.created_at,
                    payload = excluded.payload,
                    synced_at = excluded.synced_at
                "#,
            )?;
            for row in rows {
                let Some(record_id) = record_id(domain, row) else {
                    continue;
                };
                let created = created_at(domain, row).map(|ts| ts.timestamp());
                let payload = serde_json::to_string(row)?;
                stmt.execute(params![domain.as_str(), record_id, created, payload, now])?;
                written += 1;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Rows for a domain, filtered to the window when it is bounded.
    ///
    /// Rows without a creation instant are always returned.
    pub fn get_rows(&self, domain: Domain, window: &TimeWindow) -> Result<Vec<RawRow>> {
        let conn = self.lock()?;
        let start = window.start_utc().map(|s| s.timestamp());
        let end = window.end_utc().map(|e| e.timestamp());
        let mut stmt = conn.prepare(
            r#"
            SELECT payload FROM records
            WHERE domain = ?1
              AND (created_at IS NULL
                   OR ((?2 IS NULL OR created_at >= ?2) AND (?3 IS NULL OR created_at < ?3)))
            ORDER BY rowid
            "#,
        )?;
        let payloads = stmt
            .query_map(params![domain.as_str(), start, end], |r| r.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        payloads
            .iter()
            .map(|p| serde_json::from_str::<RawRow>(p).map_err(Error::from))
            .collect()
    }

    /// Number of stored rows for a domain.
    pub fn count(&self, domain: Domain) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE domain = ?1",
            [domain.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    async fn get_rows_blocking(&self, domain: Domain, window: &TimeWindow) -> Result<Vec<RawRow>> {
        let store = self.clone();
        let window = window.clone();
        tokio::task::spawn_blocking(move || store.get_rows(domain, &window))
            .await
            .map_err(|e| Error::backend(&self.name, format!("query task failed: {e}")))?
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_tickets(&self, window: &TimeWindow) -> Result<Vec<RawRow>> {
        self.get_rows_blocking(Domain::Tickets, window).await
    }

    async fn get_chats(&self, window: &TimeWindow) -> Result<Vec<RawRow>> {
        self.get_rows_blocking(Domain::Chats, window).await
    }
}

fn record_id(domain: Domain, row: &RawRow) -> Option<String> {
    row.iter()
        .filter(|(header, _)| columns::canonical_field(domain, header) == Some(Field::RecordId))
        .find_map(|(_, value)| columns::parse_text(value))
        .map(crate::normalize::normalize_id)
}

fn created_at(domain: Domain, row: &RawRow) -> Option<DateTime<Utc>> {
    row.iter()
        .filter(|(header, _)| columns::canonical_field(domain, header) == Some(Field::CreatedAt))
        .find_map(|(header, value)| {
            columns::parse_timestamp(value, columns::naive_zone(domain, header))
        })
}
