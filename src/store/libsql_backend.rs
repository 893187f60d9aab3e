//! libSQL backend: async `MemoryStore` implementation.
//!
//! Supports local file and in-memory databases. A single connection is
//! reused for all operations; writes are serialized by one store-wide lock
//! so interactions, preferences and the file index never interleave.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, Value, params};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::capability::{Capability, Slots};
use crate::error::StorageError;
use crate::store::migrations;
use crate::store::model::{
    DuplicateGroups, FileIndexEntry, Interaction, InteractionFilter, InteractionStatus,
    NewInteraction, Preference, ReceivedRequest, StoreStats,
};
use crate::store::traits::MemoryStore;

/// libSQL memory store.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    /// Single in-flight write across every table.
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Memory store opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StorageError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StorageError::Open(format!("Failed to create in-memory database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, StorageError> {
        let conn = db
            .connect()
            .map_err(|e| StorageError::Open(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            write_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        migrations::run_migrations(&self.conn).await
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    fn ensure_open(&self) -> Result<(), StorageError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    /// Take the store-wide write lock. Fails once the store is closed.
    async fn lock_for_write(&self) -> Result<MutexGuard<'_, ()>, StorageError> {
        let guard = self.write_lock.lock().await;
        self.ensure_open()?;
        Ok(guard)
    }

    async fn count(&self, table: &str) -> Result<u64, StorageError> {
        let mut rows = self
            .conn()
            .query(&format!("SELECT COUNT(*) FROM {table}"), ())
            .await
            .map_err(|e| StorageError::Query(format!("count {table}: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => {
                let n: i64 = row
                    .get(0)
                    .map_err(|e| StorageError::Query(format!("count {table}: {e}")))?;
                Ok(n.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(StorageError::Query(format!("count {table}: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical timestamp format. Fixed width and UTC, so text order is time order.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> Value {
    match s {
        Some(s) => Value::Text(s.to_string()),
        None => Value::Null,
    }
}

const INTERACTION_COLUMNS: &str = "id, request_id, session_id, timestamp, raw_text, capability, slots, response_summary, status, error_kind";

/// Map a libsql Row to an Interaction.
///
/// Column order matches INTERACTION_COLUMNS.
fn row_to_interaction(row: &libsql::Row) -> Result<Interaction, StorageError> {
    let read = |e: libsql::Error| StorageError::Query(format!("read interaction row: {e}"));

    let request_str: String = row.get(1).map_err(read)?;
    let timestamp_str: String = row.get(3).map_err(read)?;
    let capability_str: Option<String> = row.get(5).ok();
    let slots_str: String = row.get(6).map_err(read)?;
    let status_str: String = row.get(8).map_err(read)?;

    let resolved_capability = match capability_str {
        Some(s) => Some(
            s.parse::<Capability>()
                .map_err(StorageError::Serialization)?,
        ),
        None => None,
    };
    let slots: Slots = serde_json::from_str(&slots_str)
        .map_err(|e| StorageError::Serialization(format!("slots: {e}")))?;
    let status = InteractionStatus::parse(&status_str)
        .ok_or_else(|| StorageError::Serialization(format!("unknown status: {status_str}")))?;

    Ok(Interaction {
        id: row.get(0).map_err(read)?,
        request_id: Uuid::parse_str(&request_str).unwrap_or_else(|_| Uuid::nil()),
        session_id: row.get(2).map_err(read)?,
        timestamp: parse_datetime(&timestamp_str),
        raw_text: row.get(4).map_err(read)?,
        resolved_capability,
        slots,
        response_summary: row.get(7).map_err(read)?,
        status,
        error_kind: row.get(9).ok(),
    })
}

fn row_to_file_entry(row: &libsql::Row) -> Result<FileIndexEntry, StorageError> {
    let read = |e: libsql::Error| StorageError::Query(format!("read file_index row: {e}"));
    let size: i64 = row.get(1).map_err(read)?;
    let last_seen: String = row.get(3).map_err(read)?;
    let modified: Option<String> = row.get(4).ok();
    Ok(FileIndexEntry {
        path: row.get(0).map_err(read)?,
        size: size.max(0) as u64,
        content_hash: row.get(2).map_err(read)?,
        last_seen: parse_datetime(&last_seen),
        modified: modified.as_deref().map(parse_datetime),
    })
}

/// Build the WHERE/ORDER/LIMIT tail for an interaction query.
fn interaction_query(filter: &InteractionFilter) -> (String, Vec<Value>) {
    let mut sql = format!("SELECT {INTERACTION_COLUMNS} FROM interactions WHERE 1 = 1");
    let mut args: Vec<Value> = Vec::new();

    let mut push = |sql: &mut String, clause: &str, value: Value| {
        args.push(value);
        sql.push_str(&clause.replace("?N", &format!("?{}", args.len())));
    };

    if let Some(since) = filter.since {
        push(&mut sql, " AND timestamp >= ?N", Value::Text(fmt_ts(since)));
    }
    if let Some(until) = filter.until {
        push(&mut sql, " AND timestamp < ?N", Value::Text(fmt_ts(until)));
    }
    if let Some(capability) = filter.capability {
        push(
            &mut sql,
            " AND capability = ?N",
            Value::Text(capability.as_str().to_string()),
        );
    }
    if let Some(status) = filter.status {
        push(
            &mut sql,
            " AND status = ?N",
            Value::Text(status.as_str().to_string()),
        );
    }
    if let Some(session) = &filter.session_id {
        push(&mut sql, " AND session_id = ?N", Value::Text(session.clone()));
    }
    // Every term must appear somewhere, in any order.
    if let Some(text) = &filter.text {
        for term in text.split_whitespace() {
            push(
                &mut sql,
                " AND (instr(lower(raw_text), ?N) > 0 OR instr(lower(response_summary), ?N) > 0)",
                Value::Text(term.to_lowercase()),
            );
        }
    }
    if let Some(after) = filter.after_id {
        push(&mut sql, " AND id > ?N", Value::Integer(after));
    }

    sql.push_str(" ORDER BY id ASC");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    (sql, args)
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl MemoryStore for LibSqlBackend {
    async fn append_interaction(&self, record: &NewInteraction) -> Result<i64, StorageError> {
        let slots = serde_json::to_string(&record.slots)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let _guard = self.lock_for_write().await?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO interactions (request_id, session_id, timestamp, raw_text, capability,
                slots, response_summary, status, error_kind)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.request_id.to_string(),
                record.session_id.clone(),
                fmt_ts(record.timestamp),
                record.raw_text.clone(),
                opt_text(record.resolved_capability.map(|c| c.as_str())),
                slots,
                record.response_summary.clone(),
                record.status.as_str(),
                opt_text(record.error_kind.as_deref()),
            ],
        )
        .await
        .map_err(|e| StorageError::Query(format!("append_interaction: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(id, status = %record.status, "Interaction appended");
        Ok(id)
    }

    async fn query_interactions(
        &self,
        filter: &InteractionFilter,
    ) -> Result<Vec<Interaction>, StorageError> {
        self.ensure_open()?;
        let (sql, args) = interaction_query(filter);
        let mut rows = self
            .conn()
            .query(&sql, libsql::params::Params::Positional(args))
            .await
            .map_err(|e| StorageError::Query(format!("query_interactions: {e}")))?;

        let mut interactions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StorageError::Query(format!("query_interactions: {e}")))?
        {
            interactions.push(row_to_interaction(&row)?);
        }
        Ok(interactions)
    }

    async fn record_received(&self, request: &ReceivedRequest) -> Result<(), StorageError> {
        let _guard = self.lock_for_write().await?;
        self.conn()
            .execute(
                "INSERT INTO received_requests (request_id, session_id, raw_text, received_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    request.request_id.to_string(),
                    request.session_id.clone(),
                    request.raw_text.clone(),
                    fmt_ts(request.received_at),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("record_received: {e}")))?;
        Ok(())
    }

    // ── Preferences ─────────────────────────────────────────────────

    async fn get_preference(&self, key: &str) -> Result<Option<Preference>, StorageError> {
        self.ensure_open()?;
        let mut rows = self
            .conn()
            .query(
                "SELECT key, value, updated_at FROM preferences WHERE key = ?1",
                params![key],
            )
            .await
            .map_err(|e| StorageError::Query(format!("get_preference: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let read = |e: libsql::Error| StorageError::Query(format!("get_preference: {e}"));
                let updated: String = row.get(2).map_err(read)?;
                Ok(Some(Preference {
                    key: row.get(0).map_err(read)?,
                    value: row.get(1).map_err(read)?,
                    updated_at: parse_datetime(&updated),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::Query(format!("get_preference: {e}"))),
        }
    }

    async fn set_preference(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock_for_write().await?;
        let now = fmt_ts(Utc::now());
        self.conn()
            .execute(
                "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                 WHERE excluded.updated_at >= preferences.updated_at",
                params![key, value, now],
            )
            .await
            .map_err(|e| StorageError::Query(format!("set_preference: {e}")))?;
        debug!(key, "Preference set");
        Ok(())
    }

    async fn next_sequence(&self, key: &str) -> Result<u64, StorageError> {
        let _guard = self.lock_for_write().await?;
        let now = fmt_ts(Utc::now());
        let mut rows = self
            .conn()
            .query(
                "INSERT INTO preferences (key, value, updated_at) VALUES (?1, '1', ?2)
                 ON CONFLICT (key) DO UPDATE SET
                    value = CAST(CAST(preferences.value AS INTEGER) + 1 AS TEXT),
                    updated_at = excluded.updated_at
                 RETURNING value",
                params![key, now],
            )
            .await
            .map_err(|e| StorageError::Query(format!("next_sequence: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StorageError::Query(format!("next_sequence: {e}")))?
            .ok_or_else(|| StorageError::Query("next_sequence: no row returned".into()))?;
        let value: String = row
            .get(0)
            .map_err(|e| StorageError::Query(format!("next_sequence: {e}")))?;
        let next = value
            .parse::<u64>()
            .map_err(|e| StorageError::Serialization(format!("sequence {key}: {e}")))?;
        debug!(key, next, "Sequence advanced");
        Ok(next)
    }

    // ── File index ──────────────────────────────────────────────────

    async fn upsert_file_index(&self, entries: &[FileIndexEntry]) -> Result<usize, StorageError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let _guard = self.lock_for_write().await?;
        let now = fmt_ts(Utc::now());

        // Dropping the transaction on error rolls the whole batch back.
        let tx = self
            .conn()
            .transaction()
            .await
            .map_err(|e| StorageError::Query(format!("upsert_file_index begin: {e}")))?;
        for entry in entries {
            tx.execute(
                "INSERT INTO file_index (path, size, content_hash, last_seen, modified)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (path) DO UPDATE SET size = excluded.size,
                    content_hash = excluded.content_hash, last_seen = excluded.last_seen,
                    modified = excluded.modified",
                params![
                    entry.path.clone(),
                    entry.size as i64,
                    entry.content_hash.clone(),
                    now.clone(),
                    opt_text(entry.modified.map(fmt_ts).as_deref()),
                ],
            )
            .await
            .map_err(|e| StorageError::Query(format!("upsert_file_index {}: {e}", entry.path)))?;
        }
        tx.commit()
            .await
            .map_err(|e| StorageError::Query(format!("upsert_file_index commit: {e}")))?;

        debug!(count = entries.len(), "File index updated");
        Ok(entries.len())
    }

    async fn list_file_index(
        &self,
        prefix: Option<&str>,
    ) -> Result<Vec<FileIndexEntry>, StorageError> {
        self.ensure_open()?;
        // "/data/photos" covers itself and "/data/photos/..." but not "/data/photos-old".
        let dir = prefix
            .map(|p| p.trim_end_matches('/'))
            .filter(|p| !p.is_empty());
        let mut rows = self
            .conn()
            .query(
                "SELECT path, size, content_hash, last_seen, modified FROM file_index
                 WHERE ?1 IS NULL OR path = ?1 OR substr(path, 1, length(?1) + 1) = ?1 || '/'
                 ORDER BY path ASC",
                params![opt_text(dir)],
            )
            .await
            .map_err(|e| StorageError::Query(format!("list_file_index: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StorageError::Query(format!("list_file_index: {e}")))?
        {
            entries.push(row_to_file_entry(&row)?);
        }
        Ok(entries)
    }

    async fn find_duplicates(&self) -> Result<DuplicateGroups, StorageError> {
        self.ensure_open()?;
        let mut rows = self
            .conn()
            .query(
                "SELECT content_hash, path FROM file_index
                 WHERE size > 0 AND content_hash != '' AND content_hash IN (
                     SELECT content_hash FROM file_index
                     WHERE size > 0 AND content_hash != ''
                     GROUP BY content_hash HAVING COUNT(*) >= 2
                 )
                 ORDER BY content_hash, path",
                (),
            )
            .await
            .map_err(|e| StorageError::Query(format!("find_duplicates: {e}")))?;

        let mut groups = DuplicateGroups::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StorageError::Query(format!("find_duplicates: {e}")))?
        {
            let read = |e: libsql::Error| StorageError::Query(format!("find_duplicates: {e}"));
            let hash: String = row.get(0).map_err(read)?;
            let path: String = row.get(1).map_err(read)?;
            groups.entry(hash).or_default().insert(path);
        }
        Ok(groups)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    async fn stats(&self) -> Result<StoreStats, StorageError> {
        self.ensure_open()?;
        Ok(StoreStats {
            interactions: self.count("interactions").await?,
            preferences: self.count("preferences").await?,
            indexed_files: self.count("file_index").await?,
            received_requests: self.count("received_requests").await?,
        })
    }

    async fn close(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Memory store closed");
        Ok(())
    }
}
