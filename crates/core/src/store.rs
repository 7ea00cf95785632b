// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! SQLite-backed durable queue of operations.
//!
//! The [`QueueStore`] is the single source of truth for work the server has
//! not confirmed yet. Every write is committed (WAL journal,
//! `synchronous = FULL`) before the call returns, so a crash right after an
//! enqueue never loses the intent.
//!
//! Writes go through [`StoreTx`], one immediate SQLite transaction per call.
//! Updates are compare-and-set on `(status, updatedAt)`: a patch built from a
//! stale read fails with [`Error::StaleUpdate`] instead of clobbering a
//! concurrent change.

use std::cell::RefCell;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::op::{LastError, OpStatus, Operation, TEMP_ID_PREFIX};

/// SQL schema for the operation queue.
pub const SCHEMA: &str = r#"
-- One row per intended mutation
CREATE TABLE IF NOT EXISTS operations (
    id TEXT PRIMARY KEY,
    resource_kind TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    payload TEXT NOT NULL,
    base_version INTEGER,
    idempotency_key TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    retry_count INTEGER NOT NULL DEFAULT 0,
    max_retries INTEGER NOT NULL,
    next_attempt_at TEXT NOT NULL,
    last_error TEXT,                 -- JSON {class, message}
    server_id TEXT,
    sequence_in_resource INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Per-resource replay counters
CREATE TABLE IF NOT EXISTS resource_sequences (
    resource_kind TEXT NOT NULL,
    resource_id TEXT NOT NULL,
    last_sequence INTEGER NOT NULL,
    PRIMARY KEY (resource_kind, resource_id)
);

-- Temporary ids already resolved to server ids
CREATE TABLE IF NOT EXISTS id_aliases (
    resource_kind TEXT NOT NULL,
    temp_id TEXT NOT NULL,
    server_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (resource_kind, temp_id)
);

CREATE INDEX IF NOT EXISTS idx_operations_status ON operations(status, next_attempt_at);
CREATE INDEX IF NOT EXISTS idx_operations_resource
    ON operations(resource_kind, resource_id, sequence_in_resource);
"#;

const OP_COLUMNS: &str = "id, resource_kind, resource_id, kind, payload, base_version, \
     idempotency_key, status, retry_count, max_retries, next_attempt_at, last_error, \
     server_id, sequence_in_resource, created_at, updated_at";

/// Formats a timestamp the way it is stored: RFC3339 UTC with millisecond
/// precision, so lexical order in SQL matches chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a string value from the database, returning a rusqlite error on parse failure.
fn parse_db<T: std::str::FromStr>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    value.parse().map_err(|_| corrupted(format!("invalid value '{value}' in column '{column}'")))
}

/// Parse an RFC3339 timestamp from the database.
fn parse_timestamp(
    value: &str,
    column: &str,
) -> std::result::Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupted(format!("invalid timestamp '{value}' in column '{column}'")))
}

fn parse_json<T: serde::de::DeserializeOwned>(
    value: &str,
    column: &str,
) -> std::result::Result<T, rusqlite::Error> {
    serde_json::from_str(value)
        .map_err(|e| corrupted(format!("invalid JSON in column '{column}': {e}")))
}

fn corrupted(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(Error::CorruptedData(message)),
    )
}

fn row_to_operation(row: &Row<'_>) -> std::result::Result<Operation, rusqlite::Error> {
    let kind: String = row.get(3)?;
    let payload: String = row.get(4)?;
    let base_version: Option<i64> = row.get(5)?;
    let status: String = row.get(7)?;
    let next_attempt_at: String = row.get(10)?;
    let last_error: Option<String> = row.get(11)?;
    let sequence: i64 = row.get(13)?;
    let created_at: String = row.get(14)?;
    let updated_at: String = row.get(15)?;

    Ok(Operation {
        id: row.get(0)?,
        resource_kind: row.get(1)?,
        resource_id: row.get(2)?,
        kind: parse_db(&kind, "kind")?,
        payload: parse_json(&payload, "payload")?,
        base_version: base_version.map(|v| v as u64),
        idempotency_key: row.get(6)?,
        status: parse_db(&status, "status")?,
        retry_count: row.get(8)?,
        max_retries: row.get(9)?,
        next_attempt_at: parse_timestamp(&next_attempt_at, "next_attempt_at")?,
        last_error: last_error
            .map(|e| parse_json::<LastError>(&e, "last_error"))
            .transpose()?,
        server_id: row.get(12)?,
        sequence_in_resource: sequence as u64,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}

fn query_ops(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Operation>> {
    let mut stmt = conn.prepare(sql)?;
    let ops = stmt
        .query_map(params, row_to_operation)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ops)
}

fn find_op(conn: &Connection, id: &str) -> Result<Option<Operation>> {
    let op = conn
        .query_row(
            &format!("SELECT {OP_COLUMNS} FROM operations WHERE id = ?1"),
            params![id],
            row_to_operation,
        )
        .optional()?;
    Ok(op)
}

/// Run schema creation on a database connection.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// A mutation of the store, reported to listeners after commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Appended { id: String },
    Updated { id: String, status: OpStatus },
    Removed { count: usize },
    Rewritten { count: usize },
}

/// Observer notified once per committed transaction that changed the queue.
pub trait ChangeListener: Send + Sync {
    fn on_commit(&self, changes: &[StoreChange]);
}

/// A compare-and-set patch for one operation.
///
/// Built from the operation as last read; applying it fails with
/// [`Error::StaleUpdate`] if the stored status or `updatedAt` moved since.
#[derive(Debug, Clone, PartialEq)]
pub struct OpPatch {
    expected_status: OpStatus,
    expected_updated_at: DateTime<Utc>,
    pub status: Option<OpStatus>,
    pub retry_count: Option<u32>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<Option<LastError>>,
    pub server_id: Option<String>,
}

impl OpPatch {
    /// Starts an empty patch guarded by the operation's current state.
    pub fn against(op: &Operation) -> Self {
        OpPatch {
            expected_status: op.status,
            expected_updated_at: op.updated_at,
            status: None,
            retry_count: None,
            next_attempt_at: None,
            last_error: None,
            server_id: None,
        }
    }

    pub fn status(mut self, status: OpStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn next_attempt_at(mut self, at: DateTime<Utc>) -> Self {
        self.next_attempt_at = Some(at);
        self
    }

    pub fn last_error(mut self, error: Option<LastError>) -> Self {
        self.last_error = Some(error);
        self
    }

    pub fn server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = Some(server_id.into());
        self
    }
}

/// Writes performed inside one store transaction.
pub struct StoreTx<'a> {
    conn: &'a Connection,
    now: DateTime<Utc>,
    changes: RefCell<Vec<StoreChange>>,
}

impl StoreTx<'_> {
    /// The transaction's timestamp (millisecond precision).
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn record(&self, change: StoreChange) {
        self.changes.borrow_mut().push(change);
    }

    /// Next timestamp for a row last touched at `previous`: strictly later.
    fn bump(&self, previous: DateTime<Utc>) -> DateTime<Utc> {
        self.now.max(previous + Duration::milliseconds(1))
    }

    /// Returns the server id a temporary id was remapped to, if any.
    pub fn resolve_alias(&self, resource_kind: &str, resource_id: &str) -> Result<Option<String>> {
        let server_id = self
            .conn
            .query_row(
                "SELECT server_id FROM id_aliases WHERE resource_kind = ?1 AND temp_id = ?2",
                params![resource_kind, resource_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(server_id)
    }

    /// Reads and increments the replay counter of a resource.
    pub fn next_sequence(&self, resource_kind: &str, resource_id: &str) -> Result<u64> {
        let next: i64 = self.conn.query_row(
            "INSERT INTO resource_sequences (resource_kind, resource_id, last_sequence)
             VALUES (?1, ?2, 1)
             ON CONFLICT (resource_kind, resource_id)
             DO UPDATE SET last_sequence = last_sequence + 1
             RETURNING last_sequence",
            params![resource_kind, resource_id],
            |row| row.get(0),
        )?;
        Ok(next as u64)
    }

    /// Appends a new operation.
    pub fn append(&self, op: &Operation) -> Result<()> {
        let last_error = op.last_error.as_ref().map(serde_json::to_string).transpose()?;
        self.conn.execute(
            &format!(
                "INSERT INTO operations ({OP_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                op.id,
                op.resource_kind,
                op.resource_id,
                op.kind.as_str(),
                serde_json::to_string(&op.payload)?,
                op.base_version.map(|v| v as i64),
                op.idempotency_key,
                op.status.as_str(),
                op.retry_count,
                op.max_retries,
                format_timestamp(op.next_attempt_at),
                last_error,
                op.server_id,
                op.sequence_in_resource as i64,
                format_timestamp(op.created_at),
                format_timestamp(op.updated_at),
            ],
        )?;
        self.record(StoreChange::Appended { id: op.id.clone() });
        Ok(())
    }

    /// Gets an operation by id.
    pub fn get(&self, id: &str) -> Result<Operation> {
        find_op(self.conn, id)?.ok_or_else(|| Error::OperationNotFound(id.to_string()))
    }

    /// Applies a compare-and-set patch and returns the updated operation.
    pub fn update(&self, id: &str, patch: &OpPatch) -> Result<Operation> {
        let current = self.get(id)?;
        if current.status != patch.expected_status
            || format_timestamp(current.updated_at) != format_timestamp(patch.expected_updated_at)
        {
            return Err(Error::StaleUpdate { id: id.to_string() });
        }

        let mut next = current.clone();
        if let Some(status) = patch.status {
            if status != current.status && !current.status.can_transition_to(status) {
                return Err(Error::InvalidTransition {
                    from: current.status.to_string(),
                    to: status.to_string(),
                });
            }
            next.status = status;
        }
        if let Some(retry_count) = patch.retry_count {
            next.retry_count = retry_count;
        }
        if let Some(at) = patch.next_attempt_at {
            next.next_attempt_at = at.trunc_subsecs(3);
        }
        if let Some(ref last_error) = patch.last_error {
            next.last_error = last_error.clone();
        }
        if let Some(ref server_id) = patch.server_id {
            next.server_id = Some(server_id.clone());
        }
        next.updated_at = self.bump(current.updated_at);

        self.write(&current, &next)?;
        self.record(StoreChange::Updated {
            id: id.to_string(),
            status: next.status,
        });
        Ok(next)
    }

    /// Writes the mutable columns of `next`, guarded by `current`.
    fn write(&self, current: &Operation, next: &Operation) -> Result<()> {
        let last_error = next.last_error.as_ref().map(serde_json::to_string).transpose()?;
        let rows = self.conn.execute(
            "UPDATE operations
             SET resource_id = ?1, payload = ?2, status = ?3, retry_count = ?4,
                 next_attempt_at = ?5, last_error = ?6, server_id = ?7, updated_at = ?8
             WHERE id = ?9 AND status = ?10 AND updated_at = ?11",
            params![
                next.resource_id,
                serde_json::to_string(&next.payload)?,
                next.status.as_str(),
                next.retry_count,
                format_timestamp(next.next_attempt_at),
                last_error,
                next.server_id,
                format_timestamp(next.updated_at),
                current.id,
                current.status.as_str(),
                format_timestamp(current.updated_at),
            ],
        )?;
        if rows == 0 {
            return Err(Error::StaleUpdate {
                id: current.id.clone(),
            });
        }
        Ok(())
    }

    /// Deletes an operation that is still pending.
    pub fn remove_pending(&self, id: &str) -> Result<Operation> {
        let op = self.get(id)?;
        if op.status != OpStatus::Pending {
            return Err(Error::NotCancellable {
                id: id.to_string(),
                status: op.status.to_string(),
            });
        }
        let rows = self.conn.execute(
            "DELETE FROM operations WHERE id = ?1 AND status = 'pending'",
            params![id],
        )?;
        if rows == 0 {
            return Err(Error::StaleUpdate { id: id.to_string() });
        }
        self.record(StoreChange::Removed { count: 1 });
        Ok(op)
    }

    /// Moves every operation in `from` back to pending with `retry_count`
    /// set by `reset_retries`. Returns the number of operations touched.
    fn requeue_all(&self, from: OpStatus, reset_retries: bool) -> Result<usize> {
        let ops = query_ops(
            self.conn,
            &format!("SELECT {OP_COLUMNS} FROM operations WHERE status = ?1 ORDER BY created_at, id"),
            params![from.as_str()],
        )?;
        for op in &ops {
            let mut next = op.clone();
            next.status = OpStatus::Pending;
            next.next_attempt_at = self.now;
            if reset_retries {
                next.retry_count = 0;
                next.last_error = None;
            }
            next.updated_at = self.bump(op.updated_at);
            self.write(op, &next)?;
            self.record(StoreChange::Updated {
                id: op.id.clone(),
                status: OpStatus::Pending,
            });
        }
        Ok(ops.len())
    }

    /// Rewrites queued work that targets a temporary id so it targets the
    /// server-assigned id instead, and remembers the alias for future
    /// enqueues. Returns the number of operations rewritten.
    pub fn remap_resource(&self, resource_kind: &str, temp_id: &str, server_id: &str) -> Result<usize> {
        let mut rewritten = 0;

        let targeting = query_ops(
            self.conn,
            &format!(
                "SELECT {OP_COLUMNS} FROM operations
                 WHERE resource_kind = ?1 AND resource_id = ?2 AND status != 'processing'"
            ),
            params![resource_kind, temp_id],
        )?;
        for op in &targeting {
            let mut next = op.clone();
            next.resource_id = server_id.to_string();
            if op.status == OpStatus::Pending {
                replace_string_values(&mut next.payload, temp_id, server_id);
            }
            next.updated_at = self.bump(op.updated_at);
            self.write(op, &next)?;
            rewritten += 1;
        }

        // Pending work on other resources may embed the id in its payload
        // (e.g. a diagnostic pointing at the new device).
        let needle = format!("%{}%", Value::String(temp_id.to_string()));
        let referencing = query_ops(
            self.conn,
            &format!(
                "SELECT {OP_COLUMNS} FROM operations
                 WHERE status = 'pending' AND payload LIKE ?1
                   AND NOT (resource_kind = ?2 AND resource_id = ?3)"
            ),
            params![needle, resource_kind, server_id],
        )?;
        for op in &referencing {
            let mut next = op.clone();
            if replace_string_values(&mut next.payload, temp_id, server_id) {
                next.updated_at = self.bump(op.updated_at);
                self.write(op, &next)?;
                rewritten += 1;
            }
        }

        let last: Option<i64> = self
            .conn
            .query_row(
                "SELECT last_sequence FROM resource_sequences
                 WHERE resource_kind = ?1 AND resource_id = ?2",
                params![resource_kind, temp_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(last) = last {
            self.conn.execute(
                "DELETE FROM resource_sequences WHERE resource_kind = ?1 AND resource_id = ?2",
                params![resource_kind, temp_id],
            )?;
            self.conn.execute(
                "INSERT INTO resource_sequences (resource_kind, resource_id, last_sequence)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (resource_kind, resource_id)
                 DO UPDATE SET last_sequence = MAX(last_sequence, excluded.last_sequence)",
                params![resource_kind, server_id, last],
            )?;
        }

        self.conn.execute(
            "INSERT OR REPLACE INTO id_aliases (resource_kind, temp_id, server_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![resource_kind, temp_id, server_id, format_timestamp(self.now)],
        )?;

        if rewritten > 0 {
            self.record(StoreChange::Rewritten { count: rewritten });
        }
        Ok(rewritten)
    }
}

/// Replaces every JSON string equal to `from` with `to`. Returns true if
/// anything changed.
fn replace_string_values(value: &mut Value, from: &str, to: &str) -> bool {
    match value {
        Value::String(s) if s == from => {
            *s = to.to_string();
            true
        }
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |changed, item| replace_string_values(item, from, to) || changed),
        Value::Object(map) => map
            .values_mut()
            .fold(false, |changed, item| replace_string_values(item, from, to) || changed),
        _ => false,
    }
}

/// Durable operation queue backed by SQLite.
pub struct QueueStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    listeners: Mutex<Vec<Arc<dyn ChangeListener>>>,
}

impl QueueStore {
    /// Opens or creates a queue database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = FULL;
             PRAGMA busy_timeout = 5000;",
        )?;
        run_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a transient in-memory queue.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        QueueStore {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemClock),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the clock used for every timestamp the store writes.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Current time at the store's millisecond precision.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(3)
    }

    /// Registers an observer for committed mutations.
    pub fn add_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(listener);
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Runs `f` in one immediate transaction; listeners hear about the
    /// changes only after the commit succeeds.
    pub fn transaction<T>(&self, f: impl FnOnce(&StoreTx<'_>) -> Result<T>) -> Result<T> {
        let (out, changes) = {
            let mut conn = self.lock();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let store_tx = StoreTx {
                conn: &tx,
                now: self.now(),
                changes: RefCell::new(Vec::new()),
            };
            let out = f(&store_tx)?;
            let changes = store_tx.changes.into_inner();
            tx.commit()?;
            (out, changes)
        };

        if !changes.is_empty() {
            let listeners = self
                .listeners
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            for listener in &listeners {
                listener.on_commit(&changes);
            }
        }
        Ok(out)
    }

    /// Appends an operation.
    pub fn append(&self, op: &Operation) -> Result<()> {
        self.transaction(|tx| tx.append(op))
    }

    /// Applies a compare-and-set patch.
    pub fn update(&self, id: &str, patch: &OpPatch) -> Result<Operation> {
        self.transaction(|tx| tx.update(id, patch))
    }

    /// Gets an operation by id.
    pub fn get(&self, id: &str) -> Result<Operation> {
        self.find(id)?
            .ok_or_else(|| Error::OperationNotFound(id.to_string()))
    }

    /// Gets an operation by id, if present.
    pub fn find(&self, id: &str) -> Result<Option<Operation>> {
        find_op(&self.lock(), id)
    }

    /// Lists operations with the given status, oldest first.
    pub fn list_by_status(&self, status: OpStatus) -> Result<Vec<Operation>> {
        query_ops(
            &self.lock(),
            &format!(
                "SELECT {OP_COLUMNS} FROM operations WHERE status = ?1
                 ORDER BY created_at, id"
            ),
            params![status.as_str()],
        )
    }

    /// Lists every operation, oldest first.
    pub fn list_all(&self) -> Result<Vec<Operation>> {
        query_ops(
            &self.lock(),
            &format!("SELECT {OP_COLUMNS} FROM operations ORDER BY created_at, id"),
            [],
        )
    }

    /// Lists the operations of one resource in replay order.
    pub fn list_for_resource(&self, resource_kind: &str, resource_id: &str) -> Result<Vec<Operation>> {
        query_ops(
            &self.lock(),
            &format!(
                "SELECT {OP_COLUMNS} FROM operations
                 WHERE resource_kind = ?1 AND resource_id = ?2
                 ORDER BY sequence_in_resource, id"
            ),
            params![resource_kind, resource_id],
        )
    }

    /// Pending operations the engine may dispatch at `now`.
    ///
    /// Only the head of each resource chain qualifies: an operation is
    /// skipped while an earlier-sequenced sibling is still pending or any
    /// sibling is processing. Results therefore target distinct resources.
    ///
    /// An operation whose payload mentions the temporary id of another
    /// resource also waits until that resource's create has settled, so the
    /// reference is rewritten to the server id before it leaves the queue.
    pub fn eligible(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Operation>> {
        query_ops(
            &self.lock(),
            &format!(
                "SELECT {OP_COLUMNS} FROM operations o
                 WHERE o.status = 'pending' AND o.next_attempt_at <= ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM operations p
                       WHERE p.resource_kind = o.resource_kind
                         AND p.resource_id = o.resource_id
                         AND p.id != o.id
                         AND (p.status = 'processing'
                              OR (p.status = 'pending'
                                  AND (p.sequence_in_resource < o.sequence_in_resource
                                       OR (p.sequence_in_resource = o.sequence_in_resource
                                           AND p.id < o.id)))))
                   AND NOT EXISTS (
                       SELECT 1 FROM operations c, json_tree(o.payload) j
                       WHERE c.kind = 'create'
                         AND c.status IN ('pending', 'processing')
                         AND substr(c.resource_id, 1, length(?3)) = ?3
                         AND NOT (c.resource_kind = o.resource_kind
                                  AND c.resource_id = o.resource_id)
                         AND j.type = 'text' AND j.atom = c.resource_id
                         AND NOT EXISTS (
                             SELECT 1 FROM id_aliases a
                             WHERE a.resource_kind = c.resource_kind
                               AND a.temp_id = c.resource_id))
                 ORDER BY o.created_at, o.id
                 LIMIT ?2"
            ),
            params![format_timestamp(now), limit as i64, TEMP_ID_PREFIX],
        )
    }

    /// Earliest `nextAttemptAt` after `now` among pending operations: when
    /// the next scheduled retry becomes due.
    pub fn earliest_retry(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        let earliest: Option<String> = self.lock().query_row(
            "SELECT MIN(next_attempt_at) FROM operations
             WHERE status = 'pending' AND next_attempt_at > ?1",
            params![format_timestamp(now)],
            |row| row.get(0),
        )?;
        earliest
            .map(|s| parse_timestamp(&s, "next_attempt_at").map_err(Error::from))
            .transpose()
    }

    /// Deletes completed operations last updated before `cutoff`.
    pub fn remove_completed_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.transaction(|tx| {
            let count = tx.conn.execute(
                "DELETE FROM operations WHERE status = 'completed' AND updated_at < ?1",
                params![format_timestamp(cutoff)],
            )?;
            if count > 0 {
                tx.record(StoreChange::Removed { count });
            }
            Ok(count)
        })
    }

    /// Deletes every completed operation regardless of age.
    pub fn remove_all_completed(&self) -> Result<usize> {
        self.transaction(|tx| {
            let count = tx
                .conn
                .execute("DELETE FROM operations WHERE status = 'completed'", [])?;
            if count > 0 {
                tx.record(StoreChange::Removed { count });
            }
            Ok(count)
        })
    }

    /// Deletes a pending operation; anything else is not cancellable.
    pub fn remove_pending(&self, id: &str) -> Result<Operation> {
        self.transaction(|tx| tx.remove_pending(id))
    }

    /// Resets every failed operation to pending with a cleared retry count.
    pub fn reset_failed(&self) -> Result<usize> {
        self.transaction(|tx| tx.requeue_all(OpStatus::Failed, true))
    }

    /// Returns operations a crash left in `processing` to `pending`.
    ///
    /// The retry count is untouched: the interrupted attempt is replayed
    /// with the same idempotency key.
    pub fn recover_interrupted(&self) -> Result<usize> {
        self.transaction(|tx| tx.requeue_all(OpStatus::Processing, false))
    }

    /// See [`StoreTx::remap_resource`].
    pub fn remap_resource(&self, resource_kind: &str, temp_id: &str, server_id: &str) -> Result<usize> {
        self.transaction(|tx| tx.remap_resource(resource_kind, temp_id, server_id))
    }

    /// Returns the server id a temporary id was remapped to, if any.
    pub fn resolve_alias(&self, resource_kind: &str, resource_id: &str) -> Result<Option<String>> {
        self.transaction(|tx| tx.resolve_alias(resource_kind, resource_id))
    }

    /// Number of operations per status.
    pub fn status_counts(&self) -> Result<Vec<(OpStatus, usize)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM operations GROUP BY status")?;
        let counts = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((parse_db::<OpStatus>(&status, "status")?, count as usize))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(counts)
    }

    /// Total payload bytes of operations not yet completed.
    pub fn outstanding_payload_bytes(&self) -> Result<u64> {
        let bytes: i64 = self.lock().query_row(
            "SELECT COALESCE(SUM(LENGTH(CAST(payload AS BLOB))), 0)
             FROM operations WHERE status != 'completed'",
            [],
            |row| row.get(0),
        )?;
        Ok(bytes as u64)
    }

    /// Most recently updated operations carrying an error, newest first.
    pub fn recent_errors(&self, limit: usize) -> Result<Vec<Operation>> {
        query_ops(
            &self.lock(),
            &format!(
                "SELECT {OP_COLUMNS} FROM operations WHERE last_error IS NOT NULL
                 ORDER BY updated_at DESC, id DESC LIMIT ?1"
            ),
            params![limit as i64],
        )
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
