//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the checkpoint store traits.
//! Every mutation runs in its own transaction, and the status transition guard
//! runs inside the same transaction as the write it protects.

use crate::codes::Code;
use crate::state::{FailureRecord, ProgressRecord, ProgressStatus, Variant};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    check_transition, FailureMap, FailureStore, ProgressStore, StorageError, StorageResult,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file; parent directories are created
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

struct ProgressRow {
    code: String,
    status: String,
    current_page: u32,
    variant: Option<String>,
    attempts: u32,
    updated_at: String,
}

impl ProgressRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            code: row.get(0)?,
            status: row.get(1)?,
            current_page: row.get(2)?,
            variant: row.get(3)?,
            attempts: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    fn into_record(self) -> StorageResult<ProgressRecord> {
        let status = ProgressStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::Corrupt(format!(
                "unknown status '{}' for code {}",
                self.status, self.code
            ))
        })?;

        Ok(ProgressRecord {
            code: Code::from(self.code),
            status,
            current_page: self.current_page,
            variant: self.variant.as_deref().map(Variant::from),
            attempts: self.attempts,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

const PROGRESS_COLUMNS: &str = "code, status, current_page, variant, attempts, updated_at";

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}

fn read_progress(conn: &Connection, code: &Code) -> StorageResult<Option<ProgressRecord>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM progress WHERE code = ?1", PROGRESS_COLUMNS),
            params![code.as_str()],
            ProgressRow::from_row,
        )
        .optional()?;

    row.map(ProgressRow::into_record).transpose()
}

fn write_progress(conn: &Connection, record: &ProgressRecord) -> StorageResult<()> {
    conn.execute(
        "INSERT INTO progress (code, status, current_page, variant, attempts, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(code) DO UPDATE SET
            status = excluded.status,
            current_page = excluded.current_page,
            variant = excluded.variant,
            attempts = excluded.attempts,
            updated_at = excluded.updated_at",
        params![
            record.code.as_str(),
            record.status.to_db_string(),
            record.current_page,
            record.variant.as_ref().map(Variant::as_str),
            record.attempts,
            record.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

impl ProgressStore for SqliteStorage {
    fn load_progress(&self) -> StorageResult<HashMap<Code, ProgressRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM progress", PROGRESS_COLUMNS))?;

        let rows = stmt.query_map([], ProgressRow::from_row)?;

        let mut records = HashMap::new();
        for row in rows {
            let record = row?.into_record()?;
            records.insert(record.code.clone(), record);
        }

        Ok(records)
    }

    fn get_progress(&self, code: &Code) -> StorageResult<Option<ProgressRecord>> {
        read_progress(&self.conn, code)
    }

    fn record(
        &mut self,
        code: &Code,
        status: ProgressStatus,
        current_page: u32,
        variant: Option<&Variant>,
    ) -> StorageResult<ProgressRecord> {
        let tx = self.conn.transaction()?;
        let existing = read_progress(&tx, code)?;

        if !check_transition(code, existing.as_ref().map(|r| r.status), status)? {
            tx.commit()?;
            return existing.ok_or_else(|| {
                StorageError::Corrupt(format!("completed record for {} vanished", code))
            });
        }

        let mut record = existing.unwrap_or_else(|| ProgressRecord::new(code.clone(), status));
        record.apply(status, current_page, variant);

        write_progress(&tx, &record)?;
        tx.commit()?;

        Ok(record)
    }

    fn record_attempt_failed(&mut self, code: &Code) -> StorageResult<u32> {
        let tx = self.conn.transaction()?;

        let mut record = read_progress(&tx, code)?
            .unwrap_or_else(|| ProgressRecord::new(code.clone(), ProgressStatus::Error));
        record.attempts += 1;
        record.updated_at = Utc::now();

        write_progress(&tx, &record)?;
        tx.commit()?;

        Ok(record.attempts)
    }

    fn is_completed(&self, code: &Code) -> StorageResult<bool> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM progress WHERE code = ?1",
                params![code.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        Ok(status.as_deref() == Some(ProgressStatus::Completed.to_db_string()))
    }

    fn reset_progress(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM progress", [])?;
        Ok(())
    }
}

struct FailureRow {
    code: String,
    variant: String,
    error_message: String,
    updated_at: String,
}

impl FailureRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            code: row.get(0)?,
            variant: row.get(1)?,
            error_message: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    fn into_record(self) -> StorageResult<FailureRecord> {
        Ok(FailureRecord {
            code: Code::from(self.code),
            variant: Variant::from(self.variant.as_str()),
            error_message: self.error_message,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl FailureStore for SqliteStorage {
    fn load_failures(&self) -> StorageResult<FailureMap> {
        let mut stmt = self.conn.prepare(
            "SELECT code, variant, error_message, updated_at FROM failures ORDER BY code, variant",
        )?;

        let rows = stmt.query_map([], FailureRow::from_row)?;

        let mut failures = FailureMap::new();
        for row in rows {
            let record = row?.into_record()?;
            failures
                .entry(record.code.clone())
                .or_default()
                .insert(record.variant.clone(), record);
        }

        Ok(failures)
    }

    fn record_failure(
        &mut self,
        code: &Code,
        variant: &Variant,
        message: &str,
    ) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO failures (code, variant, error_message, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(code, variant) DO UPDATE SET
                error_message = excluded.error_message,
                updated_at = excluded.updated_at",
            params![
                code.as_str(),
                variant.as_str(),
                message,
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn clear_failure(&mut self, code: &Code, variant: &Variant) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM failures WHERE code = ?1 AND variant = ?2",
            params![code.as_str(), variant.as_str()],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn failures_for(&self, code: &Code) -> StorageResult<Vec<FailureRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT code, variant, error_message, updated_at FROM failures
             WHERE code = ?1 ORDER BY variant",
        )?;

        let rows = stmt.query_map(params![code.as_str()], FailureRow::from_row)?;

        let mut failures = Vec::new();
        for row in rows {
            failures.push(row?.into_record()?);
        }

        Ok(failures)
    }

    fn reset_failures(&mut self) -> StorageResult<()> {
        self.conn.execute("DELETE FROM failures", [])?;
        Ok(())
    }
}
