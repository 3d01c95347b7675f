//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint store backends and
//! associated error types.

use crate::codes::Code;
use crate::state::{FailureRecord, ProgressRecord, ProgressStatus, Variant};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid status transition for {code}: {from} -> {to}")]
    InvalidTransition {
        code: Code,
        from: ProgressStatus,
        to: ProgressStatus,
    },

    #[error("Corrupt state: {0}")]
    Corrupt(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// All failures, keyed by code then variant
pub type FailureMap = BTreeMap<Code, BTreeMap<Variant, FailureRecord>>;

/// Durable mapping of code -> last-known traversal state
pub trait ProgressStore {
    /// Loads every progress record
    ///
    /// Returns an empty mapping if no prior state exists.
    fn load_progress(&self) -> StorageResult<HashMap<Code, ProgressRecord>>;

    /// Gets the record for one code
    fn get_progress(&self, code: &Code) -> StorageResult<Option<ProgressRecord>>;

    /// Writes a checkpoint for a code
    ///
    /// # Arguments
    ///
    /// * `code` - The code being checkpointed
    /// * `status` - The new status
    /// * `current_page` - Zero-based page the cursor points at
    /// * `variant` - Variant the page refers to; `None` keeps the stored one
    ///
    /// # Returns
    ///
    /// The record as persisted. Rewriting a completed record as completed is
    /// accepted and leaves it untouched; any other write that leaves
    /// `completed` fails with `StorageError::InvalidTransition`.
    fn record(
        &mut self,
        code: &Code,
        status: ProgressStatus,
        current_page: u32,
        variant: Option<&Variant>,
    ) -> StorageResult<ProgressRecord>;

    /// Increments the failed-attempt counter of a code, returning the new value
    fn record_attempt_failed(&mut self, code: &Code) -> StorageResult<u32>;

    /// Returns true if the code's status is `completed`
    fn is_completed(&self, code: &Code) -> StorageResult<bool> {
        Ok(self
            .get_progress(code)?
            .map(|record| record.status.is_terminal())
            .unwrap_or(false))
    }

    /// Deletes all progress records
    fn reset_progress(&mut self) -> StorageResult<()>;
}

/// Durable mapping of (code, variant) -> last error
pub trait FailureStore {
    /// Loads every failure record
    fn load_failures(&self) -> StorageResult<FailureMap>;

    /// Upserts the failure entry for one variant of a code
    fn record_failure(&mut self, code: &Code, variant: &Variant, message: &str)
        -> StorageResult<()>;

    /// Removes the failure entry for one variant
    ///
    /// The code itself disappears once it has no remaining variant failures.
    /// Returns true if an entry was removed.
    fn clear_failure(&mut self, code: &Code, variant: &Variant) -> StorageResult<bool>;

    /// Gets all failures recorded for one code
    fn failures_for(&self, code: &Code) -> StorageResult<Vec<FailureRecord>>;

    /// Deletes all failure records
    fn reset_failures(&mut self) -> StorageResult<()>;
}

/// A backend providing both stores
pub trait CheckpointStore: ProgressStore + FailureStore {}

impl<T: ProgressStore + FailureStore> CheckpointStore for T {}

/// Checks a status change against the record it would overwrite
///
/// Returns `Ok(false)` for the idempotent `completed -> completed` rewrite,
/// which callers must skip, and `Ok(true)` when the write should proceed.
pub(crate) fn check_transition(
    code: &Code,
    existing: Option<ProgressStatus>,
    next: ProgressStatus,
) -> StorageResult<bool> {
    match existing {
        None => Ok(true),
        Some(ProgressStatus::Completed) if next == ProgressStatus::Completed => Ok(false),
        Some(from) if from.can_transition_to(next) => Ok(true),
        // Re-opening a record that never got past pending is harmless
        Some(ProgressStatus::Pending) if next == ProgressStatus::Pending => Ok(true),
        Some(from) => Err(StorageError::InvalidTransition {
            code: code.clone(),
            from,
            to: next,
        }),
    }
}
