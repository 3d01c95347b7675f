//! Storage module for persisting checkpoints
//!
//! This module handles the durable state that makes a run resumable:
//! - The Progress Store (code -> status and page cursor)
//! - The Failure Store ((code, variant) -> last error)
//! - Two interchangeable backends: SQLite and a pair of JSON files
//! - The shared `CheckpointBook` both scan workers go through

mod book;
mod json;
mod schema;
mod sqlite;
mod traits;

pub use book::{lock_book, CheckpointBook, ClaimDecision, SharedBook};
pub use json::JsonFileStorage;
pub use sqlite::SqliteStorage;
pub use traits::{
    CheckpointStore, FailureMap, FailureStore, ProgressStore, StorageError, StorageResult,
};

use crate::config::{StateBackend, StateConfig};

/// Opens the SQLite backend at the configured path
///
/// # Arguments
///
/// * `config` - The `[state]` section of the configuration
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully opened storage
/// * `Err(StorageError)` - Failed to open the database
pub fn open_sqlite(config: &StateConfig) -> StorageResult<SqliteStorage> {
    tracing::debug!("Opening SQLite state at {}", config.database_path.display());
    SqliteStorage::new(&config.database_path)
}

/// Opens the JSON file backend at the configured paths
pub fn open_json(config: &StateConfig) -> StorageResult<JsonFileStorage> {
    tracing::debug!(
        "Opening JSON state at {} and {}",
        config.progress_path.display(),
        config.failures_path.display()
    );
    JsonFileStorage::open(&config.progress_path, &config.failures_path)
}

/// Describes where the configured backend keeps its state
pub fn describe_backend(config: &StateConfig) -> String {
    match config.backend {
        StateBackend::Sqlite => format!("sqlite ({})", config.database_path.display()),
        StateBackend::Json => format!(
            "json ({}, {})",
            config.progress_path.display(),
            config.failures_path.display()
        ),
    }
}
