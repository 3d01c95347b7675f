//! Output module for reports and summaries
//!
//! This module handles:
//! - The append-only per-code report log
//! - Statistics read back from the checkpoint stores
//! - Markdown summaries of the harvest state

mod markdown;
mod report;
pub mod stats;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use report::{format_report_line, ReportLog};
pub use stats::{load_statistics, print_statistics, HarvestStatistics};

use crate::codes::CodeList;
use crate::state::FailureRecord;
use crate::storage::{CheckpointStore, StorageError};
use chrono::{DateTime, Local};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Everything the markdown summary reports
#[derive(Debug, Clone)]
pub struct HarvestSummary {
    pub generated_at: DateTime<Local>,
    pub config_hash: String,
    /// Human-readable description of the state backend
    pub backend: String,
    pub statistics: HarvestStatistics,
    /// Outstanding failures, ordered by code then variant
    pub failures: Vec<FailureRecord>,
}

/// Generates a harvest summary from a checkpoint store
///
/// # Arguments
///
/// * `store` - The store backend containing progress and failures
/// * `codes` - The work list, if loaded
/// * `config_hash` - Hash of the configuration file in use
/// * `backend` - Description of the backend, shown in the summary
///
/// # Returns
///
/// * `Ok(HarvestSummary)` - Successfully generated summary
/// * `Err(OutputError)` - Failed to read the stores
pub fn generate_summary<S: CheckpointStore>(
    store: &S,
    codes: Option<&CodeList>,
    config_hash: &str,
    backend: &str,
) -> OutputResult<HarvestSummary> {
    let statistics = load_statistics(store, codes)?;
    let failures = store
        .load_failures()?
        .into_values()
        .flat_map(|variants| variants.into_values())
        .collect();

    Ok(HarvestSummary {
        generated_at: Local::now(),
        config_hash: config_hash.to_string(),
        backend: backend.to_string(),
        statistics,
        failures,
    })
}
