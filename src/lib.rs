//! Catalog-Harvest: a resumable bulk downloader for paginated catalogs
//!
//! This crate drives a browser-like page driver through a catalog search for every
//! code in a work list, downloads the archive for each result page and language
//! variant, and checkpoints progress after every page so that an interrupted run
//! resumes where it stopped. Two scan workers walk the same list from opposite ends.

pub mod codes;
pub mod config;
pub mod crawler;
pub mod driver;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Driver error: {0}")]
    Driver(#[from] driver::DriverError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Invalid traversal transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::TraversalState,
        to: state::TraversalState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Worker {worker} failed to start: {message}")]
    WorkerStart { worker: String, message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern in config: {0}")]
    InvalidPattern(String),
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use codes::{load_codes, parse_codes, Code, CodeList};
pub use config::Config;
pub use crawler::{CancelToken, ScanDirection, Scheduler, TraversalEngine};
pub use driver::{Driver, DriverError, DriverFactory};
pub use state::{ProgressRecord, ProgressStatus, TraversalState, Variant};
pub use storage::{CheckpointBook, FailureStore, ProgressStore};
