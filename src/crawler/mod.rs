//! Crawler module: traversal and scheduling
//!
//! This module contains the core download logic, including:
//! - The pagination traversal engine that walks one code through every variant
//! - The dual-direction scheduler and its per-code retry policy
//! - Cancellation shared between both workers

mod cancel;
mod engine;
mod outcome;
mod retry;
mod scheduler;

pub use cancel::CancelToken;
pub use engine::{EngineSettings, TraversalEngine};
pub use outcome::{CodeOutcome, DownloadOutcome, ScanReport};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{ScanWorker, Scheduler};

use std::fmt;
use std::str::FromStr;

/// Order in which a worker walks the code list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanDirection {
    /// Ascending code order
    Forward,
    /// Descending code order
    Backward,
}

impl ScanDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }

    pub fn all_directions() -> Vec<Self> {
        vec![Self::Forward, Self::Backward]
    }
}

impl fmt::Display for ScanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" => Ok(Self::Forward),
            "backward" => Ok(Self::Backward),
            other => Err(format!("unknown scan direction '{}'", other)),
        }
    }
}
