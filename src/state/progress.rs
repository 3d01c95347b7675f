/// Progress status definitions for tracking per-code download progress
///
/// This module defines the statuses a code can be in across runs, and the
/// checkpoint record stored for each code.
use crate::codes::Code;
use crate::state::Variant;
use chrono::{DateTime, Utc};
use std::fmt;

/// Persisted status of one code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressStatus {
    /// Record created; no page has been checkpointed yet
    Pending,

    /// At least one page has been checkpointed
    InProgress,

    /// Every variant finished; never processed again
    Completed,

    /// The last attempt failed; resumes at the recorded page
    Error,
}

impl ProgressStatus {
    /// Returns true if this is a terminal status
    ///
    /// Only `Completed` is terminal. `Error` is recoverable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if processing resumes at the recorded cursor
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::InProgress | Self::Error)
    }

    /// Returns true if a store may move a record from this status to `next`
    ///
    /// `Completed -> Completed` is permitted so that two workers finishing the
    /// same code both succeed; the store treats it as an idempotent rewrite.
    pub fn can_transition_to(&self, next: ProgressStatus) -> bool {
        match self {
            Self::Pending => matches!(next, Self::InProgress | Self::Error | Self::Completed),
            Self::InProgress => matches!(next, Self::InProgress | Self::Completed | Self::Error),
            Self::Error => matches!(next, Self::InProgress | Self::Error | Self::Completed),
            Self::Completed => matches!(next, Self::Completed),
        }
    }

    /// Converts the status to its persisted string representation
    ///
    /// The same strings are used in the SQLite database and the JSON progress file.
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Parses a status from its persisted string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Returns all possible statuses
    pub fn all_statuses() -> Vec<Self> {
        vec![Self::Pending, Self::InProgress, Self::Completed, Self::Error]
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Last-known traversal state of one code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub code: Code,
    pub status: ProgressStatus,

    /// Zero-based page last checkpointed within `variant`
    pub current_page: u32,

    /// Variant the page cursor refers to
    pub variant: Option<Variant>,

    /// Engine invocations for this code that ended in `error`
    pub attempts: u32,

    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(code: Code, status: ProgressStatus) -> Self {
        Self {
            code,
            status,
            current_page: 0,
            variant: None,
            attempts: 0,
            updated_at: Utc::now(),
        }
    }

    /// Moves the cursor to a new checkpoint
    ///
    /// `None` keeps the current variant. The transition itself is validated by
    /// the store before this is called.
    pub fn apply(&mut self, status: ProgressStatus, current_page: u32, variant: Option<&Variant>) {
        self.status = status;
        self.current_page = current_page;
        if let Some(variant) = variant {
            self.variant = Some(variant.clone());
        }
        self.updated_at = Utc::now();
    }
}
