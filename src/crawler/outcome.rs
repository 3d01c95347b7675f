use crate::crawler::ScanDirection;
use crate::driver::FailureKind;
use std::fmt;

/// Per-invocation tally, reported but never persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Sum of the result counts reported by every search
    pub total_count: u64,
    /// Items whose archive download was triggered
    pub downloaded_count: u64,
    /// Items whose archive landed
    pub success_count: u64,
    /// Items of failed variants that did not land
    pub failed_count: u64,
}

impl fmt::Display for DownloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} downloaded={} success={} failed={}",
            self.total_count, self.downloaded_count, self.success_count, self.failed_count
        )
    }
}

/// How one engine invocation for a code ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeOutcome {
    /// Every variant finished; the code is `completed`
    Completed(DownloadOutcome),

    /// A step failed; the code is `error` and resumes at its cursor
    Errored {
        outcome: DownloadOutcome,
        message: String,
        /// Classification of a driver failure; `None` for store or state errors
        kind: Option<FailureKind>,
        /// Failed invocations recorded for this code so far
        attempts: u32,
    },

    /// Stopped by cancellation; the code stays `in_progress`
    Interrupted(DownloadOutcome),
}

impl CodeOutcome {
    pub fn counts(&self) -> &DownloadOutcome {
        match self {
            Self::Completed(outcome) | Self::Interrupted(outcome) => outcome,
            Self::Errored { outcome, .. } => outcome,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::Errored { .. } => "error",
            Self::Interrupted(_) => "interrupted",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// What one scan worker did during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub direction: ScanDirection,
    /// Codes this worker claimed and ran the engine for
    pub processed: u64,
    pub completed: u64,
    pub errored: u64,
    pub interrupted: u64,
    /// Extra engine invocations made by the retry policy
    pub retries: u64,
    /// Codes skipped because they were already completed
    pub skipped_completed: u64,
    /// Codes left to the other worker, which was processing them
    pub skipped_held: u64,
    /// True if the worker stopped early because of cancellation
    pub cancelled: bool,
    /// Start-up failure; when set the worker processed nothing
    pub init_error: Option<String>,
}

impl ScanReport {
    pub fn new(direction: ScanDirection) -> Self {
        Self {
            direction,
            processed: 0,
            completed: 0,
            errored: 0,
            interrupted: 0,
            retries: 0,
            skipped_completed: 0,
            skipped_held: 0,
            cancelled: false,
            init_error: None,
        }
    }

    pub fn init_failed(direction: ScanDirection, error: impl fmt::Display) -> Self {
        Self {
            init_error: Some(error.to_string()),
            ..Self::new(direction)
        }
    }

    pub fn tally(&mut self, outcome: &CodeOutcome) {
        match outcome {
            CodeOutcome::Completed(_) => self.completed += 1,
            CodeOutcome::Errored { .. } => self.errored += 1,
            CodeOutcome::Interrupted(_) => self.interrupted += 1,
        }
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(error) = &self.init_error {
            return write!(f, "[{}] did not start: {}", self.direction, error);
        }
        write!(
            f,
            "[{}] processed={} completed={} errored={} interrupted={} retries={} skipped={} deferred={}{}",
            self.direction,
            self.processed,
            self.completed,
            self.errored,
            self.interrupted,
            self.retries,
            self.skipped_completed,
            self.skipped_held,
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}
