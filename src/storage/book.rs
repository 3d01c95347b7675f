//! Shared checkpoint book
//!
//! Both scan workers go through one `CheckpointBook`: it owns the store backend,
//! keeps an in-memory mirror of every progress record, and tracks which worker is
//! currently working on which code. Claiming a code and checking its status happen
//! under the same lock, so two workers never start the same code at once.

use crate::codes::Code;
use crate::crawler::ScanDirection;
use crate::state::{FailureRecord, ProgressRecord, ProgressStatus, Variant};
use crate::storage::traits::{check_transition, CheckpointStore, FailureMap, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// A book shared between workers
pub type SharedBook<S> = Arc<Mutex<CheckpointBook<S>>>;

/// Result of trying to claim a code for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimDecision {
    /// The caller now owns the code; carries the prior record, if any
    Claimed(Option<ProgressRecord>),

    /// The code is already completed and must be skipped
    AlreadyCompleted,

    /// Another worker is processing the code right now
    HeldByOther(ScanDirection),
}

/// Store facade with an in-memory mirror and scan claims
pub struct CheckpointBook<S> {
    store: S,
    mirror: HashMap<Code, ProgressRecord>,
    claims: HashMap<Code, ScanDirection>,
}

impl<S: CheckpointStore> CheckpointBook<S> {
    /// Wraps a backend, loading its progress records into the mirror
    ///
    /// A load failure is logged and leaves the mirror empty.
    pub fn new(store: S) -> Self {
        let mirror = match store.load_progress() {
            Ok(records) => records,
            Err(e) => {
                tracing::error!("Failed to load progress records, starting empty: {}", e);
                HashMap::new()
            }
        };

        tracing::debug!("Checkpoint book opened with {} records", mirror.len());

        Self {
            store,
            mirror,
            claims: HashMap::new(),
        }
    }

    /// Wraps the book for sharing between workers
    pub fn into_shared(self) -> SharedBook<S> {
        Arc::new(Mutex::new(self))
    }

    /// Atomically checks a code's status and claims it for `direction`
    pub fn claim(&mut self, code: &Code, direction: ScanDirection) -> ClaimDecision {
        if self.is_completed(code) {
            return ClaimDecision::AlreadyCompleted;
        }

        match self.claims.get(code) {
            Some(holder) if *holder != direction => ClaimDecision::HeldByOther(*holder),
            _ => {
                self.claims.insert(code.clone(), direction);
                ClaimDecision::Claimed(self.mirror.get(code).cloned())
            }
        }
    }

    /// Releases a claim taken by `claim`
    pub fn release(&mut self, code: &Code) {
        self.claims.remove(code);
    }

    /// Gets the mirrored record of a code
    pub fn progress(&self, code: &Code) -> Option<ProgressRecord> {
        self.mirror.get(code).cloned()
    }

    /// Returns true if the code is completed
    pub fn is_completed(&self, code: &Code) -> bool {
        self.mirror
            .get(code)
            .map(|record| record.status.is_terminal())
            .unwrap_or(false)
    }

    /// Writes a checkpoint
    ///
    /// The mirror is updated first; a failed store write is logged and the run
    /// continues on the mirrored state. A write that would leave `completed` is
    /// refused and logged.
    ///
    /// # Returns
    ///
    /// The mirrored record after the write.
    pub fn checkpoint(
        &mut self,
        code: &Code,
        status: ProgressStatus,
        current_page: u32,
        variant: Option<&Variant>,
    ) -> Option<ProgressRecord> {
        let existing = self.mirror.get(code).map(|r| r.status);
        match check_transition(code, existing, status) {
            Ok(true) => {}
            Ok(false) => return self.progress(code),
            Err(e) => {
                tracing::warn!("Refusing checkpoint: {}", e);
                return self.progress(code);
            }
        }

        let record = self
            .mirror
            .entry(code.clone())
            .or_insert_with(|| ProgressRecord::new(code.clone(), status));
        record.apply(status, current_page, variant);

        match self.store.record(code, status, current_page, variant) {
            Ok(stored) => {
                self.mirror.insert(code.clone(), stored);
            }
            Err(e) => log_write_failure("progress", code, &e),
        }

        tracing::debug!(
            "Checkpoint {}: {} page {}{}",
            code,
            status,
            current_page,
            variant.map(|v| format!(" ({})", v)).unwrap_or_default()
        );

        self.progress(code)
    }

    /// Counts one failed engine invocation, returning the new attempt count
    pub fn fail_attempt(&mut self, code: &Code) -> u32 {
        let record = self
            .mirror
            .entry(code.clone())
            .or_insert_with(|| ProgressRecord::new(code.clone(), ProgressStatus::Error));
        record.attempts += 1;
        let mirrored = record.attempts;

        match self.store.record_attempt_failed(code) {
            Ok(stored) => {
                if let Some(record) = self.mirror.get_mut(code) {
                    record.attempts = stored;
                }
                stored
            }
            Err(e) => {
                log_write_failure("progress", code, &e);
                mirrored
            }
        }
    }

    /// Records a variant failure
    pub fn record_failure(&mut self, code: &Code, variant: &Variant, message: &str) {
        if let Err(e) = self.store.record_failure(code, variant, message) {
            log_write_failure("failure", code, &e);
        }
    }

    /// Clears a variant failure after that variant succeeded
    pub fn clear_failure(&mut self, code: &Code, variant: &Variant) {
        match self.store.clear_failure(code, variant) {
            Ok(true) => tracing::info!("Cleared earlier failure for {} ({})", code, variant),
            Ok(false) => {}
            Err(e) => log_write_failure("failure", code, &e),
        }
    }

    /// Gets the failures recorded for one code
    pub fn failures_for(&self, code: &Code) -> Vec<FailureRecord> {
        self.store.failures_for(code).unwrap_or_else(|e| {
            tracing::error!("Failed to read failures for {}: {}", code, e);
            Vec::new()
        })
    }

    /// Copies every mirrored progress record
    pub fn snapshot(&self) -> HashMap<Code, ProgressRecord> {
        self.mirror.clone()
    }

    /// Loads every failure from the store
    pub fn failures(&self) -> StorageResult<FailureMap> {
        self.store.load_failures()
    }

    /// Deletes all progress and failure state
    pub fn reset(&mut self) -> StorageResult<()> {
        self.store.reset_progress()?;
        self.store.reset_failures()?;
        self.mirror.clear();
        self.claims.clear();
        Ok(())
    }

    /// Gives access to the underlying backend
    pub fn store(&self) -> &S {
        &self.store
    }
}

fn log_write_failure(what: &str, code: &Code, error: &StorageError) {
    tracing::error!(
        "Failed to persist {} state for {} (continuing with in-memory state): {}",
        what,
        code,
        error
    );
}

/// Locks a shared book, recovering the guard if another worker panicked
pub fn lock_book<S>(book: &SharedBook<S>) -> MutexGuard<'_, CheckpointBook<S>> {
    book.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
