//! State module for tracking download progress
//!
//! This module provides the status vocabulary shared by the stores, the engine and
//! the scheduler.
//!
//! # Components
//!
//! - `ProgressStatus` / `ProgressRecord`: Persisted per-code checkpoint (pending, in_progress, completed, error)
//! - `FailureRecord` / `Variant`: Persisted per-variant failure
//! - `TraversalState`: In-memory state machine of one engine invocation

mod failure;
mod progress;
mod traversal;

// Re-export main types
pub use failure::{FailureRecord, Variant};
pub use progress::{ProgressRecord, ProgressStatus};
pub use traversal::TraversalState;
