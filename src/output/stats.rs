//! Statistics generation from the checkpoint stores
//!
//! This module provides functionality for extracting and displaying
//! harvest statistics from the progress and failure records.

use crate::codes::{Code, CodeList};
use crate::state::{ProgressStatus, Variant};
use crate::storage::{CheckpointStore, StorageResult};
use std::collections::{BTreeMap, HashMap};

/// Harvest statistics summary
#[derive(Debug, Clone, Default)]
pub struct HarvestStatistics {
    /// Codes with a progress record
    pub total_codes: u64,

    /// Codes in the work list, when one was given
    pub listed_codes: Option<u64>,

    /// Count of codes by progress status
    pub codes_by_status: HashMap<ProgressStatus, u64>,

    /// Codes with at least one failed variant
    pub codes_with_failures: u64,

    /// Failure entries per variant
    pub failures_by_variant: BTreeMap<Variant, u64>,

    /// Codes not yet completed, in ascending order
    pub unfinished: Vec<Code>,
}

impl HarvestStatistics {
    pub fn count(&self, status: ProgressStatus) -> u64 {
        self.codes_by_status.get(&status).copied().unwrap_or(0)
    }

    /// Completed codes as a percentage of the work list (or of known codes)
    pub fn completion_rate(&self) -> f64 {
        let base = self.listed_codes.unwrap_or(self.total_codes);
        if base == 0 {
            return 0.0;
        }
        (self.count(ProgressStatus::Completed) as f64 / base as f64) * 100.0
    }
}

/// Loads statistics from a checkpoint store
///
/// # Arguments
///
/// * `store` - The store backend to query
/// * `codes` - The work list; when given, codes never seen count as unfinished
///
/// # Returns
///
/// * `Ok(HarvestStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to read the stores
pub fn load_statistics<S: CheckpointStore>(
    store: &S,
    codes: Option<&CodeList>,
) -> StorageResult<HarvestStatistics> {
    let progress = store.load_progress()?;
    let failures = store.load_failures()?;

    let mut codes_by_status = HashMap::new();
    for record in progress.values() {
        *codes_by_status.entry(record.status).or_insert(0) += 1;
    }

    let mut failures_by_variant = BTreeMap::new();
    for variants in failures.values() {
        for variant in variants.keys() {
            *failures_by_variant.entry(variant.clone()).or_insert(0) += 1;
        }
    }

    let is_done = |code: &Code| {
        progress
            .get(code)
            .map(|r| r.status.is_terminal())
            .unwrap_or(false)
    };

    let mut unfinished: Vec<Code> = match codes {
        Some(list) => list.as_slice().iter().filter(|c| !is_done(*c)).cloned().collect(),
        None => progress.keys().filter(|c| !is_done(*c)).cloned().collect(),
    };
    unfinished.sort();

    Ok(HarvestStatistics {
        total_codes: progress.len() as u64,
        listed_codes: codes.map(|list| list.len() as u64),
        codes_by_status,
        codes_with_failures: failures.values().filter(|v| !v.is_empty()).count() as u64,
        failures_by_variant,
        unfinished,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Overview:");
    if let Some(listed) = stats.listed_codes {
        println!("  Codes in work list: {}", listed);
    }
    println!("  Codes with progress: {}", stats.total_codes);
    println!("  Codes with failures: {}", stats.codes_with_failures);
    println!();

    println!("Codes by Status:");
    for status in ProgressStatus::all_statuses() {
        let count = stats.count(status);
        let percentage = if stats.total_codes > 0 {
            (count as f64 / stats.total_codes as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    if !stats.failures_by_variant.is_empty() {
        println!("Failures by Variant:");
        for (variant, count) in &stats.failures_by_variant {
            println!("  {}: {}", variant, count);
        }
        println!();
    }

    if !stats.unfinished.is_empty() {
        println!("Unfinished Codes ({}):", stats.unfinished.len());
        for code in stats.unfinished.iter().take(50) {
            println!("  - {}", code);
        }
        if stats.unfinished.len() > 50 {
            println!("  ... and {} more", stats.unfinished.len() - 50);
        }
        println!();
    }

    println!(
        "Completion: {:.1}% ({} codes completed)",
        stats.completion_rate(),
        stats.count(ProgressStatus::Completed)
    );
}
