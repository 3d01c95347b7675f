//! JSON file storage implementation
//!
//! Keeps the progress and failure mappings as two human-readable JSON files:
//!
//! ```text
//! download_progress.json  {"<code>": {"status": "in_progress", "current_page": 2,
//!                                     "timestamp": "2024-05-01 12:00:00"}}
//! failed_downloads.json   {"<code>": {"<variant>": {"error": "...", "timestamp": "..."}}}
//! ```
//!
//! Every mutation rewrites the whole mapping through a sibling temp file that is
//! renamed over the target, so a crash never leaves a half-written file.

use crate::codes::Code;
use crate::state::{FailureRecord, ProgressRecord, ProgressStatus, Variant};
use crate::storage::traits::{
    check_transition, FailureMap, FailureStore, ProgressStore, StorageError, StorageResult,
};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProgressEntry {
    status: String,
    current_page: u32,
    timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variant: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FailureEntry {
    error: String,
    timestamp: String,
}

type ProgressFile = BTreeMap<String, ProgressEntry>;
type FailureFile = BTreeMap<String, BTreeMap<String, FailureEntry>>;

fn is_zero(value: &u32) -> bool {
    *value == 0
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// File-backed checkpoint store
pub struct JsonFileStorage {
    progress_path: PathBuf,
    failures_path: PathBuf,
    progress: HashMap<Code, ProgressRecord>,
    failures: FailureMap,
}

impl JsonFileStorage {
    /// Opens (or prepares to create) the two state files
    ///
    /// Missing or unreadable files start empty. A file that cannot be parsed is
    /// moved aside to `<name>.corrupt-<timestamp>` and replaced by an empty
    /// mapping. Only failing to create the state directory is an error.
    ///
    /// # Arguments
    ///
    /// * `progress_path` - Path of the progress mapping
    /// * `failures_path` - Path of the failure mapping
    pub fn open(progress_path: &Path, failures_path: &Path) -> StorageResult<Self> {
        for path in [progress_path, failures_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let progress_file: ProgressFile = read_mapping(progress_path);
        let failure_file: FailureFile = read_mapping(failures_path);

        let mut progress = HashMap::new();
        for (code, entry) in progress_file {
            let Some(status) = ProgressStatus::from_db_string(&entry.status) else {
                tracing::warn!(
                    "Ignoring progress entry for {} with unknown status '{}'",
                    code,
                    entry.status
                );
                continue;
            };
            let code = Code::from(code);
            progress.insert(
                code.clone(),
                ProgressRecord {
                    code,
                    status,
                    current_page: entry.current_page,
                    variant: entry.variant.as_deref().map(Variant::from),
                    attempts: entry.attempts,
                    updated_at: parse_timestamp(&entry.timestamp).unwrap_or_else(Utc::now),
                },
            );
        }

        let mut failures = FailureMap::new();
        for (code, variants) in failure_file {
            let code = Code::from(code);
            let entry = failures.entry(code.clone()).or_default();
            for (variant, failure) in variants {
                let variant = Variant::from(variant.as_str());
                entry.insert(
                    variant.clone(),
                    FailureRecord {
                        code: code.clone(),
                        variant,
                        error_message: failure.error,
                        updated_at: parse_timestamp(&failure.timestamp).unwrap_or_else(Utc::now),
                    },
                );
            }
        }
        failures.retain(|_, variants| !variants.is_empty());

        tracing::debug!(
            "Loaded {} progress records and {} failing codes from JSON state",
            progress.len(),
            failures.len()
        );

        Ok(Self {
            progress_path: progress_path.to_path_buf(),
            failures_path: failures_path.to_path_buf(),
            progress,
            failures,
        })
    }

    fn persist_progress(&self) -> StorageResult<()> {
        let file: ProgressFile = self
            .progress
            .values()
            .map(|record| {
                (
                    record.code.to_string(),
                    ProgressEntry {
                        status: record.status.to_db_string().to_string(),
                        current_page: record.current_page,
                        timestamp: format_timestamp(&record.updated_at),
                        variant: record.variant.as_ref().map(Variant::to_string),
                        attempts: record.attempts,
                    },
                )
            })
            .collect();

        write_mapping(&self.progress_path, &file)
    }

    fn persist_failures(&self) -> StorageResult<()> {
        let file: FailureFile = self
            .failures
            .iter()
            .map(|(code, variants)| {
                let entries = variants
                    .iter()
                    .map(|(variant, record)| {
                        (
                            variant.to_string(),
                            FailureEntry {
                                error: record.error_message.clone(),
                                timestamp: format_timestamp(&record.updated_at),
                            },
                        )
                    })
                    .collect();
                (code.to_string(), entries)
            })
            .collect();

        write_mapping(&self.failures_path, &file)
    }
}

/// Reads a JSON mapping
///
/// A missing file is empty. An unreadable or corrupt file is logged and also
/// treated as empty, so loading never fails the caller.
fn read_mapping<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            tracing::error!(
                "Cannot read state file {} ({}); starting empty",
                path.display(),
                e
            );
            return T::default();
        }
    };

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return T::default();
    }

    match serde_json::from_slice(&bytes) {
        Ok(mapping) => mapping,
        Err(e) => {
            match quarantine(path) {
                Ok(aside) => tracing::error!(
                    "State file {} is corrupt ({}); moved to {} and starting empty",
                    path.display(),
                    e,
                    aside.display()
                ),
                Err(move_err) => tracing::error!(
                    "State file {} is corrupt ({}) and could not be moved aside ({}); starting empty",
                    path.display(),
                    e,
                    move_err
                ),
            }
            T::default()
        }
    }
}

/// Moves a corrupt file out of the way so the next write does not destroy it
fn quarantine(path: &Path) -> StorageResult<PathBuf> {
    let suffix = Utc::now().format("%Y%m%d%H%M%S");
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".corrupt-{}", suffix));

    let aside = path.with_file_name(name);
    std::fs::rename(path, &aside)?;
    Ok(aside)
}

/// Writes a mapping atomically: temp file in the same directory, then rename
fn write_mapping<T: Serialize>(path: &Path, mapping: &T) -> StorageResult<()> {
    let json = serde_json::to_string_pretty(mapping)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;

    Ok(())
}

impl ProgressStore for JsonFileStorage {
    fn load_progress(&self) -> StorageResult<HashMap<Code, ProgressRecord>> {
        Ok(self.progress.clone())
    }

    fn get_progress(&self, code: &Code) -> StorageResult<Option<ProgressRecord>> {
        Ok(self.progress.get(code).cloned())
    }

    fn record(
        &mut self,
        code: &Code,
        status: ProgressStatus,
        current_page: u32,
        variant: Option<&Variant>,
    ) -> StorageResult<ProgressRecord> {
        let existing = self.progress.get(code);
        if !check_transition(code, existing.map(|r| r.status), status)? {
            return existing.cloned().ok_or_else(|| {
                StorageError::Corrupt(format!("completed record for {} vanished", code))
            });
        }

        let record = self
            .progress
            .entry(code.clone())
            .or_insert_with(|| ProgressRecord::new(code.clone(), status));
        record.apply(status, current_page, variant);
        let record = record.clone();

        self.persist_progress()?;
        Ok(record)
    }

    fn record_attempt_failed(&mut self, code: &Code) -> StorageResult<u32> {
        let record = self
            .progress
            .entry(code.clone())
            .or_insert_with(|| ProgressRecord::new(code.clone(), ProgressStatus::Error));
        record.attempts += 1;
        record.updated_at = Utc::now();
        let attempts = record.attempts;

        self.persist_progress()?;
        Ok(attempts)
    }

    fn reset_progress(&mut self) -> StorageResult<()> {
        self.progress.clear();
        self.persist_progress()
    }
}

impl FailureStore for JsonFileStorage {
    fn load_failures(&self) -> StorageResult<FailureMap> {
        Ok(self.failures.clone())
    }

    fn record_failure(
        &mut self,
        code: &Code,
        variant: &Variant,
        message: &str,
    ) -> StorageResult<()> {
        self.failures.entry(code.clone()).or_default().insert(
            variant.clone(),
            FailureRecord::new(code.clone(), variant.clone(), message),
        );
        self.persist_failures()
    }

    fn clear_failure(&mut self, code: &Code, variant: &Variant) -> StorageResult<bool> {
        let Some(variants) = self.failures.get_mut(code) else {
            return Ok(false);
        };

        let removed = variants.remove(variant).is_some();
        if variants.is_empty() {
            self.failures.remove(code);
        }

        if removed {
            self.persist_failures()?;
        }
        Ok(removed)
    }

    fn failures_for(&self, code: &Code) -> StorageResult<Vec<FailureRecord>> {
        Ok(self
            .failures
            .get(code)
            .map(|variants| variants.values().cloned().collect())
            .unwrap_or_default())
    }

    fn reset_failures(&mut self) -> StorageResult<()> {
        self.failures.clear();
        self.persist_failures()
    }
}
