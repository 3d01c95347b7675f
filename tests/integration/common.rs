//! Scripted drivers and recording stores shared by the integration tests

#![allow(dead_code)]

use catalog_harvest::codes::Code;
use catalog_harvest::crawler::{EngineSettings, RetryPolicy, ScanDirection};
use catalog_harvest::driver::{Driver, DriverError, DriverFactory};
use catalog_harvest::state::{FailureRecord, ProgressRecord, ProgressStatus, Variant};
use catalog_harvest::storage::{FailureMap, FailureStore, ProgressStore, StorageResult};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the fake catalog serves and what the drivers did with it
#[derive(Debug, Default)]
pub struct Script {
    /// Items per result page for each (code, variant); absent means zero results
    pub pages: HashMap<(Code, Variant), Vec<u64>>,
    /// Downloads that time out, as (code, variant, page)
    pub timeouts: HashSet<(Code, Variant, u32)>,
    /// Every search made, as (worker, code, variant)
    pub searches: Vec<(ScanDirection, Code, Variant)>,
    /// Every page whose archive landed, as (worker, code, variant, page)
    pub downloads: Vec<(ScanDirection, Code, Variant, u32)>,
    /// Directions whose driver refuses to start
    pub broken_launch: HashSet<ScanDirection>,
    /// Time each archive takes to land
    pub download_delay: Duration,
    /// Number of upcoming downloads that time out regardless of page
    pub flaky_downloads: u32,
}

pub type SharedScript = Arc<Mutex<Script>>;

pub fn script() -> SharedScript {
    Arc::new(Mutex::new(Script {
        download_delay: Duration::from_millis(2),
        ..Default::default()
    }))
}

pub fn serve(script: &SharedScript, code: &str, variant: &str, pages: &[u64]) {
    script
        .lock()
        .unwrap()
        .pages
        .insert((Code::new(code), Variant::new(variant)), pages.to_vec());
}

pub fn time_out(script: &SharedScript, code: &str, variant: &str, page: u32) {
    script
        .lock()
        .unwrap()
        .timeouts
        .insert((Code::new(code), Variant::new(variant), page));
}

pub fn heal(script: &SharedScript) {
    script.lock().unwrap().timeouts.clear();
}

/// Engine-facing driver backed by a [`Script`]
pub struct ScriptedDriver {
    script: SharedScript,
    worker: ScanDirection,
    current: Option<(Code, Variant)>,
    pages: Vec<u64>,
    page: u32,
}

impl ScriptedDriver {
    pub fn new(script: SharedScript, worker: ScanDirection) -> Self {
        Self {
            script,
            worker,
            current: None,
            pages: Vec::new(),
            page: 0,
        }
    }
}

impl Driver for ScriptedDriver {
    async fn set_download_dir(&mut self, _dir: &Path) -> Result<(), DriverError> {
        Ok(())
    }

    async fn search(&mut self, code: &Code, variant: &Variant) -> Result<u64, DriverError> {
        let mut script = self.script.lock().unwrap();
        script
            .searches
            .push((self.worker, code.clone(), variant.clone()));
        self.pages = script
            .pages
            .get(&(code.clone(), variant.clone()))
            .cloned()
            .unwrap_or_default();
        self.current = Some((code.clone(), variant.clone()));
        self.page = 0;
        Ok(self.pages.iter().sum())
    }

    async fn select_format_and_all(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn page_item_count(&mut self) -> Result<u64, DriverError> {
        Ok(self.pages.get(self.page as usize).copied().unwrap_or(0))
    }

    async fn trigger_archive_download(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn await_download_complete(
        &mut self,
        target_dir: &Path,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        let delay = self.script.lock().unwrap().download_delay;
        tokio::time::sleep(delay).await;

        let (code, variant) = self
            .current
            .clone()
            .ok_or_else(|| DriverError::Element("download before search".to_string()))?;

        let mut script = self.script.lock().unwrap();
        let flaky = script.flaky_downloads > 0;
        if flaky {
            script.flaky_downloads -= 1;
        }
        if flaky
            || script
                .timeouts
                .contains(&(code.clone(), variant.clone(), self.page))
        {
            return Err(DriverError::DownloadTimeout {
                dir: target_dir.to_path_buf(),
                timeout,
            });
        }
        script.downloads.push((self.worker, code, variant, self.page));
        Ok(())
    }

    async fn has_next_page(&mut self) -> Result<bool, DriverError> {
        Ok((self.page as usize) + 1 < self.pages.len())
    }

    async fn advance_page(&mut self) -> Result<(), DriverError> {
        self.page += 1;
        Ok(())
    }

    async fn current_page(&mut self) -> Result<u32, DriverError> {
        Ok(self.page)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Launches [`ScriptedDriver`]s, refusing the directions marked broken
pub struct ScriptedFactory {
    pub script: SharedScript,
}

impl DriverFactory for ScriptedFactory {
    type Driver = ScriptedDriver;

    async fn launch(&self, direction: ScanDirection) -> Result<ScriptedDriver, DriverError> {
        if self.script.lock().unwrap().broken_launch.contains(&direction) {
            return Err(DriverError::Init("browser binary missing".to_string()));
        }
        Ok(ScriptedDriver::new(self.script.clone(), direction))
    }
}

/// Engine settings for the given variants, downloading under `root`
pub fn settings(root: &Path, variants: &[&str]) -> EngineSettings {
    EngineSettings {
        variants: variants.iter().map(|v| Variant::new(*v)).collect(),
        download_root: root.to_path_buf(),
        download_timeout: Duration::from_millis(20),
    }
}

pub fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
    }
}

/// Store wrapper that logs every progress write it lets through
pub struct RecordingStore<S> {
    pub inner: S,
    pub writes: Arc<Mutex<Vec<(Code, ProgressStatus, u32)>>>,
}

impl<S> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<S: ProgressStore> ProgressStore for RecordingStore<S> {
    fn load_progress(&self) -> StorageResult<HashMap<Code, ProgressRecord>> {
        self.inner.load_progress()
    }

    fn get_progress(&self, code: &Code) -> StorageResult<Option<ProgressRecord>> {
        self.inner.get_progress(code)
    }

    fn record(
        &mut self,
        code: &Code,
        status: ProgressStatus,
        current_page: u32,
        variant: Option<&Variant>,
    ) -> StorageResult<ProgressRecord> {
        let record = self.inner.record(code, status, current_page, variant)?;
        self.writes
            .lock()
            .unwrap()
            .push((code.clone(), status, current_page));
        Ok(record)
    }

    fn record_attempt_failed(&mut self, code: &Code) -> StorageResult<u32> {
        self.inner.record_attempt_failed(code)
    }

    fn reset_progress(&mut self) -> StorageResult<()> {
        self.inner.reset_progress()
    }
}

impl<S: FailureStore> FailureStore for RecordingStore<S> {
    fn load_failures(&self) -> StorageResult<FailureMap> {
        self.inner.load_failures()
    }

    fn record_failure(&mut self, code: &Code, variant: &Variant, message: &str) -> StorageResult<()> {
        self.inner.record_failure(code, variant, message)
    }

    fn clear_failure(&mut self, code: &Code, variant: &Variant) -> StorageResult<bool> {
        self.inner.clear_failure(code, variant)
    }

    fn failures_for(&self, code: &Code) -> StorageResult<Vec<FailureRecord>> {
        self.inner.failures_for(code)
    }

    fn reset_failures(&mut self) -> StorageResult<()> {
        self.inner.reset_failures()
    }
}

pub fn download_root(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("downloads")
}
