//! Page interaction driver
//!
//! The traversal engine only ever talks to the catalog through the [`Driver`]
//! trait: one search/select/download cycle per call. Each scan worker owns its
//! own driver; drivers are never shared.
//!
//! # Components
//!
//! - `Driver` / `DriverFactory`: the contract the engine and scheduler depend on
//! - `archive`: filesystem side of "wait until the archive has landed"
//! - `WebDriverSession`: a minimal W3C WebDriver client
//! - `CatalogDriver`: the catalog-specific driver built on that client

pub mod archive;
mod catalog;
mod webdriver;

pub use catalog::{CatalogDriver, CatalogDriverFactory};
pub use webdriver::{WebDriverSession, ELEMENT_KEY};

use crate::codes::Code;
use crate::crawler::ScanDirection;
use crate::state::Variant;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a page driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Element error: {0}")]
    Element(String),

    #[error("Download into {} did not complete within {}s", dir.display(), timeout.as_secs())]
    DownloadTimeout { dir: PathBuf, timeout: Duration },

    #[error("Expected page {expected}, driver is on page {actual}")]
    Consistency { expected: u32, actual: u32 },

    #[error("Driver failed to start: {0}")]
    Init(String),

    #[error("WebDriver protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of driver failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Initialization,
    Interaction,
    DownloadTimeout,
    Consistency,
}

impl DriverError {
    /// Maps the error onto how the engine and scheduler treat it
    ///
    /// Everything except `Initialization` ends the current engine invocation and
    /// is recorded as a failure. `Consistency` is never retried within a run.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Init(_) => FailureKind::Initialization,
            Self::Navigation(_) | Self::Element(_) | Self::Protocol(_) | Self::Io(_) => {
                FailureKind::Interaction
            }
            Self::DownloadTimeout { .. } => FailureKind::DownloadTimeout,
            Self::Consistency { .. } => FailureKind::Consistency,
        }
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// One browser-like session positioned on the catalog
///
/// Calls are strictly sequential; the engine awaits each before issuing the next.
#[allow(async_fn_in_trait)]
pub trait Driver {
    /// Directs subsequent archive downloads into `dir`
    async fn set_download_dir(&mut self, dir: &Path) -> DriverResult<()>;

    /// Submits `code` as a search in `variant`, returning the total result count
    async fn search(&mut self, code: &Code, variant: &Variant) -> DriverResult<u64>;

    /// Applies the format filter and selects every item on the current page
    async fn select_format_and_all(&mut self) -> DriverResult<()>;

    /// Number of items listed on the current page
    async fn page_item_count(&mut self) -> DriverResult<u64>;

    /// Starts the archive download for the current selection
    async fn trigger_archive_download(&mut self) -> DriverResult<()>;

    /// Blocks until a complete, non-partial archive appears in `target_dir`
    async fn await_download_complete(
        &mut self,
        target_dir: &Path,
        timeout: Duration,
    ) -> DriverResult<()>;

    async fn has_next_page(&mut self) -> DriverResult<bool>;

    async fn advance_page(&mut self) -> DriverResult<()>;

    /// Zero-based index of the page the driver is on
    async fn current_page(&mut self) -> DriverResult<u32>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// Starts drivers for scan workers
#[allow(async_fn_in_trait)]
pub trait DriverFactory {
    type Driver: Driver;

    async fn launch(&self, direction: ScanDirection) -> DriverResult<Self::Driver>;
}

/// Bounded retry for driver start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl InitPolicy {
    pub fn from_config(config: &crate::config::DriverConfig) -> Self {
        Self {
            attempts: config.init_retries.max(1),
            delay: Duration::from_millis(config.init_retry_delay_ms),
        }
    }
}

impl Default for InitPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Launches a driver, retrying with a fixed delay
///
/// # Arguments
///
/// * `factory` - The driver factory
/// * `direction` - Which worker the driver is for (used in logs)
/// * `policy` - Attempt count and delay between attempts
///
/// # Returns
///
/// * `Ok(driver)` - A started driver
/// * `Err(DriverError)` - The last start-up error once every attempt failed
pub async fn launch_with_retry<F: DriverFactory>(
    factory: &F,
    direction: ScanDirection,
    policy: &InitPolicy,
) -> DriverResult<F::Driver> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match factory.launch(direction).await {
            Ok(driver) => {
                tracing::info!("[{}] Driver started (attempt {})", direction, attempt);
                return Ok(driver);
            }
            Err(e) if attempt < attempts => {
                tracing::warn!(
                    "[{}] Driver start attempt {}/{} failed: {}; retrying in {:?}",
                    direction,
                    attempt,
                    attempts,
                    e,
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(
                    "[{}] Driver failed to start after {} attempts: {}",
                    direction,
                    attempts,
                    e
                );
                return Err(e);
            }
        }
    }
}
