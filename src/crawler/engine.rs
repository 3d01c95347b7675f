//! Pagination traversal engine
//!
//! Runs one code through every configured variant: search, fast-forward to the
//! resume page, then download page by page, checkpointing after each archive lands.
//! Failures are recorded against the variant being processed and leave the cursor
//! where the next invocation can pick it up.

use crate::codes::Code;
use crate::config::Config;
use crate::crawler::outcome::{CodeOutcome, DownloadOutcome};
use crate::crawler::{CancelToken, ScanDirection};
use crate::driver::{Driver, DriverError, FailureKind};
use crate::output::ReportLog;
use crate::state::{ProgressRecord, ProgressStatus, TraversalState, Variant};
use crate::storage::{lock_book, CheckpointStore, SharedBook};
use crate::HarvestError;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Per-run settings for the traversal engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Variants in processing order
    pub variants: Vec<Variant>,
    /// Archives land in `<download_root>/<code>/<variant>/`
    pub download_root: PathBuf,
    /// Maximum wait for one page's archive
    pub download_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            variants: config
                .variants
                .iter()
                .map(|entry| Variant::new(entry.id.clone()))
                .collect(),
            download_root: config.download.root.clone(),
            download_timeout: config.download.timeout(),
        }
    }

    /// Directory receiving the archives of one code and variant
    pub fn download_dir(&self, code: &Code, variant: &Variant) -> PathBuf {
        self.download_root.join(code.as_str()).join(variant.as_str())
    }
}

/// Where the engine is, kept current so a failure can be checkpointed in place
#[derive(Debug, Default)]
struct Cursor {
    variant: usize,
    page: u32,
    variant_total: u64,
    variant_success: u64,
}

enum Finish {
    Completed,
    Interrupted,
}

/// Drives one code through search and pagination for a single worker
pub struct TraversalEngine<'a, S, D> {
    book: &'a SharedBook<S>,
    driver: &'a mut D,
    settings: &'a EngineSettings,
    cancel: &'a CancelToken,
    worker: ScanDirection,
    report: Option<&'a ReportLog>,
}

impl<'a, S: CheckpointStore, D: Driver> TraversalEngine<'a, S, D> {
    pub fn new(
        book: &'a SharedBook<S>,
        driver: &'a mut D,
        settings: &'a EngineSettings,
        cancel: &'a CancelToken,
        worker: ScanDirection,
    ) -> Self {
        Self {
            book,
            driver,
            settings,
            cancel,
            worker,
            report: None,
        }
    }

    /// Appends one line per finished invocation to `report`
    pub fn with_report(mut self, report: &'a ReportLog) -> Self {
        self.report = Some(report);
        self
    }

    /// Processes one code, resuming from `prior` when it holds a cursor
    ///
    /// # Arguments
    ///
    /// * `code` - The code to download
    /// * `prior` - The code's progress record as of the claim, if any
    ///
    /// # Returns
    ///
    /// How the invocation ended, with the counts it accumulated. Errors never
    /// escape: they are recorded in the stores and reported as `Errored`.
    pub async fn run(&mut self, code: &Code, prior: Option<ProgressRecord>) -> CodeOutcome {
        let mut outcome = DownloadOutcome::default();
        let mut cursor = Cursor::default();
        let mut state = TraversalState::Init;

        let result = self
            .traverse(code, prior.as_ref(), &mut state, &mut cursor, &mut outcome)
            .await;

        let code_outcome = match result {
            Ok(Finish::Completed) => CodeOutcome::Completed(outcome),
            Ok(Finish::Interrupted) => CodeOutcome::Interrupted(outcome),
            Err(error) => {
                let message = failure_message(&error);
                let kind = failure_kind(&error);
                if let Err(e) = state.advance(TraversalState::Errored) {
                    tracing::debug!("{}", e);
                }
                outcome.failed_count += cursor.variant_total.saturating_sub(cursor.variant_success);
                let attempts = self.record_error(code, &cursor, &message);
                CodeOutcome::Errored {
                    outcome,
                    message,
                    kind,
                    attempts,
                }
            }
        };

        match &code_outcome {
            CodeOutcome::Completed(counts) => {
                tracing::info!("[{}] {} completed: {}", self.worker, code, counts)
            }
            CodeOutcome::Interrupted(counts) => {
                tracing::info!("[{}] {} interrupted: {}", self.worker, code, counts)
            }
            CodeOutcome::Errored {
                outcome,
                message,
                attempts,
                ..
            } => tracing::warn!(
                "[{}] {} failed (attempt {}): {} - {}",
                self.worker,
                code,
                attempts,
                message,
                outcome
            ),
        }

        if let Some(report) = self.report {
            report.append(code, self.worker, &code_outcome);
        }

        code_outcome
    }

    async fn traverse(
        &mut self,
        code: &Code,
        prior: Option<&ProgressRecord>,
        state: &mut TraversalState,
        cursor: &mut Cursor,
        outcome: &mut DownloadOutcome,
    ) -> Result<Finish, HarvestError> {
        let settings = self.settings;
        let (start_variant, start_page) = self.resume_point(code, prior);

        if prior.is_none() {
            lock_book(self.book).checkpoint(code, ProgressStatus::Pending, 0, None);
        }

        let mut last_processed: Option<(u32, usize)> = None;

        for (index, variant) in settings.variants.iter().enumerate().skip(start_variant) {
            if index > start_variant && self.cancel.is_cancelled() {
                return Ok(Finish::Interrupted);
            }

            let first_page = if index == start_variant { start_page } else { 0 };
            *cursor = Cursor {
                variant: index,
                page: first_page,
                variant_total: 0,
                variant_success: 0,
            };

            let dir = settings.download_dir(code, variant);
            self.driver.set_download_dir(&dir).await?;

            state.advance(TraversalState::SearchSubmitted)?;
            let total = self.driver.search(code, variant).await?;
            state.advance(TraversalState::ResultCounted)?;

            outcome.total_count += total;
            cursor.variant_total = total;
            tracing::info!(
                "[{}] {} ({}): {} results, starting at page {}",
                self.worker,
                code,
                variant,
                total,
                first_page
            );

            if total == 0 {
                lock_book(self.book).clear_failure(code, variant);
                continue;
            }

            self.fast_forward(first_page).await?;
            state.advance(TraversalState::PageProcessing)?;

            loop {
                self.download_page(&dir, cursor, outcome).await?;
                lock_book(self.book).checkpoint(
                    code,
                    ProgressStatus::InProgress,
                    cursor.page,
                    Some(variant),
                );
                last_processed = Some((cursor.page, index));

                if !self.driver.has_next_page().await? {
                    break;
                }
                if self.cancel.is_cancelled() {
                    tracing::info!(
                        "[{}] Stopping {} after page {} ({})",
                        self.worker,
                        code,
                        cursor.page,
                        variant
                    );
                    return Ok(Finish::Interrupted);
                }

                self.driver.advance_page().await?;
                cursor.page += 1;
                self.check_page(cursor.page).await?;
                state.advance(TraversalState::PageProcessing)?;
            }

            lock_book(self.book).clear_failure(code, variant);
        }

        state.advance(TraversalState::Finished)?;

        let (page, variant) = match last_processed {
            Some((page, index)) => (page, settings.variants.get(index)),
            None => (prior.map(|r| r.current_page).unwrap_or(0), None),
        };
        lock_book(self.book).checkpoint(code, ProgressStatus::Completed, page, variant);

        Ok(Finish::Completed)
    }

    /// Works out the (variant index, page) cursor to start from
    fn resume_point(&self, code: &Code, prior: Option<&ProgressRecord>) -> (usize, u32) {
        let Some(record) = prior.filter(|r| r.status.is_resumable()) else {
            return (0, 0);
        };

        match &record.variant {
            None => (0, record.current_page),
            Some(variant) => match self.settings.variants.iter().position(|v| v == variant) {
                Some(index) => (index, record.current_page),
                None => {
                    tracing::warn!(
                        "{} was checkpointed in variant '{}', which is no longer configured; restarting from the first variant",
                        code,
                        variant
                    );
                    (0, 0)
                }
            },
        }
    }

    /// Advances the result pages from page 0 to `target`
    async fn fast_forward(&mut self, target: u32) -> Result<(), DriverError> {
        if target > 0 {
            tracing::debug!("[{}] Fast-forwarding to page {}", self.worker, target);
        }

        for expected in 1..=target {
            if !self.driver.has_next_page().await? {
                let actual = self.driver.current_page().await?;
                return Err(DriverError::Consistency { expected, actual });
            }
            self.driver.advance_page().await?;
            self.check_page(expected).await?;
        }
        Ok(())
    }

    async fn check_page(&mut self, expected: u32) -> Result<(), DriverError> {
        let actual = self.driver.current_page().await?;
        if actual != expected {
            return Err(DriverError::Consistency { expected, actual });
        }
        Ok(())
    }

    async fn download_page(
        &mut self,
        dir: &Path,
        cursor: &mut Cursor,
        outcome: &mut DownloadOutcome,
    ) -> Result<(), DriverError> {
        self.driver.select_format_and_all().await?;
        let items = self.driver.page_item_count().await?;

        self.driver.trigger_archive_download().await?;
        outcome.downloaded_count += items;

        self.driver
            .await_download_complete(dir, self.settings.download_timeout)
            .await?;
        outcome.success_count += items;
        cursor.variant_success += items;

        tracing::debug!(
            "[{}] Page {} landed ({} items)",
            self.worker,
            cursor.page,
            items
        );
        Ok(())
    }

    /// Writes the failure, the `error` checkpoint and the attempt count
    fn record_error(&self, code: &Code, cursor: &Cursor, message: &str) -> u32 {
        let variant = self.settings.variants.get(cursor.variant);
        let mut book = lock_book(self.book);

        if let Some(variant) = variant {
            book.record_failure(code, variant, message);
        }
        book.checkpoint(code, ProgressStatus::Error, cursor.page, variant);
        book.fail_attempt(code)
    }
}

fn failure_kind(error: &HarvestError) -> Option<FailureKind> {
    match error {
        HarvestError::Driver(e) => Some(e.kind()),
        _ => None,
    }
}

fn failure_message(error: &HarvestError) -> String {
    match error {
        HarvestError::Driver(e) => e.to_string(),
        other => other.to_string(),
    }
}
