//! Scan workers and the dual-direction scheduler
//!
//! A `ScanWorker` owns one driver and walks the whole code list in its
//! direction. For every code it claims the code in the shared book, runs the
//! traversal engine, retries failed invocations with backoff, and releases the
//! claim. Codes the other worker holds at that moment are deferred and checked
//! once more after the pass, in case they were released without completing.
//!
//! `Scheduler` launches one worker per direction and joins them.

use crate::codes::{Code, CodeList};
use crate::config::Config;
use crate::crawler::engine::{EngineSettings, TraversalEngine};
use crate::crawler::outcome::{CodeOutcome, ScanReport};
use crate::crawler::retry::{RetryDecision, RetryPolicy};
use crate::crawler::{CancelToken, ScanDirection};
use crate::driver::{launch_with_retry, Driver, DriverFactory, FailureKind, InitPolicy};
use crate::output::ReportLog;
use crate::storage::{lock_book, CheckpointStore, ClaimDecision, SharedBook};
use std::time::Duration;

/// What happened to one code during a pass
enum Step {
    Processed,
    Skipped,
    Deferred,
}

/// One scan direction with its own driver
pub struct ScanWorker<'a, S, D> {
    direction: ScanDirection,
    book: &'a SharedBook<S>,
    driver: D,
    settings: &'a EngineSettings,
    retry: RetryPolicy,
    pause: Duration,
    cancel: &'a CancelToken,
    report_log: Option<&'a ReportLog>,
}

impl<'a, S: CheckpointStore, D: Driver> ScanWorker<'a, S, D> {
    /// Walks the whole list in this worker's direction, then closes the driver
    pub async fn run(mut self, codes: &CodeList) -> ScanReport {
        let mut report = ScanReport::new(self.direction);
        let mut deferred: Vec<&Code> = Vec::new();

        tracing::info!("[{}] Scanning {} codes", self.direction, codes.len());

        for code in codes.iter_direction(self.direction) {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if let Step::Deferred = self.process(code, &mut report).await {
                deferred.push(code);
            }
        }

        // The other worker may have released these without completing them
        for code in deferred {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if let Step::Deferred = self.process(code, &mut report).await {
                tracing::debug!("[{}] {} still held by the other worker", self.direction, code);
                report.skipped_held += 1;
            }
        }

        if let Err(e) = self.driver.close().await {
            tracing::warn!("[{}] Failed to close driver: {}", self.direction, e);
        }

        tracing::info!("{}", report);
        report
    }

    async fn process(&mut self, code: &Code, report: &mut ScanReport) -> Step {
        let claim = lock_book(self.book).claim(code, self.direction);
        let mut prior = match claim {
            ClaimDecision::AlreadyCompleted => {
                tracing::debug!("[{}] {} already completed", self.direction, code);
                report.skipped_completed += 1;
                return Step::Skipped;
            }
            ClaimDecision::HeldByOther(holder) => {
                tracing::debug!("[{}] {} is being processed by {}", self.direction, code, holder);
                return Step::Deferred;
            }
            ClaimDecision::Claimed(prior) => prior,
        };

        report.processed += 1;
        let mut attempt = 0;

        let outcome = loop {
            attempt += 1;
            let mut engine = TraversalEngine::new(
                self.book,
                &mut self.driver,
                self.settings,
                self.cancel,
                self.direction,
            );
            if let Some(log) = self.report_log {
                engine = engine.with_report(log);
            }
            let outcome = engine.run(code, prior).await;

            if !matches!(outcome, CodeOutcome::Errored { .. }) || self.cancel.is_cancelled() {
                break outcome;
            }

            // Resuming lands on the same mismatched page
            let decision = if matches!(
                outcome,
                CodeOutcome::Errored {
                    kind: Some(FailureKind::Consistency),
                    ..
                }
            ) {
                RetryDecision::GiveUp
            } else {
                self.retry.decide(attempt)
            };

            match decision {
                RetryDecision::RetryAfter(delay) => {
                    tracing::info!(
                        "[{}] Retrying {} in {:?} (attempt {}/{})",
                        self.direction,
                        code,
                        delay,
                        attempt + 1,
                        self.retry.max_attempts
                    );
                    if !self.cancel.sleep(delay).await {
                        break outcome;
                    }
                    report.retries += 1;
                    prior = lock_book(self.book).progress(code);
                }
                RetryDecision::GiveUp => {
                    tracing::warn!(
                        "[{}] Giving up on {} for this run after {} attempts",
                        self.direction,
                        code,
                        attempt
                    );
                    break outcome;
                }
            }
        };

        lock_book(self.book).release(code);
        report.tally(&outcome);

        if !self.pause.is_zero() {
            self.cancel.sleep(self.pause).await;
        }

        Step::Processed
    }
}

/// Runs the forward and backward scan workers over one code list
pub struct Scheduler<S, F> {
    book: SharedBook<S>,
    factory: F,
    settings: EngineSettings,
    retry: RetryPolicy,
    init: InitPolicy,
    pause: Duration,
    cancel: CancelToken,
    report_log: Option<ReportLog>,
}

impl<S: CheckpointStore, F: DriverFactory> Scheduler<S, F> {
    /// Creates a scheduler with default retry and start-up policies and no pause
    pub fn new(book: SharedBook<S>, factory: F, settings: EngineSettings, cancel: CancelToken) -> Self {
        Self {
            book,
            factory,
            settings,
            retry: RetryPolicy::default(),
            init: InitPolicy::default(),
            pause: Duration::ZERO,
            cancel,
            report_log: None,
        }
    }

    /// Creates a scheduler with every policy taken from configuration
    pub fn from_config(config: &Config, book: SharedBook<S>, factory: F, cancel: CancelToken) -> Self {
        Self::new(book, factory, EngineSettings::from_config(config), cancel)
            .with_retry(RetryPolicy::from_config(&config.scan))
            .with_init_policy(InitPolicy::from_config(&config.driver))
            .with_pause(Duration::from_millis(config.scan.pause_between_codes_ms))
            .with_report_log(ReportLog::new(&config.state.report_path))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_init_policy(mut self, init: InitPolicy) -> Self {
        self.init = init;
        self
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn with_report_log(mut self, log: ReportLog) -> Self {
        self.report_log = Some(log);
        self
    }

    pub fn book(&self) -> &SharedBook<S> {
        &self.book
    }

    /// Scans `codes` with one worker per direction
    ///
    /// Two directions run concurrently over the same full list. A repeated
    /// direction is dropped, since claims are held per direction, and directions
    /// past the second are ignored.
    ///
    /// # Returns
    ///
    /// One report per worker, in the order of `directions`.
    pub async fn run(&self, codes: &CodeList, directions: &[ScanDirection]) -> Vec<ScanReport> {
        let mut unique: Vec<ScanDirection> = Vec::with_capacity(directions.len());
        for direction in directions {
            if unique.contains(direction) {
                tracing::warn!("Ignoring repeated scan direction {}", direction);
            } else {
                unique.push(*direction);
            }
        }

        match unique.as_slice() {
            [] => Vec::new(),
            [only] => vec![self.run_worker(codes, *only).await],
            [first, second, rest @ ..] => {
                if !rest.is_empty() {
                    tracing::warn!("Ignoring {} extra scan directions", rest.len());
                }
                let (a, b) = tokio::join!(
                    self.run_worker(codes, *first),
                    self.run_worker(codes, *second)
                );
                vec![a, b]
            }
        }
    }

    async fn run_worker(&self, codes: &CodeList, direction: ScanDirection) -> ScanReport {
        let driver = match launch_with_retry(&self.factory, direction, &self.init).await {
            Ok(driver) => driver,
            Err(e) => return ScanReport::init_failed(direction, e),
        };

        let worker = ScanWorker {
            direction,
            book: &self.book,
            driver,
            settings: &self.settings,
            retry: self.retry,
            pause: self.pause,
            cancel: &self.cancel,
            report_log: self.report_log.as_ref(),
        };
        worker.run(codes).await
    }
}
