//! Dual-direction scheduler scenarios

use crate::common::*;
use catalog_harvest::codes::{Code, CodeList};
use catalog_harvest::crawler::{CancelToken, ScanDirection, ScanReport, Scheduler};
use catalog_harvest::driver::InitPolicy;
use catalog_harvest::output::ReportLog;
use catalog_harvest::state::{ProgressStatus, Variant};
use catalog_harvest::storage::{lock_book, CheckpointBook, JsonFileStorage, SqliteStorage};
use std::collections::HashMap;
use std::time::Duration;
use tempfile::TempDir;

fn codes(list: &[&str]) -> CodeList {
    CodeList::from_codes(list.iter().map(|c| Code::new(*c)))
}

fn no_wait() -> InitPolicy {
    InitPolicy {
        attempts: 2,
        delay: Duration::from_millis(1),
    }
}

fn both() -> Vec<ScanDirection> {
    vec![ScanDirection::Forward, ScanDirection::Backward]
}

fn total(reports: &[ScanReport], field: fn(&ScanReport) -> u64) -> u64 {
    reports.iter().map(field).sum()
}

#[tokio::test]
async fn test_two_workers_cover_list_once() {
    let dir = TempDir::new().unwrap();
    let script = script();
    let list = ["A-1-1", "A-1-2", "A-1-3", "A-1-4"];
    for code in list {
        serve(&script, code, "zh_TW", &[2, 2]);
    }

    let book = CheckpointBook::new(SqliteStorage::new(&dir.path().join("harvest.db")).unwrap())
        .into_shared();
    let scheduler = Scheduler::new(
        book,
        ScriptedFactory {
            script: script.clone(),
        },
        settings(&download_root(&dir), &["zh_TW"]),
        CancelToken::new(),
    )
    .with_init_policy(no_wait())
    .with_retry(quick_retry(1));

    let reports = scheduler.run(&codes(&list), &both()).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].direction, ScanDirection::Forward);
    assert_eq!(reports[1].direction, ScanDirection::Backward);
    assert!(reports.iter().all(|r| r.init_error.is_none()));
    assert_eq!(total(&reports, |r| r.processed), 4);
    assert_eq!(total(&reports, |r| r.completed), 4);
    assert_eq!(
        total(&reports, |r| r.skipped_completed + r.skipped_held),
        4
    );

    // Both workers did some of the work
    assert!(reports[0].processed > 0);
    assert!(reports[1].processed > 0);

    // Every code's pages were downloaded exactly once
    let mut per_code: HashMap<Code, usize> = HashMap::new();
    for (_, code, _, _) in &script.lock().unwrap().downloads {
        *per_code.entry(code.clone()).or_insert(0) += 1;
    }
    assert_eq!(per_code.len(), 4);
    assert!(per_code.values().all(|pages| *pages == 2));

    let book = lock_book(scheduler.book());
    for code in list {
        let record = book.progress(&Code::new(code)).unwrap();
        assert_eq!(record.status, ProgressStatus::Completed);
        assert_eq!(record.current_page, 1);
    }
}

#[tokio::test]
async fn test_completed_codes_are_never_searched() {
    let dir = TempDir::new().unwrap();
    let script = script();
    serve(&script, "A-1-1", "zh_TW", &[1]);
    serve(&script, "A-1-2", "zh_TW", &[1]);

    let mut book = CheckpointBook::new(
        JsonFileStorage::open(
            &dir.path().join("progress.json"),
            &dir.path().join("failures.json"),
        )
        .unwrap(),
    );
    book.checkpoint(&Code::new("A-1-1"), ProgressStatus::Completed, 0, None);

    let scheduler = Scheduler::new(
        book.into_shared(),
        ScriptedFactory {
            script: script.clone(),
        },
        settings(&download_root(&dir), &["zh_TW"]),
        CancelToken::new(),
    )
    .with_init_policy(no_wait());

    let reports = scheduler
        .run(&codes(&["A-1-1", "A-1-2"]), &both())
        .await;

    let searched: Vec<Code> = script
        .lock()
        .unwrap()
        .searches
        .iter()
        .map(|s| s.1.clone())
        .collect();
    assert_eq!(searched, vec![Code::new("A-1-2")]);
    assert_eq!(total(&reports, |r| r.processed), 1);
}

#[tokio::test]
async fn test_retry_recovers_flaky_download() {
    let dir = TempDir::new().unwrap();
    let script = script();
    serve(&script, "A-1-1", "zh_TW", &[3]);
    script.lock().unwrap().flaky_downloads = 1;

    let book = CheckpointBook::new(SqliteStorage::new_in_memory().unwrap()).into_shared();
    let scheduler = Scheduler::new(
        book,
        ScriptedFactory {
            script: script.clone(),
        },
        settings(&download_root(&dir), &["zh_TW"]),
        CancelToken::new(),
    )
    .with_init_policy(no_wait())
    .with_retry(quick_retry(3));

    let reports = scheduler
        .run(&codes(&["A-1-1"]), &[ScanDirection::Forward])
        .await;

    assert_eq!(reports[0].retries, 1);
    assert_eq!(reports[0].completed, 1);
    assert_eq!(reports[0].errored, 0);

    let book = lock_book(scheduler.book());
    let code = Code::new("A-1-1");
    let record = book.progress(&code).unwrap();
    assert_eq!(record.status, ProgressStatus::Completed);
    assert_eq!(record.attempts, 1);
    assert!(book.failures_for(&code).is_empty());
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    let dir = TempDir::new().unwrap();
    let script = script();
    serve(&script, "A-1-1", "zh_CN", &[3]);
    time_out(&script, "A-1-1", "zh_CN", 0);

    let book = CheckpointBook::new(SqliteStorage::new_in_memory().unwrap()).into_shared();
    let report_path = dir.path().join("logs/download_stats.log");
    let scheduler = Scheduler::new(
        book,
        ScriptedFactory {
            script: script.clone(),
        },
        settings(&download_root(&dir), &["zh_CN"]),
        CancelToken::new(),
    )
    .with_init_policy(no_wait())
    .with_retry(quick_retry(3))
    .with_report_log(ReportLog::new(&report_path));

    let reports = scheduler
        .run(&codes(&["A-1-1"]), &[ScanDirection::Backward])
        .await;

    assert_eq!(reports[0].errored, 1);
    assert_eq!(reports[0].retries, 2);
    assert_eq!(script.lock().unwrap().searches.len(), 3);

    let book = lock_book(scheduler.book());
    let code = Code::new("A-1-1");
    let record = book.progress(&code).unwrap();
    assert_eq!(record.status, ProgressStatus::Error);
    assert_eq!(record.attempts, 3);
    assert_eq!(book.failures_for(&code)[0].variant, Variant::new("zh_CN"));

    let log = std::fs::read_to_string(&report_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines
        .iter()
        .all(|l| l.contains(" - A-1-1 - backward - error - total=3 downloaded=3 success=0 failed=3")));
}

#[tokio::test]
async fn test_one_worker_failing_to_start_leaves_the_other() {
    let dir = TempDir::new().unwrap();
    let script = script();
    let list = ["A-1-1", "A-1-2", "A-1-3"];
    for code in list {
        serve(&script, code, "zh_TW", &[1]);
    }
    script
        .lock()
        .unwrap()
        .broken_launch
        .insert(ScanDirection::Backward);

    let book = CheckpointBook::new(SqliteStorage::new_in_memory().unwrap()).into_shared();
    let scheduler = Scheduler::new(
        book,
        ScriptedFactory {
            script: script.clone(),
        },
        settings(&download_root(&dir), &["zh_TW"]),
        CancelToken::new(),
    )
    .with_init_policy(no_wait());

    let reports = scheduler.run(&codes(&list), &both()).await;

    assert!(reports[0].init_error.is_none());
    assert_eq!(reports[0].completed, 3);
    assert!(reports[1]
        .init_error
        .as_deref()
        .unwrap()
        .contains("browser binary missing"));
    assert_eq!(reports[1].processed, 0);
}

#[tokio::test]
async fn test_cancelled_run_processes_nothing() {
    let dir = TempDir::new().unwrap();
    let script = script();
    serve(&script, "A-1-1", "zh_TW", &[1]);

    let cancel = CancelToken::new();
    cancel.cancel();

    let book = CheckpointBook::new(SqliteStorage::new_in_memory().unwrap()).into_shared();
    let scheduler = Scheduler::new(
        book,
        ScriptedFactory {
            script: script.clone(),
        },
        settings(&download_root(&dir), &["zh_TW"]),
        cancel,
    )
    .with_init_policy(no_wait());

    let reports = scheduler.run(&codes(&["A-1-1"]), &both()).await;

    assert!(reports.iter().all(|r| r.cancelled && r.processed == 0));
    assert!(script.lock().unwrap().searches.is_empty());
    assert!(lock_book(scheduler.book())
        .progress(&Code::new("A-1-1"))
        .is_none());
}

#[tokio::test]
async fn test_page_mismatch_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let script = script();
    serve(&script, "A-1-1", "zh_TW", &[4, 4]);
    let code = Code::new("A-1-1");

    let mut book = CheckpointBook::new(SqliteStorage::new_in_memory().unwrap());
    book.checkpoint(
        &code,
        ProgressStatus::InProgress,
        4,
        Some(&Variant::new("zh_TW")),
    );

    let scheduler = Scheduler::new(
        book.into_shared(),
        ScriptedFactory {
            script: script.clone(),
        },
        settings(&download_root(&dir), &["zh_TW"]),
        CancelToken::new(),
    )
    .with_init_policy(no_wait())
    .with_retry(quick_retry(3));

    let reports = scheduler
        .run(&codes(&["A-1-1"]), &[ScanDirection::Forward])
        .await;

    assert_eq!(reports[0].errored, 1);
    assert_eq!(reports[0].retries, 0);
    assert_eq!(script.lock().unwrap().searches.len(), 1);

    let record = lock_book(scheduler.book()).progress(&code).unwrap();
    assert_eq!(record.status, ProgressStatus::Error);
    assert_eq!(record.current_page, 4);
}

#[tokio::test]
async fn test_repeated_direction_runs_one_worker() {
    let dir = TempDir::new().unwrap();
    let script = script();
    let list = ["A-1-1", "A-1-2", "A-1-3"];
    for code in list {
        serve(&script, code, "zh_TW", &[2, 2]);
    }

    let book = CheckpointBook::new(SqliteStorage::new_in_memory().unwrap()).into_shared();
    let scheduler = Scheduler::new(
        book,
        ScriptedFactory {
            script: script.clone(),
        },
        settings(&download_root(&dir), &["zh_TW"]),
        CancelToken::new(),
    )
    .with_init_policy(no_wait());

    let reports = scheduler
        .run(&codes(&list), &[ScanDirection::Forward, ScanDirection::Forward])
        .await;

    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].direction, ScanDirection::Forward);
    assert_eq!(reports[0].processed, 3);
    assert_eq!(reports[0].completed, 3);
    assert_eq!(script.lock().unwrap().downloads.len(), 6);
}
