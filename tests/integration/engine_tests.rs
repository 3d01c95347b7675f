//! Traversal engine scenarios against both on-disk backends

use crate::common::*;
use catalog_harvest::codes::Code;
use catalog_harvest::crawler::{CancelToken, CodeOutcome, ScanDirection, TraversalEngine};
use catalog_harvest::state::{ProgressRecord, ProgressStatus, Variant};
use catalog_harvest::storage::{
    lock_book, CheckpointBook, CheckpointStore, JsonFileStorage, SharedBook, SqliteStorage,
};
use std::path::Path;
use tempfile::TempDir;

type Opener<S> = fn(&Path) -> S;

fn sqlite(dir: &Path) -> SqliteStorage {
    SqliteStorage::new(&dir.join("state/harvest.db")).unwrap()
}

fn json(dir: &Path) -> JsonFileStorage {
    JsonFileStorage::open(
        &dir.join("state/download_progress.json"),
        &dir.join("state/failed_downloads.json"),
    )
    .unwrap()
}

async fn run_once<S: CheckpointStore>(
    book: &SharedBook<S>,
    script: &SharedScript,
    dir: &TempDir,
    variants: &[&str],
    code: &Code,
) -> CodeOutcome {
    let settings = settings(&download_root(dir), variants);
    let cancel = CancelToken::new();
    let mut driver = ScriptedDriver::new(script.clone(), ScanDirection::Forward);
    let prior = lock_book(book).progress(code);

    TraversalEngine::new(book, &mut driver, &settings, &cancel, ScanDirection::Forward)
        .run(code, prior)
        .await
}

fn stored<S: CheckpointStore>(open: Opener<S>, dir: &TempDir, code: &Code) -> ProgressRecord {
    open(dir.path()).get_progress(code).unwrap().unwrap()
}

async fn single_page_completes<S: CheckpointStore>(open: Opener<S>) {
    let dir = TempDir::new().unwrap();
    let script = script();
    serve(&script, "A-1-1", "zh_TW", &[5]);
    let code = Code::new("A-1-1");

    let book = CheckpointBook::new(open(dir.path())).into_shared();
    let outcome = run_once(&book, &script, &dir, &["zh_TW"], &code).await;
    drop(book);

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts().total_count, 5);
    assert_eq!(outcome.counts().success_count, 5);
    assert_eq!(outcome.counts().failed_count, 0);

    let record = stored(open, &dir, &code);
    assert_eq!(record.status, ProgressStatus::Completed);
    assert_eq!(record.current_page, 0);
    assert!(open(dir.path()).failures_for(&code).unwrap().is_empty());
}

#[tokio::test]
async fn test_single_page_completes_sqlite() {
    single_page_completes(sqlite).await;
}

#[tokio::test]
async fn test_single_page_completes_json() {
    single_page_completes(json).await;
}

async fn timeout_then_rerun_recovers<S: CheckpointStore>(open: Opener<S>) {
    let dir = TempDir::new().unwrap();
    let script = script();
    serve(&script, "A-1-1", "zh_TW", &[5]);
    time_out(&script, "A-1-1", "zh_TW", 0);
    let code = Code::new("A-1-1");
    let zh_tw = Variant::new("zh_TW");

    // First run: the download of page 0 times out
    let book = CheckpointBook::new(open(dir.path())).into_shared();
    let outcome = run_once(&book, &script, &dir, &["zh_TW"], &code).await;
    drop(book);

    match &outcome {
        CodeOutcome::Errored {
            outcome, attempts, ..
        } => {
            assert_eq!(outcome.success_count, 0);
            assert_eq!(outcome.failed_count, 5);
            assert_eq!(*attempts, 1);
        }
        other => panic!("expected an errored outcome, got {:?}", other),
    }

    let record = stored(open, &dir, &code);
    assert_eq!(record.status, ProgressStatus::Error);
    assert_eq!(record.current_page, 0);

    let failures = open(dir.path()).failures_for(&code).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].variant, zh_tw);
    assert!(failures[0].error_message.contains("did not complete"));

    // Second run from a fresh process: resumes at page 0 and succeeds
    heal(&script);
    let book = CheckpointBook::new(open(dir.path())).into_shared();
    let outcome = run_once(&book, &script, &dir, &["zh_TW"], &code).await;
    drop(book);

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts().success_count, 5);

    let record = stored(open, &dir, &code);
    assert_eq!(record.status, ProgressStatus::Completed);
    assert_eq!(record.current_page, 0);
    assert!(open(dir.path()).failures_for(&code).unwrap().is_empty());

    let downloads = &script.lock().unwrap().downloads;
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0].3, 0);
}

#[tokio::test]
async fn test_timeout_then_rerun_recovers_sqlite() {
    timeout_then_rerun_recovers(sqlite).await;
}

#[tokio::test]
async fn test_timeout_then_rerun_recovers_json() {
    timeout_then_rerun_recovers(json).await;
}

async fn checkpoints_every_page<S: CheckpointStore>(open: Opener<S>) {
    let dir = TempDir::new().unwrap();
    let script = script();
    let codes = ["A-1-1", "A-1-2", "A-1-3"];
    for code in codes {
        serve(&script, code, "zh_TW", &[4, 4, 4]);
    }

    let store = RecordingStore::new(open(dir.path()));
    let writes = store.writes.clone();
    let book = CheckpointBook::new(store).into_shared();

    for code in codes {
        let code = Code::new(code);
        let outcome = run_once(&book, &script, &dir, &["zh_TW"], &code).await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.counts().success_count, 12);
        assert_eq!(outcome.counts().downloaded_count, 12);
    }

    let writes = writes.lock().unwrap();
    for code in codes {
        let code = Code::new(code);
        let per_code: Vec<(ProgressStatus, u32)> = writes
            .iter()
            .filter(|(c, _, _)| *c == code)
            .map(|(_, status, page)| (*status, *page))
            .collect();

        assert_eq!(
            per_code,
            vec![
                (ProgressStatus::Pending, 0),
                (ProgressStatus::InProgress, 0),
                (ProgressStatus::InProgress, 1),
                (ProgressStatus::InProgress, 2),
                (ProgressStatus::Completed, 2),
            ]
        );
    }
}

#[tokio::test]
async fn test_checkpoints_every_page_sqlite() {
    checkpoints_every_page(sqlite).await;
}

#[tokio::test]
async fn test_checkpoints_every_page_json() {
    checkpoints_every_page(json).await;
}

#[tokio::test]
async fn test_resume_redoes_checkpointed_page() {
    let dir = TempDir::new().unwrap();
    let script = script();
    serve(&script, "A-1-1", "zh_TW", &[4, 4, 4, 4]);
    let code = Code::new("A-1-1");
    let zh_tw = Variant::new("zh_TW");

    let book = CheckpointBook::new(sqlite(dir.path())).into_shared();
    lock_book(&book).checkpoint(&code, ProgressStatus::InProgress, 2, Some(&zh_tw));

    let outcome = run_once(&book, &script, &dir, &["zh_TW"], &code).await;

    assert!(outcome.is_completed());
    let pages: Vec<u32> = script
        .lock()
        .unwrap()
        .downloads
        .iter()
        .map(|d| d.3)
        .collect();
    assert_eq!(pages, vec![2, 3]);
    assert_eq!(outcome.counts().success_count, 8);
    assert_eq!(lock_book(&book).progress(&code).unwrap().current_page, 3);
}

#[tokio::test]
async fn test_zero_results_complete_without_failure() {
    let dir = TempDir::new().unwrap();
    let script = script();
    let code = Code::new("A-1-9");
    let zh_tw = Variant::new("zh_TW");

    let book = CheckpointBook::new(json(dir.path())).into_shared();
    {
        let mut book = lock_book(&book);
        book.checkpoint(&code, ProgressStatus::Error, 3, Some(&zh_tw));
        book.record_failure(&code, &zh_tw, "navigation failed");
    }

    let outcome = run_once(&book, &script, &dir, &["zh_TW"], &code).await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.counts().total_count, 0);

    let record = lock_book(&book).progress(&code).unwrap();
    assert_eq!(record.status, ProgressStatus::Completed);
    assert_eq!(record.current_page, 3);
    assert!(lock_book(&book).failures_for(&code).is_empty());
}

#[tokio::test]
async fn test_success_clears_only_its_variant() {
    let dir = TempDir::new().unwrap();
    let script = script();
    serve(&script, "A-1-1", "zh_TW", &[3]);
    serve(&script, "A-1-1", "zh_CN", &[3]);
    time_out(&script, "A-1-1", "zh_CN", 0);
    let code = Code::new("A-1-1");
    let zh_tw = Variant::new("zh_TW");
    let zh_cn = Variant::new("zh_CN");

    let book = CheckpointBook::new(sqlite(dir.path())).into_shared();
    {
        let mut book = lock_book(&book);
        book.record_failure(&code, &zh_tw, "earlier timeout");
        book.record_failure(&code, &zh_cn, "earlier timeout");
    }

    let outcome = run_once(&book, &script, &dir, &["zh_TW", "zh_CN"], &code).await;
    assert!(matches!(outcome, CodeOutcome::Errored { .. }));
    assert_eq!(outcome.counts().success_count, 3);
    assert_eq!(outcome.counts().failed_count, 3);

    let failures = lock_book(&book).failures_for(&code);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].variant, zh_cn);
    assert!(failures[0].error_message.contains("did not complete"));

    let record = lock_book(&book).progress(&code).unwrap();
    assert_eq!(record.status, ProgressStatus::Error);
    assert_eq!(record.current_page, 0);
    assert_eq!(record.variant, Some(zh_cn.clone()));

    // The next invocation resumes in zh_CN without searching zh_TW again
    heal(&script);
    script.lock().unwrap().searches.clear();
    let outcome = run_once(&book, &script, &dir, &["zh_TW", "zh_CN"], &code).await;

    assert!(outcome.is_completed());
    let searched: Vec<Variant> = script
        .lock()
        .unwrap()
        .searches
        .iter()
        .map(|s| s.2.clone())
        .collect();
    assert_eq!(searched, vec![zh_cn]);
    assert!(lock_book(&book).failures_for(&code).is_empty());
}

#[tokio::test]
async fn test_page_mismatch_is_a_consistency_failure() {
    let dir = TempDir::new().unwrap();
    let script = script();
    // Only two pages exist, but the cursor says page 4
    serve(&script, "A-1-1", "zh_TW", &[4, 4]);
    let code = Code::new("A-1-1");
    let zh_tw = Variant::new("zh_TW");

    let book = CheckpointBook::new(sqlite(dir.path())).into_shared();
    lock_book(&book).checkpoint(&code, ProgressStatus::InProgress, 4, Some(&zh_tw));

    let outcome = run_once(&book, &script, &dir, &["zh_TW"], &code).await;

    match outcome {
        CodeOutcome::Errored { message, .. } => {
            assert!(message.contains("Expected page"), "{}", message)
        }
        other => panic!("expected a consistency failure, got {:?}", other),
    }

    // The cursor does not move backwards
    let record = lock_book(&book).progress(&code).unwrap();
    assert_eq!(record.status, ProgressStatus::Error);
    assert_eq!(record.current_page, 4);
    assert!(script.lock().unwrap().downloads.is_empty());
}
