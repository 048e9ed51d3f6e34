//! End-to-end runs of the dispatcher against real files on disk

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use batchline_core::{
    BoxError, CancelToken, CheckpointStore, Dispatcher, FileStatus, IngestError, handler_fn,
};
use tempfile::TempDir;

fn numbered(prefix: &str, n: u64) -> String {
    (1..=n).map(|i| format!("{prefix}{i}\n")).collect()
}

fn write_plain(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn write_gz(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut enc = flate2::write::GzEncoder::new(File::create(&path).unwrap(), Default::default());
    enc.write_all(content.as_bytes()).unwrap();
    enc.finish().unwrap();
    path
}

fn write_zst(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, zstd::encode_all(content.as_bytes(), 3).unwrap()).unwrap();
    path
}

/// Collects delivered lines per file prefix ("a3" -> key "a")
#[derive(Default)]
struct Recorder {
    lines: Mutex<BTreeMap<String, Vec<String>>>,
}

impl Recorder {
    fn record(&self, line: &[u8]) {
        let line = String::from_utf8_lossy(line).into_owned();
        let key: String = line.chars().take_while(|c| c.is_alphabetic()).collect();
        self.lines.lock().unwrap().entry(key).or_default().push(line);
    }

    fn get(&self, key: &str) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn total(&self) -> usize {
        self.lines.lock().unwrap().values().map(Vec::len).sum()
    }
}

fn expected(prefix: &str, range: std::ops::RangeInclusive<u64>) -> Vec<String> {
    range.map(|i| format!("{prefix}{i}")).collect()
}

#[test]
fn three_files_two_workers_all_complete() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_plain(&dir, "a.txt", &numbered("a", 10));
    let b = write_gz(&dir, "b.txt.gz", &numbered("b", 5));
    let c = write_plain(&dir, "c.txt", "");
    let checkpoint = dir.path().join("status.json");

    let recorder = Recorder::default();
    let handler = handler_fn(|_, line| {
        recorder.record(line);
        Ok(())
    });
    let dispatcher = Dispatcher::open(&checkpoint, 2).unwrap();
    let summary = dispatcher
        .run(&CancelToken::new(), &[a.clone(), b.clone(), c.clone()], &handler)
        .unwrap();

    assert_eq!(recorder.total(), 15);
    assert_eq!(recorder.get("a"), expected("a", 1..=10));
    assert_eq!(recorder.get("b"), expected("b", 1..=5));
    assert_eq!(summary.completed_files(), 3);
    assert_eq!(summary.total_lines(), 15);

    let reloaded = CheckpointStore::open(&checkpoint).unwrap();
    for f in [&a, &b, &c] {
        assert!(reloaded.is_complete(f), "{} not done", f.display());
    }
    let state = reloaded.snapshot();
    assert!(state.in_progress.is_empty());
    assert_eq!(state.done.len(), 3);
}

#[test]
fn completed_files_not_requeued() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_plain(&dir, "a.txt", &numbered("a", 4));
    let checkpoint = dir.path().join("status.json");

    let handler = handler_fn(|_, _| Ok(()));
    Dispatcher::open(&checkpoint, 1)
        .unwrap()
        .run(&CancelToken::new(), std::slice::from_ref(&a), &handler)
        .unwrap();

    let recorder = Recorder::default();
    let handler = handler_fn(|_, line| {
        recorder.record(line);
        Ok(())
    });
    let summary = Dispatcher::open(&checkpoint, 1)
        .unwrap()
        .run(&CancelToken::new(), &[a], &handler)
        .unwrap();

    assert_eq!(recorder.total(), 0);
    assert_eq!(summary.skipped_files, 1);
    assert!(summary.reports.is_empty());
}

#[test]
fn handler_error_isolated_to_its_file() {
    let dir = tempfile::tempdir().unwrap();
    let bad = write_plain(&dir, "bad.txt", &numbered("bad", 10));
    let good: Vec<PathBuf> = (0..4)
        .map(|i| write_plain(&dir, &format!("good{i}.txt"), &numbered("good", 3)))
        .collect();
    let checkpoint = dir.path().join("status.json");

    let handler = handler_fn(|_, line| -> Result<(), BoxError> {
        if line == b"bad3" {
            return Err("rejected".into());
        }
        Ok(())
    });
    let mut files = vec![bad.clone()];
    files.extend(good.iter().cloned());
    let summary = Dispatcher::open(&checkpoint, 2)
        .unwrap()
        .run(&CancelToken::new(), &files, &handler)
        .unwrap();

    let report = summary.report(&bad).unwrap();
    assert_eq!(report.line, 2);
    assert!(matches!(
        report.status,
        FileStatus::Failed(IngestError::Handler { line: 3, .. })
    ));
    assert_eq!(summary.failed_files(), 1);
    assert_eq!(summary.completed_files(), 4);

    let reloaded = CheckpointStore::open(&checkpoint).unwrap();
    assert_eq!(reloaded.resume_line(&bad), 2);
    assert!(!reloaded.is_complete(&bad));
    for g in &good {
        assert!(reloaded.is_complete(g));
    }
}

#[test]
fn failing_worker_stops_but_others_drain() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt");
    let rest: Vec<PathBuf> = (0..6)
        .map(|i| write_plain(&dir, &format!("f{i}.txt"), &numbered("f", 2)))
        .collect();
    let mut files = vec![missing.clone()];
    files.extend(rest.iter().cloned());

    let handler = handler_fn(|_, _| Ok(()));
    let summary = Dispatcher::open(dir.path().join("status.json"), 2)
        .unwrap()
        .run(&CancelToken::new(), &files, &handler)
        .unwrap();

    assert!(matches!(
        summary.report(&missing).unwrap().status,
        FileStatus::Failed(IngestError::Open { .. })
    ));
    assert_eq!(summary.completed_files(), 6);
    assert_eq!(summary.unstarted_files, 0);
}

#[test]
fn every_worker_failing_leaves_files_unstarted() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![
        dir.path().join("missing1.txt"),
        dir.path().join("missing2.txt"),
        write_plain(&dir, "never.txt", "x\n"),
    ];
    let handler = handler_fn(|_, _| Ok(()));
    let summary = Dispatcher::open(dir.path().join("status.json"), 2)
        .unwrap()
        .run(&CancelToken::new(), &files, &handler)
        .unwrap();

    assert_eq!(summary.failed_files(), 2);
    assert_eq!(summary.unstarted_files, 1);
    assert!(summary.report(&files[2]).is_none());
}

#[test]
fn cancel_before_start_leaves_checkpoint_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_plain(&dir, "a.txt", &numbered("a", 10));
    let b = write_plain(&dir, "b.txt", &numbered("b", 10));
    let checkpoint = dir.path().join("status.json");

    let store = CheckpointStore::open(&checkpoint).unwrap();
    store.record_progress(&a, 3, false);
    store.persist().unwrap();
    let before = fs::read(&checkpoint).unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let recorder = Recorder::default();
    let handler = handler_fn(|_, line| {
        recorder.record(line);
        Ok(())
    });
    let summary = Dispatcher::open(&checkpoint, 2)
        .unwrap()
        .run(&cancel, &[a, b], &handler)
        .unwrap();

    assert_eq!(recorder.total(), 0);
    assert!(summary.canceled);
    assert!(summary.reports.is_empty());
    assert_eq!(fs::read(&checkpoint).unwrap(), before);
}

#[test]
fn cancel_mid_file_then_resume() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_zst(&dir, "a.log.zst", &numbered("a", 20));
    let checkpoint = dir.path().join("status.json");

    // First run: cancel after line 7 is handled
    let cancel = CancelToken::new();
    let recorder = Recorder::default();
    let handler = handler_fn(|cancel, line| {
        recorder.record(line);
        if line == b"a7" {
            cancel.cancel();
        }
        Ok(())
    });
    let summary = Dispatcher::open(&checkpoint, 1)
        .unwrap()
        .run(&cancel, std::slice::from_ref(&a), &handler)
        .unwrap();
    assert!(matches!(
        summary.report(&a).unwrap().status,
        FileStatus::Stopped
    ));
    assert_eq!(recorder.get("a"), expected("a", 1..=7));

    let store = CheckpointStore::open(&checkpoint).unwrap();
    assert_eq!(store.resume_line(&a), 7);
    assert!(!store.is_complete(&a));

    // Second run: picks up at line 8, never re-delivers 1..=7
    let recorder = Recorder::default();
    let handler = handler_fn(|_, line| {
        recorder.record(line);
        Ok(())
    });
    let summary = Dispatcher::open(&checkpoint, 1)
        .unwrap()
        .run(&CancelToken::new(), std::slice::from_ref(&a), &handler)
        .unwrap();
    assert_eq!(recorder.get("a"), expected("a", 8..=20));
    assert_eq!(summary.total_lines(), 13);
    assert!(CheckpointStore::open(&checkpoint).unwrap().is_complete(&a));
}

#[test]
fn resume_from_recorded_line_delivers_only_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_gz(&dir, "a.gz", &numbered("a", 12));
    let checkpoint = dir.path().join("status.json");

    let store = CheckpointStore::open(&checkpoint).unwrap();
    store.record_progress(&a, 9, false);
    store.persist().unwrap();

    let recorder = Recorder::default();
    let handler = handler_fn(|_, line| {
        recorder.record(line);
        Ok(())
    });
    Dispatcher::open(&checkpoint, 3)
        .unwrap()
        .run(&CancelToken::new(), &[a], &handler)
        .unwrap();

    assert_eq!(recorder.get("a"), expected("a", 10..=12));
}

#[test]
fn lines_within_a_file_stay_in_order_under_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let prefixes = ["p", "q", "r", "s", "t", "u", "v", "w"];
    let files: Vec<PathBuf> = prefixes
        .iter()
        .map(|p| write_plain(&dir, &format!("{p}.txt"), &numbered(p, 2_000)))
        .collect();

    let recorder = Recorder::default();
    let handler = handler_fn(|_, line| {
        recorder.record(line);
        Ok(())
    });
    let summary = Dispatcher::open(dir.path().join("status.json"), 4)
        .unwrap()
        .run(&CancelToken::new(), &files, &handler)
        .unwrap();

    assert_eq!(summary.completed_files(), prefixes.len());
    for p in prefixes {
        assert_eq!(recorder.get(p), expected(p, 1..=2_000));
    }
}

#[test]
fn corrupt_checkpoint_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("status.json");
    fs::write(&checkpoint, "{ not json").unwrap();

    let err = Dispatcher::open(&checkpoint, 2).err().unwrap();
    assert!(matches!(err, IngestError::Checkpoint(_)));
    // Left as-is for the operator to inspect
    assert_eq!(fs::read_to_string(&checkpoint).unwrap(), "{ not json");
}

#[test]
fn checkpoint_file_is_human_readable_json() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_plain(&dir, "a.txt", "one\ntwo\n");
    let checkpoint = dir.path().join("status.json");
    let handler = handler_fn(|_, _| Ok(()));
    Dispatcher::open(&checkpoint, 1)
        .unwrap()
        .run(&CancelToken::new(), std::slice::from_ref(&a), &handler)
        .unwrap();

    let text = fs::read_to_string(&checkpoint).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["done"][0], a.display().to_string());
    assert!(json["in_progress"].as_object().unwrap().is_empty());
    assert_eq!(
        Path::new(json["name"].as_str().unwrap()),
        std::path::absolute(&checkpoint).unwrap()
    );
}
