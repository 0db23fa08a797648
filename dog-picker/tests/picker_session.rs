use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_test::{assert_pending, task};

use dog_jobs::{DataSetMarkerManager, JobError};
use dog_picker::prelude::*;

/// Handler that records every callback
#[derive(Default)]
struct Recorder {
    files: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    starts: AtomicUsize,
    ends: AtomicUsize,
    stop_after: Option<usize>,
    reject: Option<&'static str>,
    end_delay: Option<Duration>,
}

impl Recorder {
    fn stopping_after(count: usize) -> Self {
        Self {
            stop_after: Some(count),
            ..Self::default()
        }
    }

    fn rejecting(name: &'static str) -> Self {
        Self {
            reject: Some(name),
            ..Self::default()
        }
    }

    fn ending_slowly(delay: Duration) -> Self {
        Self {
            end_delay: Some(delay),
            ..Self::default()
        }
    }

    fn files(&self) -> Vec<String> {
        self.files.lock().clone()
    }

    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn ends(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PickerHandler for Recorder {
    async fn on_upload_start(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_upload_next_file(&self, file: PickedFile, stop: &StopSignal) -> anyhow::Result<()> {
        if self.reject == Some(file.name.as_str()) {
            anyhow::bail!("rejected {}", file.name);
        }
        let count = {
            let mut files = self.files.lock();
            files.push(file.key());
            files.len()
        };
        if self.stop_after == Some(count) {
            stop.stop();
        }
        Ok(())
    }

    async fn on_upload_end(&self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.end_delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn on_upload_error(&self, error: &JobError) {
        self.errors.lock().push(error.to_string());
    }
}

/// Source whose directories cannot be read
struct LockedSource;

#[async_trait]
impl EntrySource for LockedSource {
    async fn read_dir(&self, _dir: &Entry) -> PickerResult<Vec<Entry>> {
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked").into())
    }

    async fn file(&self, entry: &Entry) -> PickerResult<PickedFile> {
        Ok(PickedFile::from_entry(entry, 1))
    }
}

/// Test factory functions
fn fast_options() -> PickerOptions {
    PickerOptions::default().with_settle_delay(Duration::from_millis(10))
}

/// album/{a.txt, z.txt, cover.png, sub/{b.txt, deeper/{c.txt}}}
fn album() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("album");
    std::fs::create_dir_all(root.join("sub/deeper")).unwrap();
    write(&root.join("a.txt"), "a");
    write(&root.join("z.txt"), "zz");
    write(&root.join("cover.png"), "png");
    write(&root.join("sub/b.txt"), "b");
    write(&root.join("sub/deeper/c.txt"), "c");
    dir
}

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

fn loose(name: &str, size: u64) -> PickedFile {
    PickedFile {
        location: name.into(),
        relative_path: String::new(),
        name: name.to_string(),
        size,
    }
}

async fn drop_album(picker: &FilePicker<LocalEntrySource, Recorder>, dir: &TempDir) {
    let item = LocalEntrySource::new()
        .item(dir.path().join("album"))
        .await
        .unwrap();
    picker.drop_items([item]);
}

/// A1. Nested directories are delivered breadth-first
#[test_log::test(tokio::test)]
async fn test_drop_traverses_breadth_first() {
    let dir = album();
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), fast_options());

    drop_album(&picker, &dir).await;
    picker.settled().await;

    assert_eq!(
        picker.handler().files(),
        vec![
            "album/a.txt",
            "album/cover.png",
            "album/z.txt",
            "album/sub/b.txt",
            "album/sub/deeper/c.txt",
        ]
    );
    assert_eq!(picker.handler().starts(), 1);
    assert_eq!(picker.handler().ends(), 1);
    assert!(!picker.is_uploading());
}

/// A2. Picks within one session share the seen set
#[tokio::test]
async fn test_repeated_drop_in_session_is_deduplicated() {
    let dir = album();
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), fast_options());

    let item = LocalEntrySource::new()
        .item(dir.path().join("album"))
        .await
        .unwrap();
    picker.drop_items([item.clone()]);
    picker.drop_items([item]);
    picker.settled().await;

    assert_eq!(picker.handler().files().len(), 5);
    assert_eq!(picker.handler().starts(), 1);
}

/// A3. A new session forgets what the last one delivered
#[tokio::test]
async fn test_next_session_delivers_again() {
    let dir = album();
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), fast_options());

    drop_album(&picker, &dir).await;
    picker.settled().await;
    drop_album(&picker, &dir).await;
    picker.settled().await;

    assert_eq!(picker.handler().files().len(), 10);
    assert_eq!(picker.handler().starts(), 2);
    assert_eq!(picker.handler().ends(), 2);
}

/// B1. The stop signal ends delivery for the rest of the session
#[tokio::test]
async fn test_stop_signal_ends_session_delivery() {
    let dir = album();
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::stopping_after(2), fast_options());

    drop_album(&picker, &dir).await;
    picker.change(Vec::new(), vec![loose("late.txt", 4)]);
    picker.settled().await;

    assert_eq!(picker.handler().files(), vec!["album/a.txt", "album/cover.png"]);
}

/// B2. Single-file pickers stop after the first delivery
#[tokio::test]
async fn test_single_file_mode() {
    let dir = album();
    let options = fast_options().with_multiple(false);
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), options);

    drop_album(&picker, &dir).await;
    picker.settled().await;

    assert_eq!(picker.handler().files(), vec!["album/a.txt"]);
}

/// B3. Files outside the accept filter are skipped
#[tokio::test]
async fn test_accept_filter() {
    let dir = album();
    let options = fast_options().with_accept(".png");
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), options);

    drop_album(&picker, &dir).await;
    picker.settled().await;

    assert_eq!(picker.handler().files(), vec!["album/cover.png"]);
}

/// B4. Directories are not descended into when disabled
#[tokio::test]
async fn test_directory_traversal_can_be_disabled() {
    let dir = album();
    let options = fast_options().with_directory(false);
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), options);

    let root = LocalEntrySource::new()
        .read_dir(&LocalEntrySource::new().entry(dir.path().join("album")).await.unwrap())
        .await
        .unwrap();
    picker.change(root, Vec::new());
    picker.settled().await;

    assert_eq!(
        picker.handler().files(),
        vec!["album/a.txt", "album/cover.png", "album/z.txt"]
    );
}

/// C1. Loose files are deduplicated and empty ones skipped
#[tokio::test]
async fn test_loose_files() {
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), fast_options());

    picker.change(
        Vec::new(),
        vec![loose("x.txt", 3), loose("x.txt", 3), loose("empty.txt", 0), loose("y.txt", 1)],
    );
    picker.settled().await;

    assert_eq!(picker.handler().files(), vec!["x.txt", "y.txt"]);
}

/// C2. A dropped file offers both views but is delivered once
#[tokio::test]
async fn test_dropped_file_is_delivered_once() {
    let dir = album();
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), fast_options());

    let item = LocalEntrySource::new()
        .item(dir.path().join("album/a.txt"))
        .await
        .unwrap();
    assert!(item.as_file().is_some());
    picker.drop_items([item]);
    picker.settled().await;

    assert_eq!(picker.handler().files(), vec!["a.txt"]);
}

/// D1. Handler failures reach on_upload_error and the session still ends
#[tokio::test]
async fn test_handler_failure_is_reported() {
    let dir = album();
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::rejecting("cover.png"), fast_options());

    drop_album(&picker, &dir).await;
    picker.settled().await;

    let recorder = picker.handler();
    assert_eq!(*recorder.errors.lock(), vec!["rejected cover.png".to_string()]);
    assert_eq!(recorder.files(), vec!["album/a.txt"]);
    assert_eq!(recorder.ends(), 1);
    assert!(picker.queue().results().is_empty());
}

/// D2. Unreadable directories fail the pick after earlier files
#[tokio::test]
async fn test_unreadable_directory_fails_job() {
    let picker = FilePicker::new(LockedSource, Recorder::default(), fast_options());

    picker.drop_items([
        Entry::root("locked", EntryKind::Directory, "locked"),
        Entry::root("ok.txt", EntryKind::File, "ok.txt"),
    ]);
    picker.settled().await;

    let recorder = picker.handler();
    assert_eq!(recorder.files(), vec!["ok.txt"]);
    assert_eq!(recorder.errors.lock().len(), 1);
    assert!(recorder.errors.lock()[0].contains("locked"));
}

/// E1. Delivered keys are broadcast to injected markers
#[tokio::test]
async fn test_delivered_files_update_markers() {
    let dir = album();
    let markers = DataSetMarkerManager::new();
    let marker = markers.new_marker();
    let picker = FilePicker::with_markers(
        LocalEntrySource::new(),
        Recorder::default(),
        fast_options().with_accept(".txt"),
        markers,
    );

    drop_album(&picker, &dir).await;
    picker.settled().await;

    let data = marker.data();
    assert_eq!(data.len(), 4);
    assert!(data.contains("album/sub/deeper/c.txt"));
    assert!(!data.contains("album/cover.png"));
}

/// E2. The session flag is observable
#[tokio::test]
async fn test_uploading_store_flips_once_per_session() {
    let dir = album();
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), fast_options());

    let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    picker.uploading().subscribe(move |active, _| sink.lock().push(*active));

    drop_album(&picker, &dir).await;
    picker.settled().await;

    assert_eq!(*seen.lock(), vec![false, true, false]);
}

/// E3. A pick made while the previous session is ending gets its own session
#[test_log::test(tokio::test)]
async fn test_pick_during_slow_end_opens_next_session() {
    let picker = FilePicker::new(
        LocalEntrySource::new(),
        Recorder::ending_slowly(Duration::from_millis(100)),
        fast_options(),
    );

    picker.change(Vec::new(), vec![loose("x.txt", 1)]);
    while picker.handler().ends() == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    picker.change(Vec::new(), vec![loose("x.txt", 1)]);
    let mut settled = task::spawn(picker.settled());
    assert_pending!(settled.poll());

    picker.settled().await;

    let recorder = picker.handler();
    assert_eq!(recorder.files(), vec!["x.txt", "x.txt"]);
    assert_eq!(recorder.starts(), 2);
    assert_eq!(recorder.ends(), 2);
    assert!(!picker.is_uploading());
    assert!(!picker.uploading().value());
}

/// E4. settled stays pending while a session is open
#[tokio::test]
async fn test_settled_waits_for_session_end() {
    let dir = album();
    let options = fast_options().with_settle_delay(Duration::from_millis(200));
    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), options);

    drop_album(&picker, &dir).await;
    while !picker.is_uploading() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let mut settled = task::spawn(picker.settled());
    assert_pending!(settled.poll());
    assert_eq!(picker.handler().ends(), 0);

    picker.settled().await;
    assert_eq!(picker.handler().ends(), 1);
    assert!(!picker.is_uploading());
}

/// A4. Directory symlinks looping back to an ancestor are not followed
#[cfg(unix)]
#[tokio::test]
async fn test_symlink_loops_are_not_walked() {
    let dir = album();
    let root = dir.path().join("album");
    std::os::unix::fs::symlink(&root, root.join("loop")).unwrap();
    std::os::unix::fs::symlink(&root, root.join("sub/back")).unwrap();

    let picker = FilePicker::new(LocalEntrySource::new(), Recorder::default(), fast_options());
    drop_album(&picker, &dir).await;
    tokio::time::timeout(Duration::from_secs(5), picker.settled())
        .await
        .expect("session should end");

    let files = picker.handler().files();
    assert_eq!(files.len(), 5);
    assert_eq!(files.iter().filter(|f| f.ends_with("a.txt")).count(), 1);
}
