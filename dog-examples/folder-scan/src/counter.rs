use std::ops::ControlFlow;

use async_trait::async_trait;
use dog_jobs::{JobError, JobQueue, QueueConfig};
use dog_picker::{PickedFile, PickerHandler, StopSignal};
use tracing::{info, warn};

/// Totals for one scan
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub files: usize,
    pub bytes: u64,
    pub failed: usize,
}

/// Handler that measures every delivered file on its own queue
pub struct FileCounter {
    queue: JobQueue<u64, String>,
}

impl FileCounter {
    pub fn new() -> Self {
        let queue = JobQueue::new(QueueConfig::sequential().with_name("folder-scan"));
        queue.subscribe(|outcome| {
            if let (Some(bytes), Some(path)) = (outcome.value(), outcome.tag()) {
                println!("{path} ({bytes} bytes)");
            }
            ControlFlow::Continue(())
        });
        Self { queue }
    }

    /// Wait for every queued measurement, then total them up
    pub async fn summary(&self) -> Summary {
        self.queue.done().await;
        self.queue
            .results()
            .iter()
            .fold(Summary::default(), |mut summary, outcome| {
                match outcome.value() {
                    Some(bytes) => {
                        summary.files += 1;
                        summary.bytes += bytes;
                    }
                    None => summary.failed += 1,
                }
                summary
            })
    }
}

impl Default for FileCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PickerHandler for FileCounter {
    async fn on_upload_start(&self) {
        info!("Scan started");
    }

    async fn on_upload_next_file(&self, file: PickedFile, _stop: &StopSignal) -> anyhow::Result<()> {
        let location = file.location.clone();
        self.queue.add_tagged(
            move || async move { tokio::fs::metadata(location).await.map(|m| m.len()) },
            file.key(),
        );
        Ok(())
    }

    async fn on_upload_end(&self) {
        info!("Scan finished");
    }

    fn on_upload_error(&self, error: &JobError) {
        warn!(%error, "Scan job failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dog_picker::{FilePicker, LocalEntrySource, PickerOptions};
    use std::time::Duration;

    #[tokio::test]
    async fn counts_files_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("one.txt"), b"12345").unwrap();
        std::fs::write(dir.path().join("nested/two.txt"), b"12").unwrap();

        let source = LocalEntrySource::new();
        let item = source.item(dir.path()).await.unwrap();
        let options = PickerOptions::default().with_settle_delay(Duration::from_millis(5));
        let picker = FilePicker::new(source, FileCounter::new(), options);

        picker.drop_items([item]);
        picker.settled().await;

        let summary = picker.handler().summary().await;
        assert_eq!(summary, Summary { files: 2, bytes: 7, failed: 0 });
    }

    #[tokio::test]
    async fn empty_scan_reports_nothing() {
        let counter = FileCounter::new();
        assert_eq!(counter.summary().await, Summary::default());
    }
}
