use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dog_jobs::JobError;

use crate::entry::PickedFile;

/// Session-wide stop flag handed to every file delivery.
///
/// Once stopped, no further file is delivered until the session ends and a
/// new one starts.
#[derive(Debug, Clone)]
pub struct StopSignal {
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub(crate) fn new(stopped: bool) -> Self {
        Self {
            stopped: Arc::new(AtomicBool::new(stopped)),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub(crate) fn rearm(&self) {
        self.stopped.store(false, Ordering::Release);
    }
}

/// Upload lifecycle hooks
#[async_trait]
pub trait PickerHandler: Send + Sync + 'static {
    /// First job of a session is about to read its items
    async fn on_upload_start(&self) {}

    /// Called once per accepted file. Returning an error fails the current
    /// job; the session carries on with later jobs.
    async fn on_upload_next_file(&self, file: PickedFile, stop: &StopSignal) -> anyhow::Result<()>;

    /// The queue drained and the session is over
    async fn on_upload_end(&self) {}

    /// A picker job failed. Runs inside queue notification, so it must not
    /// block.
    fn on_upload_error(&self, _error: &JobError) {}
}
