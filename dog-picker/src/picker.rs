//! Upload sessions over dropped or selected items.
//!
//! Every `drop_items` / `change` call becomes one job on a sequential queue.
//! The first job of a session opens it; a watcher started with the session
//! waits `settle_delay`, then for the queue to drain, and closes it. Paths
//! seen during a session are delivered at most once.
//!
//! Sessions are numbered. A pick queued while `on_upload_end` of the previous
//! session is still running opens the next session, and the late end leaves
//! that session's state alone.

use std::collections::HashSet;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;

use dog_jobs::{DataSetMarkerManager, DelayPolicy, JobQueue, Push, RecursiveIterator, Store};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::entry::{Entry, PickedFile, TransferItem};
use crate::fs::EntrySource;
use crate::handler::{PickerHandler, StopSignal};
use crate::{PickerOptions, PickerResult};

const DROP_HANDLER: &str = "dropHandler";
const CHANGE_HANDLER: &str = "changeHandler";

/// One unit of traversal work
enum EntryBatch {
    /// Entries handed over by the caller
    Ready(Vec<Entry>),
    /// A directory whose children are read when the batch is expanded
    Directory(Entry),
}

type Expand = Box<dyn Fn(EntryBatch, Push<EntryBatch>) -> BoxStream<'static, PickerResult<Entry>> + Send + Sync>;

#[derive(Debug, Default)]
struct Session {
    generation: u64,
    open: bool,
}

struct PickerInner<S, H> {
    options: PickerOptions,
    source: Arc<S>,
    handler: Arc<H>,
    queue: JobQueue<(), &'static str>,
    traversal: RecursiveIterator<EntryBatch, PickerResult<Entry>, Expand>,
    seen: Arc<Mutex<HashSet<String>>>,
    session: Mutex<Session>,
    stop: StopSignal,
    uploading: Store<bool>,
    delivered: Option<DataSetMarkerManager<String>>,
}

/// Folder and file picker.
///
/// Cloning yields another handle to the same picker. Must be used from
/// within a tokio runtime.
pub struct FilePicker<S, H> {
    inner: Arc<PickerInner<S, H>>,
}

impl<S, H> Clone for FilePicker<S, H> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, H> FilePicker<S, H>
where
    S: EntrySource,
    H: PickerHandler,
{
    pub fn new(source: S, handler: H, options: PickerOptions) -> Self {
        Self::build(source, handler, options, None)
    }

    /// Picker that records the key of every delivered file in `delivered`
    pub fn with_markers(
        source: S,
        handler: H,
        options: PickerOptions,
        delivered: DataSetMarkerManager<String>,
    ) -> Self {
        Self::build(source, handler, options, Some(delivered))
    }

    fn build(
        source: S,
        handler: H,
        options: PickerOptions,
        delivered: Option<DataSetMarkerManager<String>>,
    ) -> Self {
        let source = Arc::new(source);
        let handler = Arc::new(handler);
        let seen = Arc::new(Mutex::new(HashSet::new()));

        if !options.queue.delay.is_sequential() {
            debug!(delay = ?options.queue.delay, "Picker queue forced to sequential");
        }
        let queue = JobQueue::new(options.queue.clone().with_delay(DelayPolicy::Sequential));

        let on_error = handler.clone();
        queue.subscribe(move |outcome| {
            if let Some(error) = outcome.error() {
                on_error.on_upload_error(error);
            }
            ControlFlow::Continue(())
        });

        let traversal = RecursiveIterator::new(expansion(source.clone(), seen.clone(), options.directory));

        Self {
            inner: Arc::new(PickerInner {
                options,
                source,
                handler,
                queue,
                traversal,
                seen,
                session: Mutex::new(Session::default()),
                stop: StopSignal::new(true),
                uploading: Store::distinct(false),
                delivered,
            }),
        }
    }

    /// Queue a drop of `items`.
    ///
    /// Entries are traversed first, then items that only offer a file view
    /// are delivered. Items offering neither are ignored.
    pub fn drop_items<I>(&self, items: I)
    where
        I: IntoIterator,
        I::Item: TransferItem,
    {
        let mut entries = Vec::new();
        let mut files = Vec::new();
        for item in items {
            if let Some(entry) = item.as_entry() {
                entries.push(entry);
            } else if let Some(text) = item.as_string() {
                debug!(len = text.len(), "Ignoring text item");
            }
            if let Some(file) = item.as_file() {
                files.push(file);
            }
        }
        self.enqueue(entries, files, DROP_HANDLER);
    }

    /// Queue a selection: the selected entries plus the flat file list
    pub fn change(&self, entries: Vec<Entry>, files: Vec<PickedFile>) {
        self.enqueue(entries, files, CHANGE_HANDLER);
    }

    fn enqueue(&self, entries: Vec<Entry>, files: Vec<PickedFile>, tag: &'static str) {
        debug!(tag, entries = entries.len(), files = files.len(), "Queueing pick");
        let inner = self.inner.clone();
        self.inner.queue.add_tagged(
            move || async move {
                inner.upload_start().await;
                inner.deliver_all(entries, files).await
            },
            tag,
        );
    }

    /// Resolve once every queued pick has run and the session it belongs to
    /// has ended
    pub fn settled(&self) -> impl Future<Output = ()> + Send + 'static {
        let drained = self.inner.queue.done();
        let uploading = self.inner.uploading.clone();
        async move {
            drained.await;
            let (tx, rx) = oneshot::channel::<()>();
            let tx = Mutex::new(Some(tx));
            uploading.subscribe(move |active, unsubscribe| {
                if !*active {
                    unsubscribe.unsubscribe();
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(());
                    }
                }
            });
            let _ = rx.await;
        }
    }

    /// Observable "session open" flag
    pub fn uploading(&self) -> Store<bool> {
        self.inner.uploading.clone()
    }

    pub fn is_uploading(&self) -> bool {
        self.inner.uploading.value()
    }

    pub fn queue(&self) -> &JobQueue<(), &'static str> {
        &self.inner.queue
    }

    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    pub fn options(&self) -> &PickerOptions {
        &self.inner.options
    }
}

impl<S, H> PickerInner<S, H>
where
    S: EntrySource,
    H: PickerHandler,
{
    async fn upload_start(self: &Arc<Self>) {
        let generation = {
            let mut session = self.session.lock();
            if session.open {
                return;
            }
            session.open = true;
            session.generation += 1;
            self.seen.lock().clear();
            self.stop.rearm();
            self.uploading.set(true);
            session.generation
        };
        info!(generation, "Upload started");
        self.handler.on_upload_start().await;

        let inner = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(inner.options.settle_delay).await;
            loop {
                inner.queue.done().await;
                if inner.close_session() {
                    break;
                }
            }
            inner.upload_end(generation).await;
        });
    }

    /// Close the open session if the queue is still drained. A pick queued
    /// between `done` resolving and this call keeps the session open.
    fn close_session(&self) -> bool {
        let mut session = self.session.lock();
        if !self.queue.is_drained() {
            return false;
        }
        session.open = false;
        self.stop.stop();
        true
    }

    fn is_current(&self, generation: u64) -> bool {
        let session = self.session.lock();
        !session.open && session.generation == generation
    }

    #[instrument(skip(self))]
    async fn upload_end(&self, generation: u64) {
        self.handler.on_upload_end().await;
        if !self.is_current(generation) {
            debug!("Next session already open");
            return;
        }
        if let Err(error) = self.queue.reset().await {
            warn!(%error, "Queue still busy at upload end");
        }

        let session = self.session.lock();
        if session.open || session.generation != generation {
            debug!("Next session already open");
            return;
        }
        self.seen.lock().clear();
        self.uploading.set(false);
        drop(session);
        info!("Upload ended");
    }

    async fn deliver_all(&self, entries: Vec<Entry>, files: Vec<PickedFile>) -> PickerResult<()> {
        if self.stop.is_stopped() {
            return Ok(());
        }

        let traversal = self.traversal.iterate(EntryBatch::Ready(entries));
        futures::pin_mut!(traversal);
        while let Some(entry) = traversal.next().await {
            let entry = entry?;
            let file = self.source.file(&entry).await?;
            if !self.options.accepts(&file.name) {
                debug!(file = %file.key(), "Skipping file outside accept filter");
                continue;
            }
            self.deliver(file).await?;
            if self.stop.is_stopped() {
                return Ok(());
            }
        }

        for file in files {
            let fresh = self.seen.lock().insert(file.key());
            if !fresh || file.size == 0 || !self.options.accepts(&file.name) {
                continue;
            }
            self.deliver(file).await?;
            if self.stop.is_stopped() {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn deliver(&self, file: PickedFile) -> PickerResult<()> {
        let key = file.key();
        debug!(file = %key, size = file.size, "Delivering file");
        if let Some(delivered) = &self.delivered {
            delivered.update_markers(key);
        }
        self.handler.on_upload_next_file(file, &self.stop).await?;
        if !self.options.multiple {
            self.stop.stop();
        }
        Ok(())
    }
}

/// Breadth-first expansion over entry batches.
///
/// Each entry is claimed once per session by its key. Files are yielded;
/// directories are queued for a later read when `directory` is set.
fn expansion<S: EntrySource>(source: Arc<S>, seen: Arc<Mutex<HashSet<String>>>, directory: bool) -> Expand {
    Box::new(move |batch: EntryBatch, push: Push<EntryBatch>| -> BoxStream<'static, PickerResult<Entry>> {
        let source = source.clone();
        let seen = seen.clone();
        async_stream::stream! {
            let entries = match batch {
                EntryBatch::Ready(entries) => entries,
                EntryBatch::Directory(dir) => match source.read_dir(&dir).await {
                    Ok(children) => children,
                    Err(error) => {
                        yield Err(error);
                        return;
                    }
                },
            };

            for entry in entries {
                let fresh = seen.lock().insert(entry.key().to_string());
                if !fresh {
                    continue;
                }
                if entry.is_file() {
                    yield Ok(entry);
                } else if directory {
                    push.push(EntryBatch::Directory(entry));
                } else {
                    debug!(dir = %entry.key(), "Not descending into directory");
                }
            }
        }
        .boxed()
    })
}
