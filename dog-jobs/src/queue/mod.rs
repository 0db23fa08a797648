//! Ordered in-process job queue.
//!
//! Jobs are niladic async closures. A drain loop running on the tokio runtime
//! starts them one after another (or on a fixed cadence, see [`DelayPolicy`]),
//! records every outcome in completion order and hands each outcome to the
//! live subscribers. Job failures and panics are captured as data; the only
//! error the queue ever returns is [`QueueError::Busy`] from [`JobQueue::reset`].
//!
//! ```text
//!   add ──► pending ──drain loop──► in flight ──► results ──► subscribers
//!                        ▲    │                      │
//!                        └────┘ sequential: next     └─► in_flight store ─► done()
//! ```
//!
//! Known hazard: `abort().await` waits for every started job. If a job, or a
//! subscriber reacting to it, waits on that same abort, neither side can make
//! progress. Nothing here detects the cycle.

mod config;
mod outcome;

pub use config::{DelayPolicy, QueueConfig};
pub use outcome::JobOutcome;

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::marker::UpdateMarkerManager;
use crate::store::Store;
use crate::subscription::Unsubscribe;
use crate::{JobError, QueueError, QueueResult};

type BoxJob<T> = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<T>> + Send>;
type Listener<T, Tag> = Arc<dyn Fn(&JobOutcome<T, Tag>) -> ControlFlow<()> + Send + Sync>;

/// Coarse lifecycle of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueStatus {
    /// Nothing pending and nothing in flight
    Idle,
    /// The drain loop is dispatching jobs
    Running,
    /// Aborted, waiting for started jobs to settle
    Aborting,
    /// Aborted and fully drained; `reset` re-arms the queue
    Aborted,
}

struct PendingJob<T, Tag> {
    task: BoxJob<T>,
    tag: Option<Tag>,
}

struct DrainState<T, Tag> {
    aborted: bool,
    running: bool,
    /// Bumped by `reset`; drain steps scheduled before it are ignored
    epoch: u64,
    pending: VecDeque<PendingJob<T, Tag>>,
    started: usize,
    in_flight: usize,
    results: Vec<Arc<JobOutcome<T, Tag>>>,
}

impl<T, Tag> DrainState<T, Tag> {
    /// No job will start without another `add`
    fn is_settled(&self) -> bool {
        self.aborted || self.pending.is_empty()
    }

    fn is_drained(&self) -> bool {
        self.in_flight == 0 && self.is_settled()
    }
}

struct Listeners<T, Tag> {
    next_id: u64,
    entries: Vec<(u64, Listener<T, Tag>)>,
}

impl<T, Tag> Listeners<T, Tag> {
    fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|(entry_id, _)| *entry_id == id)
    }

    fn remove(&mut self, id: u64) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }
}

struct QueueInner<T, Tag> {
    config: QueueConfig,
    state: Mutex<DrainState<T, Tag>>,
    listeners: Mutex<Listeners<T, Tag>>,
    /// Serialises result delivery against subscriber replay
    dispatch: ReentrantMutex<()>,
    in_flight: Store<usize>,
    failure_markers: Option<UpdateMarkerManager>,
}

/// Ordered job runner with abort/reset and replaying subscribers.
///
/// Cloning yields another handle to the same queue. `add` spawns onto the
/// ambient tokio runtime, so it must be called from within one.
pub struct JobQueue<T, Tag = ()> {
    inner: Arc<QueueInner<T, Tag>>,
}

impl<T, Tag> Clone for JobQueue<T, Tag> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, Tag> JobQueue<T, Tag>
where
    T: Send + Sync + 'static,
    Tag: Send + Sync + 'static,
{
    pub fn new(config: QueueConfig) -> Self {
        Self::build(config, None)
    }

    /// Strictly sequential queue with default settings
    pub fn sequential() -> Self {
        Self::new(QueueConfig::sequential())
    }

    /// Queue that also updates `markers` every time a job failure is logged
    pub fn with_failure_markers(config: QueueConfig, markers: UpdateMarkerManager) -> Self {
        Self::build(config, Some(markers))
    }

    fn build(config: QueueConfig, failure_markers: Option<UpdateMarkerManager>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                config,
                state: Mutex::new(DrainState {
                    aborted: false,
                    running: false,
                    epoch: 0,
                    pending: VecDeque::new(),
                    started: 0,
                    in_flight: 0,
                    results: Vec::new(),
                }),
                listeners: Mutex::new(Listeners {
                    next_id: 0,
                    entries: Vec::new(),
                }),
                dispatch: ReentrantMutex::new(()),
                in_flight: Store::new(0),
                failure_markers,
            }),
        }
    }

    /// Queue a job. Ignored once the queue has been aborted.
    pub fn add<F, Fut, E>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        self.push(task, None);
    }

    /// Queue a job whose outcome carries `tag`
    pub fn add_tagged<F, Fut, E>(&self, task: F, tag: Tag)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        self.push(task, Some(tag));
    }

    fn push<F, Fut, E>(&self, task: F, tag: Option<Tag>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error> + 'static,
    {
        let task: BoxJob<T> = Box::new(move || {
            async move { task().await.map_err(Into::into) }.boxed()
        });

        let start_epoch = {
            let mut state = self.inner.state.lock();
            if state.aborted {
                debug!(queue = %self.inner.config.name, "Queue aborted, dropping job");
                return;
            }
            state.pending.push_back(PendingJob { task, tag });
            if state.running {
                None
            } else {
                state.running = true;
                Some(state.epoch)
            }
        };

        if let Some(epoch) = start_epoch {
            debug!(queue = %self.inner.config.name, "Starting drain loop");
            let inner = self.inner.clone();
            tokio::spawn(async move { inner.run(epoch) });
        }
    }

    /// Stop starting new jobs and resolve once every started job has settled.
    ///
    /// The abort flag is set when this is called, not when the returned
    /// future is first polled.
    pub fn abort(&self) -> impl Future<Output = ()> + Send + 'static {
        let first = {
            let mut state = self.inner.state.lock();
            !std::mem::replace(&mut state.aborted, true)
        };
        if first {
            info!(queue = %self.inner.config.name, "Aborting queue");
        }
        // waiters parked on a transient zero re-check against the abort flag
        self.inner.publish();
        self.done()
    }

    /// Resolve once no job is in flight and none is left to start.
    ///
    /// Reactive: jobs added after this is called keep it pending until they
    /// settle too.
    pub fn done(&self) -> impl Future<Output = ()> + Send + 'static {
        let (tx, rx) = oneshot::channel::<()>();
        let tx = Mutex::new(Some(tx));
        let weak: Weak<QueueInner<T, Tag>> = Arc::downgrade(&self.inner);

        self.inner.in_flight.subscribe(move |count, unsubscribe| {
            let drained = match weak.upgrade() {
                Some(inner) => *count == 0 && inner.state.lock().is_drained(),
                None => true,
            };
            if drained {
                unsubscribe.unsubscribe();
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(());
                }
            }
        });

        async move {
            let _ = rx.await;
        }
    }

    /// Clear pending jobs, results and the abort flag, keeping subscribers.
    ///
    /// Fails with [`QueueError::Busy`] unless the queue is drained.
    #[instrument(skip(self), fields(queue = %self.inner.config.name))]
    pub async fn reset(&self) -> QueueResult<()> {
        {
            let mut state = self.inner.state.lock();
            if !state.is_drained() {
                warn!(in_flight = state.in_flight, "Reset called on a busy queue");
                return Err(QueueError::Busy {
                    in_flight: state.in_flight,
                });
            }
            state.aborted = false;
            state.running = false;
            state.epoch += 1;
            state.pending.clear();
            state.started = 0;
            state.results.clear();
        }
        self.inner.publish();
        info!("Queue reset");
        Ok(())
    }

    /// Replay every recorded outcome to `callback`, then register it for new
    /// ones.
    ///
    /// Returning `ControlFlow::Break(())` removes the callback. If that
    /// happens during the replay it is never registered and a no-op handle is
    /// returned.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&JobOutcome<T, Tag>) -> ControlFlow<()> + Send + Sync + 'static,
    {
        let _dispatch = self.inner.dispatch.lock();

        let replay = self.inner.state.lock().results.clone();
        for outcome in &replay {
            if callback(outcome).is_break() {
                return Unsubscribe::noop();
            }
        }

        let id = {
            let mut listeners = self.inner.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<QueueInner<T, Tag>> = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.lock().remove(id);
            }
        })
    }

    /// Outcomes recorded since the last reset, in completion order
    pub fn results(&self) -> Vec<Arc<JobOutcome<T, Tag>>> {
        self.inner.state.lock().results.clone()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    /// Observable in-flight count.
    ///
    /// Callbacks registered here run while the queue publishes a new count,
    /// with the store's dispatch lock held. Calling [`subscribe`](Self::subscribe)
    /// from such a callback takes the queue's dispatch lock after the store's.
    /// A queue subscriber calling [`abort`](Self::abort) or [`reset`](Self::reset)
    /// on another thread takes them in the opposite order, and the two threads
    /// deadlock.
    pub fn in_flight_store(&self) -> Store<usize> {
        self.inner.in_flight.clone()
    }

    /// Jobs added but not yet started
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Jobs started since the last reset
    pub fn started(&self) -> usize {
        self.inner.state.lock().started
    }

    /// Nothing in flight and nothing left to start; the condition [`done`](Self::done)
    /// waits for
    pub fn is_drained(&self) -> bool {
        self.inner.state.lock().is_drained()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.state.lock().aborted
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.inner.state.lock();
        match (state.aborted, state.in_flight > 0) {
            (true, true) => QueueStatus::Aborting,
            (true, false) => QueueStatus::Aborted,
            (false, true) => QueueStatus::Running,
            (false, false) if state.running && !state.pending.is_empty() => QueueStatus::Running,
            (false, false) => QueueStatus::Idle,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }
}

impl<T, Tag> QueueInner<T, Tag>
where
    T: Send + Sync + 'static,
    Tag: Send + Sync + 'static,
{
    /// One step of the drain loop
    fn run(self: &Arc<Self>, epoch: u64) {
        let next = {
            let mut state = self.state.lock();
            if state.epoch != epoch {
                return;
            }
            if state.aborted {
                state.running = false;
                None
            } else {
                match state.pending.pop_front() {
                    Some(job) => {
                        let position = state.started;
                        state.started += 1;
                        state.in_flight += 1;
                        Some((position, job))
                    }
                    None => {
                        state.running = false;
                        None
                    }
                }
            }
        };

        let Some((position, job)) = next else {
            debug!(queue = %self.config.name, "Drain loop idle");
            return;
        };
        self.publish();
        debug!(queue = %self.config.name, position, "Starting job");

        let inner = self.clone();
        tokio::spawn(async move {
            let result = match AssertUnwindSafe((job.task)()).catch_unwind().await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(error)) => Err(JobError::Failed(error)),
                Err(payload) => Err(JobError::from_panic(payload)),
            };
            inner.send(position, result, job.tag);
            inner.finish();
            if inner.config.delay.is_sequential() {
                inner.run(epoch);
            }
        });

        if let DelayPolicy::Fixed(delay) = self.config.delay {
            let inner = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.run(epoch);
            });
        }
    }

    fn finish(&self) {
        {
            let mut state = self.state.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.publish();
    }

    /// Record an outcome and deliver it to the live subscribers
    fn send(&self, position: usize, result: Result<T, JobError>, tag: Option<Tag>) {
        let _dispatch = self.dispatch.lock();

        let outcome = {
            let mut state = self.state.lock();
            let outcome = Arc::new(JobOutcome {
                index: state.results.len(),
                result,
                tag,
            });
            state.results.push(outcome.clone());
            outcome
        };

        match outcome.error() {
            Some(error) => {
                warn!(queue = %self.config.name, position, error = %error, "Job failed");
                if let Some(markers) = &self.failure_markers {
                    markers.update_markers();
                }
            }
            None => debug!(queue = %self.config.name, position, "Job completed"),
        }

        let snapshot: Vec<(u64, Listener<T, Tag>)> = self.listeners.lock().entries.clone();
        for (id, listener) in snapshot {
            if !self.listeners.lock().contains(id) {
                continue;
            }
            match std::panic::catch_unwind(AssertUnwindSafe(|| listener(&outcome))) {
                Ok(ControlFlow::Break(())) => {
                    self.listeners.lock().remove(id);
                }
                Ok(ControlFlow::Continue(())) => {}
                Err(payload) => {
                    let error = JobError::from_panic(payload);
                    warn!(queue = %self.config.name, position, subscriber = id, error = %error, "Subscriber panicked");
                }
            }
        }
    }

    /// Mirror the authoritative in-flight count into the observable store.
    ///
    /// Reading the count inside the store's update keeps concurrent
    /// publishers from overwriting a newer count with an older one.
    fn publish(&self) {
        self.in_flight.update(|_| self.state.lock().in_flight);
    }
}

impl<T, Tag> fmt::Debug for JobQueue<T, Tag> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("JobQueue")
            .field("name", &self.inner.config.name)
            .field("delay", &self.inner.config.delay)
            .field("aborted", &state.aborted)
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight)
            .field("results", &state.results.len())
            .finish()
    }
}
