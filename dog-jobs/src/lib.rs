//! # dog-jobs: in-process job queue and lazy traversal
//!
//! Small concurrency building blocks used by the DogRS picker:
//!
//! - [`Store`] / [`ConstantStore`]: single-slot observable values that replay
//!   their current value to every new subscriber
//! - [`JobQueue`]: ordered task runner with abort/reset, a reactive
//!   [`done`](JobQueue::done) signal and subscribers that see every outcome
//! - [`RecursiveIterator`]: breadth-first expansion over a worklist that grows
//!   while it is being consumed
//! - [`UpdateMarkerManager`] / [`DataSetMarkerManager`]: injected change markers
//!
//! ## Quick Start
//!
//! ```rust
//! use std::ops::ControlFlow;
//! use dog_jobs::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> QueueResult<()> {
//! let queue: JobQueue<u32, &'static str> = JobQueue::new(QueueConfig::default());
//!
//! queue.subscribe(|outcome| {
//!     println!("{:?} -> {:?}", outcome.tag(), outcome.value());
//!     ControlFlow::Continue(())
//! });
//!
//! queue.add_tagged(|| async { Ok::<_, anyhow::Error>(1) }, "first");
//! queue.add_tagged(|| async { Ok::<_, anyhow::Error>(2) }, "second");
//!
//! queue.done().await;
//! queue.reset().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod marker;
pub mod queue;
pub mod recursive;
pub mod store;
pub mod subscription;

pub use error::{JobError, QueueError, QueueResult};
pub use marker::{DataSetMarker, DataSetMarkerManager, UpdateMarker, UpdateMarkerManager};
pub use queue::{DelayPolicy, JobOutcome, JobQueue, QueueConfig, QueueStatus};
pub use recursive::{Push, RecursiveIterator};
pub use store::{ConstantStore, Store};
pub use subscription::Unsubscribe;

/// Install a `tracing-subscriber` fmt layer driven by `RUST_LOG`.
///
/// Falls back to `default_filter` when `RUST_LOG` is unset. Calling it twice is
/// harmless; the second install is ignored.
#[cfg(feature = "tracing-basic")]
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Common imports for queue consumers
pub mod prelude {
    pub use crate::{
        ConstantStore, DelayPolicy, JobError, JobOutcome, JobQueue, Push, QueueConfig,
        QueueError, QueueResult, QueueStatus, RecursiveIterator, Store, Unsubscribe,
    };
}
