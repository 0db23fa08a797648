//! Lazy breadth-first expansion over a worklist that grows while it is read.
//!
//! Each worklist entry is handed to an expansion function together with a
//! [`Push`] handle. The function returns a stream of outputs and may push more
//! entries; pushed entries are expanded after every entry already queued.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::StreamExt;
use futures_core::Stream;
use parking_lot::Mutex;

/// Append-only list of inputs walked by a cursor. Slots stay in place once
/// visited; only the input is moved out to the expansion.
struct Worklist<In> {
    entries: Vec<Option<In>>,
    cursor: usize,
}

/// Appends entries to the worklist of one traversal
pub struct Push<In> {
    worklist: Arc<Mutex<Worklist<In>>>,
}

impl<In> Clone for Push<In> {
    fn clone(&self) -> Self {
        Self {
            worklist: self.worklist.clone(),
        }
    }
}

impl<In> Push<In> {
    fn seeded(initial: In) -> Self {
        Self {
            worklist: Arc::new(Mutex::new(Worklist {
                entries: vec![Some(initial)],
                cursor: 0,
            })),
        }
    }

    pub fn push(&self, input: In) {
        self.worklist.lock().entries.push(Some(input));
    }

    fn next(&self) -> Option<In> {
        let mut worklist = self.worklist.lock();
        let index = worklist.cursor;
        let input = worklist.entries.get_mut(index)?.take();
        worklist.cursor += 1;
        input
    }

    /// Entries queued but not yet expanded
    pub fn remaining(&self) -> usize {
        let worklist = self.worklist.lock();
        worklist.entries.len() - worklist.cursor
    }

    /// Every entry of this traversal so far, including the initial input
    pub fn len(&self) -> usize {
        self.worklist.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<In> fmt::Debug for Push<In> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Push")
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Breadth-first expander built around one expansion function.
///
/// The iterator keeps no traversal state; every [`iterate`](Self::iterate)
/// call owns a fresh worklist.
///
/// ```rust
/// use dog_jobs::{Push, RecursiveIterator};
/// use futures::{stream, StreamExt};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let counter = RecursiveIterator::new(|i: u32, push: Push<u32>| {
///     if i < 3 {
///         push.push(i + 1);
///     }
///     stream::iter([format!("out:{i}")])
/// });
///
/// let out: Vec<String> = counter.iterate(0).collect().await;
/// assert_eq!(out, ["out:0", "out:1", "out:2", "out:3"]);
/// # }
/// ```
pub struct RecursiveIterator<In, Out, F> {
    expand: Arc<F>,
    _marker: PhantomData<fn(In) -> Out>,
}

impl<In, Out, F> Clone for RecursiveIterator<In, Out, F> {
    fn clone(&self) -> Self {
        Self {
            expand: self.expand.clone(),
            _marker: PhantomData,
        }
    }
}

impl<In, Out, F, S> RecursiveIterator<In, Out, F>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In, Push<In>) -> S + Send + Sync + 'static,
    S: Stream<Item = Out> + Send + 'static,
{
    pub fn new(expand: F) -> Self {
        Self {
            expand: Arc::new(expand),
            _marker: PhantomData,
        }
    }

    /// Start a traversal seeded with `initial`.
    ///
    /// Nothing runs until the returned stream is polled. The stream ends once
    /// the worklist is empty, so it is infinite if the expansion keeps pushing.
    pub fn iterate(&self, initial: In) -> impl Stream<Item = Out> + Send + 'static {
        let expand = self.expand.clone();
        async_stream::stream! {
            let worklist = Push::seeded(initial);
            while let Some(input) = worklist.next() {
                let outputs = expand(input, worklist.clone());
                futures::pin_mut!(outputs);
                while let Some(output) = outputs.next().await {
                    yield output;
                }
            }
        }
    }
}

impl<In, Out, F> fmt::Debug for RecursiveIterator<In, Out, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecursiveIterator").finish_non_exhaustive()
    }
}
