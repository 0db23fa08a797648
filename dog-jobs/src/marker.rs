//! Change markers handed out by an injected manager.
//!
//! A consumer takes a marker, does something else, and later asks the marker
//! whether the manager was updated in the meantime. Managers are plain values
//! passed to whoever needs them; there is no process-wide instance.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

#[derive(Debug, Default)]
struct UpdateMark {
    updated: AtomicBool,
}

/// Issues [`UpdateMarker`]s and flips them on [`update_markers`](Self::update_markers).
///
/// A marker is armed when created or reset; one update flips it and disarms
/// it, so further updates are no-ops for that marker until it is reset.
#[derive(Debug, Clone, Default)]
pub struct UpdateMarkerManager {
    armed: Arc<Mutex<Vec<Arc<UpdateMark>>>>,
}

impl UpdateMarkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_marker(&self) -> UpdateMarker {
        let mark = Arc::new(UpdateMark::default());
        self.armed.lock().push(mark.clone());
        UpdateMarker {
            mark,
            manager: self.clone(),
        }
    }

    pub fn update_markers(&self) {
        for mark in self.armed.lock().drain(..) {
            mark.updated.store(true, Ordering::Release);
        }
    }

    fn rearm(&self, mark: &Arc<UpdateMark>) {
        mark.updated.store(false, Ordering::Release);
        let mut armed = self.armed.lock();
        if !armed.iter().any(|m| Arc::ptr_eq(m, mark)) {
            armed.push(mark.clone());
        }
    }

    /// Markers currently waiting for an update
    pub fn armed_count(&self) -> usize {
        self.armed.lock().len()
    }
}

#[derive(Debug)]
pub struct UpdateMarker {
    mark: Arc<UpdateMark>,
    manager: UpdateMarkerManager,
}

impl UpdateMarker {
    pub fn updated(&self) -> bool {
        self.mark.updated.load(Ordering::Acquire)
    }

    /// Clear the flag and wait for the next update
    pub fn reset(&self) {
        self.manager.rearm(&self.mark);
    }
}

#[derive(Debug)]
struct DataSetMark<T> {
    dataset: Mutex<HashSet<T>>,
}

/// Issues [`DataSetMarker`]s that collect every item passed to
/// [`update_markers`](Self::update_markers) until they are reset.
///
/// The manager only holds weak references; dropped markers are pruned on the
/// next update.
#[derive(Debug)]
pub struct DataSetMarkerManager<T> {
    marks: Arc<Mutex<Vec<Weak<DataSetMark<T>>>>>,
}

impl<T> Clone for DataSetMarkerManager<T> {
    fn clone(&self) -> Self {
        Self {
            marks: self.marks.clone(),
        }
    }
}

impl<T> Default for DataSetMarkerManager<T> {
    fn default() -> Self {
        Self {
            marks: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> DataSetMarkerManager<T>
where
    T: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_marker(&self) -> DataSetMarker<T> {
        let mark = Arc::new(DataSetMark {
            dataset: Mutex::new(HashSet::new()),
        });
        self.marks.lock().push(Arc::downgrade(&mark));
        DataSetMarker { mark }
    }

    pub fn update_markers(&self, data: T) {
        let mut marks = self.marks.lock();
        marks.retain(|weak| match weak.upgrade() {
            Some(mark) => {
                mark.dataset.lock().insert(data.clone());
                true
            }
            None => false,
        });
    }
}

#[derive(Debug)]
pub struct DataSetMarker<T> {
    mark: Arc<DataSetMark<T>>,
}

impl<T> DataSetMarker<T>
where
    T: Eq + Hash + Clone,
{
    /// Everything recorded since creation or the last reset
    pub fn data(&self) -> HashSet<T> {
        self.mark.dataset.lock().clone()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.mark.dataset.lock().contains(item)
    }

    pub fn reset(&self) {
        self.mark.dataset.lock().clear();
    }
}
