//! Observable single-slot stores.
//!
//! Notification follows the same three phases as the DogRS event hub:
//! snapshot the subscriber list under the lock, release it, then call each
//! callback. A callback may subscribe, unsubscribe or write to the store it is
//! being called from; removals made mid-broadcast are honoured for callbacks
//! that have not been reached yet.
//!
//! Writers are serialised through a reentrant dispatch lock so broadcasts from
//! different threads never interleave, while a callback that writes back into
//! the same store on the same thread still works.

mod constant;

pub use constant::ConstantStore;

use std::fmt;
use std::future::{self, Future};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use crate::subscription::Unsubscribe;

type Callback<T> = Arc<dyn Fn(&T, &Unsubscribe) + Send + Sync>;

struct Subscriber<T> {
    id: u64,
    callback: Callback<T>,
    unsubscribe: Unsubscribe,
}

pub(crate) struct Registry<T> {
    next_id: u64,
    subscribers: Vec<Subscriber<T>>,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
        }
    }

    fn contains(&self, id: u64) -> bool {
        self.subscribers.iter().any(|s| s.id == id)
    }

    fn remove(&mut self, id: u64) {
        self.subscribers.retain(|s| s.id != id);
    }

    fn snapshot(&self) -> Vec<(u64, Callback<T>, Unsubscribe)> {
        self.subscribers
            .iter()
            .map(|s| (s.id, s.callback.clone(), s.unsubscribe.clone()))
            .collect()
    }
}

struct StoreState<T> {
    value: T,
    registry: Registry<T>,
}

struct StoreInner<T> {
    state: Mutex<StoreState<T>>,
    dispatch: ReentrantMutex<()>,
    distinct: Option<fn(&T, &T) -> bool>,
}

/// Observable value that replays its current value to every new subscriber.
///
/// Cloning a `Store` yields another handle to the same slot.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Store<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a store that notifies on every `set`
    pub fn new(initial: T) -> Self {
        Self::build(initial, None)
    }

    fn build(initial: T, distinct: Option<fn(&T, &T) -> bool>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState {
                    value: initial,
                    registry: Registry::new(),
                }),
                dispatch: ReentrantMutex::new(()),
                distinct,
            }),
        }
    }

    /// Register `callback` and call it right away with the current value.
    ///
    /// The callback receives an [`Unsubscribe`] bound to its own registration
    /// so it can remove itself from inside a notification.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T, &Unsubscribe) + Send + Sync + 'static,
    {
        let _dispatch = self.inner.dispatch.lock();
        let callback: Callback<T> = Arc::new(callback);

        let (value, unsubscribe) = {
            let mut state = self.inner.state.lock();
            let id = state.registry.next_id;
            state.registry.next_id += 1;

            let unsubscribe = self.unsubscribe_handle(id);
            state.registry.subscribers.push(Subscriber {
                id,
                callback: callback.clone(),
                unsubscribe: unsubscribe.clone(),
            });
            (state.value.clone(), unsubscribe)
        };

        callback(&value, &unsubscribe);
        unsubscribe
    }

    fn unsubscribe_handle(&self, id: u64) -> Unsubscribe {
        let weak: Weak<StoreInner<T>> = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.state.lock().registry.remove(id);
            }
        })
    }

    /// Resolve with the next delivered value, which is the current one since
    /// subscribing replays it.
    pub fn get(&self) -> impl Future<Output = T> + Send + 'static {
        let slot = Arc::new(Mutex::new(None));
        let sink = slot.clone();
        self.subscribe(move |value, unsubscribe| {
            unsubscribe.unsubscribe();
            sink.lock().get_or_insert_with(|| value.clone());
        });

        let value = slot.lock().take().unwrap_or_else(|| self.value());
        future::ready(value)
    }

    /// Snapshot of the current value without subscribing
    pub fn value(&self) -> T {
        self.inner.state.lock().value.clone()
    }

    /// Replace the value and notify every subscriber.
    ///
    /// Distinct stores skip the write and the broadcast when the new value
    /// equals the current one.
    pub fn set(&self, value: T) {
        let _dispatch = self.inner.dispatch.lock();

        let subscribers = {
            let mut state = self.inner.state.lock();
            if let Some(eq) = self.inner.distinct {
                if eq(&state.value, &value) {
                    return;
                }
            }
            state.value = value.clone();
            state.registry.snapshot()
        };

        for (id, callback, unsubscribe) in subscribers {
            if !self.inner.state.lock().registry.contains(id) {
                continue;
            }
            callback(&value, &unsubscribe);
        }
    }

    /// `set(f(current))`, computed and broadcast without another writer
    /// slipping in between.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let _dispatch = self.inner.dispatch.lock();
        let current = self.value();
        self.set(f(&current));
    }

    /// Number of live registrations
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().registry.subscribers.len()
    }
}

impl<T> Store<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a store that only notifies when the value actually changes
    pub fn distinct(initial: T) -> Self {
        Self::build(initial, Some(<T as PartialEq>::eq))
    }
}

impl<T: fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Store")
            .field("value", &state.value)
            .field("subscribers", &state.registry.subscribers.len())
            .field("distinct", &self.inner.distinct.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscribe_replays_current_value_before_returning() {
        let store = Store::new(7);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        store.subscribe(move |v, _| sink.lock().push(*v));

        assert_eq!(*seen.lock(), vec![7]);
    }

    #[test]
    fn set_notifies_all_subscribers() {
        let store = Store::new(0);
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));

        let a2 = a.clone();
        store.subscribe(move |v, _| a2.store(*v, Ordering::SeqCst));
        let b2 = b.clone();
        store.subscribe(move |v, _| b2.store(*v, Ordering::SeqCst));

        store.set(5);
        assert_eq!(a.load(Ordering::SeqCst), 5);
        assert_eq!(b.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn update_derives_from_previous_value() {
        let store = Store::new(1);
        store.update(|v| v + 1);
        store.update(|v| v * 10);
        assert_eq!(store.value(), 20);
    }

    #[test]
    fn distinct_store_skips_equal_writes() {
        let store = Store::distinct("a".to_string());
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        store.subscribe(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        store.set("a".to_string());
        store.set("b".to_string());
        store.set("b".to_string());

        // replay + one real change
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn plain_store_notifies_equal_writes() {
        let store = Store::new(3);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        store.subscribe(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        store.set(3);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribe_from_inside_callback() {
        let store = Store::new(0);
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        store.subscribe(move |v, unsubscribe| {
            c.fetch_add(1, Ordering::SeqCst);
            if *v == 1 {
                unsubscribe.unsubscribe();
            }
        });

        store.set(1);
        store.set(2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn removal_mid_broadcast_skips_later_subscriber() {
        let store = Store::new(0);
        let victim: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));
        let victim_calls = Arc::new(AtomicUsize::new(0));

        let v = victim.clone();
        store.subscribe(move |value, _| {
            if *value == 1 {
                if let Some(handle) = v.lock().as_ref() {
                    handle.unsubscribe();
                }
            }
        });

        let vc = victim_calls.clone();
        let handle = store.subscribe(move |_, _| {
            vc.fetch_add(1, Ordering::SeqCst);
        });
        *victim.lock() = Some(handle);

        store.set(1);
        // only the replay reached it
        assert_eq!(victim_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_write_back_into_store() {
        let store = Store::new(0);
        let writer = store.clone();
        store.subscribe(move |v, _| {
            if *v == 1 {
                writer.set(2);
            }
        });

        store.set(1);
        assert_eq!(store.value(), 2);
    }

    #[tokio::test]
    async fn get_resolves_with_current_value_and_unsubscribes() {
        let store = Store::new("ready");
        assert_eq!(store.get().await, "ready");
        assert_eq!(store.subscriber_count(), 0);
    }
}
