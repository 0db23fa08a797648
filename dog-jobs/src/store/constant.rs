use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tokio::sync::oneshot;

use super::{Callback, Registry, Subscriber};
use crate::subscription::Unsubscribe;

struct ConstantState<T> {
    value: Option<T>,
    registry: Registry<T>,
}

struct ConstantInner<T> {
    state: Mutex<ConstantState<T>>,
    dispatch: ReentrantMutex<()>,
}

/// Write-once observable.
///
/// Subscribers registered before the value exists are called when it is first
/// set; later subscribers get it replayed. Every `set` after the first is
/// ignored.
pub struct ConstantStore<T> {
    inner: Arc<ConstantInner<T>>,
}

impl<T> Clone for ConstantStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for ConstantStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConstantStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ConstantInner {
                state: Mutex::new(ConstantState {
                    value: None,
                    registry: Registry::new(),
                }),
                dispatch: ReentrantMutex::new(()),
            }),
        }
    }

    /// Create a store that already holds its value
    pub fn with_value(value: T) -> Self {
        let store = Self::new();
        store.set(value);
        store
    }

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

            let weak: Weak<ConstantInner<T>> = Arc::downgrade(&self.inner);
            let unsubscribe = Unsubscribe::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.state.lock().registry.remove(id);
                }
            });
            state.registry.subscribers.push(Subscriber {
                id,
                callback: callback.clone(),
                unsubscribe: unsubscribe.clone(),
            });
            (state.value.clone(), unsubscribe)
        };

        if let Some(value) = value {
            callback(&value, &unsubscribe);
        }
        unsubscribe
    }

    /// Resolve with the value once it has been set.
    ///
    /// The returned future does not keep the store alive; it yields `None` if
    /// every handle is dropped before a value arrives.
    pub fn get(&self) -> impl Future<Output = Option<T>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        self.subscribe(move |value, unsubscribe| {
            unsubscribe.unsubscribe();
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(value.clone());
            }
        });
        async move { rx.await.ok() }
    }

    /// Set the value if it has never been set. Returns whether it was stored.
    pub fn set(&self, value: T) -> bool {
        let _dispatch = self.inner.dispatch.lock();

        let subscribers = {
            let mut state = self.inner.state.lock();
            if state.value.is_some() {
                return false;
            }
            state.value = Some(value.clone());
            state.registry.snapshot()
        };

        for (id, callback, unsubscribe) in subscribers {
            if !self.inner.state.lock().registry.contains(id) {
                continue;
            }
            callback(&value, &unsubscribe);
        }
        true
    }

    pub fn value(&self) -> Option<T> {
        self.inner.state.lock().value.clone()
    }

    pub fn is_set(&self) -> bool {
        self.inner.state.lock().value.is_some()
    }
}

impl<T: fmt::Debug> fmt::Debug for ConstantStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantStore")
            .field("value", &self.inner.state.lock().value)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn early_subscriber_is_called_on_first_set_only() {
        let store = ConstantStore::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let sink = calls.clone();
        store.subscribe(move |v: &u32, _| sink.lock().push(*v));
        assert!(calls.lock().is_empty());

        assert!(store.set(1));
        assert!(!store.set(2));
        assert_eq!(*calls.lock(), vec![1]);
        assert_eq!(store.value(), Some(1));
    }

    #[test]
    fn late_subscriber_gets_replay() {
        let store = ConstantStore::with_value("fixed");
        let calls = Arc::new(AtomicUsize::new(0));

        let c = calls.clone();
        store.subscribe(move |v, _| {
            assert_eq!(*v, "fixed");
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn get_waits_for_first_set() {
        let store = ConstantStore::new();
        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            writer.set(9_u64);
        });

        assert_eq!(store.get().await, Some(9));
        assert!(store.is_set());
    }

    #[tokio::test]
    async fn get_returns_none_when_store_is_dropped_unset() {
        let store: ConstantStore<u8> = ConstantStore::new();
        let pending = store.get();
        drop(store);

        assert_eq!(pending.await, None);
    }
}
