use std::fmt;
use std::sync::Arc;

/// Handle that removes one registration from a [`Store`](crate::Store) or
/// [`JobQueue`](crate::JobQueue).
///
/// Dropping the handle does not unsubscribe. Calling
/// [`unsubscribe`](Self::unsubscribe) more than once is a no-op.
#[derive(Clone)]
pub struct Unsubscribe {
    remove: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Unsubscribe {
    pub(crate) fn new<F>(remove: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            remove: Some(Arc::new(remove)),
        }
    }

    /// Handle for a subscription that was never registered
    pub fn noop() -> Self {
        Self { remove: None }
    }

    pub fn unsubscribe(&self) {
        if let Some(remove) = &self.remove {
            remove();
        }
    }

    /// True for the handle returned when a replay cancelled the subscription
    pub fn is_noop(&self) -> bool {
        self.remove.is_none()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("noop", &self.is_noop())
            .finish()
    }
}
