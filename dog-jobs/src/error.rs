use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors the queue itself reports to a caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Wait for running jobs to finish before calling reset ({in_flight} in flight). `queue.done().await` first")]
    Busy { in_flight: usize },

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },
}

impl QueueError {
    /// Create an invalid configuration error
    pub fn invalid_config(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Check if this is the illegal-reset error
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }
}

/// Failure captured from a single job.
///
/// Never returned to the code that added the job; it only travels inside a
/// [`JobOutcome`](crate::JobOutcome).
#[derive(Error, Debug)]
pub enum JobError {
    /// The job resolved to an error
    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    /// The job panicked while being polled
    #[error("Job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Build a panic error from an unwind payload
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::Panicked(message)
    }

    /// Check if the job panicked rather than returning an error
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}
