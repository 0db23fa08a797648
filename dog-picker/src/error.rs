use dog_jobs::QueueError;
use thiserror::Error;

/// Result type for picker operations
pub type PickerResult<T> = Result<T, PickerError>;

/// Errors raised while reading entries or delivering files
#[derive(Error, Debug)]
pub enum PickerError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The handler rejected a file
    #[error(transparent)]
    Handler(#[from] anyhow::Error),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidConfig { key: String, value: String },
}

impl PickerError {
    /// Create an invalid configuration error
    pub fn invalid_config(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
        }
    }
}
