use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{QueueError, QueueResult};

/// When the drain loop starts the next job.
///
/// Serialises as the signed millisecond count used by the env loader:
/// any negative value means [`Sequential`](Self::Sequential).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum DelayPolicy {
    /// Start the next job only after the previous one has settled
    Sequential,
    /// Start the next job after this delay, whether or not the previous one
    /// has finished
    Fixed(Duration),
}

impl DelayPolicy {
    pub fn from_millis(ms: i64) -> Self {
        if ms < 0 {
            Self::Sequential
        } else {
            Self::Fixed(Duration::from_millis(ms.unsigned_abs()))
        }
    }

    pub fn as_millis(&self) -> i64 {
        match self {
            Self::Sequential => -1,
            Self::Fixed(delay) => i64::try_from(delay.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, Self::Sequential)
    }
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::Sequential
    }
}

impl From<i64> for DelayPolicy {
    fn from(ms: i64) -> Self {
        Self::from_millis(ms)
    }
}

impl From<DelayPolicy> for i64 {
    fn from(policy: DelayPolicy) -> Self {
        policy.as_millis()
    }
}

/// Configuration for a [`JobQueue`](crate::JobQueue)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Name recorded on every tracing event the queue emits
    pub name: String,
    /// Start policy for the drain loop
    #[serde(rename = "delay_ms")]
    pub delay: DelayPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            delay: DelayPolicy::Sequential,
        }
    }
}

impl QueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strictly sequential queue
    pub fn sequential() -> Self {
        Self::default()
    }

    /// Queue that starts a job every `delay`, allowing overlap
    pub fn fixed_delay(delay: Duration) -> Self {
        Self::default().with_delay(DelayPolicy::Fixed(delay))
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_delay(mut self, delay: DelayPolicy) -> Self {
        self.delay = delay;
        self
    }

    /// Set the delay from a signed millisecond count (negative = sequential)
    pub fn with_delay_ms(self, ms: i64) -> Self {
        self.with_delay(DelayPolicy::from_millis(ms))
    }

    /// Overlay `{prefix}NAME` and `{prefix}DELAY_MS` from the process
    /// environment, e.g. `PICKER__QUEUE__DELAY_MS=-1`.
    pub fn from_env(prefix: &str) -> QueueResult<Self> {
        Self::default().merge_vars(prefix, std::env::vars())
    }

    /// Overlay matching keys from an arbitrary key/value source
    pub fn merge_vars<I, K, V>(mut self, prefix: &str, vars: I) -> QueueResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(field) = key.as_ref().strip_prefix(prefix) else {
                continue;
            };
            let value = value.as_ref();
            match field {
                "NAME" => self.name = value.to_string(),
                "DELAY_MS" => {
                    let ms = value
                        .trim()
                        .parse::<i64>()
                        .map_err(|_| QueueError::invalid_config(key.as_ref(), value))?;
                    self.delay = DelayPolicy::from_millis(ms);
                }
                _ => {}
            }
        }
        Ok(self)
    }
}
