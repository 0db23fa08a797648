use std::time::Duration;

use dog_jobs::QueueConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{PickerError, PickerResult};

/// Options for a [`FilePicker`](crate::FilePicker)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PickerOptions {
    /// Comma separated filter such as `.png,.jpg`; `None` accepts everything
    pub accept: Option<String>,

    /// Descend into dropped or selected directories
    pub directory: bool,

    /// Deliver more than one file per session
    pub multiple: bool,

    /// How long a session waits after it starts before watching the queue
    /// for completion
    #[serde(rename = "settle_ms", with = "millis")]
    pub settle_delay: Duration,

    /// Queue settings; the picker always drains it sequentially
    pub queue: QueueConfig,
}

impl Default for PickerOptions {
    fn default() -> Self {
        Self {
            accept: None,
            directory: true,
            multiple: true,
            settle_delay: Duration::from_millis(500),
            queue: QueueConfig::sequential().with_name("picker"),
        }
    }
}

impl PickerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accept<S: Into<String>>(mut self, accept: S) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn with_directory(mut self, directory: bool) -> Self {
        self.directory = directory;
        self
    }

    pub fn with_multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = queue;
        self
    }

    /// Check a file name against [`accept`](Self::accept).
    ///
    /// Extension tokens (`.png`) match case-insensitively; `*` and `*/*`
    /// accept everything. Other tokens, such as MIME types, never match.
    pub fn accepts(&self, name: &str) -> bool {
        let Some(accept) = self.accept.as_deref() else {
            return true;
        };
        let tokens: Vec<&str> = accept
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.is_empty() {
            return true;
        }

        let name = name.to_ascii_lowercase();
        tokens.iter().any(|token| match *token {
            "*" | "*/*" => true,
            ext if ext.starts_with('.') => name.ends_with(&ext.to_ascii_lowercase()),
            other => {
                debug!(token = other, "Ignoring non-extension accept token");
                false
            }
        })
    }

    /// Load options from `{prefix}ACCEPT`, `{prefix}DIRECTORY`,
    /// `{prefix}MULTIPLE`, `{prefix}SETTLE_MS` and `{prefix}QUEUE__*`.
    ///
    /// ```no_run
    /// // FOLDER_SCAN__ACCEPT=.jpg,.png FOLDER_SCAN__MULTIPLE=false
    /// let options = dog_picker::PickerOptions::from_env("FOLDER_SCAN__")?;
    /// # Ok::<(), dog_picker::PickerError>(())
    /// ```
    pub fn from_env(prefix: &str) -> PickerResult<Self> {
        Self::default().merge_vars(prefix, std::env::vars())
    }

    pub fn merge_vars<I, K, V>(mut self, prefix: &str, vars: I) -> PickerResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let vars: Vec<(String, String)> = vars
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();

        for (key, value) in &vars {
            let Some(field) = key.strip_prefix(prefix) else {
                continue;
            };
            match field {
                "ACCEPT" => self.accept = Some(value.clone()).filter(|v| !v.trim().is_empty()),
                "DIRECTORY" => self.directory = parse_flag(key, value)?,
                "MULTIPLE" => self.multiple = parse_flag(key, value)?,
                "SETTLE_MS" => {
                    let ms = value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| PickerError::invalid_config(key, value))?;
                    self.settle_delay = Duration::from_millis(ms);
                }
                _ => {}
            }
        }

        self.queue = self.queue.merge_vars(&format!("{prefix}QUEUE__"), vars)?;
        Ok(self)
    }
}

fn parse_flag(key: &str, value: &str) -> PickerResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PickerError::invalid_config(key, value)),
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delay: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
