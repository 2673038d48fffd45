//! Configuration types for insta-media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Backend connection settings
///
/// The backend exposes both the resolve endpoint (`POST /download`) and the
/// image proxy (`GET /proxy-image`) under one base URL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the backend (default: "http://127.0.0.1:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout applied to every resolve and proxy request (default: 15 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Download behavior configuration (file naming, pacing, collisions, retry)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory used by [`DirectorySaver`](crate::capabilities::DirectorySaver)
    /// (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// File name prefix; files are named `<prefix>-<id>.<ext>` (default: "instagram-image")
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Derive the extension from the proxy's content type instead of always using `.jpg`
    #[serde(default)]
    pub extension_from_content_type: bool,

    /// Delay inserted between successive items of a bulk download (default: 2 seconds)
    #[serde(default = "default_pacing_delay", with = "duration_serde")]
    pub pacing_delay: Duration,

    /// File collision handling
    #[serde(default)]
    pub file_collision: FileCollisionAction,

    /// Retry policy applied to a single item's image fetch
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            file_prefix: default_file_prefix(),
            extension_from_content_type: false,
            pacing_delay: default_pacing_delay(),
            file_collision: FileCollisionAction::default(),
            retry: RetryConfig::default(),
        }
    }
}

/// Notification display settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// How long a notification stays visible (default: 4 seconds)
    #[serde(default = "default_display_duration", with = "duration_serde")]
    pub display_duration: Duration,

    /// Capacity of the event broadcast channel (default: 256)
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            display_duration: default_display_duration(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Main configuration for a [`Session`](crate::Session)
///
/// Fields are grouped into sub-configs:
/// - [`backend`](BackendConfig) - endpoint and timeouts
/// - [`download`](DownloadConfig) - naming, pacing, collisions, retry
/// - [`notifications`](NotificationConfig) - display duration, event channel
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend connection settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Config {
    /// Create a config pointing at the given backend, everything else default
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            backend: BackendConfig {
                base_url: base_url.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Parse a JSON config, filling missing fields with defaults, and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_json_str(&content)
    }

    /// Check that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if:
    /// - the base URL is not an absolute http(s) URL
    /// - the request timeout is zero
    /// - the file prefix is empty or contains a path separator
    /// - the event channel capacity is zero
    /// - the retry multiplier is not a finite number of at least 1.0
    /// - the initial retry delay exceeds the maximum retry delay
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.backend.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", self.backend.base_url, e),
            key: Some("backend.base_url".to_string()),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::Config {
                message: format!("base URL must be http or https, got '{}'", base.scheme()),
                key: Some("backend.base_url".to_string()),
            });
        }

        if self.backend.request_timeout.is_zero() {
            return Err(Error::Config {
                message: "request timeout must be greater than zero".to_string(),
                key: Some("backend.request_timeout".to_string()),
            });
        }

        let prefix = &self.download.file_prefix;
        if prefix.is_empty() || prefix.contains(['/', '\\']) {
            return Err(Error::Config {
                message: format!("file prefix '{}' is not a plain file name", prefix),
                key: Some("download.file_prefix".to_string()),
            });
        }

        let retry = &self.download.retry;
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff multiplier must be a finite number >= 1.0, got {}",
                    retry.backoff_multiplier
                ),
                key: Some("download.retry.backoff_multiplier".to_string()),
            });
        }
        if retry.initial_delay > retry.max_delay {
            return Err(Error::Config {
                message: format!(
                    "initial retry delay {:?} exceeds max retry delay {:?}",
                    retry.initial_delay, retry.max_delay
                ),
                key: Some("download.retry.initial_delay".to_string()),
            });
        }

        if self.notifications.event_capacity == 0 {
            return Err(Error::Config {
                message: "event capacity must be greater than zero".to_string(),
                key: Some("notifications.event_capacity".to_string()),
            });
        }

        Ok(())
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename (default)
    #[default]
    Rename,
    /// Overwrite existing file
    Overwrite,
    /// Skip the file, keep existing
    Skip,
}

/// Retry configuration for image fetches
///
/// `max_attempts = 0` (the default) means a single attempt, after which the
/// orchestrator goes straight to the manual-save fallback.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 0)
    #[serde(default)]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_user_agent() -> String {
    format!("insta-media-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_file_prefix() -> String {
    "instagram-image".to_string()
}

fn default_pacing_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_display_duration() -> Duration {
    Duration::from_secs(4)
}

fn default_event_capacity() -> usize {
    256
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
