//! Server configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use matoswim_core::{
    FetchError, FetchOptions, Fetcher, HttpFetcher, MonitorOptions, PollOptions, TrackerOptions,
};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Page source settings.
    pub source: SourceConfig,
    /// Poll scheduling.
    pub polling: PollingConfig,
    /// Alert timing and delivery.
    pub notifications: NotificationsConfig,
    /// Reading tracker settings.
    pub tracker: TrackerConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// This checks:
    /// - Server bind address is valid (host:port format)
    /// - Storage path is not empty
    /// - Source URL is http(s) and the timeout is not zero
    /// - The browser renderer is only selected when it is compiled in
    /// - Poll interval is within bounds (1 minute - 1 day)
    /// - Wake budget is not zero and the wake identifier is not empty
    /// - Tracker log capacity is at least 1
    ///
    /// # Example
    ///
    /// ```
    /// use matoswim_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.source.validate());
        errors.extend(self.polling.validate());
        errors.extend(self.tracker.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Monitor options derived from the polling, notification and tracker
    /// sections.
    pub fn monitor_options(&self) -> MonitorOptions {
        MonitorOptions {
            tracker: TrackerOptions {
                log_capacity: self.tracker.log_capacity,
                debounce: Duration::from_secs(self.notifications.debounce_secs),
                cooldown: Duration::from_secs(self.notifications.cooldown_secs),
            },
            poll: PollOptions {
                interval: Duration::from_secs(self.polling.interval_secs),
                wake_budget: Duration::from_secs(self.polling.wake_budget_secs),
                wake_identifier: self.polling.wake_identifier.clone(),
                broadcast_capacity: self.server.broadcast_buffer,
            },
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
    /// Capacity of the WebSocket reading channel.
    pub broadcast_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            broadcast_buffer: matoswim_core::poll::DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            let parts: Vec<&str> = self.bind.rsplitn(2, ':').collect();
            if parts.len() != 2 {
                errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                });
            } else {
                let port_str = parts[0];
                match port_str.parse::<u16>() {
                    Ok(0) => {
                        errors.push(ValidationError {
                            field: "server.bind".to_string(),
                            message: "port cannot be 0".to_string(),
                        });
                    }
                    Err(_) => {
                        errors.push(ValidationError {
                            field: "server.bind".to_string(),
                            message: format!(
                                "invalid port '{}': must be a number 1-65535",
                                port_str
                            ),
                        });
                    }
                    Ok(_) => {}
                }
            }
        }

        if self.broadcast_buffer == 0 {
            errors.push(ValidationError {
                field: "server.broadcast_buffer".to_string(),
                message: "broadcast buffer must be at least 1".to_string(),
            });
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: matoswim_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// How the page is retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Renderer {
    /// Load the page in headless Chromium so script-filled content is present
    /// (requires the `render` feature).
    Browser,
    /// Plain HTTP GET of the document.
    Http,
}

impl Default for Renderer {
    fn default() -> Self {
        if cfg!(feature = "render") {
            Renderer::Browser
        } else {
            Renderer::Http
        }
    }
}

/// Page source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Page URL.
    pub url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Custom User-Agent header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Retrieval method.
    pub renderer: Renderer,
    /// Chrome or Chromium executable for the browser renderer. Searched for
    /// when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser_path: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: matoswim_core::SOURCE_URL.to_string(),
            timeout_secs: matoswim_core::fetch::DEFAULT_FETCH_TIMEOUT.as_secs(),
            user_agent: None,
            renderer: Renderer::default(),
            browser_path: None,
        }
    }
}

impl SourceConfig {
    /// Validate source configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "source.url".to_string(),
                message: format!("invalid URL '{}': must start with http:// or https://", self.url),
            });
        }

        if self.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "source.timeout_secs".to_string(),
                message: "timeout cannot be 0".to_string(),
            });
        }

        if let Some(user_agent) = &self.user_agent
            && user_agent.trim().is_empty()
        {
            errors.push(ValidationError {
                field: "source.user_agent".to_string(),
                message: "user agent cannot be empty string (omit it instead)".to_string(),
            });
        }

        if self.renderer == Renderer::Browser && !cfg!(feature = "render") {
            errors.push(ValidationError {
                field: "source.renderer".to_string(),
                message: "browser renderer requires the `render` feature (use \"http\")"
                    .to_string(),
            });
        }

        if let Some(path) = &self.browser_path
            && path.as_os_str().is_empty()
        {
            errors.push(ValidationError {
                field: "source.browser_path".to_string(),
                message: "browser path cannot be empty (omit it instead)".to_string(),
            });
        }

        errors
    }

    /// Fetcher options for this source.
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            url: self.url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }

    /// Build the fetcher selected by `renderer`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the HTTP client cannot be built, or
    /// [`FetchError::Unavailable`] if the browser renderer is selected but
    /// not compiled in.
    pub fn build_fetcher(&self) -> Result<Arc<dyn Fetcher>, FetchError> {
        let options = self.fetch_options();
        match self.renderer {
            Renderer::Http => Ok(Arc::new(HttpFetcher::new(&options)?)),
            #[cfg(feature = "render")]
            Renderer::Browser => {
                let mut fetcher = matoswim_core::RenderingFetcher::new(&options);
                if let Some(path) = &self.browser_path {
                    fetcher = fetcher.with_browser_path(path);
                }
                Ok(Arc::new(fetcher))
            }
            #[cfg(not(feature = "render"))]
            Renderer::Browser => Err(FetchError::Unavailable(
                "browser renderer requires the `render` feature".to_string(),
            )),
        }
    }
}

/// Minimum poll interval in seconds (1 minute).
pub const MIN_POLL_INTERVAL: u64 = 60;
/// Maximum poll interval in seconds (1 day).
pub const MAX_POLL_INTERVAL: u64 = 86_400;

/// Poll scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Seconds between foreground polls.
    pub interval_secs: u64,
    /// Seconds a background wake may spend on its cycle.
    pub wake_budget_secs: u64,
    /// Background wake identifier.
    pub wake_identifier: String,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: matoswim_core::poll::DEFAULT_POLL_INTERVAL.as_secs(),
            wake_budget_secs: matoswim_core::poll::DEFAULT_WAKE_BUDGET.as_secs(),
            wake_identifier: matoswim_core::DEFAULT_WAKE_IDENTIFIER.to_string(),
        }
    }
}

impl PollingConfig {
    /// Validate polling configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs < MIN_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "polling.interval_secs".to_string(),
                message: format!(
                    "poll interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_POLL_INTERVAL
                ),
            });
        } else if self.interval_secs > MAX_POLL_INTERVAL {
            errors.push(ValidationError {
                field: "polling.interval_secs".to_string(),
                message: format!(
                    "poll interval {} is too long (maximum {} seconds / 1 day)",
                    self.interval_secs, MAX_POLL_INTERVAL
                ),
            });
        }

        if self.wake_budget_secs == 0 {
            errors.push(ValidationError {
                field: "polling.wake_budget_secs".to_string(),
                message: "wake budget cannot be 0".to_string(),
            });
        }

        if self.wake_identifier.trim().is_empty() {
            errors.push(ValidationError {
                field: "polling.wake_identifier".to_string(),
                message: "wake identifier cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Alert configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Seconds between a qualifying reading and its alert.
    pub debounce_secs: u64,
    /// Minimum seconds between delivered alerts.
    pub cooldown_secs: u64,
    /// Show desktop notifications (requires the `notifications` feature).
    pub desktop: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            debounce_secs: matoswim_core::notify::DEFAULT_DEBOUNCE.as_secs(),
            cooldown_secs: matoswim_core::notify::DEFAULT_COOLDOWN.as_secs(),
            desktop: cfg!(feature = "notifications"),
        }
    }
}

/// Reading tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Maximum number of accepted readings kept in memory.
    pub log_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            log_capacity: matoswim_core::tracker::DEFAULT_LOG_CAPACITY,
        }
    }
}

impl TrackerConfig {
    /// Validate tracker configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.log_capacity == 0 {
            errors.push(ValidationError {
                field: "tracker.log_capacity".to_string(),
                message: "log capacity must be at least 1".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `polling.interval_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("matoswim")
        .join("server.toml")
}
