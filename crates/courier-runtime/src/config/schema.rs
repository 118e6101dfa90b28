//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use courier_core::DefaultOptions;
use courier_framework::DEFAULT_MAX_CONCURRENT_HANDLERS;
use courier_transport::{DEFAULT_API_URL, HttpBotConfig};

/// Root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Bot token issued by the platform.
    #[serde(default)]
    pub token: String,

    /// Base URL of the bot API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Timeout for ordinary API calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bot-wide defaults for matching and outgoing messages.
    #[serde(default)]
    pub options: DefaultOptions,

    #[serde(default)]
    pub polling: PollingConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,

    #[serde(default)]
    pub dispatch: DispatchConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout_secs(),
            options: DefaultOptions::default(),
            polling: PollingConfig::default(),
            webhook: WebhookConfig::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl CourierConfig {
    /// Connection settings for the HTTP bot built from this configuration.
    pub fn http_bot_config(&self) -> HttpBotConfig {
        HttpBotConfig::new(self.token.clone())
            .with_api_url(self.api_url.clone())
            .with_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_options(self.options.clone())
    }
}

impl fmt::Debug for CourierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CourierConfig")
            .field("token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("options", &self.options)
            .field("polling", &self.polling)
            .field("webhook", &self.webhook)
            .field("dispatch", &self.dispatch)
            .field("logging", &self.logging)
            .finish()
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

/// Long-polling intake settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// How long the server may hold a poll open, in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub timeout_secs: u64,

    /// Pause after a failed poll, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_poll_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl PollingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn default_poll_timeout_secs() -> u64 {
    60
}

fn default_retry_delay_ms() -> u64 {
    1000
}

/// Webhook intake settings. Polling is used while `enabled` is false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Local address to listen on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Route prefix; the token is appended to form the secret route.
    #[serde(default = "default_webhook_path")]
    pub path: String,

    /// Externally reachable base URL registered with the platform.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_listen(),
            path: default_webhook_path(),
            public_url: None,
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_webhook_path() -> String {
    "/".to_string()
}

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Ceiling on handler tasks running at once.
    #[serde(default = "default_max_concurrent_handlers")]
    pub max_concurrent_handlers: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_handlers: default_max_concurrent_handlers(),
        }
    }
}

fn default_max_concurrent_handlers() -> usize {
    DEFAULT_MAX_CONCURRENT_HANDLERS
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Target file when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module level overrides, e.g. `courier_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            filters: HashMap::new(),
            thread_ids: false,
            file_location: false,
            span_events: SpanEventConfig::default(),
        }
    }
}
