//! Error types for the automation engine.

use std::time::Duration;

use pagepilot_config::ConfigError;
use pagepilot_protocols::PageError;
use thiserror::Error;

/// Errors raised while running a task.
#[derive(Debug, Error)]
pub enum AutomationError {
    /// A bounded wait expired.
    #[error("Timeout after {timeout_ms}ms waiting for {label}")]
    Timeout { label: String, timeout_ms: u64 },

    /// The page or browser went away.
    #[error("Session lost: {0}")]
    TransientSession(String),

    /// The target application reported a failure.
    #[error("Application error: {0}")]
    Application(String),

    /// No acquisition strategy produced a file.
    #[error("Acquisition failed: {0}")]
    Acquisition(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The session precondition (e.g. signed in) does not hold.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error(transparent)]
    Page(#[from] PageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AutomationError {
    pub fn timeout(label: impl Into<String>, timeout: Duration) -> Self {
        AutomationError::Timeout {
            label: label.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Whether the session must be rebuilt before anything else can succeed.
    pub fn is_disconnect(&self) -> bool {
        match self {
            AutomationError::TransientSession(_) => true,
            AutomationError::Page(e) => e.is_disconnect(),
            _ => false,
        }
    }

    /// Whether the orchestrator may run the task again.
    pub fn is_retryable(&self) -> bool {
        match self {
            AutomationError::Timeout { .. }
            | AutomationError::TransientSession(_)
            | AutomationError::Application(_) => true,
            other => other.is_disconnect(),
        }
    }

    /// Short machine-readable kind for the JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            AutomationError::Timeout { .. } => "timeout",
            AutomationError::TransientSession(_) => "session_lost",
            AutomationError::Application(_) => "application_error",
            AutomationError::Acquisition(_) => "acquisition_failed",
            AutomationError::Configuration(_) => "configuration_error",
            AutomationError::Precondition(_) => "precondition_failed",
            AutomationError::Transcode(_) => "transcode_failed",
            AutomationError::Page(e) if e.is_disconnect() => "session_lost",
            AutomationError::Page(_) => "page_error",
            AutomationError::Io(_) => "io_error",
        }
    }
}

impl From<ConfigError> for AutomationError {
    fn from(e: ConfigError) -> Self {
        AutomationError::Configuration(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, AutomationError>;
