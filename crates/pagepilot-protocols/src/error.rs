//! Browser driver errors.

use thiserror::Error;

/// Error-message fragments that mean the page, context or browser is gone.
///
/// Matched case-sensitively against the rendered error text.
pub const DISCONNECT_SIGNATURES: &[&str] = &[
    "Target page, context or browser has been closed",
    "Target closed",
    "has been closed",
    "Browser has been closed",
    "Browser disconnected",
    "Session closed",
    "WebSocket error",
    "No target with given id",
];

/// Returns true if the message carries a known disconnection signature.
pub fn is_disconnect_message(message: &str) -> bool {
    DISCONNECT_SIGNATURES.iter().any(|sig| message.contains(sig))
}

/// Errors raised by a browser driver.
#[derive(Debug, Error)]
pub enum PageError {
    /// The selector cannot be parsed by the query engine.
    #[error("Invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    /// The element handle no longer refers to a node in the document.
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// The page, context or browser was closed underneath us.
    #[error("Target closed: {0}")]
    TargetClosed(String),

    /// Could not reach the browser endpoint.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Script error: {0}")]
    Script(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PageError {
    /// Whether this error means the session must be rebuilt before retrying.
    pub fn is_disconnect(&self) -> bool {
        match self {
            PageError::TargetClosed(_) => true,
            PageError::InvalidSelector { .. } => false,
            other => is_disconnect_message(&other.to_string()),
        }
    }
}
