//! CDP error types.

use pagepilot_protocols::PageError;
use thiserror::Error;

/// CDP `Server error` code used for most domain-level failures.
pub(crate) const SERVER_ERROR: i64 = -32000;

/// CDP client errors.
#[derive(Debug, Error)]
pub enum CdpError {
    /// Failed to connect to Chrome.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Chrome not found or not running with remote debugging.
    #[error("Chrome not available at {0}. Start Chrome with: chrome --remote-debugging-port=9222")]
    ChromeNotAvailable(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// CDP protocol error.
    #[error("CDP error: {message} (code: {code})")]
    Protocol { code: i64, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error (for endpoint discovery).
    #[error("HTTP error: {0}")]
    Http(String),

    /// Navigation failed.
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// JavaScript execution error.
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    /// Timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Session closed.
    #[error("Session closed")]
    SessionClosed,

    /// Invalid response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Download was canceled or interrupted by the browser.
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdpError {
    /// A `DOM.querySelector*` rejection caused by selector syntax.
    pub(crate) fn is_selector_syntax(&self) -> bool {
        matches!(
            self,
            CdpError::Protocol { code: SERVER_ERROR, message }
                if message.contains("DOM Error while querying")
                    || message.contains("not a valid selector")
        )
    }

    /// The node behind a handle disappeared from the document.
    pub(crate) fn is_stale_node(&self) -> bool {
        matches!(
            self,
            CdpError::Protocol { code: SERVER_ERROR, message }
                if message.contains("No node with given id")
                    || message.contains("Could not find node")
                    || message.contains("Node with given id does not belong")
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CdpError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        CdpError::WebSocket(e.to_string())
    }
}

impl From<reqwest::Error> for CdpError {
    fn from(e: reqwest::Error) -> Self {
        CdpError::Http(e.to_string())
    }
}

impl From<url::ParseError> for CdpError {
    fn from(e: url::ParseError) -> Self {
        CdpError::ConnectionFailed(format!("Invalid URL: {}", e))
    }
}

impl From<CdpError> for PageError {
    fn from(e: CdpError) -> Self {
        match e {
            CdpError::SessionClosed => PageError::TargetClosed("Session closed".to_string()),
            CdpError::WebSocket(msg) => PageError::TargetClosed(format!("WebSocket error: {}", msg)),
            CdpError::ConnectionFailed(msg) | CdpError::ChromeNotAvailable(msg) => {
                PageError::ConnectionFailed(msg)
            }
            CdpError::NavigationFailed(msg) => PageError::NavigationFailed(msg),
            CdpError::JavaScript(msg) => PageError::Script(msg),
            CdpError::Timeout(msg) => PageError::Timeout(msg),
            CdpError::Io(err) => PageError::Io(err),
            ref stale if stale.is_stale_node() => PageError::StaleElement(stale.to_string()),
            other => PageError::Protocol(other.to_string()),
        }
    }
}
