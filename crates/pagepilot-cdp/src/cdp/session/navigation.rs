//! Page navigation and document readiness.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::cdp::error::CdpError;

use super::core::PageSession;

/// Upper bound on the wait for a navigated document to become usable.
const READY_TIMEOUT: Duration = Duration::from_secs(60);
const READY_POLL: Duration = Duration::from_millis(100);

impl PageSession {
    /// Load `url` in this page and return once its document is interactive.
    pub async fn navigate(&self, url: &str) -> Result<(), CdpError> {
        let reply = self.call("Page.navigate", Some(json!({ "url": url }))).await?;
        Self::navigation_error(&reply, url)?;
        self.until_ready(READY_TIMEOUT).await?;
        debug!(url, "Navigation finished");
        Ok(())
    }

    /// `Page.navigate` reports network failures in `errorText`, not as a protocol error.
    pub(super) fn navigation_error(reply: &Value, url: &str) -> Result<(), CdpError> {
        match reply.get("errorText").and_then(Value::as_str) {
            Some(text) if !text.is_empty() => {
                Err(CdpError::NavigationFailed(format!("{} ({})", url, text)))
            }
            _ => Ok(()),
        }
    }

    /// `document.readyState` is past `loading`.
    pub(super) fn is_ready_state(state: &Value) -> bool {
        matches!(state.as_str(), Some("interactive" | "complete"))
    }

    async fn until_ready(&self, limit: Duration) -> Result<(), CdpError> {
        let deadline = Instant::now() + limit;
        loop {
            // Evaluation fails while the old document is being replaced.
            match self.evaluate("document.readyState").await {
                Ok(state) if Self::is_ready_state(&state) => return Ok(()),
                Err(_) if self.is_closed() => return Err(CdpError::SessionClosed),
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(CdpError::Timeout(format!(
                    "document not ready after {}s",
                    limit.as_secs()
                )));
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    /// `location.href` of the top frame.
    pub async fn current_url(&self) -> Result<String, CdpError> {
        let href = self.evaluate("location.href").await?;
        Ok(href.as_str().unwrap_or_default().to_string())
    }
}
