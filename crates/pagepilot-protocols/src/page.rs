//! Browser connection and page traits.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PageError;

/// Identifier of the browser's default browsing context.
pub const DEFAULT_CONTEXT: &str = "default";

/// Opaque reference to an element located on a page.
///
/// Handles are only meaningful for the page that produced them and may go
/// stale after navigation or reconnection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    /// Driver-specific node id.
    pub id: String,
    /// The CSS query that produced this handle.
    pub selector: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selector: selector.into(),
        }
    }
}

/// Element bounding box in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Rendering state of an element, as needed for the visibility check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementState {
    /// `None` when the element is not rendered (no layout box).
    pub bounding_box: Option<BoundingBox>,
    /// Computed `display` value.
    pub display: String,
    /// Computed `visibility` value.
    pub visibility: String,
    /// `disabled` attribute or `aria-disabled="true"`.
    pub disabled: bool,
}

impl ElementState {
    /// Box present, non-zero area, and not hidden by style.
    pub fn is_visible(&self) -> bool {
        let has_area = self
            .bounding_box
            .map(|b| b.width > 0.0 && b.height > 0.0)
            .unwrap_or(false);
        has_area && self.display != "none" && self.visibility != "hidden"
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }
}

/// A download emitted by the browser in response to a UI action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadEvent {
    /// URL the browser fetched (http(s), data: or blob:).
    pub url: String,
    pub suggested_filename: String,
    /// Set when the browser itself saved the file to disk.
    pub saved_path: Option<PathBuf>,
}

/// Operations the engine needs from a single page.
///
/// Every call may fail with a disconnection error (see
/// [`PageError::is_disconnect`]) if the page or browser goes away.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// All elements matching a CSS selector, in document order.
    ///
    /// Fails with [`PageError::InvalidSelector`] if the query engine rejects
    /// the selector.
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError>;

    /// Layout and style state for visibility/enabled checks.
    async fn element_state(&self, element: &ElementHandle) -> Result<ElementState, PageError>;

    /// Visible text (`innerText`) of an element.
    async fn inner_text(&self, element: &ElementHandle) -> Result<String, PageError>;

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, PageError>;

    /// Trusted mouse click at the element's center.
    async fn click(&self, element: &ElementHandle) -> Result<(), PageError>;

    /// `element.click()` from script; works for elements covered by overlays.
    async fn js_click(&self, element: &ElementHandle) -> Result<(), PageError>;

    /// Focus the element, clear it, and insert `text`.
    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), PageError>;

    /// Attach local files to an `<input type="file">`, as a file chooser would.
    async fn set_input_files(&self, element: &ElementHandle, files: &[PathBuf]) -> Result<(), PageError>;

    /// Insert text at the current focus.
    async fn type_text(&self, text: &str) -> Result<(), PageError>;

    /// Press and release a key, e.g. `"Enter"` or `"Escape"`.
    async fn press_key(&self, key: &str) -> Result<(), PageError>;

    /// Navigate and wait until the document is interactive.
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    async fn current_url(&self) -> Result<String, PageError>;

    /// Evaluate a script expression and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<Value, PageError>;

    /// `document.body.innerText`.
    async fn body_text(&self) -> Result<String, PageError> {
        let value = self
            .evaluate("document.body ? document.body.innerText : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Fetch a URL from inside the page (so `blob:` URLs resolve) and return
    /// the body as a `data:` URL.
    async fn fetch_as_data_url(&self, url: &str) -> Result<String, PageError>;

    /// PNG screenshot of the viewport written to `path`.
    async fn screenshot(&self, path: &Path) -> Result<(), PageError>;

    /// Click `element` and wait for the download it triggers.
    async fn click_and_wait_download(
        &self,
        element: &ElementHandle,
        timeout: Duration,
    ) -> Result<DownloadEvent, PageError>;

    /// URLs of network requests observed since the page was opened, oldest first.
    fn observed_requests(&self) -> Vec<String>;

    /// Whether the page is known to be closed.
    fn is_closed(&self) -> bool;

    async fn close(&self) -> Result<(), PageError>;
}

/// A live connection to a browser.
#[async_trait]
pub trait BrowserConnection: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Browsing contexts, default context first.
    async fn contexts(&self) -> Result<Vec<String>, PageError>;

    /// Create an isolated browsing context and return its id.
    async fn create_context(&self) -> Result<String, PageError>;

    async fn close_context(&self, context_id: &str) -> Result<(), PageError>;

    /// Open a blank page in the given context.
    async fn new_page(&self, context_id: &str) -> Result<Arc<dyn BrowserPage>, PageError>;
}

/// Factory for browser connections.
#[async_trait]
pub trait BrowserConnector: Send + Sync {
    /// Connect to the remote-debugging endpoint (e.g. `http://localhost:9222`).
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn BrowserConnection>, PageError>;
}
