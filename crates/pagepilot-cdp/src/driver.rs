//! `pagepilot-protocols` implementation on top of the CDP client.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use pagepilot_protocols::{
    BoundingBox, BrowserConnection, BrowserConnector, BrowserPage, DownloadEvent, ElementHandle,
    ElementState, PageError, DEFAULT_CONTEXT,
};

use crate::cdp::{CdpClient, CdpError, PageSession, ScreenshotFormat};

/// Connects to Chrome over its remote-debugging endpoint.
#[derive(Debug, Clone)]
pub struct CdpConnector {
    download_dir: PathBuf,
}

impl CdpConnector {
    /// `download_dir` receives files for click-triggered downloads.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
        }
    }
}

impl Default for CdpConnector {
    fn default() -> Self {
        Self::new(std::env::temp_dir().join("pagepilot-downloads"))
    }
}

#[async_trait]
impl BrowserConnector for CdpConnector {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn BrowserConnection>, PageError> {
        let client = CdpClient::connect(endpoint).await?;
        info!("Connected to browser at {}", client.browser_ws_url());
        Ok(Arc::new(CdpConnection {
            client: Arc::new(client),
            download_dir: self.download_dir.clone(),
        }))
    }
}

/// A live browser connection.
pub struct CdpConnection {
    client: Arc<CdpClient>,
    download_dir: PathBuf,
}

#[async_trait]
impl BrowserConnection for CdpConnection {
    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    async fn contexts(&self) -> Result<Vec<String>, PageError> {
        let mut contexts = vec![DEFAULT_CONTEXT.to_string()];
        contexts.extend(self.client.browser_contexts().await?);
        Ok(contexts)
    }

    async fn create_context(&self) -> Result<String, PageError> {
        Ok(self.client.create_browser_context().await?)
    }

    async fn close_context(&self, context_id: &str) -> Result<(), PageError> {
        if context_id == DEFAULT_CONTEXT {
            return Ok(());
        }
        Ok(self.client.dispose_browser_context(context_id).await?)
    }

    async fn new_page(&self, context_id: &str) -> Result<Arc<dyn BrowserPage>, PageError> {
        let context = (context_id != DEFAULT_CONTEXT).then_some(context_id);
        let session = self.client.new_page(context).await?;
        debug!("Opened page {} in context {}", session.target_id(), context_id);
        Ok(Arc::new(CdpPage {
            session,
            client: self.client.clone(),
            download_dir: self.download_dir.clone(),
        }))
    }
}

/// A page driven through a flattened CDP session.
pub struct CdpPage {
    session: PageSession,
    client: Arc<CdpClient>,
    download_dir: PathBuf,
}

impl CdpPage {
    fn node_id(element: &ElementHandle) -> Result<i64, PageError> {
        element
            .id
            .parse()
            .map_err(|_| PageError::StaleElement(format!("Bad element handle: {}", element.id)))
    }

    pub fn session(&self) -> &PageSession {
        &self.session
    }
}

#[async_trait]
impl BrowserPage for CdpPage {
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>, PageError> {
        let ids = self
            .session
            .query_selector_all(selector)
            .await
            .map_err(|e| match e {
                e if e.is_selector_syntax() => PageError::InvalidSelector {
                    selector: selector.to_string(),
                    message: e.to_string(),
                },
                e => e.into(),
            })?;

        Ok(ids
            .into_iter()
            .map(|id| ElementHandle::new(id.to_string(), selector))
            .collect())
    }

    async fn element_state(&self, element: &ElementHandle) -> Result<ElementState, PageError> {
        let id = Self::node_id(element)?;
        let bounding_box = self
            .session
            .get_box_model(id)
            .await?
            .and_then(|model| PageSession::quad_bounds(&model.border))
            .map(|(x, y, width, height)| BoundingBox {
                x,
                y,
                width,
                height,
            });
        let style = self.session.node_style(id).await?;

        Ok(ElementState {
            bounding_box,
            display: style.display,
            visibility: style.visibility,
            disabled: style.disabled,
        })
    }

    async fn inner_text(&self, element: &ElementHandle) -> Result<String, PageError> {
        Ok(self.session.inner_text(Self::node_id(element)?).await?)
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, PageError> {
        Ok(self.session.attribute(Self::node_id(element)?, name).await?)
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), PageError> {
        Ok(self.session.click_node(Self::node_id(element)?).await?)
    }

    async fn js_click(&self, element: &ElementHandle) -> Result<(), PageError> {
        Ok(self.session.js_click_node(Self::node_id(element)?).await?)
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), PageError> {
        Ok(self.session.fill(Self::node_id(element)?, text).await?)
    }

    async fn set_input_files(&self, element: &ElementHandle, files: &[PathBuf]) -> Result<(), PageError> {
        let mut absolute = Vec::with_capacity(files.len());
        for file in files {
            absolute.push(std::path::absolute(file)?.to_string_lossy().into_owned());
        }
        self.session
            .set_file_input_files(Self::node_id(element)?, &absolute)
            .await?;
        debug!(files = absolute.len(), "File input set");
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), PageError> {
        Ok(self.session.type_text(text).await?)
    }

    async fn press_key(&self, key: &str) -> Result<(), PageError> {
        Ok(self.session.press_key(key).await?)
    }

    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.session.navigate(url).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.session.current_url().await?)
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, PageError> {
        Ok(self.session.evaluate(expression).await?)
    }

    async fn fetch_as_data_url(&self, url: &str) -> Result<String, PageError> {
        Ok(self.session.fetch_as_data_url(url).await?)
    }

    async fn screenshot(&self, path: &Path) -> Result<(), PageError> {
        let bytes = self.session.screenshot(ScreenshotFormat::Png).await?;
        tokio::fs::write(path, bytes).await?;
        debug!("Screenshot saved to {}", path.display());
        Ok(())
    }

    async fn click_and_wait_download(
        &self,
        element: &ElementHandle,
        timeout: Duration,
    ) -> Result<DownloadEvent, PageError> {
        let id = Self::node_id(element)?;
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let done = self
            .session
            .click_and_wait_download(id, &self.download_dir, timeout)
            .await?;

        Ok(DownloadEvent {
            url: done.url,
            suggested_filename: done.suggested_filename,
            saved_path: Some(done.path),
        })
    }

    fn observed_requests(&self) -> Vec<String> {
        self.session.observed_requests()
    }

    fn is_closed(&self) -> bool {
        self.session.is_closed()
    }

    async fn close(&self) -> Result<(), PageError> {
        if self.session.is_closed() {
            return Ok(());
        }
        let result = self.client.close_page(self.session.target_id()).await;
        self.session.mark_closed();
        match result {
            Ok(()) | Err(CdpError::SessionClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
