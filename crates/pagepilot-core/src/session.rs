//! Browser session ownership and reconnection.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pagepilot_config::{LoginCheck, TaskConfig};
use pagepilot_protocols::{BrowserConnection, BrowserConnector, BrowserPage};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{AutomationError, Result};
use crate::selector::SelectorResolver;

/// Pause between a disconnect and the next reconnect attempt.
const RECONNECT_PAUSE: Duration = Duration::from_millis(300);

/// Screenshots must not hold up failure reporting.
const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// How the session connects and what it checks after connecting.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub endpoint: String,
    /// Opened on every fresh page.
    pub goto_url: Option<String>,
    pub login: LoginCheck,
    /// Pause after navigation before the page is used.
    pub settle: Duration,
    pub element_timeout: Duration,
    pub poll_interval: Duration,
}

impl SessionOptions {
    pub fn from_config(config: &TaskConfig) -> Self {
        Self {
            endpoint: config.cdp_url.clone(),
            goto_url: config.resolved_goto_url(),
            login: config.resolved_login(),
            settle: Duration::from_millis(config.settle_ms),
            element_timeout: Duration::from_millis(config.element_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Owns the browser connection and the one active page.
///
/// Page handles are replaced on reconnect, so callers fetch [`page`](Self::page)
/// again after every [`with_retry`](Self::with_retry) boundary instead of
/// holding on to an old one.
pub struct SessionManager {
    connector: Arc<dyn BrowserConnector>,
    options: SessionOptions,
    state: SessionState,
    connection: Option<Arc<dyn BrowserConnection>>,
    page: Option<Arc<dyn BrowserPage>>,
    /// Context we created ourselves and may therefore close.
    owned_context: Option<String>,
    connects: u32,
    reconnects: u32,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn BrowserConnector>, options: SessionOptions) -> Self {
        Self {
            connector,
            options,
            state: SessionState::Disconnected,
            connection: None,
            page: None,
            owned_context: None,
            connects: 0,
            reconnects: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Number of times a lost session was rebuilt.
    pub fn reconnect_count(&self) -> u32 {
        self.reconnects
    }

    /// The active page.
    pub fn page(&self) -> Result<Arc<dyn BrowserPage>> {
        self.page
            .clone()
            .ok_or_else(|| AutomationError::TransientSession("no active page".to_string()))
    }

    /// Connected with a page that is still open.
    pub fn is_live(&self) -> bool {
        self.state == SessionState::Connected
            && self.connection.as_ref().is_some_and(|c| c.is_connected())
            && self.page.as_ref().is_some_and(|p| !p.is_closed())
    }

    /// Make sure a usable, signed-in page exists. No-op when already live.
    pub async fn ensure_live(&mut self) -> Result<()> {
        if self.is_live() {
            return Ok(());
        }

        if self.connects > 0 {
            self.reconnects += 1;
            info!(reconnects = self.reconnects, "Session lost, reconnecting");
        }
        self.invalidate();
        self.state = SessionState::Connecting;

        match self.connect().await {
            Ok(()) => {
                self.connects += 1;
                self.state = SessionState::Connected;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Connect sequence failed");
                self.invalidate();
                Err(e)
            }
        }
    }

    async fn connect(&mut self) -> Result<()> {
        debug!(endpoint = %self.options.endpoint, "Connecting to browser");
        let connection = self.connector.connect(&self.options.endpoint).await?;

        let listed = connection.contexts().await?;
        if let Some(stale) = self.owned_context.take_if(|owned| !listed.contains(owned)) {
            debug!(context = %stale, "Created context is gone, releasing it");
            if let Err(e) = connection.close_context(&stale).await {
                debug!(context = %stale, error = %e, "Stale context close failed");
            }
        }

        // Reuse our own context first, then the user's, and create one only when neither exists.
        let context = match (&self.owned_context, listed.first()) {
            (Some(owned), _) => owned.clone(),
            (None, Some(existing)) => existing.clone(),
            (None, None) => {
                let created = connection.create_context().await?;
                debug!(context = %created, "Created browsing context");
                self.owned_context = Some(created.clone());
                created
            }
        };

        let page = connection.new_page(&context).await?;
        self.connection = Some(connection);
        self.page = Some(page.clone());

        if let Some(url) = &self.options.goto_url {
            info!(%url, "Opening target page");
            page.navigate(url).await?;
            sleep(self.options.settle).await;
        }

        self.check_precondition(page.as_ref()).await
    }

    /// Fail unless the page looks signed in.
    async fn check_precondition(&self, page: &dyn BrowserPage) -> Result<()> {
        let url = page.current_url().await?;
        if self.options.login.is_login_url(&url) {
            return Err(AutomationError::Precondition(format!(
                "not signed in: redirected to {}",
                url
            )));
        }

        if let Some(required) = &self.options.login.required {
            SelectorResolver::new(page)
                .wait_visible(required, self.options.element_timeout, self.options.poll_interval)
                .await
                .map_err(|e| match e {
                    AutomationError::Timeout { label, .. } => AutomationError::Precondition(
                        format!("signed-in marker not visible: {}", label),
                    ),
                    other => other,
                })?;
        }
        Ok(())
    }

    /// Drop the page and connection; the next [`ensure_live`](Self::ensure_live) rebuilds them.
    pub fn invalidate(&mut self) {
        self.page = None;
        self.connection = None;
        self.state = SessionState::Disconnected;
    }

    /// Run `op` against the live page, reconnecting and retrying on disconnect.
    ///
    /// Errors without a disconnection signature propagate unchanged.
    pub async fn with_retry<T, F, Fut>(&mut self, max_attempts: u32, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<dyn BrowserPage>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.ensure_live().await?;
            let page = self.page()?;

            match op(page).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_disconnect() => {
                    self.invalidate();
                    if attempt >= max_attempts {
                        return Err(e);
                    }
                    warn!(attempt, max_attempts, error = %e, "Page operation lost the session");
                    sleep(RECONNECT_PAUSE).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Navigate the active page, reconnecting up to `tries` times.
    pub async fn goto_with_retry(&mut self, url: &str, tries: u32) -> Result<()> {
        self.with_retry(tries, |page| async move {
            page.navigate(url).await.map_err(AutomationError::from)
        })
        .await?;
        sleep(self.options.settle).await;
        self.check_precondition(self.page()?.as_ref()).await
    }

    /// Save a diagnostic screenshot; failures are logged and swallowed.
    pub async fn screenshot_best_effort(&self, path: &Path) -> Option<PathBuf> {
        let page = self.page.as_ref()?;
        match tokio::time::timeout(SCREENSHOT_TIMEOUT, page.screenshot(path)).await {
            Ok(Ok(())) => {
                info!(path = %path.display(), "Saved diagnostic screenshot");
                Some(path.to_path_buf())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Diagnostic screenshot failed");
                None
            }
            Err(_) => {
                warn!("Diagnostic screenshot timed out");
                None
            }
        }
    }

    /// Close the page we opened and any context we created.
    pub async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!(error = %e, "Page close failed");
            }
        }
        if let (Some(connection), Some(context)) = (&self.connection, self.owned_context.take()) {
            if let Err(e) = connection.close_context(&context).await {
                debug!(error = %e, "Context close failed");
            }
        }
        self.invalidate();
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
