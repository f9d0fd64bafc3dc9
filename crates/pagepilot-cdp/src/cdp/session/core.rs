//! Core session struct and CDP command dispatch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use base64::Engine;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, trace};

use crate::cdp::client::Transport;
use crate::cdp::error::CdpError;
use crate::cdp::protocol::{CdpEvent, ScreenshotFormat};

/// Observed request URLs kept per page.
pub(super) const MAX_OBSERVED_REQUESTS: usize = 500;

const EVENT_CAPACITY: usize = 256;

/// A session attached to a single page/target.
pub struct PageSession {
    /// Target ID.
    pub(super) target_id: String,
    /// Session ID for this target.
    pub(super) session_id: String,
    pub(super) transport: Transport,
    /// Set once the browser detaches the session or the socket drops.
    pub(super) closed: Arc<AtomicBool>,
    pub(super) events: broadcast::Sender<CdpEvent>,
    pub(super) requests: Arc<Mutex<VecDeque<String>>>,
    _pump: tokio::task::JoinHandle<()>,
}

impl PageSession {
    /// Create a new page session and start its event pump.
    pub(crate) fn new(
        target_id: String,
        session_id: String,
        transport: Transport,
        event_rx: mpsc::UnboundedReceiver<CdpEvent>,
    ) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let requests = Arc::new(Mutex::new(VecDeque::new()));

        let pump = tokio::spawn(Self::pump(
            event_rx,
            events.clone(),
            requests.clone(),
            closed.clone(),
            session_id.clone(),
        ));

        Self {
            target_id,
            session_id,
            transport,
            closed,
            events,
            requests,
            _pump: pump,
        }
    }

    async fn pump(
        mut event_rx: mpsc::UnboundedReceiver<CdpEvent>,
        events: broadcast::Sender<CdpEvent>,
        requests: Arc<Mutex<VecDeque<String>>>,
        closed: Arc<AtomicBool>,
        session_id: String,
    ) {
        while let Some(event) = event_rx.recv().await {
            trace!("Session {} event {}", session_id, event.method);

            if event.method == "Network.requestWillBeSent" {
                if let Some(url) = event.params["request"]["url"].as_str() {
                    Self::record_request(&requests, url);
                }
            }

            // No subscribers is fine.
            let _ = events.send(event);
        }

        debug!("Session {} event stream ended", session_id);
        closed.store(true, Ordering::SeqCst);
    }

    pub(super) fn record_request(requests: &Mutex<VecDeque<String>>, url: &str) {
        let mut requests = requests.lock();
        if requests.len() >= MAX_OBSERVED_REQUESTS {
            requests.pop_front();
        }
        requests.push_back(url.to_string());
    }

    /// Get target ID.
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// Get session ID.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the target is gone.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || !self.transport.is_connected()
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Send a CDP command to this page session.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        if self.is_closed() {
            return Err(CdpError::SessionClosed);
        }
        self.transport
            .call(method, params, Some(&self.session_id))
            .await
    }

    /// Enable required CDP domains.
    pub(crate) async fn enable_domains(&self) -> Result<(), CdpError> {
        self.call("Page.enable", None).await?;
        self.call("DOM.enable", None).await?;
        self.call("Runtime.enable", None).await?;
        self.call("Network.enable", None).await?;

        debug!("Enabled CDP domains for session {}", self.session_id);
        Ok(())
    }

    /// Capture the viewport and return decoded image bytes.
    pub async fn screenshot(&self, format: ScreenshotFormat) -> Result<Vec<u8>, CdpError> {
        let result = self
            .call("Page.captureScreenshot", Some(json!({"format": format})))
            .await?;

        let data = result["data"]
            .as_str()
            .ok_or_else(|| CdpError::InvalidResponse("Missing screenshot data".to_string()))?;

        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| CdpError::InvalidResponse(format!("Screenshot data: {}", e)))
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        self._pump.abort();
    }
}
