//! Browser-level CDP connection: discovery, the shared socket, and targets.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::error::CdpError;
use super::protocol::{BrowserVersion, CdpEvent, CdpMessage, CdpRequest, Incoming};
use super::session::PageSession;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type Replies = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, CdpError>>>>>;
type Subscribers = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<CdpEvent>>>>;

/// Bound on a single command round trip.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Command half of the socket, shared by the browser and every page session.
#[derive(Clone)]
pub(crate) struct Transport {
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    next_id: Arc<AtomicU64>,
    replies: Replies,
    open: Arc<AtomicBool>,
}

impl Transport {
    fn new(sink: WsSink) -> Self {
        Self {
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            next_id: Arc::new(AtomicU64::new(1)),
            replies: Arc::new(Mutex::new(HashMap::new())),
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Send a command, scoped to `session_id` when given, and await its reply.
    pub(crate) async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value, CdpError> {
        if !self.is_connected() {
            return Err(CdpError::SessionClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::to_string(&CdpRequest {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(String::from),
        })?;
        trace!(id, "-> {}", frame);

        let (tx, rx) = oneshot::channel();
        self.replies.lock().insert(id, tx);

        let sent = self.sink.lock().await.send(Message::Text(frame.into())).await;
        if let Err(e) = sent {
            self.replies.lock().remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(reply)) => reply,
            // Sender dropped: the socket went away.
            Ok(Err(_)) => Err(CdpError::SessionClosed),
            Err(_) => {
                self.replies.lock().remove(&id);
                Err(CdpError::Timeout(format!("{} got no reply", method)))
            }
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Drain the socket, routing replies to callers and events to sessions.
    async fn read_loop(self, mut source: WsSource, subscribers: Subscribers) {
        while let Some(frame) = source.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => {
                    debug!("Browser closed the socket");
                    break;
                }
                Ok(_) => continue,
                Err(e) => {
                    warn!(error = %e, "Socket read failed");
                    break;
                }
            };
            trace!("<- {}", text);

            let incoming = match serde_json::from_str::<CdpMessage>(&text) {
                Ok(message) => message.classify(),
                Err(e) => {
                    warn!(error = %e, "Unparseable CDP frame");
                    continue;
                }
            };
            match incoming {
                Some(Incoming::Reply { id, result }) => {
                    if let Some(tx) = self.replies.lock().remove(&id) {
                        let _ = tx.send(result);
                    }
                }
                Some(Incoming::Detached { session_id }) => {
                    debug!(session = %session_id, "Session detached");
                    subscribers.write().await.remove(&session_id);
                }
                Some(Incoming::Event { session_id, event }) => {
                    if let Some(tx) = subscribers.read().await.get(&session_id) {
                        let _ = tx.send(event);
                    }
                }
                None => {}
            }
        }

        // Dropping the reply senders and subscriber channels wakes everyone waiting.
        self.open.store(false, Ordering::SeqCst);
        self.replies.lock().clear();
        subscribers.write().await.clear();
    }
}

/// Connection to one browser over its remote-debugging endpoint.
pub struct CdpClient {
    http_endpoint: String,
    browser_ws_url: String,
    transport: Transport,
    subscribers: Subscribers,
    reader: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a browser at its HTTP debugging endpoint, e.g. `http://localhost:9222`.
    pub async fn connect(endpoint: &str) -> Result<Self, CdpError> {
        let http_endpoint = endpoint.trim_end_matches('/').to_string();
        url::Url::parse(&http_endpoint)?;

        let version = Self::discover(&http_endpoint).await?;
        debug!(browser = %version.browser, "Browser discovered");
        let browser_ws_url = Self::rewrite_ws_host(&version.web_socket_debugger_url, &http_endpoint);

        let (socket, _) = tokio_tungstenite::connect_async(&browser_ws_url)
            .await
            .map_err(|e| CdpError::ConnectionFailed(format!("WebSocket: {}", e)))?;
        let (sink, source) = socket.split();

        let transport = Transport::new(sink);
        let subscribers: Subscribers = Arc::default();
        let reader = tokio::spawn(transport.clone().read_loop(source, subscribers.clone()));

        Ok(Self {
            http_endpoint,
            browser_ws_url,
            transport,
            subscribers,
            reader,
        })
    }

    /// `GET /json/version` for the browser socket URL.
    async fn discover(http_endpoint: &str) -> Result<BrowserVersion, CdpError> {
        let unavailable = |e: reqwest::Error| CdpError::ChromeNotAvailable(format!("{}: {}", http_endpoint, e));
        reqwest::get(format!("{}/json/version", http_endpoint))
            .await
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)
    }

    /// Point the advertised socket URL at the host and port actually used.
    ///
    /// Browsers advertise `ws://127.0.0.1:<port>/...` even when reached through a
    /// container bridge or port forward.
    pub(crate) fn rewrite_ws_host(ws_url: &str, http_endpoint: &str) -> String {
        let (Ok(mut ws), Ok(http)) = (url::Url::parse(ws_url), url::Url::parse(http_endpoint))
        else {
            return ws_url.to_string();
        };
        if let Some(host) = http.host_str() {
            if ws.set_host(Some(host)).is_err() {
                return ws_url.to_string();
            }
        }
        if let Some(port) = http.port_or_known_default() {
            let _ = ws.set_port(Some(port));
        }
        ws.to_string()
    }

    /// Browser-scoped command.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        self.transport.call(method, params, None).await
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn browser_ws_url(&self) -> &str {
        &self.browser_ws_url
    }

    pub fn http_endpoint(&self) -> &str {
        &self.http_endpoint
    }

    /// Ids of the non-default browser contexts.
    pub async fn browser_contexts(&self) -> Result<Vec<String>, CdpError> {
        let reply = self.call("Target.getBrowserContexts", None).await?;
        let ids = reply["browserContextIds"].as_array().cloned().unwrap_or_default();
        Ok(ids
            .into_iter()
            .filter_map(|id| id.as_str().map(String::from))
            .collect())
    }

    pub async fn create_browser_context(&self) -> Result<String, CdpError> {
        let reply = self.call("Target.createBrowserContext", None).await?;
        Self::required_str(&reply, "browserContextId")
    }

    pub async fn dispose_browser_context(&self, context_id: &str) -> Result<(), CdpError> {
        self.call(
            "Target.disposeBrowserContext",
            Some(json!({ "browserContextId": context_id })),
        )
        .await
        .map(drop)
    }

    /// Open a blank tab, in `browser_context_id` if given, and attach to it.
    pub async fn new_page(&self, browser_context_id: Option<&str>) -> Result<PageSession, CdpError> {
        let mut params = json!({ "url": "about:blank" });
        if let Some(context) = browser_context_id {
            params["browserContextId"] = json!(context);
        }
        let reply = self.call("Target.createTarget", Some(params)).await?;
        let target_id = Self::required_str(&reply, "targetId")?;
        debug!(target = %target_id, "Tab opened");
        self.attach_page(&target_id).await
    }

    /// Attach a flat session to an existing target and enable its event domains.
    pub async fn attach_page(&self, target_id: &str) -> Result<PageSession, CdpError> {
        let reply = self
            .call(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
            )
            .await?;
        let session_id = Self::required_str(&reply, "sessionId")?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().await.insert(session_id.clone(), tx);

        let session = PageSession::new(target_id.to_string(), session_id, self.transport.clone(), rx);
        session.enable_domains().await?;
        Ok(session)
    }

    pub async fn close_page(&self, target_id: &str) -> Result<(), CdpError> {
        self.call("Target.closeTarget", Some(json!({ "targetId": target_id })))
            .await
            .map(drop)
    }

    fn required_str(reply: &Value, field: &str) -> Result<String, CdpError> {
        reply[field]
            .as_str()
            .map(String::from)
            .ok_or_else(|| CdpError::InvalidResponse(format!("reply has no {}", field)))
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
