//! CDP wire types: the JSON frames on the socket and the few payloads we decode.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::CdpError;

/// Outgoing command frame.
#[derive(Debug, Serialize)]
pub struct CdpRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Any incoming frame: a reply carries `id`, an event carries `method`.
#[derive(Debug, Deserialize)]
pub struct CdpMessage {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<ProtocolError>,
    pub method: Option<String>,
    pub params: Option<Value>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// `error` member of a failed reply.
#[derive(Debug, Deserialize)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
}

/// A classified incoming frame.
#[derive(Debug)]
pub enum Incoming {
    Reply {
        id: u64,
        result: Result<Value, CdpError>,
    },
    /// An attached session went away.
    Detached { session_id: String },
    Event {
        session_id: String,
        event: CdpEvent,
    },
}

impl CdpMessage {
    /// Sort the frame into reply, detach notice or session event.
    pub fn classify(self) -> Option<Incoming> {
        if let Some(id) = self.id {
            let result = match self.error {
                Some(e) => Err(CdpError::Protocol {
                    code: e.code,
                    message: e.message,
                }),
                None => Ok(self.result.unwrap_or(Value::Null)),
            };
            return Some(Incoming::Reply { id, result });
        }

        let method = self.method?;
        let params = self.params.unwrap_or(Value::Null);
        if method == "Target.detachedFromTarget" {
            let session_id = params["sessionId"].as_str()?.to_string();
            return Some(Incoming::Detached { session_id });
        }
        Some(Incoming::Event {
            session_id: self.session_id.unwrap_or_default(),
            event: CdpEvent { method, params },
        })
    }
}

/// An event delivered to a page session.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
}

/// `/json/version`. Chrome uses PascalCase keys here.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser")]
    pub browser: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

/// `DOM.getBoxModel` quads; each is 8 numbers (x1 y1 .. x4 y4).
#[derive(Debug, Clone, Deserialize)]
pub struct BoxModel {
    pub content: Vec<f64>,
    pub border: Vec<f64>,
    pub width: i64,
    pub height: i64,
}

/// `Runtime.RemoteObject`, reduced to what element calls need.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub object_type: String,
    pub subtype: Option<String>,
    pub value: Option<Value>,
    pub object_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    None,
    Left,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseEventType {
    MousePressed,
    MouseReleased,
    MouseMoved,
}

/// `rawKeyDown` is used for keys that produce no text (Enter, Escape).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyEventType {
    KeyDown,
    KeyUp,
    RawKeyDown,
}

/// `Page.downloadWillBegin`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadWillBegin {
    pub guid: String,
    pub url: String,
    pub suggested_filename: String,
}

/// `Page.downloadProgress`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub guid: String,
    /// `inProgress`, `completed` or `canceled`.
    pub state: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    Png,
    Jpeg,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
