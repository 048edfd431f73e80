//! Realtime handshake and event frames.
//!
//! Every frame travels inside a [`WsEnvelope`]. A client opens a link by
//! sending [`ClientFrame::Auth`] and the server answers with either
//! [`ServerFrame::Connected`] carrying the session id it assigned, or
//! [`ServerFrame::ConnectError`]. After that both sides exchange opaque
//! named events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Path the event server mounts its realtime endpoint on.
///
/// This is not the transport library default (`/socket.io`), the server has
/// to serve the same path.
pub const REALTIME_PATH: &str = "/ws/socket.io";

/// Query parameter naming the transport of a request.
pub const TRANSPORT_PARAM: &str = "transport";

/// Query parameter carrying the session id on polling requests.
pub const SID_PARAM: &str = "sid";

/// Transport kinds, in the order the client prefers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Websocket,
    Polling,
}

impl TransportKind {
    /// WebSocket first, long-polling as the fallback.
    pub const PREFERENCE: [TransportKind; 2] = [TransportKind::Websocket, TransportKind::Polling];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Websocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsEnvelope<T> {
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    pub ts: DateTime<Utc>,
}

impl<T> WsEnvelope<T> {
    /// Wrap a payload with a fresh id and the current timestamp
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Handshake auth payload, always the first frame of a link
    Auth { token: String },
    Event {
        event: String,
        data: serde_json::Value,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerFrame {
    /// Handshake accepted; `sid` identifies this session on the server
    Connected { sid: String },
    /// Handshake refused, typically a rejected credential
    ConnectError { message: String },
    Event {
        event: String,
        data: serde_json::Value,
    },
    /// Server-initiated close. Clients must not reconnect on their own.
    Disconnect { reason: String },
}

/// Why an established link went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the session deliberately
    ServerDisconnect(String),
    /// The client closed the link
    ClientDisconnect,
    /// The underlying transport failed or was closed without notice
    TransportClose(String),
}

impl DisconnectReason {
    /// Whether the reconnect policy should try to bring the link back.
    pub fn should_reconnect(&self) -> bool {
        matches!(self, DisconnectReason::TransportClose(_))
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ServerDisconnect(reason) => {
                write!(f, "io server disconnect: {}", reason)
            }
            DisconnectReason::ClientDisconnect => f.write_str("io client disconnect"),
            DisconnectReason::TransportClose(detail) => write!(f, "transport close: {}", detail),
        }
    }
}
