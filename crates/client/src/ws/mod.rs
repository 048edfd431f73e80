//! Realtime connection to the event server.
//!
//! This module provides:
//! - A single connection per [`ConnectionManager`], bound to the stored credential
//! - Auto-reconnect with a bounded retry policy
//! - WebSocket transport with a long-polling fallback
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │              ConnectionManager               │
//! │  get_connection(): reuse or replace, based   │
//! │  on the credential read from storage         │
//! └──────────────────────────────────────────────┘
//!                        │ holds one
//!                        ▼
//!               ┌─────────────────┐      ┌────────────────────┐
//!               │   Connection    │─────▶│ ConnectionObserver │
//!               │ (state machine) │      │ (tracing default)  │
//!               └─────────────────┘      └────────────────────┘
//!                        │ tries in order
//!          ┌─────────────┴─────────────┐
//!          ▼                           ▼
//!   ┌──────────────┐           ┌──────────────┐
//!   │  WebSocket   │           │   Polling    │
//!   │  transport   │           │  transport   │
//!   └──────────────┘           └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut manager = ConnectionManager::from_config(&config, storage.clone());
//! let conn = manager.get_connection();
//! conn.emit("chat:join", serde_json::json!({ "room": "general" }))?;
//!
//! // on sign-out
//! manager.disconnect();
//! ```

mod connection;
mod manager;
mod observer;
pub mod transport;

#[cfg(test)]
mod testing;

pub use connection::{
    Connection, ConnectionError, ConnectionOptions, ConnectionState, InboundEvent, ReconnectConfig,
};
pub use manager::ConnectionManager;
pub use observer::{ConnectionObserver, TracingObserver};
pub use transport::{Endpoint, Link, LinkEvent, PollingTransport, Transport, WebSocketTransport};
