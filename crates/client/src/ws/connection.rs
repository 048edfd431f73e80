//! Realtime connection with state management and auto-reconnect.
//!
//! A [`Connection`] is a cheap, cloneable handle to one connection instance.
//! Each instance is bound to the credential it was created with and driven
//! by a single background task through [`ConnectionState`]:
//!
//! ```text
//! Connecting ──▶ Connected ──(transport drop)──▶ Reconnecting{n} ──▶ Connected
//!     │              │                                 │
//!     │              └──(server disconnect)──▶ Disconnected
//!     └──(rejected | retries exhausted)────────────────┴──▶ Failed
//!
//! any state ──close()──▶ Closed
//! ```
//!
//! A credential change is never applied to a running instance; the
//! [`ConnectionManager`](super::ConnectionManager) replaces the instance.

use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use jbchat_shared::{
    ClientFrame, DisconnectReason, ServerFrame, TransportError, TransportKind, WsEnvelope,
};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::observer::{ConnectionObserver, TracingObserver};
use super::transport::{default_transports, Endpoint, Link, LinkEvent, Transport, HANDSHAKE_TIMEOUT};

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Connection state for a realtime connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// First handshake in flight
    Connecting,
    Connected {
        sid: String,
        transport: TransportKind,
    },
    /// Waiting for or running reconnect attempt `attempt`
    Reconnecting { attempt: u32 },
    /// The server ended the session; no automatic reconnect
    Disconnected { reason: String },
    /// Handshake rejected or reconnect attempts exhausted
    Failed { reason: String },
    /// Closed by the client
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }

    /// The driver has stopped and the state will not change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected { .. }
                | ConnectionState::Failed { .. }
                | ConnectionState::Closed
        )
    }

    pub fn sid(&self) -> Option<&str> {
        match self {
            ConnectionState::Connected { sid, .. } => Some(sid),
            _ => None,
        }
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff (1.0 keeps the delay fixed)
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
            backoff_multiplier: 1.0,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay before reconnect attempt `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis((delay as u32).min(self.max_delay_ms) as u64)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}

/// Everything needed to create connection instances.
#[derive(Clone)]
pub struct ConnectionOptions {
    pub endpoint: Endpoint,
    /// Tried in order on every attempt
    pub transports: Vec<Arc<dyn Transport>>,
    pub reconnect: ReconnectConfig,
    pub handshake_timeout: Duration,
    pub observer: Arc<dyn ConnectionObserver>,
}

impl ConnectionOptions {
    /// WebSocket-then-polling transports, the default reconnect policy and a
    /// tracing observer.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            transports: default_transports(),
            reconnect: ReconnectConfig::default(),
            handshake_timeout: HANDSHAKE_TIMEOUT,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_transports(mut self, transports: Vec<Arc<dyn Transport>>) -> Self {
        self.transports = transports;
        self
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ConnectionObserver>) -> Self {
        self.observer = observer;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("connection is closed")]
    Closed,
}

/// A named event received from the server.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub event: String,
    pub data: serde_json::Value,
}

/// Handle to a connection instance. Clones share the same instance.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    instance_id: Uuid,
    credential: String,
    state: Arc<watch::Sender<ConnectionState>>,
    events: broadcast::Sender<InboundEvent>,
    outgoing: UnboundedSender<WsEnvelope<ClientFrame>>,
    task: AbortHandle,
    observer: Arc<dyn ConnectionObserver>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("instance_id", &self.inner.instance_id)
            .field("state", &*self.inner.state.borrow())
            .finish()
    }
}

impl Connection {
    /// Create an instance bound to `credential` and start connecting.
    ///
    /// Must be called within a Tokio runtime. Never fails: the returned
    /// handle starts in [`ConnectionState::Connecting`] and reports progress
    /// through its state and the observer.
    pub fn open(credential: String, options: &ConnectionOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let state = Arc::new(state_tx);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (outgoing, outgoing_rx) = unbounded();

        let driver = Driver::new(
            credential.clone(),
            options,
            state.clone(),
            events.clone(),
            outgoing_rx,
        );
        let task = tokio::spawn(driver.run()).abort_handle();

        Self {
            inner: Arc::new(Inner {
                instance_id: Uuid::new_v4(),
                credential,
                state,
                events,
                outgoing,
                task,
                observer: options.observer.clone(),
            }),
        }
    }

    /// Local identifier of this instance, stable across reconnects.
    pub fn instance_id(&self) -> Uuid {
        self.inner.instance_id
    }

    /// Whether both handles refer to the same instance.
    pub fn same_instance(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The credential this instance authenticates with
    pub fn credential(&self) -> &str {
        &self.inner.credential
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    /// Server-assigned session id, while connected.
    pub fn id(&self) -> Option<String> {
        self.inner.state.borrow().sid().map(str::to_string)
    }

    /// Whether the connection manager may hand this instance out again: the
    /// first handshake is in flight or the link is up.
    pub(crate) fn is_reusable(&self) -> bool {
        matches!(
            *self.inner.state.borrow(),
            ConnectionState::Connecting | ConnectionState::Connected { .. }
        )
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Receive server events arriving after this call.
    pub fn events(&self) -> broadcast::Receiver<InboundEvent> {
        self.inner.events.subscribe()
    }

    /// Queue an event for the server. Events sent while the link is down are
    /// delivered once it is (re)established.
    pub fn emit(&self, event: &str, data: serde_json::Value) -> Result<(), ConnectionError> {
        if self.inner.state.borrow().is_terminal() {
            return Err(ConnectionError::Closed);
        }
        let frame = WsEnvelope::new(ClientFrame::Event {
            event: event.to_string(),
            data,
        });
        self.inner
            .outgoing
            .unbounded_send(frame)
            .map_err(|_| ConnectionError::Closed)
    }

    /// Tear the instance down, abandoning any connect or retry in flight.
    /// Idempotent.
    pub fn close(&self) {
        self.inner.task.abort();
        let previous = self.inner.state.send_replace(ConnectionState::Closed);
        if previous == ConnectionState::Closed {
            return;
        }
        if previous.is_connected() {
            self.inner
                .observer
                .on_disconnect(&DisconnectReason::ClientDisconnect);
        }
        tracing::debug!(instance = %self.inner.instance_id, "connection closed");
    }
}

/// Background task owning the transport links of one instance.
struct Driver {
    credential: String,
    endpoint: Endpoint,
    transports: Vec<Arc<dyn Transport>>,
    reconnect: ReconnectConfig,
    handshake_timeout: Duration,
    observer: Arc<dyn ConnectionObserver>,
    state: Arc<watch::Sender<ConnectionState>>,
    events: broadcast::Sender<InboundEvent>,
    outgoing: UnboundedReceiver<WsEnvelope<ClientFrame>>,
}

impl Driver {
    fn new(
        credential: String,
        options: &ConnectionOptions,
        state: Arc<watch::Sender<ConnectionState>>,
        events: broadcast::Sender<InboundEvent>,
        outgoing: UnboundedReceiver<WsEnvelope<ClientFrame>>,
    ) -> Self {
        Self {
            credential,
            endpoint: options.endpoint.clone(),
            transports: options.transports.clone(),
            reconnect: options.reconnect.clone(),
            handshake_timeout: options.handshake_timeout,
            observer: options.observer.clone(),
            state,
            events,
            outgoing,
        }
    }

    /// Abort is cooperative, so the driver can still be mid-step after
    /// `close()`. Every observer call is gated on this.
    fn is_closed(&self) -> bool {
        *self.state.borrow() == ConnectionState::Closed
    }

    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            match self.establish().await {
                Ok(link) => {
                    attempt = 0;
                    let sid = link.sid.clone();
                    let kind = link.kind;
                    if !self.set_state(ConnectionState::Connected {
                        sid: sid.clone(),
                        transport: kind,
                    }) {
                        return;
                    }
                    self.observer.on_connect(&sid, kind);

                    let reason = self.pump(link).await;
                    if self.is_closed() {
                        return;
                    }
                    self.observer.on_disconnect(&reason);

                    if !reason.should_reconnect() {
                        self.set_state(ConnectionState::Disconnected {
                            reason: reason.to_string(),
                        });
                        return;
                    }
                }
                Err(error) => {
                    if self.is_closed() {
                        return;
                    }
                    self.observer.on_connect_error(&error);

                    if !error.is_retryable() {
                        self.set_state(ConnectionState::Failed {
                            reason: error.to_string(),
                        });
                        return;
                    }
                    if self.reconnect.exhausted(attempt) {
                        self.set_state(ConnectionState::Failed {
                            reason: format!(
                                "Max reconnect attempts ({}) exceeded",
                                self.reconnect.max_attempts
                            ),
                        });
                        return;
                    }
                }
            }

            // Wait before reconnecting
            attempt += 1;
            let delay = self.reconnect.delay_for_attempt(attempt);
            if !self.set_state(ConnectionState::Reconnecting { attempt }) {
                return;
            }
            self.observer.on_reconnect_attempt(attempt, delay);
            tokio::time::sleep(delay).await;
        }
    }

    /// One connection attempt: each transport in preference order until one
    /// completes the handshake. A rejection ends the attempt immediately.
    async fn establish(&self) -> Result<Link, TransportError> {
        let mut last_error = TransportError::Connect("no transports configured".to_string());

        for transport in &self.transports {
            let kind = transport.kind();
            let opened = tokio::time::timeout(
                self.handshake_timeout,
                transport.open(&self.endpoint, &self.credential),
            )
            .await;

            match opened {
                Ok(Ok(link)) => return Ok(link),
                Ok(Err(error)) if !error.is_retryable() => return Err(error),
                Ok(Err(error)) => {
                    tracing::debug!(%kind, error = %error, "transport failed, trying next");
                    last_error = error;
                }
                Err(_) => {
                    tracing::debug!(%kind, "transport handshake timed out");
                    last_error = TransportError::Timeout;
                }
            }
        }

        Err(last_error)
    }

    /// Shuttle frames over an established link until it goes away.
    async fn pump(&mut self, mut link: Link) -> DisconnectReason {
        loop {
            tokio::select! {
                event = link.incoming.next() => match event {
                    Some(LinkEvent::Frame(frame)) => match frame.payload {
                        ServerFrame::Event { event, data } => {
                            // No subscribers is fine
                            let _ = self.events.send(InboundEvent { event, data });
                        }
                        ServerFrame::Disconnect { reason } => {
                            return DisconnectReason::ServerDisconnect(reason);
                        }
                        other => tracing::debug!(frame = ?other, "ignoring handshake frame on open link"),
                    },
                    Some(LinkEvent::Closed(reason)) => return reason,
                    None => return DisconnectReason::TransportClose("link dropped".to_string()),
                },
                frame = self.outgoing.next() => match frame {
                    Some(frame) => {
                        if link.outgoing.unbounded_send(frame).is_err() {
                            return DisconnectReason::TransportClose("send channel closed".to_string());
                        }
                    }
                    None => return DisconnectReason::ClientDisconnect,
                },
            }
        }
    }

    /// Publish a new state unless the instance was closed meanwhile.
    /// Returns false when the instance is closed.
    fn set_state(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == ConnectionState::Closed {
                return false;
            }
            *current = next;
            true
        })
    }
}
