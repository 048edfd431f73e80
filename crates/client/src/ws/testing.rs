//! Scripted transport and recording observer for connection tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::StreamExt;
use jbchat_shared::{
    ClientFrame, DisconnectReason, ServerFrame, TransportError, TransportKind, WsEnvelope,
};
use url::Url;

use super::connection::{Connection, ConnectionState};
use super::observer::ConnectionObserver;
use super::transport::{Endpoint, Link, LinkEvent, Transport};

pub fn endpoint() -> Endpoint {
    Endpoint::new(Url::parse("http://localhost:8080").unwrap())
}

pub fn as_transports(transports: &[&Arc<ScriptedTransport>]) -> Vec<Arc<dyn Transport>> {
    transports
        .iter()
        .map(|t| (*t).clone() as Arc<dyn Transport>)
        .collect()
}

/// Wait (in virtual time) until the connection state satisfies `pred`.
pub async fn wait_for(
    conn: &Connection,
    pred: impl Fn(&ConnectionState) -> bool,
) -> ConnectionState {
    let mut rx = conn.subscribe_state();
    let state = tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for connection state")
        .expect("state channel closed")
        .clone();
    state
}

/// What the next `open` call does.
#[derive(Debug, Clone)]
pub enum Outcome {
    Accept(&'static str),
    /// Accept with a generated sid `<kind>-<n>`
    AcceptAny,
    Reject(&'static str),
    Fail(&'static str),
    /// Never answer the handshake
    Hang,
}

/// Server end of a scripted link.
pub struct ServerSide {
    to_client: UnboundedSender<LinkEvent>,
    from_client: tokio::sync::Mutex<UnboundedReceiver<WsEnvelope<ClientFrame>>>,
}

impl ServerSide {
    pub fn send(&self, frame: ServerFrame) {
        let _ = self
            .to_client
            .unbounded_send(LinkEvent::Frame(WsEnvelope::new(frame)));
    }

    pub fn close(&self, reason: DisconnectReason) {
        let _ = self.to_client.unbounded_send(LinkEvent::Closed(reason));
    }

    /// Next client frame, or `None` once the client dropped the link.
    pub async fn recv(&self) -> Option<WsEnvelope<ClientFrame>> {
        self.from_client.lock().await.next().await
    }
}

pub struct ScriptedTransport {
    kind: TransportKind,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    credentials: Mutex<Vec<String>>,
    servers: Mutex<Vec<Arc<ServerSide>>>,
}

impl ScriptedTransport {
    /// Play `script` in order, then accept every further attempt.
    pub fn new(kind: TransportKind, script: Vec<Outcome>) -> Arc<Self> {
        Self::build(kind, script, Outcome::AcceptAny)
    }

    /// Fail every attempt.
    pub fn failing(kind: TransportKind) -> Arc<Self> {
        Self::build(kind, Vec::new(), Outcome::Fail("unreachable"))
    }

    fn build(kind: TransportKind, script: Vec<Outcome>, fallback: Outcome) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: Mutex::new(script.into()),
            fallback,
            credentials: Mutex::new(Vec::new()),
            servers: Mutex::new(Vec::new()),
        })
    }

    pub fn open_count(&self) -> usize {
        self.credentials.lock().unwrap().len()
    }

    /// Credentials presented to each `open` call, in order.
    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().unwrap().clone()
    }

    /// Server end of the `index`-th accepted link.
    pub fn server(&self, index: usize) -> Arc<ServerSide> {
        self.servers.lock().unwrap()[index].clone()
    }

    fn accept(&self, sid: String) -> Link {
        let (out_tx, out_rx) = unbounded();
        let (in_tx, in_rx) = unbounded();
        self.servers.lock().unwrap().push(Arc::new(ServerSide {
            to_client: in_tx,
            from_client: tokio::sync::Mutex::new(out_rx),
        }));
        Link {
            sid,
            kind: self.kind,
            outgoing: out_tx,
            incoming: in_rx,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn open(&self, _endpoint: &Endpoint, credential: &str) -> Result<Link, TransportError> {
        let (n, outcome) = {
            let mut credentials = self.credentials.lock().unwrap();
            credentials.push(credential.to_string());
            let outcome = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());
            (credentials.len(), outcome)
        };

        match outcome {
            Outcome::Accept(sid) => Ok(self.accept(sid.to_string())),
            Outcome::AcceptAny => Ok(self.accept(format!("{}-{}", self.kind, n))),
            Outcome::Reject(message) => Err(TransportError::Rejected(message.to_string())),
            Outcome::Fail(message) => Err(TransportError::Connect(message.to_string())),
            Outcome::Hang => std::future::pending().await,
        }
    }
}

/// Observer that records every notification as a line of text.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, line: String) {
        self.events.lock().unwrap().push(line);
    }
}

impl ConnectionObserver for RecordingObserver {
    fn on_connect(&self, sid: &str, transport: TransportKind) {
        self.push(format!("connect {} {}", sid, transport));
    }

    fn on_connect_error(&self, error: &TransportError) {
        self.push(format!("connect_error {}", error));
    }

    fn on_reconnect_attempt(&self, attempt: u32, delay: Duration) {
        self.push(format!("reconnect {} {}ms", attempt, delay.as_millis()));
    }

    fn on_disconnect(&self, reason: &DisconnectReason) {
        self.push(format!("disconnect {}", reason));
    }
}
