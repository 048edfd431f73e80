//! Realtime transports.
//!
//! A [`Transport`] performs the handshake for one transport kind and hands
//! back a [`Link`]: the server-assigned session id plus a pair of channels.
//! Dropping the link's `outgoing` sender closes the link; the `incoming`
//! receiver yields server frames and finally a [`LinkEvent::Closed`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use jbchat_shared::{
    ClientFrame, DisconnectReason, ServerFrame, TransportError, TransportKind, WsEnvelope,
    REALTIME_PATH, SID_PARAM, TRANSPORT_PARAM,
};
use url::Url;

mod polling;
mod websocket;

pub use polling::PollingTransport;
pub use websocket::WebSocketTransport;

/// The handshake must complete within this long or the attempt fails.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// Something that arrived on an established link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Frame(WsEnvelope<ServerFrame>),
    Closed(DisconnectReason),
}

/// An established, authenticated link.
pub struct Link {
    pub sid: String,
    pub kind: TransportKind,
    pub outgoing: UnboundedSender<WsEnvelope<ClientFrame>>,
    pub incoming: UnboundedReceiver<LinkEvent>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Connect and authenticate with `credential`.
    ///
    /// A refused credential must be reported as [`TransportError::Rejected`];
    /// that is the only error the connection does not retry.
    async fn open(&self, endpoint: &Endpoint, credential: &str) -> Result<Link, TransportError>;
}

/// Transports in the default preference order.
pub fn default_transports() -> Vec<Arc<dyn Transport>> {
    TransportKind::PREFERENCE
        .iter()
        .map(|kind| -> Arc<dyn Transport> {
            match kind {
                TransportKind::Websocket => Arc::new(WebSocketTransport),
                TransportKind::Polling => Arc::new(PollingTransport::new()),
            }
        })
        .collect()
}

/// Address of the event server's realtime endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: Url,
}

impl Endpoint {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// URL a transport of `kind` opens. WebSocket URLs get a ws/wss scheme.
    pub fn url(&self, kind: TransportKind) -> Url {
        let mut url = self.base.clone();
        let path = format!("{}{}", self.base.path().trim_end_matches('/'), REALTIME_PATH);
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);
        url.query_pairs_mut().append_pair(TRANSPORT_PARAM, kind.as_str());

        if kind == TransportKind::Websocket {
            let scheme = match url.scheme() {
                "https" => Some("wss"),
                "http" => Some("ws"),
                _ => None,
            };
            if let Some(scheme) = scheme {
                // http <-> ws are both special schemes, so this cannot fail
                let _ = url.set_scheme(scheme);
            }
        }
        url
    }

    /// URL of an established polling session.
    pub fn polling_session_url(&self, sid: &str) -> Url {
        let mut url = self.url(TransportKind::Polling);
        url.query_pairs_mut().append_pair(SID_PARAM, sid);
        url
    }
}
