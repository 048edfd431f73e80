//! HTTP long-polling fallback transport using reqwest.
//!
//! Handshake is a `POST` of the auth frame to the polling URL. The session
//! then long-polls `GET ...&sid=<sid>` for a JSON array of server frames and
//! sends client frames with `POST ...&sid=<sid>`. Closing the link sends a
//! best-effort `DELETE`.

use async_trait::async_trait;
use futures_channel::mpsc::unbounded;
use futures_util::StreamExt;
use jbchat_shared::{
    ClientFrame, DisconnectReason, ServerFrame, TransportError, TransportKind, WsEnvelope,
};

use super::{Endpoint, Link, LinkEvent, Transport};

#[derive(Debug, Clone, Default)]
pub struct PollingTransport {
    http: reqwest::Client,
}

impl PollingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured HTTP client (proxies, timeouts, TLS roots).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for PollingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    async fn open(&self, endpoint: &Endpoint, credential: &str) -> Result<Link, TransportError> {
        let auth = WsEnvelope::new(ClientFrame::Auth {
            token: credential.to_string(),
        });
        let response = self
            .http
            .post(endpoint.url(TransportKind::Polling))
            .json(&auth)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Connect(format!("HTTP {}", status.as_u16())));
        }

        let frame: WsEnvelope<ServerFrame> = response
            .json()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        let sid = match frame.payload {
            ServerFrame::Connected { sid } => sid,
            ServerFrame::ConnectError { message } => return Err(TransportError::Rejected(message)),
            other => {
                return Err(TransportError::Protocol(format!(
                    "unexpected frame before handshake: {:?}",
                    other
                )))
            }
        };
        tracing::debug!(%sid, "polling handshake complete");

        let session_url = endpoint.polling_session_url(&sid);
        let (out_tx, mut out_rx) = unbounded::<WsEnvelope<ClientFrame>>();
        let (in_tx, in_rx) = unbounded::<LinkEvent>();

        // Poll task
        let http = self.http.clone();
        let poll_url = session_url.clone();
        let poll_task = tokio::spawn(async move {
            let reason = loop {
                if in_tx.is_closed() {
                    return;
                }
                let response = match http.get(poll_url.clone()).send().await {
                    Ok(response) => response,
                    Err(e) => break DisconnectReason::TransportClose(e.to_string()),
                };
                if !response.status().is_success() {
                    break DisconnectReason::TransportClose(format!(
                        "poll returned HTTP {}",
                        response.status().as_u16()
                    ));
                }
                let frames: Vec<WsEnvelope<ServerFrame>> = match response.json().await {
                    Ok(frames) => frames,
                    Err(e) => break DisconnectReason::TransportClose(e.to_string()),
                };
                for frame in frames {
                    if in_tx.unbounded_send(LinkEvent::Frame(frame)).is_err() {
                        return;
                    }
                }
            };
            let _ = in_tx.unbounded_send(LinkEvent::Closed(reason));
        });

        // Send task
        let http = self.http.clone();
        tokio::spawn(async move {
            while let Some(frame) = out_rx.next().await {
                let result = http.post(session_url.clone()).json(&frame).send().await;
                match result {
                    Ok(response) if response.status().is_success() => {}
                    Ok(response) => {
                        tracing::warn!(status = response.status().as_u16(), "polling send rejected")
                    }
                    Err(e) => tracing::warn!(error = %e, "polling send failed"),
                }
            }
            // Sender dropped: stop polling and tell the server we are gone
            poll_task.abort();
            if let Err(e) = http.delete(session_url).send().await {
                tracing::debug!(error = %e, "polling close request failed");
            }
        });

        Ok(Link {
            sid,
            kind: TransportKind::Polling,
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
