//! WebSocket transport using tokio-tungstenite.

use async_trait::async_trait;
use futures_channel::mpsc::unbounded;
use futures_util::{SinkExt, Stream, StreamExt};
use jbchat_shared::{
    ClientFrame, DisconnectReason, ServerFrame, TransportError, TransportKind, WsEnvelope,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{Endpoint, Link, LinkEvent, Transport};

/// Primary transport: a single WebSocket carrying JSON text frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Websocket
    }

    async fn open(&self, endpoint: &Endpoint, credential: &str) -> Result<Link, TransportError> {
        let url = endpoint.url(TransportKind::Websocket);
        let (ws_stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (mut write, mut read) = ws_stream.split();

        let auth = WsEnvelope::new(ClientFrame::Auth {
            token: credential.to_string(),
        });
        let json = serde_json::to_string(&auth).map_err(|e| TransportError::Protocol(e.to_string()))?;
        write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let sid = await_handshake(&mut read).await?;
        tracing::debug!(%url, %sid, "websocket handshake complete");

        let (out_tx, mut out_rx) = unbounded::<WsEnvelope<ClientFrame>>();
        let (in_tx, in_rx) = unbounded::<LinkEvent>();

        // Read task
        tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsEnvelope<ServerFrame>>(text.as_str()) {
                            Ok(frame) => {
                                if in_tx.unbounded_send(LinkEvent::Frame(frame)).is_err() {
                                    // Link dropped by its owner
                                    return;
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "failed to parse server frame"),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let detail = frame
                            .map(|f| format!("close frame {}", u16::from(f.code)))
                            .unwrap_or_else(|| "close frame".to_string());
                        break DisconnectReason::TransportClose(detail);
                    }
                    // Pong is handled automatically by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break DisconnectReason::TransportClose(e.to_string()),
                    None => break DisconnectReason::TransportClose("stream ended".to_string()),
                }
            };
            let _ = in_tx.unbounded_send(LinkEvent::Closed(reason));
        });

        // Write task
        tokio::spawn(async move {
            while let Some(frame) = out_rx.next().await {
                match serde_json::to_string(&frame) {
                    Ok(json) => {
                        if let Err(e) = write.send(Message::Text(json.into())).await {
                            tracing::warn!(error = %e, "websocket send failed");
                            return;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to serialize client frame"),
                }
            }
            // Sender dropped: the link owner closed it
            let _ = write.send(Message::Close(None)).await;
        });

        Ok(Link {
            sid,
            kind: TransportKind::Websocket,
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

/// Wait for the server's answer to the auth frame.
async fn await_handshake<S>(read: &mut S) -> Result<String, TransportError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = read.next().await {
        let msg = msg.map_err(|e| TransportError::Connect(e.to_string()))?;
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let frame = serde_json::from_str::<WsEnvelope<ServerFrame>>(text.as_str())
            .map_err(|e| TransportError::Protocol(e.to_string()))?;
        return match frame.payload {
            ServerFrame::Connected { sid } => Ok(sid),
            ServerFrame::ConnectError { message } => Err(TransportError::Rejected(message)),
            other => Err(TransportError::Protocol(format!(
                "unexpected frame before handshake: {:?}",
                other
            ))),
        };
    }
    Err(TransportError::Closed)
}
