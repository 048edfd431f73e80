//! Passive notifications about connection lifecycle events.

use std::time::Duration;

use jbchat_shared::{DisconnectReason, TransportError, TransportKind};

/// Receives lifecycle notifications from every connection it is attached to.
///
/// Notifications are informational. Nothing a connection reports here is
/// returned to callers of the connection manager.
pub trait ConnectionObserver: Send + Sync {
    fn on_connect(&self, _sid: &str, _transport: TransportKind) {}

    fn on_connect_error(&self, _error: &TransportError) {}

    fn on_reconnect_attempt(&self, _attempt: u32, _delay: Duration) {}

    fn on_disconnect(&self, _reason: &DisconnectReason) {}
}

/// Default observer: writes every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ConnectionObserver for TracingObserver {
    fn on_connect(&self, sid: &str, transport: TransportKind) {
        tracing::info!(%sid, %transport, "realtime connection established");
    }

    fn on_connect_error(&self, error: &TransportError) {
        tracing::error!(error = %error, "realtime connection failed");
    }

    fn on_reconnect_attempt(&self, attempt: u32, delay: Duration) {
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
    }

    fn on_disconnect(&self, reason: &DisconnectReason) {
        tracing::info!(%reason, "realtime connection closed");
    }
}
