//! Error types shared by the session and connection layers.

use std::fmt;

use thiserror::Error;

/// Third-party identity providers the UI offers buttons for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Github,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Google => f.write_str("Google"),
            Provider::Github => f.write_str("GitHub"),
        }
    }
}

/// Errors returned by session transitions.
///
/// Only social sign-in ever produces one: those methods exist so callers can
/// wire them up, but every call is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{0} sign-in is disabled.")]
    ProviderDisabled(Provider),
}

/// Failures while opening or running a realtime link.
///
/// These never reach callers of the connection manager; they are reported to
/// the connection observer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    /// The server refused the handshake. Not retried.
    #[error("connection rejected: {0}")]
    Rejected(String),
    #[error("handshake timed out")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The server closed the link before answering the handshake.
    #[error("link closed")]
    Closed,
}

impl TransportError {
    /// Rejections are final; everything else is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Rejected(_))
    }
}
