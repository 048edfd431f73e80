//! Owner of the single realtime connection.
//!
//! [`ConnectionManager::get_connection`] is the only way to obtain
//! connectivity, and the only place that decides between reusing the held
//! instance and replacing it. The decision is made synchronously, before any
//! teardown or creation, so back-to-back calls with a stable credential
//! always share one instance.

use std::sync::Arc;

use url::Url;

use super::connection::{Connection, ConnectionOptions};
use super::transport::Endpoint;
use crate::auth_session::read_credential;
use crate::config::ClientConfig;
use crate::storage::Storage;

pub struct ConnectionManager {
    storage: Arc<dyn Storage>,
    options: ConnectionOptions,
    current: Option<Connection>,
}

impl ConnectionManager {
    pub fn new(storage: Arc<dyn Storage>, options: ConnectionOptions) -> Self {
        Self {
            storage,
            options,
            current: None,
        }
    }

    /// Manager for the configured backend with default connection options.
    pub fn from_config(config: &ClientConfig, storage: Arc<dyn Storage>) -> Self {
        Self::new(storage, ConnectionOptions::new(Endpoint::new(config.backend_url.clone())))
    }

    pub fn backend_url(&self) -> &Url {
        self.options.endpoint.base()
    }

    /// Return the live connection for the current credential.
    ///
    /// The held instance is reused only while it is live and was created
    /// with the credential stored right now. Otherwise it is closed and a new
    /// instance is created. A credential change always replaces the
    /// instance, even one that is still connected.
    ///
    /// Must be called within a Tokio runtime.
    pub fn get_connection(&mut self) -> Connection {
        let credential = read_credential(self.storage.as_ref());

        if let Some(conn) = &self.current {
            if conn.is_reusable() && conn.credential() == credential {
                return conn.clone();
            }
        }

        if let Some(old) = self.current.take() {
            if old.credential() != credential {
                tracing::info!(instance = %old.instance_id(), "credential changed, replacing connection");
            } else {
                tracing::debug!(instance = %old.instance_id(), state = ?old.state(), "replacing stale connection");
            }
            old.close();
        }

        let conn = Connection::open(credential, &self.options);
        tracing::debug!(instance = %conn.instance_id(), url = %self.backend_url(), "created connection");
        self.current = Some(conn.clone());
        conn
    }

    /// Server-assigned session id, or `""` when no instance is connected.
    pub fn get_connection_id(&self) -> String {
        self.current
            .as_ref()
            .and_then(Connection::id)
            .unwrap_or_default()
    }

    /// Close and forget the held instance and its bound credential.
    /// Safe to call when nothing is held.
    pub fn disconnect(&mut self) {
        if let Some(conn) = self.current.take() {
            conn.close();
            tracing::info!(instance = %conn.instance_id(), "disconnected manually");
        }
    }

    /// Credential the held instance was created with.
    pub fn bound_credential(&self) -> Option<&str> {
        self.current.as_ref().map(Connection::credential)
    }

    /// The held instance, without any reuse check.
    pub fn current(&self) -> Option<&Connection> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_session::{store_credential, CREDENTIAL_STORAGE_KEY};
    use crate::storage::MemoryStorage;
    use crate::ws::connection::ConnectionState;
    use crate::ws::testing::{
        as_transports, endpoint, wait_for, Outcome, RecordingObserver, ScriptedTransport,
    };
    use jbchat_shared::{DisconnectReason, TransportKind};

    struct Fixture {
        storage: Arc<dyn Storage>,
        ws: Arc<ScriptedTransport>,
        manager: ConnectionManager,
    }

    fn fixture(script: Vec<Outcome>) -> Fixture {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let ws = ScriptedTransport::new(TransportKind::Websocket, script);
        let options = ConnectionOptions::new(endpoint())
            .with_transports(as_transports(&[&ws]))
            .with_observer(Arc::new(RecordingObserver::default()));
        let manager = ConnectionManager::new(storage.clone(), options);
        Fixture {
            storage,
            ws,
            manager,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_connected_instance_with_same_credential() {
        let mut f = fixture(vec![]);
        store_credential(f.storage.as_ref(), "jwt-a").unwrap();

        let first = f.manager.get_connection();
        wait_for(&first, ConnectionState::is_connected).await;
        let id = f.manager.get_connection_id();

        let second = f.manager.get_connection();
        assert!(first.same_instance(&second));
        assert_eq!(first.instance_id(), second.instance_id());
        assert_eq!(f.manager.get_connection_id(), id);
        assert_eq!(f.ws.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_calls_share_the_pending_instance() {
        let mut f = fixture(vec![]);
        store_credential(f.storage.as_ref(), "jwt-a").unwrap();

        let first = f.manager.get_connection();
        let second = f.manager.get_connection();
        assert!(first.same_instance(&second));

        wait_for(&second, ConnectionState::is_connected).await;
        assert_eq!(f.ws.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn credential_change_replaces_connected_instance() {
        let mut f = fixture(vec![]);
        store_credential(f.storage.as_ref(), "jwt-a").unwrap();

        let first = f.manager.get_connection();
        wait_for(&first, ConnectionState::is_connected).await;

        store_credential(f.storage.as_ref(), "jwt-b").unwrap();
        let second = f.manager.get_connection();

        assert!(!first.same_instance(&second));
        assert_eq!(first.state(), ConnectionState::Closed);
        assert_eq!(second.credential(), "jwt-b");
        assert_eq!(f.manager.bound_credential(), Some("jwt-b"));

        wait_for(&second, ConnectionState::is_connected).await;
        assert_eq!(f.ws.credentials(), vec!["jwt-a".to_string(), "jwt-b".to_string()]);
        // the old link was dropped, not re-authenticated
        assert!(f.ws.server(0).recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_or_malformed_credential_reads_empty() {
        let mut f = fixture(vec![]);
        let conn = f.manager.get_connection();
        assert_eq!(conn.credential(), "");

        wait_for(&conn, ConnectionState::is_connected).await;
        f.storage
            .save_raw(CREDENTIAL_STORAGE_KEY, "{broken")
            .unwrap();
        let again = f.manager.get_connection();
        assert!(conn.same_instance(&again));
        assert_eq!(f.ws.credentials(), vec![String::new()]);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_then_get_creates_fresh_instance() {
        let mut f = fixture(vec![]);
        store_credential(f.storage.as_ref(), "jwt-a").unwrap();

        let first = f.manager.get_connection();
        wait_for(&first, ConnectionState::is_connected).await;

        f.manager.disconnect();
        assert!(f.manager.current().is_none());
        assert_eq!(f.manager.bound_credential(), None);
        assert_eq!(first.state(), ConnectionState::Closed);

        let second = f.manager.get_connection();
        assert!(!first.same_instance(&second));
        wait_for(&second, ConnectionState::is_connected).await;
        assert_eq!(f.ws.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_idempotent() {
        let mut f = fixture(vec![]);
        f.manager.disconnect();
        f.manager.disconnect();
        assert!(f.manager.current().is_none());

        let conn = f.manager.get_connection();
        f.manager.disconnect();
        f.manager.disconnect();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_abandons_in_flight_handshake() {
        let mut f = fixture(vec![Outcome::Hang]);
        let conn = f.manager.get_connection();
        while f.ws.open_count() == 0 {
            tokio::task::yield_now().await;
        }
        f.manager.disconnect();

        tokio::time::sleep(std::time::Duration::from_secs(120)).await;
        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(f.ws.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_id_is_empty_unless_connected() {
        let mut f = fixture(vec![Outcome::Accept("sid-42")]);
        assert_eq!(f.manager.get_connection_id(), "");

        let conn = f.manager.get_connection();
        assert_eq!(f.manager.get_connection_id(), "");

        wait_for(&conn, ConnectionState::is_connected).await;
        assert_eq!(f.manager.get_connection_id(), "sid-42");

        f.ws
            .server(0)
            .close(DisconnectReason::TransportClose("reset".into()));
        wait_for(&conn, |s| matches!(s, ConnectionState::Reconnecting { .. })).await;
        assert_eq!(f.manager.get_connection_id(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn non_live_instance_is_replaced_even_with_same_credential() {
        let mut f = fixture(vec![Outcome::Reject("expired")]);
        store_credential(f.storage.as_ref(), "jwt-a").unwrap();

        let first = f.manager.get_connection();
        wait_for(&first, ConnectionState::is_terminal).await;

        let second = f.manager.get_connection();
        assert!(!first.same_instance(&second));
        wait_for(&second, ConnectionState::is_connected).await;
        assert_eq!(f.ws.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnecting_instance_is_replaced() {
        let mut f = fixture(vec![Outcome::Accept("sid-1"), Outcome::Hang]);
        store_credential(f.storage.as_ref(), "jwt-a").unwrap();

        let first = f.manager.get_connection();
        wait_for(&first, ConnectionState::is_connected).await;
        f.ws
            .server(0)
            .close(DisconnectReason::TransportClose("reset".into()));
        wait_for(&first, |s| matches!(s, ConnectionState::Reconnecting { .. })).await;

        let second = f.manager.get_connection();
        assert!(!first.same_instance(&second));
        assert_eq!(first.state(), ConnectionState::Closed);
    }
}
