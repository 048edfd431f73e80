//! jbchat - local session and realtime connection tool
//!
//! Commands:
//! - `status`: print the restored session (default)
//! - `sign-in <email> [admin|user]`: persist a local session
//! - `sign-out`: clear the persisted session
//! - `token <credential>`: store the bearer credential used by the connection
//! - `connect`: open a realtime connection, print its id, then disconnect

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use jbchat_client::auth_session::store_credential;
use jbchat_client::{ClientConfig, ConnectionManager, MemoryStorage, SessionStore, Storage};
use jbchat_shared::Role;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONNECT_WAIT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jbchat=debug,jbchat_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env();
    let storage: Arc<dyn Storage> = match config.file_storage() {
        Some(files) => {
            tracing::debug!(dir = %files.dir().display(), "using file storage");
            Arc::new(files)
        }
        None => {
            tracing::warn!("no storage directory available, session will not persist");
            Arc::new(MemoryStorage::new())
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("status");

    match command {
        "status" => {
            let session = SessionStore::open(storage, config.role_policy);
            print_session(&session);
        }
        "sign-in" => {
            let Some(email) = args.get(1) else {
                bail!("usage: jbchat sign-in <email> [admin|user]");
            };
            let role_override = match args.get(2) {
                Some(raw) => Some(raw.parse::<Role>().map_err(anyhow::Error::msg)?),
                None => None,
            };
            let mut session = SessionStore::open(storage, config.role_policy);
            session.sign_in(email, "", role_override)?;
            print_session(&session);
        }
        "sign-out" => {
            let mut session = SessionStore::open(storage, config.role_policy);
            session.sign_out()?;
            print_session(&session);
        }
        "token" => {
            let Some(token) = args.get(1) else {
                bail!("usage: jbchat token <credential>");
            };
            store_credential(storage.as_ref(), token).context("failed to store credential")?;
            println!("credential stored");
        }
        "connect" => connect(&config, storage).await?,
        other => bail!("unknown command: {}", other),
    }

    Ok(())
}

fn print_session(session: &SessionStore) {
    let state = session.state();
    match &state.user {
        Some(user) => println!(
            "signed in as {} ({})",
            user.email,
            state.role.map(|r| r.to_string()).unwrap_or_default()
        ),
        None => println!("signed out"),
    }
}

async fn connect(config: &ClientConfig, storage: Arc<dyn Storage>) -> anyhow::Result<()> {
    let mut manager = ConnectionManager::from_config(config, storage);
    tracing::info!(url = %manager.backend_url(), "connecting");

    let conn = manager.get_connection();
    let mut state = conn.subscribe_state();
    let settled = tokio::time::timeout(
        CONNECT_WAIT,
        state.wait_for(|s| s.is_connected() || s.is_terminal()),
    )
    .await
    .map(|waited| waited.map(|state| state.clone()));

    let outcome = match settled {
        Ok(Ok(state)) => state,
        Ok(Err(_)) => bail!("connection state channel closed"),
        Err(_) => conn.state(),
    };

    if outcome.is_connected() {
        println!("connected: {}", manager.get_connection_id());
    } else {
        println!("not connected: {:?}", outcome);
    }

    manager.disconnect();
    Ok(())
}
