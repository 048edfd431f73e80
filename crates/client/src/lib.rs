//! jbchat client - local session and realtime connection layer
//!
//! [`SessionStore`] keeps the signed-in identity and role on the client.
//! [`ConnectionManager`] keeps exactly one realtime connection to the event
//! server, bound to the credential currently in storage.

pub mod auth_session;
pub mod config;
pub mod storage;
pub mod ws;

pub use auth_session::{AuthState, SessionStore};
pub use config::{ClientConfig, RolePolicy};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use ws::{Connection, ConnectionManager, ConnectionState};
