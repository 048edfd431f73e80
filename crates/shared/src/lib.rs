//! Shared types for the jbchat client and the event server it talks to.

pub mod models;
pub mod protocol;
pub mod error;

pub use models::*;
pub use protocol::*;
pub use error::*;
