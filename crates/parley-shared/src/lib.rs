//! # parley-shared
//!
//! Types shared between the networking, store, and client crates: identifier
//! newtypes, the domain models the backend serves, and the JSON wire protocol
//! spoken over the push channel.

pub mod models;
pub mod protocol;
pub mod types;

mod error;

pub use error::ProtocolError;
