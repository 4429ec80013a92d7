//! # parley-client
//!
//! The synchronization layer a chat UI renders from. A [`SyncCoordinator`]
//! owns the session's stores, routes push-channel events into them, and
//! exposes the pull/mutate operations; [`session::SyncSession`] assembles a
//! coordinator against the real backend for one authenticated session.
//!
//! The hard problem this crate solves is reconciling pulled snapshots with
//! pushed deltas into one consistent, de-duplicated local model, without
//! losing data on reconnect or race.

pub mod coordinator;
pub mod session;

mod error;

use tracing_subscriber::{fmt, EnvFilter};

pub use coordinator::SyncCoordinator;
pub use error::ClientError;
pub use session::{SessionConfig, SyncSession};

/// Install the global tracing subscriber for an embedding application.
///
/// Respects `RUST_LOG` when set; otherwise keeps the sync crates at debug
/// and everything else at warn.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parley_client=debug,parley_net=debug,parley_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
