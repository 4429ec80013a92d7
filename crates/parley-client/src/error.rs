use thiserror::Error;

use parley_net::NetError;

/// Errors surfaced to the UI layer.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Rejected before any network call: a message needs text or images.
    #[error("Message needs text content or at least one image")]
    EmptyMessage,

    /// Rejected before any network call: group name missing.
    #[error("Group name must not be empty")]
    EmptyGroupName,

    /// Rejected before any network call: no members selected.
    #[error("Select at least one member")]
    NoMembers,

    /// A pull or mutation failed; carries the backend's message when
    /// available. Not retried by this layer.
    #[error(transparent)]
    Net(#[from] NetError),

    /// The push channel task is gone; the session must be restarted.
    #[error("Push channel is closed")]
    ChannelClosed,

    /// A store lock was poisoned by a panic.
    #[error("Session state lock poisoned")]
    StatePoisoned,
}
