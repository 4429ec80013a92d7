//! # parley-store
//!
//! In-memory session state: the ordered conversation list, the message
//! sequence of the active conversation, and the seen-acknowledgement ledger.
//!
//! Stores live for one authenticated session. They are created empty,
//! populated by the first pull, mutated by push events and confirmed sends,
//! and discarded on logout. Nothing here touches the network; all stores are
//! plain synchronous structures the coordinator serializes access to.

pub mod conversations;
pub mod messages;
pub mod seen;

pub use conversations::ConversationStore;
pub use messages::MessageStore;
pub use seen::SeenTracker;
