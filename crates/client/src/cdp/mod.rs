//! CDP client core
//!
//! Core principle: single transport, multiplexed sessions.
//! Replies are matched by id, events fan out through the router.

pub mod client;
pub mod protocol;
pub mod router;
pub mod session;

pub use client::{Client, ConnectionState};
pub use protocol::{EventMessage, RequestId, SessionId, TargetId};
pub use router::{EventRouter, Listener, RawListener, Subscription, SubscriptionId};
pub use session::Session;
