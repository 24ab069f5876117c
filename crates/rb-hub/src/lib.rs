//! # rb-hub
//!
//! Live-feed fan-out for Relay-Board: one coordinator task owning the set of
//! connected viewers, and one delivery task per viewer draining its own
//! bounded queue into the transport.

pub mod hub;
pub mod session;

pub use hub::{Hub, HubError, HubHandle, DEFAULT_QUEUE_CAPACITY};
pub use session::{Frame, SessionHandle, SessionId, Transport};
