//! relay-board/crates/rb-core/src/lib.rs
//!
//! The central domain types and port definitions for Relay-Board.

pub mod error;
pub mod events;
pub mod models;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exporting for easier access in other crates
pub use error::*;
pub use events::*;
pub use models::*;
pub use traits::*;
