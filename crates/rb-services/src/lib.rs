//! # rb-services
//!
//! Lifecycle rules for messages and comments, and the background sweep that
//! retires expired comments.

pub mod board;
pub mod cleanup;

pub use board::{BoardPolicy, BoardService};
pub use cleanup::{CleanupScheduler, Sweeper, DEFAULT_CLEANUP_INTERVAL};
