//! # relay-foundation
//!
//! Foundation layer for RelayCode. Every crate in the workspace reports
//! failures through this taxonomy so callers can match on a single enum
//! regardless of which layer produced the error.

pub mod error;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};
