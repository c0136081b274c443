//! ProEdit Core - Foundation types for the timeline model
//!
//! This crate provides the types shared by every ProEdit crate:
//! - Tagged item ids (clip, composition, track, group) drawn from one id space
//! - The process-wide id allocator
//! - The common error type

pub mod error;
pub mod ids;

pub use error::{ProEditError, Result};
pub use ids::{bump_past, next_raw_id, ItemId};
