//! Tagged ids for timeline objects.
//!
//! Clips, compositions, tracks and groups share one monotonically increasing
//! id space, but the tag makes the kind of an id explicit so that
//! `is_clip`/`is_track`/... never depend on which map happens to hold it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh raw id. Never returns the same value twice per process.
pub fn next_raw_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Make sure later allocations are greater than `raw`.
///
/// Needed after ids are read back from disk.
pub fn bump_past(raw: u64) {
    NEXT_ID.fetch_max(raw.saturating_add(1), Ordering::Relaxed);
}

/// Identity of a timeline object.
///
/// Ordering is by kind first (clips, then compositions, tracks, groups) and
/// then by raw value, which is also the row order of items inside a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemId {
    Clip(u64),
    Composition(u64),
    Track(u64),
    Group(u64),
}

impl ItemId {
    pub fn new_clip() -> Self {
        Self::Clip(next_raw_id())
    }

    pub fn new_composition() -> Self {
        Self::Composition(next_raw_id())
    }

    pub fn new_track() -> Self {
        Self::Track(next_raw_id())
    }

    pub fn new_group() -> Self {
        Self::Group(next_raw_id())
    }

    /// The untagged value.
    pub fn raw(self) -> u64 {
        match self {
            Self::Clip(v) | Self::Composition(v) | Self::Track(v) | Self::Group(v) => v,
        }
    }

    pub fn is_clip(self) -> bool {
        matches!(self, Self::Clip(_))
    }

    pub fn is_composition(self) -> bool {
        matches!(self, Self::Composition(_))
    }

    pub fn is_track(self) -> bool {
        matches!(self, Self::Track(_))
    }

    pub fn is_group(self) -> bool {
        matches!(self, Self::Group(_))
    }

    /// Clips and compositions are the only ids that can sit on a track.
    pub fn is_item(self) -> bool {
        self.is_clip() || self.is_composition()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Clip(v) => write!(f, "clip#{v}"),
            Self::Composition(v) => write!(f, "composition#{v}"),
            Self::Track(v) => write!(f, "track#{v}"),
            Self::Group(v) => write!(f, "group#{v}"),
        }
    }
}
