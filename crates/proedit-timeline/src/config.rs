//! Timeline settings.

use std::path::Path;

use proedit_core::{ProEditError, Result};
use serde::{Deserialize, Serialize};

/// Tunables of a [`TimelineModel`](crate::TimelineModel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Snap radius in frames used when a request does not pass one.
    pub snap_distance: i64,
    /// Undo history depth.
    pub undo_depth: usize,
    /// Initial height of new video tracks.
    pub default_track_height: u32,
    /// Initial height of new audio tracks.
    pub audio_track_height: u32,
    /// Run `check_consistency` after every replayed step.
    pub check_consistency: bool,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            snap_distance: 10,
            undo_depth: 200,
            default_track_height: 64,
            audio_track_height: 48,
            check_consistency: false,
        }
    }
}

impl TimelineConfig {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| ProEditError::Serialization(format!("Invalid timeline config: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| ProEditError::Serialization(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn track_height(&self, audio: bool) -> u32 {
        if audio {
            self.audio_track_height
        } else {
            self.default_track_height
        }
    }
}
