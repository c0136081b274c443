//! History persistence with versioning and migration.
//!
//! A timeline is saved as the list of undo entries that built it. Loading
//! replays them on an empty model, which also restores the undo history.

use std::path::Path;

use proedit_core::{bump_past, ProEditError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::edit::UndoEntry;
use crate::timeline::TimelineModel;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Versioned history file wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryFile {
    /// Schema version for migration.
    pub version: u32,
    /// Identity of the timeline the history belongs to.
    pub timeline: Uuid,
    /// Executed requests, oldest first.
    pub entries: Vec<UndoEntry>,
    /// Application version that wrote this file.
    pub app_version: String,
}

impl HistoryFile {
    pub fn new(timeline: Uuid, entries: Vec<UndoEntry>) -> Self {
        Self {
            version: CURRENT_VERSION,
            timeline,
            entries,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| ProEditError::Serialization(format!("Failed to serialize history: {e}")))
    }

    /// Deserialize from JSON bytes, applying migrations if needed.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let raw: serde_json::Value = serde_json::from_slice(data)
            .map_err(|e| ProEditError::Serialization(format!("Invalid JSON: {e}")))?;

        let version = raw.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        if version > CURRENT_VERSION {
            return Err(ProEditError::Serialization(format!(
                "History file version {version} is newer than supported version {CURRENT_VERSION}"
            )));
        }

        let migrated = migrate(raw, version)?;
        serde_json::from_value(migrated)
            .map_err(|e| ProEditError::Serialization(format!("Failed to parse history: {e}")))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let data = self.to_json()?;
        std::fs::write(path, data)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    /// Largest raw id referenced by the history.
    pub fn max_raw_id(&self) -> u64 {
        self.entries
            .iter()
            .map(|entry| entry.command.max_raw_id())
            .max()
            .unwrap_or(0)
    }
}

/// Apply sequential migrations from `from_version` to CURRENT_VERSION.
fn migrate(mut data: serde_json::Value, from_version: u32) -> Result<serde_json::Value> {
    let mut version = from_version;

    while version < CURRENT_VERSION {
        match version {
            0 => {
                // v0 was a bare array of entries.
                if data.is_array() {
                    data = serde_json::json!({
                        "version": 1,
                        "timeline": Uuid::new_v4(),
                        "entries": data,
                        "app_version": "0.1.0",
                    });
                }
                version = 1;
            }
            _ => {
                return Err(ProEditError::Serialization(format!(
                    "No migration path from version {version}"
                )));
            }
        }
    }

    Ok(data)
}

impl TimelineModel {
    /// The history that rebuilds this timeline from scratch.
    pub fn export_history(&self) -> Result<HistoryFile> {
        if !self.undo_stack().is_complete() {
            return Err(ProEditError::Serialization(
                "undo history was trimmed and cannot rebuild the timeline".into(),
            ));
        }
        Ok(HistoryFile::new(self.uuid(), self.undo_stack().entries().cloned().collect()))
    }

    /// Rebuild an empty timeline from `history`, restoring its undo entries.
    ///
    /// On failure the entries replayed so far are kept; the error names the
    /// entry that could not be applied.
    pub fn replay_history(&mut self, history: &HistoryFile) -> Result<()> {
        if self.tracks_count() > 0
            || self.clip_ids().next().is_some()
            || self.undo_stack().can_undo()
        {
            return Err(ProEditError::InvalidParameter(
                "history can only be replayed on an empty timeline".into(),
            ));
        }
        bump_past(history.max_raw_id());
        for (step, entry) in history.entries.iter().enumerate() {
            entry.command.apply(self).map_err(|err| {
                ProEditError::Serialization(format!(
                    "history step {step} ({}) failed: {err}",
                    entry.label
                ))
            })?;
            self.push_history(entry.clone());
        }
        info!(timeline = %self.uuid(), steps = history.entries.len(), "history replayed");
        Ok(())
    }
}
