//! Capabilities the timeline borrows from the rest of the application.
//!
//! The model is handed one `TimelineContext` at construction and reaches the
//! media bin, the monitor and the audio mixer only through it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use parking_lot::Mutex;
use proedit_core::ItemId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::ClipKind;

/// What the timeline needs to know about a media-bin clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinClipInfo {
    pub name: String,
    /// Path or URL handed to the engine producer.
    pub resource: String,
    pub kind: ClipKind,
    /// Source length in frames.
    pub length: i64,
    /// False while the bin is still probing the media.
    #[serde(default = "default_ready")]
    pub ready: bool,
}

fn default_ready() -> bool {
    true
}

impl BinClipInfo {
    pub fn new(name: impl Into<String>, kind: ClipKind, length: i64) -> Self {
        let name = name.into();
        Self {
            resource: format!("{name}.media"),
            name,
            kind,
            length,
            ready: true,
        }
    }
}

pub trait TimelineContext: Send + Sync + fmt::Debug {
    fn bin_clip(&self, bin_id: &str) -> Option<BinClipInfo>;
    /// Record that `clip` on `timeline` uses the bin clip `bin_id`.
    fn register_timeline_clip(&self, bin_id: &str, timeline: Uuid, clip: ItemId);
    fn deregister_timeline_clip(&self, bin_id: &str, timeline: Uuid, clip: ItemId);
    /// Every (bin id, clip) pair the bin believes `timeline` holds.
    fn timeline_clips(&self, timeline: Uuid) -> Vec<(String, ItemId)>;
    /// Frames `[start, end)` must be re-rendered by the monitor.
    fn invalidate_monitor(&self, start: i64, end: i64);
    fn register_mixer_track(&self, track: ItemId, name: &str);
    fn unregister_mixer_track(&self, track: ItemId);
}

// ── In-memory context ───────────────────────────────────────────

#[derive(Debug, Default)]
struct ContextState {
    bin: HashMap<String, BinClipInfo>,
    registrations: HashMap<Uuid, BTreeSet<(String, ItemId)>>,
    invalidations: Vec<(i64, i64)>,
    mixer: BTreeMap<ItemId, String>,
}

/// Bin, monitor and mixer kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryContext {
    state: Mutex<ContextState>,
}

impl InMemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bin_clip(&self, bin_id: impl Into<String>, info: BinClipInfo) {
        self.state.lock().bin.insert(bin_id.into(), info);
    }

    pub fn set_ready(&self, bin_id: &str, ready: bool) {
        if let Some(info) = self.state.lock().bin.get_mut(bin_id) {
            info.ready = ready;
        }
    }

    /// Drain the monitor ranges invalidated since the last call.
    pub fn take_invalidations(&self) -> Vec<(i64, i64)> {
        std::mem::take(&mut self.state.lock().invalidations)
    }

    pub fn mixer_tracks(&self) -> Vec<(ItemId, String)> {
        self.state
            .lock()
            .mixer
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }

    /// Number of timeline clips using `bin_id`, over all timelines.
    pub fn usage_count(&self, bin_id: &str) -> usize {
        self.state
            .lock()
            .registrations
            .values()
            .flat_map(|set| set.iter())
            .filter(|(bin, _)| bin == bin_id)
            .count()
    }
}

impl TimelineContext for InMemoryContext {
    fn bin_clip(&self, bin_id: &str) -> Option<BinClipInfo> {
        self.state.lock().bin.get(bin_id).cloned()
    }

    fn register_timeline_clip(&self, bin_id: &str, timeline: Uuid, clip: ItemId) {
        self.state
            .lock()
            .registrations
            .entry(timeline)
            .or_default()
            .insert((bin_id.to_string(), clip));
    }

    fn deregister_timeline_clip(&self, bin_id: &str, timeline: Uuid, clip: ItemId) {
        let mut state = self.state.lock();
        if let Some(set) = state.registrations.get_mut(&timeline) {
            set.remove(&(bin_id.to_string(), clip));
        }
    }

    fn timeline_clips(&self, timeline: Uuid) -> Vec<(String, ItemId)> {
        self.state
            .lock()
            .registrations
            .get(&timeline)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn invalidate_monitor(&self, start: i64, end: i64) {
        self.state.lock().invalidations.push((start, end));
    }

    fn register_mixer_track(&self, track: ItemId, name: &str) {
        self.state.lock().mixer.insert(track, name.to_string());
    }

    fn unregister_mixer_track(&self, track: ItemId) {
        self.state.lock().mixer.remove(&track);
    }
}
