//! Shared setup for the integration tests.

use std::sync::Arc;

use proedit_core::ItemId;
use proedit_timeline::{
    BinClipInfo, ClipKind, EditOptions, InMemoryContext, MemoryEngine, TimelineConfig,
    TimelineModel,
};

pub struct Fixture {
    pub engine: Arc<MemoryEngine>,
    pub context: Arc<InMemoryContext>,
    pub model: TimelineModel,
}

/// Bin clips: "av" (AudioVideo, 500), "v" (Video, 500), "a" (Audio, 500),
/// "still" (Image, 50).
pub fn fixture() -> Fixture {
    let engine = MemoryEngine::shared();
    let context = Arc::new(InMemoryContext::new());
    context.add_bin_clip("av", BinClipInfo::new("interview.mov", ClipKind::AudioVideo, 500));
    context.add_bin_clip("v", BinClipInfo::new("broll.mp4", ClipKind::Video, 500));
    context.add_bin_clip("a", BinClipInfo::new("score.wav", ClipKind::Audio, 500));
    context.add_bin_clip("still", BinClipInfo::new("logo.png", ClipKind::Image, 50));
    let model = TimelineModel::new(engine.clone(), context.clone(), TimelineConfig::default());
    Fixture { engine, context, model }
}

impl Fixture {
    /// A2 A1 V1 V2, bottom to top.
    pub fn standard_tracks(&mut self) -> [ItemId; 4] {
        let a2 = self.model.request_track_insertion(None, "A2", true).unwrap();
        let a1 = self.model.request_track_insertion(None, "A1", true).unwrap();
        let v1 = self.model.request_track_insertion(None, "V1", false).unwrap();
        let v2 = self.model.request_track_insertion(None, "V2", false).unwrap();
        [a2, a1, v1, v2]
    }

    /// Insert the first `length` frames of `bin` at `position`.
    pub fn insert(&mut self, bin: &str, length: i64, track: ItemId, position: i64) -> ItemId {
        let bin = format!("{bin}/0/{}", length - 1);
        self.model
            .request_clip_insertion(&bin, track, position, EditOptions::default())
            .unwrap()
    }

    pub fn check(&self) {
        self.model.check_consistency().unwrap();
    }

    /// Undo everything and verify the model ends up empty.
    pub fn unwind(&mut self) {
        while self.model.undo().unwrap() {
            self.check();
        }
        assert_eq!(self.model.tracks_count(), 0);
        assert_eq!(self.model.clip_ids().count(), 0);
        assert_eq!(self.engine.live_producers(), 0);
        assert_eq!(self.engine.live_transitions(), 0);
    }
}
