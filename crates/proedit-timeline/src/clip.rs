//! Clip items: a cropped piece of bin media placed on a track.

use std::sync::Arc;

use proedit_core::{ItemId, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{EngineHandle, MediaEngine, RawHandle};
use crate::item::{ItemBounds, ItemCore, Positioned, Resizable};

/// What kind of media a bin clip holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    Audio,
    Video,
    AudioVideo,
    Image,
    Color,
}

impl ClipKind {
    pub fn can_be_audio(self) -> bool {
        matches!(self, Self::Audio | Self::AudioVideo)
    }

    pub fn can_be_video(self) -> bool {
        !matches!(self, Self::Audio)
    }

    /// Stills and generators can be stretched to any length.
    pub fn is_endless(self) -> bool {
        matches!(self, Self::Image | Self::Color)
    }
}

/// Which stream of its source a clip plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistState {
    VideoOnly,
    AudioOnly,
    Disabled,
}

impl PlaylistState {
    pub fn is_audio(self) -> bool {
        self == Self::AudioOnly
    }
}

/// Everything needed to rebuild a clip, engine producer included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSnapshot {
    pub id: ItemId,
    pub bin_id: String,
    pub name: String,
    pub resource: String,
    pub kind: ClipKind,
    pub state: PlaylistState,
    pub bounds: ItemBounds,
    /// Source length in frames.
    pub max_duration: i64,
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default)]
    pub effects: Vec<String>,
}

fn default_speed() -> f64 {
    1.0
}

/// Frames a source of `source` frames lasts when played at `speed`.
fn warped_length(source: i64, speed: f64) -> i64 {
    ((source as f64 / speed).floor() as i64).max(1)
}

/// Playback speed together with the crop it was applied with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClipTiming {
    pub speed: f64,
    pub bounds: ItemBounds,
}

/// A clip registered on the timeline.
#[derive(Debug)]
pub struct Clip {
    core: ItemCore,
    bin_id: String,
    name: String,
    resource: String,
    kind: ClipKind,
    state: PlaylistState,
    max_duration: i64,
    speed: f64,
    effects: Vec<String>,
    producer: EngineHandle,
}

impl Clip {
    /// Build the clip and its cropped engine producer.
    pub(crate) fn from_snapshot(
        snapshot: &ClipSnapshot,
        engine: &Arc<dyn MediaEngine>,
    ) -> Result<Self> {
        let length = warped_length(snapshot.max_duration, snapshot.speed);
        let producer = EngineHandle::producer(engine, &snapshot.resource, length)?;
        engine.set_in_out(producer.raw(), snapshot.bounds.in_point, snapshot.bounds.out_point)?;
        Ok(Self {
            core: ItemCore::new(snapshot.id, snapshot.bounds),
            bin_id: snapshot.bin_id.clone(),
            name: snapshot.name.clone(),
            resource: snapshot.resource.clone(),
            kind: snapshot.kind,
            state: snapshot.state,
            max_duration: snapshot.max_duration,
            speed: snapshot.speed,
            effects: snapshot.effects.clone(),
            producer,
        })
    }

    pub fn snapshot(&self) -> ClipSnapshot {
        ClipSnapshot {
            id: self.core.id(),
            bin_id: self.bin_id.clone(),
            name: self.name.clone(),
            resource: self.resource.clone(),
            kind: self.kind,
            state: self.state,
            bounds: self.core.bounds(),
            max_duration: self.max_duration,
            speed: self.speed,
            effects: self.effects.clone(),
        }
    }

    pub fn bin_id(&self) -> &str {
        &self.bin_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn kind(&self) -> ClipKind {
        self.kind
    }

    pub fn state(&self) -> PlaylistState {
        self.state
    }

    pub fn is_audio_only(&self) -> bool {
        self.state.is_audio()
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn effects(&self) -> &[String] {
        &self.effects
    }

    pub fn source_length(&self) -> i64 {
        self.max_duration
    }

    /// Source length at the current speed.
    pub fn playable_length(&self) -> i64 {
        warped_length(self.max_duration, self.speed)
    }

    pub fn timing(&self) -> ClipTiming {
        ClipTiming {
            speed: self.speed,
            bounds: self.core.bounds(),
        }
    }

    /// Bounds the clip would have at `speed`, keeping the same stretch of
    /// source where it can.
    pub fn timing_at(&self, speed: f64) -> ClipTiming {
        let ratio = self.speed / speed;
        let bounds = self.core.bounds();
        let available = warped_length(self.max_duration, speed);
        let in_point = ((bounds.in_point as f64 * ratio).round() as i64).clamp(0, available - 1);
        let playtime =
            ((bounds.playtime() as f64 * ratio).round() as i64).clamp(1, available - in_point);
        ClipTiming {
            speed,
            bounds: ItemBounds::new(bounds.position, in_point, in_point + playtime - 1),
        }
    }

    /// Swap in a producer warped to `to.speed`. The clip must be off its
    /// track, since the engine playlist still holds the old producer.
    pub(crate) fn retime(&mut self, to: ClipTiming, engine: &Arc<dyn MediaEngine>) -> Result<()> {
        let length = warped_length(self.max_duration, to.speed);
        let producer = EngineHandle::producer(engine, &self.resource, length)?;
        engine.set_in_out(producer.raw(), to.bounds.in_point, to.bounds.out_point)?;
        self.producer = producer;
        self.speed = to.speed;
        self.core.set_bounds(to.bounds);
        Ok(())
    }

    pub fn producer(&self) -> RawHandle {
        self.producer.raw()
    }

    /// Crop the producer, then adopt the new bounds.
    pub(crate) fn apply_bounds(&mut self, bounds: ItemBounds) -> Result<()> {
        self.producer
            .engine()
            .set_in_out(self.producer.raw(), bounds.in_point, bounds.out_point)?;
        self.core.set_bounds(bounds);
        Ok(())
    }
}

impl Positioned for Clip {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }
}

impl Resizable for Clip {
    fn max_duration(&self) -> Option<i64> {
        (!self.kind.is_endless()).then(|| self.playable_length())
    }
}
