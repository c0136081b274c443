//! Composition items: a transition blending their track over an "A" track.

use std::sync::Arc;

use proedit_core::{ItemId, Result};
use serde::{Deserialize, Serialize};

use crate::engine::{EngineHandle, MediaEngine, RawHandle};
use crate::item::{ItemBounds, ItemCore, Positioned, Resizable};

/// The lower track a composition blends against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ATrack {
    /// Nearest video track below the composition, or the background.
    Auto,
    /// The black background track.
    Background,
    /// An explicit ("forced") user track.
    Track(ItemId),
}

impl ATrack {
    pub fn is_forced(self) -> bool {
        !matches!(self, Self::Auto)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionSnapshot {
    pub id: ItemId,
    /// Engine transition service, e.g. `"luma"` or `"composite"`.
    pub service: String,
    pub bounds: ItemBounds,
    pub a_track: ATrack,
}

#[derive(Debug)]
pub struct Composition {
    core: ItemCore,
    service: String,
    a_track: ATrack,
    transition: EngineHandle,
}

impl Composition {
    pub(crate) fn from_snapshot(
        snapshot: &CompositionSnapshot,
        engine: &Arc<dyn MediaEngine>,
    ) -> Result<Self> {
        let transition = EngineHandle::transition(engine, &snapshot.service)?;
        let bounds = snapshot.bounds;
        engine.set_transition_range(transition.raw(), bounds.position, bounds.end() - 1)?;
        Ok(Self {
            core: ItemCore::new(snapshot.id, bounds),
            service: snapshot.service.clone(),
            a_track: snapshot.a_track,
            transition,
        })
    }

    pub fn snapshot(&self) -> CompositionSnapshot {
        CompositionSnapshot {
            id: self.core.id(),
            service: self.service.clone(),
            bounds: self.core.bounds(),
            a_track: self.a_track,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn a_track(&self) -> ATrack {
        self.a_track
    }

    pub fn transition(&self) -> RawHandle {
        self.transition.raw()
    }

    pub(crate) fn set_a_track(&mut self, a_track: ATrack) {
        self.a_track = a_track;
    }

    /// Move the transition's frame range along with the item.
    pub(crate) fn apply_bounds(&mut self, bounds: ItemBounds) -> Result<()> {
        self.transition
            .engine()
            .set_transition_range(self.transition.raw(), bounds.position, bounds.end() - 1)?;
        self.core.set_bounds(bounds);
        Ok(())
    }

    pub(crate) fn sync_range(&self) -> Result<()> {
        let bounds = self.core.bounds();
        self.transition
            .engine()
            .set_transition_range(self.transition.raw(), bounds.position, bounds.end() - 1)
    }
}

impl Positioned for Composition {
    fn core(&self) -> &ItemCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ItemCore {
        &mut self.core
    }
}

impl Resizable for Composition {
    fn max_duration(&self) -> Option<i64> {
        None
    }
}
