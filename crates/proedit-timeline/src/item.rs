//! State shared by everything that can sit on a track.
//!
//! Clips and compositions both embed an [`ItemCore`] and implement
//! [`Positioned`] + [`Resizable`]; [`MoveableItem`] is the blanket union the
//! timeline works with when it does not care which kind it holds.

use proedit_core::ItemId;
use serde::{Deserialize, Serialize};

/// Where an item sits and which part of its source it shows.
///
/// `out_point` is inclusive, so an item plays `out_point - in_point + 1`
/// frames starting at `position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemBounds {
    pub position: i64,
    pub in_point: i64,
    pub out_point: i64,
}

impl ItemBounds {
    pub fn new(position: i64, in_point: i64, out_point: i64) -> Self {
        Self {
            position,
            in_point,
            out_point,
        }
    }

    /// Bounds showing the first `length` frames of a source.
    pub fn with_length(position: i64, length: i64) -> Self {
        Self::new(position, 0, length - 1)
    }

    pub fn playtime(&self) -> i64 {
        self.out_point - self.in_point + 1
    }

    /// First frame after the item.
    pub fn end(&self) -> i64 {
        self.position.saturating_add(self.playtime())
    }

    /// Bounds after resizing to `size` frames at the right (`out`) or left
    /// (`in`) edge.
    ///
    /// `max_duration` is the source length; `None` marks an endless item
    /// whose crop is rebased to `[0, size - 1]`.
    pub fn resized(&self, size: i64, right: bool, max_duration: Option<i64>) -> Option<Self> {
        if size <= 0 {
            return None;
        }
        let delta = self.playtime() - size;
        if delta == 0 {
            return Some(*self);
        }
        let position = if right { self.position } else { self.position.checked_add(delta)? };
        match max_duration {
            None => Some(Self::new(position, 0, size - 1)),
            Some(max) => {
                if size > max {
                    return None;
                }
                let (mut in_point, mut out_point) = (self.in_point, self.out_point);
                if right {
                    out_point -= delta;
                } else {
                    in_point += delta;
                }
                (in_point >= 0 && out_point < max).then(|| Self::new(position, in_point, out_point))
            }
        }
    }
}

/// Identity, placement and UI flags of a track item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemCore {
    id: ItemId,
    track: Option<ItemId>,
    bounds: ItemBounds,
    grabbed: bool,
    selected: bool,
}

impl ItemCore {
    pub fn new(id: ItemId, bounds: ItemBounds) -> Self {
        Self {
            id,
            track: None,
            bounds,
            grabbed: false,
            selected: false,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn track(&self) -> Option<ItemId> {
        self.track
    }

    pub fn bounds(&self) -> ItemBounds {
        self.bounds
    }

    pub fn grabbed(&self) -> bool {
        self.grabbed
    }

    pub fn selected(&self) -> bool {
        self.selected
    }

    pub fn set_grabbed(&mut self, grabbed: bool) {
        self.grabbed = grabbed;
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.selected = selected;
    }

    // Only track insertion/removal moves an item.

    pub(crate) fn attach(&mut self, track: ItemId, position: i64) {
        self.track = Some(track);
        self.bounds.position = position;
    }

    pub(crate) fn detach(&mut self) {
        self.track = None;
    }

    pub(crate) fn set_bounds(&mut self, bounds: ItemBounds) {
        self.bounds = bounds;
    }
}

/// Anything with an id and a place on the timeline.
pub trait Positioned {
    fn core(&self) -> &ItemCore;
    fn core_mut(&mut self) -> &mut ItemCore;

    fn id(&self) -> ItemId {
        self.core().id()
    }

    /// Meaningful only while [`current_track`](Self::current_track) is set.
    fn position(&self) -> i64 {
        self.core().bounds().position
    }

    fn current_track(&self) -> Option<ItemId> {
        self.core().track()
    }

    fn is_grabbed(&self) -> bool {
        self.core().grabbed()
    }

    fn is_selected(&self) -> bool {
        self.core().selected()
    }
}

/// Items whose visible range can be cropped.
pub trait Resizable: Positioned {
    /// Source length, or `None` for endless items.
    fn max_duration(&self) -> Option<i64>;

    fn bounds(&self) -> ItemBounds {
        self.core().bounds()
    }

    fn in_point(&self) -> i64 {
        self.bounds().in_point
    }

    fn out_point(&self) -> i64 {
        self.bounds().out_point
    }

    fn playtime(&self) -> i64 {
        self.bounds().playtime()
    }

    fn end(&self) -> i64 {
        self.bounds().end()
    }

    /// Bounds for a resize to `size`, or `None` if the source cannot provide it.
    fn resized_bounds(&self, size: i64, right: bool) -> Option<ItemBounds> {
        self.bounds().resized(size, right, self.max_duration())
    }
}

/// Marker for the full clip/composition contract.
pub trait MoveableItem: Resizable {}

impl<T: Resizable> MoveableItem for T {}
