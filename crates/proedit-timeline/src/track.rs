//! Per-track item layout.
//!
//! A track keeps two position-ordered maps: clips (mirrored one to one into
//! the native playlist) and compositions (planted in the engine field, so
//! they may overlap clips but never each other). The track only stores ids
//! and lengths; the items themselves live in the timeline.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use proedit_core::{ItemId, ProEditError, Result};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::clip::{Clip, PlaylistState};
use crate::composition::Composition;
use crate::engine::{EngineHandle, MediaEngine, RawHandle};
use crate::item::{ItemBounds, Positioned, Resizable};
use crate::snap::SnapModel;

/// Kind of track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    Video,
    Audio,
}

/// User-editable track metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSettings {
    /// Track name
    pub name: String,
    /// Track kind
    pub kind: TrackKind,
    /// Is track locked (prevent edits)
    #[serde(default)]
    pub locked: bool,
    /// Is track muted (audio) / excluded from duration
    #[serde(default)]
    pub muted: bool,
    /// Is track hidden (video)
    #[serde(default)]
    pub hidden: bool,
    /// Display height in pixels
    pub height: u32,
    /// Names of the effects on the track stack
    #[serde(default)]
    pub effects: Vec<String>,
}

impl TrackSettings {
    pub fn new(name: impl Into<String>, kind: TrackKind, height: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            locked: false,
            muted: false,
            hidden: false,
            height,
            effects: Vec::new(),
        }
    }

    /// Copy of these settings with one property replaced.
    pub fn with(&self, property: TrackProperty) -> Self {
        let mut next = self.clone();
        match property {
            TrackProperty::Name(name) => next.name = name,
            TrackProperty::Locked(locked) => next.locked = locked,
            TrackProperty::Muted(muted) => next.muted = muted,
            TrackProperty::Hidden(hidden) => next.hidden = hidden,
            TrackProperty::Height(height) => next.height = height,
            TrackProperty::Effects(effects) => next.effects = effects,
        }
        next
    }

    /// Whether the track's content counts towards the timeline duration.
    pub fn contributes_duration(&self) -> bool {
        match self.kind {
            TrackKind::Audio => !self.muted,
            TrackKind::Video => !self.hidden,
        }
    }
}

/// One change to a track's settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackProperty {
    Name(String),
    Locked(bool),
    Muted(bool),
    Hidden(bool),
    Height(u32),
    Effects(Vec<String>),
}

/// Enough to recreate an empty track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: ItemId,
    pub settings: TrackSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    id: ItemId,
    length: i64,
}

impl Slot {
    fn end(&self, start: i64) -> i64 {
        start.saturating_add(self.length)
    }
}

/// Ordered, non-overlapping content of one track.
#[derive(Debug)]
pub struct TrackModel {
    id: ItemId,
    settings: TrackSettings,
    clips: BTreeMap<i64, Slot>,
    compositions: BTreeMap<i64, Slot>,
    /// Item id → start, for both maps.
    starts: HashMap<ItemId, i64>,
    /// Row order for views: clips by id, then compositions by id.
    rows: BTreeSet<ItemId>,
    native: EngineHandle,
}

impl TrackModel {
    /// Create the track together with its native counterpart at `engine_index`.
    pub(crate) fn new(
        snapshot: &TrackSnapshot,
        engine: &Arc<dyn MediaEngine>,
        engine_index: usize,
    ) -> Result<Self> {
        let audio = snapshot.settings.kind == TrackKind::Audio;
        let native = EngineHandle::track(engine, engine_index, audio)?;
        Ok(Self {
            id: snapshot.id,
            settings: snapshot.settings.clone(),
            clips: BTreeMap::new(),
            compositions: BTreeMap::new(),
            starts: HashMap::new(),
            rows: BTreeSet::new(),
            native,
        })
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn settings(&self) -> &TrackSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> TrackSnapshot {
        TrackSnapshot {
            id: self.id,
            settings: self.settings.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn kind(&self) -> TrackKind {
        self.settings.kind
    }

    pub fn is_audio(&self) -> bool {
        self.settings.kind == TrackKind::Audio
    }

    pub fn is_locked(&self) -> bool {
        self.settings.locked
    }

    pub fn is_hidden(&self) -> bool {
        self.settings.hidden
    }

    pub fn is_muted(&self) -> bool {
        self.settings.muted
    }

    pub fn native(&self) -> RawHandle {
        self.native.raw()
    }

    pub(crate) fn set_settings(&mut self, settings: TrackSettings) {
        self.settings = settings;
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub fn composition_count(&self) -> usize {
        self.compositions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.starts.contains_key(&id)
    }

    /// Clips as (start, id), in position order.
    pub fn clips(&self) -> impl Iterator<Item = (i64, ItemId)> + '_ {
        self.clips.iter().map(|(pos, slot)| (*pos, slot.id))
    }

    /// Compositions as (start, id), in position order.
    pub fn compositions(&self) -> impl Iterator<Item = (i64, ItemId)> + '_ {
        self.compositions.iter().map(|(pos, slot)| (*pos, slot.id))
    }

    // ── Space queries ───────────────────────────────────────────

    fn is_free(map: &BTreeMap<i64, Slot>, position: i64, length: i64, ignore: &[ItemId]) -> bool {
        // A range past the end of the frame scale never fits.
        let Some(end) = position.checked_add(length) else {
            return false;
        };
        // Items never overlap each other, so only neighbours of the range can clash;
        // still walk the whole range to skip ignored ones.
        let before = map
            .range(..position)
            .rev()
            .find(|(_, slot)| !ignore.contains(&slot.id))
            .is_some_and(|(start, slot)| slot.end(*start) > position);
        let inside = map
            .range(position..end)
            .any(|(_, slot)| !ignore.contains(&slot.id));
        !before && !inside
    }

    /// True if `[position, position + length)` holds no clip except `ignore`.
    pub fn is_available(&self, position: i64, length: i64, ignore: &[ItemId]) -> bool {
        position >= 0 && Self::is_free(&self.clips, position, length, ignore)
    }

    pub fn is_composition_available(&self, position: i64, length: i64, ignore: &[ItemId]) -> bool {
        position >= 0 && Self::is_free(&self.compositions, position, length, ignore)
    }

    /// Clip covering frame `position`.
    pub fn clip_at(&self, position: i64) -> Option<ItemId> {
        self.clips
            .range(..=position)
            .next_back()
            .filter(|(start, slot)| slot.end(**start) > position)
            .map(|(_, slot)| slot.id)
    }

    pub fn composition_at(&self, position: i64) -> Option<ItemId> {
        self.compositions
            .range(..=position)
            .next_back()
            .filter(|(start, slot)| slot.end(**start) > position)
            .map(|(_, slot)| slot.id)
    }

    pub fn clip_by_start(&self, position: i64) -> Option<ItemId> {
        self.clips.get(&position).map(|slot| slot.id)
    }

    pub fn composition_by_start(&self, position: i64) -> Option<ItemId> {
        self.compositions.get(&position).map(|slot| slot.id)
    }

    /// Items intersecting `[start, end)`; `end == None` means to the end.
    pub fn items_in_range(
        &self,
        start: i64,
        end: Option<i64>,
        with_compositions: bool,
    ) -> Vec<ItemId> {
        let hits = |map: &BTreeMap<i64, Slot>| -> Vec<ItemId> {
            map.iter()
                .filter(|(pos, slot)| slot.end(**pos) > start && end.map_or(true, |e| **pos < e))
                .map(|(_, slot)| slot.id)
                .collect()
        };
        let mut items = hits(&self.clips);
        if with_compositions {
            items.extend(hits(&self.compositions));
        }
        items
    }

    /// Start of the blank ending at or containing `position`: the end of the
    /// last clip starting before it, or 0. Inside a clip this is `position`.
    pub fn blank_start(&self, position: i64) -> i64 {
        self.clips
            .range(..position)
            .next_back()
            .map(|(start, slot)| slot.end(*start).min(position))
            .unwrap_or(0)
    }

    /// End (exclusive) of the blank containing `position`.
    pub fn blank_end(&self, position: i64) -> i64 {
        self.clips
            .range(position..)
            .next()
            .map(|(start, _)| *start)
            .unwrap_or(i64::MAX)
    }

    fn blank_near(map: &BTreeMap<i64, Slot>, start: i64, after: bool) -> Option<i64> {
        let slot = map.get(&start)?;
        if after {
            let end = slot.end(start);
            Some(
                map.range(end..)
                    .next()
                    .map(|(next, _)| next - end)
                    .unwrap_or(i64::MAX),
            )
        } else {
            Some(
                map.range(..start)
                    .next_back()
                    .map(|(prev, prev_slot)| start - prev_slot.end(*prev))
                    .unwrap_or(start),
            )
        }
    }

    /// Free frames right after (or before) clip `id`.
    ///
    /// After the last clip this is `i64::MAX`; before the first it is the
    /// clip's own position.
    pub fn blank_size_near_clip(&self, id: ItemId, after: bool) -> Option<i64> {
        let start = *self.starts.get(&id)?;
        Self::blank_near(&self.clips, start, after)
    }

    pub fn blank_size_near_composition(&self, id: ItemId, after: bool) -> Option<i64> {
        let start = *self.starts.get(&id)?;
        Self::blank_near(&self.compositions, start, after)
    }

    /// End of the last clip.
    pub fn duration(&self) -> i64 {
        self.clips
            .iter()
            .next_back()
            .map(|(start, slot)| slot.end(*start))
            .unwrap_or(0)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row_of(&self, id: ItemId) -> Option<usize> {
        self.rows.iter().position(|row| *row == id)
    }

    pub fn item_at_row(&self, row: usize) -> Option<ItemId> {
        self.rows.iter().nth(row).copied()
    }

    // ── Mutations ───────────────────────────────────────────────

    fn ensure_editable(&self) -> Result<()> {
        if self.settings.locked {
            return Err(ProEditError::TrackLocked(self.id));
        }
        Ok(())
    }

    /// Why `clip` cannot go to `position`, if it cannot.
    pub fn check_clip_insertion(&self, clip: &Clip, position: i64) -> Result<()> {
        self.ensure_editable()?;
        if position < 0 {
            return Err(ProEditError::Timeline(format!(
                "cannot insert {} at negative position {position}",
                clip.id()
            )));
        }
        let compatible = if self.is_audio() {
            clip.kind().can_be_audio() && clip.state() != PlaylistState::VideoOnly
        } else {
            clip.kind().can_be_video() && clip.state() != PlaylistState::AudioOnly
        };
        if !compatible {
            return Err(ProEditError::Timeline(format!(
                "{} cannot be placed on {:?} track {}",
                clip.id(),
                self.kind(),
                self.id
            )));
        }
        if !Self::is_free(&self.clips, position, clip.playtime(), &[]) {
            return Err(ProEditError::Timeline(format!(
                "{} overlaps an existing clip at {position} on {}",
                clip.id(),
                self.id
            )));
        }
        Ok(())
    }

    pub(crate) fn insert_clip(
        &mut self,
        clip: &mut Clip,
        position: i64,
        snaps: &mut SnapModel,
    ) -> Result<()> {
        self.check_clip_insertion(clip, position)?;
        let length = clip.playtime();
        self.native
            .engine()
            .playlist_insert(self.native.raw(), clip.producer(), position, length)?;
        let id = clip.id();
        self.clips.insert(position, Slot { id, length });
        self.starts.insert(id, position);
        self.rows.insert(id);
        snaps.add_point(position);
        snaps.add_point(position + length);
        clip.core_mut().attach(self.id, position);
        Ok(())
    }

    pub(crate) fn remove_clip(&mut self, clip: &mut Clip, snaps: &mut SnapModel) -> Result<()> {
        self.ensure_editable()?;
        let id = clip.id();
        let start = self
            .starts
            .get(&id)
            .copied()
            .filter(|start| self.clips.get(start).is_some_and(|slot| slot.id == id))
            .ok_or_else(|| ProEditError::NotFound(format!("{id} is not on {}", self.id)))?;
        self.native.engine().playlist_remove(self.native.raw(), start)?;
        if let Some(slot) = self.clips.remove(&start) {
            snaps.remove_point(start);
            snaps.remove_point(slot.end(start));
        }
        self.starts.remove(&id);
        self.rows.remove(&id);
        clip.core_mut().detach();
        Ok(())
    }

    fn restore_failed(id: ItemId, err: ProEditError, restore_err: ProEditError) -> ProEditError {
        error!(
            clip = %id,
            error = %restore_err,
            "cannot restore native playlist after failed resize"
        );
        ProEditError::Engine(format!("{err}; restoring {id} failed: {restore_err}"))
    }

    pub(crate) fn resize_clip(
        &mut self,
        clip: &mut Clip,
        to: ItemBounds,
        snaps: &mut SnapModel,
    ) -> Result<()> {
        self.ensure_editable()?;
        let id = clip.id();
        let from = clip.bounds();
        if self.starts.get(&id) != Some(&from.position) {
            return Err(ProEditError::NotFound(format!("{id} is not on {}", self.id)));
        }
        if to.position < 0 || !Self::is_free(&self.clips, to.position, to.playtime(), &[id]) {
            return Err(ProEditError::Timeline(format!(
                "resizing {id} to [{}, {}) collides on {}",
                to.position,
                to.end(),
                self.id
            )));
        }
        clip.apply_bounds(to)?;
        let engine = self.native.engine();
        let native = self.native.raw();
        let producer = clip.producer();
        if let Err(err) = engine.playlist_remove(native, from.position) {
            warn!(clip = %id, error = %err, "native playlist refused removal for resize");
            return match clip.apply_bounds(from) {
                Ok(()) => Err(err),
                Err(crop_err) => Err(Self::restore_failed(id, err, crop_err)),
            };
        }
        if let Err(err) = engine.playlist_insert(native, producer, to.position, to.playtime()) {
            warn!(clip = %id, error = %err, "native playlist refused resize, restoring");
            let restored = clip.apply_bounds(from).and_then(|_| {
                engine.playlist_insert(native, producer, from.position, from.playtime())
            });
            return match restored {
                Ok(()) => Err(err),
                Err(restore_err) => Err(Self::restore_failed(id, err, restore_err)),
            };
        }
        self.clips.remove(&from.position);
        self.clips.insert(
            to.position,
            Slot {
                id,
                length: to.playtime(),
            },
        );
        self.starts.insert(id, to.position);
        snaps.remove_point(from.position);
        snaps.remove_point(from.end());
        snaps.add_point(to.position);
        snaps.add_point(to.end());
        Ok(())
    }

    pub fn check_composition_insertion(&self, compo: &Composition, position: i64) -> Result<()> {
        self.ensure_editable()?;
        if self.is_audio() {
            return Err(ProEditError::Timeline(format!(
                "compositions cannot go on audio track {}",
                self.id
            )));
        }
        if position < 0 || !Self::is_free(&self.compositions, position, compo.playtime(), &[]) {
            return Err(ProEditError::Timeline(format!(
                "{} overlaps an existing composition at {position} on {}",
                compo.id(),
                self.id
            )));
        }
        Ok(())
    }

    pub(crate) fn insert_composition(
        &mut self,
        compo: &mut Composition,
        position: i64,
        snaps: &mut SnapModel,
    ) -> Result<()> {
        self.check_composition_insertion(compo, position)?;
        let id = compo.id();
        let length = compo.playtime();
        compo.core_mut().attach(self.id, position);
        compo.sync_range()?;
        self.compositions.insert(position, Slot { id, length });
        self.starts.insert(id, position);
        self.rows.insert(id);
        snaps.add_point(position);
        snaps.add_point(position + length);
        Ok(())
    }

    pub(crate) fn remove_composition(
        &mut self,
        compo: &mut Composition,
        snaps: &mut SnapModel,
    ) -> Result<()> {
        self.ensure_editable()?;
        let id = compo.id();
        let start = self
            .starts
            .get(&id)
            .copied()
            .ok_or_else(|| ProEditError::NotFound(format!("{id} is not on {}", self.id)))?;
        if let Some(slot) = self.compositions.remove(&start) {
            snaps.remove_point(start);
            snaps.remove_point(slot.end(start));
        }
        self.starts.remove(&id);
        self.rows.remove(&id);
        compo.core_mut().detach();
        Ok(())
    }

    pub(crate) fn resize_composition(
        &mut self,
        compo: &mut Composition,
        to: ItemBounds,
        snaps: &mut SnapModel,
    ) -> Result<()> {
        self.ensure_editable()?;
        let id = compo.id();
        let from = compo.bounds();
        if to.position < 0
            || !Self::is_free(&self.compositions, to.position, to.playtime(), &[id])
        {
            return Err(ProEditError::Timeline(format!("resizing {id} collides on {}", self.id)));
        }
        compo.apply_bounds(to)?;
        self.compositions.remove(&from.position);
        self.compositions.insert(
            to.position,
            Slot {
                id,
                length: to.playtime(),
            },
        );
        self.starts.insert(id, to.position);
        snaps.remove_point(from.position);
        snaps.remove_point(from.end());
        snaps.add_point(to.position);
        snaps.add_point(to.end());
        Ok(())
    }

    // ── Consistency ─────────────────────────────────────────────

    /// Check the track against the items it claims and the native playlist.
    pub fn check_consistency(
        &self,
        clips: &HashMap<ItemId, Clip>,
        compositions: &HashMap<ItemId, Composition>,
    ) -> Result<()> {
        let fail = |msg: String| Err(ProEditError::Consistency(format!("{}: {msg}", self.id)));

        let mut previous_end = i64::MIN;
        for (start, slot) in &self.clips {
            if *start < previous_end {
                return fail(format!("clip {} at {start} overlaps its predecessor", slot.id));
            }
            previous_end = slot.end(*start);
            let Some(clip) = clips.get(&slot.id) else {
                return fail(format!("unknown clip {}", slot.id));
            };
            if clip.current_track() != Some(self.id)
                || clip.position() != *start
                || clip.playtime() != slot.length
            {
                return fail(format!("clip {} disagrees with its slot", slot.id));
            }
            let crop = Some((clip.in_point(), clip.out_point()));
            if self.native.engine().in_out(clip.producer()) != crop {
                return fail(format!("clip {} crop differs from its producer", slot.id));
            }
        }

        let mut previous_end = i64::MIN;
        for (start, slot) in &self.compositions {
            if *start < previous_end {
                return fail(format!("composition {} at {start} overlaps its predecessor", slot.id));
            }
            previous_end = slot.end(*start);
            let Some(compo) = compositions.get(&slot.id) else {
                return fail(format!("unknown composition {}", slot.id));
            };
            if compo.current_track() != Some(self.id)
                || compo.position() != *start
                || compo.playtime() != slot.length
            {
                return fail(format!("composition {} disagrees with its slot", slot.id));
            }
        }

        let expected_rows: BTreeSet<ItemId> = self
            .clips
            .values()
            .chain(self.compositions.values())
            .map(|slot| slot.id)
            .collect();
        let placed = self.clip_count() + self.composition_count();
        if expected_rows != self.rows || self.starts.len() != placed || self.rows.len() != placed {
            return fail("row index out of sync".into());
        }

        let playlist = self.native.engine().playlist(self.native.raw())?;
        let mirrored = playlist.len() == self.clip_count()
            && playlist.iter().zip(&self.clips).all(|(entry, (start, slot))| {
                entry.position == *start
                    && entry.length == slot.length
                    && clips.get(&slot.id).map(|c| c.producer()) == Some(entry.producer)
            });
        if !mirrored {
            return fail("native playlist differs from the clip map".into());
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::{ClipKind, ClipSnapshot};
    use crate::engine::MemoryEngine;

    struct Fixture {
        memory: Arc<MemoryEngine>,
        engine: Arc<dyn MediaEngine>,
        track: TrackModel,
        snaps: SnapModel,
        clips: HashMap<ItemId, Clip>,
    }

    fn fixture(kind: TrackKind) -> Fixture {
        let memory = MemoryEngine::shared();
        let engine: Arc<dyn MediaEngine> = memory.clone();
        let snapshot = TrackSnapshot {
            id: ItemId::new_track(),
            settings: TrackSettings::new("V1", kind, 64),
        };
        let track = TrackModel::new(&snapshot, &engine, 1).unwrap();
        Fixture {
            memory,
            engine,
            track,
            snaps: SnapModel::new(),
            clips: HashMap::new(),
        }
    }

    fn make_clip(engine: &Arc<dyn MediaEngine>, kind: ClipKind, length: i64) -> Clip {
        let snapshot = ClipSnapshot {
            id: ItemId::new_clip(),
            bin_id: "1".into(),
            name: "clip".into(),
            resource: "clip.mp4".into(),
            kind,
            state: PlaylistState::VideoOnly,
            bounds: ItemBounds::with_length(0, length),
            max_duration: 500,
            speed: 1.0,
            effects: vec![],
        };
        Clip::from_snapshot(&snapshot, engine).unwrap()
    }

    impl Fixture {
        fn insert(&mut self, length: i64, position: i64) -> Result<ItemId> {
            let mut clip = make_clip(&self.engine, ClipKind::Video, length);
            let id = clip.id();
            self.track.insert_clip(&mut clip, position, &mut self.snaps)?;
            self.clips.insert(id, clip);
            Ok(id)
        }
    }

    #[test]
    fn test_insert_rejects_overlap() {
        let mut fx = fixture(TrackKind::Video);
        fx.insert(10, 0).unwrap();
        fx.insert(10, 20).unwrap();
        assert!(fx.insert(10, 5).is_err());
        assert!(fx.insert(11, 10).is_err());
        assert!(fx.insert(10, 10).is_ok());
        assert!(fx.insert(5, -5).is_err());
        assert_eq!(fx.snaps.count(10), 2);
        fx.track.check_consistency(&fx.clips, &HashMap::new()).unwrap();
    }

    #[test]
    fn test_insert_rejects_incompatible_kind() {
        let mut fx = fixture(TrackKind::Audio);
        let mut clip = make_clip(&fx.engine, ClipKind::Video, 10);
        let err = fx.track.insert_clip(&mut clip, 0, &mut fx.snaps).unwrap_err();
        assert!(err.is_infeasible());
        assert!(fx.snaps.is_empty());
        assert!(clip.current_track().is_none());
    }

    #[test]
    fn test_remove_is_mirror_of_insert() {
        let mut fx = fixture(TrackKind::Video);
        let id = fx.insert(10, 30).unwrap();
        let mut clip = fx.clips.remove(&id).unwrap();
        fx.track.remove_clip(&mut clip, &mut fx.snaps).unwrap();
        assert!(fx.snaps.is_empty());
        assert!(fx.track.is_empty());
        assert!(clip.current_track().is_none());
        assert!(fx.engine.playlist(fx.track.native()).unwrap().is_empty());
    }

    #[test]
    fn test_locked_track_refuses_edits() {
        let mut fx = fixture(TrackKind::Video);
        let id = fx.insert(10, 0).unwrap();
        let settings = fx.track.settings().with(TrackProperty::Locked(true));
        fx.track.set_settings(settings);
        assert!(matches!(fx.insert(5, 50), Err(ProEditError::TrackLocked(_))));
        let clip = fx.clips.get_mut(&id).unwrap();
        assert!(fx.track.remove_clip(clip, &mut fx.snaps).is_err());
    }

    #[test]
    fn test_blank_sizes() {
        let mut fx = fixture(TrackKind::Video);
        let a = fx.insert(10, 5).unwrap();
        let b = fx.insert(10, 30).unwrap();
        assert_eq!(fx.track.blank_size_near_clip(a, false), Some(5));
        assert_eq!(fx.track.blank_size_near_clip(a, true), Some(15));
        assert_eq!(fx.track.blank_size_near_clip(b, false), Some(15));
        assert_eq!(fx.track.blank_size_near_clip(b, true), Some(i64::MAX));
        assert_eq!(fx.track.blank_start(20), 15);
        assert_eq!(fx.track.blank_end(20), 30);
        assert_eq!(fx.track.duration(), 40);
    }

    #[test]
    fn test_resize_updates_snaps_and_playlist() {
        let mut fx = fixture(TrackKind::Video);
        let id = fx.insert(10, 0).unwrap();
        fx.insert(10, 20).unwrap();
        let clip = fx.clips.get_mut(&id).unwrap();
        let grown = clip.resized_bounds(20, true).unwrap();
        fx.track.resize_clip(clip, grown, &mut fx.snaps).unwrap();
        assert_eq!(fx.snaps.count(20), 2);
        assert!(!fx.snaps.contains(10));
        let too_big = clip.resized_bounds(21, true).unwrap();
        assert!(fx.track.resize_clip(clip, too_big, &mut fx.snaps).is_err());
        assert_eq!(clip.playtime(), 20);
        fx.track.check_consistency(&fx.clips, &HashMap::new()).unwrap();
    }

    #[test]
    fn test_range_past_frame_scale_is_refused() {
        let mut fx = fixture(TrackKind::Video);
        fx.insert(10, 0).unwrap();
        let err = fx.insert(10, i64::MAX - 3).unwrap_err();
        assert!(err.is_infeasible());
        assert_eq!(fx.track.clip_count(), 1);
        assert!(!fx.snaps.contains(i64::MAX - 3));
        assert!(fx.insert(3, i64::MAX - 3).is_ok());
        fx.track.check_consistency(&fx.clips, &HashMap::new()).unwrap();
    }

    #[test]
    fn test_failed_playlist_removal_leaves_resize_undone() {
        let mut fx = fixture(TrackKind::Video);
        let id = fx.insert(10, 0).unwrap();
        let clip = fx.clips.get_mut(&id).unwrap();
        let grown = clip.resized_bounds(15, true).unwrap();

        fx.memory.fail_next_playlist_remove();
        assert!(matches!(
            fx.track.resize_clip(clip, grown, &mut fx.snaps),
            Err(ProEditError::Engine(_))
        ));
        assert_eq!(clip.playtime(), 10);
        assert_eq!(fx.engine.playlist(fx.track.native()).unwrap().len(), 1);
        assert!(fx.snaps.contains(10));
        fx.track.check_consistency(&fx.clips, &HashMap::new()).unwrap();
    }

    #[test]
    fn test_failed_playlist_insert_restores_old_slot() {
        let mut fx = fixture(TrackKind::Video);
        let id = fx.insert(10, 0).unwrap();
        let clip = fx.clips.get_mut(&id).unwrap();
        let grown = clip.resized_bounds(15, true).unwrap();

        fx.memory.fail_playlist_inserts(1);
        let err = fx.track.resize_clip(clip, grown, &mut fx.snaps).unwrap_err();
        assert!(!err.to_string().contains("restoring"));
        let playlist = fx.engine.playlist(fx.track.native()).unwrap();
        assert_eq!((playlist[0].position, playlist[0].length), (0, 10));
        fx.track.check_consistency(&fx.clips, &HashMap::new()).unwrap();

        // The restore itself fails too.
        let clip = fx.clips.get_mut(&id).unwrap();
        fx.memory.fail_playlist_inserts(2);
        let err = fx.track.resize_clip(clip, grown, &mut fx.snaps).unwrap_err();
        assert!(matches!(&err, ProEditError::Engine(msg) if msg.contains("restoring")));
        assert_eq!(clip.playtime(), 10);
        assert!(fx.engine.playlist(fx.track.native()).unwrap().is_empty());
    }

    #[test]
    fn test_rows_order_clips_by_id() {
        let mut fx = fixture(TrackKind::Video);
        let first = fx.insert(10, 50).unwrap();
        let second = fx.insert(10, 0).unwrap();
        assert_eq!(fx.track.row_of(first), Some(0));
        assert_eq!(fx.track.row_of(second), Some(1));
        assert_eq!(fx.track.item_at_row(1), Some(second));
        assert_eq!(fx.track.items_in_range(5, Some(55), false), vec![second, first]);
    }
}
