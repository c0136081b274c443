//! Primitive steps behind [`EditCommand`](crate::edit::EditCommand).
//!
//! Every primitive either succeeds completely or leaves the model as it
//! found it. Primitives notify views and refresh the duration; they never
//! touch the undo stack.

use proedit_core::{ItemId, ProEditError, Result};
use smallvec::smallvec;
use tracing::{error, trace};

use super::TimelineModel;
use crate::clip::{Clip, ClipSnapshot, ClipTiming};
use crate::composition::{ATrack, Composition, CompositionSnapshot};
use crate::engine::FieldLock;
use crate::groups::GroupOp;
use crate::item::{ItemBounds, Positioned, Resizable};
use crate::track::{TrackKind, TrackModel, TrackSettings, TrackSnapshot};
use crate::view::{ModelChange, Role};

impl TimelineModel {
    // ── Registration ────────────────────────────────────────────

    pub(crate) fn register_clip(&mut self, snapshot: &ClipSnapshot) -> Result<()> {
        let id = snapshot.id;
        if !id.is_clip() || self.clips.contains_key(&id) {
            return Err(ProEditError::InvalidParameter(format!("cannot register clip {id}")));
        }
        let clip = Clip::from_snapshot(snapshot, &self.engine)?;
        self.groups.create_leaf(id)?;
        self.context.register_timeline_clip(&snapshot.bin_id, self.uuid, id);
        self.clips.insert(id, clip);
        trace!(clip = %id, bin = %snapshot.bin_id, "registered clip");
        Ok(())
    }

    pub(crate) fn deregister_clip(&mut self, id: ItemId) -> Result<()> {
        let clip = self
            .clips
            .get(&id)
            .ok_or_else(|| ProEditError::NotFound(format!("no clip {id}")))?;
        if clip.current_track().is_some() {
            return Err(ProEditError::InvalidParameter(format!("{id} is still on a track")));
        }
        self.groups.destruct_leaf(id)?;
        if let Some(clip) = self.clips.remove(&id) {
            self.context.deregister_timeline_clip(clip.bin_id(), self.uuid, id);
        }
        trace!(clip = %id, "deregistered clip");
        Ok(())
    }

    pub(crate) fn register_composition(&mut self, snapshot: &CompositionSnapshot) -> Result<()> {
        let id = snapshot.id;
        if !id.is_composition() || self.compositions.contains_key(&id) {
            return Err(ProEditError::InvalidParameter(format!("cannot register composition {id}")));
        }
        let composition = Composition::from_snapshot(snapshot, &self.engine)?;
        self.groups.create_leaf(id)?;
        self.compositions.insert(id, composition);
        Ok(())
    }

    pub(crate) fn deregister_composition(&mut self, id: ItemId) -> Result<()> {
        let composition = self
            .compositions
            .get(&id)
            .ok_or_else(|| ProEditError::NotFound(format!("no composition {id}")))?;
        if composition.current_track().is_some() {
            return Err(ProEditError::InvalidParameter(format!("{id} is still on a track")));
        }
        self.groups.destruct_leaf(id)?;
        self.compositions.remove(&id);
        Ok(())
    }

    // ── Placement ───────────────────────────────────────────────

    pub(crate) fn insert_item(&mut self, track: ItemId, item: ItemId, position: i64) -> Result<()> {
        let index = self.require_track(track)?;
        if self.item_track(item).is_some() {
            return Err(ProEditError::InvalidParameter(format!("{item} is already on a track")));
        }
        match item {
            ItemId::Clip(_) => {
                let clip = self
                    .clips
                    .get_mut(&item)
                    .ok_or_else(|| ProEditError::NotFound(format!("no clip {item}")))?;
                self.tracks[index].insert_clip(clip, position, &mut self.snaps)?;
            }
            ItemId::Composition(_) => {
                let compo = self
                    .compositions
                    .get_mut(&item)
                    .ok_or_else(|| ProEditError::NotFound(format!("no composition {item}")))?;
                self.tracks[index].insert_composition(compo, position, &mut self.snaps)?;
                if let Err(err) = self.replant() {
                    self.undo_composition_insertion(index, item);
                    return Err(err);
                }
            }
            _ => {
                let msg = format!("{item} cannot be placed on a track");
                return Err(ProEditError::InvalidParameter(msg));
            }
        }
        self.after_insertion(index, item);
        Ok(())
    }

    /// Pull a composition back off its track after a failed replant.
    fn undo_composition_insertion(&mut self, index: usize, item: ItemId) {
        if let Some(compo) = self.compositions.get_mut(&item) {
            if let Err(err) = self.tracks[index].remove_composition(compo, &mut self.snaps) {
                error!(composition = %item, error = %err, "cannot undo composition insertion");
            }
        }
        if let Err(err) = self.replant() {
            error!(error = %err, "replanting after a failed insertion failed");
        }
    }

    pub(crate) fn remove_item(&mut self, track: ItemId, item: ItemId, position: i64) -> Result<()> {
        let index = self.require_track(track)?;
        let bounds = self.require_item(item)?.bounds();
        if self.item_track(item) != Some(track) || bounds.position != position {
            return Err(ProEditError::InvalidParameter(format!(
                "{item} is not at {position} on {track}"
            )));
        }
        let row = self.tracks[index].row_of(item);
        let audible_only = self.is_audio_item(item);
        match item {
            ItemId::Clip(_) => {
                if let Some(clip) = self.clips.get_mut(&item) {
                    self.tracks[index].remove_clip(clip, &mut self.snaps)?;
                }
            }
            ItemId::Composition(_) => {
                if let Some(compo) = self.compositions.get_mut(&item) {
                    self.tracks[index].remove_composition(compo, &mut self.snaps)?;
                }
                if let Err(err) = self.replant() {
                    if let Some(compo) = self.compositions.get_mut(&item) {
                        let track = &mut self.tracks[index];
                        if let Err(undo_err) =
                            track.insert_composition(compo, position, &mut self.snaps)
                        {
                            error!(
                                composition = %item,
                                error = %undo_err,
                                "cannot restore composition"
                            );
                        }
                    }
                    return Err(self.replant_after(err));
                }
            }
            _ => {
                let msg = format!("{item} cannot be placed on a track");
                return Err(ProEditError::InvalidParameter(msg));
            }
        }
        if let Some(row) = row {
            let parent = self.track_model_index(index);
            self.notify(ModelChange::RowsRemoved {
                parent: Some(parent),
                first: row,
                last: row,
            });
        }
        self.invalidate_range(index, audible_only, bounds.position, bounds.end());
        self.refresh_duration();
        Ok(())
    }

    pub(crate) fn resize_item(
        &mut self,
        item: ItemId,
        from: ItemBounds,
        to: ItemBounds,
    ) -> Result<()> {
        let current = self.require_item(item)?.bounds();
        if current != from {
            return Err(ProEditError::InvalidParameter(format!(
                "{item} bounds changed under a resize"
            )));
        }
        let track = self.item_track(item);
        let index = match track {
            Some(track) => Some(self.require_track(track)?),
            None => None,
        };
        match (item, index) {
            (ItemId::Clip(_), Some(index)) => {
                if let Some(clip) = self.clips.get_mut(&item) {
                    self.tracks[index].resize_clip(clip, to, &mut self.snaps)?;
                }
            }
            (ItemId::Clip(_), None) => {
                if let Some(clip) = self.clips.get_mut(&item) {
                    clip.apply_bounds(to)?;
                }
            }
            (ItemId::Composition(_), Some(index)) => {
                if let Some(compo) = self.compositions.get_mut(&item) {
                    self.tracks[index].resize_composition(compo, to, &mut self.snaps)?;
                }
            }
            (ItemId::Composition(_), None) => {
                if let Some(compo) = self.compositions.get_mut(&item) {
                    compo.apply_bounds(to)?;
                }
            }
            _ => return Err(ProEditError::InvalidParameter(format!("{item} cannot be resized"))),
        }
        if let Some(index) = index {
            self.notify_item_data(
                item,
                smallvec![Role::Start, Role::Duration, Role::InPoint, Role::OutPoint],
            );
            let audible_only = self.is_audio_item(item);
            let start = from.position.min(to.position);
            let end = from.end().max(to.end());
            self.invalidate_range(index, audible_only, start, end);
            self.refresh_duration();
        }
        Ok(())
    }

    pub(crate) fn set_clip_speed(
        &mut self,
        id: ItemId,
        from: &ClipTiming,
        to: &ClipTiming,
    ) -> Result<()> {
        if self.item_track(id).is_some() {
            return Err(ProEditError::InvalidParameter(format!(
                "{id} must leave its track to change speed"
            )));
        }
        let clip = self
            .clips
            .get_mut(&id)
            .ok_or_else(|| ProEditError::NotFound(format!("no clip {id}")))?;
        if clip.timing() != *from {
            return Err(ProEditError::InvalidParameter(format!(
                "{id} timing changed under a speed change"
            )));
        }
        clip.retime(*to, &self.engine)?;
        trace!(clip = %id, speed = to.speed, "clip retimed");
        Ok(())
    }

    pub(crate) fn set_a_track(
        &mut self,
        composition: ItemId,
        from: ATrack,
        to: ATrack,
    ) -> Result<()> {
        let compo = self
            .compositions
            .get_mut(&composition)
            .ok_or_else(|| ProEditError::NotFound(format!("no composition {composition}")))?;
        if compo.a_track() != from {
            return Err(ProEditError::InvalidParameter(format!(
                "{composition} A-track changed under an update"
            )));
        }
        compo.set_a_track(to);
        let planted = compo.current_track().is_some();
        if planted {
            if let Err(err) = self.replant() {
                if let Some(compo) = self.compositions.get_mut(&composition) {
                    compo.set_a_track(from);
                }
                return Err(self.replant_after(err));
            }
        }
        self.notify_item_data(composition, smallvec![Role::ItemATrack]);
        Ok(())
    }

    // ── Tracks ──────────────────────────────────────────────────

    pub(crate) fn insert_track(&mut self, snapshot: &TrackSnapshot, position: usize) -> Result<()> {
        if position > self.tracks.len() {
            return Err(ProEditError::InvalidParameter(format!(
                "track position {position} out of range"
            )));
        }
        if self.track_position(snapshot.id).is_some() {
            return Err(ProEditError::InvalidParameter(format!("{} already exists", snapshot.id)));
        }
        let track = TrackModel::new(snapshot, &self.engine, position + 1)?;
        self.tracks.insert(position, track);
        if let Err(err) = self.replant() {
            self.tracks.remove(position);
            return Err(self.replant_after(err));
        }
        if snapshot.settings.kind == TrackKind::Audio {
            self.context.register_mixer_track(snapshot.id, &snapshot.settings.name);
        }
        self.notify(ModelChange::RowsInserted {
            parent: None,
            first: position,
            last: position,
        });
        Ok(())
    }

    pub(crate) fn remove_track(&mut self, id: ItemId, position: usize) -> Result<()> {
        let index = self.require_track(id)?;
        if index != position {
            let msg = format!("{id} is not at position {position}");
            return Err(ProEditError::InvalidParameter(msg));
        }
        if !self.tracks[index].is_empty() {
            return Err(ProEditError::InvalidParameter(format!("{id} still holds items")));
        }
        let removed = self.tracks.remove(index);
        if let Err(err) = self.replant() {
            // The native track is gone; rebuild it in place.
            let snapshot = removed.snapshot();
            drop(removed);
            match TrackModel::new(&snapshot, &self.engine, index + 1) {
                Ok(track) => self.tracks.insert(index, track),
                Err(rebuild_err) => {
                    error!(track = %id, error = %rebuild_err, "cannot rebuild removed track")
                }
            }
            return Err(self.replant_after(err));
        }
        if removed.is_audio() {
            self.context.unregister_mixer_track(id);
        }
        drop(removed);
        self.notify(ModelChange::RowsRemoved {
            parent: None,
            first: index,
            last: index,
        });
        self.refresh_duration();
        Ok(())
    }

    pub(crate) fn update_track(
        &mut self,
        id: ItemId,
        from: &TrackSettings,
        to: &TrackSettings,
    ) -> Result<()> {
        let index = self.require_track(id)?;
        let track = &mut self.tracks[index];
        if track.settings() != from {
            let msg = format!("{id} settings changed under an update");
            return Err(ProEditError::InvalidParameter(msg));
        }
        if from.kind != to.kind {
            return Err(ProEditError::InvalidParameter(format!("cannot change the kind of {id}")));
        }
        track.set_settings(to.clone());
        let visibility_changed = from.hidden != to.hidden || from.muted != to.muted;
        let parent = self.track_model_index(index);
        self.notify(ModelChange::DataChanged {
            index: parent,
            roles: smallvec![
                Role::Name,
                Role::IsLocked,
                Role::IsMuted,
                Role::IsHidden,
                Role::Height,
                Role::EffectNames
            ],
        });
        if visibility_changed {
            if self.options().invalidate && to.kind == TrackKind::Video {
                let end = self.duration.max(self.tracks[index].duration());
                self.context.invalidate_monitor(0, end);
            }
            self.refresh_duration();
        }
        Ok(())
    }

    // ── Groups ──────────────────────────────────────────────────

    pub(crate) fn apply_group_op(&mut self, op: &GroupOp) -> Result<()> {
        self.groups.apply(op)?;
        if let GroupOp::SetParent { node, .. } = op {
            for leaf in self.groups.leaves(*node) {
                if self.item_track(leaf).is_some() {
                    self.notify_item_data(leaf, smallvec![Role::Grouped]);
                }
            }
        }
        Ok(())
    }

    // ── Engine field ────────────────────────────────────────────

    /// Re-plant every composition against its resolved A/B engine tracks.
    ///
    /// Engine track indices shift whenever a track is inserted or removed, so
    /// the whole field is rebuilt under one field lock.
    pub(crate) fn replant(&self) -> Result<()> {
        let _lock = FieldLock::new(self.engine.as_ref());
        let mut plan = Vec::with_capacity(self.compositions.len());
        for compo in self.compositions.values() {
            self.engine.unplant_transition(compo.transition())?;
            let Some(track) = compo.current_track() else {
                continue;
            };
            let Some(position) = self.track_position(track) else {
                continue;
            };
            let b_track = position + 1;
            let a_track = self.resolve_a_track(compo.a_track(), position);
            plan.push((a_track, b_track, compo.transition()));
        }
        // Deepest A-tracks first, then bottom-up B-tracks.
        plan.sort_by(|x, y| y.0.cmp(&x.0).then(x.1.cmp(&y.1)).then(x.2.cmp(&y.2)));
        for (a_track, b_track, transition) in plan {
            self.engine.plant_transition(transition, a_track, b_track)?;
        }
        Ok(())
    }

    /// Re-plant after a failed step was reverted. Keeps `err` unless the
    /// field cannot be rebuilt either.
    fn replant_after(&self, err: ProEditError) -> ProEditError {
        match self.replant() {
            Ok(()) => err,
            Err(replant_err) => {
                error!(error = %replant_err, "cannot replant compositions after a failed step");
                ProEditError::Engine(format!("{err}; replanting failed: {replant_err}"))
            }
        }
    }

    /// Engine index of the A-track for a composition on track `position`.
    pub(crate) fn resolve_a_track(&self, a_track: ATrack, position: usize) -> usize {
        let auto = || self.previous_video_track_pos(position).map_or(0, |p| p + 1);
        match a_track {
            ATrack::Background => 0,
            ATrack::Auto => auto(),
            ATrack::Track(id) => match self.track_position(id) {
                Some(p) if p < position => p + 1,
                _ => auto(),
            },
        }
    }

    // ── Notifications ───────────────────────────────────────────

    fn after_insertion(&mut self, index: usize, item: ItemId) {
        if let Some(row) = self.tracks[index].row_of(item) {
            let parent = self.track_model_index(index);
            self.notify(ModelChange::RowsInserted {
                parent: Some(parent),
                first: row,
                last: row,
            });
        }
        if let Some(bounds) = self.item_bounds(item) {
            let audible_only = self.is_audio_item(item);
            self.invalidate_range(index, audible_only, bounds.position, bounds.end());
        }
        self.refresh_duration();
    }

    /// Ask the monitor to refresh `[start, end)` if that range is visible.
    fn invalidate_range(&self, index: usize, audible_only: bool, start: i64, end: i64) {
        let track = &self.tracks[index];
        if self.options().invalidate && !audible_only && !track.is_audio() && !track.is_hidden() {
            self.context.invalidate_monitor(start, end);
        }
    }
}
