//! The timeline aggregate.
//!
//! [`TimelineModel`] owns tracks, items, the group forest and the snap index,
//! and is the single entry point for every mutation. Each `request_*`
//! validates its arguments, applies primitive [`EditCommand`]s while
//! recording them in a [`Transaction`], and either pushes the transaction to
//! the undo stack or rolls it back. Callers never observe a partial edit.
//!
//! The request families live in submodules:
//! - `clips`: creation and insertion of clips
//! - `compositions`: composition insertion, moves and A-track planting
//! - `moves`: single item and group moves, move suggestions
//! - `resize`: snapped, group-aware resizing
//! - `grouping`: grouping, ungrouping and deletion
//! - `tracks`: track insertion, deletion and properties
//! - `selection`, `snapping`, `consistency`
//! - `primitives`: the low-level steps commands dispatch to

mod clips;
mod compositions;
mod consistency;
mod grouping;
mod moves;
mod primitives;
mod resize;
mod selection;
mod snapping;
mod tracks;

use std::collections::HashMap;
use std::sync::Arc;

use proedit_core::{ItemId, ProEditError, Result};
use tracing::{debug, error};
use uuid::Uuid;

use crate::clip::Clip;
use crate::composition::Composition;
use crate::config::TimelineConfig;
use crate::context::TimelineContext;
use crate::edit::{EditCommand, Transaction, UndoEntry, UndoStack};
use crate::engine::MediaEngine;
use crate::groups::GroupsModel;
use crate::item::{ItemBounds, Positioned, Resizable};
use crate::snap::SnapModel;
use crate::track::{TrackModel, TrackSettings};
use crate::view::{ModelChange, Notifier};

pub use clips::BinRef;

/// How a request treats the world outside the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditOptions {
    /// Emit change notifications to views.
    pub update_view: bool,
    /// Push the edit to the undo stack.
    pub log_undo: bool,
    /// Ask the monitor to refresh the touched range.
    pub invalidate: bool,
}

impl Default for EditOptions {
    fn default() -> Self {
        Self {
            update_view: true,
            log_undo: true,
            invalidate: true,
        }
    }
}

impl EditOptions {
    /// No notifications, no history, no monitor refresh. Used for dry runs.
    pub fn quiet() -> Self {
        Self {
            update_view: false,
            log_undo: false,
            invalidate: false,
        }
    }

    /// Visible edit that is kept out of the undo history.
    pub fn unlogged() -> Self {
        Self {
            log_undo: false,
            ..Self::default()
        }
    }
}

/// Aggregate root of one timeline.
#[derive(Debug)]
pub struct TimelineModel {
    uuid: Uuid,
    config: TimelineConfig,
    engine: Arc<dyn MediaEngine>,
    context: Arc<dyn TimelineContext>,
    // Items are declared before tracks so that their producers are released
    // before the native tracks that play them.
    clips: HashMap<ItemId, Clip>,
    compositions: HashMap<ItemId, Composition>,
    /// Bottom to top. Engine index is position + 1.
    tracks: Vec<TrackModel>,
    groups: GroupsModel,
    snaps: SnapModel,
    undo_stack: UndoStack,
    /// Root of the current selection: a single item or group, or a
    /// Selection group.
    selection: Option<ItemId>,
    notifier: Notifier,
    /// Options of the request being executed.
    options: EditOptions,
    duration: i64,
}

impl TimelineModel {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        context: Arc<dyn TimelineContext>,
        config: TimelineConfig,
    ) -> Self {
        Self::with_uuid(Uuid::new_v4(), engine, context, config)
    }

    /// Create a timeline that reuses a known identity (e.g. when replaying a
    /// saved history).
    pub fn with_uuid(
        uuid: Uuid,
        engine: Arc<dyn MediaEngine>,
        context: Arc<dyn TimelineContext>,
        config: TimelineConfig,
    ) -> Self {
        let undo_stack = UndoStack::new(config.undo_depth);
        Self {
            uuid,
            config,
            engine,
            context,
            clips: HashMap::new(),
            compositions: HashMap::new(),
            tracks: Vec::new(),
            groups: GroupsModel::new(),
            snaps: SnapModel::new(),
            undo_stack,
            selection: None,
            notifier: Notifier::default(),
            options: EditOptions::default(),
            duration: 0,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    pub fn context(&self) -> &Arc<dyn TimelineContext> {
        &self.context
    }

    pub fn groups(&self) -> &GroupsModel {
        &self.groups
    }

    pub fn snaps(&self) -> &SnapModel {
        &self.snaps
    }

    pub fn undo_stack(&self) -> &UndoStack {
        &self.undo_stack
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    // ── Tracks ──────────────────────────────────────────────────

    pub fn tracks_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self) -> &[TrackModel] {
        &self.tracks
    }

    pub fn track(&self, id: ItemId) -> Option<&TrackModel> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    pub fn track_position(&self, id: ItemId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id() == id)
    }

    pub fn track_id_at(&self, position: usize) -> Option<ItemId> {
        self.tracks.get(position).map(|t| t.id())
    }

    pub fn track_settings(&self, id: ItemId) -> Option<&TrackSettings> {
        self.track(id).map(|t| t.settings())
    }

    pub fn is_audio_track(&self, id: ItemId) -> bool {
        self.track(id).is_some_and(|t| t.is_audio())
    }

    pub(crate) fn require_track(&self, id: ItemId) -> Result<usize> {
        self.track_position(id)
            .ok_or_else(|| ProEditError::NotFound(format!("no track {id}")))
    }

    /// Position of the nearest video track below `position`.
    pub fn previous_video_track_pos(&self, position: usize) -> Option<usize> {
        self.tracks[..position.min(self.tracks.len())]
            .iter()
            .rposition(|t| !t.is_audio())
    }

    /// Audio track paired with video track `id`: walking down, each video
    /// track claims the next free audio track.
    pub fn mirror_audio_track(&self, id: ItemId) -> Option<ItemId> {
        let start = self.track_position(id)?;
        if self.tracks[start].is_audio() {
            return None;
        }
        let mut pending = 0usize;
        for track in self.tracks[..=start].iter().rev() {
            if track.is_audio() {
                pending -= 1;
                if pending == 0 {
                    return Some(track.id());
                }
            } else {
                pending += 1;
            }
        }
        None
    }

    /// Video track paired with audio track `id`.
    pub fn mirror_video_track(&self, id: ItemId) -> Option<ItemId> {
        let start = self.track_position(id)?;
        if !self.tracks[start].is_audio() {
            return None;
        }
        let mut pending = 0usize;
        for track in &self.tracks[start..] {
            if track.is_audio() {
                pending += 1;
            } else {
                pending -= 1;
                if pending == 0 {
                    return Some(track.id());
                }
            }
        }
        None
    }

    pub fn mirror_track(&self, id: ItemId) -> Option<ItemId> {
        if self.is_audio_track(id) {
            self.mirror_video_track(id)
        } else {
            self.mirror_audio_track(id)
        }
    }

    // ── Items ───────────────────────────────────────────────────

    pub fn clip(&self, id: ItemId) -> Option<&Clip> {
        self.clips.get(&id)
    }

    pub fn composition(&self, id: ItemId) -> Option<&Composition> {
        self.compositions.get(&id)
    }

    pub fn clip_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.clips.keys().copied()
    }

    pub fn composition_ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.compositions.keys().copied()
    }

    pub fn is_clip(&self, id: ItemId) -> bool {
        id.is_clip() && self.clips.contains_key(&id)
    }

    pub fn is_composition(&self, id: ItemId) -> bool {
        id.is_composition() && self.compositions.contains_key(&id)
    }

    pub fn is_track(&self, id: ItemId) -> bool {
        id.is_track() && self.track_position(id).is_some()
    }

    pub fn is_group(&self, id: ItemId) -> bool {
        id.is_group() && self.groups.contains(id)
    }

    pub fn is_item(&self, id: ItemId) -> bool {
        self.is_clip(id) || self.is_composition(id)
    }

    /// The item as its shared contract.
    pub(crate) fn item(&self, id: ItemId) -> Option<&dyn Resizable> {
        match id {
            ItemId::Clip(_) => self.clips.get(&id).map(|c| c as &dyn Resizable),
            ItemId::Composition(_) => self.compositions.get(&id).map(|c| c as &dyn Resizable),
            _ => None,
        }
    }

    pub(crate) fn require_item(&self, id: ItemId) -> Result<&dyn Resizable> {
        self.item(id)
            .ok_or_else(|| ProEditError::NotFound(format!("no clip or composition {id}")))
    }

    pub fn item_track(&self, id: ItemId) -> Option<ItemId> {
        self.item(id)?.current_track()
    }

    /// Position of an item that is on a track.
    pub fn item_position(&self, id: ItemId) -> Option<i64> {
        let item = self.item(id)?;
        item.current_track().map(|_| item.position())
    }

    pub fn item_playtime(&self, id: ItemId) -> Option<i64> {
        self.item(id).map(|i| i.playtime())
    }

    pub fn item_bounds(&self, id: ItemId) -> Option<ItemBounds> {
        self.item(id).map(|i| i.bounds())
    }

    /// Whether the item plays audio: an audio-only clip, or anything on an
    /// audio track.
    pub fn is_audio_item(&self, id: ItemId) -> bool {
        if let Some(clip) = self.clips.get(&id) {
            return clip.is_audio_only();
        }
        self.item_track(id).is_some_and(|t| self.is_audio_track(t))
    }

    pub fn clip_by_position(&self, track: ItemId, position: i64) -> Option<ItemId> {
        self.track(track)?.clip_at(position)
    }

    pub fn composition_by_position(&self, track: ItemId, position: i64) -> Option<ItemId> {
        self.track(track)?.composition_at(position)
    }

    /// Items intersecting `[start, end)` on one track, or on every track when
    /// `track` is `None`.
    pub fn items_in_range(
        &self,
        track: Option<ItemId>,
        start: i64,
        end: Option<i64>,
        with_compositions: bool,
    ) -> Vec<ItemId> {
        match track {
            Some(id) => self
                .track(id)
                .map(|t| t.items_in_range(start, end, with_compositions))
                .unwrap_or_default(),
            None => self
                .tracks
                .iter()
                .flat_map(|t| t.items_in_range(start, end, with_compositions))
                .collect(),
        }
    }

    // ── Transactions ────────────────────────────────────────────

    /// Run `f` as one atomic request.
    ///
    /// On success the recorded commands become one undo entry named
    /// `label` (unless `options.log_undo` is off); on failure they are rolled
    /// back and the error is returned.
    pub(crate) fn transact<T>(
        &mut self,
        label: &str,
        options: EditOptions,
        f: impl FnOnce(&mut Self, &mut Transaction) -> Result<T>,
    ) -> Result<T> {
        let saved = std::mem::replace(&mut self.options, options);
        let mut tx = Transaction::new();
        let result = f(self, &mut tx);
        match &result {
            Ok(_) => {
                if options.log_undo {
                    if let Some(command) = tx.into_command() {
                        self.undo_stack.push(label, command);
                    }
                }
            }
            Err(err) => {
                debug!(label, error = %err, steps = tx.len(), "request failed, rolling back");
                self.rollback(tx);
            }
        }
        self.options = saved;
        result
    }

    /// Nested all-or-nothing step: on success its commands join `tx`, on
    /// failure only its own commands are reverted.
    pub(crate) fn attempt<T>(
        &mut self,
        tx: &mut Transaction,
        f: impl FnOnce(&mut Self, &mut Transaction) -> Result<T>,
    ) -> Result<T> {
        let mut local = Transaction::new();
        match f(self, &mut local) {
            Ok(value) => {
                tx.append(local);
                Ok(value)
            }
            Err(err) => {
                self.rollback(local);
                Err(err)
            }
        }
    }

    /// Whether `f` would succeed. Everything it does is reverted and nothing
    /// is notified.
    pub(crate) fn dry_run(
        &mut self,
        f: impl FnOnce(&mut Self, &mut Transaction) -> Result<()>,
    ) -> bool {
        let saved = std::mem::replace(&mut self.options, EditOptions::quiet());
        let mut local = Transaction::new();
        let ok = f(self, &mut local).is_ok();
        self.rollback(local);
        self.options = saved;
        ok
    }

    /// Apply a primitive and record it.
    pub(crate) fn exec(&mut self, tx: &mut Transaction, command: EditCommand) -> Result<()> {
        command.apply(self)?;
        tx.record(command);
        Ok(())
    }

    pub(crate) fn rollback(&mut self, tx: Transaction) {
        for command in tx.into_commands().into_iter().rev() {
            if let Err(err) = command.inverse().apply(self) {
                error!(error = %err, ?command, "rollback step failed");
            }
        }
    }

    // ── Undo / redo ─────────────────────────────────────────────

    /// Revert the last logged request. Returns false if there is none.
    pub fn undo(&mut self) -> Result<bool> {
        self.clear_selection_silently();
        let Some(command) = self.undo_stack.undo() else {
            return Ok(false);
        };
        debug!(steps = command.primitive_count(), "undo");
        if let Err(err) = command.apply(self) {
            error!(error = %err, "undo failed, history left unchanged");
            self.undo_stack.cancel_undo();
            return Err(err);
        }
        Ok(true)
    }

    /// Re-apply the last undone request. Returns false if there is none.
    pub fn redo(&mut self) -> Result<bool> {
        self.clear_selection_silently();
        let Some(command) = self.undo_stack.redo() else {
            return Ok(false);
        };
        debug!(steps = command.primitive_count(), "redo");
        if let Err(err) = command.apply(self) {
            error!(error = %err, "redo failed, history left unchanged");
            self.undo_stack.cancel_redo();
            return Err(err);
        }
        Ok(true)
    }

    pub fn clear_history(&mut self) {
        self.undo_stack.clear();
    }

    /// Record an already applied entry, as when replaying a saved history.
    pub(crate) fn push_history(&mut self, entry: UndoEntry) {
        self.undo_stack.push(entry.label, entry.command);
    }

    // ── Bookkeeping ─────────────────────────────────────────────

    pub(crate) fn options(&self) -> EditOptions {
        self.options
    }

    /// Recompute the duration from the tracks that contribute to it.
    pub(crate) fn refresh_duration(&mut self) {
        let duration = self.computed_duration();
        if duration != self.duration {
            self.duration = duration;
            self.notify(ModelChange::DurationChanged { duration });
        }
    }

    pub(crate) fn computed_duration(&self) -> i64 {
        self.tracks
            .iter()
            .filter(|t| t.settings().contributes_duration())
            .map(|t| t.duration())
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn notify(&mut self, change: ModelChange) {
        if self.options.update_view {
            self.notifier.emit(change);
        }
    }

    pub(crate) fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }
}
