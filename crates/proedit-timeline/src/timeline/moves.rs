//! Item and group moves, and move suggestions for interactive dragging.

use std::collections::BTreeMap;

use proedit_core::{ItemId, ProEditError, Result};
use tracing::{debug, trace};

use super::{EditOptions, TimelineModel};
use crate::edit::{EditCommand, Transaction};
use crate::item::{Positioned, Resizable};

/// One leaf of a group move.
#[derive(Debug, Clone, Copy)]
struct LeafMove {
    item: ItemId,
    from_track: ItemId,
    from_position: i64,
    to_track: ItemId,
    to_position: i64,
}

impl TimelineModel {
    /// Whether an item belongs on audio tracks. Compositions count as video.
    fn plays_audio(&self, id: ItemId) -> bool {
        self.clip(id).is_some_and(|c| c.is_audio_only())
    }

    fn placement(&self, id: ItemId) -> Result<(ItemId, i64)> {
        let item = self.require_item(id)?;
        let track = item
            .current_track()
            .ok_or_else(|| ProEditError::InvalidParameter(format!("{id} is not on a track")))?;
        Ok((track, item.position()))
    }

    // ── Single items ────────────────────────────────────────────

    /// Delete-then-insert of one item, all or nothing.
    pub(crate) fn move_item_in(
        &mut self,
        tx: &mut Transaction,
        item: ItemId,
        track: ItemId,
        position: i64,
    ) -> Result<()> {
        self.attempt(tx, |model, tx| {
            if let Some(old_track) = model.item_track(item) {
                let old_position = model.require_item(item)?.position();
                model.exec(
                    tx,
                    EditCommand::RemoveItem {
                        track: old_track,
                        item,
                        position: old_position,
                    },
                )?;
            }
            model.exec(tx, EditCommand::InsertItem { track, item, position })
        })
    }

    /// Move an item, dragging its group along if it has one.
    pub(crate) fn move_in(
        &mut self,
        tx: &mut Transaction,
        item: ItemId,
        track: ItemId,
        position: i64,
    ) -> Result<()> {
        let target = self.require_track(track)?;
        let Some(current_track) = self.item_track(item) else {
            return self.move_item_in(tx, item, track, position);
        };
        let current_position = self.require_item(item)?.position();
        if current_track == track && current_position == position {
            return Ok(());
        }
        if self.groups.is_in_group(item) {
            let root = self.groups.root_id(item);
            let source = self.require_track(current_track)?;
            let delta_track = target as isize - source as isize;
            let delta_pos = position.checked_sub(current_position).ok_or_else(|| {
                ProEditError::InvalidParameter(format!("{item} cannot move to {position}"))
            })?;
            return self.group_move_in(tx, item, root, delta_track, delta_pos);
        }
        self.move_item_in(tx, item, track, position)
    }

    /// Move a clip to `position` on `track`. Grouped clips move their whole
    /// group by the same offsets.
    pub fn request_clip_move(
        &mut self,
        clip: ItemId,
        track: ItemId,
        position: i64,
        options: EditOptions,
    ) -> Result<()> {
        debug!(clip = %clip, track = %track, position, "request_clip_move");
        if !self.is_clip(clip) {
            return Err(ProEditError::NotFound(format!("no clip {clip}")));
        }
        self.require_track(track)?;
        self.transact("Move clip", options, |model, tx| model.move_in(tx, clip, track, position))
    }

    // ── Groups ──────────────────────────────────────────────────

    /// Shift every leaf of `group` by `delta_track` tracks and `delta_pos`
    /// frames. `item` is the leaf being dragged; leaves of the other stream
    /// move vertically in the opposite direction.
    pub fn request_group_move(
        &mut self,
        item: ItemId,
        group: ItemId,
        delta_track: isize,
        delta_pos: i64,
        options: EditOptions,
    ) -> Result<()> {
        debug!(item = %item, group = %group, delta_track, delta_pos, "request_group_move");
        if !self.is_group(group) {
            return Err(ProEditError::NotFound(format!("no group {group}")));
        }
        if !self.groups.subtree(group).contains(&item) {
            return Err(ProEditError::InvalidParameter(format!("{item} is not in {group}")));
        }
        self.transact("Move group", options, |model, tx| {
            model.group_move_in(tx, item, group, delta_track, delta_pos)
        })
    }

    /// Target of every leaf, or `None` if the vertical part is impossible.
    fn plan_group_move(
        &self,
        master_audio: bool,
        leaves: &[ItemId],
        delta_track: isize,
        delta_pos: i64,
    ) -> Result<Option<Vec<LeafMove>>> {
        let mut plan = Vec::with_capacity(leaves.len());
        for leaf in leaves {
            let (from_track, from_position) = self.placement(*leaf)?;
            let source = self.require_track(from_track)?;
            let audio = self.plays_audio(*leaf);
            let delta = if audio == master_audio { delta_track } else { -delta_track };
            let target = source as isize + delta;
            let to_track = usize::try_from(target).ok().and_then(|t| self.tracks.get(t));
            let Some(to_track) = to_track else {
                return Ok(None);
            };
            if to_track.is_audio() != audio {
                return Ok(None);
            }
            let to_position = from_position.checked_add(delta_pos).ok_or_else(|| {
                ProEditError::InvalidParameter(format!("{leaf} cannot move by {delta_pos} frames"))
            })?;
            plan.push(LeafMove {
                item: *leaf,
                from_track,
                from_position,
                to_track: to_track.id(),
                to_position,
            });
        }
        Ok(Some(plan))
    }

    pub(crate) fn group_move_in(
        &mut self,
        tx: &mut Transaction,
        item: ItemId,
        group: ItemId,
        delta_track: isize,
        delta_pos: i64,
    ) -> Result<()> {
        if delta_track == 0 && delta_pos == 0 {
            return Ok(());
        }
        let leaves: Vec<ItemId> = self
            .groups
            .leaves(group)
            .into_iter()
            .filter(|leaf| self.item_track(*leaf).is_some())
            .collect();
        let master_audio = self.plays_audio(item);
        let mut delta_track = delta_track;
        let mut plan = match self.plan_group_move(master_audio, &leaves, delta_track, delta_pos)? {
            Some(plan) => plan,
            None => {
                trace!(group = %group, delta_track, "dropping impossible vertical delta");
                if delta_pos == 0 {
                    return Err(ProEditError::Timeline(format!(
                        "{group} cannot move {delta_track} tracks"
                    )));
                }
                delta_track = 0;
                self.plan_group_move(master_audio, &leaves, 0, delta_pos)?.ok_or_else(|| {
                    ProEditError::Internal("horizontal group move has no plan".into())
                })?
            }
        };
        // Leaves go in the opposite order of the motion so that each one
        // lands on space its neighbour has already left.
        if delta_pos > 0 {
            plan.sort_by(|a, b| b.from_position.cmp(&a.from_position));
        } else {
            plan.sort_by_key(|m| m.from_position);
        }
        self.attempt(tx, |model, tx| {
            if delta_track != 0 {
                for m in &plan {
                    model.exec(
                        tx,
                        EditCommand::RemoveItem {
                            track: m.from_track,
                            item: m.item,
                            position: m.from_position,
                        },
                    )?;
                }
                for m in &plan {
                    model.exec(
                        tx,
                        EditCommand::InsertItem {
                            track: m.to_track,
                            item: m.item,
                            position: m.to_position,
                        },
                    )?;
                }
            } else {
                for m in &plan {
                    model.move_item_in(tx, m.item, m.to_track, m.to_position)?;
                }
            }
            Ok(())
        })
    }

    // ── Suggestions ─────────────────────────────────────────────

    /// Both boundaries of every leaf under `root`.
    pub(crate) fn group_boundaries(&self, root: ItemId) -> Vec<i64> {
        self.groups
            .leaves(root)
            .into_iter()
            .filter_map(|leaf| self.item(leaf))
            .filter(|item| item.current_track().is_some())
            .flat_map(|item| [item.position(), item.end()])
            .collect()
    }

    fn snapped_move_position(
        &mut self,
        item: ItemId,
        current: i64,
        position: i64,
        cursor: Option<i64>,
        snap_distance: i64,
    ) -> i64 {
        let mut position = position;
        if snap_distance > 0 {
            let root = self.groups.root_id(item);
            let boundaries = self.group_boundaries(root);
            let diff = position.saturating_sub(current);
            let snapped = self.best_snap_pos(current, diff, &boundaries, cursor, snap_distance);
            if let Some(snapped) = snapped {
                position = snapped;
            }
        }
        position.max(0)
    }

    /// Best place a clip dragged to `(track, position)` can actually go.
    ///
    /// Nothing is changed or logged. When the exact spot is taken the clip
    /// falls back to its own track, then to the blank next to it (or, for
    /// a group, to the smallest free space on any of its tracks).
    pub fn suggest_clip_move(
        &mut self,
        clip: ItemId,
        track: ItemId,
        position: i64,
        cursor: Option<i64>,
        snap_distance: i64,
    ) -> Result<(i64, ItemId)> {
        if !self.is_clip(clip) {
            return Err(ProEditError::NotFound(format!("no clip {clip}")));
        }
        self.require_track(track)?;
        let (current_track, current_position) = self.placement(clip)?;
        let track = if self.is_audio_track(track) != self.plays_audio(clip) {
            current_track
        } else {
            track
        };
        if track == current_track && position == current_position {
            return Ok((current_position, current_track));
        }
        let position =
            self.snapped_move_position(clip, current_position, position, cursor, snap_distance);
        if self.dry_run(|model, tx| model.move_in(tx, clip, track, position)) {
            return Ok((position, track));
        }
        let root = self.groups.root_id(clip);
        let after = position > current_position;
        if root == clip {
            if track != current_track
                && self.dry_run(|model, tx| model.move_in(tx, clip, current_track, position))
            {
                return Ok((position, current_track));
            }
            let blank = self
                .track(current_track)
                .and_then(|t| t.blank_size_near_clip(clip, after))
                .unwrap_or(0);
            if blank < i64::MAX && blank > 0 {
                let fallback = if after {
                    current_position.saturating_add(blank)
                } else {
                    current_position - blank
                };
                if self.dry_run(|model, tx| model.move_in(tx, clip, current_track, fallback)) {
                    return Ok((fallback, current_track));
                }
            }
            return Ok((current_position, current_track));
        }
        if track != current_track {
            if self.dry_run(|model, tx| model.move_in(tx, clip, current_track, position)) {
                return Ok((position, current_track));
            }
            return Ok((current_position, current_track));
        }
        let space = self.group_free_space(root, after, snap_distance);
        let fallback = if after {
            current_position.saturating_add(space)
        } else {
            current_position - space
        };
        if space > 0 && self.dry_run(|model, tx| model.move_in(tx, clip, current_track, fallback)) {
            return Ok((fallback, current_track));
        }
        Ok((current_position, current_track))
    }

    /// Smallest blank after (or before) the group's clips on any of its
    /// tracks; zero when that exceeds ten snap distances.
    fn group_free_space(&self, root: ItemId, after: bool, snap_distance: i64) -> i64 {
        let mut extents: BTreeMap<ItemId, (i64, i64)> = BTreeMap::new();
        for leaf in self.groups.leaves(root) {
            let Some(clip) = self.clip(leaf) else {
                continue;
            };
            let Some(track) = clip.current_track() else {
                continue;
            };
            let extent = extents.entry(track).or_insert((i64::MAX, i64::MIN));
            extent.0 = extent.0.min(clip.position());
            extent.1 = extent.1.max(clip.end());
        }
        let space = extents
            .iter()
            .filter_map(|(track, (start, end))| {
                let track = self.track(*track)?;
                Some(if after {
                    track.blank_end(*end).saturating_sub(*end)
                } else {
                    start - track.blank_start(*start)
                })
            })
            .min()
            .unwrap_or(0);
        if space > 10 * snap_distance {
            0
        } else {
            space
        }
    }

    /// Best place a composition dragged to `(track, position)` can go, or
    /// where it already is.
    pub fn suggest_composition_move(
        &mut self,
        composition: ItemId,
        track: ItemId,
        position: i64,
        cursor: Option<i64>,
        snap_distance: i64,
    ) -> Result<(i64, ItemId)> {
        if !self.is_composition(composition) {
            return Err(ProEditError::NotFound(format!("no composition {composition}")));
        }
        self.require_track(track)?;
        let (current_track, current_position) = self.placement(composition)?;
        let track = if self.is_audio_track(track) { current_track } else { track };
        if track == current_track && position == current_position {
            return Ok((current_position, current_track));
        }
        let position = self.snapped_move_position(
            composition,
            current_position,
            position,
            cursor,
            snap_distance,
        );
        if self.dry_run(|model, tx| model.move_in(tx, composition, track, position)) {
            return Ok((position, track));
        }
        Ok((current_position, current_track))
    }
}
