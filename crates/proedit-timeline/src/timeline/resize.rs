//! Snapped, group-aware item resizing.

use proedit_core::{ItemId, ProEditError, Result};
use tracing::debug;

use super::{EditOptions, TimelineModel};
use crate::edit::{EditCommand, Transaction};
use crate::item::{ItemBounds, Positioned, Resizable};

impl TimelineModel {
    /// Resize one item to `size` frames at the given edge.
    fn resize_one_in(
        &mut self,
        tx: &mut Transaction,
        item: ItemId,
        size: i64,
        right: bool,
    ) -> Result<()> {
        let current = self.require_item(item)?;
        let from = current.bounds();
        let to = current.resized_bounds(size, right).ok_or_else(|| {
            ProEditError::Timeline(format!("{item} cannot be resized to {size} frames"))
        })?;
        if from == to {
            return Ok(());
        }
        self.exec(tx, EditCommand::ResizeItem { item, from, to })
    }

    /// Largest size the item can grow to before reaching its neighbour.
    fn clamp_growth(&self, item: ItemId, size: i64, right: bool) -> i64 {
        let Some(current) = self.item(item) else {
            return size;
        };
        let playtime = current.playtime();
        if size <= playtime {
            return size;
        }
        let Some(track) = current.current_track().and_then(|t| self.track(t)) else {
            return size;
        };
        let blank = if item.is_clip() {
            track.blank_size_near_clip(item, right)
        } else {
            track.blank_size_near_composition(item, right)
        };
        match blank {
            Some(blank) if blank < i64::MAX => size.min(playtime + blank),
            _ => size,
        }
    }

    /// Resize `item` to `size` frames by moving its right (`out`) or left
    /// (`in`) edge, and return the size actually applied.
    ///
    /// Growth stops at the neighbouring item, and with `snap_distance > 0`
    /// the moving edge snaps to nearby boundaries. Grouped leaves whose same
    /// edge coincides with the item's follow it unless
    /// `allow_single_resize` is set.
    pub fn request_item_resize(
        &mut self,
        item: ItemId,
        size: i64,
        right: bool,
        log_undo: bool,
        snap_distance: i64,
        allow_single_resize: bool,
    ) -> Result<i64> {
        debug!(item = %item, size, right, "request_item_resize");
        let bounds = self.require_item(item)?.bounds();
        if size <= 0 {
            let msg = format!("cannot resize {item} to {size} frames");
            return Err(ProEditError::InvalidParameter(msg));
        }
        let mut size = self.clamp_growth(item, size, right);
        let root = self.groups.root_id(item);
        let grouped = root != item && !allow_single_resize;

        if snap_distance > 0 && self.item_track(item).is_some() {
            let boundaries = if grouped {
                self.group_boundaries(root)
            } else {
                vec![bounds.position, bounds.end()]
            };
            let proposed = self.snaps.propose_size_with_boundaries(
                bounds.position,
                bounds.end(),
                &boundaries,
                size,
                right,
                snap_distance,
            );
            if let Some(proposed) = proposed.filter(|p| *p != size) {
                if self.dry_run(|model, tx| model.resize_one_in(tx, item, proposed, right)) {
                    size = proposed;
                }
            }
        }

        let mut targets = vec![item];
        if grouped {
            for leaf in self.groups.leaves(root) {
                if leaf == item {
                    continue;
                }
                let Some(other) = self.item(leaf) else {
                    continue;
                };
                let Some(track) = other.current_track() else {
                    continue;
                };
                let coincides = if right {
                    other.end() == bounds.end()
                } else {
                    other.position() == bounds.position
                };
                let locked = self.track(track).map_or(true, |t| t.is_locked());
                if coincides && !locked {
                    targets.push(leaf);
                }
            }
        }

        let final_edge = if right {
            bounds.position.checked_add(size)
        } else {
            bounds.end().checked_sub(size)
        };
        let Some(final_edge) = final_edge else {
            let msg = format!("cannot resize {item} to {size} frames");
            return Err(ProEditError::InvalidParameter(msg));
        };
        let options = EditOptions {
            log_undo,
            ..EditOptions::default()
        };
        self.transact("Resize item", options, |model, tx| {
            let mut resized = 0;
            for target in targets {
                let current = model.require_item(target)?.bounds();
                let target_size = if right {
                    final_edge - current.position
                } else {
                    current.end() - final_edge
                };
                if target_size == current.playtime() {
                    continue;
                }
                model.resize_one_in(tx, target, target_size, right)?;
                resized += 1;
            }
            if resized == 0 {
                return Err(ProEditError::Timeline(format!("{item} already has {size} frames")));
            }
            Ok(size)
        })
    }

    /// Show another part of the source: shift the crop of `clip` by
    /// `offset` frames (positive reveals earlier material) without moving
    /// it or changing its duration.
    ///
    /// Every clip of its group slips too unless `allow_single_slip` is set.
    /// Each one is limited by its own source; clips on locked tracks and
    /// endless clips stay put. Returns `offset`.
    pub fn request_clip_slip(
        &mut self,
        clip: ItemId,
        offset: i64,
        log_undo: bool,
        allow_single_slip: bool,
    ) -> Result<i64> {
        debug!(clip = %clip, offset, "request_clip_slip");
        if !self.is_clip(clip) {
            return Err(ProEditError::NotFound(format!("no clip {clip}")));
        }
        let root = self.groups.root_id(clip);
        let targets: Vec<ItemId> = if allow_single_slip || root == clip {
            vec![clip]
        } else {
            self.groups.leaves(root).into_iter().filter(|id| id.is_clip()).collect()
        };
        let targets: Vec<ItemId> = targets
            .into_iter()
            .filter(|id| {
                self.item_track(*id)
                    .and_then(|track| self.track(track))
                    .map_or(true, |track| !track.is_locked())
            })
            .collect();
        if targets.is_empty() {
            return Err(ProEditError::TrackLocked(self.item_track(clip).unwrap_or(clip)));
        }
        let options = EditOptions {
            log_undo,
            ..EditOptions::default()
        };
        self.transact("Slip clip", options, |model, tx| {
            for target in targets {
                let current = model.require_item(target)?;
                let Some(max) = current.max_duration() else {
                    continue;
                };
                let from = current.bounds();
                let shift = offset.max(from.out_point - max + 1).min(from.in_point);
                if shift == 0 {
                    continue;
                }
                let to =
                    ItemBounds::new(from.position, from.in_point - shift, from.out_point - shift);
                model.exec(tx, EditCommand::ResizeItem { item: target, from, to })?;
            }
            Ok(offset)
        })
    }
}
