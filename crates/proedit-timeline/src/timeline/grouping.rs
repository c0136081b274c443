//! Grouping, ungrouping and deletion requests.

use std::collections::{BTreeSet, VecDeque};

use proedit_core::{ItemId, ProEditError, Result};
use tracing::debug;

use super::{EditOptions, TimelineModel};
use crate::clip::PlaylistState;
use crate::edit::{EditCommand, Transaction};
use crate::groups::{GroupNode, GroupOp, GroupType, LeafKind};
use crate::item::Positioned;

impl TimelineModel {
    // ── Logged group ops ────────────────────────────────────────

    /// Replay ops the forest already applied as logged commands.
    fn log_group_ops(&mut self, tx: &mut Transaction, ops: Vec<GroupOp>) -> Result<()> {
        self.groups.revert(&ops);
        for op in ops {
            self.exec(tx, EditCommand::Group(op))?;
        }
        Ok(())
    }

    pub(crate) fn group_in(
        &mut self,
        tx: &mut Transaction,
        ids: &[ItemId],
        kind: GroupType,
    ) -> Result<ItemId> {
        let (group, ops) = self.groups.group_items(ids, kind)?;
        self.log_group_ops(tx, ops)?;
        Ok(group)
    }

    pub(crate) fn ungroup_in(&mut self, tx: &mut Transaction, group: ItemId) -> Result<()> {
        let ops = self.groups.destruct_group(group)?;
        self.log_group_ops(tx, ops)
    }

    // ── Grouping ────────────────────────────────────────────────

    /// Two halves of one bin clip, one audio and one video.
    fn is_av_pair(&self, ids: &[ItemId]) -> bool {
        let [a, b] = ids else {
            return false;
        };
        let (Some(a), Some(b)) = (self.clip(*a), self.clip(*b)) else {
            return false;
        };
        let states = [a.state(), b.state()];
        a.bin_id() == b.bin_id()
            && states.contains(&PlaylistState::AudioOnly)
            && states.contains(&PlaylistState::VideoOnly)
    }

    /// Group items and groups under a new group and return its id.
    ///
    /// If everything already shares one root, that root is returned.
    pub fn request_clips_group(&mut self, ids: &[ItemId], kind: GroupType) -> Result<ItemId> {
        debug!(count = ids.len(), ?kind, "request_clips_group");
        if matches!(kind, GroupType::Selection | GroupType::Leaf) {
            return Err(ProEditError::InvalidParameter(format!("cannot create a {kind:?} group")));
        }
        if ids.is_empty() {
            return Err(ProEditError::InvalidParameter("nothing to group".into()));
        }
        self.clear_selection_silently();
        for id in ids {
            if self.is_item(*id) {
                if self.item_track(*id).is_none() {
                    return Err(ProEditError::InvalidParameter(format!("{id} is not on a track")));
                }
            } else if !self.is_group(*id) {
                return Err(ProEditError::NotFound(format!("no item or group {id}")));
            }
        }
        let kind = if self.is_av_pair(ids) { GroupType::AvSplit } else { kind };
        self.transact("Group clips", EditOptions::default(), |model, tx| {
            model.group_in(tx, ids, kind)
        })
    }

    /// Dissolve the top-level group containing `id`.
    pub fn request_clip_ungroup(&mut self, id: ItemId) -> Result<()> {
        self.request_clips_ungroup(&[id])
    }

    /// Dissolve the top-level groups containing any of `ids`.
    pub fn request_clips_ungroup(&mut self, ids: &[ItemId]) -> Result<()> {
        debug!(count = ids.len(), "request_clips_ungroup");
        self.clear_selection_silently();
        let mut roots = BTreeSet::new();
        for id in ids {
            if !self.groups.contains(*id) {
                return Err(ProEditError::NotFound(format!("no item or group {id}")));
            }
            let root = self.groups.root_id(*id);
            if root != *id || id.is_group() {
                roots.insert(root);
            }
        }
        if roots.is_empty() {
            return Err(ProEditError::InvalidParameter("nothing to ungroup".into()));
        }
        self.transact("Ungroup clips", EditOptions::default(), |model, tx| {
            for root in roots {
                model.ungroup_in(tx, root)?;
            }
            Ok(())
        })
    }

    /// Take `item` out of its direct group. A group left with one member is
    /// dissolved.
    pub fn request_remove_from_group(&mut self, item: ItemId) -> Result<()> {
        debug!(item = %item, "request_remove_from_group");
        if !self.groups.contains(item) {
            return Err(ProEditError::NotFound(format!("no item or group {item}")));
        }
        self.clear_selection_silently();
        if self.groups.direct_ancestor(item).is_none() {
            return Err(ProEditError::InvalidParameter(format!("{item} is not grouped")));
        }
        self.transact("Remove from group", EditOptions::default(), |model, tx| {
            let ops = model.groups.remove_from_group(item)?;
            model.log_group_ops(tx, ops)
        })
    }

    // ── Deletion ────────────────────────────────────────────────

    /// Take an item off its track and destroy it.
    pub(crate) fn delete_item_in(&mut self, tx: &mut Transaction, item: ItemId) -> Result<()> {
        if let Some(track) = self.item_track(item) {
            let position = self.require_item(item)?.position();
            self.exec(tx, EditCommand::RemoveItem { track, item, position })?;
        }
        let command = match (self.clips.get(&item), self.compositions.get(&item)) {
            (Some(clip), _) => EditCommand::DeregisterClip { clip: clip.snapshot() },
            (None, Some(compo)) => EditCommand::DeregisterComposition {
                composition: compo.snapshot(),
            },
            (None, None) => {
                return Err(ProEditError::NotFound(format!("no clip or composition {item}")))
            }
        };
        self.exec(tx, command)
    }

    /// Delete a clip or composition. Grouped items take their whole group
    /// with them.
    pub fn request_item_deletion(&mut self, item: ItemId, log_undo: bool) -> Result<()> {
        debug!(item = %item, "request_item_deletion");
        self.require_item(item)?;
        self.clear_selection_silently();
        if self.groups.is_in_group(item) {
            return self.request_group_deletion(item, log_undo);
        }
        let label = if item.is_clip() { "Delete clip" } else { "Delete composition" };
        let options = EditOptions {
            log_undo,
            ..EditOptions::default()
        };
        self.transact(label, options, |model, tx| model.delete_item_in(tx, item))
    }

    /// Delete every item of the top-level group containing `item`.
    pub fn request_group_deletion(&mut self, item: ItemId, log_undo: bool) -> Result<()> {
        debug!(item = %item, "request_group_deletion");
        if !self.groups.contains(item) {
            return Err(ProEditError::NotFound(format!("no item or group {item}")));
        }
        self.clear_selection_silently();
        let root = self.groups.root_id(item);
        let options = EditOptions {
            log_undo,
            ..EditOptions::default()
        };
        self.transact("Delete group", options, |model, tx| {
            let mut inner = Vec::new();
            let mut leaves = Vec::new();
            let mut queue = VecDeque::from([root]);
            while let Some(node) = queue.pop_front() {
                if node.is_group() {
                    inner.push(node);
                    queue.extend(model.groups.direct_children(node));
                } else {
                    leaves.push(node);
                }
            }
            for group in inner {
                model.ungroup_in(tx, group)?;
            }
            leaves.sort_by_key(|id| !id.is_clip());
            for leaf in leaves {
                model.delete_item_in(tx, leaf)?;
            }
            Ok(())
        })
    }

    // ── JSON ────────────────────────────────────────────────────

    /// Serialize the persistent groups, leaves addressed by track position
    /// and start frame.
    pub fn groups_to_json(&self) -> Result<String> {
        let nodes = self.groups.to_json(|id| {
            let track = self.track_position(self.item_track(id)?)?;
            Some((track, self.item_position(id)?))
        })?;
        serde_json::to_string_pretty(&nodes)
            .map_err(|e| ProEditError::Serialization(format!("Failed to serialize groups: {e}")))
    }

    /// Rebuild groups written by [`groups_to_json`](Self::groups_to_json).
    /// Nothing is grouped if any node fails to resolve.
    pub fn groups_from_json(&mut self, data: &str) -> Result<()> {
        let nodes: Vec<GroupNode> = serde_json::from_str(data)
            .map_err(|e| ProEditError::Serialization(format!("Invalid groups: {e}")))?;
        debug!(roots = nodes.len(), "groups_from_json");
        self.clear_selection_silently();
        self.transact("Load groups", EditOptions::default(), |model, tx| {
            let tracks = &model.tracks;
            let resolve = |kind: LeafKind, track: usize, position: i64| {
                let track = tracks.get(track)?;
                match kind {
                    LeafKind::Clip => track.clip_by_start(position),
                    LeafKind::Composition => track.composition_by_start(position),
                }
            };
            let ops = model.groups.from_json(&nodes, resolve)?;
            model.log_group_ops(tx, ops)
        })
    }
}
