//! Selection handling.
//!
//! The selection is a single root: an item, a group, or a transient
//! Selection group over several roots. It is never part of the undo history.

use std::collections::BTreeSet;

use proedit_core::{ItemId, ProEditError, Result};
use smallvec::smallvec;
use tracing::{debug, warn};

use super::TimelineModel;
use crate::groups::GroupType;
use crate::item::{ItemCore, Positioned};
use crate::view::Role;

impl TimelineModel {
    /// Root of the current selection.
    pub fn selection_id(&self) -> Option<ItemId> {
        self.selection
    }

    /// Every selected clip and composition.
    pub fn selection(&self) -> BTreeSet<ItemId> {
        self.selection
            .map(|root| self.groups.leaves(root))
            .unwrap_or_default()
    }

    pub fn is_selected(&self, id: ItemId) -> bool {
        self.item(id).is_some_and(|item| item.is_selected())
    }

    /// Roots the selection was built from.
    fn selection_members(&self) -> Vec<ItemId> {
        match self.selection {
            Some(root) if self.groups.kind(root) == GroupType::Selection => {
                self.groups.direct_children(root)
            }
            Some(root) => vec![root],
            None => Vec::new(),
        }
    }

    /// Set a view flag on every leaf under `root` and announce `role`.
    fn mark_leaves(&mut self, root: ItemId, role: Role, set: fn(&mut ItemCore, bool), value: bool) {
        for leaf in self.groups.leaves(root) {
            let core = match leaf {
                ItemId::Clip(_) => self.clips.get_mut(&leaf).map(|c| c.core_mut()),
                ItemId::Composition(_) => self.compositions.get_mut(&leaf).map(|c| c.core_mut()),
                _ => None,
            };
            if let Some(core) = core {
                set(core, value);
            }
            self.notify_item_data(leaf, smallvec![role]);
        }
    }

    fn mark_selected(&mut self, root: ItemId, selected: bool) {
        self.mark_leaves(root, Role::Selected, ItemCore::set_selected, selected);
    }

    /// Drop the selection without touching the history.
    pub(crate) fn clear_selection_silently(&mut self) {
        let Some(root) = self.selection.take() else {
            return;
        };
        self.mark_selected(root, false);
        if self.groups.kind(root) == GroupType::Selection {
            if let Err(err) = self.groups.destruct_group(root) {
                warn!(group = %root, error = %err, "cannot dissolve selection group");
            }
        }
    }

    /// Replace the selection by the roots of `ids`.
    pub fn request_set_selection(&mut self, ids: &[ItemId]) -> Result<()> {
        debug!(count = ids.len(), "request_set_selection");
        if let Some(missing) = ids.iter().find(|id| !self.groups.contains(**id)) {
            return Err(ProEditError::NotFound(format!("no item or group {missing}")));
        }
        // Roots are taken before the old Selection group is dissolved, so
        // re-selecting its members keeps them.
        let mut roots = BTreeSet::new();
        for id in ids {
            let root = self.groups.root_id(*id);
            if self.groups.kind(root) == GroupType::Selection {
                roots.extend(
                    self.groups
                        .direct_children(root)
                        .into_iter()
                        .filter(|member| {
                            *member == *id || self.groups.subtree(*member).contains(id)
                        }),
                );
            } else {
                roots.insert(root);
            }
        }
        self.clear_selection_silently();
        let roots: Vec<ItemId> = roots.into_iter().collect();
        let root = match roots.as_slice() {
            [] => return Ok(()),
            [single] => *single,
            _ => self.groups.group_items(&roots, GroupType::Selection)?.0,
        };
        self.selection = Some(root);
        self.mark_selected(root, true);
        Ok(())
    }

    /// Add the group of `id` to the selection, or select only it if `clear`.
    pub fn request_add_to_selection(&mut self, id: ItemId, clear: bool) -> Result<()> {
        let mut ids = if clear { Vec::new() } else { self.selection_members() };
        ids.push(id);
        self.request_set_selection(&ids)
    }

    /// Remove the selected root containing `id`.
    pub fn request_remove_from_selection(&mut self, id: ItemId) -> Result<()> {
        let members = self.selection_members();
        let kept: Vec<ItemId> = members
            .into_iter()
            .filter(|member| !self.groups.subtree(*member).contains(&id))
            .collect();
        self.request_set_selection(&kept)
    }

    pub fn request_clear_selection(&mut self) {
        self.clear_selection_silently();
    }

    // ── Grabbing ────────────────────────────────────────────────

    pub fn is_grabbed(&self, id: ItemId) -> bool {
        self.item(id).is_some_and(|item| item.is_grabbed())
    }

    /// Grab or release `item` together with everything grouped with it.
    /// Like the selection, grabbing never enters the history.
    pub fn request_item_grab(&mut self, item: ItemId, grabbed: bool) -> Result<()> {
        debug!(item = %item, grabbed, "request_item_grab");
        if !self.is_item(item) && !self.is_group(item) {
            return Err(ProEditError::NotFound(format!("no item or group {item}")));
        }
        let root = self.groups.root_id(item);
        self.mark_leaves(root, Role::Grabbed, ItemCore::set_grabbed, grabbed);
        Ok(())
    }

    /// Grab or release one clip and its group.
    pub fn request_clip_grab(&mut self, clip: ItemId, grabbed: bool) -> Result<()> {
        if !self.is_clip(clip) {
            return Err(ProEditError::NotFound(format!("no clip {clip}")));
        }
        self.request_item_grab(clip, grabbed)
    }
}
