//! Group forest over item ids.
//!
//! Every clip and composition owns a leaf node; internal nodes are
//! `ItemId::Group` ids tagged with a [`GroupType`]. Mutations return the
//! [`GroupOp`]s they performed so the caller can log them for undo.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use proedit_core::{ItemId, ProEditError, Result};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupType {
    Normal,
    /// Transient multi-selection; never logged, never nested.
    Selection,
    /// Audio and video halves of one source clip.
    #[serde(rename = "AVSplit")]
    AvSplit,
    /// Reported for clips and compositions.
    Leaf,
}

/// One reversible change to the forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupOp {
    CreateGroup { group: ItemId, kind: GroupType },
    DestroyGroup { group: ItemId, kind: GroupType },
    SetParent { node: ItemId, from: Option<ItemId>, to: Option<ItemId> },
}

impl GroupOp {
    pub fn inverse(&self) -> Self {
        match self {
            Self::CreateGroup { group, kind } => Self::DestroyGroup {
                group: *group,
                kind: *kind,
            },
            Self::DestroyGroup { group, kind } => Self::CreateGroup {
                group: *group,
                kind: *kind,
            },
            Self::SetParent { node, from, to } => Self::SetParent {
                node: *node,
                from: *to,
                to: *from,
            },
        }
    }

    /// The node whose membership changed.
    pub fn node(&self) -> ItemId {
        match self {
            Self::CreateGroup { group, .. } | Self::DestroyGroup { group, .. } => *group,
            Self::SetParent { node, .. } => *node,
        }
    }
}

/// Kind of item a serialized leaf refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeafKind {
    Clip,
    Composition,
}

/// Serialized group node: either `{type, children}` or
/// `{type: "Leaf", leaf, data: "trackPosition:position"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupNode {
    #[serde(rename = "type")]
    pub kind: GroupType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<GroupNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf: Option<LeafKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl GroupNode {
    pub fn leaf(kind: LeafKind, track_position: usize, position: i64) -> Self {
        Self {
            kind: GroupType::Leaf,
            children: Vec::new(),
            leaf: Some(kind),
            data: Some(format!("{track_position}:{position}")),
        }
    }

    /// Parse `data` back into (track position, position).
    pub fn location(&self) -> Option<(usize, i64)> {
        let (track, pos) = self.data.as_deref()?.split_once(':')?;
        Some((track.trim().parse().ok()?, pos.trim().parse().ok()?))
    }
}

#[derive(Debug, Clone, Default)]
pub struct GroupsModel {
    /// Node → parent.
    up: HashMap<ItemId, Option<ItemId>>,
    /// Node → children (empty for leaves).
    down: HashMap<ItemId, BTreeSet<ItemId>>,
    /// Internal nodes only.
    kinds: HashMap<ItemId, GroupType>,
}

impl GroupsModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.up.contains_key(&id)
    }

    pub fn group_count(&self) -> usize {
        self.kinds.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.up.len() - self.kinds.len()
    }

    /// The transient Selection group, if one exists.
    pub fn selection_group(&self) -> Option<ItemId> {
        self.kinds
            .iter()
            .find(|(_, kind)| **kind == GroupType::Selection)
            .map(|(gid, _)| *gid)
    }

    /// Register the leaf node of a new item.
    pub fn create_leaf(&mut self, id: ItemId) -> Result<()> {
        if !id.is_item() || self.contains(id) {
            return Err(ProEditError::InvalidParameter(format!("cannot create leaf {id}")));
        }
        self.up.insert(id, None);
        self.down.insert(id, BTreeSet::new());
        Ok(())
    }

    /// Unregister an item's leaf. The item must be ungrouped.
    pub fn destruct_leaf(&mut self, id: ItemId) -> Result<()> {
        match self.up.get(&id) {
            None => Err(ProEditError::NotFound(format!("no group leaf for {id}"))),
            Some(Some(parent)) => Err(ProEditError::InvalidParameter(format!(
                "{id} is still grouped in {parent}"
            ))),
            Some(None) => {
                self.up.remove(&id);
                self.down.remove(&id);
                Ok(())
            }
        }
    }

    pub fn kind(&self, id: ItemId) -> GroupType {
        self.kinds.get(&id).copied().unwrap_or(GroupType::Leaf)
    }

    pub fn direct_ancestor(&self, id: ItemId) -> Option<ItemId> {
        self.up.get(&id).copied().flatten()
    }

    pub fn direct_children(&self, id: ItemId) -> Vec<ItemId> {
        self.down.get(&id).map(|c| c.iter().copied().collect()).unwrap_or_default()
    }

    pub fn root_id(&self, id: ItemId) -> ItemId {
        let mut current = id;
        let mut seen = HashSet::new();
        while let Some(parent) = self.direct_ancestor(current) {
            if !seen.insert(current) {
                error!(node = %id, "cycle in group forest");
                break;
            }
            current = parent;
        }
        current
    }

    pub fn is_in_group(&self, id: ItemId) -> bool {
        self.root_id(id) != id
    }

    /// Leaves under `id` (itself if it is a leaf).
    pub fn leaves(&self, id: ItemId) -> BTreeSet<ItemId> {
        self.subtree(id)
            .into_iter()
            .filter(|node| self.down.get(node).map_or(true, |c| c.is_empty()))
            .collect()
    }

    /// `id` and every node below it.
    pub fn subtree(&self, id: ItemId) -> BTreeSet<ItemId> {
        let mut result = BTreeSet::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !result.insert(current) {
                continue;
            }
            if let Some(children) = self.down.get(&current) {
                queue.extend(children.iter().copied());
            }
        }
        result
    }

    /// The other half of an AV split pair.
    pub fn split_partner(&self, id: ItemId) -> Option<ItemId> {
        let parent = self.direct_ancestor(id)?;
        if self.kind(parent) != GroupType::AvSplit {
            return None;
        }
        let children = self.down.get(&parent)?;
        if children.len() != 2 {
            return None;
        }
        children.iter().copied().find(|child| *child != id)
    }

    /// Group every root reachable from `ids` under a new node.
    ///
    /// If the ids already share one root, that root is returned and nothing
    /// changes.
    pub fn group_items(
        &mut self,
        ids: &[ItemId],
        kind: GroupType,
    ) -> Result<(ItemId, Vec<GroupOp>)> {
        if kind == GroupType::Leaf {
            return Err(ProEditError::InvalidParameter("cannot group as Leaf".into()));
        }
        if ids.is_empty() {
            return Err(ProEditError::InvalidParameter("no ids to group".into()));
        }
        if let Some(missing) = ids.iter().find(|id| !self.contains(**id)) {
            return Err(ProEditError::NotFound(format!("{missing} is not in the group forest")));
        }
        let roots: BTreeSet<ItemId> = ids.iter().map(|id| self.root_id(*id)).collect();
        if roots.len() == 1 {
            return Ok((roots.into_iter().next().unwrap_or(ids[0]), Vec::new()));
        }
        let group = ItemId::new_group();
        let mut ops = vec![GroupOp::CreateGroup { group, kind }];
        ops.extend(roots.into_iter().map(|node| GroupOp::SetParent {
            node,
            from: None,
            to: Some(group),
        }));
        self.apply_all(&ops)?;
        Ok((group, ops))
    }

    /// Remove the nearest group above `id`, promoting its children.
    pub fn ungroup_item(&mut self, id: ItemId) -> Result<Vec<GroupOp>> {
        let parent = self
            .direct_ancestor(id)
            .ok_or_else(|| ProEditError::InvalidParameter(format!("{id} is not grouped")))?;
        self.destruct_group(parent)
    }

    /// Detach `id` from its direct group. A group left with a single child
    /// is dissolved into its own parent.
    pub fn remove_from_group(&mut self, id: ItemId) -> Result<Vec<GroupOp>> {
        let parent = self
            .direct_ancestor(id)
            .ok_or_else(|| ProEditError::InvalidParameter(format!("{id} is not grouped")))?;
        let mut ops = vec![GroupOp::SetParent {
            node: id,
            from: Some(parent),
            to: None,
        }];
        self.apply_all(&ops)?;
        if self.direct_children(parent).len() < 2 {
            match self.destruct_group(parent) {
                Ok(dissolved) => ops.extend(dissolved),
                Err(err) => {
                    self.revert(&ops);
                    return Err(err);
                }
            }
        }
        Ok(ops)
    }

    /// Dissolve group `gid`: its children move to its parent, and a parent
    /// left empty is dissolved too.
    pub fn destruct_group(&mut self, gid: ItemId) -> Result<Vec<GroupOp>> {
        let ops = self.plan_destruct(gid)?;
        self.apply_all(&ops)?;
        Ok(ops)
    }

    fn plan_destruct(&self, gid: ItemId) -> Result<Vec<GroupOp>> {
        if !self.kinds.contains_key(&gid) {
            return Err(ProEditError::NotFound(format!("{gid} is not a group")));
        }
        let mut ops = Vec::new();
        let mut target = gid;
        let mut promoted = self.direct_children(gid);
        loop {
            let parent = self.direct_ancestor(target);
            ops.extend(promoted.iter().map(|child| GroupOp::SetParent {
                node: *child,
                from: Some(target),
                to: parent,
            }));
            if let Some(parent) = parent {
                ops.push(GroupOp::SetParent {
                    node: target,
                    from: Some(parent),
                    to: None,
                });
            }
            ops.push(GroupOp::DestroyGroup {
                group: target,
                kind: self.kind(target),
            });
            match parent {
                Some(parent)
                    if promoted.is_empty()
                        && self.down.get(&parent).map_or(0, |c| c.len()) == 1 =>
                {
                    target = parent;
                    promoted = Vec::new();
                }
                _ => break,
            }
        }
        Ok(ops)
    }

    pub fn apply_all(&mut self, ops: &[GroupOp]) -> Result<()> {
        for (done, op) in ops.iter().enumerate() {
            if let Err(err) = self.apply(op) {
                self.revert(&ops[..done]);
                return Err(err);
            }
        }
        Ok(())
    }

    /// Undo already applied ops, last first.
    pub fn revert(&mut self, ops: &[GroupOp]) {
        for op in ops.iter().rev() {
            if let Err(err) = self.apply(&op.inverse()) {
                error!(error = %err, "failed to revert group op");
            }
        }
    }

    pub fn apply(&mut self, op: &GroupOp) -> Result<()> {
        match *op {
            GroupOp::CreateGroup { group, kind } => {
                if !group.is_group() || self.contains(group) || kind == GroupType::Leaf {
                    return Err(ProEditError::Internal(format!("cannot create group {group}")));
                }
                self.up.insert(group, None);
                self.down.insert(group, BTreeSet::new());
                self.kinds.insert(group, kind);
                Ok(())
            }
            GroupOp::DestroyGroup { group, .. } => {
                let childless = self.down.get(&group).is_some_and(|c| c.is_empty());
                if !childless || self.direct_ancestor(group).is_some() {
                    return Err(ProEditError::Internal(format!("cannot destroy group {group}")));
                }
                self.up.remove(&group);
                self.down.remove(&group);
                self.kinds.remove(&group);
                Ok(())
            }
            GroupOp::SetParent { node, from, to } => {
                if self.up.get(&node) != Some(&from) {
                    let msg = format!("{node} is not a child of {from:?}");
                    return Err(ProEditError::Internal(msg));
                }
                if let Some(target) = to {
                    if !self.kinds.contains_key(&target) || self.subtree(node).contains(&target) {
                        let msg = format!("cannot attach {node} under {target}");
                        return Err(ProEditError::Internal(msg));
                    }
                }
                if let Some(old) = from {
                    if let Some(children) = self.down.get_mut(&old) {
                        children.remove(&node);
                    }
                }
                if let Some(new) = to {
                    if let Some(children) = self.down.get_mut(&new) {
                        children.insert(node);
                    }
                }
                self.up.insert(node, to);
                Ok(())
            }
        }
    }

    /// Top-level groups to persist, Selection groups replaced by their
    /// child groups.
    pub fn persistent_roots(&self) -> BTreeSet<ItemId> {
        let mut roots = BTreeSet::new();
        for gid in self.kinds.keys() {
            let root = self.root_id(*gid);
            if self.kind(root) == GroupType::Selection {
                let members = self.direct_children(root);
                roots.extend(members.into_iter().filter(|c| self.kinds.contains_key(c)));
            } else {
                roots.insert(root);
            }
        }
        roots
    }

    /// Serialize the forest; `locate` gives (track position, position) of a leaf.
    pub fn to_json(
        &self,
        locate: impl Fn(ItemId) -> Option<(usize, i64)>,
    ) -> Result<Vec<GroupNode>> {
        self.persistent_roots()
            .into_iter()
            .map(|root| self.node_to_json(root, &locate))
            .collect()
    }

    fn node_to_json(
        &self,
        id: ItemId,
        locate: &impl Fn(ItemId) -> Option<(usize, i64)>,
    ) -> Result<GroupNode> {
        if let Some(kind) = self.kinds.get(&id) {
            let children = self
                .direct_children(id)
                .into_iter()
                .map(|child| self.node_to_json(child, locate))
                .collect::<Result<Vec<_>>>()?;
            return Ok(GroupNode {
                kind: *kind,
                children,
                leaf: None,
                data: None,
            });
        }
        let (track, position) = locate(id)
            .ok_or_else(|| ProEditError::Serialization(format!("{id} is not on a track")))?;
        let kind = if id.is_clip() { LeafKind::Clip } else { LeafKind::Composition };
        Ok(GroupNode::leaf(kind, track, position))
    }

    /// Rebuild groups from JSON; `resolve` maps a serialized leaf to an item.
    ///
    /// All or nothing: on error every op already applied is reverted.
    pub fn from_json(
        &mut self,
        nodes: &[GroupNode],
        resolve: impl Fn(LeafKind, usize, i64) -> Option<ItemId>,
    ) -> Result<Vec<GroupOp>> {
        let mut journal = Vec::new();
        for node in nodes {
            if let Err(err) = self.node_from_json(node, &resolve, &mut journal) {
                self.revert(&journal);
                return Err(err);
            }
        }
        Ok(journal)
    }

    fn node_from_json(
        &mut self,
        node: &GroupNode,
        resolve: &impl Fn(LeafKind, usize, i64) -> Option<ItemId>,
        journal: &mut Vec<GroupOp>,
    ) -> Result<ItemId> {
        if node.kind == GroupType::Leaf {
            let kind = node
                .leaf
                .ok_or_else(|| ProEditError::Serialization("leaf without kind".into()))?;
            let (track, position) = node.location().ok_or_else(|| {
                ProEditError::Serialization(format!("bad leaf data {:?}", node.data))
            })?;
            return resolve(kind, track, position).ok_or_else(|| {
                ProEditError::Serialization(format!("no {kind:?} at {track}:{position}"))
            });
        }
        if node.kind == GroupType::Selection {
            return Err(ProEditError::Serialization("selection groups are not persisted".into()));
        }
        if node.children.is_empty() {
            return Err(ProEditError::Serialization("group without children".into()));
        }
        let mut ids = Vec::with_capacity(node.children.len());
        for child in &node.children {
            ids.push(self.node_from_json(child, resolve, journal)?);
        }
        let (gid, ops) = self.group_items(&ids, node.kind)?;
        journal.extend(ops);
        Ok(gid)
    }

    pub fn check_consistency(&self) -> Result<()> {
        let fail = |msg: String| Err(ProEditError::Consistency(format!("groups: {msg}")));
        if self.up.len() != self.down.len() {
            return fail("up/down link count mismatch".into());
        }
        let mut selections = 0;
        for (node, parent) in &self.up {
            let Some(children) = self.down.get(node) else {
                return fail(format!("{node} has no down link"));
            };
            for child in children {
                if self.up.get(child) != Some(&Some(*node)) {
                    return fail(format!("{child} does not point back to {node}"));
                }
            }
            if let Some(parent) = parent {
                if !self.down.get(parent).is_some_and(|c| c.contains(node)) {
                    return fail(format!("{parent} does not list {node}"));
                }
            }
            match (node.is_group(), self.kinds.get(node)) {
                (true, None) | (false, Some(_)) => {
                    return fail(format!("{node} has a wrong group tag"))
                }
                (true, Some(GroupType::Leaf)) => return fail(format!("{node} is an internal Leaf")),
                (true, Some(GroupType::Selection)) => {
                    selections += 1;
                    if parent.is_some() {
                        return fail(format!("selection {node} is nested"));
                    }
                }
                _ => {}
            }
            if node.is_group() && children.is_empty() {
                return fail(format!("group {node} has no children"));
            }
        }
        if selections > 1 {
            return fail(format!("{selections} selection groups"));
        }
        // Every node must be reached exactly once from the roots.
        let mut visited = HashSet::new();
        for (node, parent) in &self.up {
            if parent.is_some() {
                continue;
            }
            let mut stack = vec![*node];
            while let Some(current) = stack.pop() {
                if !visited.insert(current) {
                    return fail(format!("cycle through {current}"));
                }
                stack.extend(self.down.get(&current).into_iter().flatten().copied());
            }
        }
        if visited.len() != self.up.len() {
            return fail("unreachable nodes".into());
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────
