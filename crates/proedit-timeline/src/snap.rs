//! Reference-counted snap index.
//!
//! Every item boundary on the timeline contributes one reference to the
//! position it sits at; two clips touching at frame 100 give a count of 2.
//! Queries are O(log n) on a `BTreeMap`.

use std::collections::BTreeMap;
use std::ops::{Bound, Deref, DerefMut};

use tracing::warn;

/// Multiset of frame positions with nearest-point queries.
#[derive(Debug, Clone, Default)]
pub struct SnapModel {
    /// Position → reference count (never zero).
    points: BTreeMap<i64, usize>,
}

impl SnapModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference to `pos`.
    pub fn add_point(&mut self, pos: i64) {
        *self.points.entry(pos).or_insert(0) += 1;
    }

    /// Drop one reference to `pos`. Returns false if `pos` was not present,
    /// which means a caller lost track of its own boundaries.
    pub fn remove_point(&mut self, pos: i64) -> bool {
        match self.points.get_mut(&pos) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.points.remove(&pos);
                true
            }
            None => {
                warn!(pos, "removing a snap point that is not present");
                false
            }
        }
    }

    pub fn contains(&self, pos: i64) -> bool {
        self.points.contains_key(&pos)
    }

    /// Reference count stored at `pos`.
    pub fn count(&self, pos: i64) -> usize {
        self.points.get(&pos).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All points with their multiplicity, in ascending order.
    pub fn points(&self) -> impl Iterator<Item = (i64, usize)> + '_ {
        self.points.iter().map(|(pos, count)| (*pos, *count))
    }

    /// Nearest stored point. Ties go to the lower point.
    pub fn closest_point(&self, pos: i64) -> Option<i64> {
        let below = self.points.range(..=pos).next_back().map(|(p, _)| *p);
        let above = self.points.range(pos..).next().map(|(p, _)| *p);
        match (below, above) {
            (Some(lo), Some(hi)) => {
                if pos - lo <= hi - pos {
                    Some(lo)
                } else {
                    Some(hi)
                }
            }
            (lo, hi) => lo.or(hi),
        }
    }

    /// First point strictly after `pos`, or `pos` itself.
    pub fn next_point(&self, pos: i64) -> i64 {
        self.points
            .range((Bound::Excluded(pos), Bound::Unbounded))
            .next()
            .map(|(p, _)| *p)
            .unwrap_or(pos)
    }

    /// Last point strictly before `pos`, or 0.
    pub fn previous_point(&self, pos: i64) -> i64 {
        self.points
            .range(..pos)
            .next_back()
            .map(|(p, _)| *p)
            .unwrap_or(0)
    }

    /// Hide one occurrence of each listed point for the lifetime of the
    /// returned guard. Points that are not present are skipped.
    ///
    /// Guards nest: the guard derefs to the model, so a second `ignore` on it
    /// borrows the first guard and is released before it.
    pub fn ignore(&mut self, pts: &[i64]) -> SnapIgnore<'_> {
        let mut hidden = Vec::with_capacity(pts.len());
        for &pt in pts {
            if self.contains(pt) {
                self.remove_point(pt);
                hidden.push(pt);
            }
        }
        SnapIgnore {
            model: self,
            hidden,
        }
    }

    /// Snap-corrected size for resizing the item spanning `[in_pos, out_pos)`.
    ///
    /// Returns `None` when no point lies within `max_snap_dist` of the
    /// candidate edge.
    pub fn propose_size(
        &mut self,
        in_pos: i64,
        out_pos: i64,
        size: i64,
        right: bool,
        max_snap_dist: i64,
    ) -> Option<i64> {
        let own = [in_pos, out_pos];
        self.propose_size_with_boundaries(in_pos, out_pos, &own, size, right, max_snap_dist)
    }

    /// Same as [`propose_size`](Self::propose_size), ignoring an explicit
    /// boundary list (all edges of a resized group) instead of the item's own.
    pub fn propose_size_with_boundaries(
        &mut self,
        in_pos: i64,
        out_pos: i64,
        boundaries: &[i64],
        size: i64,
        right: bool,
        max_snap_dist: i64,
    ) -> Option<i64> {
        let snaps = self.ignore(boundaries);
        let target = if right {
            in_pos.saturating_add(size)
        } else {
            out_pos.saturating_sub(size)
        };
        let snapped = snaps.closest_point(target)?;
        if target.abs_diff(snapped) > max_snap_dist.unsigned_abs() {
            return None;
        }
        let proposed = if right { snapped - in_pos } else { out_pos - snapped };
        (proposed > 0).then_some(proposed)
    }
}

// ── Ignore guard ────────────────────────────────────────────────

/// Scope in which some snap points are hidden. Restores them on drop.
#[derive(Debug)]
pub struct SnapIgnore<'a> {
    model: &'a mut SnapModel,
    hidden: Vec<i64>,
}

impl SnapIgnore<'_> {
    /// Points hidden by this guard (not counting nested guards).
    pub fn hidden(&self) -> &[i64] {
        &self.hidden
    }
}

impl Deref for SnapIgnore<'_> {
    type Target = SnapModel;

    fn deref(&self) -> &SnapModel {
        self.model
    }
}

impl DerefMut for SnapIgnore<'_> {
    fn deref_mut(&mut self) -> &mut SnapModel {
        self.model
    }
}

impl Drop for SnapIgnore<'_> {
    fn drop(&mut self) {
        for pt in self.hidden.drain(..) {
            self.model.add_point(pt);
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
