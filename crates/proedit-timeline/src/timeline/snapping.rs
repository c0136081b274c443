//! Snap queries over the timeline's snap index.

use super::TimelineModel;

impl TimelineModel {
    /// `position` pulled to the nearest snap point closer than
    /// `snap_distance`, or unchanged.
    pub fn suggest_snap_point(&self, position: i64, snap_distance: i64) -> i64 {
        match self.snaps.closest_point(position) {
            Some(snapped)
                if snap_distance > 0 && snapped.abs_diff(position) < snap_distance as u64 =>
            {
                snapped
            }
            _ => position,
        }
    }

    /// Snap a set of moving boundaries.
    ///
    /// `pts` are the current boundaries of the moving items and `diff` the
    /// drag offset; the boundary that lands closest to a foreign snap point
    /// (or the cursor) wins. Returns where `reference_pos` must go for that
    /// boundary to sit exactly on the point, or `None` if nothing is within
    /// `snap_distance`.
    pub fn best_snap_pos(
        &mut self,
        reference_pos: i64,
        diff: i64,
        pts: &[i64],
        cursor: Option<i64>,
        snap_distance: i64,
    ) -> Option<i64> {
        if pts.is_empty() {
            return None;
        }
        let mut lowest = u64::try_from(snap_distance).ok()?.saturating_add(1);
        let mut snaps = self.snaps.ignore(pts);
        if let Some(cursor) = cursor {
            snaps.add_point(cursor);
        }
        let mut candidates = pts.to_vec();
        candidates.sort_unstable();
        candidates.dedup();

        let mut closest = None;
        for pt in candidates {
            let moved = pt.saturating_add(diff);
            let Some(snapped) = snaps.closest_point(moved) else {
                continue;
            };
            let distance = moved.abs_diff(snapped);
            if distance < lowest {
                lowest = distance;
                closest = Some(snapped - (pt - reference_pos));
                if lowest < 2 {
                    break;
                }
            }
        }
        if let Some(cursor) = cursor {
            snaps.remove_point(cursor);
        }
        closest
    }

    /// Next snap point after `position`, not counting `pts`.
    pub fn next_snap_pos(&mut self, position: i64, pts: &[i64]) -> i64 {
        self.snaps.ignore(pts).next_point(position)
    }

    /// Previous snap point before `position`, not counting `pts`.
    pub fn previous_snap_pos(&mut self, position: i64, pts: &[i64]) -> i64 {
        self.snaps.ignore(pts).previous_point(position)
    }

    /// Add a guide snap point.
    pub fn add_snap(&mut self, position: i64) {
        self.snaps.add_point(position);
    }

    pub fn remove_snap(&mut self, position: i64) -> bool {
        self.snaps.remove_point(position)
    }
}

#[cfg(test)]
mod tests {
    use crate::timeline::tests::harness;

    #[test]
    fn test_suggest_snap_point_is_strict() {
        let mut h = harness();
        let v1 = h.track(false);
        h.clip("v", 10, v1, 20);
        assert_eq!(h.model.suggest_snap_point(17, 5), 20);
        assert_eq!(h.model.suggest_snap_point(15, 5), 15);
        assert_eq!(h.model.suggest_snap_point(28, 5), 30);
    }

    #[test]
    fn test_best_snap_pos() {
        let mut h = harness();
        let v1 = h.track(false);
        h.clip("v", 10, v1, 0);
        h.clip("v", 10, v1, 100);
        // Item [40, 50) dragged by +52: its end lands at 102, next to 100.
        assert_eq!(h.model.best_snap_pos(40, 52, &[40, 50], None, 5), Some(90));
        assert_eq!(h.model.best_snap_pos(40, 30, &[40, 50], None, 5), None);
        assert_eq!(h.model.best_snap_pos(40, 30, &[40, 50], Some(69), 5), Some(69));
        assert_eq!(h.model.best_snap_pos(40, 30, &[], Some(69), 5), None);
        assert!(!h.model.snaps().contains(69));
        assert_eq!(h.model.snaps().count(0), 1);
    }

    #[test]
    fn test_ignored_neighbours() {
        let mut h = harness();
        let v1 = h.track(false);
        h.clip("v", 10, v1, 0);
        h.clip("v", 10, v1, 30);
        assert_eq!(h.model.next_snap_pos(10, &[]), 30);
        assert_eq!(h.model.next_snap_pos(10, &[30]), 40);
        assert_eq!(h.model.previous_snap_pos(30, &[10]), 0);
        assert_eq!(h.model.snaps().count(30), 1);
    }

    #[test]
    fn test_guides() {
        let mut h = harness();
        h.model.add_snap(12);
        assert_eq!(h.model.suggest_snap_point(10, 3), 12);
        assert!(h.model.remove_snap(12));
        assert!(!h.model.remove_snap(12));
    }
}
