//! Whole-model invariant checks.
//!
//! Used after every step by the test suites and the replay tool. A failure
//! names the first broken invariant and is also logged at error level.

use std::collections::{BTreeMap, BTreeSet};

use proedit_core::{ItemId, ProEditError, Result};
use rayon::prelude::*;
use tracing::error;

use super::TimelineModel;
use crate::engine::{MediaEngine, PlantedTransition};
use crate::item::{Positioned, Resizable};

fn fail<T>(msg: String) -> Result<T> {
    Err(ProEditError::Consistency(msg))
}

impl TimelineModel {
    /// Verify every cross-structure invariant of the model.
    pub fn check_consistency(&self) -> Result<()> {
        self.check_consistency_with_guides(&[])
    }

    /// Same as [`check_consistency`](Self::check_consistency), with `guides`
    /// counted as extra snap points.
    pub fn check_consistency_with_guides(&self, guides: &[i64]) -> Result<()> {
        let result = self
            .check_tracks()
            .and_then(|_| self.check_snaps(guides))
            .and_then(|_| self.check_groups())
            .and_then(|_| self.check_selection())
            .and_then(|_| self.check_bin_registrations())
            .and_then(|_| self.check_engine())
            .and_then(|_| self.check_duration());
        if let Err(err) = &result {
            error!(timeline = %self.uuid, error = %err, "consistency check failed");
        }
        result
    }

    fn check_tracks(&self) -> Result<()> {
        self.tracks
            .par_iter()
            .try_for_each(|track| track.check_consistency(&self.clips, &self.compositions))?;

        let claimed = self
            .clips
            .values()
            .map(|c| c as &dyn Resizable)
            .chain(self.compositions.values().map(|c| c as &dyn Resizable));
        for item in claimed {
            let Some(track) = item.current_track() else {
                continue;
            };
            match self.track(track) {
                Some(t) if t.contains(item.id()) => {}
                Some(_) => return fail(format!("{} claims {track} but is not on it", item.id())),
                None => return fail(format!("{} is on unknown {track}", item.id())),
            }
        }
        Ok(())
    }

    fn check_snaps(&self, guides: &[i64]) -> Result<()> {
        let mut expected: BTreeMap<i64, usize> = BTreeMap::new();
        let placed = self
            .clips
            .values()
            .map(|c| c as &dyn Resizable)
            .chain(self.compositions.values().map(|c| c as &dyn Resizable))
            .filter(|item| item.current_track().is_some());
        for item in placed {
            *expected.entry(item.position()).or_default() += 1;
            *expected.entry(item.end()).or_default() += 1;
        }
        for guide in guides {
            *expected.entry(*guide).or_default() += 1;
        }
        let actual: BTreeMap<i64, usize> = self.snaps.points().collect();
        if actual != expected {
            return fail(format!("snap points {actual:?} differ from item boundaries {expected:?}"));
        }
        Ok(())
    }

    fn check_groups(&self) -> Result<()> {
        self.groups.check_consistency()?;
        let items = self.clips.len() + self.compositions.len();
        if self.groups.leaf_count() != items {
            return fail(format!(
                "{} group leaves for {items} items",
                self.groups.leaf_count()
            ));
        }
        let mut ids = self.clip_ids().chain(self.composition_ids());
        if let Some(id) = ids.find(|id| !self.groups.contains(*id)) {
            return fail(format!("{id} has no group leaf"));
        }
        Ok(())
    }

    fn check_selection(&self) -> Result<()> {
        let selected = self.selection();
        if let Some(root) = self.selection {
            if !self.groups.contains(root) || self.groups.direct_ancestor(root).is_some() {
                return fail(format!("selection {root} is not a root"));
            }
        }
        if let Some(group) = self.groups.selection_group() {
            if self.selection != Some(group) {
                return fail(format!("stale selection group {group}"));
            }
        }
        for id in self.clip_ids().chain(self.composition_ids()) {
            if self.is_selected(id) != selected.contains(&id) {
                return fail(format!("selected flag of {id} disagrees with the selection"));
            }
        }
        Ok(())
    }

    fn check_bin_registrations(&self) -> Result<()> {
        let registered: BTreeSet<(String, ItemId)> =
            self.context.timeline_clips(self.uuid).into_iter().collect();
        let expected: BTreeSet<(String, ItemId)> = self
            .clips
            .values()
            .map(|c| (c.bin_id().to_string(), c.id()))
            .collect();
        if registered != expected {
            return fail(format!("bin registrations {registered:?} differ from clips {expected:?}"));
        }
        Ok(())
    }

    fn check_engine(&self) -> Result<()> {
        if self.engine.track_count() != self.tracks.len() + 1 {
            return fail(format!(
                "engine has {} tracks for {} timeline tracks",
                self.engine.track_count(),
                self.tracks.len()
            ));
        }
        for (position, track) in self.tracks.iter().enumerate() {
            if self.engine.track_index(track.native()) != Some(position + 1) {
                return fail(format!("{} is not at engine index {}", track.id(), position + 1));
            }
        }

        let mut expected: Vec<PlantedTransition> = self
            .compositions
            .values()
            .filter_map(|compo| {
                let position = self.track_position(compo.current_track()?)?;
                Some(PlantedTransition {
                    transition: compo.transition(),
                    a_track: self.resolve_a_track(compo.a_track(), position),
                    b_track: position + 1,
                })
            })
            .collect();
        expected.sort_by_key(|p| p.transition);
        let planted = self.engine.planted_transitions();
        if planted != expected {
            return fail(format!("planted transitions {planted:?} differ from {expected:?}"));
        }
        Ok(())
    }

    fn check_duration(&self) -> Result<()> {
        let computed = self.computed_duration();
        if self.duration != computed {
            return fail(format!("duration {} but tracks end at {computed}", self.duration));
        }
        Ok(())
    }
}
