//! Composition insertion and moves.

use proedit_core::{ItemId, ProEditError, Result};
use tracing::debug;

use super::{EditOptions, TimelineModel};
use crate::composition::{ATrack, CompositionSnapshot};
use crate::edit::EditCommand;
use crate::item::ItemBounds;

impl TimelineModel {
    /// What a requested A-track means for a composition on `track`: nothing
    /// or the composition's own track falls back to the default.
    fn normalize_a_track(&self, a_track: Option<ATrack>, track: ItemId) -> Result<ATrack> {
        match a_track {
            None => Ok(ATrack::Auto),
            Some(ATrack::Track(id)) if id == track => Ok(ATrack::Auto),
            Some(ATrack::Track(id)) => {
                self.require_track(id)?;
                Ok(ATrack::Track(id))
            }
            Some(other) => Ok(other),
        }
    }

    /// Create a `service` transition covering `[position, position + length)`
    /// on `track`.
    pub fn request_composition_insertion(
        &mut self,
        service: &str,
        track: ItemId,
        position: i64,
        length: i64,
        a_track: Option<ATrack>,
    ) -> Result<ItemId> {
        debug!(service, track = %track, position, length, "request_composition_insertion");
        self.require_track(track)?;
        if length <= 0 {
            return Err(ProEditError::InvalidParameter(format!("composition length {length}")));
        }
        if self.is_audio_track(track) {
            return Err(ProEditError::InvalidParameter(format!(
                "compositions cannot go on audio track {track}"
            )));
        }
        let snapshot = CompositionSnapshot {
            id: ItemId::new_composition(),
            service: service.to_string(),
            bounds: ItemBounds::with_length(position, length),
            a_track: self.normalize_a_track(a_track, track)?,
        };
        let id = snapshot.id;
        self.transact("Insert composition", EditOptions::default(), |model, tx| {
            model.exec(tx, EditCommand::RegisterComposition { composition: snapshot })?;
            model.exec(tx, EditCommand::InsertItem { track, item: id, position })?;
            Ok(id)
        })
    }

    /// Move a composition, dragging its group along if it has one.
    pub fn request_composition_move(
        &mut self,
        composition: ItemId,
        track: ItemId,
        position: i64,
        options: EditOptions,
    ) -> Result<()> {
        debug!(composition = %composition, track = %track, position, "request_composition_move");
        if !self.is_composition(composition) {
            return Err(ProEditError::NotFound(format!("no composition {composition}")));
        }
        self.require_track(track)?;
        self.transact("Move composition", options, |model, tx| {
            model.move_in(tx, composition, track, position)
        })
    }

    /// Move a composition and blend it over `a_track` (the default A-track
    /// when `None`).
    pub fn request_composition_move_to(
        &mut self,
        composition: ItemId,
        track: ItemId,
        a_track: Option<ATrack>,
        position: i64,
        options: EditOptions,
    ) -> Result<()> {
        debug!(
            composition = %composition,
            track = %track,
            ?a_track,
            position,
            "request_composition_move_to"
        );
        let current = self
            .composition(composition)
            .map(|c| c.a_track())
            .ok_or_else(|| ProEditError::NotFound(format!("no composition {composition}")))?;
        self.require_track(track)?;
        let target = self.normalize_a_track(a_track, track)?;
        self.transact("Move composition", options, |model, tx| {
            model.move_in(tx, composition, track, position)?;
            if current != target {
                model.exec(
                    tx,
                    EditCommand::SetATrack {
                        composition,
                        from: current,
                        to: target,
                    },
                )?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MediaEngine, PlantedTransition};
    use crate::timeline::tests::harness;

    #[test]
    fn test_composition_blends_over_lower_video_track() {
        let mut h = harness();
        h.track(false);
        h.track(true);
        let v2 = h.track(false);
        let compo = h
            .model
            .request_composition_insertion("luma", v2, 10, 20, None)
            .unwrap();
        let transition = h.model.composition(compo).unwrap().transition();
        assert_eq!(
            h.engine.planted_transitions(),
            vec![PlantedTransition {
                transition,
                a_track: 1,
                b_track: 3
            }]
        );
        assert_eq!(h.engine.transition_range(transition), Some((10, 29)));
        assert_eq!(h.engine.field_lock_depth(), 0);
        h.check();

        let options = EditOptions::default();
        h.model
            .request_composition_move_to(compo, v2, Some(ATrack::Background), 10, options)
            .unwrap();
        assert_eq!(h.engine.planted_transitions()[0].a_track, 0);
        h.model
            .request_composition_move_to(compo, v2, Some(ATrack::Track(v2)), 10, options)
            .unwrap();
        assert_eq!(h.model.composition_a_track(compo), Some(ATrack::Auto));
        h.check();
    }

    #[test]
    fn test_composition_rejects_audio_track() {
        let mut h = harness();
        let a1 = h.track(true);
        let v1 = h.track(false);
        assert!(matches!(
            h.model.request_composition_insertion("luma", a1, 0, 10, None),
            Err(ProEditError::InvalidParameter(_))
        ));
        let compo = h
            .model
            .request_composition_insertion("luma", v1, 0, 10, None)
            .unwrap();
        let err = h
            .model
            .request_composition_move(compo, a1, 0, EditOptions::default())
            .unwrap_err();
        assert!(err.is_infeasible());
        assert_eq!(h.model.item_track(compo), Some(v1));
        h.check();
    }

    #[test]
    fn test_plant_failure_unwinds_insertion() {
        let mut h = harness();
        h.track(false);
        let v2 = h.track(false);
        h.engine.fail_next_plant();
        let err = h
            .model
            .request_composition_insertion("luma", v2, 0, 10, None)
            .unwrap_err();
        assert!(matches!(err, ProEditError::Engine(_)));
        assert_eq!(h.model.composition_ids().count(), 0);
        assert_eq!(h.engine.live_transitions(), 0);
        assert!(h.engine.planted_transitions().is_empty());
        h.check();
    }

    #[test]
    fn test_composition_move_and_suggest() {
        let mut h = harness();
        h.track(false);
        let v2 = h.track(false);
        let compo = h
            .model
            .request_composition_insertion("luma", v2, 0, 10, None)
            .unwrap();
        h.model
            .request_composition_move(compo, v2, 40, EditOptions::default())
            .unwrap();
        assert_eq!(h.model.item_position(compo), Some(40));
        let transition = h.model.composition(compo).unwrap().transition();
        assert_eq!(h.engine.transition_range(transition), Some((40, 49)));
        let (position, track) = h
            .model
            .suggest_composition_move(compo, v2, 7, None, 0)
            .unwrap();
        assert_eq!((position, track), (7, v2));
        h.model.undo().unwrap();
        assert_eq!(h.model.item_position(compo), Some(0));
        h.check();
    }
}
