//! Track insertion, deletion and properties.

use proedit_core::{ItemId, ProEditError, Result};
use tracing::{debug, info};

use super::{EditOptions, TimelineModel};
use crate::composition::ATrack;
use crate::edit::EditCommand;
use crate::item::Positioned;
use crate::track::{TrackKind, TrackProperty, TrackSettings, TrackSnapshot};

impl TimelineModel {
    /// Insert a new track at `position` (on top when `None`) and return its id.
    pub fn request_track_insertion(
        &mut self,
        position: Option<usize>,
        name: &str,
        audio: bool,
    ) -> Result<ItemId> {
        let position = position.unwrap_or(self.tracks.len());
        debug!(position, name, audio, "request_track_insertion");
        if position > self.tracks.len() {
            return Err(ProEditError::InvalidParameter(format!(
                "track position {position} out of range (0..={})",
                self.tracks.len()
            )));
        }
        let kind = if audio { TrackKind::Audio } else { TrackKind::Video };
        let track = TrackSnapshot {
            id: ItemId::new_track(),
            settings: TrackSettings::new(name, kind, self.config.track_height(audio)),
        };
        let id = track.id;
        self.transact("Insert track", EditOptions::default(), |model, tx| {
            model.exec(tx, EditCommand::InsertTrack { track, position })?;
            Ok(id)
        })?;
        info!(track = %id, position, ?kind, "track inserted");
        Ok(id)
    }

    /// Delete a track together with everything on it.
    ///
    /// Compositions blending over the track fall back to their default
    /// A-track, and groups reaching into the track are dissolved. The last
    /// remaining track cannot be deleted.
    pub fn request_track_deletion(&mut self, track: ItemId) -> Result<()> {
        debug!(track = %track, "request_track_deletion");
        let position = self.require_track(track)?;
        if self.tracks.len() < 2 {
            return Err(ProEditError::InvalidParameter("cannot delete the last track".into()));
        }
        self.clear_selection_silently();
        self.transact("Delete track", EditOptions::default(), |model, tx| {
            let mut forced: Vec<ItemId> = model
                .compositions
                .values()
                .filter(|c| c.a_track() == ATrack::Track(track))
                .map(|c| c.id())
                .collect();
            forced.sort_unstable();
            for composition in forced {
                model.exec(
                    tx,
                    EditCommand::SetATrack {
                        composition,
                        from: ATrack::Track(track),
                        to: ATrack::Auto,
                    },
                )?;
            }

            let items = model.tracks[position].items_in_range(0, None, true);
            for item in &items {
                while model.groups.is_in_group(*item) {
                    let root = model.groups.root_id(*item);
                    model.ungroup_in(tx, root)?;
                }
            }
            for item in items {
                model.delete_item_in(tx, item)?;
            }

            let snapshot = model.tracks[position].snapshot();
            model.exec(tx, EditCommand::RemoveTrack { track: snapshot, position })
        })
    }

    /// Lock or unlock a track. Locked tracks refuse every item edit.
    pub fn set_track_locked_state(&mut self, track: ItemId, locked: bool) -> Result<()> {
        self.set_track_property(track, TrackProperty::Locked(locked))
    }

    /// Change one track setting as an undoable request.
    pub fn set_track_property(&mut self, track: ItemId, property: TrackProperty) -> Result<()> {
        debug!(track = %track, ?property, "set_track_property");
        let position = self.require_track(track)?;
        let from = self.tracks[position].settings().clone();
        let to = from.with(property);
        if from == to {
            return Ok(());
        }
        self.transact("Update track", EditOptions::default(), |model, tx| {
            model.exec(tx, EditCommand::UpdateTrack { track, from, to })
        })
    }
}
