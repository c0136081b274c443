//! Display-facing read model.
//!
//! Views see the timeline as a two-level tree: tracks at depth 0 (in track
//! position order) and each track's items at depth 1 (clips by id, then
//! compositions by id). Cells are read through [`Role`]s, and every change is
//! announced as a [`ModelChange`] on the subscribers' channels.

use crossbeam_channel::{Receiver, Sender};
use proedit_core::ItemId;
use serde::Serialize;
use smallvec::SmallVec;

use crate::clip::PlaylistState;
use crate::composition::ATrack;
use crate::item::{Positioned, Resizable};
use crate::timeline::TimelineModel;
use crate::track::TrackModel;

/// Address of a track or item row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ModelIndex {
    pub row: usize,
    pub column: usize,
    pub id: ItemId,
}

/// Named data a view can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Role {
    Name,
    Resource,
    BinId,
    ServiceName,
    Start,
    Duration,
    MaxDuration,
    InPoint,
    OutPoint,
    TrackId,
    ItemId,
    /// Engine index of a composition's A-track.
    ItemATrack,
    Grouped,
    IsComposition,
    IsAudio,
    CanBeAudio,
    CanBeVideo,
    ClipState,
    IsLocked,
    IsMuted,
    IsHidden,
    Height,
    Speed,
    EffectNames,
    Grabbed,
    Selected,
    /// "V1", "A2", ...
    TrackTag,
}

pub type Roles = SmallVec<[Role; 4]>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RoleValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Id(ItemId),
    List(Vec<String>),
    State(PlaylistState),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ModelChange {
    /// Rows `first..=last` appeared under `parent` (`None`: track rows).
    RowsInserted {
        parent: Option<ModelIndex>,
        first: usize,
        last: usize,
    },
    RowsRemoved {
        parent: Option<ModelIndex>,
        first: usize,
        last: usize,
    },
    DataChanged { index: ModelIndex, roles: Roles },
    DurationChanged { duration: i64 },
}

/// Fan-out of model changes to any number of listeners.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Vec<Sender<ModelChange>>,
}

impl Notifier {
    pub fn subscribe(&mut self) -> Receiver<ModelChange> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Send to every live subscriber; dropped receivers are forgotten.
    pub fn emit(&mut self, change: ModelChange) {
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl TimelineModel {
    /// Receive every change this model announces from now on.
    pub fn subscribe(&mut self) -> Receiver<ModelChange> {
        self.notifier_mut().subscribe()
    }

    pub fn row_count(&self, parent: Option<&ModelIndex>) -> usize {
        match parent {
            None => self.tracks().len(),
            Some(index) if index.id.is_track() => {
                self.track(index.id).map_or(0, TrackModel::row_count)
            }
            Some(_) => 0,
        }
    }

    pub fn index(&self, row: usize, parent: Option<&ModelIndex>) -> Option<ModelIndex> {
        match parent {
            None => self.track_id_at(row).map(|id| ModelIndex { row, column: 0, id }),
            Some(index) => {
                let id = self.track(index.id)?.item_at_row(row)?;
                Some(ModelIndex { row, column: 0, id })
            }
        }
    }

    pub fn parent(&self, index: &ModelIndex) -> Option<ModelIndex> {
        let track = self.item_track(index.id)?;
        self.track_index(track)
    }

    pub fn track_index(&self, id: ItemId) -> Option<ModelIndex> {
        let row = self.track_position(id)?;
        Some(ModelIndex { row, column: 0, id })
    }

    pub fn item_index(&self, id: ItemId) -> Option<ModelIndex> {
        let track = self.track(self.item_track(id)?)?;
        let row = track.row_of(id)?;
        Some(ModelIndex { row, column: 0, id })
    }

    pub(crate) fn track_model_index(&self, position: usize) -> ModelIndex {
        let id = self.tracks()[position].id();
        ModelIndex {
            row: position,
            column: 0,
            id,
        }
    }

    pub(crate) fn notify_item_data(&mut self, item: ItemId, roles: Roles) {
        if let Some(index) = self.item_index(item) {
            self.notify(ModelChange::DataChanged { index, roles });
        }
    }

    pub fn data(&self, index: &ModelIndex, role: Role) -> Option<RoleValue> {
        match index.id {
            ItemId::Track(_) => self.track_data(index.id, role),
            ItemId::Clip(_) | ItemId::Composition(_) => self.item_data(index.id, role),
            ItemId::Group(_) => None,
        }
    }

    /// Short label of a track: video tracks count up from the bottom video
    /// track, audio tracks count down from the top audio track.
    pub fn track_tag(&self, id: ItemId) -> Option<String> {
        let position = self.track_position(id)?;
        let tracks = self.tracks();
        if tracks[position].is_audio() {
            let n = tracks[position..].iter().filter(|t| t.is_audio()).count();
            Some(format!("A{n}"))
        } else {
            let n = tracks[..=position].iter().filter(|t| !t.is_audio()).count();
            Some(format!("V{n}"))
        }
    }

    fn track_data(&self, id: ItemId, role: Role) -> Option<RoleValue> {
        let track = self.track(id)?;
        let settings = track.settings();
        Some(match role {
            Role::Name => RoleValue::Text(settings.name.clone()),
            Role::ItemId | Role::TrackId => RoleValue::Id(id),
            Role::IsAudio => RoleValue::Bool(track.is_audio()),
            Role::IsLocked => RoleValue::Bool(settings.locked),
            Role::IsMuted => RoleValue::Bool(settings.muted),
            Role::IsHidden => RoleValue::Bool(settings.hidden),
            Role::Height => RoleValue::Int(i64::from(settings.height)),
            Role::EffectNames => RoleValue::List(settings.effects.clone()),
            Role::Duration => RoleValue::Int(track.duration()),
            Role::TrackTag => RoleValue::Text(self.track_tag(id)?),
            _ => return None,
        })
    }

    fn item_data(&self, id: ItemId, role: Role) -> Option<RoleValue> {
        let item = self.item(id)?;
        let common = match role {
            Role::ItemId => Some(RoleValue::Id(id)),
            Role::TrackId => item.current_track().map(RoleValue::Id),
            Role::Start => Some(RoleValue::Int(item.position())),
            Role::Duration => Some(RoleValue::Int(item.playtime())),
            Role::InPoint => Some(RoleValue::Int(item.in_point())),
            Role::OutPoint => Some(RoleValue::Int(item.out_point())),
            Role::Grouped => Some(RoleValue::Bool(self.groups().is_in_group(id))),
            Role::IsComposition => Some(RoleValue::Bool(id.is_composition())),
            Role::IsAudio => Some(RoleValue::Bool(self.is_audio_item(id))),
            Role::Grabbed => Some(RoleValue::Bool(item.is_grabbed())),
            Role::Selected => Some(RoleValue::Bool(item.is_selected())),
            _ => None,
        };
        if common.is_some() {
            return common;
        }
        if let Some(clip) = self.clip(id) {
            return match role {
                Role::Name => Some(RoleValue::Text(clip.name().to_string())),
                Role::Resource => Some(RoleValue::Text(clip.resource().to_string())),
                Role::BinId => Some(RoleValue::Text(clip.bin_id().to_string())),
                Role::MaxDuration => Some(RoleValue::Int(clip.playable_length())),
                Role::CanBeAudio => Some(RoleValue::Bool(clip.kind().can_be_audio())),
                Role::CanBeVideo => Some(RoleValue::Bool(clip.kind().can_be_video())),
                Role::ClipState => Some(RoleValue::State(clip.state())),
                Role::Speed => Some(RoleValue::Float(clip.speed())),
                Role::EffectNames => Some(RoleValue::List(clip.effects().to_vec())),
                _ => None,
            };
        }
        let compo = self.composition(id)?;
        match role {
            Role::Name | Role::ServiceName => Some(RoleValue::Text(compo.service().to_string())),
            Role::ItemATrack => {
                let position = self.track_position(compo.current_track()?)?;
                let engine_index = self.resolve_a_track(compo.a_track(), position);
                Some(RoleValue::Int(engine_index as i64))
            }
            Role::CanBeAudio => Some(RoleValue::Bool(false)),
            Role::CanBeVideo => Some(RoleValue::Bool(true)),
            _ => None,
        }
    }

    /// A-track setting of a composition.
    pub fn composition_a_track(&self, id: ItemId) -> Option<ATrack> {
        self.composition(id).map(|c| c.a_track())
    }
}
