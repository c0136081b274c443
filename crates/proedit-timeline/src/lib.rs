//! ProEdit Timeline - Timeline data model
//!
//! Implements the editing model behind the timeline view:
//! - Tracks holding clips and compositions, mirrored into a media engine
//! - A group forest with AV split pairs and a transient selection
//! - A snap index over every item boundary
//! - Atomic requests with undo/redo and whole-model consistency checks
//! - A row/role read model with change notifications for views

pub mod clip;
pub mod composition;
pub mod config;
pub mod context;
pub mod edit;
pub mod engine;
pub mod groups;
pub mod item;
pub mod markers;
pub mod serialization;
pub mod shared;
pub mod snap;
pub mod timeline;
pub mod track;
pub mod view;

pub use clip::{Clip, ClipKind, ClipSnapshot, ClipTiming, PlaylistState};
pub use composition::{ATrack, Composition, CompositionSnapshot};
pub use config::TimelineConfig;
pub use context::{BinClipInfo, InMemoryContext, TimelineContext};
pub use edit::{EditCommand, Transaction, UndoEntry, UndoStack};
pub use engine::{EngineHandle, FieldLock, MediaEngine, MemoryEngine, PlantedTransition};
pub use groups::{GroupNode, GroupOp, GroupType, GroupsModel};
pub use item::{ItemBounds, MoveableItem, Positioned, Resizable};
pub use markers::{Marker, MarkerListModel};
pub use serialization::HistoryFile;
pub use shared::{SharedTimeline, TimelineWriteGuard};
pub use snap::SnapModel;
pub use timeline::{BinRef, EditOptions, TimelineModel};
pub use track::{TrackKind, TrackModel, TrackProperty, TrackSettings, TrackSnapshot};
pub use view::{ModelChange, ModelIndex, Role, RoleValue};
