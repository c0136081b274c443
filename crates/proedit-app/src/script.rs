//! Edit scripts: a JSON list of timeline requests replayed in order.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use proedit_core::ItemId;
use proedit_timeline::{
    ATrack, BinClipInfo, EditOptions, GroupType, InMemoryContext, MarkerListModel, MemoryEngine,
    TimelineConfig, TimelineModel,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub config: TimelineConfig,
    /// Bin clips keyed by bin id.
    #[serde(default)]
    pub bins: HashMap<String, BinClipInfo>,
    /// Marker list whose positions become snap guides.
    #[serde(default)]
    pub markers: Option<serde_json::Value>,
    pub steps: Vec<Step>,
}

/// One request. Tracks are referred to by name, items by the label given
/// when they were inserted or grouped.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    InsertTrack {
        name: String,
        #[serde(default)]
        audio: bool,
        position: Option<usize>,
    },
    DeleteTrack {
        track: String,
    },
    LockTrack {
        track: String,
        #[serde(default = "yes")]
        locked: bool,
    },
    InsertClip {
        label: String,
        /// `bin_id[/in/out]`
        bin: String,
        track: String,
        position: i64,
    },
    InsertComposition {
        label: String,
        service: String,
        track: String,
        position: i64,
        length: i64,
        /// "auto", "background" or a track name.
        a_track: Option<String>,
    },
    Move {
        item: String,
        track: String,
        position: i64,
    },
    MoveGroup {
        item: String,
        delta_track: isize,
        delta_pos: i64,
    },
    Resize {
        item: String,
        size: i64,
        #[serde(default = "yes")]
        right: bool,
        #[serde(default)]
        snap: bool,
    },
    Slip {
        item: String,
        offset: i64,
    },
    Speed {
        item: String,
        speed: f64,
    },
    Group {
        label: String,
        items: Vec<String>,
    },
    Ungroup {
        item: String,
    },
    RemoveFromGroup {
        item: String,
    },
    Select {
        items: Vec<String>,
    },
    Delete {
        item: String,
    },
    Guide {
        position: i64,
    },
    Undo,
    Redo,
}

fn yes() -> bool {
    true
}

impl Script {
    pub fn load(path: &Path) -> Result<Self> {
        let data =
            std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("{} is not a valid edit script", path.display()))
    }
}

/// Outcome counters of a run.
#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub applied: usize,
    pub refused: usize,
}

pub struct Runner {
    pub model: TimelineModel,
    engine: Arc<MemoryEngine>,
    tracks: HashMap<String, ItemId>,
    items: HashMap<String, ItemId>,
    guides: Vec<i64>,
    check: bool,
}

impl Runner {
    pub fn new(script: &Script, check: bool) -> Result<Self> {
        let engine = MemoryEngine::shared();
        let context = Arc::new(InMemoryContext::new());
        for (bin_id, info) in &script.bins {
            context.add_bin_clip(bin_id.clone(), info.clone());
        }
        let check = check || script.config.check_consistency;
        let mut model = TimelineModel::new(engine.clone(), context, script.config.clone());

        let mut guides = Vec::new();
        if let Some(markers) = &script.markers {
            let mut list = MarkerListModel::default();
            let imported = list.import_json(&markers.to_string(), true)?;
            guides = list.snap_positions();
            for guide in &guides {
                model.add_snap(*guide);
            }
            info!(imported, "markers loaded as guides");
        }

        Ok(Self {
            model,
            engine,
            tracks: HashMap::new(),
            items: HashMap::new(),
            guides,
            check,
        })
    }

    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    pub fn run(&mut self, steps: &[Step]) -> Result<Report> {
        let mut report = Report::default();
        for (index, step) in steps.iter().enumerate() {
            debug!(index, ?step, "step");
            match self.apply(step) {
                Ok(()) => {
                    report.applied += 1;
                    info!(index, duration = self.model.duration(), "step applied");
                }
                Err(err) => {
                    report.refused += 1;
                    warn!(index, error = %err, "step refused");
                }
            }
            if self.check {
                self.model
                    .check_consistency_with_guides(&self.guides)
                    .with_context(|| format!("timeline inconsistent after step {index}"))?;
            }
        }
        Ok(report)
    }

    fn track(&self, name: &str) -> Result<ItemId> {
        self.tracks.get(name).copied().ok_or_else(|| anyhow!("unknown track {name}"))
    }

    fn item(&self, label: &str) -> Result<ItemId> {
        self.items.get(label).copied().ok_or_else(|| anyhow!("unknown item {label}"))
    }

    fn a_track(&self, a_track: Option<&str>) -> Result<Option<ATrack>> {
        Ok(match a_track {
            None | Some("auto") => None,
            Some("background") => Some(ATrack::Background),
            Some(name) => Some(ATrack::Track(self.track(name)?)),
        })
    }

    fn apply(&mut self, step: &Step) -> Result<()> {
        let options = EditOptions::default();
        match step {
            Step::InsertTrack { name, audio, position } => {
                if self.tracks.contains_key(name) {
                    bail!("track {name} already exists");
                }
                let id = self.model.request_track_insertion(*position, name, *audio)?;
                self.tracks.insert(name.clone(), id);
            }
            Step::DeleteTrack { track } => {
                let id = self.track(track)?;
                self.model.request_track_deletion(id)?;
            }
            Step::LockTrack { track, locked } => {
                let track = self.track(track)?;
                self.model.set_track_locked_state(track, *locked)?;
            }
            Step::InsertClip {
                label,
                bin,
                track,
                position,
            } => {
                let track = self.track(track)?;
                let id = self.model.request_clip_insertion(bin, track, *position, options)?;
                self.items.insert(label.clone(), id);
            }
            Step::InsertComposition {
                label,
                service,
                track,
                position,
                length,
                a_track,
            } => {
                let a_track = self.a_track(a_track.as_deref())?;
                let track = self.track(track)?;
                let id = self
                    .model
                    .request_composition_insertion(service, track, *position, *length, a_track)?;
                self.items.insert(label.clone(), id);
            }
            Step::Move { item, track, position } => {
                let id = self.item(item)?;
                let track = self.track(track)?;
                if id.is_clip() {
                    self.model.request_clip_move(id, track, *position, options)?;
                } else {
                    self.model.request_composition_move(id, track, *position, options)?;
                }
            }
            Step::MoveGroup {
                item,
                delta_track,
                delta_pos,
            } => {
                let id = self.item(item)?;
                let root = self.model.groups().root_id(id);
                self.model.request_group_move(id, root, *delta_track, *delta_pos, options)?;
            }
            Step::Resize { item, size, right, snap } => {
                let id = self.item(item)?;
                let snap_distance = if *snap { self.model.config().snap_distance } else { 0 };
                self.model
                    .request_item_resize(id, *size, *right, true, snap_distance, false)?;
            }
            Step::Slip { item, offset } => {
                let id = self.item(item)?;
                self.model.request_clip_slip(id, *offset, true, false)?;
            }
            Step::Speed { item, speed } => {
                let id = self.item(item)?;
                self.model.request_clip_speed_change(id, *speed)?;
            }
            Step::Group { label, items } => {
                let ids = items.iter().map(|i| self.item(i)).collect::<Result<Vec<_>>>()?;
                let group = self.model.request_clips_group(&ids, GroupType::Normal)?;
                self.items.insert(label.clone(), group);
            }
            Step::Ungroup { item } => {
                let id = self.item(item)?;
                self.model.request_clip_ungroup(id)?;
            }
            Step::RemoveFromGroup { item } => {
                let id = self.item(item)?;
                self.model.request_remove_from_group(id)?;
            }
            Step::Select { items } => {
                let ids = items.iter().map(|i| self.item(i)).collect::<Result<Vec<_>>>()?;
                self.model.request_set_selection(&ids)?;
            }
            Step::Delete { item } => {
                let id = self.item(item)?;
                self.model.request_item_deletion(id, true)?;
            }
            Step::Guide { position } => {
                self.model.add_snap(*position);
                self.guides.push(*position);
            }
            Step::Undo => {
                if !self.model.undo()? {
                    bail!("nothing to undo");
                }
            }
            Step::Redo => {
                if !self.model.redo()? {
                    bail!("nothing to redo");
                }
            }
        }
        Ok(())
    }
}
