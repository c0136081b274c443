//! Native media engine boundary.
//!
//! The timeline never decodes or composites anything itself. It drives an
//! engine that owns native tracks (playlists of producers), producers (cropped
//! media sources) and transitions planted between two tracks of the field.
//! Native objects are held through [`EngineHandle`], which releases them when
//! the owning model object goes away.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use proedit_core::{ProEditError, Result};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Opaque engine object id.
pub type RawHandle = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandleKind {
    Track,
    Producer,
    Transition,
}

/// One producer placed on a native playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaylistEntry {
    pub position: i64,
    pub length: i64,
    pub producer: RawHandle,
}

/// A transition currently planted in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlantedTransition {
    pub transition: RawHandle,
    /// Engine index of the lower ("A") track.
    pub a_track: usize,
    /// Engine index of the upper ("B") track.
    pub b_track: usize,
}

/// Commands the timeline issues to the playback/compositing backend.
///
/// Engine track index 0 is the black background track; user tracks start at 1.
pub trait MediaEngine: Send + Sync + fmt::Debug {
    /// Insert a native track at `index` (>= 1).
    fn insert_track(&self, index: usize, audio: bool) -> Result<RawHandle>;
    fn track_index(&self, track: RawHandle) -> Option<usize>;
    /// Number of native tracks, background included.
    fn track_count(&self) -> usize;
    fn track_length(&self, track: RawHandle) -> Result<i64>;
    fn playlist(&self, track: RawHandle) -> Result<Vec<PlaylistEntry>>;
    fn playlist_insert(
        &self,
        track: RawHandle,
        producer: RawHandle,
        position: i64,
        length: i64,
    ) -> Result<()>;
    /// Remove the entry starting at `position`, returning its producer.
    fn playlist_remove(&self, track: RawHandle, position: i64) -> Result<RawHandle>;

    fn create_producer(&self, resource: &str, length: i64) -> Result<RawHandle>;
    fn set_in_out(&self, producer: RawHandle, in_point: i64, out_point: i64) -> Result<()>;
    fn in_out(&self, producer: RawHandle) -> Option<(i64, i64)>;

    fn create_transition(&self, service: &str) -> Result<RawHandle>;
    fn set_transition_range(
        &self,
        transition: RawHandle,
        in_point: i64,
        out_point: i64,
    ) -> Result<()>;
    fn plant_transition(&self, transition: RawHandle, a_track: usize, b_track: usize) -> Result<()>;
    fn unplant_transition(&self, transition: RawHandle) -> Result<()>;
    fn planted_transitions(&self) -> Vec<PlantedTransition>;

    /// Hide field edits from the engine's consumer until `unlock_field`.
    fn lock_field(&self);
    fn unlock_field(&self);

    /// Destroy a native object. Called from [`EngineHandle::drop`].
    fn release(&self, handle: RawHandle, kind: HandleKind);
}

// ── Handles ─────────────────────────────────────────────────────

/// Owning reference to a native engine object.
pub struct EngineHandle {
    raw: RawHandle,
    kind: HandleKind,
    engine: Arc<dyn MediaEngine>,
}

impl EngineHandle {
    pub fn track(engine: &Arc<dyn MediaEngine>, index: usize, audio: bool) -> Result<Self> {
        let raw = engine.insert_track(index, audio)?;
        Ok(Self::wrap(engine, raw, HandleKind::Track))
    }

    pub fn producer(engine: &Arc<dyn MediaEngine>, resource: &str, length: i64) -> Result<Self> {
        let raw = engine.create_producer(resource, length)?;
        Ok(Self::wrap(engine, raw, HandleKind::Producer))
    }

    pub fn transition(engine: &Arc<dyn MediaEngine>, service: &str) -> Result<Self> {
        let raw = engine.create_transition(service)?;
        Ok(Self::wrap(engine, raw, HandleKind::Transition))
    }

    fn wrap(engine: &Arc<dyn MediaEngine>, raw: RawHandle, kind: HandleKind) -> Self {
        Self {
            raw,
            kind,
            engine: Arc::clone(engine),
        }
    }

    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn engine(&self) -> &dyn MediaEngine {
        self.engine.as_ref()
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("raw", &self.raw)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        trace!(handle = self.raw, kind = ?self.kind, "releasing engine object");
        self.engine.release(self.raw, self.kind);
    }
}

/// Scoped field lock: multi-step graph edits are invisible until drop.
pub struct FieldLock<'a> {
    engine: &'a dyn MediaEngine,
}

impl<'a> FieldLock<'a> {
    pub fn new(engine: &'a dyn MediaEngine) -> Self {
        engine.lock_field();
        Self { engine }
    }
}

impl Drop for FieldLock<'_> {
    fn drop(&mut self) {
        self.engine.unlock_field();
    }
}

// ── In-memory engine ────────────────────────────────────────────

#[derive(Debug)]
struct EngineTrack {
    handle: RawHandle,
    audio: bool,
    /// Start → (producer, length).
    playlist: BTreeMap<i64, (RawHandle, i64)>,
}

impl EngineTrack {
    fn length(&self) -> i64 {
        self.playlist
            .iter()
            .next_back()
            .map(|(pos, (_, len))| pos + len)
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct ProducerState {
    resource: String,
    length: i64,
    in_point: i64,
    out_point: i64,
}

#[derive(Debug)]
struct TransitionState {
    service: String,
    range: (i64, i64),
    planted: Option<(usize, usize)>,
}

#[derive(Debug)]
struct EngineState {
    next_handle: RawHandle,
    tracks: Vec<EngineTrack>,
    producers: HashMap<RawHandle, ProducerState>,
    transitions: HashMap<RawHandle, TransitionState>,
    field_lock_depth: usize,
    failing_plants: usize,
    fail_next_remove: bool,
    failing_inserts: usize,
}

impl EngineState {
    fn allocate(&mut self) -> RawHandle {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn track_mut(&mut self, track: RawHandle) -> Result<&mut EngineTrack> {
        self.tracks
            .iter_mut()
            .find(|t| t.handle == track)
            .ok_or_else(|| ProEditError::Engine(format!("unknown native track {track}")))
    }

    fn track(&self, track: RawHandle) -> Result<&EngineTrack> {
        self.tracks
            .iter()
            .find(|t| t.handle == track)
            .ok_or_else(|| ProEditError::Engine(format!("unknown native track {track}")))
    }
}

/// Thread-safe engine that keeps everything in memory.
///
/// Used headless by the replay tool and as the oracle in tests.
#[derive(Debug)]
pub struct MemoryEngine {
    state: Mutex<EngineState>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        let background = EngineTrack {
            handle: 1,
            audio: false,
            playlist: BTreeMap::new(),
        };
        Self {
            state: Mutex::new(EngineState {
                next_handle: 2,
                tracks: vec![background],
                producers: HashMap::new(),
                transitions: HashMap::new(),
                field_lock_depth: 0,
                failing_plants: 0,
                fail_next_remove: false,
                failing_inserts: 0,
            }),
        }
    }

    /// Convenience constructor returning the trait object the model expects.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn live_producers(&self) -> usize {
        self.state.lock().producers.len()
    }

    pub fn live_transitions(&self) -> usize {
        self.state.lock().transitions.len()
    }

    pub fn field_lock_depth(&self) -> usize {
        self.state.lock().field_lock_depth
    }

    /// Whether the native track at `index` carries audio.
    pub fn is_audio_track(&self, index: usize) -> Option<bool> {
        self.state.lock().tracks.get(index).map(|t| t.audio)
    }

    /// Make the next `plant_transition` call fail once.
    pub fn fail_next_plant(&self) {
        self.fail_plants(1);
    }

    /// Make the next `count` `plant_transition` calls fail.
    pub fn fail_plants(&self, count: usize) {
        self.state.lock().failing_plants = count;
    }

    /// Make the next `playlist_remove` call fail once.
    pub fn fail_next_playlist_remove(&self) {
        self.state.lock().fail_next_remove = true;
    }

    /// Make the next `count` `playlist_insert` calls fail.
    pub fn fail_playlist_inserts(&self, count: usize) {
        self.state.lock().failing_inserts = count;
    }

    pub fn producer_resource(&self, producer: RawHandle) -> Option<String> {
        self.state.lock().producers.get(&producer).map(|p| p.resource.clone())
    }

    pub fn transition_service(&self, transition: RawHandle) -> Option<String> {
        self.state.lock().transitions.get(&transition).map(|t| t.service.clone())
    }

    pub fn transition_range(&self, transition: RawHandle) -> Option<(i64, i64)> {
        self.state.lock().transitions.get(&transition).map(|t| t.range)
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEngine for MemoryEngine {
    fn insert_track(&self, index: usize, audio: bool) -> Result<RawHandle> {
        let mut state = self.state.lock();
        if index == 0 || index > state.tracks.len() {
            return Err(ProEditError::Engine(format!(
                "cannot insert native track at index {index}"
            )));
        }
        let handle = state.allocate();
        state.tracks.insert(
            index,
            EngineTrack {
                handle,
                audio,
                playlist: BTreeMap::new(),
            },
        );
        Ok(handle)
    }

    fn track_index(&self, track: RawHandle) -> Option<usize> {
        self.state.lock().tracks.iter().position(|t| t.handle == track)
    }

    fn track_count(&self) -> usize {
        self.state.lock().tracks.len()
    }

    fn track_length(&self, track: RawHandle) -> Result<i64> {
        Ok(self.state.lock().track(track)?.length())
    }

    fn playlist(&self, track: RawHandle) -> Result<Vec<PlaylistEntry>> {
        let state = self.state.lock();
        Ok(state
            .track(track)?
            .playlist
            .iter()
            .map(|(pos, (producer, length))| PlaylistEntry {
                position: *pos,
                length: *length,
                producer: *producer,
            })
            .collect())
    }

    fn playlist_insert(
        &self,
        track: RawHandle,
        producer: RawHandle,
        position: i64,
        length: i64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_inserts > 0 {
            state.failing_inserts -= 1;
            let msg = format!("injected playlist insert failure at {position}");
            return Err(ProEditError::Engine(msg));
        }
        if !state.producers.contains_key(&producer) {
            return Err(ProEditError::Engine(format!("unknown producer {producer}")));
        }
        let native = state.track_mut(track)?;
        let end = position
            .checked_add(length)
            .ok_or_else(|| ProEditError::Engine(format!("playlist slot at {position} overflows")))?;
        let clash_before = native
            .playlist
            .range(..end)
            .next_back()
            .is_some_and(|(pos, (_, len))| pos + len > position);
        if clash_before || length <= 0 || position < 0 {
            return Err(ProEditError::Engine(format!(
                "playlist slot [{position}, {end}) is not blank"
            )));
        }
        native.playlist.insert(position, (producer, length));
        Ok(())
    }

    fn playlist_remove(&self, track: RawHandle, position: i64) -> Result<RawHandle> {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_remove) {
            let msg = format!("injected playlist remove failure at {position}");
            return Err(ProEditError::Engine(msg));
        }
        state
            .track_mut(track)?
            .playlist
            .remove(&position)
            .map(|(producer, _)| producer)
            .ok_or_else(|| ProEditError::Engine(format!("no playlist entry at {position}")))
    }

    fn create_producer(&self, resource: &str, length: i64) -> Result<RawHandle> {
        if length <= 0 {
            return Err(ProEditError::Engine(format!("producer length {length} for {resource}")));
        }
        let mut state = self.state.lock();
        let handle = state.allocate();
        state.producers.insert(
            handle,
            ProducerState {
                resource: resource.to_string(),
                length,
                in_point: 0,
                out_point: length - 1,
            },
        );
        Ok(handle)
    }

    fn set_in_out(&self, producer: RawHandle, in_point: i64, out_point: i64) -> Result<()> {
        let mut state = self.state.lock();
        let native = state
            .producers
            .get_mut(&producer)
            .ok_or_else(|| ProEditError::Engine(format!("unknown producer {producer}")))?;
        if in_point < 0 || out_point < in_point {
            return Err(ProEditError::Engine(format!("bad crop [{in_point}, {out_point}]")));
        }
        // Endless producers grow on demand.
        native.length = native.length.max(out_point + 1);
        native.in_point = in_point;
        native.out_point = out_point;
        Ok(())
    }

    fn in_out(&self, producer: RawHandle) -> Option<(i64, i64)> {
        self.state
            .lock()
            .producers
            .get(&producer)
            .map(|p| (p.in_point, p.out_point))
    }

    fn create_transition(&self, service: &str) -> Result<RawHandle> {
        let mut state = self.state.lock();
        let handle = state.allocate();
        state.transitions.insert(
            handle,
            TransitionState {
                service: service.to_string(),
                range: (0, 0),
                planted: None,
            },
        );
        Ok(handle)
    }

    fn set_transition_range(
        &self,
        transition: RawHandle,
        in_point: i64,
        out_point: i64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        let native = state
            .transitions
            .get_mut(&transition)
            .ok_or_else(|| ProEditError::Engine(format!("unknown transition {transition}")))?;
        native.range = (in_point, out_point);
        Ok(())
    }

    fn plant_transition(
        &self,
        transition: RawHandle,
        a_track: usize,
        b_track: usize,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_plants > 0 {
            state.failing_plants -= 1;
            return Err(ProEditError::Engine("injected plant failure".into()));
        }
        if state.field_lock_depth == 0 {
            warn!(transition, "planting outside of a field lock");
        }
        let count = state.tracks.len();
        if a_track >= count || b_track >= count || a_track >= b_track {
            return Err(ProEditError::Engine(format!(
                "cannot plant transition between {a_track} and {b_track}"
            )));
        }
        let native = state
            .transitions
            .get_mut(&transition)
            .ok_or_else(|| ProEditError::Engine(format!("unknown transition {transition}")))?;
        native.planted = Some((a_track, b_track));
        Ok(())
    }

    fn unplant_transition(&self, transition: RawHandle) -> Result<()> {
        let mut state = self.state.lock();
        let native = state
            .transitions
            .get_mut(&transition)
            .ok_or_else(|| ProEditError::Engine(format!("unknown transition {transition}")))?;
        native.planted = None;
        Ok(())
    }

    fn planted_transitions(&self) -> Vec<PlantedTransition> {
        let state = self.state.lock();
        let mut planted: Vec<_> = state
            .transitions
            .iter()
            .filter_map(|(handle, t)| {
                t.planted.map(|(a_track, b_track)| PlantedTransition {
                    transition: *handle,
                    a_track,
                    b_track,
                })
            })
            .collect();
        planted.sort_by_key(|p| p.transition);
        planted
    }

    fn lock_field(&self) {
        self.state.lock().field_lock_depth += 1;
    }

    fn unlock_field(&self) {
        let mut state = self.state.lock();
        if state.field_lock_depth == 0 {
            warn!("unbalanced field unlock");
            return;
        }
        state.field_lock_depth -= 1;
    }

    fn release(&self, handle: RawHandle, kind: HandleKind) {
        let mut state = self.state.lock();
        match kind {
            HandleKind::Track => {
                if let Some(index) = state.tracks.iter().position(|t| t.handle == handle) {
                    if !state.tracks[index].playlist.is_empty() {
                        warn!(handle, "releasing a native track that still holds producers");
                    }
                    state.tracks.remove(index);
                }
            }
            HandleKind::Producer => {
                for track in &mut state.tracks {
                    track.playlist.retain(|_, (producer, _)| *producer != handle);
                }
                state.producers.remove(&handle);
            }
            HandleKind::Transition => {
                state.transitions.remove(&handle);
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────
