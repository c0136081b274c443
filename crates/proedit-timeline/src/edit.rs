//! Edit operations with undo/redo support.
//!
//! Uses the Command pattern: every mutation of a [`TimelineModel`] is a
//! primitive `EditCommand` that knows how to apply itself and produce its
//! inverse. A request records the commands it applied in a [`Transaction`];
//! the transaction becomes one labelled entry of the [`UndoStack`].

use std::collections::VecDeque;

use proedit_core::{ItemId, Result};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::clip::{ClipSnapshot, ClipTiming};
use crate::composition::{ATrack, CompositionSnapshot};
use crate::groups::GroupOp;
use crate::item::ItemBounds;
use crate::timeline::TimelineModel;
use crate::track::{TrackSettings, TrackSnapshot};

// ── Edit commands ───────────────────────────────────────────────

/// A reversible primitive edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditCommand {
    /// Create a floating clip (producer and group leaf included).
    RegisterClip { clip: ClipSnapshot },
    /// Destroy a floating, ungrouped clip.
    DeregisterClip { clip: ClipSnapshot },
    RegisterComposition { composition: CompositionSnapshot },
    DeregisterComposition { composition: CompositionSnapshot },
    /// Put a floating item on a track.
    InsertItem { track: ItemId, item: ItemId, position: i64 },
    /// Take an item off its track, leaving a gap.
    RemoveItem { track: ItemId, item: ItemId, position: i64 },
    ResizeItem { item: ItemId, from: ItemBounds, to: ItemBounds },
    /// Change the speed of a clip that is off its track.
    SetClipSpeed { clip: ItemId, from: ClipTiming, to: ClipTiming },
    SetATrack { composition: ItemId, from: ATrack, to: ATrack },
    /// Create an empty track at `position`.
    InsertTrack { track: TrackSnapshot, position: usize },
    /// Destroy an empty track.
    RemoveTrack { track: TrackSnapshot, position: usize },
    UpdateTrack { track: ItemId, from: TrackSettings, to: TrackSettings },
    Group(GroupOp),
    /// Commands applied in order, all or nothing.
    Batch(Vec<EditCommand>),
}

impl EditCommand {
    /// Apply this command to a timeline.
    ///
    /// A failing primitive leaves the model untouched; a failing batch
    /// reverts the part it already applied.
    pub fn apply(&self, model: &mut TimelineModel) -> Result<()> {
        match self {
            Self::RegisterClip { clip } => model.register_clip(clip),
            Self::DeregisterClip { clip } => model.deregister_clip(clip.id),
            Self::RegisterComposition { composition } => model.register_composition(composition),
            Self::DeregisterComposition { composition } => {
                model.deregister_composition(composition.id)
            }
            Self::InsertItem {
                track,
                item,
                position,
            } => model.insert_item(*track, *item, *position),
            Self::RemoveItem {
                track,
                item,
                position,
            } => model.remove_item(*track, *item, *position),
            Self::ResizeItem { item, from, to } => model.resize_item(*item, *from, *to),
            Self::SetClipSpeed { clip, from, to } => model.set_clip_speed(*clip, from, to),
            Self::SetATrack {
                composition,
                from,
                to,
            } => model.set_a_track(*composition, *from, *to),
            Self::InsertTrack { track, position } => model.insert_track(track, *position),
            Self::RemoveTrack { track, position } => model.remove_track(track.id, *position),
            Self::UpdateTrack { track, from, to } => model.update_track(*track, from, to),
            Self::Group(op) => model.apply_group_op(op),
            Self::Batch(commands) => {
                for (done, command) in commands.iter().enumerate() {
                    if let Err(err) = command.apply(model) {
                        for applied in commands[..done].iter().rev() {
                            if let Err(revert_err) = applied.inverse().apply(model) {
                                error!(
                                    error = %revert_err,
                                    "failed to revert partially applied batch"
                                );
                            }
                        }
                        return Err(err);
                    }
                }
                Ok(())
            }
        }
    }

    /// Produce the inverse command (for undo).
    pub fn inverse(&self) -> Self {
        match self {
            Self::RegisterClip { clip } => Self::DeregisterClip { clip: clip.clone() },
            Self::DeregisterClip { clip } => Self::RegisterClip { clip: clip.clone() },
            Self::RegisterComposition { composition } => Self::DeregisterComposition {
                composition: composition.clone(),
            },
            Self::DeregisterComposition { composition } => Self::RegisterComposition {
                composition: composition.clone(),
            },
            Self::InsertItem { track, item, position } => Self::RemoveItem {
                track: *track,
                item: *item,
                position: *position,
            },
            Self::RemoveItem { track, item, position } => Self::InsertItem {
                track: *track,
                item: *item,
                position: *position,
            },
            Self::ResizeItem { item, from, to } => Self::ResizeItem {
                item: *item,
                from: *to,
                to: *from,
            },
            Self::SetClipSpeed { clip, from, to } => Self::SetClipSpeed {
                clip: *clip,
                from: *to,
                to: *from,
            },
            Self::SetATrack { composition, from, to } => Self::SetATrack {
                composition: *composition,
                from: *to,
                to: *from,
            },
            Self::InsertTrack { track, position } => Self::RemoveTrack {
                track: track.clone(),
                position: *position,
            },
            Self::RemoveTrack { track, position } => Self::InsertTrack {
                track: track.clone(),
                position: *position,
            },
            Self::UpdateTrack { track, from, to } => Self::UpdateTrack {
                track: *track,
                from: to.clone(),
                to: from.clone(),
            },
            Self::Group(op) => Self::Group(op.inverse()),
            Self::Batch(commands) => {
                Self::Batch(commands.iter().rev().map(|c| c.inverse()).collect())
            }
        }
    }

    /// Number of primitive commands, batches flattened.
    pub fn primitive_count(&self) -> usize {
        match self {
            Self::Batch(commands) => commands.iter().map(Self::primitive_count).sum(),
            _ => 1,
        }
    }

    /// Largest raw id this command creates or destroys.
    pub fn max_raw_id(&self) -> u64 {
        match self {
            Self::RegisterClip { clip } | Self::DeregisterClip { clip } => clip.id.raw(),
            Self::RegisterComposition { composition }
            | Self::DeregisterComposition { composition } => composition.id.raw(),
            Self::InsertTrack { track, .. } | Self::RemoveTrack { track, .. } => track.id.raw(),
            Self::Group(op) => op.node().raw(),
            Self::Batch(commands) => commands.iter().map(Self::max_raw_id).max().unwrap_or(0),
            _ => 0,
        }
    }
}

// ── Transactions ────────────────────────────────────────────────

/// Commands applied so far by one request, in application order.
#[derive(Debug, Default)]
pub struct Transaction {
    commands: Vec<EditCommand>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a command that has already been applied.
    pub fn record(&mut self, command: EditCommand) {
        self.commands.push(command);
    }

    /// Take over the commands of a finished sub-transaction.
    pub fn append(&mut self, other: Transaction) {
        self.commands.extend(other.commands);
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// One command for the undo stack, or `None` if nothing was applied.
    pub fn into_command(mut self) -> Option<EditCommand> {
        match self.commands.len() {
            0 => None,
            1 => self.commands.pop(),
            _ => Some(EditCommand::Batch(self.commands)),
        }
    }

    pub fn into_commands(self) -> Vec<EditCommand> {
        self.commands
    }
}

// ── Undo stack ──────────────────────────────────────────────────

/// A user-visible history step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoEntry {
    pub label: String,
    pub command: EditCommand,
}

/// Undo/redo history stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoStack {
    /// Entries that have been executed (most recent last).
    undo: VecDeque<UndoEntry>,
    /// Entries that have been undone (most recent last).
    redo: Vec<UndoEntry>,
    /// Maximum history depth.
    max_depth: usize,
    /// Entries lost to trimming or clearing; the history no longer starts
    /// from an empty timeline.
    #[serde(default)]
    truncated: bool,
}

impl UndoStack {
    /// Create a new undo stack with the given maximum depth.
    pub fn new(max_depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            max_depth,
            truncated: false,
        }
    }

    /// Push an executed command onto the undo stack.
    /// Clears the redo stack (new action invalidates redo history).
    pub fn push(&mut self, label: impl Into<String>, command: EditCommand) {
        self.redo.clear();
        self.undo.push_back(UndoEntry {
            label: label.into(),
            command,
        });
        if self.undo.len() > self.max_depth {
            self.undo.pop_front();
            self.truncated = true;
        }
    }

    /// Pop the most recent entry for undo. Returns the inverse command.
    pub fn undo(&mut self) -> Option<EditCommand> {
        let entry = self.undo.pop_back()?;
        let inverse = entry.command.inverse();
        self.redo.push(entry);
        Some(inverse)
    }

    /// Pop the most recent undone entry for redo. Returns the original command.
    pub fn redo(&mut self) -> Option<EditCommand> {
        let entry = self.redo.pop()?;
        let command = entry.command.clone();
        self.undo.push_back(entry);
        Some(command)
    }

    /// Put back an entry whose undo could not be applied.
    pub fn cancel_undo(&mut self) {
        if let Some(entry) = self.redo.pop() {
            self.undo.push_back(entry);
        }
    }

    /// Put back an entry whose redo could not be applied.
    pub fn cancel_redo(&mut self) {
        if let Some(entry) = self.undo.pop_back() {
            self.redo.push(entry);
        }
    }

    /// Check if undo is available.
    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    /// Check if redo is available.
    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Clear all history.
    pub fn clear(&mut self) {
        self.truncated |= !self.undo.is_empty();
        self.undo.clear();
        self.redo.clear();
    }

    /// Whether replaying `entries()` on an empty timeline rebuilds it.
    pub fn is_complete(&self) -> bool {
        !self.truncated
    }

    /// Number of undo steps available.
    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    /// Number of redo steps available.
    pub fn redo_count(&self) -> usize {
        self.redo.len()
    }

    pub fn undo_label(&self) -> Option<&str> {
        self.undo.back().map(|e| e.label.as_str())
    }

    pub fn redo_label(&self) -> Option<&str> {
        self.redo.last().map(|e| e.label.as_str())
    }

    /// Executed entries, oldest first.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = &UndoEntry> {
        self.undo.iter()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new(200)
    }
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackKind;

    fn insert(position: i64) -> EditCommand {
        EditCommand::InsertItem {
            track: ItemId::Track(1),
            item: ItemId::Clip(2),
            position,
        }
    }

    #[test]
    fn test_undo_redo_insert_remove() {
        let mut stack = UndoStack::new(100);
        stack.push("Insert clip", insert(0));
        assert!(stack.can_undo());
        assert!(!stack.can_redo());

        // Undo should give us a RemoveItem
        let undo_cmd = stack.undo().unwrap();
        assert!(matches!(undo_cmd, EditCommand::RemoveItem { position: 0, .. }));
        assert!(!stack.can_undo());
        assert!(stack.can_redo());
        assert_eq!(stack.redo_label(), Some("Insert clip"));

        // Redo should give us the original InsertItem back
        let redo_cmd = stack.redo().unwrap();
        assert_eq!(redo_cmd, insert(0));
        assert!(stack.can_undo());
        assert!(!stack.can_redo());
    }

    #[test]
    fn test_new_action_clears_redo() {
        let mut stack = UndoStack::new(100);
        stack.push("a", insert(0));
        stack.undo();
        assert!(stack.can_redo());

        // New action clears redo
        stack.push("b", insert(10));
        assert!(!stack.can_redo());
        assert_eq!(stack.undo_count(), 1);
    }

    #[test]
    fn test_max_depth_drops_oldest() {
        let mut stack = UndoStack::new(3);
        for i in 0..5 {
            stack.push(format!("step {i}"), insert(i));
        }
        assert_eq!(stack.undo_count(), 3);
        assert_eq!(stack.entries().next().map(|e| e.label.as_str()), Some("step 2"));
        assert!(!stack.is_complete());
    }

    #[test]
    fn test_trimmed_history_keeps_order() {
        let mut stack = UndoStack::new(50);
        for i in 0..10_000 {
            stack.push(format!("step {i}"), insert(i));
        }
        assert_eq!(stack.undo_count(), 50);
        let labels: Vec<_> = stack.entries().map(|e| e.label.clone()).collect();
        assert_eq!(labels.first().map(String::as_str), Some("step 9950"));
        assert_eq!(stack.undo_label(), Some("step 9999"));

        assert!(stack.undo().is_some());
        assert_eq!(stack.undo_label(), Some("step 9998"));
        assert!(stack.redo().is_some());
        assert_eq!(stack.entries().len(), 50);
    }

    #[test]
    fn test_cancel_restores_stacks() {
        let mut stack = UndoStack::default();
        stack.push("a", insert(0));
        stack.undo();
        stack.cancel_undo();
        assert_eq!((stack.undo_count(), stack.redo_count()), (1, 0));
        stack.undo();
        stack.redo();
        stack.cancel_redo();
        assert_eq!((stack.undo_count(), stack.redo_count()), (0, 1));
    }

    #[test]
    fn test_batch_inverse_reverses_order() {
        let batch = EditCommand::Batch(vec![
            insert(0),
            EditCommand::ResizeItem {
                item: ItemId::Clip(2),
                from: ItemBounds::with_length(0, 10),
                to: ItemBounds::with_length(0, 20),
            },
        ]);
        let EditCommand::Batch(inverse) = batch.inverse() else {
            panic!("batch inverse must be a batch");
        };
        assert!(matches!(inverse[0], EditCommand::ResizeItem { to, .. } if to.playtime() == 10));
        assert!(matches!(inverse[1], EditCommand::RemoveItem { .. }));
        assert_eq!(batch.inverse().inverse(), batch);
        assert_eq!(batch.primitive_count(), 2);
    }

    #[test]
    fn test_transaction_collapses_single_command() {
        let mut tx = Transaction::new();
        assert!(Transaction::new().into_command().is_none());
        tx.record(insert(5));
        assert_eq!(tx.into_command(), Some(insert(5)));

        let mut tx = Transaction::new();
        tx.record(insert(5));
        let mut sub = Transaction::new();
        sub.record(insert(7));
        tx.append(sub);
        assert!(matches!(tx.into_command(), Some(EditCommand::Batch(c)) if c.len() == 2));
    }

    #[test]
    fn test_commands_serialize_for_history() {
        let command = EditCommand::UpdateTrack {
            track: ItemId::Track(4),
            from: TrackSettings::new("V1", TrackKind::Video, 64),
            to: TrackSettings::new("Titles", TrackKind::Video, 64),
        };
        let json = serde_json::to_string(&command).unwrap();
        assert!(json.starts_with(r#"{"update_track""#));
        let back: EditCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, command);
    }
}
