//! Thread-safe handle to a timeline.
//!
//! Views read the model while the edit thread mutates it. Reads use a
//! recursive read lock so a view callback can re-enter; edits go through
//! [`TimelineWriteGuard`]. Code that already holds the write guard passes it
//! to [`SharedTimeline::read_with`] instead of locking again.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use proedit_core::Result;

use crate::timeline::TimelineModel;
use crate::view::ModelChange;

#[derive(Debug, Clone)]
pub struct SharedTimeline {
    inner: Arc<RwLock<TimelineModel>>,
}

/// Exclusive access to the model.
pub struct TimelineWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, TimelineModel>,
}

impl Deref for TimelineWriteGuard<'_> {
    type Target = TimelineModel;

    fn deref(&self) -> &TimelineModel {
        &self.guard
    }
}

impl DerefMut for TimelineWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut TimelineModel {
        &mut self.guard
    }
}

impl SharedTimeline {
    pub fn new(model: TimelineModel) -> Self {
        Self {
            inner: Arc::new(RwLock::new(model)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TimelineModel> {
        self.inner.read_recursive()
    }

    pub fn write(&self) -> TimelineWriteGuard<'_> {
        TimelineWriteGuard {
            guard: self.inner.write(),
        }
    }

    /// Run `f` on the model, reusing `locked` if the caller already holds
    /// the write lock of this timeline.
    pub fn read_with<T>(
        &self,
        locked: Option<&TimelineWriteGuard<'_>>,
        f: impl FnOnce(&TimelineModel) -> T,
    ) -> T {
        match locked {
            Some(guard) => {
                debug_assert!(
                    std::ptr::eq(&**guard as *const TimelineModel, self.inner.data_ptr()),
                    "write guard belongs to another timeline"
                );
                f(guard)
            }
            None => f(&self.read()),
        }
    }

    pub fn undo(&self) -> Result<bool> {
        self.write().undo()
    }

    pub fn redo(&self) -> Result<bool> {
        self.write().redo()
    }

    pub fn subscribe(&self) -> Receiver<ModelChange> {
        self.write().subscribe()
    }
}
