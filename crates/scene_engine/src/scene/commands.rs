//! Buffered structural changes and the per-step context
//!
//! While a step runs, nodes are owned by the workers stepping their chunks,
//! so insert/remove/delete requests are queued in [`SceneCommands`] and
//! applied at the barrier: deletes first, then inserts, then removes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::error::SceneError;
use super::node_list::NodeIndex;
use super::state::NodeDirectory;

/// Node ids waiting for the next barrier, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChanges {
    /// Nodes to destroy
    pub deleted: Vec<u64>,
    /// Nodes to add to the stepped node list
    pub inserted: Vec<u64>,
    /// Nodes to take out of the stepped node list
    pub removed: Vec<u64>,
}

impl PendingChanges {
    /// Nothing queued
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty() && self.inserted.is_empty() && self.removed.is_empty()
    }

    /// Total queued requests
    pub fn len(&self) -> usize {
        self.deleted.len() + self.inserted.len() + self.removed.len()
    }
}

fn push_unique(list: &mut Vec<u64>, id: u64) -> bool {
    if list.contains(&id) {
        false
    } else {
        list.push(id);
        true
    }
}

/// Thread-safe queue of structural changes
///
/// Shared as an `Arc` so any thread may queue work; the scene drains it at
/// the end of every step, or on [`super::SceneState::flush`].
#[derive(Debug, Default)]
pub struct SceneCommands {
    pending: Mutex<PendingChanges>,
    stepping: AtomicBool,
}

impl SceneCommands {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PendingChanges> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an insertion; returns false if already queued
    pub fn queue_insert(&self, id: u64) -> bool {
        push_unique(&mut self.lock().inserted, id)
    }

    /// Queue a removal; returns false if already queued
    pub fn queue_remove(&self, id: u64) -> bool {
        push_unique(&mut self.lock().removed, id)
    }

    /// Queue a deletion; returns false if already queued
    pub fn queue_delete(&self, id: u64) -> bool {
        push_unique(&mut self.lock().deleted, id)
    }

    /// Whether an insertion of `id` is waiting
    pub fn is_insert_pending(&self, id: u64) -> bool {
        self.lock().inserted.contains(&id)
    }

    /// Whether a deletion of `id` is waiting
    pub fn is_delete_pending(&self, id: u64) -> bool {
        self.lock().deleted.contains(&id)
    }

    /// Snapshot of what is queued
    pub fn pending(&self) -> PendingChanges {
        self.lock().clone()
    }

    /// Nothing queued
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drain the queue
    pub fn take(&self) -> PendingChanges {
        std::mem::take(&mut *self.lock())
    }

    /// True while a step is visiting nodes
    pub fn is_stepping(&self) -> bool {
        self.stepping.load(Ordering::Acquire)
    }

    pub(super) fn set_stepping(&self, stepping: bool) {
        self.stepping.store(stepping, Ordering::Release);
    }
}

/// Per-step services handed to every [`super::Component::update`]
///
/// Shared by all workers. Lookups see the scene as it was when the step
/// started; structural requests take effect at the barrier.
pub struct StepContext<'a> {
    pub(super) dt: f32,
    pub(super) step: u64,
    pub(super) commands: &'a SceneCommands,
    pub(super) directory: &'a Mutex<NodeDirectory>,
}

impl StepContext<'_> {
    /// Seconds covered by this step
    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// Step counter, starting at 1
    pub fn step(&self) -> u64 {
        self.step
    }

    fn directory(&self) -> MutexGuard<'_, NodeDirectory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Slot of a live node
    ///
    /// A node whose deletion is queued is already gone as far as step code
    /// is concerned, even though its slot is reclaimed only at the barrier.
    pub fn lookup(&self, id: u64) -> Option<NodeIndex> {
        if self.commands.is_delete_pending(id) {
            return None;
        }
        self.directory().index_of(id)
    }

    /// Whether the node was in the scene when the step started and has not
    /// been deleted since
    pub fn is_in_scene(&self, id: u64) -> bool {
        if self.commands.is_delete_pending(id) {
            return false;
        }
        let directory = self.directory();
        directory
            .index_of(id)
            .is_some_and(|index| directory.is_member(index))
    }

    /// Whether a deletion of the node is queued for the barrier
    pub fn is_deleted(&self, id: u64) -> bool {
        self.commands.is_delete_pending(id)
    }

    /// Request that a node join the scene at the barrier
    pub fn insert(&self, id: u64) -> Result<(), SceneError> {
        {
            let directory = self.directory();
            let index = self.live_index(&directory, id)?;
            if directory.is_member(index) {
                return Err(SceneError::AlreadyInScene(id));
            }
        }
        if self.commands.queue_insert(id) {
            Ok(())
        } else {
            Err(SceneError::AlreadyInScene(id))
        }
    }

    /// Request that a node leave the scene at the barrier
    pub fn remove(&self, id: u64) -> Result<(), SceneError> {
        {
            let directory = self.directory();
            let index = self.live_index(&directory, id)?;
            if !directory.is_member(index) && !self.commands.is_insert_pending(id) {
                return Err(SceneError::NotInScene(id));
            }
        }
        self.commands.queue_remove(id);
        Ok(())
    }

    /// Request that a node be destroyed at the barrier
    pub fn delete(&self, id: u64) -> Result<(), SceneError> {
        {
            let directory = self.directory();
            self.live_index(&directory, id)?;
        }
        self.commands.queue_delete(id);
        Ok(())
    }

    fn live_index(&self, directory: &NodeDirectory, id: u64) -> Result<NodeIndex, SceneError> {
        if self.commands.is_delete_pending(id) {
            return Err(SceneError::UnknownNode(id));
        }
        directory.index_of(id).ok_or(SceneError::UnknownNode(id))
    }
}
