//! Scene state machine
//!
//! Owns the node slots, the id directory and the primary node list.
//! Outside a step every operation applies immediately; inside a step the
//! only way to change structure is through the [`StepContext`] handed to
//! components (or the shared [`SceneCommands`]), and queued changes are
//! applied at the barrier that ends the step.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::commands::{PendingChanges, SceneCommands, StepContext};
use super::component::{Component, ComponentTypeId};
use super::error::SceneError;
use super::events::{SceneEvent, SceneEventHandler, SceneEventType, SceneEvents};
use super::node::SceneNode;
use super::node_list::{NodeChunk, NodeIndex, SceneNodeList};
use super::registry::ComponentRegistry;
use crate::core::config::SceneConfig;
use crate::foundation::time::Stopwatch;

/// Id → slot map plus the primary (stepped) node list
#[derive(Debug, Default)]
pub struct NodeDirectory {
    ids: HashMap<u64, NodeIndex>,
    members: Vec<NodeIndex>,
    positions: HashMap<NodeIndex, usize>,
}

impl NodeDirectory {
    pub(super) fn index_of(&self, id: u64) -> Option<NodeIndex> {
        self.ids.get(&id).copied()
    }

    pub(super) fn is_member(&self, index: NodeIndex) -> bool {
        self.positions.contains_key(&index)
    }

    fn add_member(&mut self, index: NodeIndex) -> bool {
        if self.is_member(index) {
            return false;
        }
        self.positions.insert(index, self.members.len());
        self.members.push(index);
        true
    }

    fn remove_member(&mut self, index: NodeIndex) -> bool {
        let Some(position) = self.positions.remove(&index) else {
            return false;
        };
        self.members.swap_remove(position);
        if let Some(moved) = self.members.get(position) {
            self.positions.insert(*moved, position);
        }
        true
    }
}

/// Outcome of one [`SceneState::step`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    /// Step counter, starting at 1
    pub step: u64,
    /// Nodes whose components were updated
    pub visited: usize,
    /// In-scene nodes whose transform changed since the previous step, in slot order
    pub changed: Vec<NodeIndex>,
    /// Deletions applied at the barrier
    pub applied_deletes: usize,
    /// Insertions applied at the barrier
    pub applied_inserts: usize,
    /// Removals applied at the barrier
    pub applied_removes: usize,
    /// Wall time of the step, barrier included
    pub elapsed: Duration,
}

/// Scene runtime: node lifetime, membership and stepping
pub struct SceneState {
    nodes: SceneNodeList,
    directory: Mutex<NodeDirectory>,
    commands: Arc<SceneCommands>,
    registry: Arc<ComponentRegistry>,
    events: SceneEvents,
    worker_threads: usize,
    step_count: u64,
}

impl SceneState {
    /// Create an empty scene using the given component registry
    pub fn new(registry: Arc<ComponentRegistry>, config: &SceneConfig) -> Self {
        log::debug!(
            "Creating scene: {} worker threads, {} initial chunks, {} component types",
            config.worker_threads,
            config.initial_chunks,
            registry.len()
        );
        Self {
            nodes: SceneNodeList::with_chunks(config.initial_chunks),
            directory: Mutex::new(NodeDirectory::default()),
            commands: Arc::new(SceneCommands::new()),
            registry,
            events: SceneEvents::new(),
            worker_threads: config.worker_threads.max(1),
            step_count: 0,
        }
    }

    fn directory(&self) -> MutexGuard<'_, NodeDirectory> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn directory_mut(&mut self) -> &mut NodeDirectory {
        self.directory.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    // --- node lifetime ----------------------------------------------------

    /// Allocate a node; it stays out of the scene until [`Self::insert`]
    pub fn create_scene_node(&mut self, id: u64, name: &str) -> Result<NodeIndex, SceneError> {
        if self.directory_mut().ids.contains_key(&id) {
            return Err(SceneError::DuplicateId(id));
        }
        let index = self.nodes.allocate(id, name)?;
        self.directory_mut().ids.insert(id, index);
        log::trace!("Created scene node {} '{}' at {}", id, name, index);
        Ok(index)
    }

    /// Destroy a node: leave the scene, destroy components, release the slot
    pub fn delete_scene_node(&mut self, id: u64) -> Result<(), SceneError> {
        self.delete_now(id)?;
        self.events.dispatch();
        Ok(())
    }

    /// Add a node to the stepped node list
    pub fn insert(&mut self, id: u64) -> Result<(), SceneError> {
        self.insert_now(id)?;
        self.events.dispatch();
        Ok(())
    }

    /// Take a node out of the stepped node list; the node stays alive
    pub fn remove(&mut self, id: u64) -> Result<(), SceneError> {
        self.remove_now(id)?;
        self.events.dispatch();
        Ok(())
    }

    fn delete_now(&mut self, id: u64) -> Result<(), SceneError> {
        let step = self.step_count;
        let directory = self.directory_mut();
        let index = directory.ids.remove(&id).ok_or(SceneError::UnknownNode(id))?;
        let was_member = directory.remove_member(index);

        if let Some(node) = self.nodes.get_mut(index) {
            node.set_in_scene(false);
            for component in node.take_components() {
                self.registry.destroy(Some(component));
            }
        }
        self.nodes.free(index);

        if was_member {
            self.events.post(SceneEvent {
                event_type: SceneEventType::NodeRemoved,
                node_id: id,
                index,
                step,
            });
        }
        self.events.post(SceneEvent {
            event_type: SceneEventType::NodeDeleted,
            node_id: id,
            index,
            step,
        });
        log::trace!("Deleted scene node {}", id);
        Ok(())
    }

    fn insert_now(&mut self, id: u64) -> Result<(), SceneError> {
        let step = self.step_count;
        let directory = self.directory_mut();
        let index = directory.index_of(id).ok_or(SceneError::UnknownNode(id))?;
        if !directory.add_member(index) {
            return Err(SceneError::AlreadyInScene(id));
        }
        if let Some(node) = self.nodes.get_mut(index) {
            node.set_in_scene(true);
        }
        self.events.post(SceneEvent {
            event_type: SceneEventType::NodeAdded,
            node_id: id,
            index,
            step,
        });
        Ok(())
    }

    fn remove_now(&mut self, id: u64) -> Result<(), SceneError> {
        let step = self.step_count;
        let directory = self.directory_mut();
        let index = directory.index_of(id).ok_or(SceneError::UnknownNode(id))?;
        if !directory.remove_member(index) {
            return Err(SceneError::NotInScene(id));
        }
        if let Some(node) = self.nodes.get_mut(index) {
            node.set_in_scene(false);
        }
        self.events.post(SceneEvent {
            event_type: SceneEventType::NodeRemoved,
            node_id: id,
            index,
            step,
        });
        Ok(())
    }

    // --- lookup -----------------------------------------------------------

    /// Slot of a live node
    pub fn index_of(&self, id: u64) -> Option<NodeIndex> {
        self.directory().index_of(id)
    }

    /// Whether a live node carries this id
    pub fn contains(&self, id: u64) -> bool {
        self.index_of(id).is_some()
    }

    /// Whether the node is in the stepped node list
    pub fn is_in_scene(&self, id: u64) -> bool {
        let directory = self.directory();
        directory
            .index_of(id)
            .is_some_and(|index| directory.is_member(index))
    }

    /// Node by id
    pub fn get_by_id(&self, id: u64) -> Option<&SceneNode> {
        let index = self.index_of(id)?;
        self.nodes.get(index)
    }

    /// Mutable node by id
    pub fn get_by_id_mut(&mut self, id: u64) -> Option<&mut SceneNode> {
        let index = self.directory_mut().index_of(id)?;
        self.nodes.get_mut(index)
    }

    /// Node by slot
    pub fn get(&self, index: NodeIndex) -> Option<&SceneNode> {
        self.nodes.get(index)
    }

    /// Live nodes in slot order, in the scene or not
    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &SceneNode)> + '_ {
        self.nodes.iter()
    }

    /// Primary node list, in insertion order modulo removals
    pub fn members(&self) -> Vec<NodeIndex> {
        self.directory().members.clone()
    }

    /// Live node count
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// No live nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in the stepped node list
    pub fn scene_len(&self) -> usize {
        self.directory().members.len()
    }

    /// Completed steps
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Shared component registry
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Shared command queue, usable from any thread
    pub fn commands(&self) -> Arc<SceneCommands> {
        Arc::clone(&self.commands)
    }

    // --- components -------------------------------------------------------

    /// Create a component through the registry and attach it
    pub fn add_component(&mut self, id: u64, type_id: ComponentTypeId) -> Result<(), SceneError> {
        if !self.contains(id) {
            return Err(SceneError::UnknownNode(id));
        }
        let component = self
            .registry
            .create(type_id)
            .ok_or(SceneError::UnknownComponentType(type_id))?;
        self.attach_component(id, component)
    }

    /// Attach an already built component
    ///
    /// A rejected component is destroyed through the registry.
    pub fn attach_component(
        &mut self,
        id: u64,
        component: Box<dyn Component>,
    ) -> Result<(), SceneError> {
        let Some(index) = self.directory_mut().index_of(id) else {
            self.registry.destroy(Some(component));
            return Err(SceneError::UnknownNode(id));
        };
        let Some(node) = self.nodes.get_mut(index) else {
            self.registry.destroy(Some(component));
            return Err(SceneError::UnknownNode(id));
        };

        node.attach_component(component).map_err(|rejected| {
            let error = rejected.to_scene_error(id);
            log::debug!("Rejected component for node {}: {}", id, error);
            self.registry.destroy(Some(rejected.into_component()));
            error
        })
    }

    /// Detach a component and destroy it through the registry
    pub fn remove_component(
        &mut self,
        id: u64,
        type_id: ComponentTypeId,
    ) -> Result<(), SceneError> {
        let node = self.get_by_id_mut(id).ok_or(SceneError::UnknownNode(id))?;
        let component = node
            .detach_component(type_id)
            .ok_or(SceneError::ComponentNotAttached { node: id, type_id })?;
        self.registry.destroy(Some(component));
        Ok(())
    }

    // --- events -----------------------------------------------------------

    /// Register a handler for one event type
    pub fn register_event_handler(
        &mut self,
        event_type: SceneEventType,
        handler: Box<dyn SceneEventHandler>,
    ) {
        self.events.register_handler(event_type, handler);
    }

    // --- stepping ---------------------------------------------------------

    /// Update every in-scene node once, then apply queued changes
    pub fn step(&mut self, dt: f32) -> StepReport {
        let stopwatch = Stopwatch::start_new();
        self.step_count += 1;
        let step = self.step_count;

        self.commands.set_stepping(true);
        let visited = {
            let context = StepContext {
                dt,
                step,
                commands: &self.commands,
                directory: &self.directory,
            };
            let chunks: Vec<&mut NodeChunk> =
                self.nodes.chunks_mut().filter(|chunk| !chunk.is_empty()).collect();
            run_chunks(chunks, &context, self.worker_threads)
        };

        let mut changed = Vec::new();
        for chunk in self.nodes.chunks_mut() {
            for (index, node) in chunk.iter_mut() {
                if node.is_in_scene() && !node.take_transform_changes().is_empty() {
                    changed.push(index);
                }
            }
        }
        self.commands.set_stepping(false);

        let pending = self.commands.take();
        let (applied_deletes, applied_inserts, applied_removes) = self.apply(pending);
        self.events.dispatch();

        let report = StepReport {
            step,
            visited,
            changed,
            applied_deletes,
            applied_inserts,
            applied_removes,
            elapsed: stopwatch.elapsed(),
        };
        log::trace!(
            "Step {}: visited {}, changed {}, barrier {}/{}/{} in {:.3}ms",
            step,
            report.visited,
            report.changed.len(),
            applied_deletes,
            applied_inserts,
            applied_removes,
            stopwatch.elapsed_millis()
        );
        report
    }

    /// Apply changes queued through [`Self::commands`] outside a step
    pub fn flush(&mut self) -> usize {
        let pending = self.commands.take();
        let (deletes, inserts, removes) = self.apply(pending);
        self.events.dispatch();
        deletes + inserts + removes
    }

    fn apply(&mut self, pending: PendingChanges) -> (usize, usize, usize) {
        if pending.is_empty() {
            return (0, 0, 0);
        }

        let mut deletes = 0;
        for id in pending.deleted {
            match self.delete_now(id) {
                Ok(()) => deletes += 1,
                Err(error) => log::warn!("Buffered delete skipped: {}", error),
            }
        }

        let mut inserts = 0;
        for id in pending.inserted {
            match self.insert_now(id) {
                Ok(()) => inserts += 1,
                Err(error) => log::warn!("Buffered insert skipped: {}", error),
            }
        }

        let mut removes = 0;
        for id in pending.removed {
            match self.remove_now(id) {
                Ok(()) => removes += 1,
                Err(error) => log::warn!("Buffered remove skipped: {}", error),
            }
        }

        (deletes, inserts, removes)
    }
}

impl Drop for SceneState {
    fn drop(&mut self) {
        // Components go back through their descriptors
        let indices: Vec<NodeIndex> = self.nodes.iter().map(|(index, _)| index).collect();
        for index in indices {
            if let Some(mut node) = self.nodes.free(index) {
                for component in node.take_components() {
                    self.registry.destroy(Some(component));
                }
            }
        }
    }
}

fn update_chunk(chunk: &mut NodeChunk, context: &StepContext<'_>) -> usize {
    let mut visited = 0;
    for (index, node) in chunk.iter_mut() {
        if node.should_step() {
            node.update_components(index, context);
            visited += 1;
        }
    }
    visited
}

/// Step chunks, in parallel when more than one worker is useful
fn run_chunks(chunks: Vec<&mut NodeChunk>, context: &StepContext<'_>, workers: usize) -> usize {
    let workers = workers.min(chunks.len());
    if workers <= 1 {
        return chunks.into_iter().map(|chunk| update_chunk(chunk, context)).sum();
    }

    let (sender, receiver) = crossbeam_channel::unbounded();
    for chunk in chunks {
        // The receiver is alive until the scope below ends
        let _ = sender.send(chunk);
    }
    drop(sender);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let receiver = receiver.clone();
                scope.spawn(move || {
                    receiver
                        .iter()
                        .map(|chunk| update_chunk(chunk, context))
                        .sum::<usize>()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(visited) => visited,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .sum()
    })
}
