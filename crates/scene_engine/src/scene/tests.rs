//! Scene runtime behaviour across nodes, components and steps

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::*;
use crate::core::config::SceneConfig;
use crate::foundation::math::Vec3;

/// Counts updates and optionally queues structural changes on its first step
#[derive(Default)]
struct Script {
    updates: u32,
    delete_on_first: Option<u64>,
    insert_on_first: Option<u64>,
    remove_on_first: Vec<u64>,
    results: Vec<Result<(), SceneError>>,
}

impl Component for Script {
    fn component_type(&self) -> ComponentTypeId {
        Self::TYPE_ID
    }

    fn update(&mut self, _node: &mut NodeContext<'_>, step: &StepContext<'_>) {
        self.updates += 1;
        if step.step() == 1 {
            if let Some(id) = self.delete_on_first {
                self.results.push(step.delete(id));
            }
            if let Some(id) = self.insert_on_first {
                self.results.push(step.insert(id));
            }
            for &id in &self.remove_on_first {
                self.results.push(step.remove(id));
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ComponentType for Script {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(1);
    const NAME: &'static str = "Script";
}

/// Moves its node along +x every step
#[derive(Default)]
struct Drift;

impl Component for Drift {
    fn component_type(&self) -> ComponentTypeId {
        Self::TYPE_ID
    }

    fn update(&mut self, node: &mut NodeContext<'_>, step: &StepContext<'_>) {
        node.translate(Vec3::new(step.dt(), 0.0, 0.0));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ComponentType for Drift {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(2);
    const NAME: &'static str = "Drift";
}

/// Shared per-node visit counter
struct VisitCounter {
    visits: Arc<Vec<AtomicUsize>>,
}

impl Component for VisitCounter {
    fn component_type(&self) -> ComponentTypeId {
        ComponentTypeId(3)
    }

    fn update(&mut self, node: &mut NodeContext<'_>, _step: &StepContext<'_>) {
        self.visits[node.id() as usize].fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Deletes its target, then records what step code can still see of it
struct Reaper {
    target: u64,
    lookup: Option<Option<NodeIndex>>,
    in_scene: Option<bool>,
    deleted: Option<bool>,
    results: Vec<Result<(), SceneError>>,
}

impl Reaper {
    fn new(target: u64) -> Self {
        Self {
            target,
            lookup: None,
            in_scene: None,
            deleted: None,
            results: Vec::new(),
        }
    }
}

impl Component for Reaper {
    fn component_type(&self) -> ComponentTypeId {
        Self::TYPE_ID
    }

    fn update(&mut self, _node: &mut NodeContext<'_>, step: &StepContext<'_>) {
        if step.step() != 1 {
            return;
        }
        self.results.push(step.delete(self.target));
        self.lookup = Some(step.lookup(self.target));
        self.in_scene = Some(step.is_in_scene(self.target));
        self.deleted = Some(step.is_deleted(self.target));
        self.results.push(step.remove(self.target));
        self.results.push(step.insert(self.target));
        self.results.push(step.delete(self.target));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ComponentType for Reaper {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(4);
    const NAME: &'static str = "Reaper";
}

struct Recorder(Arc<Mutex<Vec<(SceneEventType, u64)>>>);

impl SceneEventHandler for Recorder {
    fn on_event(&mut self, event: &SceneEvent) -> bool {
        self.0.lock().unwrap().push((event.event_type, event.node_id));
        false
    }
}

fn scene_with(workers: usize) -> SceneState {
    let mut registry = ComponentRegistry::new();
    registry.register_type::<Script>();
    registry.register_type::<Drift>();
    let config = SceneConfig {
        worker_threads: workers,
        initial_chunks: 1,
    };
    SceneState::new(Arc::new(registry), &config)
}

fn record_all(scene: &mut SceneState) -> Arc<Mutex<Vec<(SceneEventType, u64)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for event_type in [
        SceneEventType::NodeAdded,
        SceneEventType::NodeRemoved,
        SceneEventType::NodeDeleted,
    ] {
        scene.register_event_handler(event_type, Box::new(Recorder(Arc::clone(&seen))));
    }
    seen
}

#[test]
fn test_create_rejects_duplicate_id() {
    let mut scene = scene_with(1);
    scene.create_scene_node(7, "first").unwrap();
    assert_eq!(
        scene.create_scene_node(7, "second"),
        Err(SceneError::DuplicateId(7))
    );
    assert_eq!(scene.len(), 1);
    assert_eq!(scene.get_by_id(7).unwrap().name(), "first");
}

#[test]
fn test_insert_and_remove_membership() {
    let mut scene = scene_with(1);
    scene.create_scene_node(1, "a").unwrap();

    assert!(!scene.is_in_scene(1));
    scene.insert(1).unwrap();
    assert!(scene.is_in_scene(1));
    assert!(scene.get_by_id(1).unwrap().is_in_scene());
    assert_eq!(scene.insert(1), Err(SceneError::AlreadyInScene(1)));

    scene.remove(1).unwrap();
    assert!(!scene.is_in_scene(1));
    assert!(scene.contains(1));
    assert_eq!(scene.remove(1), Err(SceneError::NotInScene(1)));
    assert_eq!(scene.insert(99), Err(SceneError::UnknownNode(99)));
}

#[test]
fn test_immediate_delete_posts_removed_then_deleted() {
    let mut scene = scene_with(1);
    let seen = record_all(&mut scene);
    scene.create_scene_node(1, "a").unwrap();
    scene.insert(1).unwrap();
    scene.add_component(1, Script::TYPE_ID).unwrap();

    scene.delete_scene_node(1).unwrap();
    assert!(!scene.contains(1));
    assert!(scene.get_by_id(1).is_none());
    assert_eq!(scene.scene_len(), 0);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (SceneEventType::NodeAdded, 1),
            (SceneEventType::NodeRemoved, 1),
            (SceneEventType::NodeDeleted, 1),
        ]
    );
    assert_eq!(scene.delete_scene_node(1), Err(SceneError::UnknownNode(1)));
}

#[test]
fn test_changes_during_step_apply_at_barrier() {
    let mut scene = scene_with(1);
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        scene.create_scene_node(id, name).unwrap();
    }
    scene.insert(1).unwrap();
    scene.insert(2).unwrap();

    scene
        .attach_component(
            1,
            Box::new(Script {
                delete_on_first: Some(2),
                insert_on_first: Some(3),
                ..Script::default()
            }),
        )
        .unwrap();
    scene.add_component(2, Script::TYPE_ID).unwrap();
    scene.add_component(3, Script::TYPE_ID).unwrap();
    let seen = record_all(&mut scene);

    let report = scene.step(0.016);

    // B was still stepped; C joined only after visiting finished
    assert_eq!(report.visited, 2);
    assert_eq!(report.applied_deletes, 1);
    assert_eq!(report.applied_inserts, 1);
    assert!(!scene.contains(2));
    assert!(scene.is_in_scene(3));

    let a = scene.get_by_id(1).unwrap().get_component::<Script>().unwrap();
    assert_eq!(a.updates, 1);
    assert_eq!(a.results, vec![Ok(()), Ok(())]);
    let c = scene.get_by_id(3).unwrap().get_component::<Script>().unwrap();
    assert_eq!(c.updates, 0);

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (SceneEventType::NodeRemoved, 2),
            (SceneEventType::NodeDeleted, 2),
            (SceneEventType::NodeAdded, 3),
        ]
    );

    let report = scene.step(0.016);
    assert_eq!(report.visited, 2);
    assert_eq!(
        scene.get_by_id(3).unwrap().get_component::<Script>().unwrap().updates,
        1
    );
}

#[test]
fn test_step_context_rejects_invalid_requests() {
    let mut scene = scene_with(1);
    scene.create_scene_node(1, "a").unwrap();
    scene.create_scene_node(2, "b").unwrap();
    scene.insert(1).unwrap();
    scene.insert(2).unwrap();
    scene
        .attach_component(
            1,
            Box::new(Script {
                delete_on_first: Some(42),
                insert_on_first: Some(2),
                ..Script::default()
            }),
        )
        .unwrap();

    let report = scene.step(0.0);
    let a = scene.get_by_id(1).unwrap().get_component::<Script>().unwrap();
    assert_eq!(
        a.results,
        vec![
            Err(SceneError::UnknownNode(42)),
            Err(SceneError::AlreadyInScene(2)),
        ]
    );
    assert_eq!(report.applied_deletes + report.applied_inserts, 0);
}

#[test]
fn test_disabled_nodes_are_not_stepped() {
    let mut scene = scene_with(1);
    for id in 1..=3 {
        scene.create_scene_node(id, "n").unwrap();
        scene.add_component(id, Script::TYPE_ID).unwrap();
        scene.insert(id).unwrap();
    }
    scene.get_by_id_mut(2).unwrap().set_enabled(false);
    scene.get_by_id_mut(3).unwrap().set_updating_enabled(false);

    assert_eq!(scene.step(0.1).visited, 1);
    assert!(scene.is_in_scene(3));
}

#[test]
fn test_changed_transforms_are_reported_once() {
    let mut scene = scene_with(1);
    scene.create_scene_node(1, "mover").unwrap();
    scene.create_scene_node(2, "still").unwrap();
    scene.insert(1).unwrap();
    scene.insert(2).unwrap();
    scene.add_component(1, Drift::TYPE_ID).unwrap();
    let mover = scene.index_of(1).unwrap();

    let report = scene.step(0.5);
    assert_eq!(report.changed, vec![mover]);
    approx::assert_relative_eq!(scene.get_by_id(1).unwrap().position().x, 0.5);

    scene.remove_component(1, Drift::TYPE_ID).unwrap();
    assert!(scene.step(0.5).changed.is_empty());

    scene
        .get_by_id_mut(2)
        .unwrap()
        .set_position(Vec3::new(0.0, 3.0, 0.0));
    assert_eq!(scene.step(0.5).changed, vec![scene.index_of(2).unwrap()]);
}

#[test]
fn test_component_operations_report_errors() {
    let mut scene = scene_with(1);
    scene.create_scene_node(1, "a").unwrap();

    assert_eq!(
        scene.add_component(1, ComponentTypeId(50)),
        Err(SceneError::UnknownComponentType(ComponentTypeId(50)))
    );
    scene.add_component(1, Script::TYPE_ID).unwrap();
    assert_eq!(
        scene.add_component(1, Script::TYPE_ID),
        Err(SceneError::DuplicateComponent {
            node: 1,
            type_id: Script::TYPE_ID
        })
    );
    assert_eq!(
        scene.remove_component(1, Drift::TYPE_ID),
        Err(SceneError::ComponentNotAttached {
            node: 1,
            type_id: Drift::TYPE_ID
        })
    );
    assert_eq!(
        scene.add_component(9, Script::TYPE_ID),
        Err(SceneError::UnknownNode(9))
    );
}

#[test]
fn test_parallel_step_visits_each_node_once() {
    const NODES: usize = 300;
    let visits = Arc::new((0..NODES).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());

    let mut scene = scene_with(4);
    for id in 0..NODES as u64 {
        scene.create_scene_node(id, "worker").unwrap();
        scene.insert(id).unwrap();
        scene
            .attach_component(
                id,
                Box::new(VisitCounter {
                    visits: Arc::clone(&visits),
                }),
            )
            .unwrap();
    }

    for round in 1..=3 {
        let report = scene.step(0.01);
        assert_eq!(report.visited, NODES);
        assert!(visits.iter().all(|v| v.load(Ordering::SeqCst) == round));
    }
}

#[test]
fn test_parallel_step_buffers_changes() {
    let mut scene = scene_with(4);
    for id in 0..200u64 {
        scene.create_scene_node(id, "n").unwrap();
        scene.add_component(id, Script::TYPE_ID).unwrap();
        if id < 100 {
            scene.insert(id).unwrap();
        }
    }
    // Every in-scene node inserts its partner
    for id in 0..100u64 {
        let script = scene
            .get_by_id_mut(id)
            .unwrap()
            .get_component_mut::<Script>()
            .unwrap();
        script.insert_on_first = Some(id + 100);
    }

    let report = scene.step(0.01);
    assert_eq!(report.visited, 100);
    assert_eq!(report.applied_inserts, 100);
    assert_eq!(scene.scene_len(), 200);
    assert_eq!(scene.step(0.01).visited, 200);
}

#[test]
fn test_external_commands_flush_outside_step() {
    let mut scene = scene_with(1);
    scene.create_scene_node(1, "a").unwrap();
    scene.create_scene_node(2, "b").unwrap();

    let commands = scene.commands();
    let handle = std::thread::spawn(move || {
        commands.queue_insert(1);
        commands.queue_insert(2);
        commands.queue_delete(2);
    });
    handle.join().unwrap();

    // Delete runs before insert, so the insert of 2 is skipped
    assert_eq!(scene.flush(), 2);
    assert!(scene.is_in_scene(1));
    assert!(!scene.contains(2));
    assert!(scene.commands().is_empty());
}

#[test]
fn test_deleted_slot_is_reused() {
    let mut scene = scene_with(1);
    let first = scene.create_scene_node(1, "a").unwrap();
    scene.create_scene_node(2, "b").unwrap();
    scene.delete_scene_node(1).unwrap();

    let reused = scene.create_scene_node(3, "c").unwrap();
    assert_eq!(reused, first);
    assert_eq!(scene.get(reused).unwrap().id(), 3);
    assert_eq!(scene.index_of(1), None);
}

#[test]
fn test_node_is_unreachable_once_delete_is_queued() {
    let mut scene = scene_with(1);
    scene.create_scene_node(1, "reaper").unwrap();
    scene.create_scene_node(2, "doomed").unwrap();
    scene.insert(1).unwrap();
    scene.insert(2).unwrap();
    scene.attach_component(1, Box::new(Reaper::new(2))).unwrap();

    let report = scene.step(0.016);

    let reaper = scene.get_by_id(1).unwrap().get_component::<Reaper>().unwrap();
    assert_eq!(reaper.lookup, Some(None));
    assert_eq!(reaper.in_scene, Some(false));
    assert_eq!(reaper.deleted, Some(true));
    assert_eq!(
        reaper.results,
        vec![
            Ok(()),
            Err(SceneError::UnknownNode(2)),
            Err(SceneError::UnknownNode(2)),
            Err(SceneError::UnknownNode(2)),
        ]
    );
    assert_eq!(report.applied_deletes, 1);
    assert_eq!(report.applied_inserts + report.applied_removes, 0);
    assert!(!scene.contains(2));
}

#[test]
fn test_removes_during_step_apply_last() {
    let mut scene = scene_with(1);
    for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
        scene.create_scene_node(id, name).unwrap();
    }
    scene.insert(1).unwrap();
    scene.insert(2).unwrap();
    scene
        .attach_component(
            1,
            Box::new(Script {
                insert_on_first: Some(3),
                remove_on_first: vec![2, 3],
                ..Script::default()
            }),
        )
        .unwrap();
    scene.add_component(2, Script::TYPE_ID).unwrap();
    let seen = record_all(&mut scene);

    let report = scene.step(0.016);

    // Both members stepped; the removals only land at the barrier
    assert_eq!(report.visited, 2);
    assert_eq!(report.applied_inserts, 1);
    assert_eq!(report.applied_removes, 2);
    let a = scene.get_by_id(1).unwrap().get_component::<Script>().unwrap();
    assert_eq!(a.results, vec![Ok(()), Ok(()), Ok(())]);

    assert!(scene.is_in_scene(1));
    assert!(!scene.is_in_scene(2));
    assert!(!scene.is_in_scene(3));
    assert!(scene.contains(2));
    assert!(scene.contains(3));
    assert_eq!(scene.scene_len(), 1);

    // Events are out before the next step starts
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (SceneEventType::NodeAdded, 3),
            (SceneEventType::NodeRemoved, 2),
            (SceneEventType::NodeRemoved, 3),
        ]
    );

    let report = scene.step(0.016);
    assert_eq!(report.visited, 1);
    assert_eq!(
        scene.get_by_id(2).unwrap().get_component::<Script>().unwrap().updates,
        1
    );
}
