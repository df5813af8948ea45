//! Core engine implementation

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::{
    application::Application,
    assets::{ChunkError, ModelDefinition},
    core::config::{Config, ConfigError, EngineConfig},
    foundation::time::Timer,
    lighting::{Light, LightGroupError, LightId, LightManager},
    render::{
        BucketingVisibility, FrameStats, MeshFlags, MeshKey, RenderDevice, RenderPipeline,
        RenderResources, Viewport, VisibilityProcessor, VisibleObjects,
    },
    scene::{ComponentRegistry, SceneError, SceneState, StepReport},
};
use thiserror::Error;

/// Result of one [`Engine::frame`]
#[derive(Debug, Clone)]
pub struct FrameReport {
    /// Scene step summary
    pub step: StepReport,
    /// Meshes that survived culling
    pub visible: usize,
    /// Renderer counters
    pub render: FrameStats,
}

/// Main engine struct
///
/// Owns the scene, lights, render resources and pipeline, and runs one
/// frame as step, then visibility, then render.
pub struct Engine {
    config: EngineConfig,
    scene: SceneState,
    lights: LightManager,
    resources: RenderResources,
    visibility: Box<dyn VisibilityProcessor>,
    visible: VisibleObjects,
    pipeline: RenderPipeline,
    bindings: HashMap<u64, MeshKey>,
    timer: Timer,
    running: bool,
}

impl Engine {
    /// Create a new engine instance
    pub fn new(config: EngineConfig, registry: ComponentRegistry) -> Result<Self, EngineError> {
        config.validate()?;
        log::info!(
            "Initializing engine: {} step workers, {} component types",
            config.scene.worker_threads,
            registry.len()
        );

        let scene = SceneState::new(Arc::new(registry), &config.scene);
        let pipeline = RenderPipeline::new(config.render.clone(), config.lighting.clone());
        let timer = Timer::with_max_delta(config.runtime.max_frame_delta);

        Ok(Self {
            config,
            scene,
            lights: LightManager::new(),
            resources: RenderResources::new(),
            visibility: Box::new(BucketingVisibility),
            visible: VisibleObjects::new(),
            pipeline,
            bindings: HashMap::new(),
            timer,
            running: true,
        })
    }

    /// Create an engine from a `.toml` or `.ron` config file
    pub fn from_config_file(path: impl AsRef<Path>, registry: ComponentRegistry) -> Result<Self, EngineError> {
        let config = EngineConfig::load_from_file(path)?;
        Self::new(config, registry)
    }

    /// Replace the visibility processor
    pub fn set_visibility_processor(&mut self, processor: Box<dyn VisibilityProcessor>) {
        self.visibility = processor;
    }

    /// Run a headless main loop for at most `max_frames` frames
    pub fn run<A: Application>(
        &mut self,
        app: &mut A,
        device: &mut dyn RenderDevice,
        viewport: &Viewport,
        max_frames: u64,
    ) -> Result<(), EngineError> {
        app.initialize(self)
            .map_err(|e| EngineError::Application(format!("App initialization: {}", e)))?;

        log::info!("Starting main loop...");
        let mut frames = 0;
        while self.running && frames < max_frames {
            let delta_time = match self.config.runtime.fixed_delta {
                Some(dt) => self.timer.advance(dt),
                None => self.timer.tick(),
            };
            app.update(self, delta_time)
                .map_err(|e| EngineError::Application(format!("App update: {}", e)))?;
            let report = self.frame(delta_time, viewport, device);
            app.frame_finished(self, &report);
            frames += 1;
        }

        app.cleanup(self);
        log::info!("Engine stopped after {} frames", frames);
        Ok(())
    }

    /// Step the scene, cull and render one viewport
    pub fn frame(&mut self, dt: f32, viewport: &Viewport, device: &mut dyn RenderDevice) -> FrameReport {
        let step = self.scene.step(dt);
        self.sync_bindings(&step);

        self.lights.begin_frame();
        self.visibility.process(viewport, &self.resources, &mut self.visible);
        let render = self.pipeline.render(
            device,
            viewport,
            &self.visible,
            &self.resources,
            &mut self.lights,
        );

        FrameReport {
            step,
            visible: self.visible.len(),
            render,
        }
    }

    /// Copy transforms of bound nodes into their meshes
    ///
    /// Meshes of nodes outside the scene are hidden; meshes of deleted
    /// nodes are removed.
    fn sync_bindings(&mut self, step: &StepReport) {
        for &index in &step.changed {
            let Some(node) = self.scene.get(index) else {
                continue;
            };
            if let Some(mesh) = self
                .bindings
                .get(&node.id())
                .and_then(|&key| self.resources.mesh_mut(key))
            {
                mesh.transform = node.transform().to_matrix();
            }
        }

        let scene = &self.scene;
        let resources = &mut self.resources;
        self.bindings.retain(|&id, &mut key| match scene.get_by_id(id) {
            Some(node) => {
                if let Some(mesh) = resources.mesh_mut(key) {
                    mesh.flags.set(MeshFlags::HIDDEN, !node.is_in_scene());
                }
                true
            }
            None => {
                log::debug!("Node {} deleted, dropping its mesh", id);
                resources.remove_mesh(key);
                false
            }
        });
    }

    /// Drive a mesh's transform and visibility from a scene node
    pub fn bind_mesh(&mut self, node_id: u64, mesh: MeshKey) -> Result<(), EngineError> {
        let node = self
            .scene
            .get_by_id(node_id)
            .ok_or(EngineError::Scene(SceneError::UnknownNode(node_id)))?;
        let instance = self.resources.mesh_mut(mesh).ok_or(EngineError::UnknownMesh)?;
        instance.transform = node.transform().to_matrix();
        instance.flags.set(MeshFlags::HIDDEN, !node.is_in_scene());

        if let Some(previous) = self.bindings.insert(node_id, mesh) {
            if previous != mesh {
                log::warn!("Node {} was already bound to another mesh, rebinding", node_id);
            }
        }
        Ok(())
    }

    /// Stop driving a node's mesh; the mesh stays in the store
    pub fn unbind_mesh(&mut self, node_id: u64) -> Option<MeshKey> {
        self.bindings.remove(&node_id)
    }

    /// Add a light
    pub fn add_light(&mut self, light: Light) -> Result<LightId, EngineError> {
        Ok(self.lights.add_light(light)?)
    }

    /// Load a model asset from disk
    pub fn load_model(&self, path: impl AsRef<Path>) -> Result<ModelDefinition, EngineError> {
        Ok(ModelDefinition::load(path)?)
    }

    /// Request engine shutdown
    pub fn quit(&mut self) {
        log::info!("Engine shutdown requested");
        self.running = false;
    }

    /// Whether the main loop keeps going
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the scene
    pub fn scene(&self) -> &SceneState {
        &self.scene
    }

    /// Get mutable access to the scene
    pub fn scene_mut(&mut self) -> &mut SceneState {
        &mut self.scene
    }

    /// Get the light manager
    pub fn lights(&self) -> &LightManager {
        &self.lights
    }

    /// Get mutable access to the light manager
    pub fn lights_mut(&mut self) -> &mut LightManager {
        &mut self.lights
    }

    /// Get the mesh and material store
    pub fn resources(&self) -> &RenderResources {
        &self.resources
    }

    /// Get mutable access to the mesh and material store
    pub fn resources_mut(&mut self) -> &mut RenderResources {
        &mut self.resources
    }

    /// Get the render pipeline
    pub fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    /// Get the current frame delta time
    pub fn delta_time(&self) -> f32 {
        self.timer.delta_time()
    }
}

/// Engine errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scene operation failed
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// Light could not be added
    #[error("Lighting error: {0}")]
    Lighting(#[from] LightGroupError),

    /// Asset could not be read
    #[error("Asset error: {0}")]
    Asset(#[from] ChunkError),

    /// Mesh key not in the store
    #[error("Unknown mesh")]
    UnknownMesh,

    /// Application callback failed
    #[error("Application error: {0}")]
    Application(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::AppError;
    use crate::foundation::math::Vec3;
    use crate::render::{Material, Mesh, RecordingDevice, ShaderId, VertexArrayId};
    use crate::scene::{Component, ComponentType, ComponentTypeId, NodeContext, StepContext};
    use std::any::Any;

    #[derive(Default)]
    struct Orbit;

    impl Component for Orbit {
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

    impl ComponentType for Orbit {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(10);
        const NAME: &'static str = "Orbit";
    }

    fn engine() -> Engine {
        let mut registry = ComponentRegistry::new();
        registry.register_type::<Orbit>();
        Engine::new(EngineConfig::default().with_worker_threads(2), registry).unwrap()
    }

    fn add_crate(engine: &mut Engine, id: u64) -> MeshKey {
        let material = engine
            .resources_mut()
            .add_material(Material::opaque("wood", ShaderId(1), ShaderId(2), ShaderId(3)));
        let mesh = engine
            .resources_mut()
            .add_mesh(Mesh::new("crate", Some(VertexArrayId(1)), material));
        engine.scene_mut().create_scene_node(id, "crate").unwrap();
        engine.scene_mut().add_component(id, Orbit::TYPE_ID).unwrap();
        engine.bind_mesh(id, mesh).unwrap();
        mesh
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Engine::new(EngineConfig::default().with_worker_threads(0), ComponentRegistry::new());
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_bound_mesh_follows_node() {
        let mut engine = engine();
        let mesh = add_crate(&mut engine, 1);
        let mut device = RecordingDevice::new();
        let viewport = Viewport::default();

        // Not in the scene yet: hidden and not stepped
        let report = engine.frame(0.5, &viewport, &mut device);
        assert_eq!(report.visible, 0);
        assert_eq!(report.render.draw_calls, 0);

        engine.scene_mut().insert(1).unwrap();
        let report = engine.frame(0.5, &viewport, &mut device);
        assert_eq!(report.step.visited, 1);
        assert_eq!(report.visible, 1);
        assert_eq!(report.render.draw_calls, 3);
        let position = engine.resources().mesh(mesh).unwrap().position();
        assert!((position.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_deleted_node_drops_mesh() {
        let mut engine = engine();
        let mesh = add_crate(&mut engine, 7);
        engine.scene_mut().insert(7).unwrap();
        engine.scene_mut().delete_scene_node(7).unwrap();

        let mut device = RecordingDevice::new();
        engine.frame(0.1, &Viewport::default(), &mut device);
        assert!(engine.resources().mesh(mesh).is_none());
        assert!(engine.unbind_mesh(7).is_none());
    }

    #[test]
    fn test_bind_unknown_targets() {
        let mut engine = engine();
        assert!(matches!(
            engine.bind_mesh(3, MeshKey::default()),
            Err(EngineError::Scene(SceneError::UnknownNode(3)))
        ));
        engine.scene_mut().create_scene_node(3, "empty").unwrap();
        assert!(matches!(engine.bind_mesh(3, MeshKey::default()), Err(EngineError::UnknownMesh)));
    }

    struct Countdown {
        remaining: u32,
        frames_seen: u32,
        cleaned_up: bool,
    }

    impl Application for Countdown {
        fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
            engine.add_light(Light::ambient(Vec3::new(1.0, 1.0, 1.0), 0.1))?;
            Ok(())
        }

        fn update(&mut self, engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
            if self.remaining == 0 {
                engine.quit();
            } else {
                self.remaining -= 1;
            }
            Ok(())
        }

        fn frame_finished(&mut self, _engine: &mut Engine, _report: &FrameReport) {
            self.frames_seen += 1;
        }

        fn cleanup(&mut self, _engine: &mut Engine) {
            self.cleaned_up = true;
        }
    }

    #[test]
    fn test_run_stops_on_quit() {
        let mut engine = engine();
        engine.config.runtime.fixed_delta = Some(0.02);
        let mut app = Countdown {
            remaining: 3,
            frames_seen: 0,
            cleaned_up: false,
        };
        let mut device = RecordingDevice::new();
        engine.run(&mut app, &mut device, &Viewport::default(), 100).unwrap();

        // The quitting update still renders its frame
        assert_eq!(app.frames_seen, 4);
        assert!(app.cleaned_up);
        assert!(!engine.is_running());
        assert_eq!(engine.lights().len(), 1);
        assert!((engine.delta_time() - 0.02).abs() < 1e-6);
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("scene_engine_engine_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_engine_from_config_file() {
        let path = temp_path("engine.toml");
        std::fs::write(&path, "[scene]\nworker_threads = 3\n\n[runtime]\nfixed_delta = 0.05\n").unwrap();

        let engine = Engine::from_config_file(&path, ComponentRegistry::new()).unwrap();
        assert_eq!(engine.config().scene.worker_threads, 3);
        assert_eq!(engine.config().runtime.fixed_delta, Some(0.05));
        std::fs::remove_file(&path).ok();

        assert!(matches!(
            Engine::from_config_file(temp_path("missing.toml"), ComponentRegistry::new()),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_load_model_through_engine() {
        let engine = engine();
        let path = temp_path("hull.bin");
        let mut model = ModelDefinition::new("crate");
        model.hulls.push(crate::assets::ConvexHull {
            points: vec![Vec3::zeros(), Vec3::x(), Vec3::y()],
            faces: vec![vec![0, 1, 2]],
        });
        model.save(&path).unwrap();

        assert_eq!(engine.load_model(&path).unwrap(), model);
        std::fs::remove_file(&path).ok();
        assert!(matches!(engine.load_model(&path), Err(EngineError::Asset(ChunkError::Io(_)))));
    }

    /// Sees nothing, counts how often it ran
    struct Blindfold {
        runs: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl VisibilityProcessor for Blindfold {
        fn process(&mut self, _viewport: &Viewport, _resources: &RenderResources, visible: &mut VisibleObjects) {
            self.runs.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            visible.clear();
        }
    }

    #[test]
    fn test_custom_visibility_processor() {
        let mut engine = engine();
        add_crate(&mut engine, 1);
        engine.scene_mut().insert(1).unwrap();
        engine
            .lights_mut()
            .add_light(Light::ambient(Vec3::new(1.0, 1.0, 1.0), 0.3))
            .unwrap();
        assert_eq!(engine.lights().len(), 1);

        let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        engine.set_visibility_processor(Box::new(Blindfold { runs: Arc::clone(&runs) }));
        let report = engine.frame(0.1, &Viewport::default(), &mut RecordingDevice::new());

        assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(report.step.visited, 1);
        assert_eq!(report.visible, 0);
        assert_eq!(report.render.draw_calls, 0);
    }
}
