//! Fleet demo
//!
//! Drives the engine headless: frigates drift forward, escorts orbit them
//! and engine-trail particles are recycled through the step barrier. The
//! renderer records device calls instead of drawing.
//!
//! Usage: `fleet_demo [config.toml|config.ron] [frames]`

use std::any::Any;
use std::f32::consts::TAU;

use scene_engine::foundation::logging;
use scene_engine::prelude::*;
use scene_engine::render::MaterialKey;

const NUM_FRIGATES: u64 = 3;
const ESCORTS_PER_FRIGATE: u64 = 4;
const PARTICLES_PER_FRIGATE: u64 = 8;
const FRIGATE_SPEED: f32 = 5.0;
const FRIGATE_SPACING: f32 = 50.0;
const ESCORT_ORBIT_RADIUS: f32 = 15.0;
const ESCORT_ORBIT_SPEED: f32 = 0.5;
const PARTICLE_LIFETIME: f32 = 0.75;
const SPAWN_INTERVAL: f32 = 0.1;
const DEFAULT_FRAMES: u64 = 240;

const FRIGATE_BASE: u64 = 1_000;
const ESCORT_BASE: u64 = 2_000;
const PARTICLE_BASE: u64 = 3_000;

/// Moves the node along +z at constant speed
#[derive(Default)]
struct Cruise {
    speed: f32,
}

impl Component for Cruise {
    fn component_type(&self) -> ComponentTypeId {
        Self::TYPE_ID
    }

    fn update(&mut self, node: &mut NodeContext<'_>, step: &StepContext<'_>) {
        node.translate(Vec3::new(0.0, 0.0, self.speed * step.dt()));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ComponentType for Cruise {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(1);
    const NAME: &'static str = "Cruise";
}

/// Circles a moving centre
struct Orbit {
    center: Vec3,
    phase: f32,
}

impl Default for Orbit {
    fn default() -> Self {
        Self {
            center: Vec3::zeros(),
            phase: 0.0,
        }
    }
}

impl Component for Orbit {
    fn component_type(&self) -> ComponentTypeId {
        Self::TYPE_ID
    }

    fn update(&mut self, node: &mut NodeContext<'_>, step: &StepContext<'_>) {
        let dt = step.dt();
        self.phase = (self.phase + ESCORT_ORBIT_SPEED * dt) % TAU;
        self.center.z += FRIGATE_SPEED * dt;
        let offset = Vec3::new(self.phase.cos(), 0.2 * self.phase.sin(), self.phase.sin());
        node.set_position(self.center + offset * ESCORT_ORBIT_RADIUS);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl ComponentType for Orbit {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(2);
    const NAME: &'static str = "Orbit";
}

/// Puts pooled trail particles back into the scene at a fixed rate
#[derive(Default)]
struct TrailEmitter {
    pool: Vec<u64>,
    timer: f32,
}

impl Component for TrailEmitter {
    fn component_type(&self) -> ComponentTypeId {
        Self::TYPE_ID
    }

    fn update(&mut self, _node: &mut NodeContext<'_>, step: &StepContext<'_>) {
        self.timer += step.dt();
        if self.timer < SPAWN_INTERVAL {
            return;
        }
        self.timer -= SPAWN_INTERVAL;

        if let Some(&id) = self.pool.iter().find(|&&id| !step.is_in_scene(id)) {
            if let Err(e) = step.insert(id) {
                log::debug!("Particle {} not spawned: {}", id, e);
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

impl ComponentType for TrailEmitter {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(3);
    const NAME: &'static str = "TrailEmitter";
}

/// Short-lived particle that takes itself out of the scene when it expires
struct TrailParticle {
    emitter_start: Vec3,
    age: f32,
    spawned: bool,
}

impl Default for TrailParticle {
    fn default() -> Self {
        Self {
            emitter_start: Vec3::zeros(),
            age: 0.0,
            spawned: false,
        }
    }
}

impl Component for TrailParticle {
    fn component_type(&self) -> ComponentTypeId {
        Self::TYPE_ID
    }

    fn update(&mut self, node: &mut NodeContext<'_>, step: &StepContext<'_>) {
        if !self.spawned {
            self.spawned = true;
            let emitter_z = self.emitter_start.z + FRIGATE_SPEED * step.step() as f32 * step.dt();
            node.set_position(Vec3::new(self.emitter_start.x, self.emitter_start.y, emitter_z - 6.0));
        }
        self.age += step.dt();
        node.translate(Vec3::new(0.0, 0.0, -2.0 * step.dt()));

        if self.age >= PARTICLE_LIFETIME {
            self.age = 0.0;
            self.spawned = false;
            if let Err(e) = step.remove(node.id()) {
                log::warn!("Particle {} could not retire: {}", node.id(), e);
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

impl ComponentType for TrailParticle {
    const TYPE_ID: ComponentTypeId = ComponentTypeId(4);
    const NAME: &'static str = "TrailParticle";
}

struct Materials {
    hull: MaterialKey,
    glow: MaterialKey,
}

struct FleetApp {
    total_draws: usize,
    total_shadow_maps: usize,
}

impl FleetApp {
    fn new() -> Self {
        Self {
            total_draws: 0,
            total_shadow_maps: 0,
        }
    }

    fn materials(engine: &mut Engine) -> Materials {
        let resources = engine.resources_mut();
        let hull = resources.add_material(Material::opaque(
            "hull",
            ShaderId(1),
            ShaderId(2),
            ShaderId(3),
        ));
        let glow = resources.add_material(
            Material::transparent("glow", ShaderId(4), BlendState::ADDITIVE)
                .with_flags(MaterialFlags::DRAW_LAST),
        );
        Materials { hull, glow }
    }

    fn spawn(
        engine: &mut Engine,
        id: u64,
        name: &str,
        position: Vec3,
        component: Box<dyn Component>,
        mesh: Mesh,
        in_scene: bool,
    ) -> Result<(), AppError> {
        let scene = engine.scene_mut();
        scene.create_scene_node(id, name).map_err(EngineError::from)?;
        if let Some(node) = scene.get_by_id_mut(id) {
            node.set_position(position);
        }
        scene.attach_component(id, component).map_err(EngineError::from)?;
        if in_scene {
            scene.insert(id).map_err(EngineError::from)?;
        }
        let mesh = engine.resources_mut().add_mesh(mesh);
        engine.bind_mesh(id, mesh)?;
        Ok(())
    }
}

impl Application for FleetApp {
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError> {
        let materials = Self::materials(engine);

        engine.add_light(Light::ambient(Vec3::new(0.2, 0.2, 0.3), 1.0))?;
        engine.add_light(
            Light::directional(Vec3::new(-0.3, -1.0, 0.2), Vec3::new(1.0, 0.95, 0.9), 1.0)
                .with_shadows(true),
        )?;

        for f in 0..NUM_FRIGATES {
            let center = Vec3::new((f as f32 - 1.0) * FRIGATE_SPACING, 0.0, -80.0);
            let frigate_id = FRIGATE_BASE + f;

            engine.add_light(
                Light::point(center + Vec3::new(0.0, 4.0, 0.0), Vec3::new(1.0, 0.6, 0.2), 2.0, 30.0)
                    .with_shadows(f == 0),
            )?;

            let pool: Vec<u64> = (0..PARTICLES_PER_FRIGATE)
                .map(|p| PARTICLE_BASE + f * PARTICLES_PER_FRIGATE + p)
                .collect();
            for &particle_id in &pool {
                Self::spawn(
                    engine,
                    particle_id,
                    "trail",
                    center,
                    Box::new(TrailParticle {
                        emitter_start: center,
                        age: 0.0,
                        spawned: false,
                    }),
                    Mesh::new("trail", Some(VertexArrayId(3)), materials.glow)
                        .with_bounding_radius(0.5)
                        .with_flags(MeshFlags::empty()),
                    false,
                )?;
            }

            Self::spawn(
                engine,
                frigate_id,
                "frigate",
                center,
                Box::new(TrailEmitter { pool, timer: 0.0 }),
                Mesh::new("frigate", Some(VertexArrayId(1)), materials.hull).with_bounding_radius(12.0),
                true,
            )?;
            engine
                .scene_mut()
                .attach_component(
                    frigate_id,
                    Box::new(Cruise {
                        speed: FRIGATE_SPEED,
                    }),
                )
                .map_err(EngineError::from)?;

            for e in 0..ESCORTS_PER_FRIGATE {
                let phase = e as f32 / ESCORTS_PER_FRIGATE as f32 * TAU;
                Self::spawn(
                    engine,
                    ESCORT_BASE + f * ESCORTS_PER_FRIGATE + e,
                    "escort",
                    center,
                    Box::new(Orbit { center, phase }),
                    Mesh::new("escort", Some(VertexArrayId(2)), materials.hull).with_bounding_radius(2.0),
                    true,
                )?;
            }
        }

        log::info!(
            "Fleet ready: {} nodes, {} in scene, {} lights",
            engine.scene().len(),
            engine.scene().scene_len(),
            engine.lights().len()
        );
        Ok(())
    }

    fn update(&mut self, _engine: &mut Engine, _delta_time: f32) -> Result<(), AppError> {
        Ok(())
    }

    fn frame_finished(&mut self, engine: &mut Engine, report: &FrameReport) {
        self.total_draws += report.render.draw_calls;
        self.total_shadow_maps += report.render.shadow_maps;
        if report.step.step % 60 == 0 {
            log::info!(
                "Step {}: {} stepped, {} visible, {} draws ({} skipped), {} light sub-groups, +{} -{} structural",
                report.step.step,
                report.step.visited,
                report.visible,
                report.render.draw_calls,
                report.render.skipped_draws,
                report.render.light_sub_groups,
                report.step.applied_inserts,
                report.step.applied_removes,
            );
            log::debug!("{} nodes in scene", engine.scene().scene_len());
        }
    }

    fn cleanup(&mut self, engine: &mut Engine) {
        log::info!(
            "Fleet demo finished after {} steps: {} draw calls, {} shadow maps",
            engine.scene().step_count(),
            self.total_draws,
            self.total_shadow_maps
        );
    }
}

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register_type::<Cruise>();
    registry.register_type::<Orbit>();
    registry.register_type::<TrailEmitter>();
    registry.register_type::<TrailParticle>();
    registry
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::load_from_file(&path)?,
        None => EngineConfig::default().with_fixed_delta(1.0 / 60.0),
    };
    let frames = match args.next() {
        Some(frames) => frames.parse()?,
        None => DEFAULT_FRAMES,
    };

    logging::init_with_level(&config.runtime.log_level);
    log::info!("Starting fleet demo for {} frames", frames);

    let mut engine = Engine::new(config, registry())?;
    let viewport = Viewport::look_at(
        Vec3::new(0.0, 40.0, 40.0),
        Vec3::new(0.0, 0.0, -60.0),
        scene_engine::foundation::math::utils::deg_to_rad(60.0),
        16.0 / 9.0,
        0.1,
        500.0,
    );
    let mut device = RecordingDevice::new();
    let mut app = FleetApp::new();
    engine.run(&mut app, &mut device, &viewport, frames)?;

    log::info!("Device recorded {} commands", device.commands().len());
    Ok(())
}
