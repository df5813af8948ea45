//! # Unified Configuration System
//!
//! All tunables of the engine core live here, grouped by subsystem. Every
//! section is `#[serde(default)]` so a config file only needs the keys it
//! overrides.
//!
//! ```toml
//! [runtime]
//! log_level = "debug"
//!
//! [scene]
//! worker_threads = 4
//!
//! [lighting]
//! budget = 800
//!
//! [render]
//! split_shadow_lights = true
//! ```

use serde::{Serialize, Deserialize};

use crate::lighting::LightCostTable;

pub use crate::config::{Config, ConfigError};

/// # Runtime Configuration
///
/// Process-level behaviour: logging and frame pacing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Default log filter passed to `env_logger` (overridden by `RUST_LOG`)
    pub log_level: String,
    /// Largest `dt` a single step may receive, in seconds
    pub max_frame_delta: f32,
    /// Step with this fixed `dt` instead of wall-clock time
    pub fixed_delta: Option<f32>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_frame_delta: 0.25,
            fixed_delta: None,
        }
    }
}

/// # Scene Configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SceneConfig {
    /// Worker threads used to step node chunks (1 = step on the caller thread)
    pub worker_threads: usize,
    /// Chunks allocated up front by the slot allocator
    pub initial_chunks: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1)
                .min(8),
            initial_chunks: 1,
        }
    }
}

/// # Render Configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Render shadow-casting lights one at a time, each right after its own shadow map
    pub split_shadow_lights: bool,
    /// When false, shadow casters are lit as plain lights and no shadow maps are drawn
    pub shadows_enabled: bool,
    /// Shadow map edge length in texels
    pub shadow_map_size: u32,
    /// Colour the frame is cleared to
    pub clear_color: [f32; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            split_shadow_lights: false,
            shadows_enabled: true,
            shadow_map_size: 2048,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// # Complete Engine Configuration
///
/// Top-level configuration handed to [`crate::Engine::new`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Logging and pacing
    pub runtime: RuntimeConfig,
    /// Scene stepping
    pub scene: SceneConfig,
    /// Light costs and the per-draw budget used by the light-group subdivider
    pub lighting: LightCostTable,
    /// Multi-pass renderer
    pub render: RenderConfig,
}

impl EngineConfig {
    /// Override the number of step workers
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.scene.worker_threads = threads;
        self
    }

    /// Step with a fixed `dt` (headless runs, replays)
    pub fn with_fixed_delta(mut self, dt: f32) -> Self {
        self.runtime.fixed_delta = Some(dt);
        self
    }

    /// Toggle per-light shadow rendering
    pub fn with_split_shadow_lights(mut self, split: bool) -> Self {
        self.render.split_shadow_lights = split;
        self
    }
}

impl Config for EngineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.scene.worker_threads == 0 {
            return Err(ConfigError::Invalid("scene.worker_threads must be at least 1".into()));
        }
        if self.scene.worker_threads > 64 {
            return Err(ConfigError::Invalid("scene.worker_threads should not exceed 64".into()));
        }
        if !(self.runtime.max_frame_delta > 0.0) {
            return Err(ConfigError::Invalid("runtime.max_frame_delta must be positive".into()));
        }
        if self.runtime.fixed_delta.is_some_and(|dt| !(dt > 0.0)) {
            return Err(ConfigError::Invalid("runtime.fixed_delta must be positive".into()));
        }
        if self.lighting.budget == 0 {
            return Err(ConfigError::Invalid("lighting.budget must be non-zero".into()));
        }
        if !self.render.shadow_map_size.is_power_of_two() {
            return Err(ConfigError::Invalid(format!(
                "render.shadow_map_size must be a power of two, got {}",
                self.render.shadow_map_size
            )));
        }
        Ok(())
    }
}
