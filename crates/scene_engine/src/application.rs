//! Application trait and lifecycle management

use crate::engine::{Engine, EngineError, FrameReport};
use thiserror::Error;

/// Application lifecycle trait
///
/// Implement this trait to drive the engine from [`Engine::run`].
pub trait Application {
    /// Initialize the application
    ///
    /// Called once before the first frame. Use this to register nodes,
    /// lights, meshes and materials.
    fn initialize(&mut self, engine: &mut Engine) -> Result<(), AppError>;

    /// Update the application
    ///
    /// Called every frame before the scene is stepped.
    ///
    /// # Arguments
    /// * `engine` - Mutable reference to the engine
    /// * `delta_time` - Time since last frame in seconds
    fn update(&mut self, engine: &mut Engine, delta_time: f32) -> Result<(), AppError>;

    /// Called after each frame has been rendered
    fn frame_finished(&mut self, _engine: &mut Engine, _report: &FrameReport) {}

    /// Cleanup the application
    ///
    /// Called once when the main loop ends.
    fn cleanup(&mut self, engine: &mut Engine);
}

/// Application-level errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Engine error propagated to application level
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Custom application error
    #[error("Application error: {0}")]
    Custom(String),
}
