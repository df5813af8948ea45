//! # Core Engine Module
//!
//! Shared abstractions used by every subsystem.
//!
//! ## Organization
//!
//! - **Config**: Unified configuration for the engine, scene, lighting and renderer

pub mod config;

pub use crate::foundation;

pub use config::{
    EngineConfig,
    RuntimeConfig,
    SceneConfig,
    RenderConfig,
    Config,
    ConfigError,
};
