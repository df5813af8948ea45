//! Light management and light-group subdivision
//!
//! The [`LightManager`] owns every light and classifies the enabled ones
//! into a category-ordered [`LightGroup`] once per frame. Groups that are
//! too expensive to shade in one pass are split by [`subdivide`] according
//! to a configurable [`LightCostTable`].

mod group;
mod light;
mod manager;
mod subdivide;

pub use group::{LightGroup, LightGroupError, LightGroupKey};
pub use light::{Light, LightCategory, LightId, LightKind};
pub use manager::LightManager;
pub use subdivide::{subdivide, LightCostTable, SubGroup, SubdivisionPolicy};
