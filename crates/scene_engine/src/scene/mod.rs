//! Scene node runtime
//!
//! Nodes live in a chunked slot allocator and carry up to eight components
//! each. The [`SceneState`] orchestrates node lifetime and steps every node
//! that is in the scene, buffering structural changes made during a step
//! and applying them at the end-of-step barrier.
//!
//! ## Architecture
//!
//! ```text
//! SceneState
//!   ├── SceneNodeList (Vec<Box<NodeChunk>>, 64 slots each)
//!   ├── NodeDirectory (id → index, primary list)    [mutex]
//!   ├── SceneCommands (buffered insert/remove/delete) [mutex]
//!   ├── ComponentRegistry (injected, shared)
//!   └── SceneEvents (added/removed/deleted notifications)
//! ```

mod commands;
mod component;
mod error;
mod events;
mod node;
mod node_list;
mod registry;
mod state;

#[cfg(test)]
mod tests;

pub use commands::{PendingChanges, SceneCommands, StepContext};
pub use component::{Component, ComponentType, ComponentTypeId, NodeContext};
pub use error::{AttachError, SceneError};
pub use events::{SceneEvent, SceneEventHandler, SceneEventType, SceneEvents};
pub use node::{NodeFlags, NodeName, SceneNode, MAX_COMPONENTS};
pub use node_list::{NodeChunk, NodeIndex, SceneNodeList, CHUNK_SLOTS};
pub use registry::{ComponentDescriptor, ComponentRegistry, TypedDescriptor};
pub use state::{SceneState, StepReport};
