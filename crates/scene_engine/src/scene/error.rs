//! Scene error types

use std::fmt;

use super::component::{Component, ComponentTypeId};

/// Errors reported by the scene state and slot allocator
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// A node with this id already exists in the scene
    #[error("scene node {0} already exists")]
    DuplicateId(u64),

    /// No live node carries this id
    #[error("scene node {0} does not exist")]
    UnknownNode(u64),

    /// The slot allocator could not grow
    #[error("scene node allocation failed")]
    AllocationFailed,

    /// The node is already part of the stepped node list
    #[error("scene node {0} is already in the scene")]
    AlreadyInScene(u64),

    /// The node is not part of the stepped node list
    #[error("scene node {0} is not in the scene")]
    NotInScene(u64),

    /// No descriptor is registered for this component type
    #[error("component type {0} is not registered")]
    UnknownComponentType(ComponentTypeId),

    /// The node already carries a component of this type
    #[error("scene node {node} already has a component of type {type_id}")]
    DuplicateComponent {
        /// Node id
        node: u64,
        /// Rejected component type
        type_id: ComponentTypeId,
    },

    /// All component slots of the node are in use
    #[error("scene node {0} has no free component slot")]
    ComponentSlotsFull(u64),

    /// The node carries no component of this type
    #[error("scene node {node} has no component of type {type_id}")]
    ComponentNotAttached {
        /// Node id
        node: u64,
        /// Requested component type
        type_id: ComponentTypeId,
    },
}

/// Rejected component attachment; hands the component back to the caller
#[derive(thiserror::Error)]
pub enum AttachError {
    /// A component of the same type is already attached
    #[error("component type {0} is already attached")]
    Duplicate(ComponentTypeId, Box<dyn Component>),

    /// Every slot is taken
    #[error("all component slots are in use")]
    SlotsFull(Box<dyn Component>),
}

impl AttachError {
    /// Recover the component that could not be attached
    pub fn into_component(self) -> Box<dyn Component> {
        match self {
            Self::Duplicate(_, component) | Self::SlotsFull(component) => component,
        }
    }

    /// Convert into a scene error for the given node
    pub fn to_scene_error(&self, node: u64) -> SceneError {
        match self {
            Self::Duplicate(type_id, _) => SceneError::DuplicateComponent { node, type_id: *type_id },
            Self::SlotsFull(_) => SceneError::ComponentSlotsFull(node),
        }
    }
}

impl fmt::Debug for AttachError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate(type_id, _) => f.debug_tuple("Duplicate").field(type_id).finish(),
            Self::SlotsFull(component) => f
                .debug_tuple("SlotsFull")
                .field(&component.component_type())
                .finish(),
        }
    }
}
