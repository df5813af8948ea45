//! Component trait and per-node update context

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::commands::StepContext;
use super::node::{NodeFlags, NodeName};
use super::node_list::NodeIndex;
use crate::foundation::math::{Quat, Transform, Vec3};

/// Small integer identifying a component type within a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentTypeId(pub u32);

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Behaviour or data block attached to a scene node
///
/// A node holds at most one component per [`ComponentTypeId`]. Components
/// are stepped on whichever worker owns the node's chunk, hence `Send`.
pub trait Component: Send + 'static {
    /// Type tag used for exclusivity checks and registry dispatch
    fn component_type(&self) -> ComponentTypeId;

    /// Per-step hook. Structural changes must go through `step`.
    fn update(&mut self, _node: &mut NodeContext<'_>, _step: &StepContext<'_>) {}

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Statically known component type, enables typed lookup on nodes
pub trait ComponentType: Component + Sized {
    /// Registry type id
    const TYPE_ID: ComponentTypeId;
    /// Human readable name
    const NAME: &'static str;
}

impl dyn Component {
    /// Borrow as a concrete component type
    pub fn downcast_ref<T: ComponentType>(&self) -> Option<&T> {
        if self.component_type() == T::TYPE_ID {
            self.as_any().downcast_ref::<T>()
        } else {
            None
        }
    }

    /// Mutably borrow as a concrete component type
    pub fn downcast_mut<T: ComponentType>(&mut self) -> Option<&mut T> {
        if self.component_type() == T::TYPE_ID {
            self.as_any_mut().downcast_mut::<T>()
        } else {
            None
        }
    }
}

/// View of the node being stepped, handed to [`Component::update`]
///
/// Transform writes raise the node's changed-bits exactly like the setters
/// on [`super::SceneNode`].
pub struct NodeContext<'a> {
    pub(super) id: u64,
    pub(super) index: NodeIndex,
    pub(super) name: &'a NodeName,
    pub(super) position: &'a mut Vec3,
    pub(super) rotation: &'a mut Quat,
    pub(super) scale: &'a mut Vec3,
    pub(super) flags: &'a mut NodeFlags,
}

impl NodeContext<'_> {
    /// External node id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Slot index of the node
    pub fn index(&self) -> NodeIndex {
        self.index
    }

    /// Node name
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Current position
    pub fn position(&self) -> Vec3 {
        *self.position
    }

    /// Current rotation
    pub fn rotation(&self) -> Quat {
        *self.rotation
    }

    /// Current scale
    pub fn scale(&self) -> Vec3 {
        *self.scale
    }

    /// Snapshot of the full transform
    pub fn transform(&self) -> Transform {
        Transform {
            position: *self.position,
            rotation: *self.rotation,
            scale: *self.scale,
        }
    }

    /// Move the node
    pub fn set_position(&mut self, position: Vec3) {
        *self.position = position;
        self.flags.insert(NodeFlags::POSITION_CHANGED);
    }

    /// Offset the node
    pub fn translate(&mut self, offset: Vec3) {
        *self.position += offset;
        self.flags.insert(NodeFlags::POSITION_CHANGED);
    }

    /// Rotate the node
    pub fn set_rotation(&mut self, rotation: Quat) {
        *self.rotation = rotation;
        self.flags.insert(NodeFlags::ROTATION_CHANGED);
    }

    /// Rescale the node
    pub fn set_scale(&mut self, scale: Vec3) {
        *self.scale = scale;
        self.flags.insert(NodeFlags::SCALE_CHANGED);
    }

    /// Whether the node is flagged static
    pub fn is_static(&self) -> bool {
        self.flags.contains(NodeFlags::STATIC)
    }
}
