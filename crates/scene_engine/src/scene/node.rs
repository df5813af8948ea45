//! Scene node record
//!
//! A node is a fixed-size, 16-byte aligned record: transform, id, name,
//! flag bits and a dense array of up to [`MAX_COMPONENTS`] components.
//! Components always occupy a prefix of the array so iteration by index
//! never meets a gap.

use std::fmt;

use bitflags::bitflags;

use super::commands::StepContext;
use super::component::{Component, ComponentType, ComponentTypeId, NodeContext};
use super::error::AttachError;
use super::node_list::NodeIndex;
use crate::foundation::math::{Quat, Transform, Vec3};

/// Component slots per node
pub const MAX_COMPONENTS: usize = 8;

const NAME_CAPACITY: usize = 31;

bitflags! {
    /// Per-node state bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u16 {
        /// Position written since the last step
        const POSITION_CHANGED = 1 << 0;
        /// Rotation written since the last step
        const ROTATION_CHANGED = 1 << 1;
        /// Scale written since the last step
        const SCALE_CHANGED = 1 << 2;
        /// Excluded from stepping and rendering
        const DISABLED = 1 << 4;
        /// Member of the stepped node list
        const IN_SCENE = 1 << 5;
        /// Never expected to move
        const STATIC = 1 << 6;
        /// Stays in the scene but components are not updated
        const UPDATING_DISABLED = 1 << 7;

        /// Any transform change
        const TRANSFORM_CHANGED = Self::POSITION_CHANGED.bits()
            | Self::ROTATION_CHANGED.bits()
            | Self::SCALE_CHANGED.bits();
    }
}

/// Fixed 31-byte node name, truncated on a character boundary
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NodeName {
    bytes: [u8; NAME_CAPACITY],
    len: u8,
}

impl NodeName {
    /// Build a name, truncating to 31 bytes
    pub fn new(name: &str) -> Self {
        let mut end = name.len().min(NAME_CAPACITY);
        while !name.is_char_boundary(end) {
            end -= 1;
        }

        let mut bytes = [0u8; NAME_CAPACITY];
        bytes[..end].copy_from_slice(&name.as_bytes()[..end]);
        Self {
            bytes,
            len: end as u8,
        }
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..usize::from(self.len)]).unwrap_or_default()
    }
}

impl fmt::Debug for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Positioned entity owning zero or more components
#[repr(C, align(16))]
pub struct SceneNode {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    id: u64,
    components: [Option<Box<dyn Component>>; MAX_COMPONENTS],
    name: NodeName,
    flags: NodeFlags,
    component_count: u8,
}

impl SceneNode {
    /// Create a detached node with an identity transform
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            id,
            components: Default::default(),
            name: NodeName::new(name),
            flags: NodeFlags::empty(),
            component_count: 0,
        }
    }

    /// External id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Node name
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Current flag bits
    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    // --- components -------------------------------------------------------

    /// Attach a component, rejecting duplicates and overflow
    pub fn attach_component(&mut self, component: Box<dyn Component>) -> Result<(), AttachError> {
        let type_id = component.component_type();
        if self.has_component(type_id) {
            return Err(AttachError::Duplicate(type_id, component));
        }
        let count = self.component_count();
        if count == MAX_COMPONENTS {
            return Err(AttachError::SlotsFull(component));
        }

        self.components[count] = Some(component);
        self.component_count += 1;
        Ok(())
    }

    /// Detach the component of the given type, compacting the array
    pub fn detach_component(&mut self, type_id: ComponentTypeId) -> Option<Box<dyn Component>> {
        let position = self.component_position(type_id)?;
        self.detach_component_at(position)
    }

    /// Detach the component at `index`, compacting the array
    pub fn detach_component_at(&mut self, index: usize) -> Option<Box<dyn Component>> {
        let count = self.component_count();
        if index >= count {
            return None;
        }

        let component = self.components[index].take();
        // Shift the tail down so the populated slots stay a dense prefix
        self.components[index..count].rotate_left(1);
        self.component_count -= 1;
        debug_assert!(self.components[self.component_count()].is_none());
        component
    }

    /// Remove every component, last attached first
    pub fn take_components(&mut self) -> Vec<Box<dyn Component>> {
        let count = self.component_count();
        self.component_count = 0;
        self.components[..count]
            .iter_mut()
            .rev()
            .filter_map(Option::take)
            .collect()
    }

    /// Number of attached components
    pub fn component_count(&self) -> usize {
        usize::from(self.component_count)
    }

    /// Component at a dense index
    pub fn component_at(&self, index: usize) -> Option<&dyn Component> {
        self.components.get(index)?.as_deref()
    }

    /// Iterate attached components in attachment order
    pub fn components(&self) -> impl Iterator<Item = &dyn Component> + '_ {
        self.components[..self.component_count()]
            .iter()
            .filter_map(|slot| slot.as_deref())
    }

    /// Whether a component of this type is attached
    pub fn has_component(&self, type_id: ComponentTypeId) -> bool {
        self.component_position(type_id).is_some()
    }

    /// Typed component lookup
    pub fn get_component<T: ComponentType>(&self) -> Option<&T> {
        let position = self.component_position(T::TYPE_ID)?;
        self.components[position].as_deref()?.downcast_ref::<T>()
    }

    /// Typed mutable component lookup
    pub fn get_component_mut<T: ComponentType>(&mut self) -> Option<&mut T> {
        let position = self.component_position(T::TYPE_ID)?;
        self.components[position].as_deref_mut()?.downcast_mut::<T>()
    }

    fn component_position(&self, type_id: ComponentTypeId) -> Option<usize> {
        self.components[..self.component_count()]
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|c| c.component_type() == type_id))
    }

    // --- transform --------------------------------------------------------

    /// Current position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Current rotation
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Current scale
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Snapshot of the full transform
    pub fn transform(&self) -> Transform {
        Transform {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
    }

    /// Move the node
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.flags.insert(NodeFlags::POSITION_CHANGED);
    }

    /// Rotate the node
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.flags.insert(NodeFlags::ROTATION_CHANGED);
    }

    /// Rescale the node
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.flags.insert(NodeFlags::SCALE_CHANGED);
    }

    /// Overwrite the whole transform
    pub fn set_transform(&mut self, transform: &Transform) {
        self.set_position(transform.position);
        self.set_rotation(transform.rotation);
        self.set_scale(transform.scale);
    }

    /// Read and clear the transform changed-bits
    pub fn take_transform_changes(&mut self) -> NodeFlags {
        let changed = self.flags & NodeFlags::TRANSFORM_CHANGED;
        self.flags.remove(NodeFlags::TRANSFORM_CHANGED);
        changed
    }

    // --- state flags ------------------------------------------------------

    /// Not disabled
    pub fn is_enabled(&self) -> bool {
        !self.flags.contains(NodeFlags::DISABLED)
    }

    /// Enable or disable the node
    pub fn set_enabled(&mut self, enabled: bool) {
        self.flags.set(NodeFlags::DISABLED, !enabled);
    }

    /// Member of the stepped node list
    pub fn is_in_scene(&self) -> bool {
        self.flags.contains(NodeFlags::IN_SCENE)
    }

    /// Flagged as never moving
    pub fn is_static(&self) -> bool {
        self.flags.contains(NodeFlags::STATIC)
    }

    /// Mark the node static
    pub fn set_static(&mut self, is_static: bool) {
        self.flags.set(NodeFlags::STATIC, is_static);
    }

    /// Allow or suppress component updates while staying in the scene
    pub fn set_updating_enabled(&mut self, enabled: bool) {
        self.flags.set(NodeFlags::UPDATING_DISABLED, !enabled);
    }

    pub(super) fn set_in_scene(&mut self, in_scene: bool) {
        self.flags.set(NodeFlags::IN_SCENE, in_scene);
    }

    /// Whether a step should run this node's components
    pub(super) fn should_step(&self) -> bool {
        self.flags.contains(NodeFlags::IN_SCENE)
            && !self
                .flags
                .intersects(NodeFlags::DISABLED | NodeFlags::UPDATING_DISABLED)
    }

    /// Run every component's update hook
    pub(super) fn update_components(&mut self, index: NodeIndex, step: &StepContext<'_>) {
        let Self {
            position,
            rotation,
            scale,
            id,
            components,
            name,
            flags,
            component_count,
        } = self;

        let mut context = NodeContext {
            id: *id,
            index,
            name,
            position,
            rotation,
            scale,
            flags,
        };

        for component in components[..usize::from(*component_count)].iter_mut().flatten() {
            component.update(&mut context, step);
        }
    }
}

impl fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let types: Vec<ComponentTypeId> = self.components().map(|c| c.component_type()).collect();
        f.debug_struct("SceneNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("position", &self.position)
            .field("components", &types)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Default)]
    struct Health(u32);

    impl Component for Health {
        fn component_type(&self) -> ComponentTypeId {
            Self::TYPE_ID
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    impl ComponentType for Health {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(1);
        const NAME: &'static str = "Health";
    }

    struct Tagged(u32);

    impl Component for Tagged {
        fn component_type(&self) -> ComponentTypeId {
            ComponentTypeId(100 + self.0)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn tagged(n: u32) -> Box<dyn Component> {
        Box::new(Tagged(n))
    }

    #[test]
    fn test_node_alignment() {
        assert_eq!(std::mem::align_of::<SceneNode>() % 16, 0);
        assert_eq!(std::mem::size_of::<SceneNode>() % 16, 0);
    }

    #[test]
    fn test_name_truncation() {
        let long = "a".repeat(40);
        assert_eq!(NodeName::new(&long).as_str().len(), 31);

        // 'é' is two bytes; 30 ASCII + 'é' would straddle the limit
        let mixed = format!("{}é", "b".repeat(30));
        assert_eq!(NodeName::new(&mixed).as_str(), "b".repeat(30));
    }

    #[test]
    fn test_attach_rejects_duplicate_type() {
        let mut node = SceneNode::new(1, "hero");
        assert!(node.attach_component(Box::new(Health(10))).is_ok());

        let err = node.attach_component(Box::new(Health(20))).unwrap_err();
        assert!(matches!(err, AttachError::Duplicate(ComponentTypeId(1), _)));
        assert_eq!(node.component_count(), 1);
        assert_eq!(node.get_component::<Health>().unwrap().0, 10);

        // The rejected component is handed back intact
        let returned = err.into_component();
        assert_eq!(returned.downcast_ref::<Health>().unwrap().0, 20);
    }

    #[test]
    fn test_attach_rejects_ninth_component() {
        let mut node = SceneNode::new(1, "crowded");
        for n in 0..MAX_COMPONENTS as u32 {
            node.attach_component(tagged(n)).unwrap();
        }
        let err = node.attach_component(tagged(99)).unwrap_err();
        assert!(matches!(err, AttachError::SlotsFull(_)));
    }

    #[test]
    fn test_detach_keeps_prefix_dense() {
        let mut node = SceneNode::new(1, "dense");
        for n in 0..4 {
            node.attach_component(tagged(n)).unwrap();
        }

        let removed = node.detach_component(ComponentTypeId(101)).unwrap();
        assert_eq!(removed.component_type(), ComponentTypeId(101));
        assert_eq!(node.component_count(), 3);

        let order: Vec<u32> = (0..node.component_count())
            .map(|i| node.component_at(i).unwrap().component_type().0)
            .collect();
        assert_eq!(order, vec![100, 102, 103]);
        assert!(node.component_at(3).is_none());

        // Slot freed by the detach can be reused for the same type
        node.attach_component(tagged(1)).unwrap();
        assert_eq!(node.component_count(), 4);
    }

    #[test]
    fn test_attach_detach_sequence_never_duplicates() {
        let mut node = SceneNode::new(1, "churn");
        for round in 0..20u32 {
            let n = round % 3;
            if node.has_component(ComponentTypeId(100 + n)) {
                node.detach_component(ComponentTypeId(100 + n));
            } else {
                node.attach_component(tagged(n)).unwrap();
            }
            let types: Vec<u32> = node.components().map(|c| c.component_type().0).collect();
            let unique: std::collections::HashSet<u32> = types.iter().copied().collect();
            assert_eq!(unique.len(), types.len());
        }
    }

    #[test]
    fn test_transform_setters_mark_dirty() {
        let mut node = SceneNode::new(1, "mover");
        assert!(node.take_transform_changes().is_empty());

        node.set_position(Vec3::new(1.0, 0.0, 0.0));
        node.set_scale(Vec3::new(2.0, 2.0, 2.0));
        let changed = node.take_transform_changes();
        assert!(changed.contains(NodeFlags::POSITION_CHANGED | NodeFlags::SCALE_CHANGED));
        assert!(!changed.contains(NodeFlags::ROTATION_CHANGED));
        assert!(node.take_transform_changes().is_empty());
    }

    #[test]
    fn test_state_flags() {
        let mut node = SceneNode::new(1, "rock");
        assert!(node.is_enabled());
        assert!(!node.is_static());

        node.set_static(true);
        node.set_enabled(false);
        assert!(node.is_static());
        assert!(!node.is_enabled());
        assert!(!node.flags().contains(NodeFlags::TRANSFORM_CHANGED));

        node.set_enabled(true);
        assert!(node.is_enabled());
    }

    #[test]
    fn test_take_components_empties_node() {
        let mut node = SceneNode::new(1, "teardown");
        node.attach_component(tagged(0)).unwrap();
        node.attach_component(tagged(1)).unwrap();

        let taken = node.take_components();
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].component_type(), ComponentTypeId(101));
        assert_eq!(node.component_count(), 0);
    }
}
