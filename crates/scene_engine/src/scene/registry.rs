//! Component type registry
//!
//! Maps a [`ComponentTypeId`] to the descriptor that knows how to build and
//! tear down components of that type. The scene never constructs
//! components itself.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use super::component::{Component, ComponentType, ComponentTypeId};

/// Factory and teardown for one component type
pub trait ComponentDescriptor: Send + Sync {
    /// Type produced by this descriptor
    fn component_type(&self) -> ComponentTypeId;

    /// Human readable type name
    fn name(&self) -> &str;

    /// Build a fresh component
    fn create(&self) -> Box<dyn Component>;

    /// Tear a component down
    fn destroy(&self, component: Box<dyn Component>) {
        drop(component);
    }
}

/// Descriptor for any defaultable [`ComponentType`]
pub struct TypedDescriptor<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> TypedDescriptor<T> {
    /// Create the descriptor
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for TypedDescriptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ComponentType + Default> ComponentDescriptor for TypedDescriptor<T> {
    fn component_type(&self) -> ComponentTypeId {
        T::TYPE_ID
    }

    fn name(&self) -> &str {
        T::NAME
    }

    fn create(&self) -> Box<dyn Component> {
        Box::new(T::default())
    }
}

/// Registered component descriptors, keyed by type id
#[derive(Default)]
pub struct ComponentRegistry {
    descriptors: HashMap<ComponentTypeId, Arc<dyn ComponentDescriptor>>,
}

impl ComponentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing any previous one for the same type
    pub fn register(&mut self, descriptor: Arc<dyn ComponentDescriptor>) {
        let type_id = descriptor.component_type();
        if let Some(previous) = self.descriptors.insert(type_id, descriptor) {
            log::warn!(
                "Component type {} ({}) re-registered; previous descriptor replaced",
                type_id,
                previous.name()
            );
        } else {
            log::debug!("Registered component type {}", type_id);
        }
    }

    /// Register the default descriptor for `T`
    pub fn register_type<T: ComponentType + Default>(&mut self) {
        self.register(Arc::new(TypedDescriptor::<T>::new()));
    }

    /// Build a component of the given type
    pub fn create(&self, type_id: ComponentTypeId) -> Option<Box<dyn Component>> {
        match self.descriptors.get(&type_id) {
            Some(descriptor) => Some(descriptor.create()),
            None => {
                log::warn!("Cannot create unregistered component type {}", type_id);
                None
            }
        }
    }

    /// Tear a component down through its descriptor
    ///
    /// `None` is ignored. Components whose type is no longer registered are
    /// dropped directly.
    pub fn destroy(&self, component: Option<Box<dyn Component>>) {
        let Some(component) = component else {
            return;
        };
        let type_id = component.component_type();
        match self.descriptors.get(&type_id) {
            Some(descriptor) => descriptor.destroy(component),
            None => {
                log::warn!("Dropping component of unregistered type {}", type_id);
                drop(component);
            }
        }
    }

    /// Descriptor for a type
    pub fn descriptor(&self, type_id: ComponentTypeId) -> Option<&Arc<dyn ComponentDescriptor>> {
        self.descriptors.get(&type_id)
    }

    /// Registered name of a type
    pub fn name_of(&self, type_id: ComponentTypeId) -> Option<&str> {
        self.descriptors.get(&type_id).map(|d| d.name())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// No types registered
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Registered type ids, sorted
    pub fn type_ids(&self) -> Vec<ComponentTypeId> {
        let mut ids: Vec<_> = self.descriptors.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Spin(f32);

    impl Component for Spin {
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

    impl ComponentType for Spin {
        const TYPE_ID: ComponentTypeId = ComponentTypeId(4);
        const NAME: &'static str = "Spin";
    }

    struct CountingDescriptor {
        destroyed: Arc<AtomicUsize>,
    }

    impl ComponentDescriptor for CountingDescriptor {
        fn component_type(&self) -> ComponentTypeId {
            Spin::TYPE_ID
        }
        fn name(&self) -> &str {
            "CountingSpin"
        }
        fn create(&self) -> Box<dyn Component> {
            Box::new(Spin(1.5))
        }
        fn destroy(&self, component: Box<dyn Component>) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            drop(component);
        }
    }

    #[test]
    fn test_create_registered_type() {
        let mut registry = ComponentRegistry::new();
        registry.register_type::<Spin>();

        let component = registry.create(Spin::TYPE_ID).unwrap();
        assert_eq!(component.component_type(), Spin::TYPE_ID);
        assert_eq!(registry.name_of(Spin::TYPE_ID), Some("Spin"));
    }

    #[test]
    fn test_create_unregistered_type() {
        let registry = ComponentRegistry::new();
        assert!(registry.create(ComponentTypeId(77)).is_none());
    }

    #[test]
    fn test_register_replaces_descriptor() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let mut registry = ComponentRegistry::new();
        registry.register_type::<Spin>();
        registry.register(Arc::new(CountingDescriptor {
            destroyed: Arc::clone(&destroyed),
        }));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.type_ids(), vec![Spin::TYPE_ID]);

        let component = registry.create(Spin::TYPE_ID).unwrap();
        assert_eq!(component.downcast_ref::<Spin>().unwrap().0, 1.5);

        registry.destroy(Some(component));
        registry.destroy(None);
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }
}
