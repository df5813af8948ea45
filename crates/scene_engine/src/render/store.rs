//! Mesh and material storage

use slotmap::SlotMap;

use super::material::{Material, MaterialKey};
use super::mesh::{Mesh, MeshKey};

/// Owns every mesh and material the pipeline can draw
#[derive(Debug, Default)]
pub struct RenderResources {
    meshes: SlotMap<MeshKey, Mesh>,
    materials: SlotMap<MaterialKey, Material>,
}

impl RenderResources {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a material
    pub fn add_material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(material)
    }

    /// Add a mesh
    pub fn add_mesh(&mut self, mesh: Mesh) -> MeshKey {
        if !self.materials.contains_key(mesh.material) {
            log::warn!("Mesh '{}' references a missing material", mesh.name);
        }
        self.meshes.insert(mesh)
    }

    /// Remove a mesh
    pub fn remove_mesh(&mut self, key: MeshKey) -> Option<Mesh> {
        self.meshes.remove(key)
    }

    /// Remove a material; meshes still using it are no longer drawn
    pub fn remove_material(&mut self, key: MaterialKey) -> Option<Material> {
        self.materials.remove(key)
    }

    /// Mesh by key
    pub fn mesh(&self, key: MeshKey) -> Option<&Mesh> {
        self.meshes.get(key)
    }

    /// Mutable mesh by key
    pub fn mesh_mut(&mut self, key: MeshKey) -> Option<&mut Mesh> {
        self.meshes.get_mut(key)
    }

    /// Material by key
    pub fn material(&self, key: MaterialKey) -> Option<&Material> {
        self.materials.get(key)
    }

    /// Mutable material by key
    pub fn material_mut(&mut self, key: MaterialKey) -> Option<&mut Material> {
        self.materials.get_mut(key)
    }

    /// Iterate meshes
    pub fn meshes(&self) -> impl Iterator<Item = (MeshKey, &Mesh)> + '_ {
        self.meshes.iter()
    }

    /// Mesh count
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Material count
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ShaderId, VertexArrayId};

    #[test]
    fn test_add_edit_and_remove() {
        let mut resources = RenderResources::new();
        let stone = resources.add_material(Material::new("stone"));
        let rock = resources.add_mesh(Mesh::new("rock", Some(VertexArrayId(1)), stone));
        assert_eq!(resources.mesh_count(), 1);
        assert_eq!(resources.material_count(), 1);

        resources
            .material_mut(stone)
            .unwrap()
            .material_shader = Some(ShaderId(9));
        assert_eq!(resources.material(stone).unwrap().material_shader, Some(ShaderId(9)));

        let removed = resources.remove_material(stone).unwrap();
        assert_eq!(removed.name, "stone");
        assert!(resources.material(stone).is_none());
        assert_eq!(resources.material_count(), 0);
        // The mesh outlives its material
        assert_eq!(resources.mesh(rock).unwrap().material, stone);

        assert!(resources.remove_mesh(rock).is_some());
        assert_eq!(resources.mesh_count(), 0);
        assert!(resources.remove_material(stone).is_none());
    }
}
