//! Viewport description and visibility bucketing
//!
//! A [`VisibilityProcessor`] culls the mesh store for one viewport and sorts
//! what survives into the lists the pipeline consumes: opaque meshes keyed
//! by material, transparent meshes, and a draw-last variant of each.

use std::collections::BTreeMap;

use super::material::MaterialKey;
use super::mesh::MeshKey;
use super::store::RenderResources;
use crate::foundation::math::{utils, Mat4, Vec3};

/// Camera and projection of one rendered view
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    /// Camera position in world space
    pub camera_position: Vec3,
    /// World to view transform
    pub view: Mat4,
    /// View to clip transform
    pub projection: Mat4,
    /// Objects entirely beyond this distance are culled
    pub far: f32,
}

impl Viewport {
    /// Right-handed perspective camera looking at `target`
    pub fn look_at(eye: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let view = Mat4::look_at_rh(&eye.into(), &target.into(), &Vec3::y());
        let projection = Mat4::new_perspective(aspect, fov_y, near, far);
        Self {
            camera_position: eye,
            view,
            projection,
            far,
        }
    }

    /// Distance from the camera to a point
    pub fn distance_to(&self, point: &Vec3) -> f32 {
        utils::distance_squared(&self.camera_position, point).sqrt()
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::look_at(
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::zeros(),
            utils::deg_to_rad(60.0),
            16.0 / 9.0,
            0.1,
            1000.0,
        )
    }
}

/// Culled draw lists for one viewport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleObjects {
    /// Opaque meshes grouped by material
    pub opaque: BTreeMap<MaterialKey, Vec<MeshKey>>,
    /// Transparent meshes, unsorted
    pub transparent: Vec<MeshKey>,
    /// Opaque meshes drawn after all other opaque meshes
    pub opaque_last: BTreeMap<MaterialKey, Vec<MeshKey>>,
    /// Transparent meshes drawn after all other transparent meshes
    pub transparent_last: Vec<MeshKey>,
}

impl VisibleObjects {
    /// Create empty lists
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty every list, keeping allocations where possible
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.transparent.clear();
        self.opaque_last.clear();
        self.transparent_last.clear();
    }

    /// Total mesh count across lists
    pub fn len(&self) -> usize {
        self.opaque.values().map(Vec::len).sum::<usize>()
            + self.opaque_last.values().map(Vec::len).sum::<usize>()
            + self.transparent.len()
            + self.transparent_last.len()
    }

    /// Nothing visible
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Builds the draw lists for a viewport
pub trait VisibilityProcessor {
    /// Replace the contents of `visible` with what `viewport` can see
    fn process(&mut self, viewport: &Viewport, resources: &RenderResources, visible: &mut VisibleObjects);
}

/// Distance-culling processor that buckets by material flags
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketingVisibility;

impl VisibilityProcessor for BucketingVisibility {
    fn process(&mut self, viewport: &Viewport, resources: &RenderResources, visible: &mut VisibleObjects) {
        visible.clear();
        let mut culled = 0usize;

        for (key, mesh) in resources.meshes() {
            if mesh.is_hidden() {
                continue;
            }
            let Some(material) = resources.material(mesh.material) else {
                log::debug!("Mesh '{}' has no material, not drawn", mesh.name);
                continue;
            };
            if viewport.distance_to(&mesh.position()) - mesh.bounding_radius > viewport.far {
                culled += 1;
                continue;
            }

            match (material.is_transparent(), material.draws_last()) {
                (false, false) => visible.opaque.entry(mesh.material).or_default().push(key),
                (false, true) => visible.opaque_last.entry(mesh.material).or_default().push(key),
                (true, false) => visible.transparent.push(key),
                (true, true) => visible.transparent_last.push(key),
            }
        }

        log::trace!("Visibility: {} visible, {} culled", visible.len(), culled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{BlendState, Material, MaterialFlags, Mesh, MeshFlags, ShaderId};

    #[test]
    fn test_buckets_by_material_flags() {
        let mut resources = RenderResources::new();
        let stone = resources.add_material(Material::opaque("stone", ShaderId(1), ShaderId(2), ShaderId(3)));
        let glass = resources.add_material(Material::transparent("glass", ShaderId(4), BlendState::ALPHA));
        let sky = resources.add_material(
            Material::opaque("sky", ShaderId(1), ShaderId(2), ShaderId(3)).with_flags(MaterialFlags::DRAW_LAST),
        );

        let wall = resources.add_mesh(Mesh::new("wall", None, stone));
        let floor = resources.add_mesh(Mesh::new("floor", None, stone));
        let window = resources.add_mesh(Mesh::new("window", None, glass));
        let dome = resources.add_mesh(Mesh::new("dome", None, sky));
        resources.add_mesh(Mesh::new("ghost", None, stone).with_flags(MeshFlags::HIDDEN));
        resources.add_mesh(Mesh::new("far", None, stone).at(Vec3::new(0.0, 0.0, -5000.0)));

        let mut visible = VisibleObjects::new();
        BucketingVisibility.process(&Viewport::default(), &resources, &mut visible);

        assert_eq!(visible.opaque.get(&stone).unwrap(), &vec![wall, floor]);
        assert_eq!(visible.transparent, vec![window]);
        assert_eq!(visible.opaque_last.get(&sky).unwrap(), &vec![dome]);
        assert!(visible.transparent_last.is_empty());
        assert_eq!(visible.len(), 4);
    }
}
