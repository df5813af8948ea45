//! Model definition asset
//!
//! A model is stored as one `MODL` chunk holding the model name followed by
//! child chunks for each bone, mesh, animation and convex hull. Each child
//! payload is one bincode record. Child chunks with unknown ids or newer
//! versions are skipped.

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use super::chunk_stream::{chunk_id, ChunkError, ChunkRead, ChunkReader, ChunkWriter};
use crate::foundation::math::{Quat, Vec3};

const MODEL_CHUNK: u32 = chunk_id(b"MODL");
const BONE_CHUNK: u32 = chunk_id(b"BONE");
const MESH_CHUNK: u32 = chunk_id(b"MESH");
const ANIMATION_CHUNK: u32 = chunk_id(b"ANIM");
const HULL_CHUNK: u32 = chunk_id(b"HULL");

const MODEL_VERSION: u16 = 1;
const BONE_VERSION: u16 = 1;
const MESH_VERSION: u16 = 1;
const ANIMATION_VERSION: u16 = 1;
const HULL_VERSION: u16 = 1;

/// Skeleton joint in bind pose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    /// Bone name
    pub name: String,
    /// Index of the parent bone; parents precede children
    pub parent: Option<u16>,
    /// Bind position relative to the parent
    pub position: Vec3,
    /// Bind rotation relative to the parent
    pub rotation: Quat,
    /// Bind scale
    pub scale: Vec3,
}

/// Mesh vertex as uploaded to the host
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable, Serialize, Deserialize)]
pub struct ModelVertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

/// Up to four bone influences on one vertex
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoneWeights {
    /// Influencing bones
    pub bones: [u16; 4],
    /// Matching weights
    pub weights: [f32; 4],
}

/// One mesh of a model
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelMesh {
    /// Mesh name
    pub name: String,
    /// Name of the material it is drawn with
    pub material: String,
    /// Vertices
    pub vertices: Vec<ModelVertex>,
    /// Triangle list indices
    pub indices: Vec<u32>,
    /// Per-vertex skinning, parallel to `vertices`
    pub weights: Option<Vec<BoneWeights>>,
}

impl ModelMesh {
    /// Vertex data as raw bytes for upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

/// Bone pose at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Seconds from the start of the animation
    pub time: f32,
    /// Position
    pub position: Vec3,
    /// Rotation
    pub rotation: Quat,
    /// Scale
    pub scale: Vec3,
}

/// Keyframes of one bone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoneTrack {
    /// Animated bone
    pub bone: u16,
    /// Keyframes ordered by time
    pub keys: Vec<Keyframe>,
}

/// Named skeletal animation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    /// Animation name
    pub name: String,
    /// Length in seconds
    pub duration: f32,
    /// Per-bone tracks
    pub tracks: Vec<BoneTrack>,
}

/// Convex collision hull
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConvexHull {
    /// Hull vertices
    pub points: Vec<Vec3>,
    /// Faces as indices into `points`
    pub faces: Vec<Vec<u32>>,
}

/// Complete model asset
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelDefinition {
    /// Model name
    pub name: String,
    /// Skeleton, parents first
    pub bones: Vec<Bone>,
    /// Meshes
    pub meshes: Vec<ModelMesh>,
    /// Animations
    pub animations: Vec<Animation>,
    /// Collision hulls
    pub hulls: Vec<ConvexHull>,
}

impl ModelDefinition {
    /// Create an empty model
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Check cross references between the parts of the model
    pub fn validate(&self) -> Result<(), ChunkError> {
        for (index, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if usize::from(parent) >= index {
                    return Err(ChunkError::Invalid(format!(
                        "bone '{}' has parent {} which does not precede it",
                        bone.name, parent
                    )));
                }
            }
        }

        for mesh in &self.meshes {
            if let Some(index) = mesh.indices.iter().find(|&&i| i as usize >= mesh.vertices.len()) {
                return Err(ChunkError::Invalid(format!(
                    "mesh '{}' index {} is out of range",
                    mesh.name, index
                )));
            }
            if let Some(weights) = &mesh.weights {
                if weights.len() != mesh.vertices.len() {
                    return Err(ChunkError::Invalid(format!(
                        "mesh '{}' has {} weights for {} vertices",
                        mesh.name,
                        weights.len(),
                        mesh.vertices.len()
                    )));
                }
                let bone_count = self.bones.len();
                if weights.iter().flat_map(|w| w.bones).any(|b| usize::from(b) >= bone_count) {
                    return Err(ChunkError::Invalid(format!(
                        "mesh '{}' is weighted to a missing bone",
                        mesh.name
                    )));
                }
            }
        }

        for animation in &self.animations {
            if let Some(track) = animation
                .tracks
                .iter()
                .find(|track| usize::from(track.bone) >= self.bones.len())
            {
                return Err(ChunkError::Invalid(format!(
                    "animation '{}' animates missing bone {}",
                    animation.name, track.bone
                )));
            }
        }

        for hull in &self.hulls {
            if hull.faces.iter().flatten().any(|&i| i as usize >= hull.points.len()) {
                return Err(ChunkError::Invalid("hull face index out of range".into()));
            }
        }
        Ok(())
    }

    /// Encode as a chunk stream
    pub fn to_bytes(&self) -> Result<Vec<u8>, ChunkError> {
        let mut writer = ChunkWriter::new();
        writer.chunk(MODEL_CHUNK, MODEL_VERSION, |w| {
            w.write_str(&self.name)?;
            for bone in &self.bones {
                w.chunk(BONE_CHUNK, BONE_VERSION, |w| w.write_record(bone))?;
            }
            for mesh in &self.meshes {
                w.chunk(MESH_CHUNK, MESH_VERSION, |w| w.write_record(mesh))?;
            }
            for animation in &self.animations {
                w.chunk(ANIMATION_CHUNK, ANIMATION_VERSION, |w| w.write_record(animation))?;
            }
            for hull in &self.hulls {
                w.chunk(HULL_CHUNK, HULL_VERSION, |w| w.write_record(hull))?;
            }
            Ok(())
        })?;
        writer.finish()
    }

    /// Decode from a chunk stream and validate
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChunkError> {
        let mut reader = ChunkReader::new(bytes);
        let read = reader.read_chunk(MODEL_CHUNK, MODEL_VERSION, |_, payload| {
            let mut model = Self::new(payload.read_string()?);
            let mut skipped = 0usize;

            while let Some((header, mut chunk)) = payload.next_chunk()? {
                match (header.id, header.version) {
                    (BONE_CHUNK, v) if v <= BONE_VERSION => model.bones.push(chunk.read_record()?),
                    (MESH_CHUNK, v) if v <= MESH_VERSION => model.meshes.push(chunk.read_record()?),
                    (ANIMATION_CHUNK, v) if v <= ANIMATION_VERSION => {
                        model.animations.push(chunk.read_record()?);
                    }
                    (HULL_CHUNK, v) if v <= HULL_VERSION => model.hulls.push(chunk.read_record()?),
                    _ => skipped += 1,
                }
            }

            if skipped > 0 {
                log::debug!("Model '{}': skipped {} unknown chunk(s)", model.name, skipped);
            }
            Ok(model)
        })?;

        match read {
            ChunkRead::Read(model) => {
                model.validate()?;
                Ok(model)
            }
            ChunkRead::Skipped(header) => Err(ChunkError::Invalid(format!(
                "not a supported model (chunk {:#010x} v{})",
                header.id, header.version
            ))),
        }
    }

    /// Load a model file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ChunkError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let model = Self::from_bytes(&bytes)?;
        log::info!(
            "Loaded model '{}' from {}: {} bones, {} meshes, {} animations, {} hulls",
            model.name,
            path.display(),
            model.bones.len(),
            model.meshes.len(),
            model.animations.len(),
            model.hulls.len()
        );
        Ok(model)
    }

    /// Save a model file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ChunkError> {
        self.validate()?;
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }
}
