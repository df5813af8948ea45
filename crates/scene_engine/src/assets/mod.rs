//! Asset formats
//!
//! Binary assets are tagged chunk streams (see [`chunk_stream`]); the model
//! format in [`model`] is built on them.

pub mod chunk_stream;
pub mod model;

pub use chunk_stream::{
    chunk_id, ChunkError, ChunkHeader, ChunkRead, ChunkReader, ChunkWriter, CHUNK_HEADER_SIZE,
};
pub use model::{
    Animation, Bone, BoneTrack, BoneWeights, ConvexHull, Keyframe, ModelDefinition, ModelMesh,
    ModelVertex,
};
