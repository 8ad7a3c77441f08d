//! snapdisk-core — content digests, the chunk data model, and the wire
//! protocol types. All other snapdisk crates depend on this one.

pub mod chunk;
pub mod digest;
pub mod proto;
pub mod wire;

pub use chunk::{Chunk, ChunkData};
pub use digest::ChunkId;
