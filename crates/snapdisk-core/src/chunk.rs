//! Chunk data model — eager local payloads and lazy remote handles.

use bytes::Bytes;

use crate::digest::ChunkId;

/// A fully materialized chunk: payload bytes plus their identity.
///
/// The identity is computed at construction, so a `ChunkData` can never
/// disagree with its own bytes.
#[derive(Debug, Clone)]
pub struct ChunkData {
    id: ChunkId,
    bytes: Bytes,
}

impl ChunkData {
    pub fn new(bytes: Bytes) -> Self {
        let id = ChunkId::of(&bytes);
        Self { id, bytes }
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A chunk as yielded by a disk image.
///
/// Local images yield `Local` chunks with the payload already in
/// memory. Remote images yield `Remote` handles carrying only the
/// declared identity and size; the payload is fetched from the peer
/// only when the pool probe misses.
#[derive(Debug, Clone)]
pub enum Chunk {
    Local(ChunkData),
    Remote { id: ChunkId, size: u64, offset: u64 },
}

impl Chunk {
    pub fn id(&self) -> ChunkId {
        match self {
            Chunk::Local(data) => data.id(),
            Chunk::Remote { id, .. } => *id,
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Chunk::Local(data) => data.len(),
            Chunk::Remote { size, .. } => *size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
