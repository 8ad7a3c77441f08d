//! Chunk identity — SHA-384 content digests.
//!
//! A chunk's identity is the SHA-384 digest of its payload bytes. The
//! digest doubles as the chunk's file name in the pool, so it renders
//! as 96 lowercase hex characters everywhere it leaves memory.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha384};
use std::fmt;
use std::str::FromStr;

/// Raw digest width in bytes.
pub const CHUNK_ID_LEN: usize = 48;

/// Rendered digest width in hex characters.
pub const CHUNK_ID_HEX_LEN: usize = 2 * CHUNK_ID_LEN;

/// SHA-384 content identity of a chunk.
///
/// Two chunks with equal ids are interchangeable; the pool stores at
/// most one file per id and compression.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId([u8; CHUNK_ID_LEN]);

impl ChunkId {
    /// Hash a payload, producing its identity.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha384::digest(data);
        let mut raw = [0u8; CHUNK_ID_LEN];
        raw.copy_from_slice(&digest);
        Self(raw)
    }

    pub fn as_bytes(&self) -> &[u8; CHUNK_ID_LEN] {
        &self.0
    }

    /// Pool shard prefix — the first two hex characters.
    pub fn shard(&self) -> String {
        hex::encode(&self.0[..1])
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId({})", self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseChunkIdError {
    #[error("chunk id must be {CHUNK_ID_HEX_LEN} hex characters, got {0}")]
    BadLength(usize),
    #[error("chunk id contains non-hex characters")]
    BadHex,
}

impl FromStr for ChunkId {
    type Err = ParseChunkIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != CHUNK_ID_HEX_LEN {
            return Err(ParseChunkIdError::BadLength(s.len()));
        }
        let decoded = hex::decode(s).map_err(|_| ParseChunkIdError::BadHex)?;
        let mut raw = [0u8; CHUNK_ID_LEN];
        raw.copy_from_slice(&decoded);
        Ok(Self(raw))
    }
}

impl Serialize for ChunkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChunkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
