//! Protocol commands and replies for the remote image protocol.
//!
//! Commands are a sealed enum tagged by the `"cmd"` key; the wire stays
//! string-keyed JSON. Reply payload structs deserialize from the
//! server's response messages (unknown keys such as `"status"` are
//! ignored by serde).

use serde::{Deserialize, Serialize};

use crate::digest::ChunkId;

/// A client request. `length` defaults to the server image's chunk size
/// when omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    GetImageMetadata,
    GetChunkHash {
        offset: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        length: Option<u64>,
    },
    GetChunkData {
        offset: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        length: Option<u64>,
    },
    Quit,
}

/// Reply to `get_image_metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub device_name: String,
    pub disk_size: u64,
    pub chunk_size: u64,
}

/// Reply to `get_chunk_hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHashReply {
    pub offset: u64,
    pub hash: ChunkId,
    pub size: u64,
}

/// Reply to `get_chunk_data`; the chunk bytes travel as the frame
/// payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDataReply {
    pub offset: u64,
    pub hash: ChunkId,
}
