//! snapdisk-store — the chunk pool, the disk-image contract, snapshot
//! manifests, and the snapshot writer.

pub mod image;
pub mod manifest;
pub mod pool;
pub mod writer;

pub use image::{DiskImage, ImageError, LocalImage};
pub use manifest::{Manifest, ManifestError, ManifestMeta};
pub use pool::{ChunkPool, Compression};
pub use writer::{Progress, SnapshotMode, SnapshotWriter, WriterError};
