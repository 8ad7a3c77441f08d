//! The disk-image contract and its local-file implementation.
//!
//! A disk image is addressable by chunk offset and yields chunks in
//! ascending order. The local variant reads a seekable file; the
//! remote variant (snapdisk-net) drives the image protocol and yields
//! lazy chunk handles.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use snapdisk_core::{Chunk, ChunkData, ChunkId};

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("i/o error on image: {0}")]
    Io(#[from] std::io::Error),
    #[error("chunk size must be non-zero")]
    ZeroChunkSize,
    #[error("offset {offset} is not a multiple of chunk size {chunk_size}")]
    UnalignedOffset { offset: u64, chunk_size: u64 },
    #[error("offset {offset} is beyond the image end ({disk_size} bytes)")]
    OffsetOutOfRange { offset: u64, disk_size: u64 },
    #[error("server reports chunk size {server}, but {requested} was requested")]
    ChunkSizeMismatch { server: u64, requested: u64 },
    #[error("chunk at offset {offset} hashed to {actual}, expected {expected}")]
    HashMismatch {
        offset: u64,
        expected: ChunkId,
        actual: ChunkId,
    },
    #[error("chunk at offset {offset} is {actual} bytes, expected {expected}")]
    SizeMismatch {
        offset: u64,
        expected: u64,
        actual: u64,
    },
    #[error("transport failure: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Uniform contract over local and remote images.
///
/// `chunk_at` yields the chunk starting at a chunk-aligned offset; the
/// final chunk may be short. `fetch` materializes a chunk's payload —
/// for remote handles this is the moment bytes cross the wire, and the
/// payload must hash to the declared id.
#[async_trait]
pub trait DiskImage: Send {
    fn device_name(&self) -> &str;
    fn disk_size(&self) -> u64;
    fn chunk_size(&self) -> u64;

    fn chunk_count(&self) -> u64 {
        let chunk_size = self.chunk_size();
        (self.disk_size() + chunk_size - 1) / chunk_size
    }

    async fn chunk_at(&mut self, offset: u64) -> Result<Chunk, ImageError>;
    async fn fetch(&mut self, chunk: &Chunk) -> Result<ChunkData, ImageError>;
    async fn close(&mut self) -> Result<(), ImageError>;
}

/// A local seekable image file or block device.
pub struct LocalImage {
    device_name: String,
    file: fs::File,
    disk_size: u64,
    chunk_size: u64,
}

impl LocalImage {
    /// Open the backing file and size it by seeking to the end.
    pub fn open(path: &Path, chunk_size: u64) -> Result<Self, ImageError> {
        if chunk_size == 0 {
            return Err(ImageError::ZeroChunkSize);
        }
        let mut file = fs::File::open(path)?;
        let disk_size = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            device_name: path.to_string_lossy().into_owned(),
            file,
            disk_size,
            chunk_size,
        })
    }

    /// Read an arbitrary range, clamped at the image end. Used by the
    /// image server, whose clients choose the read length.
    pub fn read_range(&mut self, offset: u64, length: u64) -> Result<ChunkData, ImageError> {
        if offset > self.disk_size {
            return Err(ImageError::OffsetOutOfRange {
                offset,
                disk_size: self.disk_size,
            });
        }
        let length = length.min(self.disk_size - offset);
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; length as usize];
        self.file.read_exact(&mut buf)?;
        Ok(ChunkData::new(Bytes::from(buf)))
    }
}

#[async_trait]
impl DiskImage for LocalImage {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn disk_size(&self) -> u64 {
        self.disk_size
    }

    fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    async fn chunk_at(&mut self, offset: u64) -> Result<Chunk, ImageError> {
        if offset % self.chunk_size != 0 {
            return Err(ImageError::UnalignedOffset {
                offset,
                chunk_size: self.chunk_size,
            });
        }
        if offset >= self.disk_size {
            return Err(ImageError::OffsetOutOfRange {
                offset,
                disk_size: self.disk_size,
            });
        }
        let data = self.read_range(offset, self.chunk_size)?;
        Ok(Chunk::Local(data))
    }

    async fn fetch(&mut self, chunk: &Chunk) -> Result<ChunkData, ImageError> {
        match chunk {
            Chunk::Local(data) => Ok(data.clone()),
            // Local images only ever yield Local chunks.
            Chunk::Remote { .. } => Err(ImageError::Transport(
                "local image cannot materialize a remote chunk".into(),
            )),
        }
    }

    async fn close(&mut self) -> Result<(), ImageError> {
        Ok(())
    }
}
