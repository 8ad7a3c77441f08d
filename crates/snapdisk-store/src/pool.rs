//! Chunk pool — the shared, content-addressed chunk directory.
//!
//! Layout under a snapshot target directory:
//!
//! ```text
//! <target>/chunks/<hh>/<hex>      uncompressed chunk
//! <target>/chunks/<hh>/<hex>.gz   gzip-compressed chunk
//! ```
//!
//! where `<hh>` is the first two hex characters of the chunk id. Pool
//! entries are write-once: a chunk is stored at most once per
//! compression, and existing entries are never rewritten or deleted.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use snapdisk_core::{ChunkData, ChunkId};

/// Chunk compression applied at store time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
}

impl Compression {
    /// The file-name extension for this compression, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Gzip => "gz",
        }
    }
}

/// Handle to the chunk pool below a snapshot target directory.
#[derive(Debug, Clone)]
pub struct ChunkPool {
    root: PathBuf,
}

impl ChunkPool {
    pub fn new(target: &Path) -> Self {
        Self {
            root: target.join("chunks"),
        }
    }

    fn shard_dir(&self, id: &ChunkId) -> PathBuf {
        self.root.join(id.shard())
    }

    /// On-disk path for a chunk at the given compression.
    pub fn chunk_path(&self, id: &ChunkId, compression: Option<Compression>) -> PathBuf {
        let mut name = id.to_hex();
        if let Some(compression) = compression {
            name.push('.');
            name.push_str(compression.extension());
        }
        self.shard_dir(id).join(name)
    }

    /// A chunk counts as stored if either the plain or the gzip file
    /// exists, regardless of the compression requested for new stores.
    pub fn contains(&self, id: &ChunkId) -> bool {
        self.chunk_path(id, None).is_file()
            || self.chunk_path(id, Some(Compression::Gzip)).is_file()
    }

    /// Store a chunk, creating its shard directory as needed. Returns
    /// the number of bytes the chunk occupies on disk.
    ///
    /// The write goes to a `.tmp` sibling first and is renamed into
    /// place, so a torn write can never satisfy a later `contains`
    /// probe.
    pub fn store(
        &self,
        chunk: &ChunkData,
        compression: Option<Compression>,
    ) -> io::Result<u64> {
        let dir = self.shard_dir(&chunk.id());
        fs::create_dir_all(&dir)?;

        let final_path = self.chunk_path(&chunk.id(), compression);
        let tmp_path = dir.join(format!("{}.tmp", chunk.id()));

        let stored_size = match compression {
            None => {
                fs::write(&tmp_path, chunk.bytes())?;
                chunk.len()
            }
            Some(Compression::Gzip) => {
                let file = fs::File::create(&tmp_path)?;
                let mut encoder =
                    flate2::write::GzEncoder::new(file, flate2::Compression::default());
                encoder.write_all(chunk.bytes())?;
                let file = encoder.finish()?;
                file.metadata()?.len()
            }
        };

        fs::rename(&tmp_path, &final_path)?;
        tracing::debug!(
            chunk = %chunk.id(),
            bytes = stored_size,
            compressed = compression.is_some(),
            "chunk stored"
        );
        Ok(stored_size)
    }
}
