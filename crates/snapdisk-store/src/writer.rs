//! Snapshot writer — walks a disk image and appends its chunks to the
//! pool, committing the manifest as it goes.
//!
//! The writer is resumable: the manifest's chunk list is always a
//! valid prefix of the image's chunk sequence, so a crashed run can be
//! picked up at `len(chunks) * chunk_size` in `Resume` mode.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use snapdisk_core::{Chunk, ChunkId};

use crate::image::{DiskImage, ImageError};
use crate::manifest::{Manifest, ManifestError, ManifestMeta, MANIFEST_VERSION};
use crate::pool::{ChunkPool, Compression};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    /// Refuse to touch an existing snapshot file.
    Create,
    /// Continue a previous run; the snapshot file must exist and match
    /// the image's disk and chunk sizes exactly.
    Resume,
    /// Start fresh regardless of an existing snapshot file.
    Overwrite,
}

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("refusing to overwrite already existing snapshot file: {0}")]
    SnapshotExists(PathBuf),
    #[error("cannot resume non-existent snapshot file: {0}")]
    ResumeMissing(PathBuf),
    #[error("disk size in snapshot {path} is {manifest} bytes, but the image has {image} bytes")]
    DiskSizeMismatch {
        path: PathBuf,
        manifest: u64,
        image: u64,
    },
    #[error("chunk size in snapshot {path} is {manifest} bytes, but {image} bytes were requested")]
    ChunkSizeMismatch {
        path: PathBuf,
        manifest: u64,
        image: u64,
    },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("i/o error on snapshot target: {0}")]
    Io(#[from] std::io::Error),
}

/// Counter snapshot handed to the progress callback.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub position: u64,
    pub disk_size: u64,
    pub total_bytes_appended: u64,
    pub chunks_deduplicated: u64,
    pub chunks_deduplicated_size: u64,
    pub chunks_stored: u64,
    pub chunks_stored_size: u64,
}

pub struct SnapshotWriter<'i> {
    image: &'i mut (dyn DiskImage + Send),
    target: PathBuf,
    name: String,
    compression: Option<Compression>,
    pool: ChunkPool,
    chunks: Vec<ChunkId>,
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
    total_bytes_appended: u64,
    chunks_deduplicated: u64,
    chunks_deduplicated_size: u64,
    chunks_stored: u64,
    chunks_stored_size: u64,
}

impl<'i> SnapshotWriter<'i> {
    /// Prepare a writer, creating the target directory if missing and
    /// applying the mode's rules against any existing snapshot file.
    pub fn new(
        image: &'i mut (dyn DiskImage + Send),
        target: &Path,
        name: &str,
        compression: Option<Compression>,
        mode: SnapshotMode,
    ) -> Result<Self, WriterError> {
        fs::create_dir_all(target)?;
        let now = Utc::now();
        let mut writer = Self {
            image,
            target: target.to_path_buf(),
            name: name.to_string(),
            compression,
            pool: ChunkPool::new(target),
            chunks: Vec::new(),
            start_ts: now,
            end_ts: now,
            total_bytes_appended: 0,
            chunks_deduplicated: 0,
            chunks_deduplicated_size: 0,
            chunks_stored: 0,
            chunks_stored_size: 0,
        };
        match mode {
            SnapshotMode::Create => {
                if writer.snapshot_path().is_file() {
                    return Err(WriterError::SnapshotExists(writer.snapshot_path()));
                }
            }
            SnapshotMode::Resume => writer.load_existing()?,
            SnapshotMode::Overwrite => {}
        }
        Ok(writer)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.target.join(format!("{}.json", self.name))
    }

    fn load_existing(&mut self) -> Result<(), WriterError> {
        let path = self.snapshot_path();
        if !path.is_file() {
            return Err(WriterError::ResumeMissing(path));
        }
        let manifest = Manifest::load(&path)?;
        if manifest.meta.disk_size != self.image.disk_size() {
            return Err(WriterError::DiskSizeMismatch {
                path,
                manifest: manifest.meta.disk_size,
                image: self.image.disk_size(),
            });
        }
        if manifest.meta.chunk_size != self.image.chunk_size() {
            return Err(WriterError::ChunkSizeMismatch {
                path,
                manifest: manifest.meta.chunk_size,
                image: self.image.chunk_size(),
            });
        }
        self.start_ts = manifest.meta.start_ts;
        self.end_ts = Utc::now();
        self.chunks = manifest.chunks;
        tracing::info!(
            snapshot = %self.snapshot_path().display(),
            chunks_done = self.chunks.len(),
            "resuming snapshot"
        );
        Ok(())
    }

    /// Current byte position in the image, clamped to the disk size.
    pub fn position(&self) -> u64 {
        (self.chunks.len() as u64 * self.image.chunk_size()).min(self.image.disk_size())
    }

    pub fn progress(&self) -> Progress {
        Progress {
            position: self.position(),
            disk_size: self.image.disk_size(),
            total_bytes_appended: self.total_bytes_appended,
            chunks_deduplicated: self.chunks_deduplicated,
            chunks_deduplicated_size: self.chunks_deduplicated_size,
            chunks_stored: self.chunks_stored,
            chunks_stored_size: self.chunks_stored_size,
        }
    }

    /// Write the manifest. The chunk list is a valid prefix at every
    /// commit point, and every listed chunk already exists in the pool.
    pub fn commit(&self) -> Result<(), WriterError> {
        let manifest = Manifest {
            meta: ManifestMeta {
                target: self.target.to_string_lossy().into_owned(),
                name: self.name.clone(),
                disk_size: self.image.disk_size(),
                chunk_count: self.image.chunk_count(),
                chunk_size: self.image.chunk_size(),
                device_name: self.image.device_name().to_string(),
                start_ts: self.start_ts,
                end_ts: self.end_ts,
                version: MANIFEST_VERSION,
            },
            chunks: self.chunks.clone(),
        };
        manifest.store(&self.snapshot_path())?;
        Ok(())
    }

    async fn append(&mut self, chunk: Chunk) -> Result<(), WriterError> {
        let size = chunk.len();
        self.total_bytes_appended += size;
        self.end_ts = Utc::now();
        let id = chunk.id();
        if self.pool.contains(&id) {
            self.chunks_deduplicated += 1;
            self.chunks_deduplicated_size += size;
        } else {
            let data = match chunk {
                Chunk::Local(data) => data,
                remote => self.image.fetch(&remote).await?,
            };
            self.chunks_stored += 1;
            self.chunks_stored_size += self.pool.store(&data, self.compression)?;
        }
        self.chunks.push(id);
        Ok(())
    }

    /// Append every remaining chunk, invoking the progress callback and
    /// committing the manifest every `commit_period` appended bytes and
    /// once more on completion.
    pub async fn run<F: FnMut(&Progress)>(
        &mut self,
        commit_period: u64,
        mut on_progress: F,
    ) -> Result<(), WriterError> {
        let mut last_commit = self.total_bytes_appended;
        loop {
            let offset = self.position();
            if offset >= self.image.disk_size() {
                break;
            }
            let chunk = self.image.chunk_at(offset).await?;
            self.append(chunk).await?;
            if self.total_bytes_appended - last_commit >= commit_period {
                last_commit = self.total_bytes_appended;
                on_progress(&self.progress());
                self.commit()?;
            }
        }
        on_progress(&self.progress());
        self.commit()?;
        tracing::info!(
            snapshot = %self.snapshot_path().display(),
            chunks = self.chunks.len(),
            stored = self.chunks_stored,
            deduplicated = self.chunks_deduplicated,
            "snapshot complete"
        );
        Ok(())
    }
}
