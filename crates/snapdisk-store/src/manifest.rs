//! Snapshot manifest — the JSON record tying a snapshot name to its
//! ordered chunk identities.
//!
//! `chunks[i]` identifies the chunk at image offset `i * chunk_size`.
//! While a snapshot is in progress the list is a prefix of the full
//! chunk count; on completion it has exactly `chunk_count` entries.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use snapdisk_core::ChunkId;

pub const MANIFEST_VERSION: u32 = 1;

/// Timestamp format used in manifests: strict `YYYY-MM-DDTHH:MM:SSZ`,
/// UTC, seconds precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

mod ts {
    use super::TIMESTAMP_FORMAT;
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let naive = NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
            .map_err(serde::de::Error::custom)?;
        Ok(naive.and_utc())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("failed to parse manifest {0}: {1}")]
    Parse(PathBuf, #[source] serde_json::Error),
    #[error("failed to write manifest {0}: {1}")]
    Write(PathBuf, #[source] std::io::Error),
    #[error("failed to serialize manifest: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMeta {
    pub target: String,
    pub name: String,
    pub disk_size: u64,
    pub chunk_count: u64,
    pub chunk_size: u64,
    pub device_name: String,
    #[serde(with = "ts")]
    pub start_ts: DateTime<Utc>,
    #[serde(with = "ts")]
    pub end_ts: DateTime<Utc>,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub meta: ManifestMeta,
    pub chunks: Vec<ChunkId>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text =
            fs::read_to_string(path).map_err(|e| ManifestError::Read(path.to_path_buf(), e))?;
        serde_json::from_str(&text).map_err(|e| ManifestError::Parse(path.to_path_buf(), e))
    }

    /// Write the manifest via a `.tmp` sibling and rename, so a crash
    /// mid-commit leaves the previous manifest intact.
    pub fn store(&self, path: &Path) -> Result<(), ManifestError> {
        let bytes = serde_json::to_vec(self).map_err(ManifestError::Serialize)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| ManifestError::Write(tmp.clone(), e))?;
        fs::rename(&tmp, path).map_err(|e| ManifestError::Write(path.to_path_buf(), e))?;
        Ok(())
    }
}
