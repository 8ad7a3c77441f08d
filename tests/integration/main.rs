//! snapdisk integration test harness.
//!
//! Every test builds a scratch directory under the system temp dir and
//! exercises the real writer/server/client stacks in-process; nothing
//! here talks to real block devices or real networks beyond loopback.

mod remote;
mod snapshots;
mod tls;

use std::fs;
use std::path::{Path, PathBuf};

/// Fresh per-test scratch directory.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("snapdisk-it-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Write an image file into the scratch dir and return its path.
pub fn write_image(dir: &Path, contents: &[u8]) -> PathBuf {
    let path = dir.join("image.bin");
    fs::write(&path, contents).unwrap();
    path
}

/// All chunk file names below `<target>/chunks`, sorted.
pub fn pool_files(target: &Path) -> Vec<String> {
    let mut names = Vec::new();
    let chunks = target.join("chunks");
    if !chunks.is_dir() {
        return names;
    }
    for shard in fs::read_dir(&chunks).unwrap() {
        let shard = shard.unwrap();
        for entry in fs::read_dir(shard.path()).unwrap() {
            names.push(entry.unwrap().file_name().into_string().unwrap());
        }
    }
    names.sort();
    names
}

/// Path of the workspace-built snapdisk binary, if present.
pub fn snapdisk_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("target/debug/snapdisk")
}
