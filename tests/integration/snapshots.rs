//! Local snapshot scenarios: dedup, resume, and mode handling.

use crate::*;

use std::fs;
use std::path::Path;

use bytes::Bytes;
use snapdisk_core::{ChunkData, ChunkId};
use snapdisk_store::{
    ChunkPool, Compression, LocalImage, Manifest, SnapshotMode, SnapshotWriter, WriterError,
};

async fn snapshot_local(
    image_path: &Path,
    target: &Path,
    name: &str,
    chunk_size: u64,
    compression: Option<Compression>,
    mode: SnapshotMode,
) -> snapdisk_store::Progress {
    let mut image = LocalImage::open(image_path, chunk_size).unwrap();
    let mut writer = SnapshotWriter::new(&mut image, target, name, compression, mode).unwrap();
    writer.run(u64::MAX, |_| {}).await.unwrap();
    writer.progress()
}

#[tokio::test]
async fn s1_three_distinct_chunks_fill_the_pool() {
    let dir = scratch_dir("s1");
    let image = write_image(&dir, b"ABC");
    let target = dir.join("target");

    snapshot_local(&image, &target, "snap", 1, None, SnapshotMode::Create).await;

    let mut expected: Vec<String> = [b"A", b"B", b"C"]
        .iter()
        .map(|b| ChunkId::of(*b).to_hex())
        .collect();
    expected.sort();
    assert_eq!(pool_files(&target), expected);

    let manifest = Manifest::load(&target.join("snap.json")).unwrap();
    assert_eq!(manifest.meta.disk_size, 3);
    assert_eq!(manifest.meta.chunk_size, 1);
    assert_eq!(manifest.meta.chunk_count, 3);
    assert_eq!(
        manifest.chunks,
        vec![ChunkId::of(b"A"), ChunkId::of(b"B"), ChunkId::of(b"C")]
    );
    assert_eq!(manifest.meta.version, 1);
    assert!(manifest.meta.start_ts <= manifest.meta.end_ts);

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn s2_identical_chunks_store_once() {
    let dir = scratch_dir("s2");
    let image = write_image(&dir, b"AAAA");
    let target = dir.join("target");

    let progress =
        snapshot_local(&image, &target, "snap", 1, None, SnapshotMode::Create).await;

    assert_eq!(pool_files(&target), vec![ChunkId::of(b"A").to_hex()]);

    let manifest = Manifest::load(&target.join("snap.json")).unwrap();
    assert_eq!(manifest.chunks.len(), 4);
    assert!(manifest.chunks.iter().all(|c| *c == ChunkId::of(b"A")));

    assert_eq!(progress.chunks_stored, 1);
    assert_eq!(progress.chunks_deduplicated, 3);
    assert_eq!(progress.chunks_deduplicated_size, 3);
    assert_eq!(progress.total_bytes_appended, 4);

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn s3_resume_picks_up_after_partial_commit() {
    let dir = scratch_dir("s3");
    let image = write_image(&dir, b"ABC");
    let target = dir.join("target");
    fs::create_dir_all(&target).unwrap();

    // State after a crash that committed only the first chunk
    ChunkPool::new(&target)
        .store(&ChunkData::new(Bytes::from_static(b"A")), None)
        .unwrap();
    let partial = serde_json::json!({
        "meta": {
            "target": target.to_string_lossy(),
            "name": "snap",
            "disk_size": 3,
            "chunk_count": 3,
            "chunk_size": 1,
            "device_name": image.to_string_lossy(),
            "start_ts": "2024-01-01T00:00:00Z",
            "end_ts": "2024-01-01T00:00:01Z",
            "version": 1,
        },
        "chunks": [ChunkId::of(b"A").to_hex()],
    });
    fs::write(target.join("snap.json"), partial.to_string()).unwrap();

    let progress =
        snapshot_local(&image, &target, "snap", 1, None, SnapshotMode::Resume).await;

    // Only offsets 1 and 2 were appended
    assert_eq!(progress.total_bytes_appended, 2);
    assert_eq!(progress.chunks_stored, 2);
    assert_eq!(progress.chunks_deduplicated, 0);

    let manifest = Manifest::load(&target.join("snap.json")).unwrap();
    assert_eq!(
        manifest.chunks,
        vec![ChunkId::of(b"A"), ChunkId::of(b"B"), ChunkId::of(b"C")]
    );
    // The original start timestamp survives the resume
    assert_eq!(
        serde_json::to_value(&manifest).unwrap()["meta"]["start_ts"],
        "2024-01-01T00:00:00Z"
    );

    // The pre-existing pool entry is untouched
    let a_path = ChunkPool::new(&target).chunk_path(&ChunkId::of(b"A"), None);
    assert_eq!(fs::read(a_path).unwrap(), b"A");
    assert_eq!(pool_files(&target).len(), 3);

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn s4_create_refuses_but_overwrite_resets() {
    let dir = scratch_dir("s4");
    let image = write_image(&dir, b"ABC");
    let target = dir.join("target");

    snapshot_local(&image, &target, "snap", 1, None, SnapshotMode::Create).await;

    // Create mode refuses the existing snapshot file
    let mut local = LocalImage::open(&image, 1).unwrap();
    let refused = SnapshotWriter::new(&mut local, &target, "snap", None, SnapshotMode::Create);
    assert!(matches!(refused, Err(WriterError::SnapshotExists(_))));

    // Overwrite starts fresh: counters reset, every chunk dedups
    let progress =
        snapshot_local(&image, &target, "snap", 1, None, SnapshotMode::Overwrite).await;
    assert_eq!(progress.chunks_stored, 0);
    assert_eq!(progress.chunks_deduplicated, 3);
    assert_eq!(progress.total_bytes_appended, 3);

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn resume_of_a_complete_snapshot_appends_nothing() {
    let dir = scratch_dir("resume-idempotent");
    let image = write_image(&dir, b"ABC");
    let target = dir.join("target");

    snapshot_local(&image, &target, "snap", 1, None, SnapshotMode::Create).await;
    let first = Manifest::load(&target.join("snap.json")).unwrap();

    let progress =
        snapshot_local(&image, &target, "snap", 1, None, SnapshotMode::Resume).await;
    assert_eq!(progress.total_bytes_appended, 0);
    assert_eq!(progress.chunks_stored, 0);
    assert_eq!(progress.chunks_deduplicated, 0);

    let second = Manifest::load(&target.join("snap.json")).unwrap();
    assert_eq!(second.chunks, first.chunks);
    assert!(second.meta.end_ts >= first.meta.end_ts);

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn resume_rejects_disk_size_change() {
    let dir = scratch_dir("resume-disk-size");
    let image = write_image(&dir, b"ABC");
    let target = dir.join("target");
    snapshot_local(&image, &target, "snap", 1, None, SnapshotMode::Create).await;

    let grown = dir.join("grown.bin");
    fs::write(&grown, b"ABCD").unwrap();
    let mut local = LocalImage::open(&grown, 1).unwrap();
    let result = SnapshotWriter::new(&mut local, &target, "snap", None, SnapshotMode::Resume);
    assert!(matches!(
        result,
        Err(WriterError::DiskSizeMismatch {
            manifest: 3,
            image: 4,
            ..
        })
    ));

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn gzip_snapshot_stores_compressed_chunks() {
    let dir = scratch_dir("gzip");
    let body: Vec<u8> = b"snapdisk!".repeat(2048);
    let image = write_image(&dir, &body);
    let target = dir.join("target");

    let progress = snapshot_local(
        &image,
        &target,
        "snap",
        4096,
        Some(Compression::Gzip),
        SnapshotMode::Create,
    )
    .await;

    let files = pool_files(&target);
    assert!(!files.is_empty());
    assert!(files.iter().all(|f| f.ends_with(".gz")));
    // Repetitive data compresses, so on-disk size is below appended size
    assert!(progress.chunks_stored_size < progress.total_bytes_appended);

    // The manifest still records the uncompressed identities
    let manifest = Manifest::load(&target.join("snap.json")).unwrap();
    assert_eq!(manifest.chunks[0], ChunkId::of(&body[..4096]));

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn committed_manifest_is_always_a_prefix() {
    let dir = scratch_dir("prefix");
    let image = write_image(&dir, b"ABCDEF");
    let target = dir.join("target");

    let expected = [
        ChunkId::of(b"AB"),
        ChunkId::of(b"CD"),
        ChunkId::of(b"EF"),
    ];

    let mut local = LocalImage::open(&image, 2).unwrap();
    let mut writer =
        SnapshotWriter::new(&mut local, &target, "snap", None, SnapshotMode::Create).unwrap();
    let manifest_path = target.join("snap.json");
    writer
        .run(2, |_| {
            // Commits happen after each callback, so whatever is on
            // disk right now is from an earlier commit point.
            if manifest_path.is_file() {
                let manifest = Manifest::load(&manifest_path).unwrap();
                assert!(manifest.chunks.len() <= expected.len());
                assert_eq!(
                    &manifest.chunks[..],
                    &expected[..manifest.chunks.len()]
                );
            }
        })
        .await
        .unwrap();

    let manifest = Manifest::load(&manifest_path).unwrap();
    assert_eq!(manifest.chunks, expected);

    let _ = fs::remove_dir_all(&dir);
}
