//! Remote image protocol scenarios: the command round-trip, error
//! recovery, and snapshots pulled over a live server.

use crate::*;

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use snapdisk_core::ChunkId;
use snapdisk_net::{marshal, Endpoint, EndpointAddr, ImageServer, RemoteImage};
use snapdisk_store::{DiskImage, LocalImage, Manifest, SnapshotMode, SnapshotWriter};
use tokio::net::UnixStream;

fn spawn_server_on_socketpair(
    dir: &Path,
    contents: &[u8],
    chunk_size: u64,
    max_chunk_size: u64,
) -> Endpoint {
    let image_path = write_image(dir, contents);
    let image = LocalImage::open(&image_path, chunk_size).unwrap();
    let (server_side, client_side) = UnixStream::pair().unwrap();
    let mut server = ImageServer::new(image, Endpoint::Unix(server_side), max_chunk_size);
    tokio::spawn(async move {
        let _ = server.run().await;
    });
    Endpoint::Unix(client_side)
}

#[tokio::test]
async fn s5_remote_round_trip_command_sequence() {
    let dir = scratch_dir("s5");
    let mut client = spawn_server_on_socketpair(&dir, b"HELLO", 2, 1 << 20);

    let meta = marshal::send_recv(&mut client, &json!({ "cmd": "get_image_metadata" }), &[])
        .await
        .unwrap();
    assert_eq!(meta.msg["disk_size"], 5);

    let hash0 = marshal::send_recv(&mut client, &json!({ "cmd": "get_chunk_hash", "offset": 0 }), &[])
        .await
        .unwrap();
    assert_eq!(hash0.msg["hash"], ChunkId::of(b"HE").to_hex());
    assert_eq!(hash0.msg["size"], 2);

    let data0 = marshal::send_recv(&mut client, &json!({ "cmd": "get_chunk_data", "offset": 0 }), &[])
        .await
        .unwrap();
    assert_eq!(&data0.payload[..], b"HE");

    let hash2 = marshal::send_recv(&mut client, &json!({ "cmd": "get_chunk_hash", "offset": 2 }), &[])
        .await
        .unwrap();
    assert_eq!(hash2.msg["hash"], ChunkId::of(b"LL").to_hex());

    let data4 = marshal::send_recv(&mut client, &json!({ "cmd": "get_chunk_data", "offset": 4 }), &[])
        .await
        .unwrap();
    assert_eq!(&data4.payload[..], b"O");
    assert_eq!(data4.payload.len(), 1);

    let quit = marshal::send_recv(&mut client, &json!({ "cmd": "quit" }), &[])
        .await
        .unwrap();
    assert_eq!(quit.msg["status"], "ok");

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn s6_server_recovers_from_oversized_request() {
    let dir = scratch_dir("s6");
    // max_chunk_size below the image chunk size
    let mut client = spawn_server_on_socketpair(&dir, b"HELLO", 2, 1);

    let err = marshal::send_recv(&mut client, &json!({ "cmd": "get_chunk_data", "offset": 0 }), &[])
        .await
        .unwrap_err();
    assert!(err.to_string().contains("limited at 1 bytes"));

    // The loop survives: quit still answers ok
    let quit = marshal::send_recv(&mut client, &json!({ "cmd": "quit" }), &[])
        .await
        .unwrap();
    assert_eq!(quit.msg["status"], "ok");

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn remote_snapshot_end_to_end_over_unix_socket() {
    let dir = scratch_dir("remote-e2e");
    let image_path = write_image(&dir, b"HELLO");
    let sock = dir.join("serve.sock");
    let target = dir.join("target");

    let addr = EndpointAddr::Unix { path: sock.clone() };
    let server = {
        let addr = addr.clone();
        let image_path = image_path.clone();
        tokio::spawn(async move {
            let image = LocalImage::open(&image_path, 2).unwrap();
            let endpoint = addr.listen().await.unwrap();
            ImageServer::new(image, endpoint, 1 << 20).run().await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut remote = RemoteImage::connect(&addr, 2, "snapdisk").await.unwrap();
    assert_eq!(remote.disk_size(), 5);
    assert_eq!(remote.device_name(), image_path.to_string_lossy());

    let mut writer =
        SnapshotWriter::new(&mut remote, &target, "snap", None, SnapshotMode::Create).unwrap();
    writer.run(u64::MAX, |_| {}).await.unwrap();
    let progress = writer.progress();
    drop(writer);
    remote.close().await.unwrap();
    server.await.unwrap().unwrap();

    assert_eq!(progress.chunks_stored, 3);
    assert_eq!(progress.total_bytes_appended, 5);

    let manifest = Manifest::load(&target.join("snap.json")).unwrap();
    assert_eq!(
        manifest.chunks,
        vec![ChunkId::of(b"HE"), ChunkId::of(b"LL"), ChunkId::of(b"O")]
    );
    assert_eq!(manifest.meta.disk_size, 5);

    let mut expected: Vec<String> = [&b"HE"[..], b"LL", b"O"]
        .iter()
        .map(|b| ChunkId::of(b).to_hex())
        .collect();
    expected.sort();
    assert_eq!(pool_files(&target), expected);

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn remote_snapshot_dedups_without_fetching_stored_chunks() {
    let dir = scratch_dir("remote-dedup");
    let image_path = write_image(&dir, b"AAAA");
    let sock = dir.join("serve.sock");
    let target = dir.join("target");

    let addr = EndpointAddr::Unix { path: sock.clone() };
    let server = {
        let addr = addr.clone();
        let image_path = image_path.clone();
        tokio::spawn(async move {
            let image = LocalImage::open(&image_path, 1).unwrap();
            let endpoint = addr.listen().await.unwrap();
            ImageServer::new(image, endpoint, 1 << 20).run().await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut remote = RemoteImage::connect(&addr, 1, "snapdisk").await.unwrap();
    let mut writer =
        SnapshotWriter::new(&mut remote, &target, "snap", None, SnapshotMode::Create).unwrap();
    writer.run(u64::MAX, |_| {}).await.unwrap();
    let progress = writer.progress();
    drop(writer);
    remote.close().await.unwrap();
    server.await.unwrap().unwrap();

    assert_eq!(progress.chunks_stored, 1);
    assert_eq!(progress.chunks_deduplicated, 3);
    assert_eq!(pool_files(&target), vec![ChunkId::of(b"A").to_hex()]);

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn serve_binary_speaks_the_protocol_over_stdio() {
    if !snapdisk_binary().exists() {
        eprintln!("SKIP: snapdisk binary not built — run cargo build first");
        return;
    }
    let dir = scratch_dir("serve-binary");
    let image_path = write_image(&dir, b"HELLO");

    let argv = vec![
        snapdisk_binary().to_string_lossy().into_owned(),
        "serve".to_string(),
        "--chunk-size".to_string(),
        "2".to_string(),
        image_path.to_string_lossy().into_owned(),
    ];
    let mut client = Endpoint::subprocess(&argv).unwrap();

    let meta = marshal::send_recv(&mut client, &json!({ "cmd": "get_image_metadata" }), &[])
        .await
        .unwrap();
    assert_eq!(meta.msg["disk_size"], 5);
    assert_eq!(meta.msg["chunk_size"], 2);

    let data = marshal::send_recv(&mut client, &json!({ "cmd": "get_chunk_data", "offset": 2 }), &[])
        .await
        .unwrap();
    assert_eq!(&data.payload[..], b"LL");

    let quit = marshal::send_recv(&mut client, &json!({ "cmd": "quit" }), &[])
        .await
        .unwrap();
    assert_eq!(quit.msg["status"], "ok");

    let _ = fs::remove_dir_all(&dir);
}
