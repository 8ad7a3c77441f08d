//! TLS pinning scenarios: cross-pinned pairs handshake, unpinned peers
//! are rejected without killing the listener, and the image protocol
//! runs over TLS endpoints.

use crate::*;

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use snapdisk_net::{marshal, EndpointAddr, ImageServer, KeyStore, RemoteImage};
use snapdisk_store::{DiskImage, LocalImage};

fn keypair_dir(name: &str) -> (PathBuf, PathBuf, PathBuf) {
    let dir = scratch_dir(name);
    let server = dir.join("server.json");
    let client = dir.join("client.json");
    KeyStore::create_server_client_pair(&server, &client).unwrap();
    (dir, server, client)
}

#[tokio::test]
async fn pinned_pair_completes_handshake_and_moves_bytes() {
    let (dir, server_key, client_key) = keypair_dir("tls-ok");
    let port = 48911;

    let listen_addr = EndpointAddr::Tls {
        address: "127.0.0.1".into(),
        port,
        keyfile: server_key,
    };
    let listener = tokio::spawn(async move { listen_addr.listen().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let connect_addr = EndpointAddr::Tls {
        address: "127.0.0.1".into(),
        port,
        keyfile: client_key,
    };
    let mut client = connect_addr.connect().await.unwrap();
    let mut server = listener.await.unwrap().unwrap();

    client.send(b"over tls").await.unwrap();
    assert_eq!(&server.recv(8).await.unwrap()[..], b"over tls");
    server.send(b"ack").await.unwrap();
    assert_eq!(&client.recv(3).await.unwrap()[..], b"ack");

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn unpinned_client_is_rejected_and_listener_survives() {
    let (dir, server_key, client_key) = keypair_dir("tls-reject");
    let port = 48912;

    // The intruder trusts the server but is not pinned by it
    let intruder_key = dir.join("intruder.json");
    KeyStore::create(&intruder_key).unwrap();
    let server_cert = KeyStore::load(&server_key).unwrap().cert;
    KeyStore::add_trusted_peers(&intruder_key, &[server_cert]).unwrap();

    let listen_addr = EndpointAddr::Tls {
        address: "127.0.0.1".into(),
        port,
        keyfile: server_key,
    };
    let listener = tokio::spawn(async move { listen_addr.listen().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Unpinned certificate: the handshake must fail
    let intruder_addr = EndpointAddr::Tls {
        address: "127.0.0.1".into(),
        port,
        keyfile: intruder_key,
    };
    assert!(intruder_addr.connect().await.is_err());

    // The listener keeps accepting; the pinned client still gets in
    let connect_addr = EndpointAddr::Tls {
        address: "127.0.0.1".into(),
        port,
        keyfile: client_key,
    };
    let mut client = connect_addr.connect().await.unwrap();
    let mut server = listener.await.unwrap().unwrap();

    client.send(b"still here").await.unwrap();
    assert_eq!(&server.recv(10).await.unwrap()[..], b"still here");

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn image_protocol_runs_over_tls() {
    let (dir, server_key, client_key) = keypair_dir("tls-serve");
    let port = 48913;
    let image_path = write_image(&dir, b"HELLO");

    let listen_addr = EndpointAddr::Tls {
        address: "127.0.0.1".into(),
        port,
        keyfile: server_key,
    };
    let server = {
        let image_path = image_path.clone();
        tokio::spawn(async move {
            let image = LocalImage::open(&image_path, 2).unwrap();
            let endpoint = listen_addr.listen().await.unwrap();
            ImageServer::new(image, endpoint, 1 << 20).run().await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let connect_addr = EndpointAddr::Tls {
        address: "127.0.0.1".into(),
        port,
        keyfile: client_key,
    };
    let mut remote = RemoteImage::connect(&connect_addr, 2, "snapdisk").await.unwrap();
    assert_eq!(remote.disk_size(), 5);

    let chunk = remote.chunk_at(0).await.unwrap();
    let data = remote.fetch(&chunk).await.unwrap();
    assert_eq!(&data.bytes()[..], b"HE");

    remote.close().await.unwrap();
    server.await.unwrap().unwrap();

    let _ = fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn send_recv_raw_frames_over_tls() {
    let (dir, server_key, client_key) = keypair_dir("tls-frames");
    let port = 48914;
    let image_path = write_image(&dir, b"HELLO");

    let listen_addr = EndpointAddr::Tls {
        address: "127.0.0.1".into(),
        port,
        keyfile: server_key,
    };
    let server = tokio::spawn(async move {
        let image = LocalImage::open(&image_path, 2).unwrap();
        let endpoint = listen_addr.listen().await.unwrap();
        ImageServer::new(image, endpoint, 1 << 20).run().await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let connect_addr = EndpointAddr::Tls {
        address: "127.0.0.1".into(),
        port,
        keyfile: client_key,
    };
    let mut client = connect_addr.connect().await.unwrap();

    let frame = marshal::send_recv(&mut client, &json!({ "cmd": "get_chunk_data", "offset": 4 }), &[])
        .await
        .unwrap();
    assert_eq!(&frame.payload[..], b"O");

    marshal::send_recv(&mut client, &json!({ "cmd": "quit" }), &[])
        .await
        .unwrap();
    server.await.unwrap().unwrap();

    let _ = fs::remove_dir_all(&dir);
}
