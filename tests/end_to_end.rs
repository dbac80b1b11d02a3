use mini_fds::core::MessageType;
use mini_fds::{
    ChunkStore, Config, DirectoryConfig, DirectoryServer, Downloader, Node, P2PError,
};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

async fn start_directory() -> (String, mpsc::Sender<()>) {
    let server = DirectoryServer::bind(DirectoryConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        ..DirectoryConfig::default()
    })
    .await
    .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(server.run(rx));
    (addr, tx)
}

fn peer_config(id: &str, bootstrap: &str, dir: &TempDir) -> Config {
    Config {
        peer_id: id.to_string(),
        bootstrap_addr: bootstrap.to_string(),
        listen_ip: Some(IpAddr::V4(Ipv4Addr::LOCALHOST)),
        storage_dir: dir.path().to_path_buf(),
        peer_refresh_interval: Duration::from_millis(100),
        ..Config::default()
    }
}

#[tokio::test]
async fn test_fetch_stored_file_between_peers() {
    let (bootstrap, directory_tx) = start_directory().await;
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let meta = ChunkStore::open(dir_b.path())
        .await
        .unwrap()
        .store("doc.bin", &data)
        .await
        .unwrap();
    assert_eq!(meta.chunk_hashes.len(), 3);

    let mut a = Node::new(peer_config("A", &bootstrap, &dir_a)).await.unwrap();
    let mut b = Node::new(peer_config("B", &bootstrap, &dir_b)).await.unwrap();
    a.start().await.unwrap();
    b.start().await.unwrap();

    let peer_b = a.wait_for_peer("B", Duration::from_secs(5)).await.unwrap();
    assert_eq!(&peer_b, b.local_peer());

    // Chunk boundaries on the wire follow the 4096-byte split.
    let mut transfer = Downloader::new()
        .open_transfer(&peer_b, "doc.bin")
        .await
        .unwrap();
    let mut sizes = Vec::new();
    while let Some(chunk) = transfer.next_chunk().await.unwrap() {
        sizes.push(chunk.len());
    }
    assert_eq!(sizes, vec![4096, 4096, 1808]);

    assert_eq!(a.fetch("B", "doc.bin").await.unwrap(), data);

    let err = a.fetch("B", "missing.bin").await.unwrap_err();
    assert!(matches!(err, P2PError::Declined(ref text) if text == "File not found"));

    let err = a.fetch("B", "../doc.bin.meta").await.unwrap_err();
    assert!(matches!(err, P2PError::Declined(ref text) if text == "File not found"));

    a.stop().await;
    b.stop().await;
    directory_tx.send(()).await.unwrap();
}

#[tokio::test]
async fn test_text_message_is_accepted_without_reply() {
    let (bootstrap, _directory_tx) = start_directory().await;
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();

    let mut a = Node::new(peer_config("A", &bootstrap, &dir_a)).await.unwrap();
    let mut b = Node::new(peer_config("B", &bootstrap, &dir_b)).await.unwrap();
    a.start().await.unwrap();
    b.start().await.unwrap();

    a.wait_for_peer("B", Duration::from_secs(5)).await.unwrap();
    a.send_message("B", "hello from A").await.unwrap();

    assert!(matches!(
        a.send_message("nobody", "hi").await,
        Err(P2PError::PeerNotFound(_))
    ));

    a.stop().await;
    b.stop().await;
}

#[test]
fn test_unknown_frame_type_decodes_as_unknown() {
    let frame: mini_fds::core::Message =
        serde_json::from_str("{\"type\":\"list_files\"}").unwrap();
    assert_eq!(frame.msg_type, MessageType::Unknown);
}
