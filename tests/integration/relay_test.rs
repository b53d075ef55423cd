use sshmux_core::relay::{relay, Direction};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A connected TCP pair: (client end, server end).
async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(addr), listener.accept());
    (client.unwrap(), accepted.unwrap().0)
}

#[tokio::test]
async fn test_relay_ends_when_local_side_closes() {
    let (mut client, mut local) = tcp_pair().await;
    let (mut upstream, mut peer) = tcp_pair().await;

    let relay_task = tokio::spawn(async move { relay(&mut local, &mut upstream).await });

    client.write_all(b"written before close").await.unwrap();
    client.shutdown().await.unwrap();

    let mut received = Vec::new();
    peer.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"written before close");

    let outcome = tokio::time::timeout(Duration::from_secs(5), relay_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome.direction, Direction::Outbound);
    assert_eq!(outcome.bytes, 20);
}

#[tokio::test]
async fn test_relay_ends_when_remote_side_closes() {
    let (mut client, mut local) = tcp_pair().await;
    let (mut upstream, mut peer) = tcp_pair().await;

    let relay_task = tokio::spawn(async move { relay(&mut local, &mut upstream).await });

    client.write_all(b"request").await.unwrap();
    let mut request = [0u8; 7];
    peer.read_exact(&mut request).await.unwrap();
    assert_eq!(&request, b"request");

    peer.write_all(b"response").await.unwrap();
    peer.shutdown().await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    assert_eq!(response, b"response");

    let outcome = tokio::time::timeout(Duration::from_secs(5), relay_task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome.direction, Direction::Inbound);
    assert_eq!(outcome.bytes, 8);
}
