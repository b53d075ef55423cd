use super::{
    connect_with_retry, eventually, get_free_port, start_pong_server, target_of, wait_for_server,
    MockConnector,
};
use sshmux::{CaptureErrors, FatalPolicy, ForwardRule, Forwarder, TunnelError};
use sshmux_core::{ForwardSet, TunnelSession};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const STARTUP: Duration = Duration::from_secs(5);

fn local_rule(remote: SocketAddr, enabled: bool) -> (SocketAddr, ForwardRule) {
    let local: SocketAddr = format!("127.0.0.1:{}", get_free_port()).parse().unwrap();
    let rule = ForwardRule::new(local.to_string(), target_of(remote), enabled);
    (local, rule)
}

async fn ping(stream: &mut TcpStream) -> [u8; 4] {
    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    stream.read_exact(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn test_ping_pong_through_forward() {
    let pong = start_pong_server().await;
    let (local, rule) = local_rule(pong, true);

    let mut forwarder = Forwarder::builder()
        .rule(rule)
        .fatal_policy(Arc::new(CaptureErrors::new()))
        .build(MockConnector::new())
        .unwrap();
    forwarder.start().unwrap();
    assert!(wait_for_server(local, STARTUP).await);

    let mut client = TcpStream::connect(local).await.unwrap();
    assert_eq!(&ping(&mut client).await, b"pong");
    assert_eq!(&ping(&mut client).await, b"pong");

    forwarder.shutdown();
}

#[tokio::test]
async fn test_simultaneous_clients_share_one_dial() {
    let pong = start_pong_server().await;
    let (local, rule) = local_rule(pong, true);
    let connector = MockConnector::new();
    let stats = connector.stats();

    let mut forwarder = Forwarder::builder()
        .rule(rule)
        .fatal_policy(Arc::new(CaptureErrors::new()))
        .build(connector)
        .unwrap();
    forwarder.start().unwrap();

    let mut first = connect_with_retry(local, STARTUP).await;
    let mut second = TcpStream::connect(local).await.unwrap();
    assert_eq!(&ping(&mut first).await, b"pong");
    assert_eq!(&ping(&mut second).await, b"pong");

    assert_eq!(stats.dials(), 1);
    assert_eq!(stats.opens(), 2);
    assert_eq!(forwarder.snapshot().await.active, 2);

    drop(first);
    drop(second);

    let session = Arc::clone(forwarder.session());
    let idle = eventually(STARTUP, || {
        let session = Arc::clone(&session);
        async move { !session.is_connected().await }
    })
    .await;
    assert!(idle);
    assert_eq!(stats.closes(), 1);

    forwarder.shutdown();
}

#[tokio::test]
async fn test_dial_failure_closes_socket_and_listener_survives() {
    let pong = start_pong_server().await;
    let (local, rule) = local_rule(pong, true);
    let connector = MockConnector::new();
    let stats = connector.stats();
    connector.fail_next_dial();

    let policy = Arc::new(CaptureErrors::new());
    let mut forwarder = Forwarder::builder()
        .rule(rule)
        .fatal_policy(Arc::clone(&policy) as Arc<dyn FatalPolicy>)
        .build(connector)
        .unwrap();
    forwarder.start().unwrap();

    let mut rejected = connect_with_retry(local, STARTUP).await;
    let mut buf = [0u8; 4];
    let read = tokio::time::timeout(STARTUP, rejected.read(&mut buf))
        .await
        .unwrap();
    assert!(matches!(read, Ok(0) | Err(_)));
    assert_eq!(stats.dials(), 0);

    let mut served = TcpStream::connect(local).await.unwrap();
    assert_eq!(&ping(&mut served).await, b"pong");
    assert_eq!(stats.dials(), 1);

    // Connection-scoped failures never reach the fatal policy.
    assert!(policy.errors().is_empty());

    forwarder.shutdown();
}

#[tokio::test]
async fn test_handle_cleared_after_last_release() {
    let pong = start_pong_server().await;
    let (local, rule) = local_rule(pong, true);
    let connector = MockConnector::new();
    let stats = connector.stats();

    let mut forwarder = Forwarder::builder()
        .rule(rule)
        .fatal_policy(Arc::new(CaptureErrors::new()))
        .build(connector)
        .unwrap();
    forwarder.start().unwrap();

    let mut client = connect_with_retry(local, STARTUP).await;
    assert_eq!(&ping(&mut client).await, b"pong");
    assert!(forwarder.snapshot().await.connected);
    drop(client);

    let session = Arc::clone(forwarder.session());
    let idle = eventually(STARTUP, || {
        let session = Arc::clone(&session);
        async move { !session.is_connected().await }
    })
    .await;
    assert!(idle);

    let mut client = TcpStream::connect(local).await.unwrap();
    assert_eq!(&ping(&mut client).await, b"pong");
    assert_eq!(stats.dials(), 2);

    forwarder.shutdown();
}

#[tokio::test]
async fn test_disabled_rule_never_binds() {
    let pong = start_pong_server().await;
    let (enabled_local, enabled) = local_rule(pong, true);
    let (disabled_local, disabled) = local_rule(pong, false);
    let connector = MockConnector::new();
    let stats = connector.stats();

    let session = Arc::new(TunnelSession::new(connector));
    let policy: Arc<dyn FatalPolicy> = Arc::new(CaptureErrors::new());
    let running = ForwardSet::new(vec![enabled, disabled]).start_all(&session, &policy);

    assert_eq!(running.len(), 1);
    assert_eq!(
        running.rules().next().map(|r| r.local_addr.clone()),
        Some(enabled_local.to_string())
    );

    assert_eq!(stats.dials(), 0);
    assert!(!session.is_connected().await);

    let _client = connect_with_retry(enabled_local, STARTUP).await;
    assert!(std::net::TcpListener::bind(disabled_local).is_ok());

    running.abort_all();
}

#[tokio::test]
async fn test_bind_failure_reaches_policy() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let taken = occupied.local_addr().unwrap();
    let rule = ForwardRule::new(taken.to_string(), target_of(taken), true);

    let session = Arc::new(TunnelSession::new(MockConnector::new()));
    let capture = Arc::new(CaptureErrors::new());
    let policy: Arc<dyn FatalPolicy> = Arc::clone(&capture) as Arc<dyn FatalPolicy>;
    let mut running = ForwardSet::new(vec![rule]).start_all(&session, &policy);

    let err = running.wait().await.unwrap_err();
    assert!(matches!(err, TunnelError::Bind { .. }));
    assert!(!err.is_connection_scoped());

    let errors = capture.errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains(&taken.to_string()));
}
