use super::{get_free_port, start_echo_server, target_of, MockConnector};
use sshmux_common::{RemoteTarget, TunnelError};
use sshmux_core::TunnelSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[tokio::test]
async fn test_paired_acquire_release_returns_to_idle() {
    let target = target_of(start_echo_server().await);
    let connector = MockConnector::new().with_dial_delay(Duration::from_millis(20));
    let stats = connector.stats();
    let session = Arc::new(TunnelSession::new(connector));

    let mut tasks = Vec::new();
    for i in 0..20u8 {
        let session = Arc::clone(&session);
        let target = target.clone();
        tasks.push(tokio::spawn(async move {
            let mut conn = session.acquire(&target).await.unwrap();
            conn.write_all(&[i; 8]).await.unwrap();
            let mut buf = [0u8; 8];
            conn.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, [i; 8]);
            session.release(conn).await;
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = session.snapshot().await;
    assert_eq!(snapshot.active, 0);
    assert!(!snapshot.connected);
    assert_eq!(snapshot.channels_opened, 20);
    assert!(stats.dials() >= 1);
    assert_eq!(stats.closes(), stats.dials());
}

#[tokio::test]
async fn test_concurrent_acquires_share_one_dial() {
    let target = target_of(start_echo_server().await);
    let connector = MockConnector::new();
    let stats = connector.stats();
    let session = Arc::new(TunnelSession::new(connector));

    let holder = session.acquire(&target).await.unwrap();
    assert_eq!(stats.dials(), 1);

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let session = Arc::clone(&session);
        let target = target.clone();
        tasks.push(tokio::spawn(async move { session.acquire(&target).await.unwrap() }));
    }
    let mut conns = Vec::new();
    for task in tasks {
        conns.push(task.await.unwrap());
    }

    assert_eq!(stats.dials(), 1);
    assert_eq!(stats.opens(), 9);
    assert_eq!(session.active_count().await, 9);

    for conn in conns {
        conn.release().await;
    }
    assert!(session.is_connected().await);

    holder.release().await;
    assert!(!session.is_connected().await);
    assert_eq!(stats.closes(), 1);
}

#[tokio::test]
async fn test_racing_first_acquires_dial_once() {
    let target = target_of(start_echo_server().await);
    let connector = MockConnector::new().with_dial_delay(Duration::from_millis(100));
    let stats = connector.stats();
    let session = Arc::new(TunnelSession::new(connector));

    let (a, b) = tokio::join!(session.acquire(&target), session.acquire(&target));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(stats.dials(), 1);
    assert_eq!(session.active_count().await, 2);

    a.release().await;
    b.release().await;
    assert!(!session.is_connected().await);
}

#[tokio::test]
async fn test_redial_after_idle() {
    let target = target_of(start_echo_server().await);
    let connector = MockConnector::new();
    let stats = connector.stats();
    let session = Arc::new(TunnelSession::new(connector));

    let conn = session.acquire(&target).await.unwrap();
    conn.release().await;

    // Handle is gone before anyone asks for the next connection.
    let idle = session.snapshot().await;
    assert!(!idle.connected);
    assert_eq!(idle.active, 0);
    assert_eq!(stats.closes(), 1);

    let conn = session.acquire(&target).await.unwrap();
    assert_eq!(stats.dials(), 2);
    assert!(session.is_connected().await);
    conn.release().await;
}

#[tokio::test]
async fn test_dial_failure_is_transport_dial() {
    let target = target_of(start_echo_server().await);
    let connector = MockConnector::new();
    connector.fail_next_dial();
    let stats = connector.stats();
    let session = Arc::new(TunnelSession::new(connector));

    let err = session.acquire(&target).await.err().unwrap();
    assert!(matches!(err, TunnelError::TransportDial { .. }));
    assert!(err.is_connection_scoped());

    let snapshot = session.snapshot().await;
    assert!(!snapshot.connected);
    assert_eq!(snapshot.active, 0);
    assert_eq!(snapshot.dials, 0);

    let conn = session.acquire(&target).await.unwrap();
    assert_eq!(stats.dials(), 1);
    conn.release().await;
}

#[tokio::test]
async fn test_failed_open_does_not_leak_transport() {
    let unreachable = RemoteTarget::new("127.0.0.1", get_free_port());
    let connector = MockConnector::new();
    let stats = connector.stats();
    let session = Arc::new(TunnelSession::new(connector));

    let err = session.acquire(&unreachable).await.err().unwrap();
    assert!(matches!(err, TunnelError::ChannelOpen { .. }));

    let snapshot = session.snapshot().await;
    assert!(!snapshot.connected);
    assert_eq!(snapshot.active, 0);
    assert_eq!(stats.dials(), 1);
    assert_eq!(stats.closes(), 1);
}

#[tokio::test]
async fn test_dropped_connection_releases_slot() {
    let target = target_of(start_echo_server().await);
    let session = Arc::new(TunnelSession::new(MockConnector::new()));

    let conn = session.acquire(&target).await.unwrap();
    drop(conn);

    let released = super::eventually(Duration::from_secs(2), || {
        let session = Arc::clone(&session);
        async move { !session.is_connected().await }
    })
    .await;
    assert!(released);
    assert_eq!(session.active_count().await, 0);
}
