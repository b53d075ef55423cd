//! The shared, reference-counted upstream session.
//!
//! [`TunnelSession`] dials its transport lazily on the first
//! [`acquire`](TunnelSession::acquire), hands out one [`LogicalConnection`]
//! per channel, and closes the transport again when the last connection is
//! released. The handle is present if and only if at least one slot is held
//! whenever the state lock is not held.

use crate::transport::{Connector, Transport, TuneSocket};
use sshmux_common::{RemoteTarget, Result};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type StreamOf<C> = <<C as Connector>::Transport as Transport>::Stream;

struct SessionState<T> {
    transport: Option<Arc<T>>,
    active: usize,
}

/// Point-in-time view of a [`TunnelSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Whether a transport handle is currently held
    pub connected: bool,
    /// Slots currently held (open or opening channels)
    pub active: usize,
    /// Successful transport dials since creation
    pub dials: u64,
    /// Successful channel opens since creation
    pub channels_opened: u64,
}

/// One upstream transport shared by every forwarded connection.
pub struct TunnelSession<C: Connector> {
    connector: C,
    state: Mutex<SessionState<C::Transport>>,
    dials: AtomicU64,
    channels_opened: AtomicU64,
}

impl<C: Connector> TunnelSession<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            state: Mutex::new(SessionState {
                transport: None,
                active: 0,
            }),
            dials: AtomicU64::new(0),
            channels_opened: AtomicU64::new(0),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open a logical connection to `target`, dialing the transport first if
    /// none is held.
    ///
    /// A failed dial leaves the session untouched. A failed channel open gives
    /// its slot back, which closes a transport nobody else is using.
    pub async fn acquire(self: &Arc<Self>, target: &RemoteTarget) -> Result<LogicalConnection<C>> {
        let transport = self.reserve().await?;

        match transport.open_channel(target).await {
            Ok(stream) => {
                self.channels_opened.fetch_add(1, Ordering::Relaxed);
                Ok(LogicalConnection {
                    stream,
                    session: Some(Arc::clone(self)),
                })
            }
            Err(e) => {
                drop(transport);
                self.release_slot().await;
                Err(e)
            }
        }
    }

    /// Close `conn` and give its slot back.
    pub async fn release(&self, conn: LogicalConnection<C>) {
        conn.release().await;
    }

    /// Check handle, dial if absent, take a slot. One critical section.
    async fn reserve(&self) -> Result<Arc<C::Transport>> {
        let mut state = self.state.lock().await;

        let transport = if let Some(transport) = &state.transport {
            Arc::clone(transport)
        } else {
            let transport = Arc::new(self.connector.connect().await?);
            self.dials.fetch_add(1, Ordering::Relaxed);
            debug!(endpoint = %self.connector.endpoint(), "transport connected");
            state.transport = Some(Arc::clone(&transport));
            transport
        };

        state.active += 1;
        Ok(transport)
    }

    async fn release_slot(&self) {
        let idle = {
            let mut state = self.state.lock().await;
            debug_assert!(state.active > 0, "release without matching acquire");
            state.active = state.active.saturating_sub(1);
            if state.active < 1 {
                state.transport.take()
            } else {
                None
            }
        };

        if let Some(transport) = idle {
            debug!(
                endpoint = %self.connector.endpoint(),
                "last connection released, closing transport"
            );
            transport.close().await;
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            connected: state.transport.is_some(),
            active: state.active,
            dials: self.dials.load(Ordering::Relaxed),
            channels_opened: self.channels_opened.load(Ordering::Relaxed),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.transport.is_some()
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active
    }
}

/// A channel over the shared transport, holding one session slot.
///
/// Call [`release`](Self::release) when done. If the connection is dropped
/// instead (early return, panic), the slot is given back from a spawned task.
pub struct LogicalConnection<C: Connector> {
    stream: StreamOf<C>,
    session: Option<Arc<TunnelSession<C>>>,
}

impl<C: Connector> LogicalConnection<C> {
    /// Give the slot back. The stream is dropped, which closes the channel;
    /// any half-close already done by the relay is not repeated.
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            session.release_slot().await;
        }
    }
}

impl<C: Connector> Drop for LogicalConnection<C> {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    session.release_slot().await;
                });
            }
            Err(_) => warn!("logical connection dropped outside a runtime; slot leaked"),
        }
    }
}

impl<C: Connector> AsyncRead for LogicalConnection<C> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl<C: Connector> AsyncWrite for LogicalConnection<C> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

impl<C: Connector> TuneSocket for LogicalConnection<C> {
    fn tune(&self) -> io::Result<()> {
        self.stream.tune()
    }
}
