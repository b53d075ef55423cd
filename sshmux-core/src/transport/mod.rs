//! Transport layer abstraction
//!
//! A [`Connector`] dials the shared upstream session; the resulting
//! [`Transport`] multiplexes logical channels to remote targets. The SSH
//! implementation lives in [`ssh`]; tests substitute in-process doubles.

use async_trait::async_trait;
use sshmux_common::{RemoteTarget, Result};
use tokio::io::{AsyncRead, AsyncWrite};

pub mod socket_tuning;
pub mod ssh;

pub use socket_tuning::{configure_socket, TuneSocket};
pub use ssh::{SshConnector, SshTransport};

/// A byte stream that can be relayed.
pub trait AsyncStream: AsyncRead + AsyncWrite + TuneSocket + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + TuneSocket + Send + Unpin> AsyncStream for T {}

/// Dials the upstream transport session.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// `host:port` of the upstream endpoint, for logs and errors.
    fn endpoint(&self) -> String;

    /// Establish and authenticate a new session.
    async fn connect(&self) -> Result<Self::Transport>;
}

/// An established upstream session carrying logical channels.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Stream: AsyncStream + 'static;

    /// Open a new channel to `target` over this session.
    async fn open_channel(&self, target: &RemoteTarget) -> Result<Self::Stream>;

    /// Close the session. Errors are logged, never returned.
    async fn close(&self);
}
