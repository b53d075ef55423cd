//! Bidirectional byte relay between two duplex streams.
//!
//! Two pumps run concurrently, `a → b` and `b → a`. The first one to finish
//! (EOF or error) decides the outcome; the other pump is dropped and the
//! caller closes both streams.

use crate::transport::TuneSocket;
use sshmux_common::{Result, TunnelError};
use std::fmt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Which pump finished first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// `a → b`
    Outbound,
    /// `b → a`
    Inbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Outbound => "a->b",
            Direction::Inbound => "b->a",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a clean relay: the direction that hit EOF first and the bytes
/// it carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayOutcome {
    pub direction: Direction,
    pub bytes: u64,
}

/// Relay bytes between `a` and `b` until either direction ends.
pub async fn relay<A, B>(a: &mut A, b: &mut B) -> Result<RelayOutcome>
where
    A: AsyncRead + AsyncWrite + TuneSocket + Unpin,
    B: AsyncRead + AsyncWrite + TuneSocket + Unpin,
{
    if let Err(e) = a.tune() {
        debug!(error = %e, "socket tuning failed");
    }
    if let Err(e) = b.tune() {
        debug!(error = %e, "socket tuning failed");
    }

    let (mut a_read, mut a_write) = tokio::io::split(a);
    let (mut b_read, mut b_write) = tokio::io::split(b);

    let (direction, result) = tokio::select! {
        result = pump(&mut a_read, &mut b_write) => (Direction::Outbound, result),
        result = pump(&mut b_read, &mut a_write) => (Direction::Inbound, result),
    };

    result
        .map(|bytes| RelayOutcome { direction, bytes })
        .map_err(|source| TunnelError::Relay {
            direction: direction.as_str(),
            source,
        })
}

/// Copy until EOF, then propagate the EOF to the writer.
async fn pump<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let bytes = tokio::io::copy(reader, writer).await?;
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "half-close after EOF failed");
    }
    Ok(bytes)
}
