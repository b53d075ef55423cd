//! Socket tuning for relayed TCP connections
//!
//! - `TCP_NODELAY`: Disable Nagle's algorithm for interactive protocols
//! - TCP keepalive: Detect dead peers on long-idle forwards

use socket2::SockRef;
use std::io;
use std::time::Duration;
use tokio::net::TcpStream;

const KEEPALIVE_TIME: Duration = Duration::from_secs(30);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

pub fn configure_socket(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;

    let keepalive = socket2::TcpKeepalive::new()
        .with_time(KEEPALIVE_TIME)
        .with_interval(KEEPALIVE_INTERVAL);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)?;

    Ok(())
}

/// Streams the relay engine may tune before pumping bytes.
///
/// Only real TCP sockets have anything to tune; everything else keeps the
/// default no-op.
pub trait TuneSocket {
    fn tune(&self) -> io::Result<()> {
        Ok(())
    }
}

impl TuneSocket for TcpStream {
    fn tune(&self) -> io::Result<()> {
        configure_socket(self)
    }
}

impl TuneSocket for tokio::io::DuplexStream {}

impl TuneSocket for russh::ChannelStream<russh::client::Msg> {}

impl<T: TuneSocket + ?Sized> TuneSocket for &mut T {
    fn tune(&self) -> io::Result<()> {
        (**self).tune()
    }
}
