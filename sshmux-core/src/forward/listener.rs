//! Per-rule accept loop.

use super::policy::FatalPolicy;
use crate::relay::relay;
use crate::transport::Connector;
use crate::tunnel::TunnelSession;
use sshmux_common::{ForwardRule, Result, TunnelError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so a persistent error (EMFILE) does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Accepts connections for one [`ForwardRule`] and forwards each of them
/// through the shared session.
pub struct ForwardListener<C: Connector> {
    rule: ForwardRule,
    session: Arc<TunnelSession<C>>,
    policy: Arc<dyn FatalPolicy>,
}

impl<C: Connector> ForwardListener<C> {
    pub fn new(
        rule: ForwardRule,
        session: Arc<TunnelSession<C>>,
        policy: Arc<dyn FatalPolicy>,
    ) -> Self {
        Self {
            rule,
            session,
            policy,
        }
    }

    pub fn rule(&self) -> &ForwardRule {
        &self.rule
    }

    /// Bind the rule's local address.
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(&self.rule.local_addr)
            .await
            .map_err(|source| TunnelError::Bind {
                addr: self.rule.local_addr.clone(),
                source,
            })
    }

    /// Bind and serve. Returns only when the fatal policy stops the loop.
    pub async fn run(self) -> Result<()> {
        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = self.policy.on_fatal(&e);
                return Err(e);
            }
        };

        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        info!(
            local = %self.rule.local_addr,
            remote = %self.rule.remote,
            "forward listening"
        );

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let session = Arc::clone(&self.session);
                    let rule = self.rule.clone();
                    tokio::spawn(async move {
                        forward_connection(session, rule, stream, peer).await;
                    });
                }
                Err(source) => self.accept_failed(source).await?,
            }
        }
    }

    /// Route an accept error through the policy, backing off if it lets the
    /// loop continue.
    async fn accept_failed(&self, source: std::io::Error) -> Result<()> {
        let err = TunnelError::Accept {
            addr: self.rule.local_addr.clone(),
            source,
        };
        if self.policy.on_fatal(&err).is_break() {
            return Err(err);
        }
        tokio::time::sleep(ACCEPT_BACKOFF).await;
        Ok(())
    }
}

/// Acquire a channel, relay, release. The accepted socket is closed on every
/// path when it goes out of scope.
async fn forward_connection<C: Connector>(
    session: Arc<TunnelSession<C>>,
    rule: ForwardRule,
    mut stream: TcpStream,
    peer: SocketAddr,
) {
    debug!(
        peer = %peer,
        local = %rule.local_addr,
        remote = %rule.remote,
        "forward open"
    );

    let mut conn = match session.acquire(&rule.remote).await {
        Ok(conn) => conn,
        Err(e) => {
            error!(
                peer = %peer,
                local = %rule.local_addr,
                remote = %rule.remote,
                error = %e,
                "failed to open upstream channel"
            );
            return;
        }
    };

    let start = Instant::now();
    match relay(&mut stream, &mut conn).await {
        Ok(outcome) => {
            debug!(
                peer = %peer,
                local = %rule.local_addr,
                remote = %rule.remote,
                first_eof = %outcome.direction,
                bytes = outcome.bytes,
                duration_ms = start.elapsed().as_millis(),
                "forward closed"
            );
        }
        Err(e) => {
            warn!(
                peer = %peer,
                local = %rule.local_addr,
                remote = %rule.remote,
                error = %e,
                "relay error"
            );
        }
    }

    drop(stream);
    conn.release().await;
}
