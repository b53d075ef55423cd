//! SSH transport built on `russh`
//!
//! Each logical connection is a `direct-tcpip` channel on one shared client
//! session. Server host keys are not verified: any key is accepted.

use super::{Connector, Transport};
use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::keys::{decode_secret_key, HashAlg, PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelStream, Disconnect};
use sshmux_common::constants::{CHANNEL_ORIGINATOR_HOST, CHANNEL_ORIGINATOR_PORT};
use sshmux_common::{AuthMethod, RemoteTarget, Result, TunnelCredentials, TunnelError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const KEEPALIVE_MAX: usize = 3;

/// russh callback handler. Accepts every server key.
#[derive(Debug, Default)]
pub struct AcceptAnyHostKey;

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        debug!(
            fingerprint = %server_public_key.fingerprint(HashAlg::Sha256),
            "accepting server host key without verification"
        );
        Ok(true)
    }
}

enum SshAuth {
    Password(String),
    Key(Arc<PrivateKey>),
}

impl SshAuth {
    fn kind(&self) -> &'static str {
        match self {
            SshAuth::Password(_) => "password",
            SshAuth::Key(_) => "publickey",
        }
    }
}

/// Dials and authenticates SSH sessions for one fixed endpoint.
pub struct SshConnector {
    host: String,
    port: u16,
    user: String,
    auth: SshAuth,
    config: Arc<client::Config>,
}

impl std::fmt::Debug for SshConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConnector")
            .field("endpoint", &self.endpoint())
            .field("user", &self.user)
            .field("auth", &self.auth.kind())
            .finish_non_exhaustive()
    }
}

impl SshConnector {
    /// Build a connector from loaded credentials. An undecodable private key
    /// is a `ConfigLoad` error.
    pub fn new(credentials: &TunnelCredentials) -> Result<Self> {
        let auth = match &credentials.auth {
            AuthMethod::Password(password) => SshAuth::Password(password.clone()),
            AuthMethod::PrivateKey { pem, passphrase } => {
                let key = decode_secret_key(pem, passphrase.as_deref()).map_err(|e| {
                    TunnelError::ConfigLoad {
                        path: "PrivateKey".into(),
                        reason: format!("unable to parse private key: {e}"),
                    }
                })?;
                SshAuth::Key(Arc::new(key))
            }
        };

        let config = Arc::new(client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(KEEPALIVE_INTERVAL),
            keepalive_max: KEEPALIVE_MAX,
            ..Default::default()
        });

        let connector = Self {
            host: credentials.host.clone(),
            port: credentials.port,
            user: credentials.user.clone(),
            auth,
            config,
        };

        warn!(
            endpoint = %connector.endpoint(),
            "SSH host key verification is disabled; any server key will be accepted"
        );

        Ok(connector)
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    async fn authenticate(&self, handle: &mut Handle<AcceptAnyHostKey>) -> Result<()> {
        let dial_error = |reason: String| TunnelError::TransportDial {
            endpoint: self.endpoint(),
            reason,
        };

        let result = match &self.auth {
            SshAuth::Password(password) => handle
                .authenticate_password(&self.user, password)
                .await
                .map_err(|e| dial_error(e.to_string()))?,
            SshAuth::Key(key) => {
                // RSA keys need the strongest hash the server accepts; other
                // key types ignore it.
                let hash_alg = handle
                    .best_supported_rsa_hash()
                    .await
                    .map_err(|e| dial_error(e.to_string()))?
                    .flatten();
                handle
                    .authenticate_publickey(
                        &self.user,
                        PrivateKeyWithHashAlg::new(Arc::clone(key), hash_alg),
                    )
                    .await
                    .map_err(|e| dial_error(e.to_string()))?
            }
        };

        if !result.success() {
            return Err(dial_error(format!(
                "{} authentication rejected for user '{}'",
                self.auth.kind(),
                self.user
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Transport = SshTransport;

    fn endpoint(&self) -> String {
        sshmux_common::join_host_port(&self.host, self.port)
    }

    async fn connect(&self) -> Result<SshTransport> {
        debug!(endpoint = %self.endpoint(), "ssh dial");

        let mut handle = client::connect(
            Arc::clone(&self.config),
            (self.host.as_str(), self.port),
            AcceptAnyHostKey,
        )
        .await
        .map_err(|e| TunnelError::TransportDial {
            endpoint: self.endpoint(),
            reason: e.to_string(),
        })?;

        self.authenticate(&mut handle).await?;

        info!(
            endpoint = %self.endpoint(),
            user = %self.user,
            auth = self.auth.kind(),
            "SSH session established"
        );

        Ok(SshTransport { handle })
    }
}

/// One authenticated SSH client session.
pub struct SshTransport {
    handle: Handle<AcceptAnyHostKey>,
}

#[async_trait]
impl Transport for SshTransport {
    type Stream = ChannelStream<Msg>;

    async fn open_channel(&self, target: &RemoteTarget) -> Result<ChannelStream<Msg>> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                target.host.clone(),
                u32::from(target.port),
                CHANNEL_ORIGINATOR_HOST,
                CHANNEL_ORIGINATOR_PORT,
            )
            .await
            .map_err(|e| TunnelError::ChannelOpen {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        Ok(channel.into_stream())
    }

    async fn close(&self) {
        debug!("ssh close");
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!(error = %e, "SSH disconnect failed");
        }
    }
}
