//! Configuration model for `sshmux`
//!
//! The on-disk format is JSON with PascalCase keys:
//!
//! ```json
//! {
//!   "Host": "ssh.example.com",
//!   "Port": 22,
//!   "User": "alice",
//!   "PrivateKey": "id_ed25519",
//!   "Forward": [
//!     { "LocalIP": "127.0.0.1", "LocalPort": 9000,
//!       "RemoteIP": "10.0.0.5", "RemotePort": 22, "Enable": true }
//!   ]
//! }
//! ```

use crate::constants::DEFAULT_SSH_PORT;
use crate::error::{Result, TunnelError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Format `host:port`, bracketing IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Target of a forward rule as seen from the SSH server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
}

impl RemoteTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&join_host_port(&self.host, self.port))
    }
}

impl FromStr for RemoteTarget {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| TunnelError::Config(format!("missing port in address '{s}'")))?;

        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(TunnelError::Config(format!(
                "missing host in address '{s}'"
            )));
        }

        let port = port
            .parse::<u16>()
            .map_err(|e| TunnelError::Config(format!("invalid port in address '{s}': {e}")))?;

        Ok(Self::new(host, port))
    }
}

/// A static local-listen → remote-target mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardRule {
    /// Address the local listener binds (`host:port`)
    pub local_addr: String,
    /// Target reached through the SSH session
    pub remote: RemoteTarget,
    /// Disabled rules never bind
    pub enabled: bool,
}

impl ForwardRule {
    pub fn new(local_addr: impl Into<String>, remote: RemoteTarget, enabled: bool) -> Self {
        Self {
            local_addr: local_addr.into(),
            remote,
            enabled,
        }
    }
}

impl fmt::Display for ForwardRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.local_addr, self.remote)
    }
}

/// Authentication material for the SSH session.
#[derive(Clone)]
pub enum AuthMethod {
    Password(String),
    /// PEM/OpenSSH encoded private key contents
    PrivateKey {
        pem: String,
        passphrase: Option<String>,
    },
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password(_) => f.write_str("Password(<redacted>)"),
            AuthMethod::PrivateKey { passphrase, .. } => f
                .debug_struct("PrivateKey")
                .field("pem", &"<redacted>")
                .field("encrypted", &passphrase.is_some())
                .finish(),
        }
    }
}

/// Everything needed to dial and authenticate the SSH session.
#[derive(Debug, Clone)]
pub struct TunnelCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: AuthMethod,
}

impl TunnelCredentials {
    /// `host:port` of the SSH server.
    pub fn endpoint(&self) -> String {
        join_host_port(&self.host, self.port)
    }
}

/// One entry of the `Forward` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardEntry {
    #[serde(rename = "LocalIP")]
    pub local_ip: String,
    #[serde(rename = "LocalPort")]
    pub local_port: u16,
    #[serde(rename = "RemoteIP")]
    pub remote_ip: String,
    #[serde(rename = "RemotePort")]
    pub remote_port: u16,
    #[serde(rename = "Enable", default)]
    pub enable: bool,
}

impl ForwardEntry {
    pub fn to_rule(&self) -> ForwardRule {
        ForwardRule::new(
            join_host_port(&self.local_ip, self.local_port),
            RemoteTarget::new(self.remote_ip.clone(), self.remote_port),
            self.enable,
        )
    }
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

/// Process-wide configuration as read from disk.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Path of the private key file; empty means password auth
    #[serde(default)]
    pub private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub forward: Vec<ForwardEntry>,

    /// Contents of `private_key`, filled in by [`Config::load`]
    #[serde(skip)]
    private_key_pem: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("private_key", &self.private_key)
            .field("forward", &self.forward)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Read, parse and validate a config file, loading the key file it names.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let data = std::fs::read_to_string(path).map_err(|e| TunnelError::ConfigLoad {
            path: display.clone(),
            reason: e.to_string(),
        })?;

        let mut config = Self::from_json_str(&data).map_err(|e| TunnelError::ConfigLoad {
            path: display,
            reason: e.to_string(),
        })?;

        if !config.private_key.is_empty() {
            let pem = std::fs::read_to_string(&config.private_key).map_err(|e| {
                TunnelError::ConfigLoad {
                    path: config.private_key.clone(),
                    reason: format!("private key unreadable: {e}"),
                }
            })?;
            config.private_key_pem = Some(pem);
        }

        Ok(config)
    }

    /// Parse and validate config JSON without touching the filesystem.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| TunnelError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(TunnelError::Config("Host is required".into()));
        }
        if self.port == 0 {
            return Err(TunnelError::Config("Port must be non-zero".into()));
        }
        if self.user.is_empty() {
            return Err(TunnelError::Config("User is required".into()));
        }
        for (i, entry) in self.forward.iter().enumerate() {
            if entry.local_port == 0 || entry.remote_port == 0 {
                return Err(TunnelError::Config(format!(
                    "Forward[{i}]: ports must be non-zero"
                )));
            }
            if entry.local_ip.is_empty() || entry.remote_ip.is_empty() {
                return Err(TunnelError::Config(format!(
                    "Forward[{i}]: LocalIP and RemoteIP are required"
                )));
            }
        }
        Ok(())
    }

    /// Attach private key contents directly, for embedding without a key file.
    #[must_use]
    pub fn with_private_key_pem(mut self, pem: impl Into<String>) -> Self {
        self.private_key_pem = Some(pem.into());
        self
    }

    /// Credentials for the SSH session. A loaded key takes precedence over the password.
    pub fn credentials(&self) -> TunnelCredentials {
        let auth = match &self.private_key_pem {
            Some(pem) => AuthMethod::PrivateKey {
                pem: pem.clone(),
                passphrase: self.passphrase.clone(),
            },
            None => AuthMethod::Password(self.password.clone()),
        };

        TunnelCredentials {
            host: self.host.clone(),
            port: self.port,
            user: self.user.clone(),
            auth,
        }
    }

    /// Forward rules in file order, disabled ones included.
    pub fn rules(&self) -> Vec<ForwardRule> {
        self.forward.iter().map(ForwardEntry::to_rule).collect()
    }
}
