//! Common utilities and types for `sshmux`

pub mod config;
pub mod constants;
pub mod error;

pub use config::{
    join_host_port, AuthMethod, Config, ForwardEntry, ForwardRule, RemoteTarget, TunnelCredentials,
};
pub use constants::{DEFAULT_CONFIG_PATH, DEFAULT_SSH_PORT};
pub use error::{Result, TunnelError};
