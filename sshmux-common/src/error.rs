//! Error types for `sshmux`

use thiserror::Error;

/// Main error type for `sshmux` operations
#[derive(Error, Debug)]
pub enum TunnelError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file missing, unparseable or invalid, or key file unreadable
    #[error("Failed to load config {path}: {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Configuration error outside of file loading
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local listener could not bind
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Local listener failed to accept
    #[error("Accept failed on {addr}: {source}")]
    Accept {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The shared upstream transport could not be established
    #[error("Transport dial to {endpoint} failed: {reason}")]
    TransportDial { endpoint: String, reason: String },

    /// A logical channel could not be opened over the transport
    #[error("Channel open to {target} failed: {reason}")]
    ChannelOpen { target: String, reason: String },

    /// One relay direction failed
    #[error("Relay {direction} failed: {source}")]
    Relay {
        direction: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl TunnelError {
    /// Whether the error is contained to a single forwarded connection.
    ///
    /// Connection-scoped errors are logged and the connection is abandoned;
    /// everything else is process-level.
    pub fn is_connection_scoped(&self) -> bool {
        matches!(
            self,
            TunnelError::TransportDial { .. }
                | TunnelError::ChannelOpen { .. }
                | TunnelError::Relay { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TunnelError>;
