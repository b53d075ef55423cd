//! # `sshmux`
//!
//! Local TCP port forwarding over a single, shared SSH connection.
//!
//! ## Overview
//!
//! Every configured forward binds a local address. Each accepted connection
//! gets its own `direct-tcpip` channel to a remote target, and all channels
//! share one SSH transport. The transport is dialed when the first connection
//! arrives and closed again when the last one finishes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sshmux::prelude::*;
//!
//! # async fn example() -> sshmux::Result<()> {
//! let config = Config::load("config.json")?;
//! let mut forwarder = Forwarder::from_config(&config)?;
//! forwarder.start()?;
//! forwarder.wait().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`sshmux-common`] - Config model, shared types and errors
//! - [`sshmux-core`] - Transport seam, shared session, relay and listeners
//!
//! ## Re-exports
//!
//! This crate re-exports the most commonly used items from the subcrates
//! for convenience.

pub mod forwarder;

// Re-export subcrates
pub use sshmux_common as common;
pub use sshmux_core as engine;

pub use forwarder::{Forwarder, ForwarderBuilder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::common::{Config, ForwardRule, RemoteTarget, Result, TunnelError};
    pub use crate::engine::{
        CaptureErrors, Connector, ExitProcess, FatalPolicy, SessionSnapshot, SshConnector,
        Transport, TunnelSession,
    };
    pub use crate::forwarder::{Forwarder, ForwarderBuilder};
}

// Convenience re-exports at crate root
pub use common::{Config, ForwardRule, RemoteTarget, Result, TunnelError};
pub use engine::{
    CaptureErrors, Connector, ExitProcess, FatalPolicy, SessionSnapshot, SshConnector, Transport,
    TunnelSession,
};
