pub mod forward;
pub mod relay;
pub mod transport;
pub mod tunnel;

// Re-export specific items for convenience
pub use forward::{
    CaptureErrors, ExitProcess, FatalPolicy, ForwardListener, ForwardSet, RunningForwards,
};
pub use relay::{relay, Direction, RelayOutcome};
pub use transport::{Connector, SshConnector, SshTransport, Transport};
pub use tunnel::{LogicalConnection, SessionSnapshot, TunnelSession};
