pub mod session;

pub use session::{LogicalConnection, SessionSnapshot, TunnelSession};
