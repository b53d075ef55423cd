//! Local listeners feeding the shared session.

pub mod listener;
pub mod policy;
pub mod set;

pub use listener::ForwardListener;
pub use policy::{CaptureErrors, ExitProcess, FatalPolicy};
pub use set::{ForwardSet, RunningForwards};
