//! What a listener does when it hits a process-level error.

use sshmux_common::TunnelError;
use std::ops::ControlFlow;
use std::sync::{Mutex, PoisonError};
use tracing::{error, warn};

/// Decides the fate of the process on bind and accept failures.
///
/// `Break` stops the listener; `Continue` keeps accepting. Bind failures stop
/// the listener regardless, since there is nothing to accept on.
pub trait FatalPolicy: Send + Sync {
    fn on_fatal(&self, err: &TunnelError) -> ControlFlow<()>;
}

/// Production policy: log and terminate the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExitProcess;

impl FatalPolicy for ExitProcess {
    fn on_fatal(&self, err: &TunnelError) -> ControlFlow<()> {
        error!(error = %err, "fatal listener error, exiting");
        std::process::exit(1)
    }
}

/// Records errors and keeps going. Used by tests and by embedders that
/// supervise listeners themselves.
#[derive(Debug, Default)]
pub struct CaptureErrors {
    errors: Mutex<Vec<String>>,
}

impl CaptureErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages of every error seen so far.
    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl FatalPolicy for CaptureErrors {
    fn on_fatal(&self, err: &TunnelError) -> ControlFlow<()> {
        warn!(error = %err, "listener error captured");
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err.to_string());
        ControlFlow::Continue(())
    }
}
