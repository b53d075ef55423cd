//! Starts one listener per enabled forward rule.

use super::listener::ForwardListener;
use super::policy::FatalPolicy;
use crate::transport::Connector;
use crate::tunnel::TunnelSession;
use sshmux_common::{ForwardRule, Result, TunnelError};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

/// The configured forward rules, disabled ones included.
#[derive(Debug, Clone, Default)]
pub struct ForwardSet {
    rules: Vec<ForwardRule>,
}

impl ForwardSet {
    pub fn new(rules: Vec<ForwardRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ForwardRule] {
        &self.rules
    }

    pub fn enabled(&self) -> impl Iterator<Item = &ForwardRule> {
        self.rules.iter().filter(|rule| rule.enabled)
    }

    /// Spawn a [`ForwardListener`] for every enabled rule. Disabled rules
    /// are skipped without binding anything.
    pub fn start_all<C: Connector>(
        &self,
        session: &Arc<TunnelSession<C>>,
        policy: &Arc<dyn FatalPolicy>,
    ) -> RunningForwards {
        let mut listeners = Vec::new();

        for rule in &self.rules {
            if !rule.enabled {
                debug!(rule = %rule, "forward disabled, skipping");
                continue;
            }

            let listener =
                ForwardListener::new(rule.clone(), Arc::clone(session), Arc::clone(policy));
            listeners.push((rule.clone(), tokio::spawn(listener.run())));
        }

        RunningForwards { listeners }
    }
}

/// Handles of the spawned listeners.
#[derive(Debug)]
pub struct RunningForwards {
    listeners: Vec<(ForwardRule, JoinHandle<Result<()>>)>,
}

impl RunningForwards {
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &ForwardRule> {
        self.listeners.iter().map(|(rule, _)| rule)
    }

    /// Stop every listener. Connections already being relayed keep running.
    pub fn abort_all(&self) {
        for (_, handle) in &self.listeners {
            handle.abort();
        }
    }

    /// Wait for every listener to stop and return the first failure.
    ///
    /// Cancel-safe: listeners not yet joined stay tracked, so a later
    /// [`abort_all`](Self::abort_all) still reaches them.
    pub async fn wait(&mut self) -> Result<()> {
        let mut first_error = None;

        while let Some((rule, handle)) = self.listeners.first_mut() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Ok(()),
                Err(e) => Err(TunnelError::Io(std::io::Error::other(format!(
                    "listener for {rule} panicked: {e}"
                )))),
            };
            self.listeners.remove(0);

            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
