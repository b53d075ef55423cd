//! Embeddable forwarder with builder pattern.
//!
//! # Example
//!
//! ```rust,no_run
//! use sshmux::{ForwardRule, Forwarder, RemoteTarget, SshConnector};
//! use sshmux::common::{AuthMethod, TunnelCredentials};
//!
//! # async fn example() -> sshmux::Result<()> {
//! let connector = SshConnector::new(&TunnelCredentials {
//!     host: "bastion.example.com".into(),
//!     port: 22,
//!     user: "deploy".into(),
//!     auth: AuthMethod::Password("secret".into()),
//! })?;
//!
//! let mut forwarder = Forwarder::builder()
//!     .rule(ForwardRule::new(
//!         "127.0.0.1:15432",
//!         RemoteTarget::new("10.0.0.5", 5432),
//!         true,
//!     ))
//!     .build(connector)?;
//!
//! forwarder.start()?;
//! tokio::signal::ctrl_c().await?;
//! forwarder.shutdown();
//! # Ok(())
//! # }
//! ```

use sshmux_common::{Config, ForwardRule, Result, TunnelError};
use sshmux_core::{
    Connector, ExitProcess, FatalPolicy, ForwardSet, RunningForwards, SessionSnapshot,
    SshConnector, TunnelSession,
};
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// A set of local forwards sharing one upstream session.
///
/// Use [`Forwarder::builder()`] for custom transports or
/// [`Forwarder::from_config`] for the SSH transport described by a config file.
pub struct Forwarder<C: Connector> {
    session: Arc<TunnelSession<C>>,
    forwards: ForwardSet,
    policy: Arc<dyn FatalPolicy>,
    running: Option<RunningForwards>,
}

/// Builder for constructing a [`Forwarder`].
#[derive(Default)]
pub struct ForwarderBuilder {
    rules: Vec<ForwardRule>,
    policy: Option<Arc<dyn FatalPolicy>>,
}

impl Forwarder<SshConnector> {
    /// Create a new forwarder builder. The connector is chosen at
    /// [`build`](ForwarderBuilder::build) time.
    pub fn builder() -> ForwarderBuilder {
        ForwarderBuilder::default()
    }

    /// Build an SSH forwarder from a loaded [`Config`].
    ///
    /// The fatal policy is [`ExitProcess`]; use the builder to change it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or its private key cannot be
    /// parsed.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let connector = SshConnector::new(&config.credentials())?;
        ForwarderBuilder::default()
            .rules(config.rules())
            .build(connector)
    }
}

impl<C: Connector> Forwarder<C> {
    /// Bind and serve every enabled rule in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the forwarder is already running. Bind failures are
    /// reported through the fatal policy and by [`wait`](Self::wait).
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(TunnelError::Config("forwarder is already running".into()));
        }

        let running = self.forwards.start_all(&self.session, &self.policy);
        info!(
            enabled = running.len(),
            configured = self.forwards.rules().len(),
            endpoint = %self.session.connector().endpoint(),
            "forwards started"
        );
        self.running = Some(running);
        Ok(())
    }

    /// Wait until every listener has stopped.
    ///
    /// Returns immediately if the forwarder was never started. Dropping the
    /// future early leaves the listeners running and owned by the forwarder,
    /// so [`shutdown`](Self::shutdown) still stops them.
    ///
    /// # Errors
    ///
    /// Returns the first listener failure.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(running) = self.running.as_mut() else {
            return Ok(());
        };

        let result = running.wait().await;
        self.running = None;
        result
    }

    /// Stop accepting on every listener. Connections already being relayed
    /// run to completion and release their channels as usual.
    pub fn shutdown(&mut self) {
        if let Some(running) = self.running.take() {
            info!(listeners = running.len(), "stopping forwards");
            running.abort_all();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn rules(&self) -> &[ForwardRule] {
        self.forwards.rules()
    }

    pub fn session(&self) -> &Arc<TunnelSession<C>> {
        &self.session
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.session.snapshot().await
    }
}

impl<C: Connector> Drop for Forwarder<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C: Connector> fmt::Debug for Forwarder<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("endpoint", &self.session.connector().endpoint())
            .field("rules", &self.forwards.rules())
            .field("running", &self.running.is_some())
            .finish_non_exhaustive()
    }
}

impl ForwarderBuilder {
    /// Add one forward rule.
    #[must_use]
    pub fn rule(mut self, rule: ForwardRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Add several forward rules.
    #[must_use]
    pub fn rules(mut self, rules: impl IntoIterator<Item = ForwardRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    /// Set what listeners do on bind and accept failures.
    ///
    /// Default: [`ExitProcess`]
    #[must_use]
    pub fn fatal_policy(mut self, policy: Arc<dyn FatalPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Build the forwarder around `connector`.
    ///
    /// # Errors
    ///
    /// Returns an error if a rule has an empty local address.
    pub fn build<C: Connector>(self, connector: C) -> Result<Forwarder<C>> {
        if let Some(rule) = self.rules.iter().find(|r| r.local_addr.trim().is_empty()) {
            return Err(TunnelError::Config(format!(
                "forward to {} has no local address",
                rule.remote
            )));
        }

        Ok(Forwarder {
            session: Arc::new(TunnelSession::new(connector)),
            forwards: ForwardSet::new(self.rules),
            policy: self.policy.unwrap_or_else(|| Arc::new(ExitProcess)),
            running: None,
        })
    }
}

impl fmt::Debug for ForwarderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwarderBuilder")
            .field("rules", &self.rules)
            .field("custom_policy", &self.policy.is_some())
            .finish()
    }
}
