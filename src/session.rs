//! Per-device session lifecycle.
//!
//! ```text
//! Uninitialized -> Connected -> Declared -> Idle <-> Collecting -> Closed
//! ```
//!
//! A session owns its transport, its resolved profile and the collector
//! instances declared for it. Nothing in it is shared with other devices.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio::time::Instant;

use crate::backoff::BackoffController;
use crate::collector::{Collector, CollectorRegistry, DeviceIdentity};
use crate::config::DeviceProfile;
use crate::error::DeviceError;
use crate::transport::{ConnectTarget, DeviceConnector, DeviceTransport};

/// Lifecycle state of a [`DeviceSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Connected,
    Declared,
    Idle,
    Collecting,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Connected => "connected",
            Self::Declared => "declared",
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What one scheduled tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Collected,
    /// Disconnected and still inside the backoff window.
    BackingOff,
}

/// One device: its connection, profile and declared collectors.
pub struct DeviceSession {
    profile: DeviceProfile,
    identity: DeviceIdentity,
    connector: Arc<dyn DeviceConnector>,
    socket_timeout: Duration,
    transport: Option<Box<dyn DeviceTransport>>,
    collectors: Vec<Box<dyn Collector>>,
    state: SessionState,
    backoff: BackoffController,
}

impl DeviceSession {
    pub fn new(
        profile: DeviceProfile,
        connector: Arc<dyn DeviceConnector>,
        socket_timeout: Duration,
        backoff: BackoffController,
    ) -> Self {
        let identity = DeviceIdentity::from_profile(&profile);
        Self {
            profile,
            identity,
            connector,
            socket_timeout,
            transport: None,
            collectors: Vec::new(),
            state: SessionState::Uninitialized,
            backoff,
        }
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Names of the declared collectors, in run order.
    pub fn collectors(&self) -> Vec<&'static str> {
        self.collectors.iter().map(|c| c.name()).collect()
    }

    fn invalid_state(&self, operation: &'static str) -> DeviceError {
        DeviceError::InvalidState {
            device: self.profile.name.clone(),
            operation,
            state: self.state,
        }
    }

    async fn connect(&mut self) -> Result<(), DeviceError> {
        let target = ConnectTarget::from_profile(&self.profile, self.socket_timeout);
        let transport = self
            .connector
            .connect(&target)
            .await
            .map_err(|source| DeviceError::Connect {
                device: self.profile.name.clone(),
                source,
            })?;
        self.transport = Some(transport);
        Ok(())
    }

    /// Open the connection.
    ///
    /// # Errors
    /// A failed connect closes the session for good; it is not retried.
    pub async fn open(&mut self) -> Result<(), DeviceError> {
        if self.state != SessionState::Uninitialized {
            return Err(self.invalid_state("open"));
        }
        match self.connect().await {
            Ok(()) => {
                self.state = SessionState::Connected;
                tracing::debug!(
                    device = %self.profile.name,
                    address = %self.identity.address,
                    "Connected"
                );
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Closed;
                Err(e)
            }
        }
    }

    /// Declare every collector enabled for this device.
    pub fn declare(
        &mut self,
        registry: &CollectorRegistry,
        sink: &Registry,
    ) -> Result<(), DeviceError> {
        if self.state != SessionState::Connected {
            return Err(self.invalid_state("declare"));
        }
        self.collectors = registry.declare_all(&self.profile, &self.identity, sink)?;
        self.state = SessionState::Declared;
        tracing::debug!(
            device = %self.profile.name,
            collectors = ?self.collectors(),
            "Collectors declared"
        );
        Ok(())
    }

    /// Run every declared collector once, bounded by `budget`.
    pub async fn collect_once(&mut self, budget: Duration) -> Result<(), DeviceError> {
        if !matches!(self.state, SessionState::Declared | SessionState::Idle) {
            return Err(self.invalid_state("collect"));
        }
        let Some(transport) = self.transport.as_deref_mut() else {
            return Err(DeviceError::NotConnected {
                device: self.profile.name.clone(),
            });
        };

        self.state = SessionState::Collecting;
        let result = tokio::time::timeout(
            budget,
            CollectorRegistry::collect_all(&self.collectors, transport, &self.profile),
        )
        .await;
        self.state = SessionState::Idle;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(DeviceError::ScrapeTimeout {
                device: self.profile.name.clone(),
                budget,
            }),
        }
    }

    /// One scheduled tick.
    ///
    /// When disconnected, reconnects once the backoff window has passed. A
    /// failure that leaves the link unusable drops the connection; declared
    /// gauges are kept for the next connection.
    pub async fn poll(&mut self, budget: Duration) -> Result<PollOutcome, DeviceError> {
        if !matches!(self.state, SessionState::Declared | SessionState::Idle) {
            return Err(self.invalid_state("poll"));
        }
        if self.transport.is_none() {
            let now = Instant::now();
            if !self.backoff.should_retry(now) {
                return Ok(PollOutcome::BackingOff);
            }
            if let Err(e) = self.connect().await {
                self.backoff.mark_failure(now);
                tracing::debug!(
                    device = %self.profile.name,
                    failures = self.backoff.failures(),
                    next_delay = ?self.backoff.current_delay(),
                    "Reconnect failed"
                );
                return Err(e);
            }
            self.backoff.mark_success();
            tracing::info!(device = %self.profile.name, "Reconnected");
        }

        match self.collect_once(budget).await {
            Ok(()) => Ok(PollOutcome::Collected),
            Err(e) => {
                if e.is_connection_loss() {
                    self.drop_connection().await;
                    self.backoff.mark_failure(Instant::now());
                }
                Err(e)
            }
        }
    }

    async fn drop_connection(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
            tracing::debug!(device = %self.profile.name, "Connection dropped");
        }
    }

    /// Release the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        self.drop_connection().await;
        self.state = SessionState::Closed;
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("name", &self.profile.name)
            .field("state", &self.state)
            .field("connected", &self.transport.is_some())
            .field("collectors", &self.collectors())
            .finish_non_exhaustive()
    }
}
