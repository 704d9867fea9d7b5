//! mktxp - RouterOS Metrics Exporter Library
//!
//! Polls MikroTik RouterOS devices on independent schedules and exposes
//! their operational metrics to Prometheus. The library holds the whole
//! polling core; the `mktxp` binary wires it to configuration files and an
//! HTTP listener.
//!
//! # Architecture
//!
//! - **Configuration**: INI loader, per-device profiles and template merge
//! - **Transport**: The device command seam plus a RouterOS API connector
//! - **Collectors**: Plugins that map command replies to gauges
//! - **Sessions**: Per-device connect, declare and poll lifecycle
//! - **Orchestrator**: Startup, one polling task per device, shutdown
//! - **Server**: `/metrics` exposition
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mktxp::{AppConfig, CollectorRegistry, Orchestrator, PollSettings, RouterOsConnector};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load_dir("./")?;
//! let orchestrator = Orchestrator::new(
//!     Arc::new(CollectorRegistry::with_system_collectors()),
//!     Arc::new(RouterOsConnector),
//!     prometheus::Registry::new(),
//!     PollSettings::from(&config.global),
//! );
//! let pollers = orchestrator.start(config.devices.enabled()).await;
//! // ... serve orchestrator.sink() ...
//! pollers.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod collector;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod server;
pub mod session;
pub mod transport;

pub use backoff::BackoffController;
pub use collector::{Collector, CollectorError, CollectorRegistry, DeviceIdentity};
pub use config::{AppConfig, ConfigError, DeviceProfile, DeviceSet, GlobalConfig, MetricGroup};
pub use error::DeviceError;
pub use orchestrator::{DevicePollers, Orchestrator, PollSettings, ShutdownReport};
pub use session::{DeviceSession, PollOutcome, SessionState};
pub use transport::{
    ConnectTarget, DeviceConnector, DeviceTransport, Record, RouterOsConnector, TransportError,
};
