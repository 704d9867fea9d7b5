//! Core collector traits and types.

use prometheus::{GaugeVec, Opts, Registry};
use thiserror::Error;

use crate::config::DeviceProfile;
use crate::transport::{DeviceTransport, Record, TransportError};

/// Namespace prefixed to every metric name.
pub const METRIC_NAMESPACE: &str = "mktxp";

/// Constant label carrying the device address.
pub const ADDRESS_LABEL: &str = "routerboard_address";

/// Constant label carrying the device name.
pub const NAME_LABEL: &str = "routerboard_name";

/// Errors that can occur during collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Command failed on the device or the link broke.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Metric update rejected by the sink.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// A reply record lacks a field the collector needs.
    #[error("missing '{field}' in {command} reply")]
    MissingField {
        command: &'static str,
        field: &'static str,
    },

    /// `collect` called before `declare`.
    #[error("collector '{0}' was not declared")]
    NotDeclared(&'static str),
}

impl CollectorError {
    /// Whether the device link has to be re-established.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_connection_loss())
    }
}

/// Identity attached to every metric family a device declares.
///
/// Two devices never collide on metric identity because their constant
/// label values differ while names and label schemas match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Section name of the device.
    pub name: String,
    /// Hostname or address the device is polled at.
    pub address: String,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Identity of a resolved profile.
    pub fn from_profile(profile: &DeviceProfile) -> Self {
        Self::new(profile.name.clone(), profile.effective_hostname())
    }

    /// Gauge options with namespace and constant labels applied.
    pub fn opts(&self, name: &str, help: &str) -> Opts {
        Opts::new(name, help)
            .namespace(METRIC_NAMESPACE)
            .const_label(ADDRESS_LABEL, self.address.as_str())
            .const_label(NAME_LABEL, self.name.as_str())
    }

    /// Create a gauge family for this device and register it with the sink.
    ///
    /// # Errors
    /// Fails if the sink already holds a family with the same identity.
    pub fn register_gauge(
        &self,
        sink: &Registry,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<GaugeVec, prometheus::Error> {
        let gauge = GaugeVec::new(self.opts(name, help), labels)?;
        sink.register(Box::new(gauge.clone()))?;
        Ok(gauge)
    }
}

/// Core collector trait: one plugin for one metric family group.
///
/// A fresh instance is built for every device, so gauge handles created in
/// [`declare`](Collector::declare) belong to that device alone.
///
/// # Error Handling
///
/// `collect` returns the first failure it meets. Values already set during
/// the same call stay in the sink; nothing is rolled back.
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Short name used in logs and errors (e.g., `"poe"`).
    fn name(&self) -> &'static str;

    /// Whether this collector runs for the given resolved profile.
    fn is_enabled(&self, profile: &DeviceProfile) -> bool;

    /// Register this collector's metric families with the sink.
    fn declare(
        &mut self,
        sink: &Registry,
        identity: &DeviceIdentity,
    ) -> Result<(), prometheus::Error>;

    /// Perform one collection cycle against the device.
    async fn collect(
        &self,
        transport: &mut dyn DeviceTransport,
        profile: &DeviceProfile,
    ) -> Result<(), CollectorError>;
}

/// Field value from a reply record, empty when absent.
pub fn field<'a>(record: &'a Record, key: &str) -> &'a str {
    record.get(key).map(String::as_str).unwrap_or("")
}

/// Set a gauge from a numeric record field; unparseable values are skipped.
pub fn set_numeric(gauge: &GaugeVec, labels: &[&str], record: &Record, key: &str) {
    if let Some(value) = record.get(key).and_then(|v| v.trim().parse::<f64>().ok()) {
        gauge.with_label_values(labels).set(value);
    }
}
