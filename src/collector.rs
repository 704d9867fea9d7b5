//! Collector Layer
//!
//! Pluggable collectors that turn device command replies into gauges in a
//! shared `prometheus::Registry`. Each device gets its own collector
//! instances, so gauge handles are never shared between devices.
//!
//! # Architecture
//!
//! - [`Collector`]: Core trait for implementing metric collectors
//! - [`CollectorRegistry`]: Ordered, append-only list of collector factories
//! - [`DeviceIdentity`]: Constant labels that keep devices apart in the sink
//! - [`system`]: The shipped system collectors
//!
//! # Example
//!
//! ```rust,no_run
//! use mktxp::{CollectorRegistry, DeviceIdentity, DeviceProfile};
//!
//! let registry = CollectorRegistry::with_system_collectors();
//! let sink = prometheus::Registry::new();
//! let profile = DeviceProfile::new("core-rtr");
//! let identity = DeviceIdentity::from_profile(&profile);
//! let collectors = registry.declare_all(&profile, &identity, &sink).unwrap();
//! assert_eq!(collectors.len(), 4); // poe is off by default
//! ```

mod registry;
pub mod system;
mod traits;

pub use registry::{CollectorFactory, CollectorRegistry};
pub use traits::{
    ADDRESS_LABEL, Collector, CollectorError, DeviceIdentity, METRIC_NAMESPACE, NAME_LABEL, field,
    set_numeric,
};
