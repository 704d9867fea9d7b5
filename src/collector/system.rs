//! System collectors.
//!
//! - [`IdentityCollector`]: `/system/identity`, always on
//! - [`ResourcesCollector`]: `/system/resource`, always on
//! - [`PackagesCollector`]: `/system/package`, `installed_packages` flag
//! - [`UsersCollector`]: `/user/active`, `user` flag
//! - [`PoeCollector`]: `/interface/ethernet/poe`, `poe` flag

mod identity;
mod packages;
mod poe;
mod resources;
mod users;

pub use identity::IdentityCollector;
pub use packages::PackagesCollector;
pub use poe::PoeCollector;
pub use resources::{ResourcesCollector, parse_uptime};
pub use users::UsersCollector;

use crate::collector::{Collector, CollectorRegistry};

/// Register the system collectors in their canonical order.
pub fn register_all(registry: &mut CollectorRegistry) {
    registry
        .register(|| Box::new(IdentityCollector::default()) as Box<dyn Collector>)
        .register(|| Box::new(ResourcesCollector::default()) as Box<dyn Collector>)
        .register(|| Box::new(PackagesCollector::default()) as Box<dyn Collector>)
        .register(|| Box::new(UsersCollector::default()) as Box<dyn Collector>)
        .register(|| Box::new(PoeCollector::default()) as Box<dyn Collector>);
}
