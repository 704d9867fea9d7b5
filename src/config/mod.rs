//! Configuration module for mktxp.
//!
//! Two INI files live in one directory:
//! - `_mktxp.conf`: the `[MKTXP]` section with process-wide settings
//! - `mktxp.conf`: one section per device, plus an optional `[default]`
//!   template merged into every other section

mod app;
mod device;
mod resolve;
mod validation;

pub use app::{AppConfig, GlobalConfig, load_devices, parse_devices};
pub use device::{DEFAULT_SECTION, DeviceProfile, MetricGroup, TlsMode};
pub use resolve::{DeviceSet, resolve, resolve_devices};
pub use validation::{
    ConfigError, expand_env_vars, parse_bool, parse_duration, parse_seconds_or_duration,
};

// Re-export constants
pub use app::{
    DEFAULT_LISTEN, DEFAULT_MAX_SCRAPE_DURATION, DEFAULT_MINIMAL_COLLECT_INTERVAL,
    DEVICES_CONFIG_FILE, GLOBAL_CONFIG_FILE, GLOBAL_SECTION,
};
pub use device::{DEFAULT_API_PORT, DEFAULT_API_SSL_PORT};
