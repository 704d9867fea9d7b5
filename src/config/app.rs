//! Application configuration structures.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::{Ini, ParseOption};

use super::device::DeviceProfile;
use super::resolve::DeviceSet;
use super::validation::{ConfigError, parse_bool, parse_seconds_or_duration};

// =============================================================================
// Constants
// =============================================================================

/// File holding the `[MKTXP]` global section.
pub const GLOBAL_CONFIG_FILE: &str = "_mktxp.conf";

/// File holding one section per device.
pub const DEVICES_CONFIG_FILE: &str = "mktxp.conf";

/// Name of the global section.
pub const GLOBAL_SECTION: &str = "MKTXP";

/// Default exposition address.
pub const DEFAULT_LISTEN: &str = "0.0.0.0:49090";

/// Default socket timeout (5 seconds).
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(5);

/// Default first reconnect delay (120 seconds).
pub const DEFAULT_INITIAL_DELAY_ON_FAILURE: Duration = Duration::from_secs(120);

/// Default reconnect delay ceiling (900 seconds).
pub const DEFAULT_MAX_DELAY_ON_FAILURE: Duration = Duration::from_secs(900);

/// Default reconnect delay divisor.
pub const DEFAULT_DELAY_INC_DIV: u32 = 5;

/// Default bandwidth test interval (600 seconds).
pub const DEFAULT_BANDWIDTH_TEST_INTERVAL: Duration = Duration::from_secs(600);

/// Default poll tick (5 seconds).
pub const DEFAULT_MINIMAL_COLLECT_INTERVAL: Duration = Duration::from_secs(5);

/// Default parallel startup bound.
pub const DEFAULT_MAX_WORKER_THREADS: usize = 5;

/// Default per-device collect deadline (30 seconds).
pub const DEFAULT_MAX_SCRAPE_DURATION: Duration = Duration::from_secs(30);

/// Default deadline for the whole startup phase (90 seconds).
pub const DEFAULT_TOTAL_MAX_SCRAPE_DURATION: Duration = Duration::from_secs(90);

fn ini_options() -> ParseOption {
    // Passwords may contain backslashes; keep values verbatim.
    ParseOption {
        enabled_escape: false,
        ..Default::default()
    }
}

fn load_ini(path: &Path) -> Result<Ini, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(Ini::load_from_str_opt(&content, ini_options())?)
}

// =============================================================================
// Global Configuration
// =============================================================================

/// Process-wide operational parameters, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    /// Exposition listen address (default: "0.0.0.0:49090").
    pub listen: String,
    /// Connect and per-reply read timeout for device sockets.
    pub socket_timeout: Duration,
    /// First delay before reconnecting a device that lost its link.
    pub initial_delay_on_failure: Duration,
    /// Ceiling for the reconnect delay.
    pub max_delay_on_failure: Duration,
    /// Each failed reconnect grows the delay by `initial / delay_inc_div`.
    pub delay_inc_div: u32,
    pub bandwidth: bool,
    pub bandwidth_test_interval: Duration,
    /// Poll tick for every device.
    pub minimal_collect_interval: Duration,
    /// Enables debug-level logging.
    pub verbose_mode: bool,
    /// Start devices concurrently instead of one after another.
    pub fetch_routers_in_parallel: bool,
    /// Concurrency bound for parallel startup.
    pub max_worker_threads: usize,
    /// Deadline for one device's collect tick.
    pub max_scrape_duration: Duration,
    /// Deadline for the whole startup phase.
    pub total_max_scrape_duration: Duration,
    pub compact_default_conf_values: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            initial_delay_on_failure: DEFAULT_INITIAL_DELAY_ON_FAILURE,
            max_delay_on_failure: DEFAULT_MAX_DELAY_ON_FAILURE,
            delay_inc_div: DEFAULT_DELAY_INC_DIV,
            bandwidth: false,
            bandwidth_test_interval: DEFAULT_BANDWIDTH_TEST_INTERVAL,
            minimal_collect_interval: DEFAULT_MINIMAL_COLLECT_INTERVAL,
            verbose_mode: false,
            fetch_routers_in_parallel: false,
            max_worker_threads: DEFAULT_MAX_WORKER_THREADS,
            max_scrape_duration: DEFAULT_MAX_SCRAPE_DURATION,
            total_max_scrape_duration: DEFAULT_TOTAL_MAX_SCRAPE_DURATION,
            compact_default_conf_values: false,
        }
    }
}

impl GlobalConfig {
    /// Load the `[MKTXP]` section from a file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let ini = load_ini(path.as_ref())?;
        Self::from_ini(&ini)
    }

    /// Parse from INI text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str_opt(content, ini_options())?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let section = ini
            .section(Some(GLOBAL_SECTION))
            .ok_or_else(|| ConfigError::MissingSection(GLOBAL_SECTION.to_string()))?;

        let mut config = Self::default();
        for (key, value) in section.iter() {
            config.set(&key.trim().to_ascii_lowercase(), value.trim())?;
        }
        config.validate()?;
        Ok(config)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::invalid(GLOBAL_SECTION, key, value, reason);
        let duration = |value: &str| parse_seconds_or_duration(value).map_err(invalid);
        let flag = |value: &str| parse_bool(value).map_err(invalid);
        let count = |value: &str| {
            value
                .parse::<usize>()
                .map_err(|e| ConfigError::invalid(GLOBAL_SECTION, key, value, e.to_string()))
        };

        match key {
            "listen" => self.listen = value.to_string(),
            "socket_timeout" => self.socket_timeout = duration(value)?,
            "initial_delay_on_failure" => self.initial_delay_on_failure = duration(value)?,
            "max_delay_on_failure" => self.max_delay_on_failure = duration(value)?,
            "delay_inc_div" => {
                self.delay_inc_div = u32::try_from(count(value)?).map_err(|e| {
                    ConfigError::invalid(GLOBAL_SECTION, key, value, e.to_string())
                })?
            }
            "bandwidth" => self.bandwidth = flag(value)?,
            "bandwidth_test_interval" => self.bandwidth_test_interval = duration(value)?,
            "minimal_collect_interval" => self.minimal_collect_interval = duration(value)?,
            "verbose_mode" => self.verbose_mode = flag(value)?,
            "fetch_routers_in_parallel" => self.fetch_routers_in_parallel = flag(value)?,
            "max_worker_threads" => self.max_worker_threads = count(value)?,
            "max_scrape_duration" => self.max_scrape_duration = duration(value)?,
            "total_max_scrape_duration" => self.total_max_scrape_duration = duration(value)?,
            "compact_default_conf_values" => self.compact_default_conf_values = flag(value)?,
            other => {
                return Err(ConfigError::UnknownKey {
                    section: GLOBAL_SECTION.to_string(),
                    key: other.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        for (name, value) in [
            ("socket_timeout", self.socket_timeout),
            ("initial_delay_on_failure", self.initial_delay_on_failure),
            ("max_delay_on_failure", self.max_delay_on_failure),
            ("bandwidth_test_interval", self.bandwidth_test_interval),
            ("minimal_collect_interval", self.minimal_collect_interval),
            ("max_scrape_duration", self.max_scrape_duration),
            ("total_max_scrape_duration", self.total_max_scrape_duration),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be positive"
                )));
            }
        }

        if self.initial_delay_on_failure > self.max_delay_on_failure {
            return Err(ConfigError::ValidationError(
                "initial_delay_on_failure must not exceed max_delay_on_failure".to_string(),
            ));
        }

        if self.delay_inc_div == 0 {
            return Err(ConfigError::ValidationError(
                "delay_inc_div must be positive".to_string(),
            ));
        }

        if self.max_worker_threads == 0 {
            return Err(ConfigError::ValidationError(
                "max_worker_threads must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse::<SocketAddr>().map_err(|_| {
            ConfigError::ValidationError(format!("invalid listen address: '{}'", self.listen))
        })
    }
}

// =============================================================================
// Device instances
// =============================================================================

/// Parse the instances file into a [`DeviceSet`].
///
/// Keys outside of any section are rejected rather than ignored.
pub fn parse_devices(content: &str) -> Result<DeviceSet, ConfigError> {
    let ini = Ini::load_from_str_opt(content, ini_options())?;
    let mut sections = Vec::new();

    for (name, properties) in ini.iter() {
        match name {
            Some(name) => sections.push(DeviceProfile::from_section(name, properties.iter())?),
            None => {
                if let Some((key, _)) = properties.iter().next() {
                    return Err(ConfigError::UnknownKey {
                        section: "<none>".to_string(),
                        key: key.to_string(),
                    });
                }
            }
        }
    }

    DeviceSet::from_sections(sections)
}

/// Load the instances file from disk.
pub fn load_devices(path: impl AsRef<Path>) -> Result<DeviceSet, ConfigError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_devices(&content)
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Both configuration files, loaded from one directory.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub global: GlobalConfig,
    pub devices: DeviceSet,
}

impl AppConfig {
    /// Load `_mktxp.conf` and `mktxp.conf` from `dir`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let global = GlobalConfig::load(config_path(dir, GLOBAL_CONFIG_FILE))?;
        let devices = load_devices(config_path(dir, DEVICES_CONFIG_FILE))?;
        Ok(Self { global, devices })
    }
}

fn config_path(dir: &Path, file: &str) -> PathBuf {
    dir.join(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetricGroup;

    #[test]
    fn test_global_config_default() {
        let config = GlobalConfig::default();
        assert_eq!(config.listen, "0.0.0.0:49090");
        assert_eq!(config.socket_timeout, Duration::from_secs(5));
        assert_eq!(config.initial_delay_on_failure, Duration::from_secs(120));
        assert_eq!(config.max_delay_on_failure, Duration::from_secs(900));
        assert_eq!(config.delay_inc_div, 5);
        assert!(!config.bandwidth);
        assert_eq!(config.bandwidth_test_interval, Duration::from_secs(600));
        assert_eq!(config.minimal_collect_interval, Duration::from_secs(5));
        assert!(!config.verbose_mode);
        assert!(!config.fetch_routers_in_parallel);
        assert_eq!(config.max_worker_threads, 5);
        assert_eq!(config.max_scrape_duration, Duration::from_secs(30));
        assert_eq!(config.total_max_scrape_duration, Duration::from_secs(90));
        assert!(!config.compact_default_conf_values);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_global_config_parse_overrides() {
        let config = GlobalConfig::parse(
            r#"
[MKTXP]
Listen = 127.0.0.1:9436
socket_timeout = 2
minimal_collect_interval = 15s
max_scrape_duration = 1m
verbose_mode = True
fetch_routers_in_parallel = yes
max_worker_threads = 8
"#,
        )
        .unwrap();

        assert_eq!(config.listen, "127.0.0.1:9436");
        assert_eq!(config.socket_timeout, Duration::from_secs(2));
        assert_eq!(config.minimal_collect_interval, Duration::from_secs(15));
        assert_eq!(config.max_scrape_duration, Duration::from_secs(60));
        assert!(config.verbose_mode);
        assert!(config.fetch_routers_in_parallel);
        assert_eq!(config.max_worker_threads, 8);
        // untouched keys keep defaults
        assert_eq!(config.delay_inc_div, DEFAULT_DELAY_INC_DIV);
    }

    #[test]
    fn test_global_config_missing_section() {
        let err = GlobalConfig::parse("[other]\nlisten = 0.0.0.0:1\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection(_)));
    }

    #[test]
    fn test_global_config_unknown_key() {
        let err = GlobalConfig::parse("[MKTXP]\nlisen = 0.0.0.0:1\n").unwrap_err();
        assert!(err.to_string().contains("lisen"));
    }

    #[test]
    fn test_global_config_validation_invalid_listen() {
        let err = GlobalConfig::parse("[MKTXP]\nlisten = not-an-addr\n").unwrap_err();
        assert!(err.to_string().contains("invalid listen address"));
    }

    #[test]
    fn test_global_config_validation_delays() {
        let config = GlobalConfig {
            initial_delay_on_failure: Duration::from_secs(1000),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GlobalConfig {
            delay_inc_div: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = GlobalConfig {
            minimal_collect_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_devices_merges_template() {
        let devices = parse_devices(
            r#"
[default]
username = admin
port = 8729
poe = false

[core-router]
hostname = 10.0.0.1

[lab]
hostname = 10.0.0.9
enabled = false
"#,
        )
        .unwrap();

        let enabled = devices.enabled();
        assert_eq!(enabled.len(), 1);
        let core = &enabled[0];
        assert_eq!(core.name, "core-router");
        assert_eq!(core.username.as_deref(), Some("admin"));
        assert_eq!(core.port, Some(8729));
        assert!(!core.metric_enabled(MetricGroup::Poe));
        assert!(core.metric_enabled(MetricGroup::User));
    }

    #[test]
    fn test_parse_devices_keeps_backslashes_in_values() {
        let devices = parse_devices("[r1]\npassword = a\\b\n").unwrap();
        assert_eq!(devices.enabled()[0].password.as_deref(), Some("a\\b"));
    }

    #[test]
    fn test_parse_devices_rejects_unknown_key() {
        let err = parse_devices("[r1]\nhostname = 1.2.3.4\ncolour = blue\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { ref key, .. } if key == "colour"));
    }

    #[test]
    fn test_parse_devices_rejects_sectionless_keys() {
        let err = parse_devices("hostname = 1.2.3.4\n[r1]\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { .. }));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(GLOBAL_CONFIG_FILE),
            "[MKTXP]\nminimal_collect_interval = 10\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join(DEVICES_CONFIG_FILE),
            "[default]\nusername = admin\n\n[r1]\nhostname = 192.168.88.1\n",
        )
        .unwrap();

        let config = AppConfig::load_dir(dir.path()).unwrap();
        assert_eq!(
            config.global.minimal_collect_interval,
            Duration::from_secs(10)
        );
        assert_eq!(config.devices.len(), 1);
        assert_eq!(
            config.devices.enabled()[0].username.as_deref(),
            Some("admin")
        );
    }

    #[test]
    fn test_load_dir_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
