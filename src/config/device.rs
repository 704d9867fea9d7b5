//! Per-device profile structures.
//!
//! Every scalar is an `Option` so that a key left out of a section can be
//! told apart from one explicitly set to `false`, `0` or an empty string.

use std::collections::BTreeMap;
use std::fmt;

use super::validation::{ConfigError, expand_env_vars, parse_bool};

// =============================================================================
// Constants
// =============================================================================

/// Reserved section name holding the template merged into every device.
pub const DEFAULT_SECTION: &str = "default";

/// Hostname used when neither the device nor the template sets one.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// Username used when neither the device nor the template sets one.
pub const DEFAULT_USERNAME: &str = "admin";

/// RouterOS API port (plain).
pub const DEFAULT_API_PORT: u16 = 8728;

/// RouterOS API port (TLS).
pub const DEFAULT_API_SSL_PORT: u16 = 8729;

// =============================================================================
// Metric groups
// =============================================================================

macro_rules! metric_groups {
    ($($variant:ident => $key:literal, $default:literal;)+) => {
        /// A switchable group of metrics.
        ///
        /// Each group owns its config key and the value an unset flag
        /// resolves to. The defaults are not uniform.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum MetricGroup {
            $($variant,)+
        }

        impl MetricGroup {
            /// All groups, in declaration order.
            pub const ALL: &'static [MetricGroup] = &[$(MetricGroup::$variant,)+];

            /// Config key for this group.
            pub fn key(self) -> &'static str {
                match self {
                    $(MetricGroup::$variant => $key,)+
                }
            }

            /// Value an unset flag resolves to.
            pub fn default_enabled(self) -> bool {
                match self {
                    $(MetricGroup::$variant => $default,)+
                }
            }

            /// Look up a group by its (lower-case) config key.
            pub fn from_key(key: &str) -> Option<Self> {
                match key {
                    $($key => Some(MetricGroup::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

metric_groups! {
    InstalledPackages => "installed_packages", true;
    Dhcp => "dhcp", true;
    DhcpLease => "dhcp_lease", true;
    Connections => "connections", true;
    ConnectionStats => "connection_stats", false;
    Interface => "interface", true;
    Route => "route", true;
    Pool => "pool", true;
    Firewall => "firewall", true;
    Neighbor => "neighbor", true;
    Dns => "dns", false;
    Ipv6Route => "ipv6_route", false;
    Ipv6Pool => "ipv6_pool", false;
    Ipv6Firewall => "ipv6_firewall", false;
    Ipv6Neighbor => "ipv6_neighbor", false;
    Poe => "poe", false;
    Monitor => "monitor", true;
    Netwatch => "netwatch", true;
    PublicIp => "public_ip", true;
    Wireless => "wireless", true;
    WirelessClients => "wireless_clients", true;
    Capsman => "capsman", true;
    CapsmanClients => "capsman_clients", true;
    Eoip => "eoip", false;
    Gre => "gre", false;
    Ipip => "ipip", false;
    Lte => "lte", false;
    Ipsec => "ipsec", false;
    SwitchPort => "switch_port", false;
    KidControlAssigned => "kid_control_assigned", false;
    KidControlDynamic => "kid_control_dynamic", false;
    User => "user", true;
    Queue => "queue", true;
    Bgp => "bgp", false;
    RoutingStats => "routing_stats", false;
    Certificate => "certificate", false;
}

impl fmt::Display for MetricGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// =============================================================================
// Device profile
// =============================================================================

/// TLS mode derived from a resolved profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain TCP.
    Disabled,
    /// TLS with certificate and hostname verification.
    Verified,
    /// TLS that accepts any certificate.
    Unverified,
}

/// Configuration for one device, either raw (as parsed) or resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Section name; unique across the file.
    pub name: String,

    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub enabled: Option<bool>,

    pub use_ssl: Option<bool>,
    pub no_ssl_certificate: Option<bool>,
    pub ssl_certificate_verify: Option<bool>,
    pub plaintext_login: Option<bool>,

    /// Explicitly set metric flags. A missing group is "unset".
    pub metrics: BTreeMap<MetricGroup, bool>,

    pub remote_dhcp_entry: Option<String>,
    pub remote_capsman_entry: Option<String>,

    pub use_comments_over_names: Option<bool>,
    pub check_for_updates: Option<bool>,
}

impl DeviceProfile {
    /// Create an empty profile with every field unset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Build a profile from the key/value pairs of one INI section.
    ///
    /// Keys are matched case-insensitively. Unknown keys are rejected.
    pub fn from_section<'a>(
        name: &str,
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ConfigError> {
        let mut profile = Self::new(name);
        for (key, value) in entries {
            profile.set(name, &key.trim().to_ascii_lowercase(), value.trim())?;
        }
        Ok(profile)
    }

    fn set(&mut self, section: &str, key: &str, value: &str) -> Result<(), ConfigError> {
        let flag = |value: &str| {
            parse_bool(value).map_err(|reason| ConfigError::invalid(section, key, value, reason))
        };

        match key {
            "hostname" => self.hostname = Some(value.to_string()),
            "port" => {
                let port = value
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| {
                        ConfigError::invalid(section, key, value, "expected a port in 1-65535")
                    })?;
                self.port = Some(port);
            }
            "username" => self.username = Some(value.to_string()),
            "password" => self.password = Some(expand_env_vars(value)),
            "enabled" => self.enabled = Some(flag(value)?),
            "use_ssl" => self.use_ssl = Some(flag(value)?),
            "no_ssl_certificate" => self.no_ssl_certificate = Some(flag(value)?),
            "ssl_certificate_verify" => self.ssl_certificate_verify = Some(flag(value)?),
            "plaintext_login" => self.plaintext_login = Some(flag(value)?),
            "remote_dhcp_entry" => self.remote_dhcp_entry = Some(value.to_string()),
            "remote_capsman_entry" => self.remote_capsman_entry = Some(value.to_string()),
            "use_comments_over_names" => self.use_comments_over_names = Some(flag(value)?),
            "check_for_updates" => self.check_for_updates = Some(flag(value)?),
            other => match MetricGroup::from_key(other) {
                Some(group) => {
                    self.metrics.insert(group, flag(value)?);
                }
                None => {
                    return Err(ConfigError::UnknownKey {
                        section: section.to_string(),
                        key: other.to_string(),
                    });
                }
            },
        }
        Ok(())
    }

    // --- Effective values (after resolution) ---

    /// Whether this device should be scheduled.
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Whether a metric group is enabled, falling back to the per-group default.
    pub fn metric_enabled(&self, group: MetricGroup) -> bool {
        self.metrics
            .get(&group)
            .copied()
            .unwrap_or_else(|| group.default_enabled())
    }

    pub fn effective_hostname(&self) -> &str {
        self.hostname.as_deref().unwrap_or(DEFAULT_HOSTNAME)
    }

    pub fn effective_username(&self) -> &str {
        self.username.as_deref().unwrap_or(DEFAULT_USERNAME)
    }

    pub fn effective_password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.use_ssl.unwrap_or(false) {
            DEFAULT_API_SSL_PORT
        } else {
            DEFAULT_API_PORT
        })
    }

    /// TLS settings for the connection.
    pub fn tls_mode(&self) -> TlsMode {
        if !self.use_ssl.unwrap_or(false) {
            return TlsMode::Disabled;
        }
        let verify = self.ssl_certificate_verify.unwrap_or(true)
            && !self.no_ssl_certificate.unwrap_or(false);
        if verify {
            TlsMode::Verified
        } else {
            TlsMode::Unverified
        }
    }

    pub fn use_comments_over_names(&self) -> bool {
        self.use_comments_over_names.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_group_table_size_and_keys_unique() {
        assert_eq!(MetricGroup::ALL.len(), 36);
        let mut keys: Vec<_> = MetricGroup::ALL.iter().map(|g| g.key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 36);
        for group in MetricGroup::ALL {
            assert_eq!(MetricGroup::from_key(group.key()), Some(*group));
        }
    }

    #[test]
    fn test_defaults_are_per_metric() {
        assert!(!MetricGroup::Poe.default_enabled());
        assert!(MetricGroup::User.default_enabled());
        assert!(MetricGroup::InstalledPackages.default_enabled());
        assert!(!MetricGroup::Bgp.default_enabled());
        assert!(!MetricGroup::Dns.default_enabled());
        assert!(MetricGroup::Interface.default_enabled());
    }

    #[test]
    fn test_from_section_parses_known_keys() {
        let profile = DeviceProfile::from_section(
            "core-router",
            [
                ("Hostname", "10.0.0.1"),
                ("PORT", "8729"),
                ("username", "monitor"),
                ("use_ssl", "True"),
                ("poe", "yes"),
                ("user", "false"),
            ],
        )
        .unwrap();

        assert_eq!(profile.name, "core-router");
        assert_eq!(profile.hostname.as_deref(), Some("10.0.0.1"));
        assert_eq!(profile.port, Some(8729));
        assert_eq!(profile.username.as_deref(), Some("monitor"));
        assert_eq!(profile.use_ssl, Some(true));
        assert_eq!(profile.metrics.get(&MetricGroup::Poe), Some(&true));
        assert_eq!(profile.metrics.get(&MetricGroup::User), Some(&false));
        assert!(profile.password.is_none());
    }

    #[test]
    fn test_from_section_rejects_unknown_key() {
        let err = DeviceProfile::from_section("r1", [("hostnme", "10.0.0.1")]).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownKey { ref key, .. } if key == "hostnme"));
    }

    #[test]
    fn test_from_section_rejects_bad_values() {
        let err = DeviceProfile::from_section("r1", [("port", "0")]).unwrap_err();
        assert!(err.to_string().contains("port"));

        let err = DeviceProfile::from_section("r1", [("poe", "sometimes")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_empty_string_is_an_explicit_value() {
        let profile = DeviceProfile::from_section("r1", [("password", "")]).unwrap();
        assert_eq!(profile.password.as_deref(), Some(""));
    }

    #[test]
    fn test_effective_defaults() {
        let profile = DeviceProfile::new("r1");
        assert!(profile.is_enabled());
        assert_eq!(profile.effective_hostname(), DEFAULT_HOSTNAME);
        assert_eq!(profile.effective_username(), DEFAULT_USERNAME);
        assert_eq!(profile.effective_password(), "");
        assert_eq!(profile.effective_port(), DEFAULT_API_PORT);
        assert_eq!(profile.tls_mode(), TlsMode::Disabled);
        assert!(!profile.metric_enabled(MetricGroup::Poe));
        assert!(profile.metric_enabled(MetricGroup::User));
    }

    #[test]
    fn test_tls_mode() {
        let mut profile = DeviceProfile::new("r1");
        profile.use_ssl = Some(true);
        assert_eq!(profile.effective_port(), DEFAULT_API_SSL_PORT);
        assert_eq!(profile.tls_mode(), TlsMode::Verified);

        profile.ssl_certificate_verify = Some(false);
        assert_eq!(profile.tls_mode(), TlsMode::Unverified);

        profile.ssl_certificate_verify = Some(true);
        profile.no_ssl_certificate = Some(true);
        assert_eq!(profile.tls_mode(), TlsMode::Unverified);
    }
}
