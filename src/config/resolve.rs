//! Template merging for device profiles.

use std::collections::BTreeSet;

use super::device::{DEFAULT_SECTION, DeviceProfile};
use super::validation::ConfigError;

/// Merge a template into an instance profile.
///
/// Any field the instance sets explicitly wins; every unset field is taken
/// from the template. Neither input is modified and the result depends only
/// on the two profiles, so resolving an already-resolved profile against the
/// same template is a no-op.
pub fn resolve(template: &DeviceProfile, instance: &DeviceProfile) -> DeviceProfile {
    fn pick<T: Clone>(own: &Option<T>, template: &Option<T>) -> Option<T> {
        own.clone().or_else(|| template.clone())
    }

    let mut metrics = template.metrics.clone();
    metrics.extend(instance.metrics.iter().map(|(g, v)| (*g, *v)));

    DeviceProfile {
        name: instance.name.clone(),
        hostname: pick(&instance.hostname, &template.hostname),
        port: pick(&instance.port, &template.port),
        username: pick(&instance.username, &template.username),
        password: pick(&instance.password, &template.password),
        enabled: pick(&instance.enabled, &template.enabled),
        use_ssl: pick(&instance.use_ssl, &template.use_ssl),
        no_ssl_certificate: pick(&instance.no_ssl_certificate, &template.no_ssl_certificate),
        ssl_certificate_verify: pick(
            &instance.ssl_certificate_verify,
            &template.ssl_certificate_verify,
        ),
        plaintext_login: pick(&instance.plaintext_login, &template.plaintext_login),
        metrics,
        remote_dhcp_entry: pick(&instance.remote_dhcp_entry, &template.remote_dhcp_entry),
        remote_capsman_entry: pick(
            &instance.remote_capsman_entry,
            &template.remote_capsman_entry,
        ),
        use_comments_over_names: pick(
            &instance.use_comments_over_names,
            &template.use_comments_over_names,
        ),
        check_for_updates: pick(&instance.check_for_updates, &template.check_for_updates),
    }
}

/// Resolve raw device sections into the set to schedule.
///
/// Drops the template section and disabled devices; sorted by name.
pub fn resolve_devices(
    sections: impl IntoIterator<Item = DeviceProfile>,
) -> Result<Vec<DeviceProfile>, ConfigError> {
    Ok(DeviceSet::from_sections(sections)?.enabled())
}

/// The parsed device sections of one instances file.
///
/// The reserved `default` section is split off as the template on
/// construction and never appears among the devices.
#[derive(Debug, Clone, Default)]
pub struct DeviceSet {
    template: Option<DeviceProfile>,
    devices: Vec<DeviceProfile>,
}

impl DeviceSet {
    /// Build a set from raw sections, rejecting duplicate names.
    pub fn from_sections(
        sections: impl IntoIterator<Item = DeviceProfile>,
    ) -> Result<Self, ConfigError> {
        let mut seen = BTreeSet::new();
        let mut set = Self::default();

        for section in sections {
            if !seen.insert(section.name.clone()) {
                return Err(ConfigError::DuplicateSection(section.name));
            }
            if section.name == DEFAULT_SECTION {
                set.template = Some(section);
            } else {
                set.devices.push(section);
            }
        }

        set.devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(set)
    }

    /// The template section, if the file has one.
    pub fn template(&self) -> Option<&DeviceProfile> {
        self.template.as_ref()
    }

    /// Number of device sections (template excluded).
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Every device section merged with the template, sorted by name.
    pub fn resolved(&self) -> Vec<DeviceProfile> {
        self.devices
            .iter()
            .map(|device| match &self.template {
                Some(template) => resolve(template, device),
                None => device.clone(),
            })
            .collect()
    }

    /// Resolved devices that should be scheduled.
    pub fn enabled(&self) -> Vec<DeviceProfile> {
        self.resolved()
            .into_iter()
            .filter(DeviceProfile::is_enabled)
            .collect()
    }
}
