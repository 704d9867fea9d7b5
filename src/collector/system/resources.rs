use prometheus::{GaugeVec, Registry};

use crate::collector::{Collector, CollectorError, DeviceIdentity, field, set_numeric};
use crate::config::DeviceProfile;
use crate::transport::DeviceTransport;

const COMMAND: &str = "/system/resource/print";
const PROPLIST: &str = "=.proplist=uptime,free-memory,total-memory,free-hdd-space,\
total-hdd-space,cpu-load,cpu-count,cpu-frequency,architecture-name,board-name,cpu,version";
const LABELS: [&str; 4] = ["architecture_name", "board_name", "cpu", "version"];

/// (metric name, record field, help)
const GAUGES: [(&str, &str, &str); 7] = [
    ("system_free_memory", "free-memory", "Free memory available on the router (in bytes)."),
    ("system_total_memory", "total-memory", "Total memory on the router (in bytes)."),
    (
        "system_free_hdd_space",
        "free-hdd-space",
        "Free HDD space available on the router (in bytes).",
    ),
    ("system_total_hdd_space", "total-hdd-space", "Total HDD space on the router (in bytes)."),
    ("system_cpu_load", "cpu-load", "CPU load on the router (percentage)."),
    ("system_cpu_count", "cpu-count", "Number of available CPU cores."),
    ("system_cpu_frequency", "cpu-frequency", "CPU frequency in MHz."),
];

/// Memory, disk, CPU and uptime gauges from `/system/resource`.
#[derive(Debug, Default)]
pub struct ResourcesCollector {
    gauges: Vec<(&'static str, GaugeVec)>,
    uptime: Option<GaugeVec>,
}

#[async_trait::async_trait]
impl Collector for ResourcesCollector {
    fn name(&self) -> &'static str {
        "resources"
    }

    fn is_enabled(&self, _profile: &DeviceProfile) -> bool {
        true
    }

    fn declare(
        &mut self,
        sink: &Registry,
        identity: &DeviceIdentity,
    ) -> Result<(), prometheus::Error> {
        let mut gauges = Vec::with_capacity(GAUGES.len());
        for (metric, key, help) in GAUGES {
            gauges.push((key, identity.register_gauge(sink, metric, help, &LABELS)?));
        }
        self.uptime = Some(identity.register_gauge(
            sink,
            "system_uptime",
            "System uptime in seconds.",
            &LABELS,
        )?);
        self.gauges = gauges;
        Ok(())
    }

    async fn collect(
        &self,
        transport: &mut dyn DeviceTransport,
        _profile: &DeviceProfile,
    ) -> Result<(), CollectorError> {
        let uptime = self
            .uptime
            .as_ref()
            .ok_or(CollectorError::NotDeclared(self.name()))?;

        for record in transport.run(COMMAND, &[PROPLIST]).await? {
            let labels = [
                field(&record, "architecture-name"),
                field(&record, "board-name"),
                field(&record, "cpu"),
                field(&record, "version"),
            ];
            for (key, gauge) in &self.gauges {
                set_numeric(gauge, &labels, &record, key);
            }
            if let Some(seconds) = parse_uptime(field(&record, "uptime")) {
                uptime.with_label_values(&labels).set(seconds as f64);
            }
        }
        Ok(())
    }
}

/// Parse a RouterOS uptime such as `1w2d3h4m5s` or `2d03:04:05` into seconds.
///
/// Millisecond parts are dropped. Returns `None` for anything else.
pub fn parse_uptime(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (units, clock) = match raw.rfind(|c: char| c.is_ascii_alphabetic()) {
        Some(pos) if raw[pos + 1..].contains(':') => (&raw[..=pos], &raw[pos + 1..]),
        _ if raw.contains(':') => ("", raw),
        _ => (raw, ""),
    };

    let mut total = 0u64;
    let mut digits = String::new();
    let mut chars = units.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits.parse().ok()?;
        digits.clear();
        let factor = match c {
            'w' => 7 * 86_400,
            'd' => 86_400,
            'h' => 3_600,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                0
            }
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        total = total.checked_add(n.checked_mul(factor)?)?;
    }
    if !digits.is_empty() {
        return None;
    }

    if !clock.is_empty() {
        let parts: Vec<u64> = clock
            .split(':')
            .map(|p| p.parse().ok())
            .collect::<Option<_>>()?;
        let [h, m, s] = parts[..] else {
            return None;
        };
        let clock = h
            .checked_mul(3_600)?
            .checked_add(m.checked_mul(60)?)?
            .checked_add(s)?;
        total = total.checked_add(clock)?;
    }
    Some(total)
}
