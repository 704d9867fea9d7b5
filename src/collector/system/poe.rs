use prometheus::{GaugeVec, Registry};

use crate::collector::{Collector, CollectorError, DeviceIdentity, field, set_numeric};
use crate::config::{DeviceProfile, MetricGroup};
use crate::transport::DeviceTransport;

const PRINT: &str = "/interface/ethernet/poe/print";
const MONITOR: &str = "/interface/ethernet/poe/monitor";
const LABELS: [&str; 4] = ["name", "poe_out", "poe_priority", "poe_out_status"];

#[derive(Debug)]
struct PoeGauges {
    voltage: GaugeVec,
    current: GaugeVec,
    power: GaugeVec,
    info: GaugeVec,
}

/// PoE output readings, one monitor call per PoE-capable port.
#[derive(Debug, Default)]
pub struct PoeCollector {
    gauges: Option<PoeGauges>,
}

#[async_trait::async_trait]
impl Collector for PoeCollector {
    fn name(&self) -> &'static str {
        "poe"
    }

    fn is_enabled(&self, profile: &DeviceProfile) -> bool {
        profile.metric_enabled(MetricGroup::Poe)
    }

    fn declare(
        &mut self,
        sink: &Registry,
        identity: &DeviceIdentity,
    ) -> Result<(), prometheus::Error> {
        let gauge = |name: &str, help: &str| identity.register_gauge(sink, name, help, &LABELS);
        self.gauges = Some(PoeGauges {
            voltage: gauge("poe_out_voltage", "Output voltage of PoE interfaces (in Volts).")?,
            current: gauge("poe_out_current", "Output current of PoE interfaces (in Amperes).")?,
            power: gauge("poe_out_power", "Output power of PoE interfaces (in Watts).")?,
            info: gauge("poe_info", "Information about PoE interfaces.")?,
        });
        Ok(())
    }

    async fn collect(
        &self,
        transport: &mut dyn DeviceTransport,
        _profile: &DeviceProfile,
    ) -> Result<(), CollectorError> {
        let gauges = self
            .gauges
            .as_ref()
            .ok_or(CollectorError::NotDeclared(self.name()))?;

        let ports = transport.run(PRINT, &["=.proplist=.id,name"]).await?;
        for (idx, port) in ports.iter().enumerate() {
            let numbers = match port.get(".id") {
                Some(id) => format!("=numbers={id}"),
                None => format!("=numbers={idx}"),
            };
            for record in transport.run(MONITOR, &["=once=", numbers.as_str()]).await? {
                let labels = [
                    field(&record, "name"),
                    field(&record, "poe-out"),
                    field(&record, "poe-priority"),
                    field(&record, "poe-out-status"),
                ];
                set_numeric(&gauges.voltage, &labels, &record, "poe-out-voltage");
                set_numeric(&gauges.current, &labels, &record, "poe-out-current");
                set_numeric(&gauges.power, &labels, &record, "poe-out-power");
                gauges.info.with_label_values(&labels).set(1.0);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::system::testing::{HOST, profile, setup, value};
    use crate::transport::fake::{FakeConnector, FakeReply, record};

    #[test]
    fn test_disabled_unless_turned_on() {
        let collector = PoeCollector::default();
        let mut profile = profile();
        assert!(!collector.is_enabled(&profile));

        profile.metrics.insert(MetricGroup::Poe, true);
        assert!(collector.is_enabled(&profile));
    }

    #[tokio::test]
    async fn test_poe_monitors_each_port() {
        let connector = FakeConnector::new();
        connector.records(HOST, PRINT, vec![record(&[(".id", "*1"), ("name", "ether2")])]);
        connector.records(
            HOST,
            MONITOR,
            vec![record(&[
                ("name", "ether2"),
                ("poe-out", "auto-on"),
                ("poe-priority", "10"),
                ("poe-out-status", "powered-on"),
                ("poe-out-voltage", "24.1"),
                ("poe-out-power", "3.2"),
            ])],
        );
        let mut collector = PoeCollector::default();
        let (sink, mut transport) = setup(&mut collector, &connector).await;

        collector.collect(transport.as_mut(), &profile()).await.unwrap();

        let labels = [("name", "ether2"), ("poe_out_status", "powered-on")];
        assert_eq!(value(&sink, "mktxp_poe_out_voltage", &labels), Some(24.1));
        assert_eq!(value(&sink, "mktxp_poe_out_power", &labels), Some(3.2));
        assert_eq!(value(&sink, "mktxp_poe_info", &labels), Some(1.0));
        assert_eq!(value(&sink, "mktxp_poe_out_current", &labels), None);
        assert_eq!(connector.calls(HOST), vec![PRINT.to_string(), MONITOR.to_string()]);
    }

    #[tokio::test]
    async fn test_poe_trap_is_not_connection_loss() {
        let connector = FakeConnector::new();
        connector.reply(HOST, PRINT, FakeReply::Trap("no such command".to_string()));
        let mut collector = PoeCollector::default();
        let (_sink, mut transport) = setup(&mut collector, &connector).await;

        let err = collector
            .collect(transport.as_mut(), &profile())
            .await
            .unwrap_err();
        assert!(!err.is_connection_loss());
    }
}
