use prometheus::{GaugeVec, Registry};

use crate::collector::{Collector, CollectorError, DeviceIdentity, field};
use crate::config::{DeviceProfile, MetricGroup};
use crate::transport::DeviceTransport;

const COMMAND: &str = "/system/package/print";
const PROPLIST: &str = "=.proplist=name,version,build-time,disabled";

/// One info series per installed package.
#[derive(Debug, Default)]
pub struct PackagesCollector {
    gauge: Option<GaugeVec>,
}

#[async_trait::async_trait]
impl Collector for PackagesCollector {
    fn name(&self) -> &'static str {
        "packages"
    }

    fn is_enabled(&self, profile: &DeviceProfile) -> bool {
        profile.metric_enabled(MetricGroup::InstalledPackages)
    }

    fn declare(
        &mut self,
        sink: &Registry,
        identity: &DeviceIdentity,
    ) -> Result<(), prometheus::Error> {
        self.gauge = Some(identity.register_gauge(
            sink,
            "installed_packages_info",
            "Information about installed packages on the router",
            &["name", "version", "build_time", "disabled"],
        )?);
        Ok(())
    }

    async fn collect(
        &self,
        transport: &mut dyn DeviceTransport,
        _profile: &DeviceProfile,
    ) -> Result<(), CollectorError> {
        let gauge = self
            .gauge
            .as_ref()
            .ok_or(CollectorError::NotDeclared(self.name()))?;

        for record in transport.run(COMMAND, &[PROPLIST]).await? {
            gauge
                .with_label_values(&[
                    field(&record, "name"),
                    field(&record, "version"),
                    field(&record, "build-time"),
                    field(&record, "disabled"),
                ])
                .set(1.0);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::system::testing::{HOST, profile, setup, value};
    use crate::transport::fake::{FakeConnector, record};

    #[test]
    fn test_enabled_unless_turned_off() {
        let collector = PackagesCollector::default();
        let mut profile = profile();
        assert!(collector.is_enabled(&profile));

        profile.metrics.insert(MetricGroup::InstalledPackages, false);
        assert!(!collector.is_enabled(&profile));
    }

    #[tokio::test]
    async fn test_packages_one_series_each() {
        let connector = FakeConnector::new();
        connector.records(
            HOST,
            COMMAND,
            vec![
                record(&[("name", "routeros"), ("version", "7.15"), ("disabled", "false")]),
                record(&[("name", "wifi-qcom"), ("version", "7.15"), ("disabled", "true")]),
            ],
        );
        let mut collector = PackagesCollector::default();
        let (sink, mut transport) = setup(&mut collector, &connector).await;

        collector.collect(transport.as_mut(), &profile()).await.unwrap();

        let family = "mktxp_installed_packages_info";
        assert_eq!(
            value(&sink, family, &[("name", "wifi-qcom"), ("disabled", "true")]),
            Some(1.0)
        );
        assert_eq!(
            value(&sink, family, &[("name", "routeros"), ("build_time", "")]),
            Some(1.0)
        );
    }
}
