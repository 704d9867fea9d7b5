use prometheus::{GaugeVec, Registry};

use crate::collector::{Collector, CollectorError, DeviceIdentity, field};
use crate::config::{DeviceProfile, MetricGroup};
use crate::transport::DeviceTransport;

const COMMAND: &str = "/user/active/print";
const PROPLIST: &str = "=.proplist=name,when,address,via,group";

/// One info series per active user session.
#[derive(Debug, Default)]
pub struct UsersCollector {
    gauge: Option<GaugeVec>,
}

#[async_trait::async_trait]
impl Collector for UsersCollector {
    fn name(&self) -> &'static str {
        "users"
    }

    fn is_enabled(&self, profile: &DeviceProfile) -> bool {
        profile.metric_enabled(MetricGroup::User)
    }

    fn declare(
        &mut self,
        sink: &Registry,
        identity: &DeviceIdentity,
    ) -> Result<(), prometheus::Error> {
        self.gauge = Some(identity.register_gauge(
            sink,
            "active_users_info",
            "Information about active users on the router",
            &["name", "when", "address", "via", "group"],
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
                    field(&record, "when"),
                    field(&record, "address"),
                    field(&record, "via"),
                    field(&record, "group"),
                ])
                .set(1.0);
        }
        Ok(())
    }
}
