use prometheus::{GaugeVec, Registry};

use crate::collector::{Collector, CollectorError, DeviceIdentity, field};
use crate::config::DeviceProfile;
use crate::transport::DeviceTransport;

const COMMAND: &str = "/system/identity/print";

/// Publishes the configured system identity as an info gauge.
#[derive(Debug, Default)]
pub struct IdentityCollector {
    gauge: Option<GaugeVec>,
}

#[async_trait::async_trait]
impl Collector for IdentityCollector {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn is_enabled(&self, _profile: &DeviceProfile) -> bool {
        true
    }

    fn declare(
        &mut self,
        sink: &Registry,
        identity: &DeviceIdentity,
    ) -> Result<(), prometheus::Error> {
        self.gauge = Some(identity.register_gauge(
            sink,
            "system_identity_info",
            "Information about the system identity of the router",
            &["name"],
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

        for record in transport.run(COMMAND, &[]).await? {
            let name = field(&record, "name");
            if name.is_empty() {
                return Err(CollectorError::MissingField {
                    command: COMMAND,
                    field: "name",
                });
            }
            gauge.with_label_values(&[name]).set(1.0);
        }
        Ok(())
    }
}
