//! Collector registry: the ordered set of collector plugins.

use std::sync::Arc;

use prometheus::Registry;

use crate::collector::{Collector, DeviceIdentity};
use crate::config::DeviceProfile;
use crate::error::DeviceError;
use crate::transport::DeviceTransport;

/// Builds a fresh, undeclared collector instance.
pub type CollectorFactory = Arc<dyn Fn() -> Box<dyn Collector> + Send + Sync>;

/// Append-only list of collector factories.
///
/// Assembled once before any device session exists, then shared behind an
/// `Arc`. Every device gets its own instances, in registration order.
#[derive(Default, Clone)]
pub struct CollectorRegistry {
    factories: Vec<(&'static str, CollectorFactory)>,
}

impl CollectorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the shipped system collectors.
    pub fn with_system_collectors() -> Self {
        let mut registry = Self::new();
        crate::collector::system::register_all(&mut registry);
        registry
    }

    /// Append a collector factory.
    pub fn register<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Collector> + Send + Sync + 'static,
    {
        let name = factory().name();
        tracing::debug!(collector = name, "Collector registered");
        self.factories.push((name, Arc::new(factory)));
        self
    }

    /// Names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate and declare every collector enabled for this profile.
    ///
    /// # Errors
    /// Stops at the first collector whose families cannot be registered.
    /// Families declared before it stay in the sink.
    pub fn declare_all(
        &self,
        profile: &DeviceProfile,
        identity: &DeviceIdentity,
        sink: &Registry,
    ) -> Result<Vec<Box<dyn Collector>>, DeviceError> {
        let mut declared = Vec::with_capacity(self.factories.len());
        for &(name, ref factory) in &self.factories {
            let mut collector = factory();
            if !collector.is_enabled(profile) {
                tracing::debug!(device = %profile.name, collector = name, "Collector disabled");
                continue;
            }
            collector
                .declare(sink, identity)
                .map_err(|source| DeviceError::Declare {
                    device: profile.name.clone(),
                    collector: name,
                    source,
                })?;
            declared.push(collector);
        }
        Ok(declared)
    }

    /// Run one collection pass over declared collectors, in order.
    ///
    /// # Errors
    /// The first failing collector ends the pass. Values already set by
    /// earlier collectors are kept.
    pub async fn collect_all(
        collectors: &[Box<dyn Collector>],
        transport: &mut dyn DeviceTransport,
        profile: &DeviceProfile,
    ) -> Result<(), DeviceError> {
        for collector in collectors {
            if !collector.is_enabled(profile) {
                continue;
            }
            collector
                .collect(transport, profile)
                .await
                .map_err(|source| DeviceError::Collect {
                    device: profile.name.clone(),
                    collector: collector.name(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("collectors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::collector::CollectorError;
    use crate::config::MetricGroup;
    use crate::transport::fake::FakeConnector;
    use crate::transport::{ConnectTarget, DeviceConnector, TransportError};

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records every call; optionally fails collect or collides on declare.
    struct Stub {
        name: &'static str,
        group: Option<MetricGroup>,
        fail_collect: bool,
        log: Log,
    }

    #[async_trait::async_trait]
    impl Collector for Stub {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_enabled(&self, profile: &DeviceProfile) -> bool {
            self.group.is_none_or(|g| profile.metric_enabled(g))
        }

        fn declare(
            &mut self,
            sink: &Registry,
            identity: &DeviceIdentity,
        ) -> Result<(), prometheus::Error> {
            self.log.lock().unwrap().push(format!("declare:{}", self.name));
            let family = format!("stub_{}", self.name);
            identity.register_gauge(sink, &family, "stub", &["collector"])?;
            Ok(())
        }

        async fn collect(
            &self,
            _transport: &mut dyn DeviceTransport,
            _profile: &DeviceProfile,
        ) -> Result<(), CollectorError> {
            self.log.lock().unwrap().push(format!("collect:{}", self.name));
            if self.fail_collect {
                return Err(TransportError::Trap {
                    command: "/stub".to_string(),
                    message: "boom".to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    fn stub(
        registry: &mut CollectorRegistry,
        log: &Log,
        name: &'static str,
        group: Option<MetricGroup>,
        fail_collect: bool,
    ) {
        let log = Arc::clone(log);
        registry.register(move || {
            Box::new(Stub {
                name,
                group,
                fail_collect,
                log: Arc::clone(&log),
            })
        });
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_system_collectors_registered_in_order() {
        let registry = CollectorRegistry::with_system_collectors();
        assert_eq!(
            registry.names(),
            vec!["identity", "resources", "packages", "users", "poe"]
        );
    }

    #[test]
    fn test_declare_skips_disabled_collectors() {
        let log = Log::default();
        let mut registry = CollectorRegistry::new();
        stub(&mut registry, &log, "always", None, false);
        stub(&mut registry, &log, "poe", Some(MetricGroup::Poe), false);
        stub(&mut registry, &log, "user", Some(MetricGroup::User), false);

        let profile = DeviceProfile::new("r1");
        let sink = Registry::new();
        let declared = registry
            .declare_all(&profile, &DeviceIdentity::new("r1", "10.0.0.1"), &sink)
            .unwrap();

        let names: Vec<_> = declared.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["always", "user"]);
        assert_eq!(entries(&log), vec!["declare:always", "declare:user"]);
    }

    #[test]
    fn test_declare_collision_names_collector() {
        let log = Log::default();
        let mut registry = CollectorRegistry::new();
        stub(&mut registry, &log, "dup", None, false);
        stub(&mut registry, &log, "dup", None, false);
        stub(&mut registry, &log, "after", None, false);

        let profile = DeviceProfile::new("r1");
        let Err(err) =
            registry.declare_all(&profile, &DeviceIdentity::new("r1", "h"), &Registry::new())
        else {
            panic!("colliding families must fail declare");
        };
        assert!(matches!(err, DeviceError::Declare { collector: "dup", .. }));
        assert_eq!(entries(&log), vec!["declare:dup", "declare:dup"]);
    }

    #[tokio::test]
    async fn test_collect_all_stops_at_first_failure() {
        let log = Log::default();
        let mut registry = CollectorRegistry::new();
        stub(&mut registry, &log, "first", None, false);
        registry.register({
            let log = Arc::clone(&log);
            move || {
                Box::new(Stub {
                    name: "second",
                    group: None,
                    fail_collect: true,
                    log: Arc::clone(&log),
                })
            }
        });
        stub(&mut registry, &log, "third", None, false);

        let profile = DeviceProfile::new("r1");
        let collectors = registry
            .declare_all(&profile, &DeviceIdentity::new("r1", "h"), &Registry::new())
            .unwrap();
        log.lock().unwrap().clear();

        let connector = FakeConnector::new();
        let target = ConnectTarget::from_profile(&profile, std::time::Duration::from_secs(1));
        let mut transport = connector.connect(&target).await.unwrap();

        let err = CollectorRegistry::collect_all(&collectors, transport.as_mut(), &profile)
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Collect { collector: "second", .. }));
        assert_eq!(entries(&log), vec!["collect:first", "collect:second"]);
    }
}
