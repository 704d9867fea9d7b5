//! Device orchestration: startup, one polling task per device, shutdown.

use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backoff::BackoffController;
use crate::collector::CollectorRegistry;
use crate::config::{DeviceProfile, GlobalConfig};
use crate::error::DeviceError;
use crate::session::{DeviceSession, PollOutcome};
use crate::transport::DeviceConnector;

/// Default grace period for poller shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing and concurrency knobs for the pollers.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Period between ticks of one device.
    pub interval: Duration,
    /// Deadline for one collect.
    pub scrape_budget: Duration,
    /// Upper bound for the startup of a single device.
    pub startup_budget: Duration,
    pub socket_timeout: Duration,
    /// Start devices concurrently instead of one after another.
    pub parallel: bool,
    /// Concurrent startups when `parallel` is set.
    pub max_workers: usize,
    /// Reconnect schedule cloned into every session.
    pub backoff: BackoffController,
}

impl From<&GlobalConfig> for PollSettings {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            interval: config.minimal_collect_interval,
            scrape_budget: config.max_scrape_duration,
            startup_budget: config.total_max_scrape_duration,
            socket_timeout: config.socket_timeout,
            parallel: config.fetch_routers_in_parallel,
            max_workers: config.max_worker_threads,
            backoff: BackoffController::from_config(config),
        }
    }
}

impl PollSettings {
    /// Time one device may spend in startup: connect plus the first
    /// collect, never more than `startup_budget`.
    pub fn device_startup_budget(&self) -> Duration {
        (self.socket_timeout + self.scrape_budget).min(self.startup_budget)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&GlobalConfig::default())
    }
}

/// Builds device sessions and runs their polling loops.
pub struct Orchestrator {
    registry: Arc<CollectorRegistry>,
    connector: Arc<dyn DeviceConnector>,
    sink: Registry,
    settings: PollSettings,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<CollectorRegistry>,
        connector: Arc<dyn DeviceConnector>,
        sink: Registry,
        settings: PollSettings,
    ) -> Self {
        Self {
            registry,
            connector,
            sink,
            settings,
        }
    }

    pub fn sink(&self) -> &Registry {
        &self.sink
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Start every enabled device and spawn its poller.
    ///
    /// Each device is opened, declared and collected once before this
    /// returns, under its own [`PollSettings::device_startup_budget`]. A
    /// device that fails any of these steps is left out and its error is
    /// kept in [`DevicePollers::failures`]; every other device still gets
    /// its attempt.
    pub async fn start(&self, profiles: impl IntoIterator<Item = DeviceProfile>) -> DevicePollers {
        let profiles: Vec<DeviceProfile> = profiles
            .into_iter()
            .filter(|profile| {
                let enabled = profile.is_enabled();
                if !enabled {
                    tracing::debug!(device = %profile.name, "Skipping disabled device");
                }
                enabled
            })
            .collect();

        tracing::info!(
            devices = profiles.len(),
            parallel = self.settings.parallel,
            "Starting devices"
        );

        let results = if self.settings.parallel {
            self.start_parallel(profiles).await
        } else {
            self.start_sequential(profiles).await
        };

        let (shutdown_tx, _) = watch::channel(false);
        let mut tasks = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(session) => {
                    let name = session.name().to_string();
                    let handle = tokio::spawn(poll_loop(
                        session,
                        self.settings.interval,
                        self.settings.scrape_budget,
                        shutdown_tx.subscribe(),
                    ));
                    tasks.push((name, handle));
                }
                Err(e) => {
                    tracing::error!(device = %e.device(), error = %e, "Device startup failed");
                    failures.push(e);
                }
            }
        }

        tracing::info!(
            running = tasks.len(),
            failed = failures.len(),
            "Device startup complete"
        );

        DevicePollers {
            shutdown_tx,
            tasks,
            failures,
        }
    }

    fn startup(&self) -> Startup {
        Startup {
            registry: Arc::clone(&self.registry),
            connector: Arc::clone(&self.connector),
            sink: self.sink.clone(),
            settings: self.settings.clone(),
        }
    }

    async fn start_sequential(
        &self,
        profiles: Vec<DeviceProfile>,
    ) -> Vec<Result<DeviceSession, DeviceError>> {
        let startup = self.startup();
        let mut results = Vec::with_capacity(profiles.len());
        for profile in profiles {
            results.push(startup.run_bounded(profile).await);
        }
        results
    }

    async fn start_parallel(
        &self,
        profiles: Vec<DeviceProfile>,
    ) -> Vec<Result<DeviceSession, DeviceError>> {
        let startup = Arc::new(self.startup());
        let semaphore = Arc::new(Semaphore::new(self.settings.max_workers.max(1)));

        let handles: Vec<_> = profiles
            .into_iter()
            .map(|profile| {
                let name = profile.name.clone();
                let startup = Arc::clone(&startup);
                let semaphore = Arc::clone(&semaphore);
                let handle = tokio::spawn(async move {
                    // The budget starts once a worker slot is free.
                    match semaphore.acquire_owned().await {
                        Ok(_permit) => startup.run_bounded(profile).await,
                        Err(_) => Err(DeviceError::Task {
                            device: profile.name,
                            reason: "startup pool closed".to_string(),
                        }),
                    }
                });
                (name, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(DeviceError::Task {
                    device: name,
                    reason: e.to_string(),
                }),
            });
        }
        results
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Owned copies of what a startup task needs.
struct Startup {
    registry: Arc<CollectorRegistry>,
    connector: Arc<dyn DeviceConnector>,
    sink: Registry,
    settings: PollSettings,
}

impl Startup {
    async fn run_bounded(&self, profile: DeviceProfile) -> Result<DeviceSession, DeviceError> {
        let device = profile.name.clone();
        let budget = self.settings.device_startup_budget();
        match tokio::time::timeout(budget, self.run(profile)).await {
            Ok(result) => result,
            Err(_) => Err(DeviceError::StartupTimeout { device, budget }),
        }
    }

    async fn run(&self, profile: DeviceProfile) -> Result<DeviceSession, DeviceError> {
        let mut session = DeviceSession::new(
            profile,
            Arc::clone(&self.connector),
            self.settings.socket_timeout,
            self.settings.backoff.clone(),
        );
        session.open().await?;
        let started = match session.declare(&self.registry, &self.sink) {
            Ok(()) => session.collect_once(self.settings.scrape_budget).await,
            Err(e) => Err(e),
        };
        match started {
            Ok(()) => {
                tracing::info!(device = %session.name(), "Device started");
                Ok(session)
            }
            Err(e) => {
                session.close().await;
                Err(e)
            }
        }
    }
}

/// Periodic polling of one device until shutdown.
async fn poll_loop(
    mut session: DeviceSession,
    interval: Duration,
    budget: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let stopping = *shutdown.borrow();
        if stopping {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            result = session.poll(budget) => match result {
                Ok(PollOutcome::Collected) => {
                    tracing::debug!(device = %session.name(), "Collected");
                }
                Ok(PollOutcome::BackingOff) => {
                    tracing::debug!(device = %session.name(), "Waiting to reconnect");
                }
                Err(e) => {
                    tracing::warn!(device = %session.name(), error = %e, "Collection failed");
                }
            },
        }
    }

    session.close().await;
    tracing::debug!(device = %session.name(), "Poller stopped");
}

/// Outcome of [`DevicePollers::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that exited on their own.
    pub stopped: usize,
    /// Tasks still running at the deadline, then aborted.
    pub aborted: Vec<String>,
    /// Tasks that panicked.
    pub failed: Vec<String>,
}

impl ShutdownReport {
    pub fn timed_out(&self) -> bool {
        !self.aborted.is_empty()
    }
}

/// Handles of the running pollers.
///
/// Dropping this without calling [`shutdown`](Self::shutdown) also stops
/// the pollers, but nothing waits for them.
#[derive(Debug)]
pub struct DevicePollers {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(String, JoinHandle<()>)>,
    failures: Vec<DeviceError>,
}

impl DevicePollers {
    /// Names of devices with a poller.
    pub fn running(&self) -> Vec<&str> {
        self.tasks.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Startup errors of devices that were left out.
    pub fn failures(&self) -> &[DeviceError] {
        &self.failures
    }

    /// Stop every poller with the default grace period.
    pub async fn shutdown(self) -> ShutdownReport {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Signal all pollers and wait up to `grace` for them to exit.
    pub async fn shutdown_with_timeout(self, grace: Duration) -> ShutdownReport {
        self.shutdown_tx.send_replace(true);
        let deadline = Instant::now() + grace;

        let mut report = ShutdownReport::default();
        for (name, mut handle) in self.tasks {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.stopped += 1,
                Ok(Err(e)) => {
                    tracing::warn!(device = %name, error = %e, "Poller task failed");
                    report.failed.push(name);
                }
                Err(_) => {
                    handle.abort();
                    report.aborted.push(name);
                }
            }
        }

        if report.timed_out() {
            tracing::warn!(aborted = ?report.aborted, "Poller shutdown timed out");
        } else {
            tracing::info!(stopped = report.stopped, "Poller shutdown complete");
        }
        report
    }
}
