use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};

use crate::manager::{ConnectionManager, PathState};
use crate::status::{StatusPublisher, StatusUpdate};
use crate::store::ConfigStore;
use crate::tester::ProxyTester;

#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    /// Interval between probes; independent of the UI's polling cadence.
    pub interval: Duration,
    /// Consecutive probe failures before the status flips to disconnected.
    pub failure_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            failure_threshold: 3,
        }
    }
}

/// Background loop that re-verifies the active path and keeps the Status
/// Publisher current. Probes are single-flight: the periodic cycle and the
/// manual trigger share one lock.
pub struct HealthMonitor {
    manager: Arc<ConnectionManager>,
    store: Arc<ConfigStore>,
    publisher: Arc<StatusPublisher>,
    tester: ProxyTester,
    config: HealthCheckConfig,
    consecutive_failures: AtomicU32,
    probe_lock: Mutex<()>,
}

impl HealthMonitor {
    pub fn new(
        manager: Arc<ConnectionManager>,
        store: Arc<ConfigStore>,
        publisher: Arc<StatusPublisher>,
        tester: ProxyTester,
        config: HealthCheckConfig,
    ) -> Self {
        Self {
            manager,
            store,
            publisher,
            tester,
            config,
            consecutive_failures: AtomicU32::new(0),
            probe_lock: Mutex::new(()),
        }
    }

    /// Run one probe cycle now. Returns whether the path is considered
    /// healthy afterwards. With no active path there is nothing to verify
    /// and the answer is true.
    pub async fn check_now(&self) -> bool {
        let _flight = self.probe_lock.lock().await;

        if self.manager.state().await != PathState::Active {
            self.consecutive_failures.store(0, Ordering::SeqCst);
            return true;
        }
        let Some(config) = self.manager.active_config().await else {
            return true;
        };

        let epoch = self.manager.epoch().await;
        let outcome = self.tester.probe(&config).await;
        if self.manager.epoch().await != epoch {
            // The path changed under the probe (manual toggle or a new
            // activation); its verdict no longer applies.
            log::debug!("discarding stale probe result");
            return true;
        }

        match outcome {
            Ok(latency_ms) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.publisher.publish(StatusUpdate {
                    is_connected: Some(true),
                    latency_ms: Some(Some(latency_ms)),
                    last_error: Some(None),
                    ..Default::default()
                });
                log::debug!("health probe ok ({latency_ms} ms)");
                true
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures < self.config.failure_threshold {
                    // Flap suppression: a blip below the threshold leaves
                    // the published status untouched.
                    log::debug!(
                        "health probe failed ({failures}/{}): {e}",
                        self.config.failure_threshold
                    );
                    return true;
                }

                let message = e.to_string();
                self.publisher.publish(StatusUpdate {
                    is_connected: Some(false),
                    latency_ms: Some(None),
                    last_error: Some(Some(message)),
                    ..Default::default()
                });
                log::warn!("health probe failed {failures} times in a row: {e}");

                if self.store.get_advanced().kill_switch {
                    match self.manager.deactivate().await {
                        Ok(()) => log::info!("kill switch engaged, proxy path torn down"),
                        Err(err) => log::warn!("kill switch could not deactivate: {err}"),
                    }
                }
                false
            }
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// Probe on the configured interval until the shutdown signal fires.
    pub async fn run_loop(self: Arc<Self>, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.interval);
        // The first tick fires immediately; skip it so a freshly activated
        // path is not probed twice in quick succession.
        interval.tick().await;

        log::info!(
            "health monitor running every {:?}, threshold {}",
            self.config.interval,
            self.config.failure_threshold
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_now().await;
                }
                _ = &mut shutdown_rx => {
                    log::info!("health monitor stopped");
                    break;
                }
            }
        }
    }
}
