use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::status::{StatusPublisher, StatusUpdate};
use crate::tester::ProxyTester;

/// Lifecycle states of the single active path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Inactive,
    Activating,
    Active,
    Deactivating,
    Failed,
}

/// The live session: the verified socket to the proxy, kept open until
/// deactivation closes it.
struct ActivePath {
    config: ProxyConfig,
    _session: TcpStream,
    established_at: Instant,
}

struct ManagerInner {
    state: PathState,
    path: Option<ActivePath>,
    last_error: Option<String>,
    /// Bumped on every transition so in-flight probes can detect that the
    /// path they sampled no longer exists.
    epoch: u64,
}

/// Owns the lifecycle of the active proxy path: at most one path is ever
/// live, transitions are serialized, and contention is rejected with
/// `Busy`/`AlreadyActive` rather than queued.
pub struct ConnectionManager {
    inner: Mutex<ManagerInner>,
    publisher: Arc<StatusPublisher>,
    tester: ProxyTester,
}

impl ConnectionManager {
    pub fn new(publisher: Arc<StatusPublisher>, tester: ProxyTester) -> Self {
        Self {
            inner: Mutex::new(ManagerInner {
                state: PathState::Inactive,
                path: None,
                last_error: None,
                epoch: 0,
            }),
            publisher,
            tester,
        }
    }

    pub async fn state(&self) -> PathState {
        self.inner.lock().await.state
    }

    pub async fn epoch(&self) -> u64 {
        self.inner.lock().await.epoch
    }

    pub async fn active_config(&self) -> Option<ProxyConfig> {
        self.inner
            .lock()
            .await
            .path
            .as_ref()
            .map(|p| p.config.clone())
    }

    pub async fn last_error(&self) -> Option<String> {
        self.inner.lock().await.last_error.clone()
    }

    pub async fn uptime_secs(&self) -> Option<u64> {
        self.inner
            .lock()
            .await
            .path
            .as_ref()
            .map(|p| p.established_at.elapsed().as_secs())
    }

    /// Establish the path for `config`. Allowed from `Inactive` or `Failed`;
    /// an already-live path yields `AlreadyActive` and an in-flight
    /// transition yields `Busy`. A failed activation parks in `Failed` and
    /// never touches the stored configuration.
    pub async fn activate(&self, config: ProxyConfig) -> Result<()> {
        config.validate().map_err(ProxyError::Validation)?;

        {
            let mut inner = self.inner.lock().await;
            match inner.state {
                PathState::Active => return Err(ProxyError::AlreadyActive),
                PathState::Activating | PathState::Deactivating => return Err(ProxyError::Busy),
                PathState::Inactive | PathState::Failed => {}
            }
            inner.state = PathState::Activating;
            inner.epoch += 1;
            inner.last_error = None;
        }
        self.publisher.publish(StatusUpdate {
            is_connected: Some(false),
            config: Some(Some(config.clone())),
            last_error: Some(None),
            ..Default::default()
        });
        log::info!(
            "activating proxy path {}://{}:{}",
            config.proxy_type,
            config.host,
            config.port
        );

        // Only this task can leave Activating, so the lock is safe to drop
        // around the network attempt; concurrent callers bounce off Busy.
        let attempt = self.tester.establish(&config).await;

        let mut inner = self.inner.lock().await;
        match attempt {
            Ok((stream, latency_ms)) => {
                inner.state = PathState::Active;
                inner.epoch += 1;
                inner.path = Some(ActivePath {
                    config: config.clone(),
                    _session: stream,
                    established_at: Instant::now(),
                });
                drop(inner);
                self.publisher.publish(StatusUpdate {
                    is_connected: Some(true),
                    latency_ms: Some(Some(latency_ms)),
                    last_error: Some(None),
                    ..Default::default()
                });
                log::info!("proxy path active ({latency_ms} ms handshake)");
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                inner.state = PathState::Failed;
                inner.epoch += 1;
                inner.last_error = Some(message.clone());
                drop(inner);
                self.publisher.publish(StatusUpdate {
                    is_connected: Some(false),
                    latency_ms: Some(None),
                    last_error: Some(Some(message)),
                    ..Default::default()
                });
                log::warn!("proxy activation failed: {e}");
                Err(e)
            }
        }
    }

    /// Tear down the active path. Idempotent: deactivating from `Inactive`
    /// is a no-op success. An in-flight transition yields `Busy`.
    pub async fn deactivate(&self) -> Result<()> {
        {
            let mut inner = self.inner.lock().await;
            match inner.state {
                PathState::Inactive => return Ok(()),
                PathState::Activating | PathState::Deactivating => return Err(ProxyError::Busy),
                PathState::Active | PathState::Failed => {}
            }
            inner.state = PathState::Deactivating;
            inner.epoch += 1;
            // Dropping the path closes the held socket.
            let path = inner.path.take();
            drop(path);
            inner.state = PathState::Inactive;
            inner.epoch += 1;
            inner.last_error = None;
        }
        self.publisher.publish(StatusUpdate {
            is_connected: Some(false),
            latency_ms: Some(None),
            ..Default::default()
        });
        log::info!("proxy path deactivated");
        Ok(())
    }
}
