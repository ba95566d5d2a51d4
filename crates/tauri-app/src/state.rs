use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::{Mutex, RwLock, oneshot};

use proxydesk_core::{
    ConfigStore, ConnectionManager, HealthCheckConfig, HealthMonitor, ProxyTester, StatusPublisher,
};

/// Global application state managed by Tauri. Everything shareable is
/// Arc'd so spawned tasks can hold their own handles.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ConfigStore>,
    pub publisher: Arc<StatusPublisher>,
    pub manager: Arc<ConnectionManager>,
    pub monitor: Arc<HealthMonitor>,
    pub tester: ProxyTester,
    pub first_run: Arc<RwLock<bool>>,
    pub monitor_shutdown: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new() -> anyhow::Result<Self> {
        let dir = ConfigStore::default_dir().ok_or_else(|| anyhow!("could not find config directory"))?;
        let store = Arc::new(ConfigStore::new(dir)?);
        let publisher = Arc::new(StatusPublisher::new());
        let tester = ProxyTester::default();
        let manager = Arc::new(ConnectionManager::new(publisher.clone(), tester.clone()));
        let monitor = Arc::new(HealthMonitor::new(
            manager.clone(),
            store.clone(),
            publisher.clone(),
            tester.clone(),
            HealthCheckConfig::default(),
        ));

        Ok(Self {
            store,
            publisher,
            manager,
            monitor,
            tester,
            first_run: Arc::new(RwLock::new(true)),
            monitor_shutdown: Arc::new(Mutex::new(None)),
        })
    }
}
