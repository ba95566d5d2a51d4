use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;

use crate::config::{
    AdvancedSettings, AdvancedSettingsUpdate, ProxyConfig, ProxyConfigUpdate, ProxyTestResult,
};
use crate::error::{ProxyError, Result};

const CONFIG_FILE: &str = "config.json";
const SETTINGS_FILE: &str = "settings.json";

/// Owns the durable `ProxyConfig` and `AdvancedSettings`. Writers serialize
/// through the interior locks; readers always see a fully-merged value.
/// Reads from disk never fail fatally: a missing or corrupt document yields
/// defaults and a warning.
pub struct ConfigStore {
    config_path: PathBuf,
    settings_path: PathBuf,
    config: RwLock<ProxyConfig>,
    advanced: RwLock<AdvancedSettings>,
    last_test: RwLock<Option<ProxyTestResult>>,
}

impl ConfigStore {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir)
            .map_err(|e| ProxyError::storage(format!("failed to create {}: {e}", dir.display())))?;
        if let Err(e) = proxydesk_util::set_permissions_0700(&dir) {
            log::warn!("could not restrict config directory permissions: {e}");
        }

        let config_path = dir.join(CONFIG_FILE);
        let settings_path = dir.join(SETTINGS_FILE);
        let config: ProxyConfig = load_document(&config_path);
        let advanced: AdvancedSettings = load_document(&settings_path);

        Ok(Self {
            config_path,
            settings_path,
            config: RwLock::new(config),
            advanced: RwLock::new(advanced),
            last_test: RwLock::new(None),
        })
    }

    /// Platform config directory for this application.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("proxydesk"))
    }

    pub fn get(&self) -> ProxyConfig {
        self.config.read().unwrap().clone()
    }

    /// Merge, normalize, validate, persist atomically, return the new value.
    /// A validation failure leaves both the cached and persisted config
    /// untouched. A successful write invalidates the cached test result,
    /// which was bound to the previous config snapshot.
    pub fn set(&self, update: ProxyConfigUpdate) -> Result<ProxyConfig> {
        let next = {
            let mut guard = self.config.write().unwrap();
            let mut next = guard.clone();
            apply_config_update(&mut next, update);
            next.normalize();
            if next.enabled {
                next.validate().map_err(ProxyError::Validation)?;
            }
            self.persist(&self.config_path, &next)?;
            *guard = next.clone();
            next
        };
        *self.last_test.write().unwrap() = None;
        Ok(next)
    }

    pub fn get_advanced(&self) -> AdvancedSettings {
        self.advanced.read().unwrap().clone()
    }

    pub fn set_advanced(&self, update: AdvancedSettingsUpdate) -> Result<AdvancedSettings> {
        let mut guard = self.advanced.write().unwrap();
        let mut next = guard.clone();
        apply_settings_update(&mut next, update);
        next.normalize();
        next.validate().map_err(ProxyError::Validation)?;
        self.persist(&self.settings_path, &next)?;
        *guard = next.clone();
        Ok(next)
    }

    pub fn record_test_result(&self, result: ProxyTestResult) {
        *self.last_test.write().unwrap() = Some(result);
    }

    pub fn last_test_result(&self) -> Option<ProxyTestResult> {
        self.last_test.read().unwrap().clone()
    }

    fn persist<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| ProxyError::storage(format!("failed to encode document: {e}")))?;
        proxydesk_util::write_atomic(path, &json).map_err(|e| ProxyError::storage(e.to_string()))
    }
}

fn load_document<T: DeserializeOwned + Default>(path: &Path) -> T {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return T::default(),
        Err(e) => {
            log::warn!("failed to read {}: {e}; using defaults", path.display());
            return T::default();
        }
    };
    match serde_json::from_slice(&data) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("corrupt document {}: {e}; using defaults", path.display());
            T::default()
        }
    }
}

fn apply_config_update(config: &mut ProxyConfig, update: ProxyConfigUpdate) {
    if let Some(v) = update.enabled {
        config.enabled = v;
    }
    if let Some(v) = update.proxy_type {
        config.proxy_type = v;
    }
    if let Some(v) = update.host {
        config.host = v;
    }
    if let Some(v) = update.port {
        config.port = v;
    }
    if let Some(v) = update.username {
        config.username = v;
    }
    if let Some(v) = update.password {
        config.password = v;
    }
    if let Some(v) = update.auto_detect {
        config.auto_detect = v;
    }
    if let Some(v) = update.auto_connect {
        config.auto_connect = v;
    }
}

fn apply_settings_update(settings: &mut AdvancedSettings, update: AdvancedSettingsUpdate) {
    if let Some(v) = update.custom_dns {
        settings.custom_dns = v;
    }
    if let Some(v) = update.webrtc_protection {
        settings.webrtc_protection = v;
    }
    if let Some(v) = update.custom_user_agent {
        settings.custom_user_agent = v;
    }
    if let Some(v) = update.kill_switch {
        settings.kill_switch = v;
    }
    if let Some(v) = update.auto_update {
        settings.auto_update = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyType;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}-{now}"))
    }

    fn enabled_update(host: &str, port: u16) -> ProxyConfigUpdate {
        ProxyConfigUpdate {
            enabled: Some(true),
            host: Some(host.to_string()),
            port: Some(port),
            ..Default::default()
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = temp_dir("proxydesk-store");
        let store = ConfigStore::new(dir.clone()).unwrap();

        let saved = store
            .set(ProxyConfigUpdate {
                enabled: Some(true),
                proxy_type: Some(ProxyType::Http),
                host: Some("proxy.example.com".to_string()),
                port: Some(8080),
                username: Some(Some("user".to_string())),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.get(), saved);

        // A fresh store sees the persisted value
        let reloaded = ConfigStore::new(dir.clone()).unwrap();
        assert_eq!(reloaded.get().host, "proxy.example.com");
        assert_eq!(reloaded.get().proxy_type, ProxyType::Http);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_credentials_normalize_to_absent() {
        let dir = temp_dir("proxydesk-store-norm");
        let store = ConfigStore::new(dir.clone()).unwrap();

        let saved = store
            .set(ProxyConfigUpdate {
                username: Some(Some("  ".to_string())),
                password: Some(Some(String::new())),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(saved.username, None);
        assert_eq!(saved.password, None);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn invalid_set_leaves_persisted_value_unchanged() {
        let dir = temp_dir("proxydesk-store-invalid");
        let store = ConfigStore::new(dir.clone()).unwrap();
        store.set(enabled_update("127.0.0.1", 1080)).unwrap();

        let err = store
            .set(ProxyConfigUpdate {
                host: Some(String::new()),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));

        // In-memory value untouched
        assert_eq!(store.get().host, "127.0.0.1");
        // Persisted value untouched
        let reloaded = ConfigStore::new(dir.clone()).unwrap();
        assert_eq!(reloaded.get().host, "127.0.0.1");
        assert!(reloaded.get().enabled);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn port_zero_rejected_while_enabled() {
        let dir = temp_dir("proxydesk-store-port");
        let store = ConfigStore::new(dir.clone()).unwrap();
        let err = store.set(enabled_update("127.0.0.1", 0)).unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_document_falls_back_to_defaults() {
        let dir = temp_dir("proxydesk-store-corrupt");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), b"{not json").unwrap();

        let store = ConfigStore::new(dir.clone()).unwrap();
        assert_eq!(store.get(), ProxyConfig::default());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn successful_set_clears_last_test_result() {
        let dir = temp_dir("proxydesk-store-test-cache");
        let store = ConfigStore::new(dir.clone()).unwrap();
        store.record_test_result(ProxyTestResult::success(10, None));
        assert!(store.last_test_result().is_some());

        store.set(enabled_update("127.0.0.1", 1080)).unwrap();
        assert!(store.last_test_result().is_none());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_set_keeps_last_test_result() {
        let dir = temp_dir("proxydesk-store-test-keep");
        let store = ConfigStore::new(dir.clone()).unwrap();
        store.record_test_result(ProxyTestResult::success(10, None));

        let _ = store.set(enabled_update("", 1080)).unwrap_err();
        assert!(store.last_test_result().is_some());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn advanced_settings_round_trip_and_validation() {
        let dir = temp_dir("proxydesk-store-advanced");
        let store = ConfigStore::new(dir.clone()).unwrap();

        let saved = store
            .set_advanced(AdvancedSettingsUpdate {
                custom_dns: Some(Some("1.1.1.1, 8.8.8.8".to_string())),
                kill_switch: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert!(saved.kill_switch);

        let err = store
            .set_advanced(AdvancedSettingsUpdate {
                custom_dns: Some(Some("1.1.1.1,900.2.3.4".to_string())),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, ProxyError::Validation(_)));

        // The rejected write did not clobber the stored settings
        let reloaded = ConfigStore::new(dir.clone()).unwrap();
        assert_eq!(
            reloaded.get_advanced().custom_dns.as_deref(),
            Some("1.1.1.1, 8.8.8.8")
        );
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn password_is_never_persisted() {
        let dir = temp_dir("proxydesk-store-password");
        let store = ConfigStore::new(dir.clone()).unwrap();
        store
            .set(ProxyConfigUpdate {
                password: Some(Some("secret".to_string())),
                ..Default::default()
            })
            .unwrap();

        let raw = fs::read_to_string(dir.join(CONFIG_FILE)).unwrap();
        assert!(!raw.contains("secret"));
        let _ = fs::remove_dir_all(&dir);
    }
}
