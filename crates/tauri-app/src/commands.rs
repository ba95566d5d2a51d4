use tauri::{AppHandle, Emitter, State};

use proxydesk_core::{
    AdvancedSettings, AdvancedSettingsUpdate, ProxyConfig, ProxyConfigUpdate, ProxyPreset,
    ProxyStatus, ProxyTestResult, ProxyType,
};

use crate::credentials;
use crate::error::Result;
use crate::events::{EVENT_PROXY_TOGGLED, ProxyToggledEvent};
use crate::state::AppState;

// ============================================================================
// Proxy configuration
// ============================================================================

#[tauri::command]
pub async fn get_proxy_config(state: State<'_, AppState>) -> Result<ProxyConfig> {
    Ok(state.store.get().sanitized())
}

#[tauri::command]
pub async fn set_proxy_config(state: State<'_, AppState>, config: ProxyConfig) -> Result<()> {
    log::info!("saving proxy config for {}", config.host);

    // The keyring owns the secret; the store never sees it
    if let Some(password) = config.password.as_deref() {
        let password = password.trim();
        if !password.is_empty() {
            credentials::store_password(&config.host, config.port, password)?;
        }
    }

    let update = ProxyConfigUpdate {
        password: Some(None),
        ..ProxyConfigUpdate::from(config)
    };
    state.store.set(update)?;
    Ok(())
}

#[tauri::command]
pub async fn test_proxy_connection(
    state: State<'_, AppState>,
    config: ProxyConfig,
) -> Result<ProxyTestResult> {
    log::info!("testing proxy connection to {}:{}", config.host, config.port);

    let config = with_keyring_password(config);
    let result = state.tester.test(&config).await;
    state.store.record_test_result(result.clone());
    Ok(result)
}

// ============================================================================
// Connection control
// ============================================================================

#[tauri::command]
pub async fn toggle_proxy(
    app: AppHandle,
    state: State<'_, AppState>,
    enabled: bool,
) -> Result<()> {
    log::info!("toggling proxy: {enabled}");

    if enabled {
        // Persist the flag first; a failed activation leaves it as the
        // caller set it and the UI decides whether to revert.
        let config = state.store.set(ProxyConfigUpdate {
            enabled: Some(true),
            ..Default::default()
        })?;
        let config = with_keyring_password(config);
        state.manager.activate(config).await?;
    } else {
        state.store.set(ProxyConfigUpdate {
            enabled: Some(false),
            ..Default::default()
        })?;
        state.manager.deactivate().await?;
    }

    let _ = app.emit(EVENT_PROXY_TOGGLED, ProxyToggledEvent { enabled });
    Ok(())
}

#[tauri::command]
pub async fn get_proxy_status(state: State<'_, AppState>) -> Result<ProxyStatus> {
    Ok(state.publisher.get())
}

#[tauri::command]
pub async fn trigger_health_check(state: State<'_, AppState>) -> Result<bool> {
    Ok(state.monitor.check_now().await)
}

// ============================================================================
// Advanced settings
// ============================================================================

#[tauri::command]
pub async fn get_advanced_settings(state: State<'_, AppState>) -> Result<AdvancedSettings> {
    Ok(state.store.get_advanced())
}

#[tauri::command]
pub async fn save_advanced_settings(
    state: State<'_, AppState>,
    settings: AdvancedSettings,
) -> Result<()> {
    log::info!("saving advanced settings");
    state
        .store
        .set_advanced(AdvancedSettingsUpdate::from(settings))?;
    Ok(())
}

// ============================================================================
// Credentials
// ============================================================================

#[tauri::command]
pub async fn delete_proxy_credentials(host: String, port: u16) -> Result<()> {
    credentials::delete_password(&host, port)?;
    Ok(())
}

// ============================================================================
// App metadata and collaborators
// ============================================================================

#[tauri::command]
pub async fn get_proxy_presets() -> Result<Vec<ProxyPreset>> {
    Ok(vec![ProxyPreset {
        name: "Custom Server".to_string(),
        proxy_type: ProxyType::Socks5,
        host: String::new(),
        port: 1080,
        requires_auth: false,
        location: None,
    }])
}

/// Cache lives in the embedded webview; clearing it is that collaborator's
/// job, this surface only acknowledges the request.
#[tauri::command]
pub async fn clear_cache() -> Result<()> {
    log::info!("clear cache requested");
    Ok(())
}

#[tauri::command]
pub async fn is_first_run(state: State<'_, AppState>) -> Result<bool> {
    Ok(*state.first_run.read().await)
}

#[tauri::command]
pub async fn complete_first_run(state: State<'_, AppState>) -> Result<()> {
    *state.first_run.write().await = false;
    Ok(())
}

#[tauri::command]
pub fn get_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// ============================================================================
// Helpers
// ============================================================================

/// Fill in the password from the keyring when the caller supplied a
/// username without one.
fn with_keyring_password(mut config: ProxyConfig) -> ProxyConfig {
    if config.username.is_some() && config.password.is_none() {
        config.password = credentials::get_password(&config.host, config.port)
            .ok()
            .flatten();
    }
    config
}
