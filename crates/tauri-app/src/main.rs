// Prevents additional console window on Windows in release
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use proxydesk_desktop::commands;
use proxydesk_desktop::credentials;
use proxydesk_desktop::events::{EVENT_PROXY_STATUS, ProxyStatusEvent};
use proxydesk_desktop::state::AppState;
use tauri::{Emitter, Manager};
use tokio::sync::oneshot;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("starting proxydesk v{}", env!("CARGO_PKG_VERSION"));

    tauri::Builder::default()
        .setup(|app| {
            let state = AppState::new().expect("Failed to initialize app state");

            // Forward every engine status update to the frontend
            let handle = app.handle().clone();
            state.publisher.subscribe(Box::new(move |status| {
                let _ = handle.emit(
                    EVENT_PROXY_STATUS,
                    ProxyStatusEvent {
                        status: status.clone(),
                    },
                );
            }));

            // Background health monitoring for the lifetime of the app
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            {
                let slot = state.monitor_shutdown.clone();
                tauri::async_runtime::spawn(async move {
                    *slot.lock().await = Some(shutdown_tx);
                });
            }
            let monitor = state.monitor.clone();
            tauri::async_runtime::spawn(monitor.run_loop(shutdown_rx));

            // Reconnect on startup when the saved config asks for it
            let config = state.store.get();
            if config.enabled && config.auto_connect {
                let manager = state.manager.clone();
                tauri::async_runtime::spawn(async move {
                    let mut config = config;
                    if config.username.is_some() && config.password.is_none() {
                        config.password = credentials::get_password(&config.host, config.port)
                            .ok()
                            .flatten();
                    }
                    if let Err(e) = manager.activate(config).await {
                        log::warn!("auto-connect failed: {e}");
                    }
                });
            }

            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Proxy configuration
            commands::get_proxy_config,
            commands::set_proxy_config,
            commands::test_proxy_connection,
            // Connection control
            commands::toggle_proxy,
            commands::get_proxy_status,
            commands::trigger_health_check,
            // Advanced settings
            commands::get_advanced_settings,
            commands::save_advanced_settings,
            // Credentials
            commands::delete_proxy_credentials,
            // App metadata and collaborators
            commands::get_proxy_presets,
            commands::clear_cache,
            commands::is_first_run,
            commands::complete_first_run,
            commands::get_app_version,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}
