use proxydesk_core::ProxyStatus;
use serde::Serialize;

pub const EVENT_PROXY_STATUS: &str = "proxy-status-changed";
pub const EVENT_PROXY_TOGGLED: &str = "proxy-toggled";

#[derive(Debug, Clone, Serialize)]
pub struct ProxyStatusEvent {
    pub status: ProxyStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProxyToggledEvent {
    pub enabled: bool,
}
