use std::fmt;

use serde::{Deserialize, Serialize};

/// Proxy protocol type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Socks5,
    Http,
    Https,
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Socks5 => write!(f, "socks5"),
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
        }
    }
}

/// The single authoritative proxy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    /// Held in memory only; the keyring owns the persisted secret.
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub auto_detect: bool,
    pub auto_connect: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            proxy_type: ProxyType::Socks5,
            host: String::new(),
            port: 1080,
            username: None,
            password: None,
            auto_detect: false,
            auto_connect: false,
        }
    }
}

impl ProxyConfig {
    /// Trim text fields; empty-after-trim credentials become absent.
    pub fn normalize(&mut self) {
        self.host = self.host.trim().to_string();
        self.username = normalize_optional(self.username.take());
        self.password = normalize_optional(self.password.take());
    }

    /// Shape check: non-empty host, port in range. Callers decide whether
    /// the check applies (the store only enforces it while enabled; the
    /// tester always does).
    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("proxy host cannot be empty".to_string());
        }
        if self.host.contains(' ') {
            return Err("proxy host cannot contain spaces".to_string());
        }
        if self.port == 0 {
            return Err("proxy port must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Copy safe to publish or log: the password never leaves the engine.
    pub fn sanitized(&self) -> ProxyConfig {
        ProxyConfig {
            password: None,
            ..self.clone()
        }
    }
}

/// Partial-merge shape for `ConfigStore::set`. Doubly-optional credential
/// fields distinguish "leave alone" (None) from "clear" (Some(None)).
#[derive(Debug, Clone, Default)]
pub struct ProxyConfigUpdate {
    pub enabled: Option<bool>,
    pub proxy_type: Option<ProxyType>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<Option<String>>,
    pub password: Option<Option<String>>,
    pub auto_detect: Option<bool>,
    pub auto_connect: Option<bool>,
}

impl From<ProxyConfig> for ProxyConfigUpdate {
    fn from(config: ProxyConfig) -> Self {
        Self {
            enabled: Some(config.enabled),
            proxy_type: Some(config.proxy_type),
            host: Some(config.host),
            port: Some(config.port),
            username: Some(config.username),
            password: Some(config.password),
            auto_detect: Some(config.auto_detect),
            auto_connect: Some(config.auto_connect),
        }
    }
}

/// Settings that shape the surrounding behavior of the proxy path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvancedSettings {
    /// Comma-separated IPv4 list.
    pub custom_dns: Option<String>,
    pub webrtc_protection: bool,
    pub custom_user_agent: Option<String>,
    /// Cut traffic entirely when the proxy becomes unreachable.
    pub kill_switch: bool,
    pub auto_update: bool,
}

impl Default for AdvancedSettings {
    fn default() -> Self {
        Self {
            custom_dns: None,
            webrtc_protection: true,
            custom_user_agent: None,
            kill_switch: false,
            auto_update: true,
        }
    }
}

impl AdvancedSettings {
    pub fn normalize(&mut self) {
        self.custom_dns = normalize_optional(self.custom_dns.take());
        self.custom_user_agent = normalize_optional(self.custom_user_agent.take());
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(dns) = &self.custom_dns {
            proxydesk_util::dns::parse_dns_list(dns)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdvancedSettingsUpdate {
    pub custom_dns: Option<Option<String>>,
    pub webrtc_protection: Option<bool>,
    pub custom_user_agent: Option<Option<String>>,
    pub kill_switch: Option<bool>,
    pub auto_update: Option<bool>,
}

impl From<AdvancedSettings> for AdvancedSettingsUpdate {
    fn from(settings: AdvancedSettings) -> Self {
        Self {
            custom_dns: Some(settings.custom_dns),
            webrtc_protection: Some(settings.webrtc_protection),
            custom_user_agent: Some(settings.custom_user_agent),
            kill_switch: Some(settings.kill_switch),
            auto_update: Some(settings.auto_update),
        }
    }
}

/// Result of a one-shot proxy connection test. Ephemeral: superseded by the
/// next test or config change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTestResult {
    pub success: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub external_ip: Option<String>,
}

impl ProxyTestResult {
    pub fn success(latency_ms: u64, external_ip: Option<String>) -> Self {
        Self {
            success: true,
            latency_ms: Some(latency_ms),
            error: None,
            external_ip,
        }
    }

    pub fn failure(error: String) -> Self {
        Self {
            success: false,
            latency_ms: None,
            error: Some(error),
            external_ip: None,
        }
    }
}

/// The external status view polled by the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyStatus {
    pub is_connected: bool,
    /// Config snapshot, password always stripped.
    pub config: Option<ProxyConfig>,
    pub latency_ms: Option<u64>,
    pub last_error: Option<String>,
    /// RFC 3339 timestamp of the last publish.
    pub last_updated: String,
}

impl Default for ProxyStatus {
    fn default() -> Self {
        Self {
            is_connected: false,
            config: None,
            latency_ms: None,
            last_error: None,
            last_updated: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Preset proxy server offered in the settings form.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyPreset {
    pub name: String,
    #[serde(rename = "type")]
    pub proxy_type: ProxyType,
    pub host: String,
    pub port: u16,
    pub requires_auth: bool,
    pub location: Option<String>,
}

impl ProxyPreset {
    pub fn to_config(&self) -> ProxyConfig {
        ProxyConfig {
            enabled: true,
            proxy_type: self.proxy_type,
            host: self.host.clone(),
            port: self.port,
            ..ProxyConfig::default()
        }
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    match value {
        Some(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_host() {
        let config = ProxyConfig {
            enabled: true,
            ..ProxyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_port_zero() {
        let config = ProxyConfig {
            enabled: true,
            host: "proxy.example.com".to_string(),
            port: 0,
            ..ProxyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_accepts_well_formed_config() {
        let config = ProxyConfig {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 1080,
            ..ProxyConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn normalize_drops_empty_credentials() {
        let mut config = ProxyConfig {
            username: Some("  ".to_string()),
            password: Some(String::new()),
            host: " 127.0.0.1 ".to_string(),
            ..ProxyConfig::default()
        };
        config.normalize();
        assert_eq!(config.username, None);
        assert_eq!(config.password, None);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn normalize_keeps_real_credentials() {
        let mut config = ProxyConfig {
            username: Some(" user ".to_string()),
            password: Some("pass".to_string()),
            ..ProxyConfig::default()
        };
        config.normalize();
        assert_eq!(config.username.as_deref(), Some("user"));
        assert_eq!(config.password.as_deref(), Some("pass"));
    }

    #[test]
    fn sanitized_strips_password_only() {
        let config = ProxyConfig {
            host: "h".to_string(),
            username: Some("u".to_string()),
            password: Some("p".to_string()),
            ..ProxyConfig::default()
        };
        let sanitized = config.sanitized();
        assert_eq!(sanitized.username.as_deref(), Some("u"));
        assert_eq!(sanitized.password, None);
    }

    #[test]
    fn advanced_settings_validate_dns() {
        let mut settings = AdvancedSettings {
            custom_dns: Some("1.1.1.1,8.8.8.8".to_string()),
            ..AdvancedSettings::default()
        };
        assert!(settings.validate().is_ok());

        settings.custom_dns = Some("1.1.1.1,999.0.0.1".to_string());
        assert!(settings.validate().is_err());
    }

    #[test]
    fn advanced_settings_normalize_empty_dns_to_absent() {
        let mut settings = AdvancedSettings {
            custom_dns: Some("  ".to_string()),
            ..AdvancedSettings::default()
        };
        settings.normalize();
        assert_eq!(settings.custom_dns, None);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn config_serializes_without_password() {
        let config = ProxyConfig {
            password: Some("secret".to_string()),
            ..ProxyConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"type\":\"socks5\""));
    }
}
