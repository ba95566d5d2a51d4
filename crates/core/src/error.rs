use std::fmt;

use proxydesk_proxy::TunnelError;

/// Error surface of the connection engine. Tester and monitor failures are
/// converted into result/status values before they reach callers; this type
/// is what the boundary methods that CAN fail return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    Validation(String),
    Connect(String),
    Auth(String),
    Protocol(String),
    Busy,
    AlreadyActive,
    Storage(String),
}

impl ProxyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Stable machine-readable code, used by the command boundary.
    pub fn code(&self) -> &'static str {
        match self {
            ProxyError::Validation(_) => "VALIDATION_ERROR",
            ProxyError::Connect(_) => "CONNECT_ERROR",
            ProxyError::Auth(_) => "AUTH_ERROR",
            ProxyError::Protocol(_) => "PROTOCOL_ERROR",
            ProxyError::Busy => "BUSY",
            ProxyError::AlreadyActive => "ALREADY_ACTIVE",
            ProxyError::Storage(_) => "STORAGE_ERROR",
        }
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::Validation(m) => write!(f, "invalid configuration: {m}"),
            ProxyError::Connect(m) => write!(f, "connection failed: {m}"),
            ProxyError::Auth(m) => write!(f, "authentication failed: {m}"),
            ProxyError::Protocol(m) => write!(f, "protocol error: {m}"),
            ProxyError::Busy => write!(f, "another connection operation is in progress"),
            ProxyError::AlreadyActive => write!(f, "proxy path is already active"),
            ProxyError::Storage(m) => write!(f, "storage error: {m}"),
        }
    }
}

impl std::error::Error for ProxyError {}

impl From<TunnelError> for ProxyError {
    fn from(err: TunnelError) -> Self {
        match err {
            TunnelError::Connect(m) => ProxyError::Connect(m),
            TunnelError::Auth(m) => ProxyError::Auth(m),
            TunnelError::Protocol(m) => ProxyError::Protocol(m),
            TunnelError::Timeout(m) => ProxyError::Connect(m),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProxyError>;
