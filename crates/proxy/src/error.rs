use std::fmt;

/// Failure classes for proxy tunnel establishment. Every network-facing
/// function in this crate returns one of these; callers map them onto
/// their own error surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelError {
    /// TCP connect refused/reset, CONNECT rejected, unreachable host.
    Connect(String),
    /// The proxy rejected the supplied credentials.
    Auth(String),
    /// The proxy spoke something other than the expected protocol.
    Protocol(String),
    /// A bounded operation exceeded its deadline.
    Timeout(String),
}

impl TunnelError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }
}

impl fmt::Display for TunnelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelError::Connect(m) => write!(f, "{m}"),
            TunnelError::Auth(m) => write!(f, "{m}"),
            TunnelError::Protocol(m) => write!(f, "{m}"),
            TunnelError::Timeout(m) => write!(f, "{m}"),
        }
    }
}

impl std::error::Error for TunnelError {}

pub type Result<T> = std::result::Result<T, TunnelError>;
