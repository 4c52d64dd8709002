//! Error types shared by the tunnel components.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, TunnelError>;

#[derive(Error, Debug)]
pub enum TunnelError {
    /// Proxy URL could not be parsed or used an unsupported scheme
    #[error("invalid proxy address: {0}")]
    InvalidProxy(String),

    #[error("unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// SOCKS5 negotiation with the proxy failed
    #[error("socks5 dial to {target} failed: {source}")]
    Proxy {
        target: String,
        #[source]
        source: tokio_socks::Error,
    },

    /// Plain TCP connect failed
    #[error("connect to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dial to {target} timed out after {}ms", .after.as_millis())]
    DialTimeout { target: String, after: Duration },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Stream ended or failed before the CRLFCRLF terminator was seen
    #[error("failed to read header block: {0}")]
    HeaderRead(#[source] std::io::Error),

    #[error("unexpected response status: {0}")]
    UnexpectedStatus(String),

    #[error("error parsing protocol version: {0:?}")]
    MalformedVersion(String),

    #[error("invalid protocol version number: {0}")]
    VersionNumber(#[from] std::num::ParseIntError),

    #[error("unsupported protocol version {major}.{minor}")]
    UnsupportedVersion { major: u32, minor: u32 },

    #[error("invalid console location: {0}")]
    InvalidLocation(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    /// Whether the error came from establishing an upstream connection
    pub fn is_dial_failure(&self) -> bool {
        matches!(
            self,
            TunnelError::Proxy { .. }
                | TunnelError::Connect { .. }
                | TunnelError::DialTimeout { .. }
                | TunnelError::UnsupportedNetwork(_)
        )
    }
}
