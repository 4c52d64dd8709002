//! Explicit configuration values handed to each component at construction.

use std::time::Duration;

use crate::console::ConsoleLocation;
use crate::error::Result;
use crate::socks5::protocol::ProxyEndpoint;
use crate::tunnel::listener::ForwardRoute;

pub const DEFAULT_SOCKS_LISTEN: &str = "127.0.0.1:1080";
pub const DEFAULT_FORWARD_LISTEN: &str = "127.0.0.1:0";
/// Upper bound for establishing an upstream connection or handshake
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(60);

/// SOCKS5 egress server
#[derive(Debug, Clone)]
pub struct SocksConfig {
    pub listen: String,
}

impl Default for SocksConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_SOCKS_LISTEN.to_string(),
        }
    }
}

/// Forwarding listener
#[derive(Debug, Clone)]
pub struct ForwardConfig {
    pub listen: String,
    /// Proxy to dial through; `None` starts an embedded egress server
    pub proxy: Option<ProxyEndpoint>,
    pub target: String,
    pub dial_timeout: Duration,
}

impl ForwardConfig {
    pub fn new(
        listen: impl Into<String>,
        proxy: Option<&str>,
        target: impl Into<String>,
        dial_timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            listen: listen.into(),
            proxy: proxy.map(ProxyEndpoint::parse).transpose()?,
            target: target.into(),
            dial_timeout,
        })
    }

    pub fn route(&self) -> ForwardRoute {
        ForwardRoute::tcp(self.target.clone(), self.dial_timeout)
    }
}

/// Console handshake
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub proxy: ProxyEndpoint,
    pub location: ConsoleLocation,
    pub session_id: String,
    pub timeout: Duration,
}

impl ConsoleConfig {
    pub fn new(
        proxy: &str,
        location: &str,
        session_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            proxy: ProxyEndpoint::parse(proxy)?,
            location: ConsoleLocation::parse(location)?,
            session_id: session_id.into(),
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::dial::Network;

    #[test]
    fn test_forward_config_route() {
        let config = ForwardConfig::new(
            DEFAULT_FORWARD_LISTEN,
            Some("socks5://127.0.0.1:1080"),
            "10.0.0.1:22",
            DEFAULT_DIAL_TIMEOUT,
        )
        .unwrap();
        assert_eq!(config.proxy.as_ref().unwrap().addr(), "127.0.0.1:1080");

        let route = config.route();
        assert_eq!(route.network, Network::Tcp);
        assert_eq!(route.target, "10.0.0.1:22");
        assert_eq!(route.dial_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_forward_config_without_proxy() {
        let config =
            ForwardConfig::new("127.0.0.1:0", None, "10.0.0.1:22", DEFAULT_DIAL_TIMEOUT).unwrap();
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_config_rejects_bad_urls() {
        assert!(ForwardConfig::new("127.0.0.1:0", Some("http://x:1"), "t:1", DEFAULT_DIAL_TIMEOUT).is_err());
        assert!(ConsoleConfig::new("socks5://127.0.0.1:1080", "ftp://x/", "s", DEFAULT_DIAL_TIMEOUT).is_err());
    }
}
