//! SOCKS5 protocol constants and types

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{Result, TunnelError};

pub const SOCKS_VERSION: u8 = 5;
pub const SOCKS_ADDR_TYPE_IPV4: u8 = 1;
pub const SOCKS_ADDR_TYPE_DOMAIN: u8 = 3;
pub const SOCKS_ADDR_TYPE_IPV6: u8 = 4;
pub const SOCKS_CMD_CONNECT: u8 = 1;

pub const SOCKS_METHOD_NO_AUTH: u8 = 0x00;
pub const SOCKS_METHOD_NONE_ACCEPTABLE: u8 = 0xFF;

pub const PROXY_SCHEME: &str = "socks5";

/// Reply codes sent in the server's CONNECT response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Reply {
    Succeeded = 0,
    GeneralFailure = 1,
    HostUnreachable = 4,
    ConnectionRefused = 5,
    CommandNotSupported = 7,
    AddressTypeNotSupported = 8,
}

impl Reply {
    /// Encode a reply with an unspecified IPv4 bind address
    pub fn encode(self) -> [u8; 10] {
        [SOCKS_VERSION, self as u8, 0, SOCKS_ADDR_TYPE_IPV4, 0, 0, 0, 0, 0, 0]
    }

    /// Pick the reply code that best describes a failed upstream dial
    pub fn for_dial_error(err: &TunnelError) -> Self {
        use std::io::ErrorKind;

        let kind = match err {
            TunnelError::Connect { source, .. } => source.kind(),
            TunnelError::Io(source) => source.kind(),
            TunnelError::DialTimeout { .. } => return Reply::HostUnreachable,
            _ => return Reply::GeneralFailure,
        };
        match kind {
            ErrorKind::ConnectionRefused => Reply::ConnectionRefused,
            ErrorKind::TimedOut | ErrorKind::NotFound | ErrorKind::AddrNotAvailable => {
                Reply::HostUnreachable
            }
            _ => Reply::GeneralFailure,
        }
    }
}

/// Immutable address of the SOCKS5 proxy that outbound dials go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    addr: String,
}

impl ProxyEndpoint {
    /// Parse `socks5://host:port`
    pub fn parse(url: &str) -> Result<Self> {
        let (scheme, rest) = url
            .split_once("://")
            .ok_or_else(|| TunnelError::InvalidProxy(format!("missing scheme in {url:?}")))?;

        if !scheme.eq_ignore_ascii_case(PROXY_SCHEME) {
            return Err(TunnelError::InvalidProxy(format!(
                "unsupported scheme {scheme:?}, expected {PROXY_SCHEME}"
            )));
        }

        let authority = rest.trim_end_matches('/');
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| TunnelError::InvalidProxy(format!("missing port in {url:?}")))?;
        if host.is_empty() {
            return Err(TunnelError::InvalidProxy(format!("missing host in {url:?}")));
        }
        port.parse::<u16>()
            .map_err(|_| TunnelError::InvalidProxy(format!("invalid port in {url:?}")))?;

        Ok(Self {
            addr: authority.to_string(),
        })
    }

    /// The proxy's `host:port`
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn url(&self) -> String {
        format!("{}://{}", PROXY_SCHEME, self.addr)
    }
}

impl std::fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// Format a requested destination for dialing as `host:port`
pub fn format_ipv4_target(addr: [u8; 4], port: u16) -> String {
    format!("{}:{}", Ipv4Addr::from(addr), port)
}

pub fn format_ipv6_target(addr: [u8; 16], port: u16) -> String {
    format!("[{}]:{}", Ipv6Addr::from(addr), port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proxy_endpoint() {
        let proxy = ProxyEndpoint::parse("socks5://127.0.0.1:1080").unwrap();
        assert_eq!(proxy.addr(), "127.0.0.1:1080");
        assert_eq!(proxy.to_string(), "socks5://127.0.0.1:1080");

        let proxy = ProxyEndpoint::parse("SOCKS5://localhost:9050/").unwrap();
        assert_eq!(proxy.addr(), "localhost:9050");
    }

    #[test]
    fn test_parse_proxy_endpoint_rejects_other_schemes() {
        assert!(matches!(
            ProxyEndpoint::parse("http://127.0.0.1:8080"),
            Err(TunnelError::InvalidProxy(_))
        ));
        assert!(ProxyEndpoint::parse("127.0.0.1:1080").is_err());
    }

    #[test]
    fn test_parse_proxy_endpoint_bad_port() {
        assert!(ProxyEndpoint::parse("socks5://127.0.0.1").is_err());
        assert!(ProxyEndpoint::parse("socks5://127.0.0.1:http").is_err());
        assert!(ProxyEndpoint::parse("socks5://:1080").is_err());
    }

    #[test]
    fn test_reply_encoding() {
        assert_eq!(
            Reply::CommandNotSupported.encode(),
            [SOCKS_VERSION, 7, 0, 1, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_reply_for_dial_error() {
        let refused = TunnelError::Connect {
            target: "127.0.0.1:1".into(),
            source: std::io::ErrorKind::ConnectionRefused.into(),
        };
        assert_eq!(Reply::for_dial_error(&refused), Reply::ConnectionRefused);
        assert_eq!(
            Reply::for_dial_error(&TunnelError::UnsupportedNetwork("udp".into())),
            Reply::GeneralFailure
        );
    }

    #[test]
    fn test_format_targets() {
        assert_eq!(format_ipv4_target([10, 0, 0, 1], 22), "10.0.0.1:22");
        let mut v6 = [0u8; 16];
        v6[15] = 1;
        assert_eq!(format_ipv6_target(v6, 443), "[::1]:443");
    }
}
