//! Remote-display console setup through the tunnel.
//!
//! The hypervisor exposes each console behind an HTTP(S) endpoint. A client
//! dials that endpoint through the SOCKS5 tunnel, sends `CONNECT` with its
//! session cookie, and once the response header block has been consumed the
//! same stream carries the RFB protocol, starting with the version exchange.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::error::{Result, TunnelError};
use crate::http::header::{HeaderBlock, read_header_block};
use crate::rfb::version::{ProtocolVersion, read_protocol_version};
use crate::tls::connector::TlsWrapper;
use crate::tunnel::dial::{Dial, Network, with_deadline};

/// Byte stream a console session runs over, plain or TLS
pub trait ConsoleStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ConsoleStream for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// A console URL as reported by the hypervisor, e.g.
/// `https://10.0.0.5/console?ref=OpaqueRef:1234`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLocation {
    url: String,
    pub scheme: Scheme,
    pub host: String,
    pub port: Option<u16>,
    /// Path and query sent on the CONNECT line
    pub request_uri: String,
}

impl ConsoleLocation {
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |why: &str| TunnelError::InvalidLocation(format!("{url:?}: {why}"));

        let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let scheme = if scheme.eq_ignore_ascii_case("https") {
            Scheme::Https
        } else if scheme.eq_ignore_ascii_case("http") {
            Scheme::Http
        } else {
            return Err(invalid("unsupported protocol"));
        };

        let split = rest.find(['/', '?']).unwrap_or(rest.len());
        let (authority, tail) = rest.split_at(split);
        let request_uri = match tail {
            "" => "/".to_string(),
            t if t.starts_with('?') => format!("/{t}"),
            t => t.to_string(),
        };

        let (host, port) = split_authority(authority).ok_or_else(|| invalid("bad host"))?;

        Ok(Self {
            url: url.to_string(),
            scheme,
            host,
            port,
            request_uri,
        })
    }

    /// `host:port` to dial, using the scheme's default port when none is given
    pub fn target(&self) -> String {
        let port = self.port.unwrap_or(self.scheme.default_port());
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, port)
        } else {
            format!("{}:{}", self.host, port)
        }
    }

    /// Value of the `Host` header
    pub fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match self.port {
            Some(port) => format!("{host}:{port}"),
            None => host,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }
}

// Split `host[:port]` or `[v6][:port]`
fn split_authority(authority: &str) -> Option<(String, Option<u16>)> {
    if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = match after {
            "" => None,
            p => Some(p.strip_prefix(':')?.parse().ok()?),
        };
        return (!host.is_empty()).then(|| (host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse().ok()?;
            (!host.is_empty()).then(|| (host.to_string(), Some(port)))
        }
        None => (!authority.is_empty()).then(|| (authority.to_string(), None)),
    }
}

/// Build the CONNECT request that opens a console stream
pub fn connect_request(location: &ConsoleLocation, session_id: &str) -> String {
    format!(
        "CONNECT {} HTTP/1.1\r\nHost: {}\r\nCookie: session_id={}\r\n\r\n",
        location.request_uri,
        location.authority(),
        session_id
    )
}

/// Result of a completed console handshake
pub struct ConsoleSession {
    pub stream: Box<dyn ConsoleStream>,
    /// Response header block returned for the CONNECT request
    pub header: HeaderBlock,
    /// Version advertised by the server
    pub server_version: ProtocolVersion,
    /// Version the client answered with
    pub version: ProtocolVersion,
}

/// Pick the version to answer with, or reject servers older than 3.3 / not 3.x
pub fn negotiate_version(server: ProtocolVersion) -> Result<ProtocolVersion> {
    if server.major != 3 || server.minor < 3 {
        return Err(TunnelError::UnsupportedVersion {
            major: server.major,
            minor: server.minor,
        });
    }
    Ok(server.min(ProtocolVersion::V3_8))
}

/// Send CONNECT, consume the response header, and exchange RFB versions.
///
/// Returns the header block, the server's version, and the version sent back.
pub async fn negotiate<S>(
    stream: &mut S,
    location: &ConsoleLocation,
    session_id: &str,
) -> Result<(HeaderBlock, ProtocolVersion, ProtocolVersion)>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(connect_request(location, session_id).as_bytes())
        .await?;
    stream.flush().await?;

    // Everything after the header block belongs to the RFB handshake
    let header = read_header_block(stream).await?;
    debug!(status = header.status_line().unwrap_or(""), "console responded");
    if !header.is_success() {
        return Err(TunnelError::UnexpectedStatus(
            header.status_line().unwrap_or("<unreadable>").to_string(),
        ));
    }

    let server_version = read_protocol_version(stream).await?;
    let version = negotiate_version(server_version)?;
    stream.write_all(version.to_line().as_bytes()).await?;
    stream.flush().await?;

    Ok((header, server_version, version))
}

/// Dial the console through `dialer`, wrap https in TLS, and negotiate.
///
/// The whole setup, dial included, is bounded by `timeout`.
pub async fn open_console<D: Dial>(
    dialer: &D,
    tls: &TlsWrapper,
    location: &ConsoleLocation,
    session_id: &str,
    timeout: Duration,
) -> Result<ConsoleSession> {
    let target = location.target();
    info!(location = location.as_str(), dest = %target, "opening console");

    let setup = async {
        let upstream = dialer.dial(Network::Tcp, &target).await?;
        let mut stream: Box<dyn ConsoleStream> = match location.scheme {
            Scheme::Https => Box::new(tls.wrap(upstream, &location.host).await?),
            Scheme::Http => Box::new(upstream),
        };

        let (header, server_version, version) =
            negotiate(&mut stream, location, session_id).await?;
        Ok::<_, TunnelError>(ConsoleSession {
            stream,
            header,
            server_version,
            version,
        })
    };

    let session = with_deadline(timeout, setup)
        .await
        .into_result(&target, timeout)?;
    info!(
        server_version = %session.server_version,
        version = %session.version,
        "console handshake complete"
    );
    Ok(session)
}
