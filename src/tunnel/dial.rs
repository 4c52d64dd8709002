use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;

use crate::error::{Result, TunnelError};
use crate::socks5::protocol::ProxyEndpoint;

/// Transport kind of a dial request. Only TCP is tunneled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Tcp,
}

impl std::str::FromStr for Network {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcp" => Ok(Network::Tcp),
            other => Err(TunnelError::UnsupportedNetwork(other.to_string())),
        }
    }
}

/// Capability to open one outbound byte stream to `addr`.
///
/// Implementations open exactly one socket per call and never retry. The
/// caller owns the returned stream.
pub trait Dial: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn dial(
        &self,
        network: Network,
        addr: &str,
    ) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Dials targets through a SOCKS5 proxy (no authentication, direct TCP to the proxy).
#[derive(Debug, Clone)]
pub struct Socks5Dialer {
    proxy: ProxyEndpoint,
}

impl Socks5Dialer {
    pub fn new(proxy: ProxyEndpoint) -> Self {
        Self { proxy }
    }

    pub fn proxy(&self) -> &ProxyEndpoint {
        &self.proxy
    }
}

/// Build a dialer for `socks5://host:port`
pub fn make_dialer(proxy_url: &str) -> Result<Socks5Dialer> {
    Ok(Socks5Dialer::new(ProxyEndpoint::parse(proxy_url)?))
}

impl Dial for Socks5Dialer {
    type Stream = Socks5Stream<TcpStream>;

    async fn dial(&self, network: Network, addr: &str) -> Result<Self::Stream> {
        let Network::Tcp = network;
        debug!(proxy = %self.proxy, dest = addr, "socks5 connect");

        Socks5Stream::connect(self.proxy.addr(), addr.to_string())
            .await
            .map_err(|source| TunnelError::Proxy {
                target: addr.to_string(),
                source,
            })
    }
}

/// Dials targets with a plain TCP connect.
///
/// Used as the egress of the SOCKS5 server in place of an SSH channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectDialer;

impl Dial for DirectDialer {
    type Stream = TcpStream;

    async fn dial(&self, network: Network, addr: &str) -> Result<Self::Stream> {
        let Network::Tcp = network;

        TcpStream::connect(addr)
            .await
            .map_err(|source| TunnelError::Connect {
                target: addr.to_string(),
                source,
            })
    }
}

/// Result of a dial or handshake raced against a deadline
#[derive(Debug)]
pub enum DialOutcome<S> {
    Connected(S),
    TimedOut,
    Failed(TunnelError),
}

impl<S> DialOutcome<S> {
    pub fn into_result(self, target: &str, deadline: Duration) -> Result<S> {
        match self {
            DialOutcome::Connected(stream) => Ok(stream),
            DialOutcome::TimedOut => Err(TunnelError::DialTimeout {
                target: target.to_string(),
                after: deadline,
            }),
            DialOutcome::Failed(err) => Err(err),
        }
    }
}

/// Run `attempt` to completion or until `deadline` elapses.
///
/// The attempt is dropped on timeout, which closes any socket it had opened.
pub async fn with_deadline<S, F>(deadline: Duration, attempt: F) -> DialOutcome<S>
where
    F: Future<Output = Result<S>>,
{
    match tokio::time::timeout(deadline, attempt).await {
        Ok(Ok(stream)) => DialOutcome::Connected(stream),
        Ok(Err(err)) => DialOutcome::Failed(err),
        Err(_) => DialOutcome::TimedOut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_network_from_str() {
        assert_eq!("tcp".parse::<Network>().unwrap(), Network::Tcp);
        assert!(matches!(
            "udp".parse::<Network>(),
            Err(TunnelError::UnsupportedNetwork(n)) if n == "udp"
        ));
    }

    #[test]
    fn test_make_dialer_rejects_bad_url() {
        assert!(make_dialer("http://127.0.0.1:1080").is_err());
        let dialer = make_dialer("socks5://127.0.0.1:1080").unwrap();
        assert_eq!(dialer.proxy().addr(), "127.0.0.1:1080");
    }

    #[tokio::test]
    async fn test_with_deadline_times_out() {
        let outcome: DialOutcome<()> =
            with_deadline(Duration::from_millis(20), std::future::pending()).await;
        assert!(matches!(outcome, DialOutcome::TimedOut));

        let err = outcome
            .into_result("10.0.0.1:22", Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, TunnelError::DialTimeout { .. }));
    }

    #[tokio::test]
    async fn test_with_deadline_passes_through_results() {
        let outcome = with_deadline(Duration::from_secs(1), async { Ok(7u8) }).await;
        assert!(matches!(outcome, DialOutcome::Connected(7)));

        let outcome: DialOutcome<u8> = with_deadline(Duration::from_secs(1), async {
            Err(TunnelError::UnsupportedNetwork("udp".into()))
        })
        .await;
        assert!(matches!(outcome, DialOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_direct_dialer_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"hello").await.unwrap();
        });

        let mut stream = DirectDialer.dial(Network::Tcp, &addr).await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_socks5_dialer_unreachable_proxy() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dialer = make_dialer(&format!("socks5://127.0.0.1:{port}")).unwrap();
        let err = dialer.dial(Network::Tcp, "example.com:80").await.unwrap_err();
        assert!(matches!(err, TunnelError::Proxy { ref target, .. } if target == "example.com:80"));
        assert!(err.is_dial_failure());
    }
}
