use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{Result, TunnelError};
use crate::tunnel::dial::{Dial, Network, with_deadline};
use crate::tunnel::relay::{RelayStats, relay};

/// Where every accepted connection is forwarded to
#[derive(Debug, Clone)]
pub struct ForwardRoute {
    pub network: Network,
    pub target: String,
    pub dial_timeout: Duration,
}

impl ForwardRoute {
    pub fn tcp(target: impl Into<String>, dial_timeout: Duration) -> Self {
        Self {
            network: Network::Tcp,
            target: target.into(),
            dial_timeout,
        }
    }
}

/// Local TCP endpoint whose connections are relayed to a fixed route
pub struct ForwardingListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ForwardingListener {
    /// Bind `addr`. Port 0 picks a free port; see [`local_addr`](Self::local_addr).
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TunnelError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Self::from_listener(listener)
    }

    pub fn from_listener(listener: TcpListener) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept and forward connections until the process exits.
    pub async fn serve<D: Dial>(self, dialer: Arc<D>, route: ForwardRoute) {
        self.serve_until(dialer, route, std::future::pending()).await
    }

    /// Accept and forward connections until `shutdown` resolves.
    ///
    /// Connections already being relayed keep running after shutdown.
    pub async fn serve_until<D, S>(self, dialer: Arc<D>, route: ForwardRoute, shutdown: S)
    where
        D: Dial,
        S: Future<Output = ()>,
    {
        let route = Arc::new(route);
        tokio::pin!(shutdown);

        info!(listen = %self.local_addr, dest = %route.target, "forwarding listener started");

        loop {
            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((socket, peer)) => {
                    let dialer = Arc::clone(&dialer);
                    let route = Arc::clone(&route);
                    tokio::spawn(async move {
                        match forward_connection(socket, dialer.as_ref(), &route).await {
                            Ok(stats) => info!(
                                %peer,
                                dest = %route.target,
                                sent = stats.sent.bytes,
                                received = stats.received.bytes,
                                "forward closed"
                            ),
                            Err(e) => warn!(%peer, dest = %route.target, error = %e, "forward failed"),
                        }
                    });
                }
                // Transient accept errors must not take the listener down
                Err(e) => warn!(error = %e, "failed to accept connection"),
            }
        }

        info!(listen = %self.local_addr, "forwarding listener stopped");
    }
}

/// Dial the route for one accepted socket and relay until either side ends.
///
/// On dial failure `inbound` is dropped here, which closes it.
pub async fn forward_connection<D: Dial>(
    inbound: TcpStream,
    dialer: &D,
    route: &ForwardRoute,
) -> Result<RelayStats> {
    let upstream = with_deadline(route.dial_timeout, dialer.dial(route.network, &route.target))
        .await
        .into_result(&route.target, route.dial_timeout)?;

    debug!(dest = %route.target, "upstream connected");
    Ok(relay(inbound, upstream).await)
}
