use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::socks5::protocol::*;
use crate::tunnel::dial::{Dial, Network};
use crate::tunnel::relay::relay;

/// Accept SOCKS5 clients forever, satisfying each CONNECT through `dialer`.
pub async fn serve_socks<D: Dial>(listener: TcpListener, dialer: Arc<D>) {
    if let Ok(addr) = listener.local_addr() {
        info!(listen = %addr, "socks5 server started");
    }

    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                let dialer = Arc::clone(&dialer);
                tokio::spawn(async move {
                    if let Err(e) = handle_socks_client(socket, addr, dialer.as_ref()).await {
                        warn!(peer = %addr, error = %e, "socks5 session failed");
                    }
                });
            }
            Err(e) => warn!(error = %e, "failed to accept SOCKS connection"),
        }
    }
}

pub async fn handle_socks_client<D: Dial>(
    mut socket: TcpStream,
    addr: SocketAddr,
    dialer: &D,
) -> Result<()> {
    // Greeting
    let mut buf = [0u8; 2];
    socket.read_exact(&mut buf).await?;

    if buf[0] != SOCKS_VERSION {
        anyhow::bail!("Unsupported SOCKS version: {}", buf[0]);
    }

    let nmethods = buf[1] as usize;
    let mut methods = vec![0u8; nmethods];
    socket.read_exact(&mut methods).await?;

    if !methods.contains(&SOCKS_METHOD_NO_AUTH) {
        socket
            .write_all(&[SOCKS_VERSION, SOCKS_METHOD_NONE_ACCEPTABLE])
            .await?;
        anyhow::bail!("Client offered no acceptable authentication method");
    }
    socket.write_all(&[SOCKS_VERSION, SOCKS_METHOD_NO_AUTH]).await?;

    // Request
    let mut buf = [0u8; 4];
    socket.read_exact(&mut buf).await?;

    if buf[0] != SOCKS_VERSION {
        anyhow::bail!("Invalid SOCKS version in request");
    }

    if buf[1] != SOCKS_CMD_CONNECT {
        socket.write_all(&Reply::CommandNotSupported.encode()).await?;
        anyhow::bail!("Only CONNECT command is supported");
    }

    let target = match buf[3] {
        SOCKS_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            socket.read_exact(&mut addr).await?;
            let port = socket.read_u16().await?;
            format_ipv4_target(addr, port)
        }
        SOCKS_ADDR_TYPE_DOMAIN => {
            let len = socket.read_u8().await?;
            let mut domain = vec![0u8; len as usize];
            socket.read_exact(&mut domain).await?;
            let port = socket.read_u16().await?;
            format!("{}:{}", String::from_utf8(domain)?, port)
        }
        SOCKS_ADDR_TYPE_IPV6 => {
            let mut addr = [0u8; 16];
            socket.read_exact(&mut addr).await?;
            let port = socket.read_u16().await?;
            format_ipv6_target(addr, port)
        }
        _ => {
            socket
                .write_all(&Reply::AddressTypeNotSupported.encode())
                .await?;
            anyhow::bail!("Unsupported address type");
        }
    };

    debug!(peer = %addr, dest = %target, "socks5 connect request");

    let upstream = match dialer.dial(Network::Tcp, &target).await {
        Ok(upstream) => upstream,
        Err(e) => {
            socket.write_all(&Reply::for_dial_error(&e).encode()).await?;
            return Err(e.into());
        }
    };

    socket.write_all(&Reply::Succeeded.encode()).await?;

    let stats = relay(socket, upstream).await;
    debug!(
        peer = %addr,
        dest = %target,
        sent = stats.sent.bytes,
        received = stats.received.bytes,
        "socks5 session closed"
    );

    Ok(())
}
