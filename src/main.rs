use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use socks_tunnel::config::{
    ConsoleConfig, DEFAULT_FORWARD_LISTEN, DEFAULT_SOCKS_LISTEN, ForwardConfig, SocksConfig,
};
use socks_tunnel::console::open_console;
use socks_tunnel::socks5::protocol::ProxyEndpoint;
use socks_tunnel::socks5::server::serve_socks;
use socks_tunnel::tls::connector::TlsWrapper;
use socks_tunnel::tunnel::dial::{DirectDialer, Socks5Dialer};
use socks_tunnel::tunnel::listener::ForwardingListener;
use socks_tunnel::utils::logging::init_logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "TCP forwarding through a SOCKS5 tunnel", long_about = None)]
struct Args {
    /// Log filter directive (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a SOCKS5 egress server that dials targets directly
    Socks {
        #[arg(short, long, default_value = DEFAULT_SOCKS_LISTEN)]
        listen: String,
    },
    /// Forward every local connection to one target through the proxy
    Forward {
        /// Local address to accept connections on (port 0 picks one)
        #[arg(short, long, default_value = DEFAULT_FORWARD_LISTEN)]
        listen: String,

        /// Proxy URL, e.g. socks5://127.0.0.1:1080. Without it an embedded
        /// egress server is started on a free loopback port.
        #[arg(short, long)]
        proxy: Option<String>,

        /// Destination as host:port
        #[arg(short, long)]
        target: String,

        /// Seconds allowed for each upstream dial
        #[arg(long, default_value_t = 60)]
        dial_timeout: u64,
    },
    /// Open a remote-display console through the proxy and exchange versions
    Console {
        #[arg(short, long)]
        proxy: String,

        /// Console URL reported by the hypervisor
        #[arg(long)]
        location: String,

        /// Session reference sent as the session_id cookie
        #[arg(short, long)]
        session: String,

        /// Seconds allowed for dial and handshake
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    match args.command {
        Command::Socks { listen } => run_socks(SocksConfig { listen }).await,
        Command::Forward {
            listen,
            proxy,
            target,
            dial_timeout,
        } => {
            let config = ForwardConfig::new(
                listen,
                proxy.as_deref(),
                target,
                Duration::from_secs(dial_timeout),
            )?;
            run_forward(config).await
        }
        Command::Console {
            proxy,
            location,
            session,
            timeout,
        } => {
            let config =
                ConsoleConfig::new(&proxy, &location, session, Duration::from_secs(timeout))?;
            run_console(config).await
        }
    }
}

async fn run_socks(config: SocksConfig) -> Result<()> {
    let listener = TcpListener::bind(&config.listen)
        .await
        .context("Failed to bind SOCKS5 server")?;

    println!("🌐 SOCKS5 proxy listening on {}", listener.local_addr()?);
    serve_socks(listener, Arc::new(DirectDialer)).await;
    Ok(())
}

async fn run_forward(config: ForwardConfig) -> Result<()> {
    let proxy = match config.proxy.clone() {
        Some(proxy) => proxy,
        None => start_embedded_egress().await?,
    };

    let listener = ForwardingListener::bind(&config.listen)
        .await
        .context("Failed to bind forwarding listener")?;

    println!(
        "🚇 Forwarding {} -> {} via {}",
        listener.local_addr(),
        config.target,
        proxy
    );

    let dialer = Arc::new(Socks5Dialer::new(proxy));
    listener.serve(dialer, config.route()).await;
    Ok(())
}

// Start a SOCKS5 egress server on a free loopback port and return its URL
async fn start_embedded_egress() -> Result<ProxyEndpoint> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind embedded SOCKS5 server")?;
    let proxy = ProxyEndpoint::parse(&format!("socks5://{}", listener.local_addr()?))?;

    tokio::spawn(serve_socks(listener, Arc::new(DirectDialer)));
    println!("🌐 Embedded SOCKS5 proxy on {}", proxy.addr());
    Ok(proxy)
}

async fn run_console(config: ConsoleConfig) -> Result<()> {
    let tls = TlsWrapper::with_native_roots()?;
    let dialer = Socks5Dialer::new(config.proxy.clone());

    let session = open_console(
        &dialer,
        &tls,
        &config.location,
        &config.session_id,
        config.timeout,
    )
    .await
    .with_context(|| format!("Failed to open console at {}", config.location.as_str()))?;

    print!("📨 Received response: {}", session.header);
    println!(
        "✅ Console ready: server RFB {}, using RFB {}",
        session.server_version, session.version
    );
    Ok(())
}
