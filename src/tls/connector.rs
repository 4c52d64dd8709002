use std::sync::Arc;

use rustls::{ClientConfig, RootCertStore, ServerName};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::{debug, warn};

use crate::error::{Result, TunnelError};

/// Client-side TLS for streams that were already dialed through the tunnel
#[derive(Clone)]
pub struct TlsWrapper {
    connector: TlsConnector,
}

impl TlsWrapper {
    /// Trust the platform's native certificate store
    pub fn with_native_roots() -> Result<Self> {
        let mut root_store = RootCertStore::empty();

        let native_certs = rustls_native_certs::load_native_certs()
            .map_err(|e| TunnelError::Tls(format!("failed to load native certificates: {e}")))?;
        let mut skipped = 0usize;
        for cert in native_certs {
            if root_store.add(&rustls::Certificate(cert.0)).is_err() {
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!(skipped, "ignored unparsable native certificates");
        }
        debug!(roots = root_store.len(), "loaded native root certificates");

        Ok(Self::from_roots(root_store))
    }

    pub fn from_roots(root_store: RootCertStore) -> Self {
        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        Self::from_config(Arc::new(config))
    }

    pub fn from_config(config: Arc<ClientConfig>) -> Self {
        Self {
            connector: TlsConnector::from(config),
        }
    }

    /// Run the TLS handshake over `stream` for `server_name`
    pub async fn wrap<S>(&self, stream: S, server_name: &str) -> Result<TlsStream<S>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let name = ServerName::try_from(server_name)
            .map_err(|e| TunnelError::Tls(format!("invalid server name {server_name:?}: {e}")))?;

        self.connector
            .connect(name, stream)
            .await
            .map_err(|e| TunnelError::Tls(format!("handshake with {server_name} failed: {e}")))
    }
}
