use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{self, ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::{ChainEndpoint, Transport};
use crate::error::{ConnectionError, CoreError};

/// Byte stream the session reads and writes, plain TCP or TLS.
pub(super) trait ElectrumIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ElectrumIo for T {}

/// Build the TLS connector for an endpoint, or `None` for plain TCP.
///
/// Trust anchors are the bundled Mozilla roots, so no system certificate
/// store is consulted.
pub(super) fn tls_connector(transport: Transport) -> Result<Option<TlsConnector>, CoreError> {
    if transport == Transport::Tcp {
        return Ok(None);
    }

    let roots = RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };
    let config =
        ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| ConnectionError::Tls(format!("TLS configuration: {e}")))?
            .with_root_certificates(roots)
            .with_no_client_auth();

    Ok(Some(TlsConnector::from(Arc::new(config))))
}

/// Open the transport to `endpoint`, bounded by `connect_timeout` for the
/// TCP connect and again for the TLS handshake.
pub(super) async fn open_stream(
    endpoint: &ChainEndpoint,
    tls: Option<&TlsConnector>,
    connect_timeout: Duration,
) -> Result<Box<dyn ElectrumIo>, CoreError> {
    let tcp = timeout(
        connect_timeout,
        TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
    )
    .await
    .map_err(|_| ConnectionError::Timeout {
        operation: "connect",
        after: connect_timeout,
    })?
    .map_err(ConnectionError::Io)?;
    tcp.set_nodelay(true).map_err(ConnectionError::Io)?;
    debug!(endpoint = %endpoint, "tcp connected");

    let Some(connector) = tls else {
        return Ok(Box::new(tcp));
    };

    let server_name = ServerName::try_from(endpoint.host.clone()).map_err(|e| {
        ConnectionError::Tls(format!("invalid server name `{}`: {e}", endpoint.host))
    })?;
    let stream = timeout(connect_timeout, connector.connect(server_name, tcp))
        .await
        .map_err(|_| ConnectionError::Timeout {
            operation: "tls handshake",
            after: connect_timeout,
        })?
        .map_err(|e| ConnectionError::Tls(e.to_string()))?;
    debug!(endpoint = %endpoint, "tls established");

    Ok(Box::new(stream))
}
