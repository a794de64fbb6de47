use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Txid;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info, trace, warn};

use crate::config::ChainEndpoint;
use crate::error::{ConnectionError, CoreError};
use crate::types::{BlockHeader, BurnHeight, MerkleBranch, RawTransaction};

use super::super::{ChainDataConnector, ChainDataSession};
use super::connection::{open_stream, tls_connector, ElectrumIo};
use super::parsing::{parse_block_header, parse_merkle_branch, parse_verbose_transaction};
use super::protocol::{
    normalize_tx_error, parse_electrum_error, parse_response_id, ElectrumMessage,
    ElectrumRequest,
};

/// Electrum protocol version requested during the handshake.
const PROTOCOL_VERSION: &str = "1.4";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ==============================================================================
// Connector
// ==============================================================================

/// Opens Electrum sessions against one fixed endpoint.
///
/// Cheap to share behind an `Arc`: it holds only the immutable endpoint and
/// TLS configuration. Each [`connect`](ChainDataConnector::connect) opens a
/// new socket owned by the returned session.
pub struct ElectrumConnector {
    endpoint: ChainEndpoint,
    tls: Option<TlsConnector>,
    client_name: String,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl ElectrumConnector {
    pub fn new(endpoint: ChainEndpoint) -> Result<Self, CoreError> {
        if endpoint.host.trim().is_empty() {
            return Err(CoreError::InvalidConfig("electrum host must not be empty".into()));
        }
        let tls = tls_connector(endpoint.transport)?;

        Ok(Self {
            endpoint,
            tls,
            client_name: concat!("bridgeproof/", env!("CARGO_PKG_VERSION")).to_owned(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Override the connect (TCP + TLS) and per-request timeouts.
    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn endpoint(&self) -> &ChainEndpoint {
        &self.endpoint
    }

    /// Open and handshake a concrete session.
    pub async fn open(&self) -> Result<ElectrumSession, CoreError> {
        let stream = open_stream(&self.endpoint, self.tls.as_ref(), self.connect_timeout).await?;
        let mut session = ElectrumSession {
            stream: Some(BufReader::new(stream)),
            next_id: 1,
            request_timeout: self.request_timeout,
        };

        match session.handshake(&self.client_name).await {
            Ok(server) => {
                info!(endpoint = %self.endpoint, server = %server, "connected to Electrum server");
                Ok(session)
            }
            Err(err) => {
                session.close().await;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ChainDataConnector for ElectrumConnector {
    async fn connect(&self) -> Result<Box<dyn ChainDataSession>, CoreError> {
        Ok(Box::new(self.open().await?))
    }
}

// ==============================================================================
// Session
// ==============================================================================

/// One Electrum connection. Dropping it closes the socket as well, so a
/// cancelled request never leaks the connection.
pub struct ElectrumSession {
    /// `None` once closed or after a timeout left the stream mid-message.
    stream: Option<BufReader<Box<dyn ElectrumIo>>>,
    next_id: u64,
    request_timeout: Duration,
}

impl ElectrumSession {
    async fn handshake(&mut self, client_name: &str) -> Result<String, CoreError> {
        let result = self
            .call(
                "server.version",
                vec![
                    serde_json::json!(client_name),
                    serde_json::json!(PROTOCOL_VERSION),
                ],
            )
            .await?;

        // The result is `[server_software, negotiated_protocol]`.
        Ok(result
            .get(0)
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown")
            .to_owned())
    }

    async fn call(
        &mut self,
        method: &'static str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, CoreError> {
        let id = self.next_id;
        self.next_id += 1;
        let after = self.request_timeout;

        let stream = self.stream.as_mut().ok_or(ConnectionError::Closed)?;
        let outcome = timeout(after, exchange(stream, id, method, &params)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                // A half-read response would desynchronise later calls.
                self.stream = None;
                Err(ConnectionError::Timeout {
                    operation: method,
                    after,
                }
                .into())
            }
        }
    }
}

async fn exchange(
    stream: &mut BufReader<Box<dyn ElectrumIo>>,
    id: u64,
    method: &str,
    params: &[serde_json::Value],
) -> Result<serde_json::Value, CoreError> {
    debug!(
        electrum.id = id,
        electrum.method = method,
        electrum.params = params.len(),
        "electrum request"
    );
    let request = ElectrumRequest {
        jsonrpc: "2.0",
        id,
        method,
        params,
    };
    let mut line = serde_json::to_string(&request)
        .map_err(|e| CoreError::InvalidInput(format!("encode {method} request: {e}")))?;
    line.push('\n');

    stream
        .write_all(line.as_bytes())
        .await
        .map_err(ConnectionError::Io)?;
    stream.flush().await.map_err(ConnectionError::Io)?;

    read_response(stream, id, method).await
}

/// Read lines until the response carrying `id` arrives. Notifications and
/// responses to other ids are skipped.
async fn read_response<S>(stream: &mut S, id: u64, method: &str) -> Result<serde_json::Value, CoreError>
where
    S: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        let n = stream
            .read_line(&mut line)
            .await
            .map_err(ConnectionError::Io)?;
        if n == 0 {
            return Err(ConnectionError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ))
            .into());
        }

        let body = line.trim();
        if body.is_empty() {
            continue;
        }
        trace!(electrum.id = id, electrum.method = method, body = %body, "electrum message");

        let message: ElectrumMessage = serde_json::from_str(body).map_err(|e| {
            CoreError::InvalidResponse(format!("decode response to {method}: {e}"))
        })?;

        match message.id.as_ref().and_then(parse_response_id) {
            Some(got) if got == id => {
                debug!(electrum.id = id, electrum.method = method, body_len = body.len(), "electrum response");
                if let Some(err) = message.error.filter(|e| !e.is_null()) {
                    return Err(parse_electrum_error(err));
                }
                return Ok(message.result.unwrap_or(serde_json::Value::Null));
            }
            Some(other) => {
                debug!(electrum.id = id, stray_id = other, "skipping response to another request");
            }
            None => {
                trace!(
                    notification = message.method.as_deref().unwrap_or("?"),
                    "skipping notification"
                );
            }
        }
    }
}

#[async_trait]
impl ChainDataSession for ElectrumSession {
    async fn fetch_transaction(&mut self, txid: &Txid) -> Result<RawTransaction, CoreError> {
        let raw = self
            .call(
                "blockchain.transaction.get",
                vec![serde_json::json!(txid.to_string()), serde_json::json!(true)],
            )
            .await
            .map_err(|err| normalize_tx_error(txid, err))?;
        parse_verbose_transaction(txid, &raw)
    }

    async fn fetch_block_header(&mut self, height: BurnHeight) -> Result<BlockHeader, CoreError> {
        let raw = self
            .call("blockchain.block.header", vec![serde_json::json!(height.0)])
            .await?;
        parse_block_header(&raw)
    }

    async fn fetch_merkle_branch(
        &mut self,
        txid: &Txid,
        height: BurnHeight,
    ) -> Result<MerkleBranch, CoreError> {
        let raw = self
            .call(
                "blockchain.transaction.get_merkle",
                vec![serde_json::json!(txid.to_string()), serde_json::json!(height.0)],
            )
            .await
            .map_err(|err| normalize_tx_error(txid, err))?;
        parse_merkle_branch(raw, height)
    }

    async fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        match timeout(self.request_timeout, stream.shutdown()).await {
            Ok(Ok(())) => debug!("electrum session closed"),
            Ok(Err(err)) => warn!(error = %err, "electrum session shutdown failed"),
            Err(_) => warn!("electrum session shutdown timed out"),
        }
    }
}
