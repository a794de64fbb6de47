use std::time::Duration;

use bitcoin::{BlockHash, Txid};

/// Failures talking to an external data source (Electrum server or the
/// settlement-chain height API). Transport failures and timeouts are
/// retryable; errors the server reports about the request itself are not
/// (see [`ConnectionError::is_transient`]).
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    #[error("connection already closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("data source connection failure: {0}")]
    Connection(#[from] ConnectionError),

    #[error("transaction not found: {0}")]
    TxNotFound(Txid),

    #[error("block {0} has not been observed by the settlement chain yet")]
    UnknownBlock(BlockHash),

    #[error("transaction {0} is not confirmed in a block yet")]
    Unconfirmed(Txid),

    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("invalid response from data source: {0}")]
    InvalidResponse(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("data source does not support {0}")]
    Unsupported(String),
}

impl ConnectionError {
    /// Whether the same request may succeed when sent again.
    ///
    /// HTTP failures without a status are transport failures; with a status
    /// only 5xx and 429 are transient.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(_) | Self::Tls(_) | Self::Timeout { .. } | Self::Closed => true,
            Self::Http(err) => err.status().map_or(true, |status| {
                status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }),
            Self::Server { .. } => false,
        }
    }
}

impl CoreError {
    /// Whether the caller may retry the same request later.
    ///
    /// Transient connection failures can be retried immediately; an unknown
    /// block or an unconfirmed transaction only after the chains have caught
    /// up. Everything else is terminal for the txid at hand.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(err) => err.is_transient(),
            Self::UnknownBlock(_) | Self::Unconfirmed(_) => true,
            _ => false,
        }
    }
}
