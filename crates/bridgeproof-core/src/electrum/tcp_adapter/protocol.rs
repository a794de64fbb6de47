use bitcoin::Txid;

use crate::error::{ConnectionError, CoreError};

#[derive(serde::Serialize)]
pub(super) struct ElectrumRequest<'a> {
    pub(super) jsonrpc: &'static str,
    pub(super) id: u64,
    pub(super) method: &'a str,
    pub(super) params: &'a [serde_json::Value],
}

/// Any inbound line: a response (has `id`) or a notification (has `method`).
#[derive(serde::Deserialize)]
pub(super) struct ElectrumMessage {
    #[serde(default)]
    pub(super) id: Option<serde_json::Value>,
    #[serde(default)]
    pub(super) result: Option<serde_json::Value>,
    #[serde(default)]
    pub(super) error: Option<serde_json::Value>,
    #[serde(default)]
    pub(super) method: Option<String>,
}

/// Parse an Electrum error value into a structured `CoreError`.
///
/// Errors are `{"code": <int>, "message": <string>}`; some servers send a
/// bare string instead, which is kept as the message with code 0. Replies
/// saying the request form is unsupported become [`CoreError::Unsupported`].
pub(super) fn parse_electrum_error(err: serde_json::Value) -> CoreError {
    #[derive(serde::Deserialize)]
    struct ElectrumError {
        code: i64,
        message: String,
    }

    let (code, message) = match err {
        serde_json::Value::String(message) => (0, message),
        other => match serde_json::from_value::<ElectrumError>(other.clone()) {
            Ok(parsed) => (parsed.code, parsed.message),
            Err(_) => {
                return CoreError::InvalidResponse(format!("non-standard Electrum error: {other}"))
            }
        },
    };

    if is_unsupported_message(&message) {
        return CoreError::Unsupported(message);
    }
    ConnectionError::Server { code, message }.into()
}

/// electrs answers verbose `blockchain.transaction.get` with "verbose
/// transactions are currently unsupported"; other servers phrase disabled
/// methods as "not supported".
fn is_unsupported_message(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("unsupported") || msg.contains("not supported")
}

/// Response ids are echoed back as numbers, but some servers stringify them.
pub(super) fn parse_response_id(id: &serde_json::Value) -> Option<u64> {
    id.as_u64().or_else(|| id.as_str().and_then(|s| s.parse().ok()))
}

/// Convert "unknown transaction" server errors into `TxNotFound`.
///
/// ElectrumX wraps the bitcoind error (`-5 No such mempool or blockchain
/// transaction`) in its own code 2; electrs and Fulcrum use other codes,
/// so the message is what gets matched.
pub(super) fn normalize_tx_error(txid: &Txid, err: CoreError) -> CoreError {
    match err {
        CoreError::Connection(ConnectionError::Server { ref message, .. })
            if is_tx_not_found_message(message) =>
        {
            CoreError::TxNotFound(*txid)
        }
        other => other,
    }
}

fn is_tx_not_found_message(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("no such mempool")
        || msg.contains("not found")
        || msg.contains("unknown transaction")
}
