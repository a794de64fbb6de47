//! Witness-stripped transaction encoding.
//!
//! The settlement contract hashes the transaction it is given and compares
//! the result with the leaf of the Merkle proof. Block Merkle trees commit to
//! legacy txids, which hash the encoding without the segwit marker, flag and
//! witness section, so a segwit transaction has to be re-emitted in the
//! legacy layout before it is handed over.

use bitcoin::consensus::encode::{self, Encodable};
use bitcoin::hex::DisplayHex;
use bitcoin::Transaction;

use crate::error::CoreError;

/// Parse a hex-encoded transaction. Witness data, if present, is accepted.
pub fn decode_transaction(raw_hex: &str) -> Result<Transaction, CoreError> {
    encode::deserialize_hex(raw_hex.trim())
        .map_err(|e| CoreError::MalformedTransaction(format!("cannot decode transaction: {e}")))
}

/// Legacy (pre-segwit) consensus encoding of `tx`.
///
/// Written field by field rather than through `Transaction::consensus_encode`,
/// which picks the segwit layout whenever a witness is present.
pub fn legacy_bytes(tx: &Transaction) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::with_capacity(tx.base_size());
    let encode_err =
        |e: bitcoin::io::Error| CoreError::MalformedTransaction(format!("cannot encode: {e}"));

    tx.version.consensus_encode(&mut buf).map_err(encode_err)?;
    tx.input.consensus_encode(&mut buf).map_err(encode_err)?;
    tx.output.consensus_encode(&mut buf).map_err(encode_err)?;
    tx.lock_time.consensus_encode(&mut buf).map_err(encode_err)?;
    Ok(buf)
}

/// Re-serialize `raw_hex` without witness data, returning lowercase hex.
pub fn normalize_for_hash(raw_hex: &str) -> Result<String, CoreError> {
    let tx = decode_transaction(raw_hex)?;
    Ok(legacy_bytes(&tx)?.to_lower_hex_string())
}
