use bitcoin::hex::FromHex;
use bitcoin::{Amount, BlockHash, Txid};

use crate::error::CoreError;
use crate::types::{BlockHeader, BurnHeight, MerkleBranch, RawTransaction, TxOutputView};

/// Parse a verbose `blockchain.transaction.get` result.
///
/// The verbose form is bitcoind's `getrawtransaction` object passed through
/// by the server: `hex`, `blockhash` (absent while unconfirmed) and `vout`.
pub(super) fn parse_verbose_transaction(
    txid: &Txid,
    raw: &serde_json::Value,
) -> Result<RawTransaction, CoreError> {
    if raw.is_string() {
        return Err(CoreError::InvalidResponse(
            "server returned a non-verbose transaction; verbose mode is required".into(),
        ));
    }

    if let Some(reported) = raw.get("txid").and_then(serde_json::Value::as_str) {
        if reported != txid.to_string() {
            return Err(CoreError::InvalidResponse(format!(
                "asked for transaction {txid}, server returned {reported}"
            )));
        }
    }

    let hex = raw
        .get("hex")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| CoreError::InvalidResponse("missing hex in transaction".into()))?
        .to_owned();
    let block_hash = parse_opt_block_hash(raw.get("blockhash"))?;
    let vout = raw
        .get("vout")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| CoreError::InvalidResponse("missing vout array".into()))?;

    Ok(RawTransaction {
        hex,
        block_hash,
        outputs: parse_vout(vout)?,
    })
}

fn parse_opt_block_hash(value: Option<&serde_json::Value>) -> Result<Option<BlockHash>, CoreError> {
    match value.and_then(serde_json::Value::as_str) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|e| CoreError::InvalidResponse(format!("invalid blockhash: {e}"))),
    }
}

fn parse_vout(vout: &[serde_json::Value]) -> Result<Vec<TxOutputView>, CoreError> {
    vout.iter()
        .map(|output| {
            let value = parse_btc_amount(
                output
                    .get("value")
                    .ok_or_else(|| CoreError::InvalidResponse("missing value in vout".into()))?,
            )?;

            Ok(TxOutputView {
                address: output.get("scriptPubKey").and_then(script_address),
                value,
            })
        })
        .collect()
}

/// Newer bitcoind reports a single `address`; older releases an
/// `addresses` array. The first entry of the array is what gets matched.
fn script_address(spk: &serde_json::Value) -> Option<String> {
    spk.get("address")
        .and_then(serde_json::Value::as_str)
        .or_else(|| {
            spk.get("addresses")
                .and_then(serde_json::Value::as_array)
                .and_then(|a| a.first())
                .and_then(serde_json::Value::as_str)
        })
        .map(str::to_owned)
}

/// Parse a BTC amount from a JSON value.
///
/// Number values are parsed via `Amount::from_float_in` to support scientific
/// notation, while string values are parsed via `Amount::from_str_in`.
fn parse_btc_amount(value: &serde_json::Value) -> Result<Amount, CoreError> {
    match value {
        serde_json::Value::Number(n) => {
            let parsed = n.as_f64().ok_or_else(|| {
                CoreError::InvalidResponse(format!("invalid BTC amount `{value}`"))
            })?;
            Amount::from_float_in(parsed, bitcoin::Denomination::Bitcoin)
                .map_err(|e| CoreError::InvalidResponse(format!("invalid BTC amount `{value}`: {e}")))
        }
        serde_json::Value::String(s) => Amount::from_str_in(s, bitcoin::Denomination::Bitcoin)
            .map_err(|e| CoreError::InvalidResponse(format!("invalid BTC amount `{s}`: {e}"))),
        _ => Err(CoreError::InvalidResponse(format!(
            "expected numeric BTC amount, got: {value}"
        ))),
    }
}

/// Parse a `blockchain.block.header` result (hex string of 80 bytes).
pub(super) fn parse_block_header(raw: &serde_json::Value) -> Result<BlockHeader, CoreError> {
    raw.as_str()
        .ok_or_else(|| CoreError::InvalidResponse(format!("expected header hex, got: {raw}")))?
        .parse::<BlockHeader>()
        .map_err(CoreError::InvalidResponse)
}

#[derive(serde::Deserialize)]
struct MerkleResponse {
    merkle: Vec<String>,
    pos: u32,
    #[serde(default)]
    block_height: Option<u32>,
}

/// Parse a `blockchain.transaction.get_merkle` result.
///
/// Sibling hashes are decoded exactly as sent; byte order is fixed later by
/// the proof builder.
pub(super) fn parse_merkle_branch(
    raw: serde_json::Value,
    height: BurnHeight,
) -> Result<MerkleBranch, CoreError> {
    let response: MerkleResponse = serde_json::from_value(raw)
        .map_err(|e| CoreError::InvalidResponse(format!("invalid get_merkle result: {e}")))?;

    if let Some(reported) = response.block_height {
        if reported != height.0 {
            return Err(CoreError::InvalidResponse(format!(
                "merkle branch for height {height} came back for height {reported}"
            )));
        }
    }

    let sibling_hashes = response
        .merkle
        .iter()
        .enumerate()
        .map(|(level, hex)| {
            Vec::<u8>::from_hex(hex)
                .ok()
                .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
                .ok_or_else(|| {
                    CoreError::InvalidResponse(format!("merkle hash {level} is not 32-byte hex"))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MerkleBranch {
        sibling_hashes,
        position: response.pos,
    })
}
