//! Domain types shared across the proof path.
//!
//! Contains the data-source views (`RawTransaction`, `BlockHeader`,
//! `MerkleBranch`), the settlement-contract shapes (`InclusionProof`,
//! `BlockReference`), the assembled `ProofBundle`, and the two height
//! newtypes that keep Bitcoin and settlement-chain heights apart.

use bitcoin::hex::{DisplayHex, FromHex};
use bitcoin::{Amount, BlockHash};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ==============================================================================
// Heights
// ==============================================================================

/// A Bitcoin block height ("burn height").
///
/// Headers and Merkle branches are indexed by this height. It is a
/// distinct type from [`SettlementHeight`] so the two cannot be swapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BurnHeight(pub u32);

/// The settlement-chain height at which a Bitcoin block was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementHeight(pub u32);

impl std::fmt::Display for BurnHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for SettlementHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Result of correlating a Bitcoin block with the settlement chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightPair {
    pub burn_height: BurnHeight,
    pub settlement_height: SettlementHeight,
}

// ==============================================================================
// Data Source Views
// ==============================================================================

/// One output of the verbose-decoded transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutputView {
    /// Address the node decoded for this output; `None` for scripts with no
    /// standard address form (e.g. `OP_RETURN`).
    pub address: Option<String>,
    pub value: Amount,
}

/// A transaction as returned by the data source: the raw encoding plus the
/// fields of the verbose view that the proof path consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTransaction {
    /// Raw consensus encoding, hex. May include witness data.
    pub hex: String,
    /// Containing block; `None` while the transaction sits in the mempool.
    #[serde(rename = "blockhash")]
    pub block_hash: Option<BlockHash>,
    pub outputs: Vec<TxOutputView>,
}

/// Length of a serialized Bitcoin block header.
pub const BLOCK_HEADER_LEN: usize = 80;

/// Serialized 80-byte block header. Serializes as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader(pub [u8; BLOCK_HEADER_LEN]);

impl BlockHeader {
    pub fn as_bytes(&self) -> &[u8; BLOCK_HEADER_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.as_slice().to_lower_hex_string()
    }

    /// Decode the header, e.g. to read its Merkle root.
    pub fn decode(&self) -> Result<bitcoin::block::Header, bitcoin::consensus::encode::Error> {
        bitcoin::consensus::deserialize(&self.0)
    }
}

impl std::str::FromStr for BlockHeader {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = Vec::<u8>::from_hex(s).map_err(|e| format!("invalid header hex: {e}"))?;
        let len = bytes.len();
        let array: [u8; BLOCK_HEADER_LEN] = bytes
            .try_into()
            .map_err(|_| format!("header must be {BLOCK_HEADER_LEN} bytes, got {len}"))?;
        Ok(Self(array))
    }
}

impl Serialize for BlockHeader {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockHeader {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Merkle branch exactly as the data source delivered it: sibling hashes in
/// wire byte order, leaf to root, plus the transaction's position in the block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBranch {
    pub sibling_hashes: Vec<[u8; 32]>,
    pub position: u32,
}

// ==============================================================================
// Settlement Contract Shapes
// ==============================================================================

/// Inclusion proof in the shape the settlement contract consumes.
///
/// Field names are fixed by the contract call: `hashes`, `tx-index`,
/// `tree-depth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InclusionProof {
    pub hashes: Vec<String>,
    pub tx_index: u32,
    pub tree_depth: u32,
}

/// Block argument of the settlement contract call. `height` is the
/// settlement-chain height, not the Bitcoin height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReference {
    pub header: BlockHeader,
    pub height: SettlementHeight,
}

// ==============================================================================
// Proof Bundle
// ==============================================================================

/// Everything a settlement call needs for one transaction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBundle {
    #[serde(rename = "txHex")]
    pub tx_hex_no_witness: String,
    pub proof: InclusionProof,
    pub block: BlockReference,
    #[serde(rename = "tx")]
    pub raw_tx: RawTransaction,
    /// Index of the output paying the expected address. Serialized as `-1`
    /// when no output matches.
    #[serde(serialize_with = "serialize_output_index")]
    pub output_index: Option<u32>,
}

impl ProofBundle {
    /// Output index as the signed integer the contract call expects.
    pub fn output_index_or_sentinel(&self) -> i64 {
        self.output_index.map_or(-1, i64::from)
    }
}

fn serialize_output_index<S: Serializer>(
    index: &Option<u32>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(index.map_or(-1, i64::from))
}
