//! Swap lifecycle classification.
//!
//! Swap records are written by other components as on-chain artifacts
//! appear; this module only reads a snapshot and derives its status from
//! which txid fields are present. Legitimate system behavior never removes
//! a field once set, so a record that reached `Finalized` stays there. That
//! is not enforced here: the classifiers are total and accept any snapshot.

use serde::{Deserialize, Serialize};

// ==============================================================================
// Records
// ==============================================================================

/// BTC → settlement-chain swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSwap {
    pub id: String,
    /// Amount sent on Bitcoin, in satoshis.
    pub input_amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btc_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize_txid: Option<String>,
}

/// Settlement-chain → BTC swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundSwap {
    #[serde(rename = "txId", alias = "settlementTxId")]
    pub settlement_txid: String,
    pub amount: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalize_txid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dir", rename_all = "lowercase")]
pub enum SwapRecord {
    Inbound(InboundSwap),
    Outbound(OutboundSwap),
}

// ==============================================================================
// States
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundStatus {
    /// Swap created; no Bitcoin transaction yet.
    Initiated,
    /// Bitcoin transaction sent; settlement not finalized.
    AwaitingFinalization,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundStatus {
    Pending,
    Finalized,
}

/// Status of either swap direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum SwapStatus {
    Inbound(InboundStatus),
    Outbound(OutboundStatus),
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

pub fn classify_inbound(swap: &InboundSwap) -> InboundStatus {
    if present(&swap.finalize_txid) {
        InboundStatus::Finalized
    } else if present(&swap.btc_txid) {
        InboundStatus::AwaitingFinalization
    } else {
        InboundStatus::Initiated
    }
}

pub fn classify_outbound(swap: &OutboundSwap) -> OutboundStatus {
    if present(&swap.finalize_txid) {
        OutboundStatus::Finalized
    } else {
        OutboundStatus::Pending
    }
}

impl SwapRecord {
    pub fn status(&self) -> SwapStatus {
        match self {
            Self::Inbound(swap) => SwapStatus::Inbound(classify_inbound(swap)),
            Self::Outbound(swap) => SwapStatus::Outbound(classify_outbound(swap)),
        }
    }

    /// Identifier shown in listings: the swap id for inbound swaps, the
    /// settlement txid for outbound ones.
    pub fn display_id(&self) -> &str {
        match self {
            Self::Inbound(swap) => &swap.id,
            Self::Outbound(swap) => &swap.settlement_txid,
        }
    }
}

impl SwapStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Inbound(InboundStatus::Finalized) | Self::Outbound(OutboundStatus::Finalized)
        )
    }

    /// Short label for swap listings.
    pub fn label(self) -> &'static str {
        match self {
            Self::Inbound(InboundStatus::Initiated) => "Started",
            Self::Inbound(InboundStatus::AwaitingFinalization)
            | Self::Outbound(OutboundStatus::Pending) => "Pending",
            Self::Inbound(InboundStatus::Finalized) | Self::Outbound(OutboundStatus::Finalized) => {
                "Successful"
            }
        }
    }
}

impl std::fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
