use std::str::FromStr;
use std::sync::Arc;

use bitcoin::Txid;
use tracing::{debug, info, warn};

use crate::codec;
use crate::electrum::{ChainDataConnector, ChainDataSession};
use crate::error::CoreError;
use crate::heights::HeightResolver;
use crate::merkle;
use crate::types::{BlockReference, ProofBundle, TxOutputView};

// ==============================================================================
// Proof Assembler
// ==============================================================================

/// Gathers everything a settlement call needs to prove one Bitcoin
/// transaction: witness-stripped bytes, Merkle proof, block header with its
/// settlement height, and the index of the output paying the bridge.
///
/// Every [`assemble`](Self::assemble) opens its own data-source session and
/// closes it before returning, so any number of assemblies may run
/// concurrently on one assembler.
pub struct ProofAssembler {
    connector: Arc<dyn ChainDataConnector>,
    heights: Arc<dyn HeightResolver>,
}

impl ProofAssembler {
    pub fn new(connector: Arc<dyn ChainDataConnector>, heights: Arc<dyn HeightResolver>) -> Self {
        Self { connector, heights }
    }

    /// Assemble the proof bundle for `txid`, matching outputs against
    /// `expected_address`.
    ///
    /// Either a complete bundle is returned or the first error encountered;
    /// the session is closed in both cases.
    pub async fn assemble(
        &self,
        txid: &Txid,
        expected_address: &str,
    ) -> Result<ProofBundle, CoreError> {
        let mut session = self.connector.connect().await?;
        let result = self
            .assemble_with(session.as_mut(), txid, expected_address)
            .await;
        session.close().await;

        match &result {
            Ok(bundle) => info!(
                %txid,
                settlement_height = %bundle.block.height,
                tree_depth = bundle.proof.tree_depth,
                output_index = bundle.output_index_or_sentinel(),
                "assembled inclusion proof"
            ),
            Err(err) => warn!(%txid, retryable = err.is_retryable(), error = %err, "proof assembly failed"),
        }
        result
    }

    /// [`assemble`](Self::assemble) for a txid given as 64 hex characters.
    pub async fn assemble_str(
        &self,
        txid_hex: &str,
        expected_address: &str,
    ) -> Result<ProofBundle, CoreError> {
        let txid = parse_txid_arg(txid_hex)?;
        self.assemble(&txid, expected_address).await
    }

    async fn assemble_with(
        &self,
        session: &mut dyn ChainDataSession,
        txid: &Txid,
        expected_address: &str,
    ) -> Result<ProofBundle, CoreError> {
        let raw_tx = session.fetch_transaction(txid).await?;
        let block_hash = raw_tx.block_hash.ok_or(CoreError::Unconfirmed(*txid))?;
        debug!(%txid, %block_hash, "transaction is confirmed");

        let heights = self.heights.resolve(&block_hash).await?;
        debug!(
            %block_hash,
            burn_height = %heights.burn_height,
            settlement_height = %heights.settlement_height,
            "resolved heights"
        );

        let header = session.fetch_block_header(heights.burn_height).await?;
        let header_hash = header
            .decode()
            .map_err(|e| {
                CoreError::InvalidResponse(format!(
                    "undecodable header at height {}: {e}",
                    heights.burn_height
                ))
            })?
            .block_hash();
        if header_hash != block_hash {
            return Err(CoreError::InvalidResponse(format!(
                "header at height {} is block {header_hash}, transaction is in {block_hash}",
                heights.burn_height
            )));
        }

        let branch = session
            .fetch_merkle_branch(txid, heights.burn_height)
            .await?;

        let output_index = find_output_index(&raw_tx.outputs, expected_address);
        if output_index.is_none() {
            debug!(%txid, expected_address, "no output pays the expected address");
        }

        let tx_hex_no_witness = codec::normalize_for_hash(&raw_tx.hex)?;
        let proof = merkle::build(&branch);

        Ok(ProofBundle {
            tx_hex_no_witness,
            proof,
            block: BlockReference {
                header,
                height: heights.settlement_height,
            },
            raw_tx,
            output_index,
        })
    }
}

/// Parse a txid argument: exactly 64 hex characters in display order.
pub fn parse_txid_arg(txid_hex: &str) -> Result<Txid, CoreError> {
    let trimmed = txid_hex.trim();
    if trimmed.len() != 64 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CoreError::InvalidInput(format!(
            "txid must be 64 hex characters, got `{txid_hex}`"
        )));
    }
    Txid::from_str(trimmed).map_err(|e| CoreError::InvalidInput(format!("invalid txid: {e}")))
}

/// Index of the first output whose decoded address equals `expected`.
pub fn find_output_index(outputs: &[TxOutputView], expected: &str) -> Option<u32> {
    outputs
        .iter()
        .position(|o| o.address.as_deref() == Some(expected))
        .map(|i| i as u32)
}
