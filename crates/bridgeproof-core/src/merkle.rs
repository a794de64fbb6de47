//! Merkle branch → settlement inclusion proof.
//!
//! Electrum hands out sibling hashes as hex in display order (the byte
//! order txids are usually printed in). The settlement contract folds the
//! branch in internal byte order, so every sibling is reversed. Order and
//! position are carried over untouched: the contract walks the branch leaf
//! to root and uses the position bits to pick left/right at each level.
//!
//! [`build`] does no hashing; the queried node is trusted for the branch and
//! the contract checks the resulting root. [`compute_root`] replays the
//! contract's fold locally for callers that want to check before submitting.

use bitcoin::hashes::{sha256d, Hash};
use bitcoin::hex::{DisplayHex, FromHex};
use bitcoin::{TxMerkleNode, Txid};

use crate::error::CoreError;
use crate::types::{BlockHeader, InclusionProof, MerkleBranch};

/// Reshape a data-source branch into the contract's proof structure.
pub fn build(branch: &MerkleBranch) -> InclusionProof {
    let hashes: Vec<String> = branch
        .sibling_hashes
        .iter()
        .map(|hash| {
            let mut reversed = *hash;
            reversed.reverse();
            reversed.as_slice().to_lower_hex_string()
        })
        .collect();

    InclusionProof {
        tree_depth: hashes.len() as u32,
        hashes,
        tx_index: branch.position,
    }
}

/// Fold `proof` from the leaf `txid` up to the Merkle root.
pub fn compute_root(txid: &Txid, proof: &InclusionProof) -> Result<TxMerkleNode, CoreError> {
    let mut current = txid.to_byte_array();
    let mut index = proof.tx_index;

    for (level, hash_hex) in proof.hashes.iter().enumerate() {
        let sibling = hash_from_hex(hash_hex).ok_or_else(|| {
            CoreError::InvalidInput(format!("proof hash {level} is not a 32-byte hex hash"))
        })?;

        let mut pair = [0u8; 64];
        let (left, right) = if index & 1 == 0 {
            (&current, &sibling)
        } else {
            (&sibling, &current)
        };
        pair[..32].copy_from_slice(left);
        pair[32..].copy_from_slice(right);
        current = sha256d::Hash::hash(&pair).to_byte_array();
        index >>= 1;
    }

    Ok(TxMerkleNode::from_byte_array(current))
}

fn hash_from_hex(hex: &str) -> Option<[u8; 32]> {
    Vec::<u8>::from_hex(hex).ok()?.try_into().ok()
}

/// Whether `proof` links `txid` to the Merkle root committed in `header`.
///
/// A header that fails to decode or a proof with unparsable hashes counts
/// as not verified.
pub fn verify_inclusion(txid: &Txid, proof: &InclusionProof, header: &BlockHeader) -> bool {
    let Ok(decoded) = header.decode() else {
        return false;
    };
    match compute_root(txid, proof) {
        Ok(root) => root == decoded.merkle_root,
        Err(_) => false,
    }
}
