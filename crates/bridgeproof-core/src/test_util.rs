//! Shared test helpers for `bridgeproof-core` unit tests.
//!
//! Builders for transactions, Merkle branches and headers, plus tiny
//! loopback servers that speak just enough Electrum / HTTP for the network
//! adapters to be exercised without external services.

use std::net::SocketAddr;
use std::sync::Arc;

use bitcoin::hashes::{sha256d, Hash};
use bitcoin::{
    absolute, transaction, Amount, BlockHash, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxMerkleNode, TxOut, Txid, Witness,
};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

use crate::types::{BlockHeader, MerkleBranch, BLOCK_HEADER_LEN};

/// Hex of the segwit marker (0x00) and flag (0x01) bytes.
pub const WITNESS_MARKER_FLAG: &str = "0001";

// ==============================================================================
// Hash Helpers
// ==============================================================================

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    bytes[31] = 0x5a;
    Txid::from_byte_array(bytes)
}

pub fn block_hash_from_byte(b: u8) -> BlockHash {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    BlockHash::from_byte_array(bytes)
}

// ==============================================================================
// Transaction Builders
// ==============================================================================

/// Minimal P2WPKH scriptPubKey with a recognisable 20-byte program.
pub fn p2wpkh_script(tag: u8) -> ScriptBuf {
    let mut bytes = vec![0x00, 0x14];
    bytes.extend(std::iter::repeat(tag).take(20));
    ScriptBuf::from_bytes(bytes)
}

/// A version-2 transaction whose every input carries a two-item witness.
pub fn segwit_tx(inputs: u8, outputs: u8) -> Transaction {
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::from_consensus(800_000),
        input: (0..inputs)
            .map(|i| TxIn {
                previous_output: OutPoint::new(txid_from_byte(i + 1), u32::from(i)),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                witness: Witness::from_slice(&[vec![0x30; 71], vec![0x02; 33]]),
            })
            .collect(),
        output: (0..outputs)
            .map(|j| TxOut {
                value: Amount::from_sat(10_000 * (u64::from(j) + 1)),
                script_pubkey: p2wpkh_script(j + 1),
            })
            .collect(),
    }
}

// ==============================================================================
// Merkle / Header Builders
// ==============================================================================

/// Build the Electrum-style branch (siblings in wire byte order) for
/// `txids[index]`, and the block Merkle root the branch folds to.
pub fn merkle_branch_for(txids: &[Txid], index: usize) -> (MerkleBranch, TxMerkleNode) {
    let mut level: Vec<[u8; 32]> = txids.iter().map(|t| t.to_byte_array()).collect();
    let mut idx = index;
    let mut siblings = Vec::new();

    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        let mut wire = level[idx ^ 1];
        wire.reverse();
        siblings.push(wire);

        level = level
            .chunks(2)
            .map(|pair| {
                let mut buf = [0u8; 64];
                buf[..32].copy_from_slice(&pair[0]);
                buf[32..].copy_from_slice(&pair[1]);
                sha256d::Hash::hash(&buf).to_byte_array()
            })
            .collect();
        idx /= 2;
    }

    let root: TxMerkleNode = bitcoin::merkle_tree::calculate_root(txids.iter().copied())
        .map(TxMerkleNode::from)
        .expect("txid list must not be empty");
    assert_eq!(root.to_byte_array(), level[0], "branch builder disagrees with bitcoin crate");

    (
        MerkleBranch {
            sibling_hashes: siblings,
            position: index as u32,
        },
        root,
    )
}

/// An 80-byte header committing to `root`.
pub fn header_with_root(root: TxMerkleNode) -> BlockHeader {
    let header = bitcoin::block::Header {
        version: bitcoin::block::Version::ONE,
        prev_blockhash: BlockHash::all_zeros(),
        merkle_root: root,
        time: 1_700_000_000,
        bits: bitcoin::CompactTarget::from_consensus(0x1d00ffff),
        nonce: 7,
    };
    let bytes: [u8; BLOCK_HEADER_LEN] = bitcoin::consensus::serialize(&header)
        .try_into()
        .expect("header serializes to 80 bytes");
    BlockHeader(bytes)
}

// ==============================================================================
// Loopback Servers
// ==============================================================================

/// Reply produced by an Electrum test handler.
pub enum ElectrumReply {
    Result(serde_json::Value),
    Error(serde_json::Value),
    /// Never answer, to simulate an unresponsive server.
    Silent,
}

/// Serve newline-delimited JSON-RPC on a loopback port. Every request is
/// answered as `handler(method, params)` decides. When `notify_first` is set, a
/// subscription notification is pushed before each response.
pub async fn serve_electrum<F>(handler: F, notify_first: bool) -> SocketAddr
where
    F: Fn(&str, &serde_json::Value) -> ElectrumReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener has address");
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let (read, mut write) = socket.into_split();
                let mut lines = BufReader::new(read).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let req: serde_json::Value =
                        serde_json::from_str(&line).expect("client sends JSON");
                    let method = req["method"].as_str().unwrap_or_default().to_owned();
                    let reply = handler(&method, &req["params"]);

                    if notify_first {
                        let note = serde_json::json!({
                            "jsonrpc": "2.0",
                            "method": "blockchain.headers.subscribe",
                            "params": [{ "height": 1, "hex": "00" }]
                        });
                        let _ = write.write_all(format!("{note}\n").as_bytes()).await;
                    }

                    let response = match reply {
                        ElectrumReply::Result(result) => {
                            serde_json::json!({ "jsonrpc": "2.0", "id": req["id"], "result": result })
                        }
                        ElectrumReply::Error(error) => {
                            serde_json::json!({ "jsonrpc": "2.0", "id": req["id"], "error": error })
                        }
                        ElectrumReply::Silent => continue,
                    };
                    if write
                        .write_all(format!("{response}\n").as_bytes())
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            });
        }
    });

    addr
}

/// Answer exactly one HTTP request with `status_line` and a JSON `body`.
pub async fn serve_http_once(status_line: &'static str, body: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback listener");
    let addr = listener.local_addr().expect("listener has address");

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut chunk = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => request.extend_from_slice(&chunk[..n]),
            }
        }
        let response = format!(
            "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });

    addr
}
