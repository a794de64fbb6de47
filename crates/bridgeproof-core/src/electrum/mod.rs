//! Electrum data-source abstraction.
//!
//! [`ChainDataConnector`] opens one [`ChainDataSession`] per request; a
//! session owns its connection exclusively and is never shared between
//! requests. Closing one session therefore cannot sever calls that belong
//! to another, which is what lets concurrent proof assemblies run against
//! the same server safely.
//!
//! [`ElectrumConnector`] speaks the Electrum protocol over TCP or TLS; a
//! builder-backed mock (`mock::MockChainData`) backs the unit tests.

#[cfg(test)]
pub mod mock;
mod tcp_adapter;

pub use tcp_adapter::{ElectrumConnector, ElectrumSession};

use async_trait::async_trait;
use bitcoin::Txid;

use crate::error::CoreError;
use crate::types::{BlockHeader, BurnHeight, MerkleBranch, RawTransaction};

/// Opens data-source sessions.
#[async_trait]
pub trait ChainDataConnector: Send + Sync {
    /// Open a fresh session. Fails with a connection error on transport,
    /// TLS, handshake or timeout failure.
    async fn connect(&self) -> Result<Box<dyn ChainDataSession>, CoreError>;
}

/// One open connection to the data source.
///
/// Calls on a session run one at a time (`&mut self`). After [`close`]
/// every call fails with `ConnectionError::Closed`.
///
/// [`close`]: ChainDataSession::close
#[async_trait]
pub trait ChainDataSession: Send {
    /// Fetch the raw transaction together with its verbose view.
    async fn fetch_transaction(&mut self, txid: &Txid) -> Result<RawTransaction, CoreError>;

    /// Fetch the 80-byte header of the block at `height`.
    async fn fetch_block_header(&mut self, height: BurnHeight) -> Result<BlockHeader, CoreError>;

    /// Fetch the Merkle branch proving `txid` is in the block at `height`.
    async fn fetch_merkle_branch(
        &mut self,
        txid: &Txid,
        height: BurnHeight,
    ) -> Result<MerkleBranch, CoreError>;

    /// Release the connection. Idempotent and infallible: shutdown
    /// problems are logged, never returned.
    async fn close(&mut self);
}
