//! Bitcoin block → settlement-chain height correlation.
//!
//! Headers and Merkle branches are fetched by Bitcoin ("burn") height, but
//! the settlement contract wants the settlement-chain height at which that
//! Bitcoin block was observed. A [`HeightResolver`] supplies both for one
//! block hash.

mod http_adapter;

pub use http_adapter::HttpHeightResolver;

use std::collections::HashMap;

use async_trait::async_trait;
use bitcoin::BlockHash;

use crate::error::CoreError;
use crate::types::HeightPair;

#[async_trait]
pub trait HeightResolver: Send + Sync {
    /// Resolve the heights of the block identified by `block_hash`.
    ///
    /// Fails with [`CoreError::UnknownBlock`] when the settlement chain has
    /// not observed the block yet.
    async fn resolve(&self, block_hash: &BlockHash) -> Result<HeightPair, CoreError>;
}

/// Fixed in-memory height table. The CLI builds one from `--static-height`
/// for local development networks where no heights API runs.
#[derive(Debug, Clone, Default)]
pub struct StaticHeightResolver {
    heights: HashMap<BlockHash, HeightPair>,
}

impl StaticHeightResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block(mut self, block_hash: BlockHash, heights: HeightPair) -> Self {
        self.heights.insert(block_hash, heights);
        self
    }
}

#[async_trait]
impl HeightResolver for StaticHeightResolver {
    async fn resolve(&self, block_hash: &BlockHash) -> Result<HeightPair, CoreError> {
        self.heights
            .get(block_hash)
            .copied()
            .ok_or(CoreError::UnknownBlock(*block_hash))
    }
}
