use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Txid;

use crate::error::{ConnectionError, CoreError};
use crate::types::{BlockHeader, BurnHeight, MerkleBranch, RawTransaction};

use super::{ChainDataConnector, ChainDataSession};

/// A mock Electrum backend for testing. Serves canned transactions, headers
/// and branches populated via the builder pattern, and records every call
/// so tests can assert on what was (and was not) fetched.
pub struct MockChainData {
    data: Arc<CannedData>,
    log: Arc<CallLog>,
    fail_connect: bool,
}

struct CannedData {
    transactions: HashMap<Txid, RawTransaction>,
    headers: HashMap<BurnHeight, BlockHeader>,
    branches: HashMap<(Txid, BurnHeight), MerkleBranch>,
    latency: Option<Duration>,
}

/// Calls and session lifecycle observed by a [`MockChainData`].
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl CallLog {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .expect("call log poisoned")
            .iter()
            .filter(|c| c.as_str() == method)
            .count()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, method: &str) {
        self.calls
            .lock()
            .expect("call log poisoned")
            .push(method.to_owned());
    }
}

impl MockChainData {
    pub fn builder() -> MockChainDataBuilder {
        MockChainDataBuilder {
            transactions: HashMap::new(),
            headers: HashMap::new(),
            branches: HashMap::new(),
            latency: None,
            fail_connect: false,
        }
    }

    pub fn log(&self) -> Arc<CallLog> {
        Arc::clone(&self.log)
    }
}

pub struct MockChainDataBuilder {
    transactions: HashMap<Txid, RawTransaction>,
    headers: HashMap<BurnHeight, BlockHeader>,
    branches: HashMap<(Txid, BurnHeight), MerkleBranch>,
    latency: Option<Duration>,
    fail_connect: bool,
}

impl MockChainDataBuilder {
    pub fn with_tx(mut self, txid: Txid, tx: RawTransaction) -> Self {
        self.transactions.insert(txid, tx);
        self
    }

    pub fn with_header(mut self, height: BurnHeight, header: BlockHeader) -> Self {
        self.headers.insert(height, header);
        self
    }

    pub fn with_branch(mut self, txid: Txid, height: BurnHeight, branch: MerkleBranch) -> Self {
        self.branches.insert((txid, height), branch);
        self
    }

    /// Delay every session call, so concurrent requests overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every `connect` fail as an unreachable server would.
    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn build(self) -> MockChainData {
        MockChainData {
            data: Arc::new(CannedData {
                transactions: self.transactions,
                headers: self.headers,
                branches: self.branches,
                latency: self.latency,
            }),
            log: Arc::new(CallLog::default()),
            fail_connect: self.fail_connect,
        }
    }
}

#[async_trait]
impl ChainDataConnector for MockChainData {
    async fn connect(&self) -> Result<Box<dyn ChainDataSession>, CoreError> {
        self.log.record("connect");
        if self.fail_connect {
            return Err(ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock server unreachable",
            ))
            .into());
        }
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            data: Arc::clone(&self.data),
            log: Arc::clone(&self.log),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session handed out by [`MockChainData`]. Closing it affects no other
/// session.
pub struct MockSession {
    data: Arc<CannedData>,
    log: Arc<CallLog>,
    closed: AtomicBool,
}

impl MockSession {
    async fn enter(&self, method: &str) -> Result<(), CoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed.into());
        }
        self.log.record(method);
        if let Some(latency) = self.data.latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl ChainDataSession for MockSession {
    async fn fetch_transaction(&mut self, txid: &Txid) -> Result<RawTransaction, CoreError> {
        self.enter("fetch_transaction").await?;
        self.data
            .transactions
            .get(txid)
            .cloned()
            .ok_or(CoreError::TxNotFound(*txid))
    }

    async fn fetch_block_header(&mut self, height: BurnHeight) -> Result<BlockHeader, CoreError> {
        self.enter("fetch_block_header").await?;
        self.data.headers.get(&height).copied().ok_or_else(|| {
            CoreError::InvalidResponse(format!("no header at height {height}"))
        })
    }

    async fn fetch_merkle_branch(
        &mut self,
        txid: &Txid,
        height: BurnHeight,
    ) -> Result<MerkleBranch, CoreError> {
        self.enter("fetch_merkle_branch").await?;
        self.data
            .branches
            .get(&(*txid, height))
            .cloned()
            .ok_or_else(|| {
                CoreError::InvalidResponse(format!("no branch for {txid} at height {height}"))
            })
    }

    async fn close(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.log.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::txid_from_byte;

    #[tokio::test]
    async fn sessions_close_independently() {
        let mock = MockChainData::builder().build();
        let log = mock.log();

        let mut first = mock.connect().await.expect("connect");
        let mut second = mock.connect().await.expect("connect");
        first.close().await;
        first.close().await;

        let err = first
            .fetch_transaction(&txid_from_byte(1))
            .await
            .expect_err("closed session");
        assert!(matches!(err, CoreError::Connection(ConnectionError::Closed)));

        let err = second
            .fetch_transaction(&txid_from_byte(1))
            .await
            .expect_err("unknown tx");
        assert!(matches!(err, CoreError::TxNotFound(_)));

        second.close().await;
        assert_eq!(log.opened(), 2);
        assert_eq!(log.closed(), 2);
        assert_eq!(log.count("fetch_transaction"), 1);
    }

    #[tokio::test]
    async fn failing_connect_is_retryable() {
        let mock = MockChainData::builder().failing_connect().build();
        let err = mock.connect().await.err().expect("connect must fail");
        assert!(err.is_retryable());
        assert_eq!(mock.log().opened(), 0);
    }
}
