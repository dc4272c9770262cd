//! Scripted in-memory node for testing.

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{Block, BlockHeader, NodeRpc, RpcError, RpcMethod, Transaction, TxIn, TxOut};

/// Chain state served by a [`MockNode`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockChainState {
    pub block_count: u64,
    /// First output value of the tip's coinbase, in base units.
    pub coinbase_value: u64,
    pub connection_count: u64,
    pub difficulty: f64,
    pub hashes_per_second: f64,
    pub network_hashes_per_second: f64,
}

impl Default for MockChainState {
    fn default() -> Self {
        Self {
            block_count: 1_000,
            coinbase_value: 500_000_000_000,
            connection_count: 8,
            difficulty: 1.5,
            hashes_per_second: 0.0,
            network_hashes_per_second: 2_500_000.0,
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: MockChainState,
    fail_on: Option<RpcMethod>,
    calls: Vec<RpcMethod>,
}

/// Mock node that answers every query from a [`MockChainState`].
///
/// It can be told to fail a given method to exercise error paths.
#[derive(Debug, Default)]
pub struct MockNode {
    inner: Mutex<Inner>,
}

impl MockNode {
    pub fn new(state: MockChainState) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state,
                ..Default::default()
            }),
        }
    }

    /// Replaces the served chain state.
    pub fn set_state(&self, state: MockChainState) {
        self.lock().state = state;
    }

    /// Makes every call to `method` fail; `None` clears the failure.
    pub fn fail_on(&self, method: Option<RpcMethod>) {
        self.lock().fail_on = method;
    }

    /// Methods called so far, in order.
    pub fn calls(&self) -> Vec<RpcMethod> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call and returns the current state unless it should fail.
    fn answer(&self, method: RpcMethod) -> Result<MockChainState, RpcError> {
        let mut inner = self.lock();
        inner.calls.push(method);
        if inner.fail_on == Some(method) {
            return Err(RpcError::Node {
                code: -1,
                message: format!("mock failure in {method}"),
            });
        }
        Ok(inner.state.clone())
    }
}

fn mock_block_hash(height: u64) -> String {
    format!("{height:064x}")
}

fn mock_block(state: &MockChainState) -> Block {
    let coinbase = Transaction {
        version: 1,
        inputs: vec![TxIn {
            prev_txid: [0u8; 32],
            prev_vout: u32::MAX,
            script_sig: state.block_count.to_le_bytes().to_vec(),
            sequence: u32::MAX,
            witness: Vec::new(),
        }],
        outputs: vec![TxOut {
            value: state.coinbase_value,
            script_pubkey: Vec::new(),
        }],
        lock_time: 0,
    };

    Block {
        header: BlockHeader {
            version: 1,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            time: 0,
            bits: 0,
            nonce: 0,
        },
        transactions: vec![coinbase],
    }
}

impl NodeRpc for MockNode {
    async fn block_count(&self) -> Result<u64, RpcError> {
        Ok(self.answer(RpcMethod::GetBlockCount)?.block_count)
    }

    async fn block_hash(&self, height: u64) -> Result<String, RpcError> {
        let state = self.answer(RpcMethod::GetBlockHash)?;
        if height > state.block_count {
            return Err(RpcError::Node {
                code: -8,
                message: "Block height out of range".to_string(),
            });
        }
        Ok(mock_block_hash(height))
    }

    async fn block(&self, hash: &str) -> Result<Block, RpcError> {
        let state = self.answer(RpcMethod::GetBlock)?;
        if hash != mock_block_hash(state.block_count) {
            return Err(RpcError::Node {
                code: -5,
                message: "Block not found".to_string(),
            });
        }
        Ok(mock_block(&state))
    }

    async fn connection_count(&self) -> Result<u64, RpcError> {
        Ok(self.answer(RpcMethod::GetConnectionCount)?.connection_count)
    }

    async fn difficulty(&self) -> Result<f64, RpcError> {
        Ok(self.answer(RpcMethod::GetDifficulty)?.difficulty)
    }

    async fn hashes_per_second(&self) -> Result<f64, RpcError> {
        Ok(self.answer(RpcMethod::GetHashesPerSec)?.hashes_per_second)
    }

    async fn network_hashes_per_second(&self) -> Result<f64, RpcError> {
        Ok(self
            .answer(RpcMethod::GetNetworkHashPs)?
            .network_hashes_per_second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_state() {
        let node = MockNode::new(MockChainState::default());

        let height = node.block_count().await.unwrap();
        let hash = node.block_hash(height).await.unwrap();
        let block = node.block(&hash).await.unwrap();

        assert_eq!(height, 1_000);
        assert_eq!(block.subsidy().unwrap(), 5000);
        assert_eq!(block.transactions[0].inputs[0].prev_txid, [0u8; 32]);
        assert_eq!(
            node.calls(),
            vec![
                RpcMethod::GetBlockCount,
                RpcMethod::GetBlockHash,
                RpcMethod::GetBlock
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let node = MockNode::default();
        node.fail_on(Some(RpcMethod::GetDifficulty));

        assert!(node.difficulty().await.is_err());
        assert!(node.connection_count().await.is_ok());

        node.fail_on(None);
        assert!(node.difficulty().await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_unknown_block() {
        let node = MockNode::default();
        let result = node.block(&mock_block_hash(7)).await;
        assert!(matches!(result, Err(RpcError::Node { code: -5, .. })));
    }
}
