//! Node JSON-RPC access.
//!
//! The collector only talks to the node through the [`NodeRpc`] trait,
//! which allows swapping the HTTP client for the scripted [`MockNode`]
//! in tests.

mod block;
mod client;
mod mock;

pub use block::{Block, BlockError, BlockHeader, Transaction, TxIn, TxOut, COIN};
pub use client::RpcClient;
pub use mock::{MockChainState, MockNode};

use std::fmt;
use std::future::Future;
use thiserror::Error;

/// Errors returned by node RPC calls.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("node returned error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("malformed block: {0}")]
    Block(#[from] BlockError),
}

/// The JSON-RPC methods the exporter calls, in poll order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    GetBlockCount,
    GetBlockHash,
    GetBlock,
    GetConnectionCount,
    GetDifficulty,
    GetHashesPerSec,
    GetNetworkHashPs,
}

impl RpcMethod {
    /// All methods in the order a poll cycle issues them.
    pub const ALL: [RpcMethod; 7] = [
        RpcMethod::GetBlockCount,
        RpcMethod::GetBlockHash,
        RpcMethod::GetBlock,
        RpcMethod::GetConnectionCount,
        RpcMethod::GetDifficulty,
        RpcMethod::GetHashesPerSec,
        RpcMethod::GetNetworkHashPs,
    ];

    /// Wire name of the method.
    pub fn as_str(self) -> &'static str {
        match self {
            RpcMethod::GetBlockCount => "getblockcount",
            RpcMethod::GetBlockHash => "getblockhash",
            RpcMethod::GetBlock => "getblock",
            RpcMethod::GetConnectionCount => "getconnectioncount",
            RpcMethod::GetDifficulty => "getdifficulty",
            RpcMethod::GetHashesPerSec => "gethashespersec",
            RpcMethod::GetNetworkHashPs => "getnetworkhashps",
        }
    }
}

impl fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only queries against a node.
///
/// Every call may fail with a transport or protocol error; callers decide
/// whether that is fatal.
pub trait NodeRpc: Send + Sync {
    /// Height of the chain tip.
    fn block_count(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Hash of the block at `height`.
    fn block_hash(&self, height: u64) -> impl Future<Output = Result<String, RpcError>> + Send;

    /// Full decoded block for `hash`.
    fn block(&self, hash: &str) -> impl Future<Output = Result<Block, RpcError>> + Send;

    /// Number of connected peers.
    fn connection_count(&self) -> impl Future<Output = Result<u64, RpcError>> + Send;

    /// Current proof-of-work difficulty.
    fn difficulty(&self) -> impl Future<Output = Result<f64, RpcError>> + Send;

    /// Local mining hash rate estimate.
    fn hashes_per_second(&self) -> impl Future<Output = Result<f64, RpcError>> + Send;

    /// Network-wide hash rate estimate.
    fn network_hashes_per_second(&self) -> impl Future<Output = Result<f64, RpcError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        let names: Vec<_> = RpcMethod::ALL.iter().map(|m| m.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "getblockcount",
                "getblockhash",
                "getblock",
                "getconnectioncount",
                "getdifficulty",
                "gethashespersec",
                "getnetworkhashps",
            ]
        );
        assert_eq!(RpcMethod::GetBlock.to_string(), "getblock");
    }
}
