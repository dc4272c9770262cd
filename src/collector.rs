//! Node polling loop.
//!
//! Each cycle issues the RPC queries in a fixed order, builds an
//! [`Observation`] and only then publishes it, so a cycle that fails
//! part-way leaves every instrument at its previous value.
//!
//! Any RPC failure ends the loop with an error. There is no retry; the
//! process is expected to run under a supervisor that restarts it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::metrics::{MetricsRegistry, Observation};
use crate::rpc::{NodeRpc, RpcError, RpcMethod};
use crate::shutdown::wait_for_shutdown;

/// A failed poll step.
#[derive(Debug, Error)]
#[error("{method} failed: {source}")]
pub struct CollectorError {
    /// The RPC method whose step failed.
    pub method: RpcMethod,
    /// Underlying RPC error.
    #[source]
    pub source: RpcError,
}

/// Polls a node and publishes what it sees into a [`MetricsRegistry`].
pub struct Collector<R> {
    rpc: R,
    registry: Arc<MetricsRegistry>,
    interval: Duration,
}

async fn step<T>(
    method: RpcMethod,
    query: impl Future<Output = Result<T, RpcError>>,
) -> Result<T, CollectorError> {
    query
        .await
        .map_err(|source| CollectorError { method, source })
}

impl<R: NodeRpc> Collector<R> {
    /// Creates a collector that polls every `interval`.
    pub fn new(rpc: R, registry: Arc<MetricsRegistry>, interval: Duration) -> Self {
        Self {
            rpc,
            registry,
            interval,
        }
    }

    /// The node handle.
    pub fn rpc(&self) -> &R {
        &self.rpc
    }

    /// Runs one poll cycle without publishing anything.
    pub async fn poll_once(&self) -> Result<Observation, CollectorError> {
        let block_count = step(RpcMethod::GetBlockCount, self.rpc.block_count()).await?;
        debug!(block_count, "Block count");

        let hash = step(RpcMethod::GetBlockHash, self.rpc.block_hash(block_count)).await?;
        let block = step(RpcMethod::GetBlock, self.rpc.block(&hash)).await?;
        let subsidy = block.subsidy().map_err(|e| CollectorError {
            method: RpcMethod::GetBlock,
            source: e.into(),
        })?;
        debug!(%hash, subsidy, "Subsidy");

        let connection_count =
            step(RpcMethod::GetConnectionCount, self.rpc.connection_count()).await?;
        debug!(connection_count, "Connection count");

        let difficulty = step(RpcMethod::GetDifficulty, self.rpc.difficulty()).await?;
        debug!(difficulty, "Difficulty");

        let hashes_per_second =
            step(RpcMethod::GetHashesPerSec, self.rpc.hashes_per_second()).await?;
        debug!(hashes_per_second, "Hashes per second");

        let network_hashes_per_second = step(
            RpcMethod::GetNetworkHashPs,
            self.rpc.network_hashes_per_second(),
        )
        .await?;
        debug!(network_hashes_per_second, "Network hashes per second");

        Ok(Observation {
            block_count,
            subsidy,
            connection_count,
            difficulty,
            hashes_per_second,
            network_hashes_per_second,
        })
    }

    /// Runs one poll cycle and publishes the result.
    pub async fn collect(&self) -> Result<Observation, CollectorError> {
        let observation = self.poll_once().await?;
        self.registry.update(&observation);

        info!(
            block_count = observation.block_count,
            subsidy = observation.subsidy,
            connection_count = observation.connection_count,
            difficulty = observation.difficulty,
            hashes_per_second = observation.hashes_per_second,
            network_hashes_per_second = observation.network_hashes_per_second,
            "Collected node metrics"
        );

        Ok(observation)
    }

    /// Polls until `shutdown` flips to true or a query fails.
    ///
    /// The first cycle runs immediately. Shutdown interrupts both the pause
    /// and an in-flight cycle; an interrupted cycle publishes nothing.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), CollectorError> {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting node collector"
        );

        loop {
            tokio::select! {
                result = self.collect() => { result?; }
                _ = wait_for_shutdown(shutdown.clone()) => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = wait_for_shutdown(shutdown.clone()) => break,
            }
        }

        info!("Node collector stopped");
        Ok(())
    }
}
