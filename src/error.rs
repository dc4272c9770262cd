//! Top-level error type.

use thiserror::Error;

use crate::collector::CollectorError;
use crate::config::ConfigError;
use crate::metrics::{MetricsError, ServerError};
use crate::rpc::RpcError;

/// Any error that stops the exporter.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("RPC client error: {0}")]
    Rpc(#[from] RpcError),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("metrics server error: {0}")]
    Server(#[from] ServerError),

    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),

    #[error("collector task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
