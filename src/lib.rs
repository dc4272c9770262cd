//! Earthcoin Prometheus Exporter
//!
//! Polls an Earthcoin (or other Bitcoin-family) node over JSON-RPC on a
//! fixed interval and republishes a handful of chain metrics for
//! Prometheus to scrape.
//!
//! # Architecture
//!
//! ```text
//! node JSON-RPC ← collector (background task) → MetricsRegistry ← /metrics (HTTP)
//! ```
//!
//! The collector is the only writer; scrapes read the same registry.
//!
//! # Design Principles
//!
//! - **Fail-fast**: any RPC error stops the process; run it under a
//!   supervisor that restarts it
//! - **All-or-nothing cycles**: a cycle publishes only after every query
//!   has succeeded
//! - **Latest value only**: no history, smoothing or aggregation
//!
//! # Example
//!
//! ```no_run
//! use earthcoin_exporter::{app, ExporterConfig};
//! use tokio::sync::watch;
//!
//! # async fn example() -> Result<(), earthcoin_exporter::Error> {
//! let config = ExporterConfig::default();
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! // Polls the node and serves /metrics until shutdown or a fatal error.
//! app::run(&config, shutdown_rx).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod app;
pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rpc;
pub mod shutdown;

// Re-export commonly used types at crate root
pub use app::Exporter;
pub use collector::{Collector, CollectorError};
pub use config::{ConfigError, ExporterConfig};
pub use error::Error;
pub use metrics::{MetricsRegistry, MetricsServer, Observation};
pub use rpc::{Block, MockNode, NodeRpc, RpcClient, RpcError, RpcMethod};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
