//! Prometheus metrics exporter for node monitoring.
//!
//! This module owns the exported instruments and serves them in
//! Prometheus text format via an HTTP endpoint.
//!
//! # Metrics Exposed
//!
//! - `earthcoin_block_count_total` - Height of the chain tip (counter)
//! - `earthcoin_subsidy` - Coinbase reward of the tip block, whole coins
//! - `earthcoin_connection_count` - Connected peers
//! - `earthcoin_difficulty` - Network difficulty
//! - `earthcoin_hashes_per_second` - Local hash rate estimate
//! - `earthcoin_network_hashes_per_second` - Network hash rate estimate
//!
//! Every instrument starts at zero and holds only the value from the most
//! recent completed poll cycle. A scrape reads each instrument atomically
//! but not all six together, so it may mix values from adjacent cycles.
//!
//! # Example
//!
//! ```no_run
//! use earthcoin_exporter::metrics::{MetricsRegistry, Observation};
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//!
//! registry.update(&Observation {
//!     block_count: 2_345_678,
//!     subsidy: 5000,
//!     connection_count: 8,
//!     difficulty: 1234.5,
//!     hashes_per_second: 0.0,
//!     network_hashes_per_second: 9.8e8,
//! });
//!
//! println!("{}", registry.encode().unwrap());
//! ```

mod registry;
mod server;

pub use registry::{MetricsError, MetricsRegistry, Observation, NAMESPACE};
pub use server::{router, MetricsServer, MetricsServerConfig, ServerError};
