//! Metrics registry and the six node instruments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::{Counter, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, Gauge, IntGauge, Registry, TextEncoder};
use thiserror::Error;
use tracing::warn;

/// Namespace prefixed to every exported metric name.
pub const NAMESPACE: &str = "earthcoin";

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Values observed in one complete poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Observation {
    /// Height of the chain tip.
    pub block_count: u64,
    /// Coinbase reward of the tip block, in whole coins.
    pub subsidy: u64,
    /// Connected peers.
    pub connection_count: u64,
    /// Network difficulty.
    pub difficulty: f64,
    /// Local hash rate estimate.
    pub hashes_per_second: f64,
    /// Network hash rate estimate.
    pub network_hashes_per_second: f64,
}

/// Counter exposing the last observed chain height.
///
/// The height is a single atomic: a scrape sees either the previous or the
/// new height, including when the height goes down.
#[derive(Clone)]
struct BlockCounter {
    desc: Desc,
    height: Arc<AtomicU64>,
}

impl BlockCounter {
    fn new(name: &str, help: &str) -> Result<Self, MetricsError> {
        let desc = Desc::new(name.to_string(), help.to_string(), vec![], HashMap::new())?;
        Ok(Self {
            desc,
            height: Arc::new(AtomicU64::new(0)),
        })
    }

    fn get(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }

    /// Stores `height`, returning the previous value.
    fn swap(&self, height: u64) -> u64 {
        self.height.swap(height, Ordering::Relaxed)
    }
}

impl Collector for BlockCounter {
    fn desc(&self) -> Vec<&Desc> {
        vec![&self.desc]
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut counter = Counter::new();
        counter.set_value(self.get() as f64);
        let mut metric = Metric::new();
        metric.set_counter(counter);

        let mut family = MetricFamily::new();
        family.set_name(self.desc.fq_name.clone());
        family.set_help(self.desc.help.clone());
        family.set_field_type(MetricType::COUNTER);
        family.set_metric(vec![metric].into());
        vec![family]
    }
}

/// Prometheus registry owning the exported node instruments.
///
/// All instruments are atomic, so one writer and any number of
/// concurrent scrapes can share the registry behind an `Arc`.
pub struct MetricsRegistry {
    registry: Registry,
    block_count: BlockCounter,
    subsidy: IntGauge,
    connection_count: IntGauge,
    difficulty: Gauge,
    hashes_per_second: Gauge,
    network_hashes_per_second: Gauge,
}

impl MetricsRegistry {
    /// Creates a new registry with every instrument registered at zero.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new_custom(Some(NAMESPACE.to_string()), None)?;

        let block_count = BlockCounter::new("block_count_total", "Total number of Blocks")?;
        let subsidy = IntGauge::new("subsidy", "Current subsidy")?;
        let connection_count =
            IntGauge::new("connection_count", "Current number of connections")?;
        let difficulty = Gauge::new("difficulty", "Current difficulty")?;
        let hashes_per_second = Gauge::new("hashes_per_second", "Current hashes per second")?;
        let network_hashes_per_second = Gauge::new(
            "network_hashes_per_second",
            "Current network hashes per second",
        )?;

        registry.register(Box::new(block_count.clone()))?;
        registry.register(Box::new(subsidy.clone()))?;
        registry.register(Box::new(connection_count.clone()))?;
        registry.register(Box::new(difficulty.clone()))?;
        registry.register(Box::new(hashes_per_second.clone()))?;
        registry.register(Box::new(network_hashes_per_second.clone()))?;

        Ok(Self {
            registry,
            block_count,
            subsidy,
            connection_count,
            difficulty,
            hashes_per_second,
            network_hashes_per_second,
        })
    }

    /// Sets every instrument to the values of one poll cycle.
    pub fn update(&self, observation: &Observation) {
        self.set_block_count(observation.block_count);
        self.subsidy.set(saturating_i64(observation.subsidy));
        self.connection_count
            .set(saturating_i64(observation.connection_count));
        self.difficulty.set(observation.difficulty);
        self.hashes_per_second.set(observation.hashes_per_second);
        self.network_hashes_per_second
            .set(observation.network_hashes_per_second);
    }

    /// Moves the block counter to exactly `height` in one store.
    fn set_block_count(&self, height: u64) {
        let previous = self.block_count.swap(height);
        if height < previous {
            warn!(previous, height, "Block count went backwards, counter reset");
        }
    }

    /// Current instrument values.
    pub fn snapshot(&self) -> Observation {
        Observation {
            block_count: self.block_count.get(),
            subsidy: self.subsidy.get().max(0) as u64,
            connection_count: self.connection_count.get().max(0) as u64,
            difficulty: self.difficulty.get(),
            hashes_per_second: self.hashes_per_second.get(),
            network_hashes_per_second: self.network_hashes_per_second.get(),
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
