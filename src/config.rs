//! Exporter configuration.
//!
//! Values come from built-in defaults, optionally overlaid by a TOML file,
//! then by command-line flags. Validation runs once on the merged result.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default node RPC endpoint.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:8332";
/// Default metrics listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:9099";
/// Default pause between poll cycles.
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
/// Default per-request RPC timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Node RPC connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// `host:port` of the node's JSON-RPC endpoint.
    pub address: String,
    /// Basic-auth username; empty disables auth.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RpcConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Metrics HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to serve `/metrics` on.
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
        }
    }
}

/// Poll loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Seconds to wait between poll cycles.
    pub interval_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub rpc: RpcConfig,
    pub server: ServerConfig,
    pub collector: CollectorConfig,
}

/// Configuration errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
    #[error("invalid node address '{address}': {reason}")]
    InvalidAddress {
        address: String,
        reason: &'static str,
    },
    #[error("invalid listen address '{0}'")]
    InvalidListen(String),
    #[error("poll interval must be at least 1 second")]
    InvalidInterval,
    #[error("RPC timeout must be at least 1 second")]
    InvalidTimeout,
}

impl ExporterConfig {
    /// Loads configuration from a TOML file.
    ///
    /// Missing tables and keys fall back to defaults. The result is not
    /// validated, since command-line flags may still override it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_address(&self.rpc.address)?;
        self.listen_target()?;
        if self.collector.interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        if self.rpc.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    /// Listen address in `host:port` form.
    ///
    /// A bare `:port` listens on every IPv4 interface.
    fn listen_target(&self) -> Result<String, ConfigError> {
        let listen = &self.server.listen;
        let invalid = || ConfigError::InvalidListen(listen.clone());

        let target = if listen.starts_with(':') {
            format!("0.0.0.0{listen}")
        } else {
            listen.clone()
        };
        let (host, port) = target.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(invalid());
        }
        Ok(target)
    }

    /// Resolves the metrics listen address, looking up hostnames.
    pub async fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let target = self.listen_target()?;
        let invalid = || ConfigError::InvalidListen(self.server.listen.clone());
        let addr = tokio::net::lookup_host(target.as_str())
            .await
            .map_err(|_| invalid())?
            .next()
            .ok_or_else(invalid);
        addr
    }

    /// Pause between poll cycles.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.collector.interval_secs)
    }
}

fn validate_address(address: &str) -> Result<(), ConfigError> {
    let invalid = |reason| ConfigError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    if address.contains("://") {
        return Err(invalid("expected host:port without a URL scheme"));
    }
    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_config_valid() {
        let config = ExporterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rpc.address, "127.0.0.1:8332");
        assert_eq!(
            config.listen_addr().await.unwrap(),
            "127.0.0.1:9099".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(config.poll_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_parse_full_file() {
        let config = ExporterConfig::from_toml_str(
            r#"
            [rpc]
            address = "node.example:15678"
            username = "monitor"
            password = "hunter2"
            timeout_secs = 10

            [server]
            listen = "0.0.0.0:9100"

            [collector]
            interval_secs = 15
            "#,
        )
        .unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.rpc.address, "node.example:15678");
        assert_eq!(config.rpc.username, "monitor");
        assert_eq!(config.rpc.timeout(), Duration::from_secs(10));
        assert_eq!(config.server.listen, "0.0.0.0:9100");
        assert_eq!(config.collector.interval_secs, 15);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = ExporterConfig::from_toml_str("[rpc]\nusername = \"monitor\"\n").unwrap();
        assert_eq!(config.rpc.address, DEFAULT_ADDRESS);
        assert_eq!(config.server.listen, DEFAULT_LISTEN);
        assert_eq!(config.collector.interval_secs, DEFAULT_INTERVAL_SECS);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            ExporterConfig::from_toml_str("[rpc\naddress = 1"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            ExporterConfig::from_file("/nonexistent/earthcoin-exporter.toml"),
            Err(ConfigError::FileReadError(_))
        ));
    }

    #[test]
    fn test_invalid_addresses() {
        for address in ["", "localhost", ":8332", "127.0.0.1:port", "http://127.0.0.1:8332"] {
            let mut config = ExporterConfig::default();
            config.rpc.address = address.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidAddress { .. })),
                "address {address:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_hostname_address_valid() {
        let mut config = ExporterConfig::default();
        config.rpc.address = "earthcoind:15678".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_listen() {
        for listen in ["", "localhost", "localhost:", ":http", "0.0.0.0:70000"] {
            let mut config = ExporterConfig::default();
            config.server.listen = listen.to_string();
            assert!(
                matches!(config.validate(), Err(ConfigError::InvalidListen(_))),
                "listen {listen:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_listen_port_only_uses_all_interfaces() {
        let mut config = ExporterConfig::default();
        config.server.listen = ":9099".to_string();

        assert!(config.validate().is_ok());
        assert_eq!(
            config.listen_addr().await.unwrap(),
            "0.0.0.0:9099".parse::<SocketAddr>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_listen_hostname_resolves() {
        let mut config = ExporterConfig::default();
        config.server.listen = "localhost:9099".to_string();

        assert!(config.validate().is_ok());
        let addr = config.listen_addr().await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9099);
    }

    #[tokio::test]
    async fn test_listen_unresolvable_host() {
        let mut config = ExporterConfig::default();
        config.server.listen = "no-such-host.invalid:9099".to_string();

        assert!(config.validate().is_ok());
        assert!(matches!(
            config.listen_addr().await,
            Err(ConfigError::InvalidListen(_))
        ));
    }

    #[test]
    fn test_zero_interval_invalid() {
        let mut config = ExporterConfig::default();
        config.collector.interval_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidInterval)
        ));
    }

    #[test]
    fn test_zero_timeout_invalid() {
        let mut config = ExporterConfig::default();
        config.rpc.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTimeout)));
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = RpcConfig::default();
        config.password = "hunter2".to_string();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("***"));
    }
}
