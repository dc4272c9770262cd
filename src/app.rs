//! Process wiring: one collector task plus the metrics server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::collector::Collector;
use crate::config::ExporterConfig;
use crate::error::Error;
use crate::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig, ServerError};
use crate::rpc::{NodeRpc, RpcClient};

/// A bound exporter, ready to run.
///
/// The listener is bound on construction so that an unusable listen
/// address fails before the first poll.
pub struct Exporter<R> {
    collector: Collector<R>,
    server: MetricsServer,
    listener: TcpListener,
    registry: Arc<MetricsRegistry>,
}

impl Exporter<RpcClient> {
    /// Validates `config`, builds the RPC client and binds the listener.
    pub async fn from_config(config: &ExporterConfig) -> Result<Self, Error> {
        config.validate()?;
        let rpc = RpcClient::new(&config.rpc)?;
        info!(node = %rpc.url(), "Using node RPC endpoint");

        Self::bind(
            rpc,
            MetricsServerConfig::new(config.listen_addr().await?),
            config.poll_interval(),
        )
        .await
    }
}

impl<R: NodeRpc + 'static> Exporter<R> {
    /// Creates the registry and binds the metrics listener.
    pub async fn bind(
        rpc: R,
        server_config: MetricsServerConfig,
        interval: std::time::Duration,
    ) -> Result<Self, Error> {
        let registry = Arc::new(MetricsRegistry::new()?);
        let server = MetricsServer::new(server_config, Arc::clone(&registry));
        let listener = server.bind().await?;
        let collector = Collector::new(rpc, Arc::clone(&registry), interval);

        Ok(Self {
            collector,
            server,
            listener,
            registry,
        })
    }

    /// Address the metrics server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::Bind(e).into())
    }

    /// Shared registry the collector writes and scrapes read.
    pub fn registry(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.registry)
    }

    /// Runs the collector in the background and serves scrapes on the
    /// current task.
    ///
    /// Returns `Ok(())` after a graceful shutdown, or the first fatal
    /// error from either side.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        let mut collector_task = tokio::spawn(self.collector.run(shutdown.clone()));

        let server = self.server.serve(self.listener, shutdown);
        tokio::pin!(server);

        tokio::select! {
            served = &mut server => {
                if let Err(e) = served {
                    collector_task.abort();
                    return Err(e.into());
                }
                collector_task.await??;
            }
            collected = &mut collector_task => {
                collected??;
                server.await?;
            }
        }

        Ok(())
    }
}

/// Builds an exporter from `config` and runs it until shutdown or failure.
pub async fn run(config: &ExporterConfig, shutdown: watch::Receiver<bool>) -> Result<(), Error> {
    Exporter::from_config(config).await?.run(shutdown).await
}
