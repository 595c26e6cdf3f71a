use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use gateplane::config::{Config, ObservabilityConfig, DEFAULT_SERVICE_MANAGEMENT_URL};
use gateplane::service_config::fetcher::MetadataTokenSource;
use gateplane::{ConfigManager, Result, APP_NAME, VERSION};

/// API gateway control plane: translates a service configuration into an
/// Envoy xDS snapshot and serves it to the data plane.
#[derive(Debug, Parser)]
#[command(name = "gateplane", version)]
struct Args {
    /// Name of the managed service
    #[arg(long)]
    service: String,

    /// Service config id; doubles as the snapshot version
    #[arg(long)]
    version_id: String,

    /// Listener socket ip address
    #[arg(long, default_value = "0.0.0.0")]
    listener_address: String,

    /// Listener port
    #[arg(long, default_value_t = 8080)]
    listener_port: u16,

    /// Cluster socket ip address
    #[arg(long, default_value = "127.0.0.1")]
    cluster_address: String,

    /// Cluster port
    #[arg(long, default_value_t = 8082)]
    cluster_port: u16,

    /// Cluster connect timeout in seconds
    #[arg(long, default_value_t = 20)]
    cluster_connect_timeout: u64,

    /// Envoy node id the snapshot is published under
    #[arg(long, default_value = "api_proxy")]
    node: String,

    /// URL of the service management server
    #[arg(long, default_value = DEFAULT_SERVICE_MANAGEMENT_URL)]
    service_management_url: String,

    /// xDS server bind address
    #[arg(long, default_value = "0.0.0.0")]
    xds_bind_address: String,

    /// xDS server port
    #[arg(long, default_value_t = 18000)]
    xds_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    json_logging: bool,
}

impl Args {
    fn into_config(self) -> Config {
        let mut config = Config::new(self.service, self.version_id);
        config.listener.address = self.listener_address;
        config.listener.port = self.listener_port;
        config.upstream.address = self.cluster_address;
        config.upstream.port = self.cluster_port;
        config.upstream.connect_timeout = Duration::from_secs(self.cluster_connect_timeout);
        config.node_id = self.node;
        config.service_management_url = self.service_management_url;
        config.xds.bind_address = self.xds_bind_address;
        config.xds.port = self.xds_port;
        config.observability =
            ObservabilityConfig { log_level: self.log_level, json_logging: self.json_logging };
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config();

    gateplane::observability::init_logging(&config.observability)?;
    config.validate()?;

    info!(app_name = APP_NAME, version = VERSION, "Starting gateplane control plane");

    let manager = ConfigManager::new(
        config.clone(),
        reqwest::Client::new(),
        Arc::new(MetadataTokenSource::default()),
    );

    if let Err(e) = manager.init().await {
        error!("Failed to initialize config manager: {}", e);
        std::process::exit(1);
    }

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
        }
    };

    if let Err(e) = gateplane::xds::start_xds_server(&config.xds, manager.cache(), shutdown_signal).await
    {
        error!("Failed to start XDS server: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
