//! Envoy xDS resource construction and discovery serving
//!
//! Builders translate the service config document into Envoy clusters,
//! listeners and HTTP filters; the snapshot cache holds the published
//! resource bundle; the ADS server streams it to the data plane.

pub mod cluster;
pub mod filters;
pub mod listener;
pub mod server;
pub mod snapshot;

use std::future::Future;
use std::sync::Arc;

use tonic::transport::Server;
use tracing::info;

use envoy_types::pb::envoy::service::discovery::v3::aggregated_discovery_service_server::AggregatedDiscoveryServiceServer;

use crate::config::XdsConfig;
use crate::{Error, Result};

pub use server::SnapshotDiscoveryService;
pub use snapshot::{BuiltResource, NodeHash, Snapshot, SnapshotCache};

/// Start the ADS gRPC server over the snapshot cache, with graceful shutdown
pub async fn start_xds_server<F>(
    config: &XdsConfig,
    cache: Arc<SnapshotCache>,
    shutdown_signal: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .map_err(|e| Error::config(format!("Invalid xDS address: {}", e)))?;

    let ads_service = SnapshotDiscoveryService::new(cache);

    info!(address = %addr, "Starting Envoy xDS server");

    Server::builder()
        .add_service(AggregatedDiscoveryServiceServer::new(ads_service))
        .serve_with_shutdown(addr, shutdown_signal)
        .await
        .map_err(|e| {
            let error_msg = e.to_string();
            if error_msg.contains("Address already in use") || error_msg.contains("bind") {
                Error::transport(format!(
                    "XDS server failed to bind to {}: port already in use",
                    addr
                ))
            } else {
                Error::transport(format!("XDS server failed: {}", e))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use envoy_types::pb::envoy::config::core::v3::Node;

    struct IdHash;

    impl NodeHash for IdHash {
        fn node_id(&self, node: Option<&Node>) -> String {
            node.map(|n| n.id.clone()).unwrap_or_default()
        }
    }

    #[test]
    fn test_xds_config_default() {
        let config = XdsConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 18000);
    }

    #[tokio::test]
    async fn test_invalid_bind_address_is_config_error() {
        let config = XdsConfig { bind_address: "not an address".to_string(), port: 18000 };
        let cache = Arc::new(SnapshotCache::new(Arc::new(IdHash)));
        let result = start_xds_server(&config, cache, async {}).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
