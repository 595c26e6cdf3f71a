//! Service config manager
//!
//! Orchestrates the startup sequence: fetch the service config document,
//! build the filter chain, listener and cluster, then publish the versioned
//! snapshot under the configured node id. Startup is strictly sequential
//! and any failure is fatal; once the snapshot is published the manager
//! holds no mutable state.

use std::collections::BTreeMap;
use std::sync::Arc;

use envoy_types::pb::envoy::config::core::v3::Node;
use tracing::info;

use crate::config::Config;
use crate::service_config::fetcher::{fetch_service_config, TokenSource};
use crate::service_config::jwks::collect_jwks;
use crate::service_config::{BackendProtocol, Service};
use crate::xds::filters::http::{
    build_jwt_authn_filter, build_service_control_filter, build_transcoder_filter,
};
use crate::xds::listener::{build_http_connection_manager, build_listener};
use crate::xds::snapshot::{BuiltResource, NodeHash, Snapshot, SnapshotCache};
use crate::xds::cluster::build_cluster;
use crate::Result;

/// Discovery cache callback: snapshots are keyed by the `id` field of the
/// requesting node.
pub struct NodeIdHasher;

impl NodeHash for NodeIdHasher {
    fn node_id(&self, node: Option<&Node>) -> String {
        node.map(|node| node.id.clone()).unwrap_or_default()
    }
}

/// Handles service configuration fetching and snapshot publication
pub struct ConfigManager {
    config: Config,
    client: reqwest::Client,
    token_source: Arc<dyn TokenSource>,
    cache: Arc<SnapshotCache>,
}

impl ConfigManager {
    pub fn new(config: Config, client: reqwest::Client, token_source: Arc<dyn TokenSource>) -> Self {
        let cache = Arc::new(SnapshotCache::new(Arc::new(NodeIdHasher)));
        Self { config, client, token_source, cache }
    }

    /// The snapshot cache the discovery server serves from
    pub fn cache(&self) -> Arc<SnapshotCache> {
        self.cache.clone()
    }

    /// Run the startup sequence: fetch, build, publish.
    pub async fn init(&self) -> Result<()> {
        info!(
            service_name = %self.config.service_name,
            config_id = %self.config.config_id,
            "Fetching service config"
        );

        let service =
            fetch_service_config(&self.client, self.token_source.as_ref(), &self.config).await?;

        let snapshot = self.make_snapshot(&service).await?;
        self.cache.set_snapshot(&self.config.node_id, snapshot)?;

        info!(node_id = %self.config.node_id, "Config manager ready");
        Ok(())
    }

    /// Build the snapshot for a service config document without publishing it.
    pub async fn make_snapshot(&self, service: &Service) -> Result<Snapshot> {
        let endpoint_api = service.endpoint_api()?;
        let backend_protocol = BackendProtocol::classify(endpoint_api)?;

        let jwks = match &service.authentication {
            Some(auth) if !auth.providers.is_empty() => {
                collect_jwks(&self.client, &auth.providers).await
            }
            _ => BTreeMap::new(),
        };

        // Filter order is fixed; the router is appended by the listener
        // assembly so it is always last.
        let mut http_filters = Vec::new();
        if let Some(filter) = build_jwt_authn_filter(service, endpoint_api, &jwks) {
            http_filters.push(filter);
        }
        if let Some(filter) = build_service_control_filter(service) {
            http_filters.push(filter);
        }
        if backend_protocol == BackendProtocol::Grpc {
            if let Some(filter) = build_transcoder_filter(service, endpoint_api) {
                http_filters.push(filter);
            }
        }

        let http_manager = build_http_connection_manager(&endpoint_api.name, http_filters);
        let listener = build_listener(&self.config, &http_manager);
        let cluster = build_cluster(&self.config, &endpoint_api.name);

        Ok(Snapshot::new(
            self.config.config_id.clone(),
            Vec::new(),
            vec![BuiltResource::cluster(&cluster)],
            Vec::new(),
            vec![BuiltResource::listener(&listener)],
        ))
    }
}
