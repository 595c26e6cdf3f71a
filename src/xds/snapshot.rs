//! Versioned resource snapshots and the node-keyed snapshot cache
//!
//! A snapshot is the complete, self-consistent resource bundle the discovery
//! server hands to the data plane: one version string and the endpoint,
//! cluster, route and listener resource sets. Snapshots are validated before
//! publication and swapped atomically, so a client can never observe a
//! listener without the cluster its route points at.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use envoy_types::pb::envoy::config::cluster::v3::Cluster;
use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::envoy::config::listener::v3::{filter::ConfigType, Listener};
use envoy_types::pb::envoy::config::route::v3::{
    route::Action, route_action::ClusterSpecifier, RouteConfiguration,
};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::RouteSpecifier, HttpConnectionManager,
};
use envoy_types::pb::google::protobuf::Any;
use prost::Message;
use tracing::info;

use crate::xds::filters::http::HTTP_CONNECTION_MANAGER;
use crate::{Error, Result};

pub const ENDPOINT_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.endpoint.v3.ClusterLoadAssignment";
pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.config.cluster.v3.Cluster";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.config.route.v3.RouteConfiguration";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.config.listener.v3.Listener";

/// Wrapper for a built Envoy resource along with its name.
#[derive(Clone, Debug)]
pub struct BuiltResource {
    pub name: String,
    pub resource: Any,
}

impl BuiltResource {
    pub fn cluster(cluster: &Cluster) -> Self {
        Self {
            name: cluster.name.clone(),
            resource: Any {
                type_url: CLUSTER_TYPE_URL.to_string(),
                value: cluster.encode_to_vec(),
            },
        }
    }

    pub fn listener(listener: &Listener) -> Self {
        Self {
            name: listener.name.clone(),
            resource: Any {
                type_url: LISTENER_TYPE_URL.to_string(),
                value: listener.encode_to_vec(),
            },
        }
    }

    pub fn type_url(&self) -> &str {
        &self.resource.type_url
    }
}

/// Versioned, self-consistent resource bundle
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub version: String,
    pub endpoints: Vec<BuiltResource>,
    pub clusters: Vec<BuiltResource>,
    pub routes: Vec<BuiltResource>,
    pub listeners: Vec<BuiltResource>,
}

impl Snapshot {
    pub fn new(
        version: impl Into<String>,
        endpoints: Vec<BuiltResource>,
        clusters: Vec<BuiltResource>,
        routes: Vec<BuiltResource>,
        listeners: Vec<BuiltResource>,
    ) -> Self {
        Self { version: version.into(), endpoints, clusters, routes, listeners }
    }

    /// Resources of one discovery type
    pub fn resources(&self, type_url: &str) -> &[BuiltResource] {
        match type_url {
            ENDPOINT_TYPE_URL => &self.endpoints,
            CLUSTER_TYPE_URL => &self.clusters,
            ROUTE_TYPE_URL => &self.routes,
            LISTENER_TYPE_URL => &self.listeners,
            _ => &[],
        }
    }

    /// Check internal consistency: every cluster a listener route points at
    /// must be present in the snapshot's cluster set.
    pub fn validate(&self) -> Result<()> {
        let cluster_names: HashSet<&str> =
            self.clusters.iter().map(|cluster| cluster.name.as_str()).collect();

        for listener_resource in &self.listeners {
            for cluster in referenced_clusters(listener_resource)? {
                if !cluster_names.contains(cluster.as_str()) {
                    return Err(Error::snapshot(format!(
                        "listener {} routes to unknown cluster {}",
                        listener_resource.name, cluster
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Cluster names referenced by the routes of a listener's connection managers
fn referenced_clusters(listener_resource: &BuiltResource) -> Result<Vec<String>> {
    let listener = Listener::decode(listener_resource.resource.value.as_slice())
        .map_err(|e| Error::snapshot(format!("undecodable listener resource: {}", e)))?;

    let mut clusters = Vec::new();
    for chain in &listener.filter_chains {
        for filter in &chain.filters {
            if filter.name != HTTP_CONNECTION_MANAGER {
                continue;
            }
            let Some(ConfigType::TypedConfig(any)) = &filter.config_type else {
                continue;
            };
            let manager = HttpConnectionManager::decode(any.value.as_slice())
                .map_err(|e| Error::snapshot(format!("undecodable connection manager: {}", e)))?;
            if let Some(RouteSpecifier::RouteConfig(route_config)) = &manager.route_specifier {
                collect_route_clusters(route_config, &mut clusters);
            }
        }
    }

    Ok(clusters)
}

fn collect_route_clusters(route_config: &RouteConfiguration, clusters: &mut Vec<String>) {
    for vhost in &route_config.virtual_hosts {
        for route in &vhost.routes {
            if let Some(Action::Route(action)) = &route.action {
                if let Some(ClusterSpecifier::Cluster(name)) = &action.cluster_specifier {
                    clusters.push(name.clone());
                }
            }
        }
    }
}

/// Extraction of the cache key from a discovery request's node
pub trait NodeHash: Send + Sync {
    fn node_id(&self, node: Option<&Node>) -> String;
}

/// Cache of published snapshots keyed by node id.
///
/// Written exactly once per process lifetime by the config manager and read
/// by the discovery server on every pull. A snapshot that fails validation
/// is rejected whole; the cache never holds a partial update.
pub struct SnapshotCache {
    hash: Arc<dyn NodeHash>,
    snapshots: RwLock<HashMap<String, Arc<Snapshot>>>,
}

impl SnapshotCache {
    pub fn new(hash: Arc<dyn NodeHash>) -> Self {
        Self { hash, snapshots: RwLock::new(HashMap::new()) }
    }

    /// Validate and publish a snapshot under the node id, atomically.
    pub fn set_snapshot(&self, node_id: &str, snapshot: Snapshot) -> Result<()> {
        snapshot.validate()?;

        info!(
            node_id = %node_id,
            version = %snapshot.version,
            clusters = snapshot.clusters.len(),
            listeners = snapshot.listeners.len(),
            "Publishing snapshot"
        );

        let mut snapshots = self.snapshots.write().unwrap_or_else(|e| e.into_inner());
        snapshots.insert(node_id.to_string(), Arc::new(snapshot));
        Ok(())
    }

    /// Snapshot published under a node id
    pub fn snapshot(&self, node_id: &str) -> Option<Arc<Snapshot>> {
        let snapshots = self.snapshots.read().unwrap_or_else(|e| e.into_inner());
        snapshots.get(node_id).cloned()
    }

    /// Snapshot for a discovery request's node, resolved through the hash
    pub fn snapshot_for(&self, node: Option<&Node>) -> Option<Arc<Snapshot>> {
        self.snapshot(&self.hash.node_id(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::xds::cluster::build_cluster;
    use crate::xds::listener::{build_http_connection_manager, build_listener};

    struct IdHash;

    impl NodeHash for IdHash {
        fn node_id(&self, node: Option<&Node>) -> String {
            node.map(|n| n.id.clone()).unwrap_or_default()
        }
    }

    fn sample_snapshot(cluster_name: &str, route_target: &str) -> Snapshot {
        let config = Config::new("test-echo", "test-config-id");
        let cluster = build_cluster(&config, cluster_name);
        let manager = build_http_connection_manager(route_target, Vec::new());
        let listener = build_listener(&config, &manager);

        Snapshot::new(
            "test-config-id",
            Vec::new(),
            vec![BuiltResource::cluster(&cluster)],
            Vec::new(),
            vec![BuiltResource::listener(&listener)],
        )
    }

    #[test]
    fn consistent_snapshot_validates() {
        let snapshot = sample_snapshot("backend", "backend");
        assert!(snapshot.validate().is_ok());
        assert_eq!(snapshot.version, "test-config-id");
    }

    #[test]
    fn listener_routing_to_missing_cluster_is_rejected() {
        let snapshot = sample_snapshot("backend", "other-cluster");
        let err = snapshot.validate().unwrap_err();
        assert!(matches!(err, Error::Snapshot(message) if message.contains("other-cluster")));
    }

    #[test]
    fn cache_rejects_inconsistent_snapshot() {
        let cache = SnapshotCache::new(Arc::new(IdHash));
        let result = cache.set_snapshot("api_proxy", sample_snapshot("backend", "missing"));
        assert!(result.is_err());
        assert!(cache.snapshot("api_proxy").is_none());
    }

    #[test]
    fn cache_publishes_and_resolves_by_node() {
        let cache = SnapshotCache::new(Arc::new(IdHash));
        cache.set_snapshot("api_proxy", sample_snapshot("backend", "backend")).expect("publish");

        assert!(cache.snapshot("api_proxy").is_some());
        assert!(cache.snapshot("other").is_none());

        let node = Node { id: "api_proxy".to_string(), ..Default::default() };
        let snapshot = cache.snapshot_for(Some(&node)).expect("snapshot");
        assert_eq!(snapshot.version, "test-config-id");
        assert!(cache.snapshot_for(None).is_none());
    }

    #[test]
    fn resources_by_type_url() {
        let snapshot = sample_snapshot("backend", "backend");
        assert_eq!(snapshot.resources(CLUSTER_TYPE_URL).len(), 1);
        assert_eq!(snapshot.resources(LISTENER_TYPE_URL).len(), 1);
        assert!(snapshot.resources(ENDPOINT_TYPE_URL).is_empty());
        assert!(snapshot.resources(ROUTE_TYPE_URL).is_empty());
        assert!(snapshot.resources("type.googleapis.com/unknown").is_empty());
    }
}
