//! Aggregated discovery service backed by the snapshot cache
//!
//! Streams `DiscoveryResponse`s out of the published snapshot. The node id
//! arrives on the first request of a stream and is remembered for the rest
//! of it; a request whose version already matches the published snapshot is
//! treated as an ACK and left unanswered.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use envoy_types::pb::envoy::config::core::v3::Node;
use envoy_types::pb::envoy::service::discovery::v3::{
    aggregated_discovery_service_server::AggregatedDiscoveryService, DeltaDiscoveryRequest,
    DeltaDiscoveryResponse, DiscoveryRequest, DiscoveryResponse,
};

use crate::xds::snapshot::SnapshotCache;

/// ADS implementation serving the published snapshot
pub struct SnapshotDiscoveryService {
    cache: Arc<SnapshotCache>,
}

impl SnapshotDiscoveryService {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache }
    }

    fn response_for(
        cache: &SnapshotCache,
        node: Option<&Node>,
        request: &DiscoveryRequest,
    ) -> Option<DiscoveryResponse> {
        let snapshot = cache.snapshot_for(node)?;

        // Same version means the client is acknowledging, not asking.
        if request.version_info == snapshot.version {
            return None;
        }

        let resources = snapshot
            .resources(&request.type_url)
            .iter()
            .map(|built| built.resource.clone())
            .collect();

        Some(DiscoveryResponse {
            version_info: snapshot.version.clone(),
            resources,
            type_url: request.type_url.clone(),
            nonce: uuid::Uuid::new_v4().to_string(),
            ..Default::default()
        })
    }
}

#[tonic::async_trait]
impl AggregatedDiscoveryService for SnapshotDiscoveryService {
    type StreamAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DiscoveryResponse, Status>> + Send>>;
    type DeltaAggregatedResourcesStream =
        Pin<Box<dyn Stream<Item = std::result::Result<DeltaDiscoveryResponse, Status>> + Send>>;

    async fn stream_aggregated_resources(
        &self,
        request: Request<tonic::Streaming<DiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::StreamAggregatedResourcesStream>, Status> {
        info!("New ADS stream connection established");

        let mut in_stream = request.into_inner();
        let (tx, rx) = mpsc::channel(100);
        let cache = self.cache.clone();

        tokio::spawn(async move {
            let mut stream_node: Option<Node> = None;

            while let Some(result) = in_stream.next().await {
                let discovery_request = match result {
                    Ok(discovery_request) => discovery_request,
                    Err(e) => {
                        error!("ADS stream error: {}", e);
                        break;
                    }
                };

                if let Some(node) = &discovery_request.node {
                    stream_node = Some(node.clone());
                }

                info!(
                    type_url = %discovery_request.type_url,
                    version_info = %discovery_request.version_info,
                    node_id = ?stream_node.as_ref().map(|n| &n.id),
                    "Received discovery request"
                );

                let response =
                    match Self::response_for(&cache, stream_node.as_ref(), &discovery_request) {
                        Some(response) => response,
                        None => {
                            warn!(
                                type_url = %discovery_request.type_url,
                                "No new snapshot for discovery request"
                            );
                            continue;
                        }
                    };

                info!(
                    type_url = %response.type_url,
                    version = %response.version_info,
                    resource_count = response.resources.len(),
                    "Sending discovery response"
                );

                if tx.send(Ok(response)).await.is_err() {
                    break;
                }
            }
        });

        let out_stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(out_stream) as Self::StreamAggregatedResourcesStream))
    }

    async fn delta_aggregated_resources(
        &self,
        _request: Request<tonic::Streaming<DeltaDiscoveryRequest>>,
    ) -> std::result::Result<Response<Self::DeltaAggregatedResourcesStream>, Status> {
        Err(Status::unimplemented("delta xDS is not supported"))
    }
}
