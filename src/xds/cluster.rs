//! Upstream cluster construction using envoy-types
//!
//! The data plane routes every request to a single upstream cluster named
//! after the first API of the service config.

use envoy_types::pb::envoy::config::{
    cluster::v3::{cluster::LbPolicy, Cluster},
    core::v3::{address::Address as AddressType, socket_address::PortSpecifier, Address, SocketAddress},
    endpoint::v3::{lb_endpoint::HostIdentifier, ClusterLoadAssignment, Endpoint, LbEndpoint, LocalityLbEndpoints},
};
use envoy_types::pb::google::protobuf::Duration;

use crate::config::Config;

/// Build the single upstream cluster for the endpoint API
pub fn build_cluster(config: &Config, name: &str) -> Cluster {
    let socket_address = SocketAddress {
        address: config.upstream.address.clone(),
        port_specifier: Some(PortSpecifier::PortValue(config.upstream.port.into())),
        ..Default::default()
    };

    let endpoint = Endpoint {
        address: Some(Address { address: Some(AddressType::SocketAddress(socket_address)) }),
        ..Default::default()
    };

    let load_assignment = ClusterLoadAssignment {
        cluster_name: name.to_string(),
        endpoints: vec![LocalityLbEndpoints {
            lb_endpoints: vec![LbEndpoint {
                host_identifier: Some(HostIdentifier::Endpoint(endpoint)),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    };

    Cluster {
        name: name.to_string(),
        lb_policy: LbPolicy::RoundRobin as i32,
        connect_timeout: Some(Duration {
            seconds: config.upstream.connect_timeout.as_secs() as i64,
            nanos: config.upstream.connect_timeout.subsec_nanos() as i32,
        }),
        load_assignment: Some(load_assignment),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_shape() {
        let mut config = Config::new("test-echo", "test-config-id");
        config.upstream.address = "10.0.0.5".to_string();
        config.upstream.port = 9000;
        config.upstream.connect_timeout = std::time::Duration::from_secs(20);

        let cluster = build_cluster(&config, "endpoints.examples.bookstore.Bookstore");

        assert_eq!(cluster.name, "endpoints.examples.bookstore.Bookstore");
        assert_eq!(cluster.lb_policy, LbPolicy::RoundRobin as i32);
        assert_eq!(cluster.connect_timeout.as_ref().map(|t| t.seconds), Some(20));

        let load_assignment = cluster.load_assignment.expect("load assignment");
        assert_eq!(load_assignment.cluster_name, "endpoints.examples.bookstore.Bookstore");
        assert_eq!(load_assignment.endpoints.len(), 1);
        assert_eq!(load_assignment.endpoints[0].lb_endpoints.len(), 1);

        let Some(HostIdentifier::Endpoint(endpoint)) =
            &load_assignment.endpoints[0].lb_endpoints[0].host_identifier
        else {
            panic!("endpoint missing");
        };
        let Some(AddressType::SocketAddress(socket)) =
            endpoint.address.as_ref().and_then(|a| a.address.as_ref())
        else {
            panic!("socket address missing");
        };
        assert_eq!(socket.address, "10.0.0.5");
        assert_eq!(socket.port_specifier, Some(PortSpecifier::PortValue(9000)));
    }
}
