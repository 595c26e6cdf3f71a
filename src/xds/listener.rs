//! Listener and HTTP connection manager assembly using envoy-types
//!
//! One listener, one filter chain, one HTTP connection manager. The filter
//! order is fixed: JWT authentication, then service control, then the
//! transcoder, each optional; the router filter always comes last. A single
//! wildcard virtual host routes every path prefix to the upstream cluster.

use envoy_types::pb::envoy::config::{
    core::v3::{address::Address as AddressType, socket_address::PortSpecifier, Address, SocketAddress},
    listener::v3::{filter::ConfigType as ListenerConfigType, Filter, FilterChain, Listener},
    route::v3::{
        route::Action, route_action::ClusterSpecifier, route_match::PathSpecifier, Route,
        RouteAction, RouteConfiguration, RouteMatch, VirtualHost,
    },
};
use envoy_types::pb::envoy::extensions::filters::http::router::v3::Router;
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_connection_manager::{CodecType, RouteSpecifier},
    http_filter::ConfigType as HttpFilterConfigType,
    HttpConnectionManager, HttpFilter,
};

use crate::config::Config;
use crate::xds::filters::any_from_message;
use crate::xds::filters::http::{HTTP_CONNECTION_MANAGER, ROUTER};

const STAT_PREFIX: &str = "ingress_http";
const ROUTE_NAME: &str = "local_route";
const VIRTUAL_HOST_NAME: &str = "backend";

/// Name the listener resource is published under
pub const LISTENER_NAME: &str = "ingress_listener";

const ROUTER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router";
const HTTP_CONNECTION_MANAGER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager";

/// The terminal router filter
pub fn router_filter() -> HttpFilter {
    HttpFilter {
        name: ROUTER.to_string(),
        config_type: Some(HttpFilterConfigType::TypedConfig(any_from_message(
            ROUTER_TYPE_URL,
            &Router::default(),
        ))),
        ..Default::default()
    }
}

/// Build the HTTP connection manager around the given filters. The router
/// filter is appended here so it is always last.
pub fn build_http_connection_manager(
    cluster_name: &str,
    mut http_filters: Vec<HttpFilter>,
) -> HttpConnectionManager {
    http_filters.push(router_filter());

    let route_config = RouteConfiguration {
        name: ROUTE_NAME.to_string(),
        virtual_hosts: vec![VirtualHost {
            name: VIRTUAL_HOST_NAME.to_string(),
            domains: vec!["*".to_string()],
            routes: vec![Route {
                r#match: Some(RouteMatch {
                    path_specifier: Some(PathSpecifier::Prefix("/".to_string())),
                    ..Default::default()
                }),
                action: Some(Action::Route(RouteAction {
                    cluster_specifier: Some(ClusterSpecifier::Cluster(cluster_name.to_string())),
                    ..Default::default()
                })),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    };

    HttpConnectionManager {
        codec_type: CodecType::Auto as i32,
        stat_prefix: STAT_PREFIX.to_string(),
        route_specifier: Some(RouteSpecifier::RouteConfig(route_config)),
        http_filters,
        ..Default::default()
    }
}

/// Build the listener wrapping the connection manager in its single filter chain
pub fn build_listener(config: &Config, http_manager: &HttpConnectionManager) -> Listener {
    let socket_address = SocketAddress {
        address: config.listener.address.clone(),
        port_specifier: Some(PortSpecifier::PortValue(config.listener.port.into())),
        ..Default::default()
    };

    Listener {
        name: LISTENER_NAME.to_string(),
        address: Some(Address { address: Some(AddressType::SocketAddress(socket_address)) }),
        filter_chains: vec![FilterChain {
            filters: vec![Filter {
                name: HTTP_CONNECTION_MANAGER.to_string(),
                config_type: Some(ListenerConfigType::TypedConfig(any_from_message(
                    HTTP_CONNECTION_MANAGER_TYPE_URL,
                    http_manager,
                ))),
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}
