//! HTTP filter builders
//!
//! Each builder turns a section of the service config document into zero or
//! one Envoy HTTP filter. The listener assembly composes the results in a
//! fixed order with the router filter always last.

pub mod jwt_auth;
pub mod service_control;
pub mod transcoder;

/// Well-known filter name for the HTTP connection manager
pub const HTTP_CONNECTION_MANAGER: &str = "envoy.filters.network.http_connection_manager";

/// Well-known filter name for the router filter
pub const ROUTER: &str = "envoy.filters.http.router";

/// Well-known filter name for the JWT authentication filter
pub const JWT_AUTHN: &str = "envoy.filters.http.jwt_authn";

/// Well-known filter name for the gRPC-JSON transcoder filter
pub const GRPC_JSON_TRANSCODER: &str = "envoy.filters.http.grpc_json_transcoder";

/// Well-known filter name for the service control filter
pub const SERVICE_CONTROL: &str = "envoy.filters.http.service_control";

pub use jwt_auth::build_jwt_authn_filter;
pub use service_control::build_service_control_filter;
pub use transcoder::build_transcoder_filter;
