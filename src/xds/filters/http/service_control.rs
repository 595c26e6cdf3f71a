//! Service control filter construction
//!
//! The service control filter meters and checks every API method. Its
//! configuration enumerates one rule per method: each rule starts from the
//! gRPC-shaped pattern `POST /<api-name>/<method-name>`, is overridden by the
//! method's HTTP binding when one exists, and carries the API key
//! requirement declared by the method's usage rule.
//!
//! The filter references the `service_control_cluster` and
//! `gcp_metadata_cluster` upstreams by name; both are provisioned outside
//! this control plane.

use std::collections::BTreeMap;

use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_filter::ConfigType, HttpFilter,
};
use envoy_types::pb::google::protobuf::Duration;
use tracing::warn;

use crate::config::DEFAULT_TOKEN_URI;
use crate::service_config::Service;
use crate::xds::filters::any_from_message;

const FILTER_CONFIG_TYPE_URL: &str =
    "type.googleapis.com/gateplane.http.service_control.FilterConfig";

const SERVICE_CONTROL_URI: &str = "https://servicecontrol.googleapis.com/v1/services/";
const SERVICE_CONTROL_CLUSTER: &str = "service_control_cluster";
const METADATA_CLUSTER: &str = "gcp_metadata_cluster";
const CALLOUT_TIMEOUT_SECONDS: i64 = 5;

/// Wire messages understood by the data plane's service control filter.
///
/// Hand-rolled prost definitions, kept in the exact shape `prost-build`
/// would emit for the filter's proto schema.
pub mod proto {
    use envoy_types::pb::google::protobuf::Duration;

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FilterConfig {
        #[prost(message, repeated, tag = "1")]
        pub services: ::prost::alloc::vec::Vec<Service>,
        #[prost(string, tag = "2")]
        pub service_name: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "3")]
        pub service_control_uri: ::core::option::Option<HttpUri>,
        #[prost(message, repeated, tag = "4")]
        pub rules: ::prost::alloc::vec::Vec<ServiceControlRule>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Service {
        #[prost(string, tag = "1")]
        pub service_name: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "2")]
        pub token_uri: ::core::option::Option<HttpUri>,
        #[prost(message, optional, tag = "3")]
        pub service_control_uri: ::core::option::Option<HttpUri>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct HttpUri {
        #[prost(string, tag = "1")]
        pub uri: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub cluster: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "3")]
        pub timeout: ::core::option::Option<Duration>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ServiceControlRule {
        #[prost(message, optional, tag = "1")]
        pub requires: ::core::option::Option<Requirement>,
        #[prost(message, optional, tag = "2")]
        pub pattern: ::core::option::Option<Pattern>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Requirement {
        #[prost(string, tag = "1")]
        pub service_name: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub operation_name: ::prost::alloc::string::String,
        #[prost(message, optional, tag = "3")]
        pub api_key: ::core::option::Option<ApiKeyRequirement>,
    }

    /// URI template and HTTP method the proxy matches at request time. The
    /// template string is forwarded verbatim; `{var}` segments are bound by
    /// the proxy, not here.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Pattern {
        #[prost(string, tag = "1")]
        pub uri_template: ::prost::alloc::string::String,
        #[prost(string, tag = "2")]
        pub http_method: ::prost::alloc::string::String,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ApiKeyRequirement {
        #[prost(bool, tag = "1")]
        pub allow_without_api_key: bool,
        #[prost(message, repeated, tag = "2")]
        pub api_keys: ::prost::alloc::vec::Vec<ApiKey>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ApiKey {
        #[prost(oneof = "api_key::Key", tags = "1, 2, 3")]
        pub key: ::core::option::Option<api_key::Key>,
    }

    /// Nested message and enum types in `ApiKey`.
    pub mod api_key {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Key {
            #[prost(string, tag = "1")]
            Query(::prost::alloc::string::String),
            #[prost(string, tag = "2")]
            Header(::prost::alloc::string::String),
            #[prost(string, tag = "3")]
            Cookie(::prost::alloc::string::String),
        }
    }
}

fn callout_uri(uri: &str, cluster: &str) -> proto::HttpUri {
    proto::HttpUri {
        uri: uri.to_string(),
        cluster: cluster.to_string(),
        timeout: Some(Duration { seconds: CALLOUT_TIMEOUT_SECONDS, nanos: 0 }),
    }
}

/// Build the service control filter from the service config. Returns `None`
/// unless both the service name and the control environment are set.
pub fn build_service_control_filter(service: &Service) -> Option<HttpFilter> {
    let environment =
        service.control.as_ref().map(|control| control.environment.as_str()).unwrap_or_default();
    if service.name.is_empty() || environment.is_empty() {
        return None;
    }

    // Selector-keyed rules; the ordered map keeps the emitted config
    // byte-stable across rebuilds.
    let mut rules: BTreeMap<String, proto::ServiceControlRule> = BTreeMap::new();
    for api in &service.apis {
        for method in &api.methods {
            let selector = Service::selector(api, method);
            rules.insert(
                selector.clone(),
                proto::ServiceControlRule {
                    requires: Some(proto::Requirement {
                        service_name: service.name.clone(),
                        operation_name: selector,
                        api_key: None,
                    }),
                    pattern: Some(proto::Pattern {
                        uri_template: format!("/{}/{}", api.name, method.name),
                        http_method: "POST".to_string(),
                    }),
                },
            );
        }
    }

    if let Some(http) = &service.http {
        for http_rule in &http.rules {
            let Some(pattern) = http_rule.pattern() else {
                continue;
            };
            match rules.get_mut(&http_rule.selector) {
                Some(rule) => {
                    rule.pattern = Some(proto::Pattern {
                        uri_template: pattern.uri_template().to_string(),
                        http_method: pattern.http_method().to_string(),
                    });
                }
                None => {
                    warn!(selector = %http_rule.selector, "http rule selector matches no method");
                }
            }
        }
    }

    if let Some(usage) = &service.usage {
        for usage_rule in &usage.rules {
            match rules.get_mut(&usage_rule.selector) {
                Some(rule) => {
                    let Some(requires) = rule.requires.as_mut() else {
                        continue;
                    };
                    requires.api_key = Some(proto::ApiKeyRequirement {
                        allow_without_api_key: usage_rule.allow_unregistered_calls,
                        api_keys: vec![
                            proto::ApiKey {
                                key: Some(proto::api_key::Key::Query("key".to_string())),
                            },
                            proto::ApiKey {
                                key: Some(proto::api_key::Key::Header("x-api-key".to_string())),
                            },
                        ],
                    });
                }
                None => {
                    warn!(selector = %usage_rule.selector, "usage rule selector matches no method");
                }
            }
        }
    }

    let filter_config = proto::FilterConfig {
        services: vec![proto::Service {
            service_name: service.name.clone(),
            token_uri: Some(callout_uri(DEFAULT_TOKEN_URI, METADATA_CLUSTER)),
            service_control_uri: Some(callout_uri(SERVICE_CONTROL_URI, SERVICE_CONTROL_CLUSTER)),
        }],
        service_name: service.name.clone(),
        service_control_uri: Some(callout_uri(SERVICE_CONTROL_URI, SERVICE_CONTROL_CLUSTER)),
        rules: rules.into_values().collect(),
    };

    Some(HttpFilter {
        name: super::SERVICE_CONTROL.to_string(),
        config_type: Some(ConfigType::TypedConfig(any_from_message(
            FILTER_CONFIG_TYPE_URL,
            &filter_config,
        ))),
        ..Default::default()
    })
}
