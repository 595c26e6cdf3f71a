//! JWT authentication filter construction
//!
//! Turns the service config `authentication` section into the Envoy
//! `jwt_authn` filter. Providers carry their JWKS documents inline, so the
//! proxy never re-fetches keys. A requirement rule matches requests by the
//! `/<api-name>/<method-name>` path prefix derived from the rule selector.

use std::collections::BTreeMap;

use envoy_types::pb::envoy::config::core::v3::{data_source, DataSource};
use envoy_types::pb::envoy::config::route::v3::{route_match::PathSpecifier, RouteMatch};
use envoy_types::pb::envoy::extensions::filters::http::jwt_authn::v3::{
    jwt_provider::JwksSourceSpecifier, jwt_requirement::RequiresType,
    requirement_rule::RequirementType, JwtAuthentication, JwtProvider, JwtRequirement,
    JwtRequirementOrList, ProviderWithAudiences, RequirementRule,
};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_filter::ConfigType, HttpFilter,
};

use crate::service_config::{Api, AuthRequirement, Service};
use crate::xds::filters::any_from_message;

const JWT_AUTHENTICATION_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.jwt_authn.v3.JwtAuthentication";

/// Build the JWT authentication filter from the service config and the
/// collected JWKS documents. Returns `None` when no provider survived JWKS
/// collection, in which case no JWT filter is installed at all.
pub fn build_jwt_authn_filter(
    service: &Service,
    endpoint_api: &Api,
    jwks: &BTreeMap<String, String>,
) -> Option<HttpFilter> {
    let auth = service.authentication.as_ref()?;
    if auth.providers.is_empty() {
        return None;
    }

    let mut providers = std::collections::HashMap::new();
    for provider in &auth.providers {
        let Some(jwks_body) = jwks.get(&provider.id) else {
            continue;
        };

        let mut jwt_provider = JwtProvider {
            issuer: provider.issuer.clone(),
            jwks_source_specifier: Some(JwksSourceSpecifier::LocalJwks(DataSource {
                specifier: Some(data_source::Specifier::InlineString(jwks_body.clone())),
                ..Default::default()
            })),
            ..Default::default()
        };
        if !provider.audiences.is_empty() {
            jwt_provider.audiences = split_audiences(&provider.audiences);
        }

        providers.insert(provider.id.clone(), jwt_provider);
    }

    if providers.is_empty() {
        return None;
    }

    let mut rules = Vec::new();
    for rule in &auth.rules {
        if rule.requirements.is_empty() {
            continue;
        }

        let requires = if rule.requirements.len() == 1 {
            requirement_from(&rule.requirements[0])
        } else {
            // Multiple requirements combine as a logical OR.
            JwtRequirement {
                requires_type: Some(RequiresType::RequiresAny(JwtRequirementOrList {
                    requirements: rule.requirements.iter().map(requirement_from).collect(),
                })),
            }
        };

        let method_name = rule.selector.rsplit('.').next().unwrap_or(&rule.selector);
        rules.push(RequirementRule {
            r#match: Some(RouteMatch {
                path_specifier: Some(PathSpecifier::Prefix(format!(
                    "/{}/{}",
                    endpoint_api.name, method_name
                ))),
                ..Default::default()
            }),
            requirement_type: Some(RequirementType::Requires(requires)),
        });
    }

    let jwt_authentication = JwtAuthentication { providers, rules, ..Default::default() };

    Some(HttpFilter {
        name: super::JWT_AUTHN.to_string(),
        config_type: Some(ConfigType::TypedConfig(any_from_message(
            JWT_AUTHENTICATION_TYPE_URL,
            &jwt_authentication,
        ))),
        ..Default::default()
    })
}

fn requirement_from(requirement: &AuthRequirement) -> JwtRequirement {
    let requires_type = if requirement.audiences.is_empty() {
        RequiresType::ProviderName(requirement.provider_id.clone())
    } else {
        RequiresType::ProviderAndAudiences(ProviderWithAudiences {
            provider_name: requirement.provider_id.clone(),
            audiences: split_audiences(&requirement.audiences),
        })
    };

    JwtRequirement { requires_type: Some(requires_type) }
}

fn split_audiences(audiences: &str) -> Vec<String> {
    audiences.split(',').map(str::to_string).collect()
}
