//! JWKS collection for JWT providers
//!
//! Each provider's JWKS document is fetched with an unauthenticated GET and
//! captured as raw bytes for inlining into the JWT filter. A single provider
//! failure logs a warning and aborts collection for the remaining providers:
//! a partially authenticated configuration is worse than none, so the filter
//! is emitted only from the providers that succeeded before the failure.

use std::collections::BTreeMap;

use tracing::warn;

use crate::service_config::AuthProvider;
use crate::{Error, Result};

/// Fetch one provider's JWKS document, returning the raw body
pub async fn fetch_jwks(client: &reqwest::Client, uri: &str) -> Result<String> {
    let response = client
        .get(uri)
        .send()
        .await
        .map_err(|e| Error::transport(format!("fetching JWKS from {} failed: {}", uri, e)))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(Error::transport(format!("fetching JWKS returns not 200 OK: {}", status)));
    }

    response
        .text()
        .await
        .map_err(|e| Error::transport(format!("reading JWKS body from {} failed: {}", uri, e)))
}

/// Collect JWKS documents for all providers, keyed by provider id.
///
/// Collection stops at the first failing provider; providers fetched before
/// the failure are kept.
pub async fn collect_jwks(
    client: &reqwest::Client,
    providers: &[AuthProvider],
) -> BTreeMap<String, String> {
    let mut collected = BTreeMap::new();

    for provider in providers {
        match fetch_jwks(client, &provider.jwks_uri).await {
            Ok(jwks) => {
                collected.insert(provider.id.clone(), jwks);
            }
            Err(err) => {
                warn!(provider = %provider.id, error = %err, "fetch jwk from issuer got error");
                break;
            }
        }
    }

    collected
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(id: &str, jwks_uri: String) -> AuthProvider {
        AuthProvider {
            id: id.to_string(),
            issuer: format!("https://{}.example.com", id),
            jwks_uri,
            audiences: String::new(),
        }
    }

    #[tokio::test]
    async fn test_collect_jwks_all_succeed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks-a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"keys":["a"]}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks-b"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"keys":["b"]}"#))
            .mount(&server)
            .await;

        let providers = vec![
            provider("provider-a", format!("{}/jwks-a", server.uri())),
            provider("provider-b", format!("{}/jwks-b", server.uri())),
        ];

        let client = reqwest::Client::new();
        let collected = collect_jwks(&client, &providers).await;
        assert_eq!(collected.len(), 2);
        assert_eq!(collected["provider-a"], r#"{"keys":["a"]}"#);
        assert_eq!(collected["provider-b"], r#"{"keys":["b"]}"#);
    }

    // A failing provider aborts collection for everything after it, even
    // providers that would have succeeded.
    #[tokio::test]
    async fn test_collect_jwks_aborts_on_first_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks-a"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"keys":["a"]}"#))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks-b"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/jwks-c"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"keys":["c"]}"#))
            .mount(&server)
            .await;

        let providers = vec![
            provider("provider-a", format!("{}/jwks-a", server.uri())),
            provider("provider-b", format!("{}/jwks-b", server.uri())),
            provider("provider-c", format!("{}/jwks-c", server.uri())),
        ];

        let client = reqwest::Client::new();
        let collected = collect_jwks(&client, &providers).await;
        assert_eq!(collected.len(), 1);
        assert!(collected.contains_key("provider-a"));
        assert!(!collected.contains_key("provider-c"));
    }

    #[tokio::test]
    async fn test_fetch_jwks_non_200_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = reqwest::Client::new();
        let err = fetch_jwks(&client, &format!("{}/jwks", server.uri())).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
