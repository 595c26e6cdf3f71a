//! Service config fetching from the service management endpoint
//!
//! The fetch is authenticated with a bearer token obtained from an
//! injectable token source; the default source is the cloud metadata
//! server. Any non-200 response is fatal.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::{Config, DEFAULT_TOKEN_URI};
use crate::service_config::{parse_service, Service};
use crate::{Error, Result};

/// Source of access tokens for service management calls
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self, client: &reqwest::Client) -> Result<String>;
}

/// Token source backed by the cloud metadata server
#[derive(Debug, Clone)]
pub struct MetadataTokenSource {
    token_uri: String,
}

impl MetadataTokenSource {
    pub fn new(token_uri: impl Into<String>) -> Self {
        Self { token_uri: token_uri.into() }
    }
}

impl Default for MetadataTokenSource {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_URI)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let response = client
            .get(&self.token_uri)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::config_fetch(format!("fail to get access token: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::config_fetch(format!(
                "fail to get access token, metadata server returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::config_fetch(format!("fail to parse access token: {}", e)))?;

        Ok(token.access_token)
    }
}

/// Fixed token source, used when the caller already holds a credential
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self, _client: &reqwest::Client) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Fetch and parse the service config document for the configured identity
pub async fn fetch_service_config(
    client: &reqwest::Client,
    token_source: &dyn TokenSource,
    config: &Config,
) -> Result<Service> {
    let token = token_source.access_token(client).await?;
    let url = config.fetch_config_url();

    debug!(url = %url, "Fetching service config");

    let response = client
        .get(&url)
        .bearer_auth(&token)
        .send()
        .await
        .map_err(|e| Error::config_fetch(format!("call to service management failed: {}", e)))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(Error::config_fetch(format!(
            "http call to service management returns not 200 OK: {}",
            status
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::config_fetch(format!("fail to read service config body: {}", e)))?;

    parse_service(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_source() {
        let client = reqwest::Client::new();
        let source = StaticTokenSource::new("ya29.test");
        assert_eq!(source.access_token(&client).await.unwrap(), "ya29.test");
    }
}
