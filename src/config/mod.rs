//! # Configuration Management
//!
//! This module provides the immutable startup configuration for the gateplane
//! control plane. All knobs are resolved once at process start and passed to
//! the builders as a configuration record, never read as ambient state.

use std::time::Duration;

use crate::{Error, Result};

/// Default public service management endpoint
pub const DEFAULT_SERVICE_MANAGEMENT_URL: &str = "https://servicemanagement.googleapis.com";

/// Default cloud metadata token endpoint
pub const DEFAULT_TOKEN_URI: &str =
    "http://169.254.169.254/computeMetadata/v1/instance/service-accounts/default/token";

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Name of the managed service, e.g. `echo.endpoints.example.cloud.goog`
    pub service_name: String,
    /// Service config id; doubles as the published snapshot version
    pub config_id: String,
    /// Downstream listener settings
    pub listener: ListenerConfig,
    /// Upstream cluster settings
    pub upstream: UpstreamConfig,
    /// Node identity the snapshot is published under
    pub node_id: String,
    /// Base URL of the service management server
    pub service_management_url: String,
    /// xDS server settings
    pub xds: XdsConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

/// Listener socket configuration
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { address: "0.0.0.0".to_string(), port: 8080 }
    }
}

/// Upstream cluster configuration
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub address: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8082,
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// xDS server configuration
#[derive(Debug, Clone)]
pub struct XdsConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for XdsConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0".to_string(), port: 18000 }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { log_level: "info".to_string(), json_logging: false }
    }
}

impl Config {
    /// Create a configuration with defaults for everything but the service identity
    pub fn new(service_name: impl Into<String>, config_id: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            config_id: config_id.into(),
            listener: ListenerConfig::default(),
            upstream: UpstreamConfig::default(),
            node_id: "api_proxy".to_string(),
            service_management_url: DEFAULT_SERVICE_MANAGEMENT_URL.to_string(),
            xds: XdsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }

    /// Validate the configuration before startup
    pub fn validate(&self) -> Result<()> {
        if self.service_name.is_empty() {
            return Err(Error::config("service_name cannot be empty"));
        }
        if self.config_id.is_empty() {
            return Err(Error::config("config_id cannot be empty"));
        }
        if self.node_id.is_empty() {
            return Err(Error::config("node_id cannot be empty"));
        }
        if self.service_management_url.is_empty() {
            return Err(Error::config("service_management_url cannot be empty"));
        }
        Ok(())
    }

    /// URL of the service config document for this service identity
    pub fn fetch_config_url(&self) -> String {
        format!(
            "{}/v1/services/{}/configs/{}?view=FULL",
            self.service_management_url, self.service_name, self.config_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::new("test-echo", "2019-05-01r0");
        assert_eq!(config.listener.address, "0.0.0.0");
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.upstream.address, "127.0.0.1");
        assert_eq!(config.upstream.port, 8082);
        assert_eq!(config.upstream.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.node_id, "api_proxy");
        assert_eq!(config.service_management_url, DEFAULT_SERVICE_MANAGEMENT_URL);
    }

    #[test]
    fn test_fetch_config_url() {
        let mut config = Config::new("test-echo", "test-config-id");
        config.service_management_url = "https://mgmt.example.com".to_string();
        assert_eq!(
            config.fetch_config_url(),
            "https://mgmt.example.com/v1/services/test-echo/configs/test-config-id?view=FULL"
        );
    }

    #[test]
    fn test_validation_rejects_empty_identity() {
        let config = Config::new("", "test-config-id");
        assert!(config.validate().is_err());

        let config = Config::new("test-echo", "");
        assert!(config.validate().is_err());

        let mut config = Config::new("test-echo", "test-config-id");
        config.node_id = String::new();
        assert!(config.validate().is_err());
    }
}
