//! # Error Handling
//!
//! This module provides error handling for the gateplane control plane.
//! It defines custom error types using `thiserror` covering configuration
//! fetching, document parsing and snapshot publication.

/// Custom result type for gateplane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateplane control plane
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Service config could not be fetched or deserialized
    #[error("Service config fetch error: {0}")]
    ConfigFetch(String),

    /// A protobuf `Any` payload carried a type URL outside the whitelist
    #[error("Unexpected protobuf.Any type: {0}")]
    UnknownAnyType(String),

    /// The API source file is neither `.proto` nor `.yaml`
    #[error("Unknown backend protocol for source file: {0}")]
    UnknownBackendProtocol(String),

    /// The service document carries no APIs
    #[error("Service config must have at least one api")]
    EmptyApis,

    /// A snapshot failed its consistency check before publication
    #[error("Inconsistent snapshot: {0}")]
    Snapshot(String),

    /// Network transport errors (gRPC, HTTP)
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new fetch error
    pub fn config_fetch<S: Into<String>>(message: S) -> Self {
        Self::ConfigFetch(message.into())
    }

    /// Create a new snapshot consistency error
    pub fn snapshot<S: Into<String>>(message: S) -> Self {
        Self::Snapshot(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::config("bad listener port");
        assert_eq!(error.to_string(), "Configuration error: bad listener port");

        let error = Error::EmptyApis;
        assert_eq!(error.to_string(), "Service config must have at least one api");
    }

    #[test]
    fn test_unknown_any_type_message() {
        let error = Error::UnknownAnyType("type.googleapis.com/google.api.Billing".into());
        assert!(error.to_string().contains("google.api.Billing"));
    }

    #[test]
    fn test_serde_conversion() {
        let json_error = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Serialization(_)));
    }
}
