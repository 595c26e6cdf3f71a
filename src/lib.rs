//! # Gateplane
//!
//! Gateplane is the configuration manager of an API-gateway control plane.
//! It fetches a high-level service configuration document from a remote
//! service management endpoint and translates it into the low-level Envoy
//! resources the data-plane proxy consumes: a listener with its HTTP filter
//! chain, an upstream cluster, and a versioned snapshot published through a
//! pull-style discovery protocol.
//!
//! ## Architecture
//!
//! ```text
//! Service Management API → Config Manager → Snapshot Cache → xDS Server → Envoy
//!          ↓                     ↓
//!     JWKS endpoints       Filter builders
//!                    (jwt_authn, service_control,
//!                     grpc_json_transcoder, router)
//! ```
//!
//! ## Core Components
//!
//! - **Config Manager**: fetches and parses the service config, builds the
//!   snapshot and publishes it under the configured node id
//! - **Filter Builders**: translate the document's authentication, usage and
//!   HTTP binding sections into Envoy HTTP filters
//! - **Snapshot Cache**: validated, atomically swapped resource bundles
//!   keyed by node id
//! - **xDS Server**: tonic-based ADS endpoint streaming the snapshot to the
//!   data plane

pub mod config;
pub mod errors;
pub mod manager;
pub mod observability;
pub mod service_config;
pub mod xds;

// Re-export commonly used types and traits
pub use config::Config;
pub use errors::{Error, Result};
pub use manager::ConfigManager;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
