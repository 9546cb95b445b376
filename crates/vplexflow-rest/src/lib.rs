//! VPLEX REST client for vplexflow
//!
//! Implements [`vplexflow_core::ResourceClient`] against the `/vplex/v2`
//! management API using HTTP basic authentication.
//!
//! # Example
//!
//! ```ignore
//! use vplexflow_rest::{ConnectionConfig, VplexRestClient};
//! use vplexflow_core::ResourceClient;
//!
//! let config = ConnectionConfig::new("10.0.0.5", "service", "secret");
//! let client = VplexRestClient::new(&config)?;
//!
//! // Probe credentials and the target cluster
//! client.check_connection().await?;
//! client.verify_cluster("cluster-1").await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod payload;

pub use client::VplexRestClient;
pub use config::{ConnectionConfig, DEFAULT_PORT, DEFAULT_TIMEOUT_SECS, MAX_TIMEOUT_SECS};
pub use error::{RestError, Result, sanitize_message};
pub use payload::{PatchOp, create_payload, details_from_json, view_patch};
