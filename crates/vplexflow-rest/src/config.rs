//! Connection parameters for the management server

use crate::error::{RestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const MAX_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub user: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    /// Verify the server certificate against `ssl_ca_cert`
    #[serde(default)]
    pub verify_cert: bool,

    /// PEM CA bundle, required when `verify_cert` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_ca_cert: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: password.into(),
            verify_cert: false,
            ssl_ca_cert: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() || self.user.is_empty() || self.password.is_empty() {
            return Err(RestError::InvalidConfig(
                "host, user and password can not be empty".to_string(),
            ));
        }
        if self.verify_cert && self.ssl_ca_cert.is_none() {
            return Err(RestError::InvalidConfig(
                "ssl_ca_cert (CA certificate in .pem format) is required when verify_cert is set"
                    .to_string(),
            ));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.timeout_secs) {
            return Err(RestError::InvalidConfig(format!(
                "invalid timeout {}, the valid range is from 1 to {}",
                self.timeout_secs, MAX_TIMEOUT_SECS
            )));
        }
        Ok(())
    }

    /// `https://host:port`, without the API root
    pub fn endpoint(&self) -> String {
        format!("https://{}:{}", self.host, self.port)
    }
}
