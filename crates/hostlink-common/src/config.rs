//! Configuration model for the reporter.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_HOST, DEFAULT_PORT};
use crate::error::{HostlinkError, Result};
use crate::types::DescriptionPolicy;

/// Network address of the analysis host. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct HostEndpoint {
    host: String,
    port: u16,
}

impl HostEndpoint {
    /// Creates an endpoint from an address and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

impl Default for HostEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl fmt::Display for HostEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Root configuration for a reporting session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostlinkConfig {
    /// Analysis host that receives the event streams.
    pub endpoint: HostEndpoint,
    /// When API descriptions are sent on a connection.
    pub description_policy: DescriptionPolicy,
}

impl HostlinkConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// names an empty host or port zero.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| HostlinkError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the endpoint is usable.
    ///
    /// # Errors
    ///
    /// Returns [`HostlinkError::Config`] for an empty host or port zero.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.host().trim().is_empty() {
            return Err(HostlinkError::Config {
                message: "endpoint host must not be empty".into(),
            });
        }
        if self.endpoint.port() == 0 {
            return Err(HostlinkError::Config {
                message: "endpoint port must be non-zero".into(),
            });
        }
        Ok(())
    }
}
