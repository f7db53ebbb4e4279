//! Client configuration

use crate::error::Result;
use crate::policy::{VersionPolicy, DEFAULT_DISTRIBUTION};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Base URL of the node to talk to
    #[serde(default = "default_node")]
    pub node: String,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Headers sent with every request
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Product check settings
    #[serde(default)]
    pub product_check: ProductCheckConfig,
}

fn default_node() -> String {
    "http://localhost:9200".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    30000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            node: default_node(),
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            headers: HashMap::new(),
            product_check: ProductCheckConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create a config pointing at the given node with defaults elsewhere
    pub fn for_node(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            ..Default::default()
        }
    }

    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse config from TOML text, validating the version table
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.product_check.policy()?;
        Ok(config)
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Product check configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProductCheckConfig {
    /// Verify the server distribution before the first request
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Distribution assumed when the server reports none
    #[serde(default = "default_distribution")]
    pub default_distribution: String,

    /// Minimum supported version per distribution tag
    #[serde(default = "default_minimum_versions")]
    pub minimum_versions: HashMap<String, String>,
}

fn default_enabled() -> bool {
    true
}

fn default_distribution() -> String {
    DEFAULT_DISTRIBUTION.to_string()
}

fn default_minimum_versions() -> HashMap<String, String> {
    let mut versions = HashMap::new();
    versions.insert(DEFAULT_DISTRIBUTION.to_string(), "7.0.0".to_string());
    versions.insert("opensearch".to_string(), "1.0.0".to_string());
    versions
}

impl Default for ProductCheckConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            default_distribution: default_distribution(),
            minimum_versions: default_minimum_versions(),
        }
    }
}

impl ProductCheckConfig {
    /// Build the version policy described by this config
    pub fn policy(&self) -> Result<VersionPolicy> {
        VersionPolicy::from_table(&self.default_distribution, &self.minimum_versions)
    }
}
