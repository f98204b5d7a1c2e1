//! Resolver and network configuration

use crate::types::{NodeEndpoint, NodePublicKey};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default ceiling for a whole retrieval (5 minutes)
pub const DEFAULT_OVERALL_DEADLINE_SECS: u64 = 300;

/// Default timeout for one protocol stage
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 60;

/// Default timeout for one HTTP request
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default wait for late commitment acks once the threshold is met
pub const DEFAULT_SETTLE_GRACE_MS: u64 = 500;

/// Protocol parameters of a `KeyResolver`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Valid node replies needed at every stage, and shares needed to reconstruct
    pub threshold: usize,

    /// Hard ceiling for `retrieve_shares` in seconds
    #[serde(default = "default_overall_deadline")]
    pub overall_deadline_secs: u64,

    /// Per-stage quorum timeout in seconds
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Per-request transport timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long the commitment round keeps collecting acks after reaching
    /// the threshold, in milliseconds
    #[serde(default = "default_settle_grace")]
    pub settle_grace_ms: u64,
}

fn default_overall_deadline() -> u64 {
    DEFAULT_OVERALL_DEADLINE_SECS
}

fn default_stage_timeout() -> u64 {
    DEFAULT_STAGE_TIMEOUT_SECS
}

fn default_request_timeout() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_settle_grace() -> u64 {
    DEFAULT_SETTLE_GRACE_MS
}

impl ResolverConfig {
    /// Create a config with default timeouts
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            overall_deadline_secs: DEFAULT_OVERALL_DEADLINE_SECS,
            stage_timeout_secs: DEFAULT_STAGE_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            settle_grace_ms: DEFAULT_SETTLE_GRACE_MS,
        }
    }

    /// Set the overall retrieval deadline
    pub fn with_overall_deadline_secs(mut self, secs: u64) -> Self {
        self.overall_deadline_secs = secs;
        self
    }

    /// Set the per-stage timeout
    pub fn with_stage_timeout_secs(mut self, secs: u64) -> Self {
        self.stage_timeout_secs = secs;
        self
    }

    /// Set the per-request timeout
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Set the commitment settle grace
    pub fn with_settle_grace_ms(mut self, millis: u64) -> Self {
        self.settle_grace_ms = millis;
        self
    }

    pub fn overall_deadline(&self) -> Duration {
        Duration::from_secs(self.overall_deadline_secs)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn settle_grace(&self) -> Duration {
        Duration::from_millis(self.settle_grace_ms)
    }

    /// Check the parameters in isolation
    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(Error::InvalidConfig("Threshold must be at least 1".into()));
        }
        if self.overall_deadline_secs == 0 {
            return Err(Error::InvalidConfig("Overall deadline must be positive".into()));
        }
        if self.stage_timeout_secs == 0 {
            return Err(Error::InvalidConfig("Stage timeout must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::InvalidConfig("Request timeout must be positive".into()));
        }
        Ok(())
    }

    /// Check the parameters against a node set of `nodes` members
    pub fn validate_for(&self, nodes: usize) -> Result<()> {
        self.validate()?;
        if self.threshold > nodes {
            return Err(Error::InvalidConfig(format!(
                "Threshold {} exceeds the {} configured nodes",
                self.threshold, nodes
            )));
        }
        Ok(())
    }
}

/// A node network description, as read by the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Node URLs; position is the node index
    pub endpoints: Vec<String>,

    /// Node public keys, in the same order as `endpoints`
    pub node_pub_keys: Vec<NodePublicKey>,

    /// Metadata service base URL
    pub metadata_url: String,

    #[serde(flatten)]
    pub resolver: ResolverConfig,
}

impl NetworkConfig {
    /// Load and validate a JSON network file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| Error::InvalidConfig(format!("Invalid network file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Endpoints numbered in file order
    pub fn node_endpoints(&self) -> Vec<NodeEndpoint> {
        NodeEndpoint::from_urls(self.endpoints.iter().cloned())
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::InvalidConfig("No node endpoints configured".into()));
        }
        if self.node_pub_keys.len() != self.endpoints.len() {
            return Err(Error::InvalidConfig(format!(
                "{} endpoints but {} node public keys",
                self.endpoints.len(),
                self.node_pub_keys.len()
            )));
        }
        self.resolver.validate_for(self.endpoints.len())
    }
}
