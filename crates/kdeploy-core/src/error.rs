//! Deployment error types

use crate::executor::CommandError;
use thiserror::Error;

/// Errors surfaced by a deployment run.
///
/// Every stage propagates the first failure it sees unchanged; nothing is
/// aggregated and nothing is rolled back.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Listing or status query against the control plane failed
    #[error("Query for {resource} failed: {source}")]
    Query {
        resource: String,
        #[source]
        source: CommandError,
    },

    /// Control-plane output could not be decoded
    #[error("Could not decode {resource} listing: {source}")]
    Parse {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    /// Create, replace or expose call failed
    #[error("Failed to {action} {resource}: {source}")]
    Apply {
        action: &'static str,
        resource: String,
        #[source]
        source: CommandError,
    },

    /// Rollout did not stabilize within the poll cap
    #[error("Timeout waiting for rollout of {workload} after {polls} polls")]
    Timeout { workload: String, polls: u32 },

    /// Required configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cluster collaborator failed
    #[error("Cluster operation on {cluster} failed: {source}")]
    Cluster {
        cluster: String,
        #[source]
        source: CommandError,
    },

    /// Manifest could not be encoded as a payload
    #[error("Failed to encode manifest: {0}")]
    Encode(#[source] serde_json::Error),
}

impl DeployError {
    /// Whether this failure came from a control-plane query (listing, status or decoding).
    pub fn is_query(&self) -> bool {
        matches!(self, DeployError::Query { .. } | DeployError::Parse { .. })
    }
}

impl From<config::ConfigError> for DeployError {
    fn from(err: config::ConfigError) -> Self {
        DeployError::Configuration(err.to_string())
    }
}

/// Result type for deployment operations
pub type Result<T> = std::result::Result<T, DeployError>;
