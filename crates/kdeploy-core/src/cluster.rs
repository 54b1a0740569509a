//! Cluster collaborator
//!
//! The workflow only needs to know whether the target cluster exists, to
//! create a minimal one when it does not, and to load credentials for it.
//! [`GcloudClusterProvider`] does this through the `gcloud` CLI.

use crate::error::{DeployError, Result};
use crate::executor::CommandExecutor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument};

/// Default cloud CLI binary
pub const DEFAULT_GCLOUD_BINARY: &str = "gcloud";

/// Identity of a managed cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterRef {
    pub project: String,
    pub zone: String,
    pub name: String,
}

impl ClusterRef {
    pub fn new(
        project: impl Into<String>,
        zone: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            zone: zone.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.project, self.zone, self.name)
    }
}

/// Cluster existence and bootstrap
#[async_trait]
pub trait ClusterProvider: Send + Sync {
    /// Whether the cluster exists
    async fn exists(&self, cluster: &ClusterRef) -> Result<bool>;

    /// Create a minimal cluster
    async fn create_minimal(&self, cluster: &ClusterRef) -> Result<()>;

    /// Make the cluster's credentials available to the control-plane CLI
    async fn load_credentials(&self, cluster: &ClusterRef) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ClusterListing {
    name: String,
}

/// [`ClusterProvider`] backed by `gcloud container clusters`
pub struct GcloudClusterProvider {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
}

impl GcloudClusterProvider {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            binary: DEFAULT_GCLOUD_BINARY.into(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn args(cluster: &ClusterRef, action: &[&str]) -> Vec<String> {
        let mut args: Vec<String> = ["container", "clusters"]
            .iter()
            .chain(action)
            .map(|s| s.to_string())
            .collect();
        args.push(format!("--project={}", cluster.project));
        args.push(format!("--zone={}", cluster.zone));
        args
    }

    async fn run(&self, cluster: &ClusterRef, args: Vec<String>) -> Result<String> {
        self.executor
            .run_captured(&self.binary, &args)
            .await
            .map_err(|source| DeployError::Cluster {
                cluster: cluster.to_string(),
                source,
            })
    }
}

#[async_trait]
impl ClusterProvider for GcloudClusterProvider {
    #[instrument(skip(self), fields(cluster = %cluster))]
    async fn exists(&self, cluster: &ClusterRef) -> Result<bool> {
        let mut args = Self::args(cluster, &["list"]);
        args.push("--format=json".into());
        let output = self.run(cluster, args).await?;

        let listing: Vec<ClusterListing> =
            serde_json::from_str(&output).map_err(|source| DeployError::Parse {
                resource: "clusters".into(),
                source,
            })?;
        Ok(listing.iter().any(|c| c.name == cluster.name))
    }

    #[instrument(skip(self), fields(cluster = %cluster))]
    async fn create_minimal(&self, cluster: &ClusterRef) -> Result<()> {
        info!("Creating minimal cluster");
        let mut args = Self::args(cluster, &["create", cluster.name.as_str()]);
        args.extend(["--num-nodes=1".to_string(), "--quiet".to_string()]);
        self.run(cluster, args).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(cluster = %cluster))]
    async fn load_credentials(&self, cluster: &ClusterRef) -> Result<()> {
        let args = Self::args(cluster, &["get-credentials", cluster.name.as_str()]);
        self.run(cluster, args).await?;
        Ok(())
    }
}
