//! kdeploy core
//!
//! Idempotent create-or-replace rollout of a containerized workload through
//! the `kubectl` CLI.
//!
//! ## Pipeline
//!
//! - `cluster` ensures the target cluster exists and loads its credentials
//! - `reconciler` builds the manifest and creates or replaces the workload
//! - `exposure` creates the workload's missing exposure objects, in order
//! - `monitor` polls the rollout until no replica is unavailable
//!
//! [`DeploymentOrchestrator`] sequences the stages and stops at the first
//! failure. Every control-plane call goes through a [`CommandExecutor`], so
//! the whole pipeline runs against a fake in tests.
//!
//! ## Usage
//!
//! ```no_run
//! use kdeploy_core::{
//!     DeployConfig, DeploymentOrchestrator, GcloudClusterProvider, Kubectl, ProcessExecutor,
//!     TokioClock,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeployConfig::load("kdeploy.yaml")?;
//! let executor = Arc::new(ProcessExecutor::new());
//!
//! let orchestrator = DeploymentOrchestrator::new(
//!     Kubectl::new(executor.clone(), &config.kubectl.kubeconfig),
//!     Arc::new(GcloudClusterProvider::new(executor)),
//!     Arc::new(TokioClock),
//!     config.monitor,
//! );
//!
//! let outcome = orchestrator.deploy(&config.target("production")?).await?;
//! println!("{:?} after {} polls", outcome.action, outcome.rollout.poll_count);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cluster;
pub mod config;
pub mod error;
pub mod events;
pub mod executor;
pub mod exposure;
pub mod kubectl;
pub mod manifest;
pub mod monitor;
pub mod orchestrator;
pub mod probe;
pub mod reconciler;
pub mod workload;

#[cfg(test)]
mod testing;

// Re-exports
pub use cluster::{ClusterProvider, ClusterRef, GcloudClusterProvider};
pub use config::{DeployConfig, DocumentFormat, ServiceEntry, ServiceType};
pub use error::{DeployError, Result};
pub use events::{DeployEvent, DeployEventEnvelope};
pub use executor::{CommandError, CommandExecutor, ProcessExecutor};
pub use exposure::{ExposureAction, ExposureOutcome, ExposureProvisioner, ProvisionReport};
pub use kubectl::{Kubectl, ResourceKind};
pub use manifest::{build_manifest, ManifestDocument};
pub use monitor::{Clock, MonitorConfig, RolloutMonitor, RolloutState, RolloutStatus, TokioClock};
pub use orchestrator::{DeploymentOrchestrator, DeploymentOutcome, DeploymentTarget};
pub use probe::{ExistenceProber, Presence};
pub use reconciler::{ReconcileAction, WorkloadReconciler};
pub use workload::{
    ContainerPort, ExposureObject, ExposureType, HealthCheck, HostVolumeMount, Protocol,
    ResourceRequirements, WorkloadSpec,
};
