//! Deployment orchestrator
//!
//! Runs one deployment as a strictly sequential pipeline:
//!
//! 1. ensure the cluster exists (creating a minimal one if not)
//! 2. load cluster credentials
//! 3. reconcile the workload (create or replace)
//! 4. provision exposure objects, when the environment declares any
//! 5. wait for the rollout to stabilize
//!
//! The first failing stage ends the run and its error is returned as-is.
//! Earlier stages are not compensated; re-running is safe because every
//! create is gated on an existence probe. Concurrent runs against the same
//! workload are not synchronized.

use crate::cluster::{ClusterProvider, ClusterRef};
use crate::error::{DeployError, Result};
use crate::events::{DeployEvent, DeployEventEnvelope};
use crate::exposure::{ExposureAction, ExposureProvisioner, ProvisionReport};
use crate::kubectl::Kubectl;
use crate::monitor::{Clock, MonitorConfig, RolloutMonitor, RolloutStatus};
use crate::reconciler::{ReconcileAction, WorkloadReconciler};
use crate::workload::{ExposureObject, WorkloadSpec};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Everything one deployment run needs
#[derive(Debug, Clone)]
pub struct DeploymentTarget {
    pub environment: String,
    pub cluster: ClusterRef,
    pub workload: WorkloadSpec,
    pub exposures: Vec<ExposureObject>,
}

/// Summary of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentOutcome {
    pub run_id: Uuid,
    pub cluster_created: bool,
    pub action: ReconcileAction,
    pub exposures: ProvisionReport,
    pub rollout: RolloutStatus,
}

/// Sequences cluster, workload, exposure and rollout stages
pub struct DeploymentOrchestrator {
    clusters: Arc<dyn ClusterProvider>,
    reconciler: WorkloadReconciler,
    provisioner: ExposureProvisioner,
    monitor: RolloutMonitor,
    event_tx: broadcast::Sender<DeployEventEnvelope>,
}

impl DeploymentOrchestrator {
    pub fn new(
        kubectl: Kubectl,
        clusters: Arc<dyn ClusterProvider>,
        clock: Arc<dyn Clock>,
        monitor_config: MonitorConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);

        Self {
            clusters,
            reconciler: WorkloadReconciler::new(kubectl.clone()),
            provisioner: ExposureProvisioner::new(kubectl.clone()),
            monitor: RolloutMonitor::new(kubectl, clock, monitor_config),
            event_tx,
        }
    }

    /// Subscribe to progress events
    pub fn subscribe(&self) -> broadcast::Receiver<DeployEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Run the full deployment workflow for `target`
    #[instrument(skip(self, target), fields(
        workload = %target.workload.name,
        version = %target.workload.version,
        environment = %target.environment,
    ))]
    pub async fn deploy(&self, target: &DeploymentTarget) -> Result<DeploymentOutcome> {
        let run_id = Uuid::new_v4();

        info!(
            "Deploying {} at version {} to cluster {}",
            target.workload.name, target.workload.version, target.cluster
        );
        self.emit(
            run_id,
            DeployEvent::Started {
                workload: target.workload.name.clone(),
                version: target.workload.version.clone(),
                environment: target.environment.clone(),
            },
        );

        match self.run_stages(run_id, target).await {
            Ok(outcome) => {
                self.emit(run_id, DeployEvent::Completed);
                Ok(outcome)
            }
            Err(e) => {
                error!(error = %e, "Deployment failed");
                self.emit(
                    run_id,
                    DeployEvent::Failed {
                        reason: e.to_string(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn run_stages(&self, run_id: Uuid, target: &DeploymentTarget) -> Result<DeploymentOutcome> {
        let workload = &target.workload;
        workload.validate().map_err(DeployError::Configuration)?;

        let cluster_created = self.ensure_cluster(run_id, &target.cluster).await?;
        self.clusters.load_credentials(&target.cluster).await?;

        let action = self.reconciler.reconcile(workload, &target.environment).await?;
        self.emit(
            run_id,
            DeployEvent::WorkloadApplied {
                workload: workload.name.clone(),
                action,
            },
        );

        let exposures = if target.exposures.is_empty() {
            ProvisionReport::default()
        } else {
            self.provisioner
                .provision_with(&workload.name, &target.exposures, |outcome| {
                    let name = outcome.name.clone();
                    self.emit(
                        run_id,
                        match outcome.action {
                            ExposureAction::Created => DeployEvent::ExposureCreated { name },
                            ExposureAction::AlreadyPresent => DeployEvent::ExposureSkipped { name },
                        },
                    );
                })
                .await?
        };

        let rollout = self
            .monitor
            .wait_for_rollout_with(&workload.name, |status| {
                self.emit(
                    run_id,
                    DeployEvent::RolloutProgress {
                        poll: status.poll_count,
                        unavailable_replicas: status.unavailable_replicas,
                    },
                );
            })
            .await?;
        self.emit(
            run_id,
            DeployEvent::RolloutStable {
                polls: rollout.poll_count,
            },
        );

        Ok(DeploymentOutcome {
            run_id,
            cluster_created,
            action,
            exposures,
            rollout,
        })
    }

    async fn ensure_cluster(&self, run_id: Uuid, cluster: &ClusterRef) -> Result<bool> {
        if self.clusters.exists(cluster).await? {
            return Ok(false);
        }

        info!(cluster = %cluster, "Cluster is missing, creating it");
        self.clusters.create_minimal(cluster).await?;
        self.emit(
            run_id,
            DeployEvent::ClusterCreated {
                cluster: cluster.clone(),
            },
        );
        Ok(true)
    }

    fn emit(&self, run_id: Uuid, event: DeployEvent) {
        let _ = self.event_tx.send(DeployEventEnvelope::new(run_id, event));
    }
}
