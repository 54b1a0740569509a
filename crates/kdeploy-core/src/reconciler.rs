//! Workload reconciler
//!
//! Builds the manifest, probes for the workload, then creates it when absent
//! or replaces it when present. Replacement submits the full document: any
//! field missing from the new manifest is removed from the live object. No
//! diff is computed and nothing is rolled back on failure.

use crate::error::{DeployError, Result};
use crate::kubectl::{Kubectl, ResourceKind};
use crate::manifest::build_manifest;
use crate::probe::{ExistenceProber, Presence};
use crate::workload::WorkloadSpec;
use serde::Serialize;
use tracing::{info, instrument};

/// Action taken to align the workload with its spec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReconcileAction {
    Created,
    Replaced,
}

/// Create-or-replace for a single workload
#[derive(Debug, Clone)]
pub struct WorkloadReconciler {
    kubectl: Kubectl,
    prober: ExistenceProber,
}

impl WorkloadReconciler {
    pub fn new(kubectl: Kubectl) -> Self {
        let prober = ExistenceProber::new(kubectl.clone());
        Self { kubectl, prober }
    }

    /// Synchronize the control plane with `spec`
    #[instrument(skip(self, spec), fields(workload = %spec.name, version = %spec.version))]
    pub async fn reconcile(&self, spec: &WorkloadSpec, environment: &str) -> Result<ReconcileAction> {
        let manifest = build_manifest(spec);
        let payload = manifest.to_json()?;

        match self.prober.probe(ResourceKind::Workload, &spec.name).await? {
            Presence::Absent => {
                info!(environment, "Creating workload");
                self.kubectl
                    .create(&payload)
                    .await
                    .map_err(|source| DeployError::Apply {
                        action: "create",
                        resource: spec.name.clone(),
                        source,
                    })?;
                Ok(ReconcileAction::Created)
            }
            Presence::Exists => {
                info!(environment, "Replacing workload with new version");
                self.kubectl
                    .replace(&spec.name, &payload)
                    .await
                    .map_err(|source| DeployError::Apply {
                        action: "replace",
                        resource: spec.name.clone(),
                        source,
                    })?;
                Ok(ReconcileAction::Replaced)
            }
        }
    }
}
