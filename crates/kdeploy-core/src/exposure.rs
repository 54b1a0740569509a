//! Exposure provisioner
//!
//! Ensures each declared exposure object exists, strictly in declared order.
//! Existing objects are skipped, never updated; the first failure stops the
//! pass. Re-running after a partial failure only creates what is still
//! missing.

use crate::error::{DeployError, Result};
use crate::kubectl::{Kubectl, ResourceKind};
use crate::probe::{ExistenceProber, Presence};
use crate::workload::{ExposureObject, ExposureType};
use serde::Serialize;
use tracing::{info, instrument};

/// What happened to one exposure object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExposureAction {
    Created,
    AlreadyPresent,
}

/// Per-object outcome, in processing order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExposureOutcome {
    pub name: String,
    pub action: ExposureAction,
}

/// Result of a provisioning pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub outcomes: Vec<ExposureOutcome>,
}

impl ProvisionReport {
    /// Names of objects created in this pass
    pub fn created(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.action == ExposureAction::Created)
            .map(|o| o.name.as_str())
    }

    /// Names of objects that already existed
    pub fn existing(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.action == ExposureAction::AlreadyPresent)
            .map(|o| o.name.as_str())
    }
}

/// `expose` flags for an exposure object
///
/// LoadBalancer needs a public port and a static IP, ClusterIP needs a
/// public port, NodePort leaves the public port to the control plane when
/// unset.
pub fn expose_flags(object: &ExposureObject) -> Result<Vec<String>> {
    let require_public_port = || {
        object.public_port.ok_or_else(|| {
            DeployError::Configuration(format!(
                "{} exposure {} requires a public port",
                object.kind, object.name
            ))
        })
    };

    let public_port = match object.kind {
        ExposureType::LoadBalancer | ExposureType::ClusterIp => Some(require_public_port()?),
        ExposureType::NodePort => object.public_port,
    };

    let mut flags = Vec::new();
    if let Some(port) = public_port {
        flags.push(format!("--port={}", port));
    }
    flags.push(format!("--target-port={}", object.container_port));
    flags.push(format!("--type={}", object.kind));
    flags.push(format!("--protocol={}", object.protocol));

    if object.kind == ExposureType::LoadBalancer {
        let ip = object.static_ip.as_deref().ok_or_else(|| {
            DeployError::Configuration(format!(
                "LoadBalancer exposure {} requires a static IP",
                object.name
            ))
        })?;
        flags.push(format!("--load-balancer-ip={}", ip));
    }

    flags.push(format!("--name={}", object.name));
    Ok(flags)
}

/// Creates missing exposure objects for a workload
#[derive(Debug, Clone)]
pub struct ExposureProvisioner {
    kubectl: Kubectl,
    prober: ExistenceProber,
}

impl ExposureProvisioner {
    pub fn new(kubectl: Kubectl) -> Self {
        let prober = ExistenceProber::new(kubectl.clone());
        Self { kubectl, prober }
    }

    /// Ensure every object in `objects` exists, bound to `workload`
    pub async fn provision(
        &self,
        workload: &str,
        objects: &[ExposureObject],
    ) -> Result<ProvisionReport> {
        self.provision_with(workload, objects, |_| {}).await
    }

    /// Like [`provision`](Self::provision), reporting each object to
    /// `on_outcome` as soon as it is settled. Objects settled before a
    /// failure are reported even though the report itself is lost.
    #[instrument(skip(self, objects, on_outcome), fields(count = objects.len()))]
    pub async fn provision_with<F>(
        &self,
        workload: &str,
        objects: &[ExposureObject],
        mut on_outcome: F,
    ) -> Result<ProvisionReport>
    where
        F: FnMut(&ExposureOutcome) + Send,
    {
        let mut report = ProvisionReport::default();

        for object in objects {
            let action = match self
                .prober
                .probe(ResourceKind::Exposure, &object.name)
                .await?
            {
                Presence::Exists => ExposureAction::AlreadyPresent,
                Presence::Absent => {
                    self.create(workload, object).await?;
                    ExposureAction::Created
                }
            };

            let outcome = ExposureOutcome {
                name: object.name.clone(),
                action,
            };
            on_outcome(&outcome);
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    async fn create(&self, workload: &str, object: &ExposureObject) -> Result<()> {
        let flags = expose_flags(object)?;

        info!(
            exposure = %object.name,
            kind = %object.kind,
            "Creating exposure object for workload {}",
            workload
        );

        self.kubectl
            .expose(workload, &flags)
            .await
            .map_err(|source| DeployError::Apply {
                action: "expose",
                resource: object.name.clone(),
                source,
            })?;
        Ok(())
    }
}
