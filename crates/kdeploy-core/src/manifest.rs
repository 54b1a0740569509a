//! Manifest builder
//!
//! Translates a [`WorkloadSpec`] into the Deployment document piped to the
//! control plane. Construction is pure and total: a malformed spec yields a
//! malformed manifest, and validation belongs to the caller.
//!
//! Optional fields are modelled explicitly. In particular the node selector
//! is always serialized (an empty map matches any node) while the readiness
//! probe and volume lists are omitted entirely when not declared.

use crate::error::{DeployError, Result};
use crate::workload::{ContainerPort, Protocol, WorkloadSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// API group and version of the generated document
pub const API_VERSION: &str = "apps/v1";

/// Kind of the generated document
pub const KIND: &str = "Deployment";

/// Seconds a new replica must be ready before it counts as available
pub const MIN_READY_SECONDS: u32 = 60;

/// Replicas allowed to be unavailable during a rollout
pub const MAX_UNAVAILABLE: u32 = 0;

/// Extra replicas allowed during a rollout
pub const MAX_SURGE: u32 = 1;

/// Readiness probe period
pub const PROBE_PERIOD_SECONDS: u32 = 1;

/// Readiness probe timeout
pub const PROBE_TIMEOUT_SECONDS: u32 = 1;

/// Consecutive successes before a replica is ready
pub const PROBE_SUCCESS_THRESHOLD: u32 = 1;

/// Consecutive failures before a replica is unready
pub const PROBE_FAILURE_THRESHOLD: u32 = 10;

/// Label key tying pods to their workload
const APP_LABEL: &str = "app";

/// Deployment document submitted to the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDocument {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: DeploymentSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub replicas: u32,
    pub selector: LabelSelector,
    pub strategy: RolloutStrategy,
    pub min_ready_seconds: u32,
    pub template: PodTemplate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    pub match_labels: BTreeMap<String, String>,
}

/// Rolling-update policy; never drops below the desired replica count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolloutStrategy {
    #[serde(rename = "type")]
    pub strategy_type: String,
    pub rolling_update: RollingUpdate,
}

impl Default for RolloutStrategy {
    fn default() -> Self {
        Self {
            strategy_type: "RollingUpdate".into(),
            rolling_update: RollingUpdate {
                max_unavailable: MAX_UNAVAILABLE,
                max_surge: MAX_SURGE,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingUpdate {
    pub max_unavailable: u32,
    pub max_surge: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodTemplate {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
    /// Always present; empty matches any node
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortEntry>,
    pub resources: Resources,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readiness_probe: Option<ReadinessProbe>,
}

/// Container port; host-bound entries carry all four fields,
/// service-bound entries only `containerPort`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortEntry {
    pub container_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub mount_path: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    pub host_path: HostPathSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPathSource {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessProbe {
    pub http_get: HttpGetAction,
    pub period_seconds: u32,
    pub timeout_seconds: u32,
    pub success_threshold: u32,
    pub failure_threshold: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpGetAction {
    pub path: String,
    pub port: u16,
}

impl ManifestDocument {
    /// Name of the workload this document describes
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// The single workload container
    pub fn container(&self) -> Option<&Container> {
        self.spec.template.spec.containers.first()
    }

    /// JSON payload for the command executor
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(DeployError::Encode)
    }

    /// YAML rendering for display
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}

/// Build the Deployment document for a workload
pub fn build_manifest(spec: &WorkloadSpec) -> ManifestDocument {
    let labels = BTreeMap::from([(APP_LABEL.to_string(), spec.name.clone())]);

    let container = Container {
        name: spec.name.clone(),
        image: spec.image_reference(),
        ports: spec.ports.iter().filter_map(port_entry).collect(),
        resources: resources(spec),
        env: env_vars(spec),
        volume_mounts: spec
            .volumes
            .iter()
            .flatten()
            .map(|v| VolumeMount {
                mount_path: v.target.clone(),
                name: v.name.clone(),
            })
            .collect(),
        readiness_probe: spec.health_check.as_ref().map(|check| ReadinessProbe {
            http_get: HttpGetAction {
                path: check.path.clone(),
                port: check.port,
            },
            period_seconds: PROBE_PERIOD_SECONDS,
            timeout_seconds: PROBE_TIMEOUT_SECONDS,
            success_threshold: PROBE_SUCCESS_THRESHOLD,
            failure_threshold: PROBE_FAILURE_THRESHOLD,
        }),
    };

    let volumes = spec
        .volumes
        .iter()
        .flatten()
        .map(|v| Volume {
            name: v.name.clone(),
            host_path: HostPathSource {
                path: v.source.clone(),
            },
        })
        .collect();

    ManifestDocument {
        api_version: API_VERSION.into(),
        kind: KIND.into(),
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            labels: BTreeMap::new(),
        },
        spec: DeploymentSpec {
            replicas: spec.desired_replicas(),
            selector: LabelSelector {
                match_labels: labels.clone(),
            },
            strategy: RolloutStrategy::default(),
            min_ready_seconds: MIN_READY_SECONDS,
            template: PodTemplate {
                metadata: ObjectMeta { name: None, labels },
                spec: PodSpec {
                    containers: vec![container],
                    volumes,
                    node_selector: spec.node_selector.clone().unwrap_or_default(),
                },
            },
        },
    }
}

fn port_entry(port: &ContainerPort) -> Option<PortEntry> {
    match port {
        ContainerPort::HostBound {
            container_port: Some(container_port),
            host_port: Some(host_port),
            name: Some(name),
            protocol,
        } => Some(PortEntry {
            container_port: *container_port,
            host_port: Some(*host_port),
            protocol: Some(*protocol),
            name: Some(name.clone()),
        }),
        ContainerPort::HostBound { .. } => None,
        ContainerPort::ServiceBound { container_port } => Some(PortEntry {
            container_port: *container_port,
            host_port: None,
            protocol: None,
            name: None,
        }),
    }
}

fn env_vars(spec: &WorkloadSpec) -> Vec<EnvVar> {
    spec.env
        .iter()
        .flatten()
        .map(|(name, value)| EnvVar {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

fn resources(spec: &WorkloadSpec) -> Resources {
    match &spec.resources {
        Some(req) => Resources {
            requests: req.requests.clone(),
            limits: req.limits.clone(),
        },
        None => Resources {
            requests: BTreeMap::from([("cpu".to_string(), "0".to_string())]),
            limits: BTreeMap::new(),
        },
    }
}
