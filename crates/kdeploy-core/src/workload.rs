//! Workload and exposure descriptions
//!
//! These are the abstract inputs to a deployment run. The manifest builder
//! turns a [`WorkloadSpec`] into a concrete orchestration document and the
//! exposure provisioner turns each [`ExposureObject`] into an `expose` call.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Replica count used when a workload does not declare one
pub const DEFAULT_REPLICAS: u32 = 2;

/// Maximum length of a resource identifier
const MAX_NAME_LEN: usize = 63;

/// Transport protocol for a port
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
            Protocol::Sctp => write!(f, "SCTP"),
        }
    }
}

/// A port declared on the workload's container
///
/// Host-bound ports are kept exactly as declared; an entry lacking any of
/// `container_port`, `host_port` or `name` is dropped when the manifest is
/// built rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContainerPort {
    /// Port bound directly on the node
    HostBound {
        container_port: Option<u16>,
        host_port: Option<u16>,
        name: Option<String>,
        #[serde(default)]
        protocol: Protocol,
    },

    /// Port reached through an exposure object
    ServiceBound { container_port: u16 },
}

impl ContainerPort {
    /// Fully specified host-bound port
    pub fn host_bound(
        container_port: u16,
        host_port: u16,
        name: impl Into<String>,
        protocol: Protocol,
    ) -> Self {
        ContainerPort::HostBound {
            container_port: Some(container_port),
            host_port: Some(host_port),
            name: Some(name.into()),
            protocol,
        }
    }

    /// Port reached only through an exposure object
    pub fn service_bound(container_port: u16) -> Self {
        ContainerPort::ServiceBound { container_port }
    }

    /// Whether the entry survives manifest construction
    pub fn is_complete(&self) -> bool {
        match self {
            ContainerPort::HostBound {
                container_port,
                host_port,
                name,
                ..
            } => container_port.is_some() && host_port.is_some() && name.is_some(),
            ContainerPort::ServiceBound { .. } => true,
        }
    }
}

/// Host directory mounted into the container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostVolumeMount {
    /// Path on the node
    pub source: String,
    /// Mount path inside the container
    pub target: String,
    /// Volume name
    pub name: String,
}

/// HTTP readiness check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub path: String,
    pub port: u16,
}

/// Compute resource requests and limits, as quantity strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

/// Desired state of a containerized workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Workload name, also used for the container and its pod label
    pub name: String,

    /// Image reference without tag (registry prefix + image name)
    pub image: String,

    /// Image tag
    pub version: String,

    /// Declared container ports, in order
    #[serde(default)]
    pub ports: Vec<ContainerPort>,

    /// Environment variables
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,

    /// Replica count, [`DEFAULT_REPLICAS`] when unset
    #[serde(default)]
    pub replicas: Option<u32>,

    /// Host volume mounts
    #[serde(default)]
    pub volumes: Option<Vec<HostVolumeMount>>,

    /// Readiness check
    #[serde(default)]
    pub health_check: Option<HealthCheck>,

    /// Node label selector; absent means any node
    #[serde(default)]
    pub node_selector: Option<BTreeMap<String, String>>,

    /// Resource requirements
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
}

impl WorkloadSpec {
    /// Create a workload spec with no ports and every optional field unset
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            version: version.into(),
            ports: Vec::new(),
            env: None,
            replicas: None,
            volumes: None,
            health_check: None,
            node_selector: None,
            resources: None,
        }
    }

    pub fn with_port(mut self, port: ContainerPort) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replicas = Some(replicas);
        self
    }

    pub fn with_volume(mut self, volume: HostVolumeMount) -> Self {
        self.volumes.get_or_insert_with(Vec::new).push(volume);
        self
    }

    pub fn with_health_check(mut self, path: impl Into<String>, port: u16) -> Self {
        self.health_check = Some(HealthCheck {
            path: path.into(),
            port,
        });
        self
    }

    pub fn with_node_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.node_selector
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_resources(mut self, resources: ResourceRequirements) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Full image reference, `image:version`
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.image, self.version)
    }

    /// Effective replica count
    pub fn desired_replicas(&self) -> u32 {
        self.replicas.unwrap_or(DEFAULT_REPLICAS)
    }

    /// Check that the name is usable as a resource identifier
    pub fn validate(&self) -> Result<(), String> {
        validate_resource_name(&self.name)?;
        if self.image.is_empty() {
            return Err(format!("workload {} has no image", self.name));
        }
        if self.version.is_empty() {
            return Err(format!("workload {} has no version", self.name));
        }
        Ok(())
    }
}

/// Validate a DNS-1123 label: lowercase alphanumerics and '-', starting
/// and ending with an alphanumeric, at most 63 characters.
pub fn validate_resource_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("resource name is empty".into());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!(
            "resource name {} exceeds {} characters",
            name, MAX_NAME_LEN
        ));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_edges = !name.starts_with('-') && !name.ends_with('-');
    if !valid_chars || !valid_edges {
        return Err(format!("resource name {} is not a valid identifier", name));
    }
    Ok(())
}

/// Kind of network exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExposureType {
    LoadBalancer,
    NodePort,
    #[serde(rename = "ClusterIP")]
    ClusterIp,
}

impl fmt::Display for ExposureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExposureType::LoadBalancer => write!(f, "LoadBalancer"),
            ExposureType::NodePort => write!(f, "NodePort"),
            ExposureType::ClusterIp => write!(f, "ClusterIP"),
        }
    }
}

/// Network exposure object bound to a workload
///
/// Created at most once; an existing object with the same name is never
/// updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureObject {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ExposureType,
    /// Port exposed by the object; optional for NodePort only
    #[serde(default)]
    pub public_port: Option<u16>,
    pub container_port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    /// Static address, LoadBalancer only
    #[serde(default)]
    pub static_ip: Option<String>,
}

impl ExposureObject {
    pub fn new(name: impl Into<String>, kind: ExposureType, container_port: u16) -> Self {
        Self {
            name: name.into(),
            kind,
            public_port: None,
            container_port,
            protocol: Protocol::default(),
            static_ip: None,
        }
    }

    pub fn with_public_port(mut self, port: u16) -> Self {
        self.public_port = Some(port);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_static_ip(mut self, ip: impl Into<String>) -> Self {
        self.static_ip = Some(ip.into());
        self
    }
}
