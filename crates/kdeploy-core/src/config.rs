//! Project configuration
//!
//! One document describes the package, the target clusters per environment
//! and the orchestration settings. [`DeployConfig::workload_spec`] and
//! [`DeployConfig::exposures`] translate it into the inputs of a deployment
//! run.
//!
//! Loading layers `KDEPLOY_`-prefixed environment variables over the file,
//! with `__` separating nested keys (`KDEPLOY_MONITOR__MAX_POLLS=30`).
//! The file itself is read with serde so environment and variable names
//! keep the case they were declared with.

use crate::cluster::{ClusterRef, DEFAULT_GCLOUD_BINARY};
use crate::error::{DeployError, Result};
use crate::kubectl::{DEFAULT_BINARY, DEFAULT_KUBECONFIG};
use crate::monitor::MonitorConfig;
use crate::orchestrator::DeploymentTarget;
use crate::workload::{
    ContainerPort, ExposureObject, ExposureType, HostVolumeMount, Protocol, ResourceRequirements,
    WorkloadSpec,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "KDEPLOY";

/// Root configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Package identity
    pub package: PackageConfig,

    /// Image tag override; the package version is used when unset
    #[serde(default, deserialize_with = "optional_scalar_text")]
    pub image_version: Option<String>,

    /// Control-plane CLI settings
    #[serde(default)]
    pub kubectl: KubectlConfig,

    /// Cloud CLI settings
    #[serde(default)]
    pub gcloud: GcloudConfig,

    /// Rollout polling
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Target clusters
    pub cluster: ClusterConfig,

    /// Workload settings per environment
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub name: String,
    #[serde(deserialize_with = "scalar_text")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubectlConfig {
    #[serde(default = "default_kubectl_binary")]
    pub binary: String,

    /// Credential reference passed to every invocation
    #[serde(default = "default_kubeconfig")]
    pub kubeconfig: String,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: default_kubectl_binary(),
            kubeconfig: default_kubeconfig(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcloudConfig {
    #[serde(default = "default_gcloud_binary")]
    pub binary: String,
}

impl Default for GcloudConfig {
    fn default() -> Self {
        Self {
            binary: default_gcloud_binary(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentConfig>,
}

/// Cluster placement of one environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub project: String,
    pub cluster_name: String,
    pub cluster_zone: String,

    /// Registry prefix, prepended to the package name
    #[serde(default)]
    pub image_prefix: String,

    /// Workload name override
    #[serde(default)]
    pub deployment_name: Option<String>,

    /// Node selector labels
    #[serde(default)]
    pub placement: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Readiness probe port; the probe is enabled only with a path too
    #[serde(default)]
    pub health_check_port: Option<u16>,

    #[serde(default)]
    pub health_check_path: Option<String>,

    #[serde(default)]
    pub services: BTreeMap<String, Vec<ServiceEntry>>,

    /// Container environment per environment; names keep their case
    #[serde(default, deserialize_with = "scalar_variables")]
    pub variables: BTreeMap<String, BTreeMap<String, String>>,

    #[serde(default)]
    pub replicas: BTreeMap<String, u32>,

    #[serde(default)]
    pub host_volumes: BTreeMap<String, Vec<HostVolumeMount>>,

    #[serde(default)]
    pub resources: BTreeMap<String, ResourceRequirements>,
}

/// Kind of a port/service declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    HostPort,
    LoadBalancer,
    NodePort,
    #[serde(rename = "ClusterIP")]
    ClusterIp,
}

impl ServiceType {
    fn exposure_type(self) -> Option<ExposureType> {
        match self {
            ServiceType::HostPort => None,
            ServiceType::LoadBalancer => Some(ExposureType::LoadBalancer),
            ServiceType::NodePort => Some(ExposureType::NodePort),
            ServiceType::ClusterIp => Some(ExposureType::ClusterIp),
        }
    }
}

/// One port/service declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(rename = "type")]
    pub kind: ServiceType,

    #[serde(default)]
    pub container_port: Option<u16>,

    /// Node port, HostPort only
    #[serde(default)]
    pub host_port: Option<u16>,

    #[serde(default)]
    pub public_port: Option<u16>,

    #[serde(default)]
    pub protocol: Protocol,

    /// Static address, LoadBalancer only
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl ServiceEntry {
    /// Container port contributed to the workload, if any
    pub fn container_port_entry(&self) -> Option<ContainerPort> {
        match self.kind {
            ServiceType::HostPort => Some(ContainerPort::HostBound {
                container_port: self.container_port,
                host_port: self.host_port,
                name: self.name.clone(),
                protocol: self.protocol,
            }),
            _ => self.container_port.map(ContainerPort::service_bound),
        }
    }

    /// Exposure object for the three exposure kinds
    pub fn exposure_object(&self) -> Result<Option<ExposureObject>> {
        let Some(kind) = self.kind.exposure_type() else {
            return Ok(None);
        };

        let name = self.name.clone().ok_or_else(|| {
            DeployError::Configuration(format!("{} service entry has no name", kind))
        })?;
        let container_port = self.container_port.ok_or_else(|| {
            DeployError::Configuration(format!("service {} has no container port", name))
        })?;

        Ok(Some(ExposureObject {
            name,
            kind,
            public_port: self.public_port,
            container_port,
            protocol: self.protocol,
            static_ip: self.ip_address.clone(),
        }))
    }
}

fn default_kubectl_binary() -> String {
    DEFAULT_BINARY.to_string()
}

fn default_kubeconfig() -> String {
    DEFAULT_KUBECONFIG.to_string()
}

fn default_gcloud_binary() -> String {
    DEFAULT_GCLOUD_BINARY.to_string()
}

/// Document formats understood by [`DeployConfig::load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    /// Format named by the file extension; anything but `.json` reads as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }

    fn read(self, contents: &str) -> Result<Value> {
        match self {
            DocumentFormat::Yaml => serde_yaml::from_str(contents)
                .map_err(|e| DeployError::Configuration(e.to_string())),
            DocumentFormat::Json => serde_json::from_str(contents)
                .map_err(|e| DeployError::Configuration(e.to_string())),
        }
    }
}

/// `KDEPLOY_`-prefixed variables as a nested document.
///
/// The environment source lowercases its keys, so it can only address
/// fields and lowercase map keys; document keys keep their case.
fn environment_overrides() -> Result<Value> {
    let overrides = config::Config::builder()
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    Ok(overrides)
}

/// Layer `overrides` onto `document`, merging tables key by key
fn merge_overrides(document: &mut Value, overrides: Value) {
    match (document, overrides) {
        (Value::Object(document), Value::Object(overrides)) => {
            for (key, value) in overrides {
                merge_overrides(document.entry(key).or_insert(Value::Null), value);
            }
        }
        (document, overrides) => *document = overrides,
    }
}

/// Scalar written where text is expected (`WORKERS: 4`)
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl From<Scalar> for String {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Text(text) => text,
            Scalar::Integer(n) => n.to_string(),
            Scalar::Float(n) => n.to_string(),
            Scalar::Flag(b) => b.to_string(),
        }
    }
}

fn scalar_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Scalar::deserialize(deserializer).map(String::from)
}

fn optional_scalar_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.map(String::from))
}

fn scalar_variables<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, BTreeMap<String, String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, BTreeMap<String, Scalar>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(environment, vars)| {
            let vars = vars
                .into_iter()
                .map(|(name, value)| (name, String::from(value)))
                .collect();
            (environment, vars)
        })
        .collect())
}

impl DeployConfig {
    /// Load from a file, with environment overrides on top
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;

        let mut document = DocumentFormat::from_path(path).read(&contents)?;
        merge_overrides(&mut document, environment_overrides()?);
        Self::from_document(document)
    }

    /// Parse a document held in memory
    pub fn parse(contents: &str, format: DocumentFormat) -> Result<Self> {
        Self::from_document(format.read(contents)?)
    }

    fn from_document(document: Value) -> Result<Self> {
        serde_json::from_value(document).map_err(|e| DeployError::Configuration(e.to_string()))
    }

    /// Cluster section of `environment`
    pub fn environment(&self, environment: &str) -> Result<&EnvironmentConfig> {
        self.cluster.environments.get(environment).ok_or_else(|| {
            DeployError::Configuration(format!(
                "no cluster environment named {}",
                environment
            ))
        })
    }

    /// Workload name in `environment`
    pub fn workload_name(&self, environment: &str) -> Result<String> {
        let env = self.environment(environment)?;
        Ok(env
            .deployment_name
            .clone()
            .unwrap_or_else(|| self.package.name.clone()))
    }

    /// Image tag to deploy
    pub fn image_version(&self) -> &str {
        self.image_version
            .as_deref()
            .unwrap_or(&self.package.version)
    }

    pub fn cluster(&self, environment: &str) -> Result<ClusterRef> {
        let env = self.environment(environment)?;
        Ok(ClusterRef::new(
            &env.project,
            &env.cluster_zone,
            &env.cluster_name,
        ))
    }

    fn services(&self, environment: &str) -> &[ServiceEntry] {
        self.orchestration
            .services
            .get(environment)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Workload description for `environment`
    pub fn workload_spec(&self, environment: &str) -> Result<WorkloadSpec> {
        let env = self.environment(environment)?;
        let orchestration = &self.orchestration;

        let mut spec = WorkloadSpec::new(
            self.workload_name(environment)?,
            format!("{}{}", env.image_prefix, self.package.name),
            self.image_version(),
        );

        spec.ports = self
            .services(environment)
            .iter()
            .filter_map(ServiceEntry::container_port_entry)
            .collect();
        spec.env = orchestration.variables.get(environment).cloned();
        spec.replicas = orchestration.replicas.get(environment).copied();
        spec.volumes = orchestration.host_volumes.get(environment).cloned();
        spec.node_selector = env.placement.clone();
        spec.resources = orchestration.resources.get(environment).cloned();

        if let (Some(port), Some(path)) = (
            orchestration.health_check_port,
            orchestration.health_check_path.as_deref(),
        ) {
            spec = spec.with_health_check(path, port);
        }

        Ok(spec)
    }

    /// Exposure objects for `environment`, in declared order
    pub fn exposures(&self, environment: &str) -> Result<Vec<ExposureObject>> {
        self.environment(environment)?;
        let mut objects = Vec::new();
        for entry in self.services(environment) {
            if let Some(object) = entry.exposure_object()? {
                objects.push(object);
            }
        }
        Ok(objects)
    }

    /// Everything a deployment run needs for `environment`
    pub fn target(&self, environment: &str) -> Result<DeploymentTarget> {
        Ok(DeploymentTarget {
            environment: environment.to_string(),
            cluster: self.cluster(environment)?,
            workload: self.workload_spec(environment)?,
            exposures: self.exposures(environment)?,
        })
    }
}
