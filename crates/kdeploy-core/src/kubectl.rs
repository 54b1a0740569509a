//! Control-plane CLI invocations
//!
//! [`Kubectl`] shapes the six operations the workflow issues: list
//! workloads, list exposures, create, replace, workload status and expose.
//! Every invocation is scoped to the kubeconfig supplied at construction.

use crate::executor::{CommandError, CommandExecutor};
use std::fmt;
use std::sync::Arc;

/// Default control-plane binary
pub const DEFAULT_BINARY: &str = "kubectl";

/// Default kubeconfig reference, relative to the working directory
pub const DEFAULT_KUBECONFIG: &str = ".kube/config";

/// Resource collections the workflow probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Workload,
    Exposure,
}

impl ResourceKind {
    /// Collection name on the control plane
    pub fn collection(&self) -> &'static str {
        match self {
            ResourceKind::Workload => "deployments",
            ResourceKind::Exposure => "services",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Workload => write!(f, "workload"),
            ResourceKind::Exposure => write!(f, "exposure"),
        }
    }
}

/// kubectl front-end over a [`CommandExecutor`]
#[derive(Clone)]
pub struct Kubectl {
    executor: Arc<dyn CommandExecutor>,
    binary: String,
    kubeconfig: String,
}

impl fmt::Debug for Kubectl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kubectl")
            .field("binary", &self.binary)
            .field("kubeconfig", &self.kubeconfig)
            .finish()
    }
}

impl Kubectl {
    pub fn new(executor: Arc<dyn CommandExecutor>, kubeconfig: impl Into<String>) -> Self {
        Self {
            executor,
            binary: DEFAULT_BINARY.into(),
            kubeconfig: kubeconfig.into(),
        }
    }

    /// Use a different binary name or path
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn args<I, S>(&self, rest: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut args = vec![format!("--kubeconfig={}", self.kubeconfig)];
        args.extend(rest.into_iter().map(Into::into));
        args
    }

    /// Full listing of a collection as JSON
    pub async fn list(&self, kind: ResourceKind) -> Result<String, CommandError> {
        let args = self.args(["get", kind.collection(), "--output", "json"]);
        self.executor.run_captured(&self.binary, &args).await
    }

    /// Single workload, including its status, as JSON
    pub async fn get_workload(&self, name: &str) -> Result<String, CommandError> {
        let args = self.args(["get", "deployment", name, "--output", "json"]);
        self.executor.run_captured(&self.binary, &args).await
    }

    /// Create an object from a JSON payload
    pub async fn create(&self, payload: &str) -> Result<String, CommandError> {
        let args = self.args(["create", "-f", "-", "--record"]);
        self.executor
            .run_with_input(&self.binary, &args, payload)
            .await
    }

    /// Replace a workload wholesale with a JSON payload
    pub async fn replace(&self, name: &str, payload: &str) -> Result<String, CommandError> {
        let args = self.args(["replace", "deployment", name, "-f", "-", "--record"]);
        self.executor
            .run_with_input(&self.binary, &args, payload)
            .await
    }

    /// Expose a workload with the given flags
    pub async fn expose(&self, workload: &str, flags: &[String]) -> Result<String, CommandError> {
        let mut args = self.args(["expose", "deployment", workload]);
        args.extend(flags.iter().cloned());
        self.executor.run_captured(&self.binary, &args).await
    }
}
