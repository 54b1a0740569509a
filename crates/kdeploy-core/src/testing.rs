//! In-memory control plane and clock for unit tests

use crate::cluster::{ClusterProvider, ClusterRef};
use crate::error::{DeployError, Result};
use crate::executor::{CommandError, CommandExecutor};
use crate::monitor::Clock;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// One recorded tool invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub tool: String,
    pub args: Vec<String>,
    pub input: Option<String>,
}

impl Call {
    /// kubectl verb, the argument after `--kubeconfig=`
    pub fn verb(&self) -> Option<&str> {
        match self.args.first() {
            Some(first) if first.starts_with("--kubeconfig=") => {
                self.args.get(1).map(String::as_str)
            }
            _ => None,
        }
    }
}

/// Scripted reply to a workload status query
#[derive(Debug, Clone)]
pub enum StatusReply {
    Unavailable(Option<u32>),
    Error,
}

/// Cluster provider operation that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterStage {
    Exists,
    Create,
    Credentials,
}

#[derive(Default)]
struct PlaneState {
    workloads: BTreeSet<String>,
    exposures: BTreeSet<String>,
    gcloud_clusters: Vec<String>,
    cluster_ready: bool,
    status_sequence: VecDeque<StatusReply>,
    status_polls: usize,
    failing_listings: bool,
    failing_apply: bool,
    failing_expose: HashSet<String>,
    failing_cluster: Option<ClusterStage>,
    exposed: Vec<String>,
    calls: Vec<Call>,
    journal: Vec<String>,
}

/// Fake kubectl, gcloud and cluster provider sharing one state
#[derive(Default)]
pub struct FakeControlPlane {
    state: Mutex<PlaneState>,
}

fn failed(tool: &str, stderr: impl Into<String>) -> CommandError {
    CommandError::Failed {
        tool: tool.to_string(),
        code: Some(1),
        stderr: stderr.into(),
    }
}

fn listing<'a>(names: impl Iterator<Item = &'a String>) -> String {
    let items: Vec<_> = names
        .map(|name| serde_json::json!({ "metadata": { "name": name } }))
        .collect();
    serde_json::json!({ "kind": "List", "items": items }).to_string()
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self) -> &mut PlaneState {
        self.state.get_mut().unwrap()
    }

    pub fn with_workload(mut self, name: &str) -> Self {
        self.state_mut().workloads.insert(name.to_string());
        self
    }

    pub fn with_exposure(mut self, name: &str) -> Self {
        self.state_mut().exposures.insert(name.to_string());
        self
    }

    /// Clusters reported by `gcloud container clusters list`
    pub fn with_gcloud_clusters(mut self, names: &[&str]) -> Self {
        self.state_mut().gcloud_clusters = names.iter().map(|n| n.to_string()).collect();
        self
    }

    /// Target cluster already exists for the provider interface
    pub fn with_cluster(mut self) -> Self {
        self.state_mut().cluster_ready = true;
        self
    }

    pub fn with_status_sequence(mut self, replies: Vec<StatusReply>) -> Self {
        self.state_mut().status_sequence = replies.into();
        self
    }

    pub fn failing_listings(mut self) -> Self {
        self.state_mut().failing_listings = true;
        self
    }

    pub fn failing_apply(mut self) -> Self {
        self.state_mut().failing_apply = true;
        self
    }

    pub fn failing_expose(mut self, name: &str) -> Self {
        self.state_mut().failing_expose.insert(name.to_string());
        self
    }

    pub fn failing_cluster(mut self, stage: ClusterStage) -> Self {
        self.state_mut().failing_cluster = Some(stage);
        self
    }

    pub fn clear_expose_failures(&self) {
        self.state.lock().unwrap().failing_expose.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_with_verb(&self, verb: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.verb() == Some(verb))
            .collect()
    }

    /// Number of full listings of `collection`
    pub fn listing_calls(&self, collection: &str) -> usize {
        self.calls_with_verb("get")
            .iter()
            .filter(|c| c.args.get(2).map(String::as_str) == Some(collection))
            .count()
    }

    /// Exposure names created through `expose`, in order
    pub fn exposed_names(&self) -> Vec<String> {
        self.state.lock().unwrap().exposed.clone()
    }

    pub fn status_polls(&self) -> usize {
        self.state.lock().unwrap().status_polls
    }

    /// Ordered log of cluster and CLI operations
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().unwrap().journal.clone()
    }

    fn kubectl(
        state: &mut PlaneState,
        tool: &str,
        args: &[String],
        input: Option<&str>,
    ) -> std::result::Result<String, CommandError> {
        let rest: Vec<&str> = args.iter().skip(1).map(String::as_str).collect();

        match rest.as_slice() {
            ["get", "deployments", ..] | ["get", "services", ..] => {
                if state.failing_listings {
                    return Err(failed(tool, "connection refused"));
                }
                Ok(if rest[1] == "deployments" {
                    listing(state.workloads.iter())
                } else {
                    listing(state.exposures.iter())
                })
            }
            ["get", "deployment", _name, ..] => {
                state.status_polls += 1;
                match state
                    .status_sequence
                    .pop_front()
                    .unwrap_or(StatusReply::Unavailable(Some(0)))
                {
                    StatusReply::Unavailable(Some(n)) => {
                        Ok(serde_json::json!({ "status": { "unavailableReplicas": n } }).to_string())
                    }
                    StatusReply::Unavailable(None) => Ok(r#"{"status":{"replicas":2}}"#.into()),
                    StatusReply::Error => Err(failed(tool, "the server is currently unavailable")),
                }
            }
            ["create", ..] => {
                if state.failing_apply {
                    return Err(failed(tool, "admission webhook denied the request"));
                }
                let payload: serde_json::Value =
                    serde_json::from_str(input.unwrap_or_default()).map_err(|e| failed(tool, e.to_string()))?;
                let name = payload["metadata"]["name"]
                    .as_str()
                    .ok_or_else(|| failed(tool, "missing metadata.name"))?;
                if !state.workloads.insert(name.to_string()) {
                    return Err(failed(tool, format!("deployments \"{}\" already exists", name)));
                }
                Ok(format!("deployment.apps/{} created", name))
            }
            ["replace", "deployment", name, ..] => {
                if state.failing_apply {
                    return Err(failed(tool, "admission webhook denied the request"));
                }
                if !state.workloads.contains(*name) {
                    return Err(failed(tool, format!("deployments \"{}\" not found", name)));
                }
                Ok(format!("deployment.apps/{} replaced", name))
            }
            ["expose", "deployment", _workload, flags @ ..] => {
                let name = flags
                    .iter()
                    .find_map(|f| f.strip_prefix("--name="))
                    .ok_or_else(|| failed(tool, "missing --name"))?
                    .to_string();
                if state.failing_expose.contains(&name) {
                    return Err(failed(tool, "quota exceeded"));
                }
                state.exposures.insert(name.clone());
                state.exposed.push(name.clone());
                Ok(format!("service/{} exposed", name))
            }
            _ => Err(failed(tool, "unknown command")),
        }
    }

    fn gcloud(state: &PlaneState, args: &[String]) -> String {
        match args.get(2).map(String::as_str) {
            Some("list") => {
                let clusters: Vec<_> = state
                    .gcloud_clusters
                    .iter()
                    .map(|name| serde_json::json!({ "name": name, "status": "RUNNING" }))
                    .collect();
                serde_json::Value::from(clusters).to_string()
            }
            _ => String::new(),
        }
    }

    fn dispatch(
        &self,
        tool: &str,
        args: &[String],
        input: Option<&str>,
    ) -> std::result::Result<String, CommandError> {
        let mut state = self.state.lock().unwrap();
        let call = Call {
            tool: tool.to_string(),
            args: args.to_vec(),
            input: input.map(str::to_string),
        };

        let entry = match call.verb() {
            Some(verb) => format!("kubectl:{}", verb),
            None => format!("gcloud:{}", args.get(2).cloned().unwrap_or_default()),
        };
        let is_kubectl = call.verb().is_some();
        state.calls.push(call);
        state.journal.push(entry);

        if is_kubectl {
            Self::kubectl(&mut state, tool, args, input)
        } else {
            Ok(Self::gcloud(&state, args))
        }
    }
}

#[async_trait]
impl CommandExecutor for FakeControlPlane {
    async fn run_captured(
        &self,
        tool: &str,
        args: &[String],
    ) -> std::result::Result<String, CommandError> {
        self.dispatch(tool, args, None)
    }

    async fn run_with_input(
        &self,
        tool: &str,
        args: &[String],
        input: &str,
    ) -> std::result::Result<String, CommandError> {
        self.dispatch(tool, args, Some(input))
    }
}

fn cluster_failure(state: &PlaneState, stage: ClusterStage, cluster: &ClusterRef) -> Result<()> {
    if state.failing_cluster == Some(stage) {
        return Err(DeployError::Cluster {
            cluster: cluster.to_string(),
            source: failed("gcloud", "permission denied on project"),
        });
    }
    Ok(())
}

#[async_trait]
impl ClusterProvider for FakeControlPlane {
    async fn exists(&self, cluster: &ClusterRef) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("cluster:exists".into());
        cluster_failure(&state, ClusterStage::Exists, cluster)?;
        Ok(state.cluster_ready)
    }

    async fn create_minimal(&self, cluster: &ClusterRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("cluster:create".into());
        cluster_failure(&state, ClusterStage::Create, cluster)?;
        state.cluster_ready = true;
        Ok(())
    }

    async fn load_credentials(&self, cluster: &ClusterRef) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.journal.push("cluster:credentials".into());
        cluster_failure(&state, ClusterStage::Credentials, cluster)
    }
}

/// [`Clock`] that records requested sleeps and returns immediately
#[derive(Default)]
pub struct FakeClock {
    slept: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn sleeps(&self) -> usize {
        self.slept.lock().unwrap().len()
    }

    pub fn total_slept(&self) -> Duration {
        self.slept.lock().unwrap().iter().sum()
    }
}

#[async_trait]
impl Clock for FakeClock {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}
