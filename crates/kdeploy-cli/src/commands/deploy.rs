//! Deploy command

use crate::output::{print_info, print_success, print_warning};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use kdeploy_core::{
    DeployConfig, DeployEvent, DeployEventEnvelope, DeploymentOrchestrator, GcloudClusterProvider,
    Kubectl, ProcessExecutor, ReconcileAction, TokioClock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Run one deployment of the configured package to `environment`
pub async fn execute(config: &DeployConfig, environment: &str) -> anyhow::Result<()> {
    let target = config.target(environment)?;
    debug!(
        environment,
        exposures = target.exposures.len(),
        "Resolved deployment target"
    );

    // gcloud writes credentials where kubectl will read them
    let executor = Arc::new(ProcessExecutor::new().with_env("KUBECONFIG", &config.kubectl.kubeconfig));
    let kubectl =
        Kubectl::new(executor.clone(), &config.kubectl.kubeconfig).with_binary(&config.kubectl.binary);
    let clusters = GcloudClusterProvider::new(executor).with_binary(&config.gcloud.binary);

    let orchestrator = DeploymentOrchestrator::new(
        kubectl,
        Arc::new(clusters),
        Arc::new(TokioClock),
        config.monitor,
    );

    print_info(&format!(
        "Deploying {} at version {} to {}",
        target.workload.name.bold(),
        target.workload.version,
        target.cluster
    ));

    let printer = tokio::spawn(print_events(orchestrator.subscribe(), config.monitor.max_polls));
    let result = orchestrator.deploy(&target).await;

    // Closing the channel ends the printer
    drop(orchestrator);
    let _ = printer.await;

    // Failures are reported once, by main
    let outcome = result?;
    print_success(&format!(
        "{} is live after {} status polls",
        target.workload.name, outcome.rollout.poll_count
    ));
    Ok(())
}

async fn print_events(mut rx: broadcast::Receiver<DeployEventEnvelope>, max_polls: u32) {
    let mut spinner: Option<ProgressBar> = None;

    loop {
        let envelope = match rx.recv().await {
            Ok(envelope) => envelope,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match envelope.event {
            DeployEvent::ClusterCreated { cluster } => {
                print_success(&format!("Created cluster {}", cluster));
            }
            DeployEvent::WorkloadApplied { workload, action } => {
                let verb = match action {
                    ReconcileAction::Created => "Created",
                    ReconcileAction::Replaced => "Replaced",
                };
                print_success(&format!("{} workload {}", verb, workload));
            }
            DeployEvent::ExposureCreated { name } => {
                print_success(&format!("Created exposure {}", name));
            }
            DeployEvent::ExposureSkipped { name } => {
                print_warning(&format!("Exposure {} already present, left unchanged", name));
            }
            DeployEvent::RolloutProgress {
                poll,
                unavailable_replicas,
            } => {
                let pb = spinner.get_or_insert_with(|| {
                    let pb = ProgressBar::new_spinner();
                    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
                        pb.set_style(style);
                    }
                    pb.enable_steady_tick(Duration::from_millis(120));
                    pb
                });
                pb.set_message(format!(
                    "Waiting for rollout ({} unavailable, poll {}/{})",
                    unavailable_replicas.unwrap_or(0),
                    poll,
                    max_polls
                ));
            }
            DeployEvent::RolloutStable { polls } => {
                if let Some(pb) = spinner.take() {
                    pb.finish_with_message(format!("Rollout stable after {} polls", polls));
                }
            }
            DeployEvent::Failed { .. } => {
                if let Some(pb) = spinner.take() {
                    pb.abandon_with_message("Rollout interrupted".red().to_string());
                }
            }
            DeployEvent::Started { .. } | DeployEvent::Completed => {}
        }
    }
}
