//! Deployment progress events

use crate::cluster::ClusterRef;
use crate::reconciler::ReconcileAction;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Progress of one deployment run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeployEvent {
    Started {
        workload: String,
        version: String,
        environment: String,
    },
    ClusterCreated {
        cluster: ClusterRef,
    },
    WorkloadApplied {
        workload: String,
        action: ReconcileAction,
    },
    ExposureCreated {
        name: String,
    },
    ExposureSkipped {
        name: String,
    },
    RolloutProgress {
        poll: u32,
        unavailable_replicas: Option<u32>,
    },
    RolloutStable {
        polls: u32,
    },
    Failed {
        reason: String,
    },
    Completed,
}

/// Event with run identity and timestamp
#[derive(Debug, Clone, Serialize)]
pub struct DeployEventEnvelope {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: DeployEvent,
}

impl DeployEventEnvelope {
    pub fn new(run_id: Uuid, event: DeployEvent) -> Self {
        Self {
            run_id,
            timestamp: Utc::now(),
            event,
        }
    }
}
