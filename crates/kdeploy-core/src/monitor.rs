//! Rollout monitor
//!
//! Polls a workload's status at a fixed interval until no replica is
//! reported unavailable, a query fails, or the poll cap is reached.
//!
//! ```text
//!            unavailable > 0, polls < cap
//!              ┌──────────┐
//!              ▼          │
//!   ──────► Polling ──────┘
//!              │  unavailable null/0 ──► Stable
//!              │  polls == cap ────────► TimedOut
//!              └─ query error ─────────► Failed
//! ```
//!
//! Sleeping goes through a [`Clock`] so tests can run the full cap without
//! waiting.

use crate::error::{DeployError, Result};
use crate::kubectl::Kubectl;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Interval between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Polls before giving up (about 20 minutes at the default interval)
pub const DEFAULT_MAX_POLLS: u32 = 120;

/// Source of delays between polls
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Monitor state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RolloutState {
    Polling,
    Stable,
    TimedOut,
    Failed,
}

impl RolloutState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RolloutState::Polling)
    }
}

/// Status observed across one wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RolloutStatus {
    /// Last reported unavailable replica count
    pub unavailable_replicas: Option<u32>,
    /// Polls performed so far
    pub poll_count: u32,
}

impl RolloutStatus {
    /// Record one poll result and return the resulting state
    pub fn observe(&mut self, unavailable: Option<u32>, max_polls: u32) -> RolloutState {
        self.poll_count += 1;
        self.unavailable_replicas = unavailable;

        if unavailable.unwrap_or(0) == 0 {
            RolloutState::Stable
        } else if self.poll_count >= max_polls {
            RolloutState::TimedOut
        } else {
            RolloutState::Polling
        }
    }
}

/// Polling parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    #[serde(with = "secs", rename = "poll_interval_secs")]
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize)]
struct WorkloadObject {
    #[serde(default)]
    status: Option<WorkloadStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkloadStatus {
    #[serde(default)]
    unavailable_replicas: Option<u32>,
}

/// Extract the unavailable replica count from a workload document
pub fn unavailable_replicas(document: &str) -> serde_json::Result<Option<u32>> {
    let object: WorkloadObject = serde_json::from_str(document)?;
    Ok(object.status.and_then(|s| s.unavailable_replicas))
}

/// Waits for a workload rollout to settle
pub struct RolloutMonitor {
    kubectl: Kubectl,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
}

impl RolloutMonitor {
    pub fn new(kubectl: Kubectl, clock: Arc<dyn Clock>, config: MonitorConfig) -> Self {
        Self {
            kubectl,
            clock,
            config,
        }
    }

    /// Block until the rollout is stable
    pub async fn wait_for_rollout(&self, workload: &str) -> Result<RolloutStatus> {
        self.wait_for_rollout_with(workload, |_| {}).await
    }

    /// Block until the rollout is stable, reporting each poll to `on_poll`
    #[instrument(skip(self, on_poll))]
    pub async fn wait_for_rollout_with<F>(
        &self,
        workload: &str,
        mut on_poll: F,
    ) -> Result<RolloutStatus>
    where
        F: FnMut(&RolloutStatus) + Send,
    {
        let mut status = RolloutStatus::default();

        loop {
            let polled = self.query(workload).await;
            let state = match &polled {
                Ok(unavailable) => {
                    let state = status.observe(*unavailable, self.config.max_polls);
                    on_poll(&status);
                    state
                }
                Err(_) => RolloutState::Failed,
            };

            debug!(
                poll = status.poll_count,
                unavailable = ?status.unavailable_replicas,
                state = ?state,
                "Rollout poll"
            );

            match state {
                RolloutState::Polling => self.clock.sleep(self.config.poll_interval).await,
                RolloutState::Stable => {
                    info!(polls = status.poll_count, "Rollout stable");
                    return Ok(status);
                }
                RolloutState::TimedOut => {
                    warn!(polls = status.poll_count, "Rollout did not stabilize");
                    return Err(DeployError::Timeout {
                        workload: workload.to_string(),
                        polls: status.poll_count,
                    });
                }
                RolloutState::Failed => {
                    warn!(polls = status.poll_count, "Rollout status query failed");
                    return polled.map(|_| status);
                }
            }
        }
    }

    async fn query(&self, workload: &str) -> Result<Option<u32>> {
        let document =
            self.kubectl
                .get_workload(workload)
                .await
                .map_err(|source| DeployError::Query {
                    resource: format!("deployment/{}", workload),
                    source,
                })?;

        unavailable_replicas(&document).map_err(|source| DeployError::Parse {
            resource: format!("deployment/{}", workload),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClock, FakeControlPlane, StatusReply};

    fn monitor(plane: &Arc<FakeControlPlane>, clock: &Arc<FakeClock>) -> RolloutMonitor {
        RolloutMonitor::new(
            Kubectl::new(plane.clone(), ".kube/config"),
            clock.clone(),
            MonitorConfig::default(),
        )
    }

    #[test]
    fn test_status_transitions() {
        let mut status = RolloutStatus::default();
        assert_eq!(status.observe(Some(2), 3), RolloutState::Polling);
        assert_eq!(status.observe(Some(1), 3), RolloutState::Polling);
        assert_eq!(status.observe(Some(1), 3), RolloutState::TimedOut);
        assert_eq!(status.poll_count, 3);

        let mut status = RolloutStatus::default();
        assert_eq!(status.observe(None, 3), RolloutState::Stable);
        let mut status = RolloutStatus::default();
        assert_eq!(status.observe(Some(0), 3), RolloutState::Stable);
        assert!(RolloutState::Stable.is_terminal());
        assert!(!RolloutState::Polling.is_terminal());
    }

    #[test]
    fn test_parse_unavailable_replicas() {
        assert_eq!(
            unavailable_replicas(r#"{"status":{"unavailableReplicas":3}}"#).unwrap(),
            Some(3)
        );
        assert_eq!(
            unavailable_replicas(r#"{"status":{"replicas":2}}"#).unwrap(),
            None
        );
        assert_eq!(unavailable_replicas(r#"{"metadata":{}}"#).unwrap(), None);
    }

    #[tokio::test]
    async fn test_stable_at_first_zero() {
        let plane = Arc::new(FakeControlPlane::new().with_status_sequence(vec![
            StatusReply::Unavailable(Some(3)),
            StatusReply::Unavailable(Some(3)),
            StatusReply::Unavailable(Some(3)),
            StatusReply::Unavailable(Some(0)),
            StatusReply::Unavailable(Some(3)),
        ]));
        let clock = Arc::new(FakeClock::default());

        let status = monitor(&plane, &clock).wait_for_rollout("api").await.unwrap();

        assert_eq!(status.poll_count, 4);
        assert_eq!(plane.status_polls(), 4);
        assert_eq!(clock.sleeps(), 3);
        assert_eq!(clock.total_slept(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_missing_count_is_stable() {
        let plane = Arc::new(
            FakeControlPlane::new().with_status_sequence(vec![StatusReply::Unavailable(None)]),
        );
        let clock = Arc::new(FakeClock::default());

        let status = monitor(&plane, &clock).wait_for_rollout("api").await.unwrap();
        assert_eq!(status.poll_count, 1);
        assert_eq!(clock.sleeps(), 0);
    }

    #[tokio::test]
    async fn test_times_out_after_exactly_cap_polls() {
        let replies = vec![StatusReply::Unavailable(Some(1)); 150];
        let plane = Arc::new(FakeControlPlane::new().with_status_sequence(replies));
        let clock = Arc::new(FakeClock::default());

        let err = monitor(&plane, &clock)
            .wait_for_rollout("api")
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Timeout { polls: 120, .. }));
        assert_eq!(plane.status_polls(), 120);
        assert_eq!(clock.sleeps(), 119);
    }

    #[tokio::test]
    async fn test_query_error_fails_immediately() {
        let mut replies = vec![StatusReply::Unavailable(Some(2)); 4];
        replies.push(StatusReply::Error);
        replies.extend(vec![StatusReply::Unavailable(Some(0)); 3]);
        let plane = Arc::new(FakeControlPlane::new().with_status_sequence(replies));
        let clock = Arc::new(FakeClock::default());

        let err = monitor(&plane, &clock)
            .wait_for_rollout("api")
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Query { .. }));
        assert_eq!(plane.status_polls(), 5);
        assert_eq!(clock.sleeps(), 4);
    }

    #[tokio::test]
    async fn test_reports_each_poll() {
        let plane = Arc::new(FakeControlPlane::new().with_status_sequence(vec![
            StatusReply::Unavailable(Some(2)),
            StatusReply::Unavailable(Some(1)),
            StatusReply::Unavailable(Some(0)),
        ]));
        let clock = Arc::new(FakeClock::default());
        let mut seen = Vec::new();

        monitor(&plane, &clock)
            .wait_for_rollout_with("api", |s| seen.push((s.poll_count, s.unavailable_replicas)))
            .await
            .unwrap();

        assert_eq!(seen, vec![(1, Some(2)), (2, Some(1)), (3, Some(0))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_sleeps_interval() {
        let start = tokio::time::Instant::now();
        TokioClock.sleep(DEFAULT_POLL_INTERVAL).await;
        assert!(start.elapsed() >= DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_monitor_config_serde() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"poll_interval_secs":5,"max_polls":12}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.max_polls, 12);
    }
}
