//! Job lifecycle watcher: submit, poll to a terminal state, collect logs,
//! and trigger exactly one triage call on failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::cluster::{ClusterClient, JobHandle, JobSpec};
use crate::errors::ClusterError;
use crate::triage::{FailureAnalyzer, TriageVerdict};

/// Time source for the poll loop, injectable so tests can simulate elapsed
/// time without real delays.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation over tokio's timer.
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Poll cadence and wall-clock budget for one watch.
#[derive(Debug, Clone, Copy)]
pub struct WatcherSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Final state of a run.
///
/// `Submitted` is the explicit non-terminal marker returned when the caller
/// does not wait for completion; the other four are the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Submitted,
    Succeeded,
    Failed,
    TimedOut,
    SubmitFailed,
}

/// The watcher's final output.
///
/// Invariants: `verdict` is present iff `state == Failed`; `error` is present
/// iff `state == SubmitFailed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub job_name: String,
    pub namespace: String,
    pub state: RunState,
    pub logs: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<TriageVerdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResult {
    fn new(spec: &JobSpec, state: RunState) -> Self {
        Self {
            job_name: spec.name().to_string(),
            namespace: spec.namespace().to_string(),
            state,
            logs: String::new(),
            verdict: None,
            error: None,
        }
    }
}

/// Drives one job lifecycle: submit, poll until terminal or out of budget,
/// fetch logs once at the terminal transition, analyze once on failure.
pub struct JobWatcher<C, A> {
    cluster: C,
    analyzer: A,
    clock: Arc<dyn Clock>,
    settings: WatcherSettings,
}

impl<C, A> JobWatcher<C, A>
where
    C: ClusterClient,
    A: FailureAnalyzer,
{
    pub fn new(cluster: C, analyzer: A, settings: WatcherSettings) -> Self {
        Self::with_clock(cluster, analyzer, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        cluster: C,
        analyzer: A,
        settings: WatcherSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cluster,
            analyzer,
            clock,
            settings,
        }
    }

    /// Submit the job without waiting; the handle can be used for later
    /// status and log queries.
    pub async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, ClusterError> {
        self.cluster.create(spec).await
    }

    /// Full lifecycle: submit, then watch to a terminal state.
    pub async fn run(&self, spec: &JobSpec) -> RunResult {
        let handle = match self.cluster.create(spec).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(job = %spec.name(), error = %err, "Job submission failed");
                let mut result = RunResult::new(spec, RunState::SubmitFailed);
                result.error = Some(err.to_string());
                return result;
            }
        };

        info!(job = %handle.name, namespace = %handle.namespace, "Job submitted, polling");
        self.watch(spec, &handle).await
    }

    /// Poll an already-submitted job to a terminal state.
    async fn watch(&self, spec: &JobSpec, handle: &JobHandle) -> RunResult {
        let started = self.clock.now();

        loop {
            let succeeded = self
                .cluster
                .succeeded_count(handle)
                .await
                .map_err(|err| {
                    // Unknown status is not a failed status; keep polling.
                    warn!(job = %handle.name, error = %err, "Succeeded-count read failed");
                })
                .ok();
            let failed = self
                .cluster
                .failed_count(handle)
                .await
                .map_err(|err| {
                    warn!(job = %handle.name, error = %err, "Failed-count read failed");
                })
                .ok();

            match classify_poll(succeeded, failed) {
                PollOutcome::Succeeded => {
                    info!(job = %handle.name, "Job succeeded");
                    let mut result = RunResult::new(spec, RunState::Succeeded);
                    result.logs = self.cluster.logs(handle).await;
                    return result;
                }
                PollOutcome::Failed => {
                    info!(job = %handle.name, "Job failed, fetching logs for triage");
                    let mut result = RunResult::new(spec, RunState::Failed);
                    result.logs = self.cluster.logs(handle).await;
                    result.verdict = Some(self.analyzer.analyze(&result.logs).await);
                    return result;
                }
                PollOutcome::Pending => {}
            }

            if self.clock.now().duration_since(started) >= self.settings.timeout {
                warn!(
                    job = %handle.name,
                    timeout_secs = self.settings.timeout.as_secs(),
                    "Job did not reach a terminal state within the time budget"
                );
                return RunResult::new(spec, RunState::TimedOut);
            }

            self.clock.sleep(self.settings.poll_interval).await;
        }
    }
}

/// What one poll of the two status signals means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollOutcome {
    Pending,
    Succeeded,
    Failed,
}

/// Classify a poll. A read that failed is `None` and counts as "unknown".
/// If both signals somehow read positive in the same poll, succeeded wins;
/// that should not happen under correct cluster semantics but is observable
/// under races, and the choice here is deterministic.
fn classify_poll(succeeded: Option<i32>, failed: Option<i32>) -> PollOutcome {
    if succeeded.unwrap_or(0) > 0 {
        return PollOutcome::Succeeded;
    }
    if failed.unwrap_or(0) > 0 {
        return PollOutcome::Failed;
    }
    PollOutcome::Pending
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_pending_when_no_signal() {
        assert_eq!(classify_poll(Some(0), Some(0)), PollOutcome::Pending);
        assert_eq!(classify_poll(None, None), PollOutcome::Pending);
    }

    #[test]
    fn test_classify_terminal_signals() {
        assert_eq!(classify_poll(Some(1), Some(0)), PollOutcome::Succeeded);
        assert_eq!(classify_poll(Some(0), Some(1)), PollOutcome::Failed);
        assert_eq!(classify_poll(None, Some(1)), PollOutcome::Failed);
    }

    #[test]
    fn test_tie_break_prefers_succeeded() {
        assert_eq!(classify_poll(Some(1), Some(1)), PollOutcome::Succeeded);
    }

    #[test]
    fn test_unknown_succeeded_does_not_mask_failure() {
        // A transport error on one signal leaves the other authoritative
        assert_eq!(classify_poll(None, Some(0)), PollOutcome::Pending);
        assert_eq!(classify_poll(Some(0), None), PollOutcome::Pending);
    }

    #[test]
    fn test_run_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RunState::TimedOut).unwrap(),
            "\"timed_out\""
        );
        assert_eq!(
            serde_json::to_string(&RunState::Submitted).unwrap(),
            "\"submitted\""
        );
    }
}
