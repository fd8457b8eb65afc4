//! Kubernetes-backed cluster client over batch/v1 Jobs.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, warn};

use super::{ClusterClient, JobHandle, JobSpec};
use crate::errors::ClusterError;

/// Per-request deadline so a hung cluster call cannot starve the watcher's
/// wall-clock timeout check.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Cluster client backed by the Kubernetes batch/v1 Job API.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Fetch the job and return (succeeded, failed) counts from its status.
    async fn counts(&self, handle: &JobHandle) -> Result<(i32, i32), ClusterError> {
        let job = with_deadline(self.jobs(&handle.namespace).get(&handle.name)).await?;
        Ok(status_counts(&job))
    }
}

/// Wrap a cluster call in the transport-level deadline.
async fn with_deadline<T>(
    fut: impl std::future::Future<Output = Result<T, kube::Error>> + Send,
) -> Result<T, ClusterError> {
    match tokio::time::timeout(REQUEST_TIMEOUT, fut).await {
        Ok(result) => result.map_err(ClusterError::from),
        Err(_) => Err(ClusterError::Transport {
            details: format!("request timed out after {}s", REQUEST_TIMEOUT.as_secs()),
        }),
    }
}

/// Extract (succeeded, failed) counts from a job's status, treating absent
/// fields as zero.
fn status_counts(job: &Job) -> (i32, i32) {
    let status = job.status.as_ref();
    let succeeded = status.and_then(|s| s.succeeded).unwrap_or(0);
    let failed = status.and_then(|s| s.failed).unwrap_or(0);
    (succeeded, failed)
}

/// Build the Job manifest for a spec. restartPolicy is Never so the failed
/// count reflects real failures instead of restart churn.
fn build_job(spec: &JobSpec) -> Result<Job, ClusterError> {
    let manifest = json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": spec.name(),
            "labels": {
                "app": spec.name(),
                "app.kubernetes.io/managed-by": "autodev"
            }
        },
        "spec": {
            "backoffLimit": 0,
            "template": {
                "metadata": {
                    "labels": {
                        "app": spec.name()
                    }
                },
                "spec": {
                    "restartPolicy": "Never",
                    "containers": [{
                        "name": spec.name(),
                        "image": spec.image(),
                        "command": spec.command()
                    }]
                }
            }
        }
    });

    serde_json::from_value(manifest).map_err(|e| ClusterError::InvalidSpec {
        reason: format!("failed to build job manifest: {e}"),
    })
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create(&self, spec: &JobSpec) -> Result<JobHandle, ClusterError> {
        let job = build_job(spec)?;

        let created = match tokio::time::timeout(
            REQUEST_TIMEOUT,
            self.jobs(spec.namespace())
                .create(&PostParams::default(), &job),
        )
        .await
        {
            Ok(Ok(created)) => created,
            Ok(Err(kube::Error::Api(ae))) if ae.code == 409 => {
                return Err(ClusterError::AlreadyExists {
                    name: spec.name().to_string(),
                    namespace: spec.namespace().to_string(),
                });
            }
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                return Err(ClusterError::Unreachable {
                    details: format!(
                        "job create timed out after {}s",
                        REQUEST_TIMEOUT.as_secs()
                    ),
                });
            }
        };

        debug!(job = %spec.name(), namespace = %spec.namespace(), "Created job");

        Ok(JobHandle {
            name: created.name_any(),
            namespace: spec.namespace().to_string(),
            uid: created.metadata.uid,
        })
    }

    async fn succeeded_count(&self, handle: &JobHandle) -> Result<i32, ClusterError> {
        Ok(self.counts(handle).await?.0)
    }

    async fn failed_count(&self, handle: &JobHandle) -> Result<i32, ClusterError> {
        Ok(self.counts(handle).await?.1)
    }

    async fn logs(&self, handle: &JobHandle) -> String {
        // Jobs don't expose logs directly; read them from the job's pod,
        // found via the job-name label the Job controller stamps on it.
        let pods = self.pods(&handle.namespace);
        let lp = ListParams::default().labels(&format!("job-name={}", handle.name));

        let pod_list = match with_deadline(pods.list(&lp)).await {
            Ok(list) => list,
            Err(err) => {
                warn!(job = %handle.name, error = %err, "Failed to list pods for job logs");
                return String::new();
            }
        };

        let Some(pod_name) = pod_list.items.first().and_then(|p| p.metadata.name.clone())
        else {
            warn!(job = %handle.name, "No pods found for job, returning empty logs");
            return String::new();
        };

        match with_deadline(pods.logs(&pod_name, &LogParams::default())).await {
            Ok(text) => text,
            Err(err) => {
                warn!(pod = %pod_name, error = %err, "Failed to fetch pod logs");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> JobSpec {
        JobSpec::new(
            "t1",
            "busybox:latest",
            vec!["echo".to_string(), "hi".to_string()],
            "default",
        )
        .unwrap()
    }

    #[test]
    fn test_build_job_manifest() {
        let job = build_job(&spec()).unwrap();
        assert_eq!(job.metadata.name.as_deref(), Some("t1"));

        let template = job.spec.as_ref().unwrap().template.clone();
        let pod_spec = template.spec.unwrap();
        assert_eq!(pod_spec.restart_policy.as_deref(), Some("Never"));

        let container = &pod_spec.containers[0];
        assert_eq!(container.image.as_deref(), Some("busybox:latest"));
        assert_eq!(
            container.command.as_deref(),
            Some(["echo".to_string(), "hi".to_string()].as_slice())
        );
    }

    #[test]
    fn test_status_counts_default_to_zero() {
        let job = Job::default();
        assert_eq!(status_counts(&job), (0, 0));
    }

    #[test]
    fn test_status_counts_read_both_signals() {
        let job = Job {
            status: Some(k8s_openapi::api::batch::v1::JobStatus {
                succeeded: Some(1),
                failed: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(status_counts(&job), (1, 0));
    }
}
