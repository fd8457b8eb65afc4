//! Cluster job API: spec/handle types and the four-method client contract.

mod k8s;

pub use k8s::KubeClusterClient;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ClusterError;

/// Maximum length of a Kubernetes resource name (RFC 1123 label).
const MAX_NAME_LEN: usize = 63;

/// Everything needed to create a job. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    name: String,
    image: String,
    command: Vec<String>,
    namespace: String,
}

impl JobSpec {
    /// Build a validated spec. The name must be a non-empty RFC 1123 label:
    /// lowercase alphanumerics and `-`, starting and ending alphanumeric.
    pub fn new(
        name: impl Into<String>,
        image: impl Into<String>,
        command: Vec<String>,
        namespace: impl Into<String>,
    ) -> Result<Self, ClusterError> {
        let name = name.into();
        if let Err(reason) = validate_name(&name) {
            return Err(ClusterError::InvalidSpec { reason });
        }
        Ok(Self {
            name,
            image: image.into(),
            command,
            namespace: namespace.into(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Check that a job name is safe to use as a cluster resource name.
fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("job name must not be empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("job name must be at most {MAX_NAME_LEN} characters"));
    }
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_chars {
        return Err(format!(
            "job name '{name}' must contain only lowercase alphanumerics and '-'"
        ));
    }
    let first = name.chars().next().unwrap_or('-');
    let last = name.chars().last().unwrap_or('-');
    if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
        return Err(format!(
            "job name '{name}' must start and end with an alphanumeric character"
        ));
    }
    Ok(())
}

/// Reference to a submitted job, used for all subsequent status/log queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    pub name: String,
    pub namespace: String,
    /// Opaque cluster identifier, if the cluster reported one.
    pub uid: Option<String>,
}

/// The job API the watcher depends on.
///
/// `create` is the only fatal failure point. The count reads are point-in-time
/// queries that may fail independently; the watcher treats any error as "state
/// still unknown". `logs` is best effort and returns an empty string instead
/// of erroring, since logs are diagnostic only.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create(&self, spec: &JobSpec) -> Result<JobHandle, ClusterError>;

    async fn succeeded_count(&self, handle: &JobHandle) -> Result<i32, ClusterError>;

    async fn failed_count(&self, handle: &JobHandle) -> Result<i32, ClusterError>;

    async fn logs(&self, handle: &JobHandle) -> String;
}

#[async_trait]
impl<T: ClusterClient + ?Sized> ClusterClient for Arc<T> {
    async fn create(&self, spec: &JobSpec) -> Result<JobHandle, ClusterError> {
        (**self).create(spec).await
    }

    async fn succeeded_count(&self, handle: &JobHandle) -> Result<i32, ClusterError> {
        (**self).succeeded_count(handle).await
    }

    async fn failed_count(&self, handle: &JobHandle) -> Result<i32, ClusterError> {
        (**self).failed_count(handle).await
    }

    async fn logs(&self, handle: &JobHandle) -> String {
        (**self).logs(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        for name in ["t1", "build-42", "a", "test-job-with-dashes", "0abc"] {
            assert!(validate_name(name).is_ok(), "expected '{name}' to be valid");
        }
    }

    #[test]
    fn test_invalid_names() {
        for name in ["", "Test", "job_name", "-leading", "trailing-", "job.name"] {
            assert!(
                validate_name(name).is_err(),
                "expected '{name}' to be rejected"
            );
        }
        let long = "a".repeat(64);
        assert!(validate_name(&long).is_err());
    }

    #[test]
    fn test_spec_construction() {
        let spec = JobSpec::new(
            "t1",
            "busybox:latest",
            vec!["echo".to_string(), "hi".to_string()],
            "default",
        )
        .unwrap();
        assert_eq!(spec.name(), "t1");
        assert_eq!(spec.namespace(), "default");
        assert_eq!(spec.command(), ["echo", "hi"]);

        let err = JobSpec::new("Bad Name", "img", vec![], "default").unwrap_err();
        assert_eq!(err.category(), "invalid_spec");
    }
}
