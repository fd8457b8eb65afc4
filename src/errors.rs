//! Error types for the job runner boundaries.

use thiserror::Error;

/// Errors from the cluster client.
///
/// Only `create` failures are fatal to a run; status-read errors are treated
/// as "state still unknown" by the watcher and the poll loop continues.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// A job with this name already exists in the namespace
    #[error("job '{name}' already exists in namespace '{namespace}'")]
    AlreadyExists { name: String, namespace: String },

    /// The spec failed validation before any cluster call was made
    #[error("invalid job spec: {reason}")]
    InvalidSpec { reason: String },

    /// The cluster API endpoint could not be reached
    #[error("cluster unreachable: {details}")]
    Unreachable { details: String },

    /// Any other transport or API error
    #[error("cluster API error: {details}")]
    Transport { details: String },
}

impl ClusterError {
    /// Short machine-readable tag, used in log fields.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            ClusterError::AlreadyExists { .. } => "already_exists",
            ClusterError::InvalidSpec { .. } => "invalid_spec",
            ClusterError::Unreachable { .. } => "unreachable",
            ClusterError::Transport { .. } => "transport",
        }
    }
}

impl From<kube::Error> for ClusterError {
    // 409 is mapped to AlreadyExists at the create call site, where the job
    // name and namespace are known; request deadlines map to Unreachable.
    fn from(err: kube::Error) -> Self {
        ClusterError::Transport {
            details: err.to_string(),
        }
    }
}

/// Errors from project type detection.
///
/// Never fatal to a run: callers fall back to the configured default image
/// and command when detection fails.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// git itself could not be spawned
    #[error("failed to run git: {0}")]
    Git(#[from] std::io::Error),

    /// git ran but the clone did not succeed
    #[error("clone of '{url}' failed: {stderr}")]
    CloneFailed { url: String, stderr: String },
}

/// Internal analyzer failures.
///
/// These never escape [`crate::triage`]: each variant is downgraded to a
/// synthesized verdict so the caller always receives a complete result.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// The credential environment variable is not set
    #[error("{variable} not set")]
    MissingCredential { variable: &'static str },

    /// The external API could not be called or returned an error
    #[error("analyzer API error: {details}")]
    Api { details: String },

    /// The response was not parseable as a structured verdict
    #[error("unparseable analyzer response: {details}")]
    Parse { details: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_error_display() {
        let err = ClusterError::AlreadyExists {
            name: "t1".to_string(),
            namespace: "default".to_string(),
        };
        assert!(err.to_string().contains("t1"));
        assert!(err.to_string().contains("already exists"));

        let err = ClusterError::InvalidSpec {
            reason: "empty name".to_string(),
        };
        assert!(err.to_string().contains("empty name"));
    }

    #[test]
    fn test_cluster_error_categories() {
        assert_eq!(
            ClusterError::Unreachable {
                details: String::new()
            }
            .category(),
            "unreachable"
        );
        assert_eq!(
            ClusterError::Transport {
                details: String::new()
            }
            .category(),
            "transport"
        );
    }

    #[test]
    fn test_detection_error_display() {
        let err = DetectionError::CloneFailed {
            url: "https://example.com/repo.git".to_string(),
            stderr: "not found".to_string(),
        };
        assert!(err.to_string().contains("https://example.com/repo.git"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_analyzer_error_display() {
        let err = AnalyzerError::MissingCredential {
            variable: "OPENAI_API_KEY",
        };
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }
}
