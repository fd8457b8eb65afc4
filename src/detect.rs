//! Project type detection from a repository's manifest files.
//!
//! Performs a shallow clone into a scratch directory, checks which manifest
//! files exist, and maps the first match (in priority order) to a container
//! image and test command. The scratch clone is removed when the `TempDir`
//! drops, success or failure.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::cluster::JobSpec;
use crate::config::Config;
use crate::errors::{ClusterError, DetectionError};

/// Detected project kind, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Python,
    Node,
    Java,
    Go,
    /// No recognized manifest: the job just clones and lists the tree.
    Generic,
}

/// Outcome of detection: which image to run and what command to run in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    pub project_type: ProjectType,
    pub image: String,
    /// Shell script run inside the container, with the repo URL substituted.
    pub test_command: String,
}

impl DetectionResult {
    /// Container command vector for a [`crate::cluster::JobSpec`].
    #[must_use]
    pub fn command(&self) -> Vec<String> {
        vec![
            "sh".to_string(),
            "-c".to_string(),
            self.test_command.clone(),
        ]
    }
}

/// Manifest files that mark a Python project, highest priority.
const PYTHON_MANIFESTS: &[&str] = &["requirements.txt", "pyproject.toml", "setup.py"];

/// Shallow-clone the repository and detect its project type.
pub async fn detect(repo_url: &str) -> Result<DetectionResult, DetectionError> {
    let scratch = tempfile::tempdir()?;

    debug!(url = %repo_url, dir = %scratch.path().display(), "Cloning repository for detection");

    let output = Command::new("git")
        .args(["clone", "--depth", "1", repo_url])
        .arg(scratch.path())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        return Err(DetectionError::CloneFailed {
            url: repo_url.to_string(),
            stderr,
        });
    }

    let project_type = detect_in_dir(scratch.path());
    let result = resolve(project_type, repo_url);

    info!(
        url = %repo_url,
        project_type = ?result.project_type,
        image = %result.image,
        "Detected project type"
    );

    Ok(result)
}

/// Determine the project type from manifest files present in a directory.
/// First match in priority order wins.
pub fn detect_in_dir(dir: &Path) -> ProjectType {
    if PYTHON_MANIFESTS.iter().any(|m| dir.join(m).is_file()) {
        return ProjectType::Python;
    }
    if dir.join("package.json").is_file() {
        return ProjectType::Node;
    }
    if dir.join("pom.xml").is_file() {
        return ProjectType::Java;
    }
    if dir.join("go.mod").is_file() {
        return ProjectType::Go;
    }
    ProjectType::Generic
}

/// Map a project type to its fixed image and command template.
#[must_use]
pub fn resolve(project_type: ProjectType, repo_url: &str) -> DetectionResult {
    let (image, template) = match project_type {
        ProjectType::Python => (
            "python:3.12-slim",
            "git clone --depth 1 {repo} /src && cd /src && pip install -r requirements.txt && pytest",
        ),
        ProjectType::Node => (
            "node:20",
            "git clone --depth 1 {repo} /src && cd /src && npm install && npm test",
        ),
        ProjectType::Java => (
            "maven:3.9-eclipse-temurin-17",
            "git clone --depth 1 {repo} /src && cd /src && mvn -q test",
        ),
        ProjectType::Go => (
            "golang:1.22",
            "git clone --depth 1 {repo} /src && cd /src && go test ./...",
        ),
        ProjectType::Generic => (
            "alpine/git:latest",
            "git clone --depth 1 {repo} /src && ls -R /src",
        ),
    };

    DetectionResult {
        project_type,
        image: image.to_string(),
        test_command: template.replace("{repo}", repo_url),
    }
}

/// Build the job spec for a run request.
///
/// When a repo URL is given, detection picks the image and command; a
/// detection failure never blocks submission and falls back to the
/// configured default image with a trivial echo command.
pub async fn resolve_spec(
    job_name: &str,
    repo_url: Option<&str>,
    namespace: &str,
    default_image: &str,
) -> Result<JobSpec, ClusterError> {
    if let Some(url) = repo_url {
        match detect(url).await {
            Ok(result) => {
                return JobSpec::new(job_name, result.image.clone(), result.command(), namespace);
            }
            Err(err) => {
                warn!(url = %url, error = %err, "Detection failed, using default image");
            }
        }
    }

    JobSpec::new(
        job_name,
        default_image,
        Config::default_command(job_name),
        namespace,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_go_mod_alone_detects_go() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("go.mod"), "module example.com/m").unwrap();
        assert_eq!(detect_in_dir(dir.path()), ProjectType::Go);
    }

    #[test]
    fn test_python_wins_over_node() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("requirements.txt"), "pytest").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(detect_in_dir(dir.path()), ProjectType::Python);
    }

    #[test]
    fn test_node_wins_over_java() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();
        fs::write(dir.path().join("pom.xml"), "<project/>").unwrap();
        assert_eq!(detect_in_dir(dir.path()), ProjectType::Node);
    }

    #[test]
    fn test_pyproject_counts_as_python() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pyproject.toml"), "[project]").unwrap();
        assert_eq!(detect_in_dir(dir.path()), ProjectType::Python);
    }

    #[test]
    fn test_empty_dir_is_generic() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_in_dir(dir.path()), ProjectType::Generic);
    }

    #[test]
    fn test_resolve_substitutes_repo_url() {
        let result = resolve(ProjectType::Go, "https://example.com/repo.git");
        assert!(result.test_command.contains("https://example.com/repo.git"));
        assert!(!result.test_command.contains("{repo}"));
        assert_eq!(result.image, "golang:1.22");

        let command = result.command();
        assert_eq!(command[0], "sh");
        assert_eq!(command[1], "-c");
        assert_eq!(command[2], result.test_command);
    }

    #[tokio::test]
    async fn test_resolve_spec_without_repo_uses_defaults() {
        let spec = resolve_spec("t1", None, "default", "busybox:latest")
            .await
            .unwrap();
        assert_eq!(spec.image(), "busybox:latest");
        assert_eq!(spec.command()[0], "echo");
        assert_eq!(spec.namespace(), "default");
    }

    #[tokio::test]
    async fn test_resolve_spec_falls_back_when_clone_fails() {
        let spec = resolve_spec(
            "t1",
            Some("file:///nonexistent/repo/path.git"),
            "default",
            "busybox:latest",
        )
        .await
        .unwrap();
        assert_eq!(spec.image(), "busybox:latest");
    }

    #[tokio::test]
    async fn test_resolve_spec_rejects_bad_names() {
        assert!(resolve_spec("Not A Name", None, "default", "busybox:latest")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_clone_failure_surfaces_as_detection_error() {
        // Git(io error) if git itself is missing, CloneFailed otherwise.
        assert!(detect("file:///nonexistent/repo/path.git").await.is_err());
    }
}
