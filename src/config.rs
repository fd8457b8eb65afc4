//! Runtime configuration, read once from the environment at startup and
//! passed explicitly to the components that need it.

use std::time::Duration;

use crate::watcher::WatcherSettings;

/// Service configuration from environment variables.
///
/// Keys and fallbacks:
/// - `K8S_NAMESPACE` — target namespace (default `default`)
/// - `K8S_JOB_IMAGE` — default container image when no repo is given
///   (default `busybox:latest`)
/// - `OPENAI_API_KEY` — analyzer credential (optional; triage degrades to a
///   configuration-error verdict without it)
/// - `OPENAI_MODEL` — analyzer model (default `gpt-4o-mini`)
/// - `POLL_INTERVAL_SECS` — job status poll cadence (default 5)
/// - `JOB_TIMEOUT_SECS` — wall-clock budget per job (default 300)
/// - `HTTP_PORT` — API server port (default 8000)
#[derive(Debug, Clone)]
pub struct Config {
    pub namespace: String,
    pub default_image: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub poll_interval_secs: u64,
    pub job_timeout_secs: u64,
    pub http_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            namespace: std::env::var("K8S_NAMESPACE").unwrap_or_else(|_| "default".to_string()),
            default_image: std::env::var("K8S_JOB_IMAGE")
                .unwrap_or_else(|_| "busybox:latest".to_string()),
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            poll_interval_secs: env_u64("POLL_INTERVAL_SECS", 5),
            job_timeout_secs: env_u64("JOB_TIMEOUT_SECS", 300),
            http_port: std::env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .unwrap_or(8000),
        }
    }

    /// Default command run when no repo URL was supplied and detection has
    /// nothing to work with.
    #[must_use]
    pub fn default_command(job_name: &str) -> Vec<String> {
        vec!["echo".to_string(), format!("Running job: {job_name}")]
    }

    /// Watcher cadence and budget derived from this configuration.
    #[must_use]
    pub fn watcher_settings(&self) -> WatcherSettings {
        WatcherSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.job_timeout_secs),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_u64_falls_back_on_garbage() {
        // Key is unset in the test environment
        assert_eq!(env_u64("AUTODEV_DOES_NOT_EXIST", 42), 42);
    }

    #[test]
    fn test_default_command_names_the_job() {
        let cmd = Config::default_command("t1");
        assert_eq!(cmd[0], "echo");
        assert!(cmd[1].contains("t1"));
    }

    #[test]
    fn test_watcher_settings_conversion() {
        let config = Config {
            namespace: "default".to_string(),
            default_image: "busybox:latest".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            poll_interval_secs: 5,
            job_timeout_secs: 300,
            http_port: 8000,
        };
        let settings = config.watcher_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.timeout, Duration::from_secs(300));
    }
}
