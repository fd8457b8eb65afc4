//! AutoDev CLI
//!
//! `run` submits a test job and watches it to completion, `triage` analyzes a
//! failure log file, `serve` exposes the same operations over HTTP.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::warn;

use autodev::cluster::KubeClusterClient;
use autodev::config::Config;
use autodev::detect::resolve_spec;
use autodev::server;
use autodev::triage::{FailureAnalyzer, OpenAiAnalyzer};
use autodev::watcher::{JobWatcher, RunState};

#[derive(Parser)]
#[command(name = "autodev")]
#[command(about = "Submit test jobs to Kubernetes and triage failures with AI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a job and watch it to a terminal state
    Run {
        /// Job name (must be a valid cluster resource name)
        job_name: String,

        /// Source repository URL; project type detection picks the image
        /// and test command
        #[arg(long)]
        repo: Option<String>,

        /// Return immediately after submission instead of waiting
        #[arg(long)]
        no_wait: bool,
    },
    /// Analyze a failure log file with AI
    Triage {
        /// Path to the log file
        logfile: PathBuf,
    },
    /// Start the HTTP API server
    Serve {
        /// Port to listen on (overrides HTTP_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Run {
            job_name,
            repo,
            no_wait,
        } => run_job(&config, &job_name, repo.as_deref(), no_wait).await,
        Commands::Triage { logfile } => triage_file(&config, &logfile).await,
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.http_port = port;
            }
            server::serve(config).await
        }
    }
}

async fn run_job(config: &Config, job_name: &str, repo: Option<&str>, no_wait: bool) -> Result<()> {
    let spec = resolve_spec(job_name, repo, &config.namespace, &config.default_image)
        .await
        .context("Failed to build job spec")?;

    let kube = kube::Client::try_default()
        .await
        .context("Failed to connect to the Kubernetes cluster")?;

    let watcher = JobWatcher::new(
        KubeClusterClient::new(kube),
        OpenAiAnalyzer::new(config.openai_api_key.clone(), config.openai_model.clone()),
        config.watcher_settings(),
    );

    if no_wait {
        let handle = watcher
            .submit(&spec)
            .await
            .context("Job submission failed")?;
        println!(
            "{} job '{}' submitted to namespace '{}'",
            "✓".green(),
            handle.name,
            handle.namespace
        );
        return Ok(());
    }

    let result = watcher.run(&spec).await;

    let status_line = match result.state {
        RunState::Succeeded => format!("{} job '{}' succeeded", "✓".green(), result.job_name),
        RunState::Failed => format!("{} job '{}' failed", "✗".red(), result.job_name),
        RunState::TimedOut => format!("{} job '{}' timed out", "⏱".yellow(), result.job_name),
        RunState::SubmitFailed => {
            format!("{} job '{}' submission failed", "✗".red(), result.job_name)
        }
        RunState::Submitted => format!("{} job '{}' submitted", "✓".green(), result.job_name),
    };
    eprintln!("{status_line}");

    println!("{}", serde_json::to_string_pretty(&result)?);

    if matches!(result.state, RunState::SubmitFailed) {
        anyhow::bail!(
            "submission failed: {}",
            result.error.unwrap_or_else(|| "unknown error".to_string())
        );
    }
    Ok(())
}

async fn triage_file(config: &Config, logfile: &Path) -> Result<()> {
    let logs = tokio::fs::read_to_string(logfile)
        .await
        .with_context(|| format!("Failed to read log file {}", logfile.display()))?;

    if config.openai_api_key.is_none() {
        warn!("OPENAI_API_KEY is not set; triage will return a configuration-error verdict");
    }

    let analyzer = OpenAiAnalyzer::new(config.openai_api_key.clone(), config.openai_model.clone());
    let verdict = analyzer.analyze(&logs).await;

    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
