//! AutoDev: submits test jobs to a Kubernetes cluster, watches them to a
//! terminal state, and triages failures with AI.
//!
//! The core is the [`watcher::JobWatcher`] lifecycle: submit a job through a
//! [`cluster::ClusterClient`], poll its succeeded/failed signals on a fixed
//! interval within a wall-clock budget, fetch logs once at the terminal
//! transition, and hand failed-job logs to a [`triage::FailureAnalyzer`] for
//! exactly one structured verdict.

pub mod cluster;
pub mod config;
pub mod detect;
pub mod errors;
pub mod server;
pub mod triage;
pub mod watcher;
