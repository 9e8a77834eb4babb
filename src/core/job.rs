//! Job domain model and per-job run results

use crate::core::config::{DeployConfig, ImageConfig, JobConfig, RemoteConfig};
use crate::core::step::{Step, StepDefaults};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Status of a single job
///
/// Transitions are Pending -> Running -> {Succeeded, Failed}, or
/// Pending -> Skipped when a transitive dependency failed, or
/// Pending -> Failed (Cancelled) on abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Skipped
        )
    }
}

/// A named unit of sequential steps with declared dependencies
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job name
    pub name: String,

    /// Jobs that must succeed before this one starts
    pub needs: Vec<String>,

    /// Ordered steps
    pub steps: Vec<Step>,

    /// Environment variables for every step of this job
    pub env: HashMap<String, String>,

    /// Deploy spec; present on the gated deploy job only
    pub deploy: Option<DeploySpec>,

    /// Runtime status
    pub status: JobStatus,
}

/// Deploy configuration carried by the gated deploy job
#[derive(Debug, Clone)]
pub struct DeploySpec {
    pub registry: String,
    pub image: Option<ImageSpec>,
    pub remote: Option<RemoteSpec>,
}

#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub context: String,
    pub tag: String,
}

#[derive(Debug, Clone)]
pub struct RemoteSpec {
    pub host: String,
    pub command: String,
}

impl From<&DeployConfig> for DeploySpec {
    fn from(config: &DeployConfig) -> Self {
        DeploySpec {
            registry: config.registry.clone(),
            image: config.image.as_ref().map(|i: &ImageConfig| ImageSpec {
                context: i.context.clone(),
                tag: i.tag.clone(),
            }),
            remote: config.remote.as_ref().map(|r: &RemoteConfig| RemoteSpec {
                host: r.host.clone(),
                command: r.command.clone(),
            }),
        }
    }
}

impl Job {
    /// Create a job from a validated job config
    pub fn from_config(config: &JobConfig, defaults: &StepDefaults) -> Self {
        Job {
            name: config.name.clone(),
            needs: config.needs.clone(),
            steps: config
                .steps
                .iter()
                .map(|s| Step::from_config(s, defaults))
                .collect(),
            env: config.env.clone(),
            deploy: config.deploy.as_ref().map(DeploySpec::from),
            status: JobStatus::Pending,
        }
    }

    /// Check whether every declared dependency has succeeded
    pub fn needs_met(&self, succeeded: &HashSet<String>) -> bool {
        self.needs.iter().all(|dep| succeeded.contains(dep))
    }

    /// Whether this job is the gated deploy job
    pub fn is_deploy(&self) -> bool {
        self.deploy.is_some()
    }
}

/// Why a job failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// A step exited non-zero
    Step { step: String, exit_code: i32 },

    /// A step exceeded its timeout and was killed
    Timeout { step: String },

    /// The run was aborted while this job was unfinished
    Cancelled,

    /// The deploy trust gate refused to authenticate
    GateDenied,

    /// Engine-side error (spawn failure, collaborator I/O)
    Internal(String),
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Step { step, exit_code } => {
                write!(f, "step '{}' exited with code {}", step, exit_code)
            }
            FailureKind::Timeout { step } => write!(f, "step '{}' timed out", step),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::GateDenied => write!(f, "deploy gate denied"),
            FailureKind::Internal(reason) => write!(f, "internal error: {}", reason),
        }
    }
}

/// The read-only record produced when a job finishes
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Job name
    pub job: String,

    /// Terminal status (Succeeded or Failed)
    pub status: JobStatus,

    /// Failure detail when status is Failed
    pub failure: Option<FailureKind>,

    /// Concatenated output of all executed steps
    pub log: String,

    /// When the job started
    pub started_at: DateTime<Utc>,

    /// When the job finished
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    /// Wall-clock duration of the job
    pub fn duration(&self) -> std::time::Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }
}
