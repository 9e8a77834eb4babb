//! conveyor - a self-hosted CI/CD pipeline orchestration engine

pub mod cache;
pub mod cli;
pub mod collab;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use cache::{CacheStore, RestoredEntry};
pub use collab::{ContainerBuilder, DeployGate, Secrets, Session, VcsProvider};
pub use core::{
    config::{ConfigError, PipelineConfig},
    FailureKind, Job, JobStatus, OverallStatus, Pipeline, RunResult, Step, StepKind,
};
pub use execution::{
    ExecutionEvent, JobContext, JobRunner, PipelineController, PipelineReport, StepExecutor,
};
