//! Pipeline execution engine

pub mod controller;
pub mod executor;
pub mod runner;
pub mod scheduler;

pub use controller::{EventHandler, ExecutionEvent, PipelineController, PipelineReport};
pub use executor::{CommandOutput, ExecError, StepExecutor};
pub use runner::{JobContext, JobRunner};
pub use scheduler::{DependencyScheduler, SchedulerEvent};
