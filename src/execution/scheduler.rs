//! Dependency graph scheduler - runs independent jobs concurrently
//!
//! Ready jobs (every `needs` Succeeded) are dispatched into a JoinSet,
//! bounded by the parallelism limit. Results are applied in completion
//! order, which is not declaration order; the controller's overall-status
//! reduction doesn't care. A failure marks every transitive dependent
//! Skipped without executing it.

use crate::{
    core::{
        job::{FailureKind, JobStatus, RunResult},
        pipeline::Pipeline,
    },
    execution::runner::{JobContext, JobRunner},
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// What the scheduler tells its caller as the run unfolds
pub enum SchedulerEvent<'a> {
    JobStarted(&'a str),
    JobFinished(&'a RunResult),
    JobSkipped(&'a str),
}

/// Schedules jobs by declared `needs`, bounded by max parallelism
pub struct DependencyScheduler {
    max_parallel: usize,
}

impl DependencyScheduler {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Drive the graph until nothing more can run.
    ///
    /// Jobs named in `hold` are never dispatched here (the controller runs
    /// them after the deploy gate); they still get skip-propagation when a
    /// dependency fails. Returns results in completion order.
    pub async fn run(
        &self,
        pipeline: &mut Pipeline,
        runner: Arc<JobRunner>,
        ctx: &JobContext,
        hold: &HashSet<String>,
        cancel: &watch::Receiver<bool>,
        mut on_event: impl FnMut(SchedulerEvent<'_>),
    ) -> Vec<RunResult> {
        let mut results = Vec::new();
        let mut join_set: JoinSet<RunResult> = JoinSet::new();
        let mut in_flight = 0usize;

        loop {
            // Dispatch everything ready, up to the parallelism bound
            if !*cancel.borrow() {
                for name in pipeline.ready_jobs(hold) {
                    if in_flight >= self.max_parallel {
                        debug!(
                            max_parallel = self.max_parallel,
                            "Parallelism bound reached, deferring dispatch"
                        );
                        break;
                    }

                    if let Some(job) = pipeline.job_mut(&name) {
                        job.status = JobStatus::Running;
                        let snapshot = job.clone();
                        let runner = runner.clone();
                        let ctx = ctx.clone();
                        join_set.spawn(async move { runner.run(&snapshot, &ctx).await });
                        in_flight += 1;
                        on_event(SchedulerEvent::JobStarted(&name));
                    }
                }
            }
            pipeline.refresh_counts();

            if join_set.is_empty() {
                break;
            }

            // Wait for any in-flight job to complete
            match join_set.join_next().await {
                Some(Ok(result)) => {
                    in_flight -= 1;
                    self.apply(pipeline, &result, &mut on_event);
                    results.push(result);
                }
                Some(Err(e)) => {
                    // A panicked job task; fail what was running and stop
                    error!(error = %e, "Job task aborted unexpectedly");
                    in_flight = in_flight.saturating_sub(1);
                    for job in pipeline.jobs.values_mut() {
                        if job.status == JobStatus::Running {
                            job.status = JobStatus::Failed;
                        }
                    }
                    break;
                }
                None => break,
            }
        }

        // Abort: everything still pending is marked Failed (Cancelled)
        if *cancel.borrow() {
            results.extend(self.cancel_pending(pipeline, &mut on_event));
        }

        pipeline.refresh_counts();
        results
    }

    /// Record a completed job and propagate failure as skips
    fn apply(
        &self,
        pipeline: &mut Pipeline,
        result: &RunResult,
        on_event: &mut impl FnMut(SchedulerEvent<'_>),
    ) {
        if let Some(job) = pipeline.job_mut(&result.job) {
            job.status = result.status;
        }
        info!(job = %result.job, status = ?result.status, "Job finished");
        on_event(SchedulerEvent::JobFinished(result));

        if result.status == JobStatus::Failed {
            for name in pipeline.skip_blocked_jobs() {
                info!(job = %name, "Job skipped (dependency failed)");
                on_event(SchedulerEvent::JobSkipped(&name));
            }
        }
    }

    fn cancel_pending(
        &self,
        pipeline: &mut Pipeline,
        on_event: &mut impl FnMut(SchedulerEvent<'_>),
    ) -> Vec<RunResult> {
        let pending: Vec<String> = pipeline
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| j.name.clone())
            .collect();

        let mut results = Vec::new();
        for name in pending {
            if let Some(job) = pipeline.job_mut(&name) {
                job.status = JobStatus::Failed;
            }
            let now = Utc::now();
            let result = RunResult {
                job: name,
                status: JobStatus::Failed,
                failure: Some(FailureKind::Cancelled),
                log: String::new(),
                started_at: now,
                finished_at: now,
            };
            on_event(SchedulerEvent::JobFinished(&result));
            results.push(result);
        }
        results
    }
}
