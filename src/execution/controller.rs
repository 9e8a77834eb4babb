//! Pipeline controller - top-level entry that drives a whole run

use crate::{
    collab::{mask_secrets, ContainerBuilder, DeployGate, GateError},
    core::{
        job::{DeploySpec, FailureKind, Job, JobStatus, RunResult},
        pipeline::Pipeline,
        state::OverallStatus,
    },
    execution::{
        runner::{JobContext, JobRunner},
        scheduler::{DependencyScheduler, SchedulerEvent},
    },
};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted while a pipeline runs
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        run_id: Uuid,
        pipeline_name: String,
    },
    JobStarted {
        job: String,
    },
    JobSucceeded {
        job: String,
        duration_ms: u64,
    },
    JobFailed {
        job: String,
        failure: String,
    },
    JobSkipped {
        job: String,
    },
    GatePassed {
        job: String,
        registry: String,
    },
    GateDenied {
        job: String,
        registry: String,
        reason: String,
    },
    PipelineCompleted {
        run_id: Uuid,
        status: OverallStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Everything a finished run knows about itself
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub status: OverallStatus,
    pub results: Vec<RunResult>,
}

/// Drives the scheduler, enforces the deploy gate, reduces the overall
/// status and fans events out to handlers.
pub struct PipelineController {
    runner: Arc<JobRunner>,
    gate: Arc<dyn DeployGate>,
    container: Arc<dyn ContainerBuilder>,
    event_handlers: Mutex<Vec<EventHandler>>,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
    secret_values: Vec<String>,
}

impl PipelineController {
    /// `cancel` must be the same channel the runner's executor watches,
    /// so `abort` reaches in-flight steps.
    pub fn new(
        runner: Arc<JobRunner>,
        gate: Arc<dyn DeployGate>,
        container: Arc<dyn ContainerBuilder>,
        cancel: (watch::Sender<bool>, watch::Receiver<bool>),
        secret_values: Vec<String>,
    ) -> Self {
        Self {
            runner,
            gate,
            container,
            event_handlers: Mutex::new(Vec::new()),
            cancel_tx: cancel.0,
            cancel_rx: cancel.1,
            secret_values,
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers
            .lock()
            .expect("event handler lock poisoned")
            .push(Arc::new(handler));
    }

    fn emit(&self, event: ExecutionEvent) {
        let handlers = self
            .event_handlers
            .lock()
            .expect("event handler lock poisoned");
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Ask every in-flight step executor to terminate; unfinished jobs
    /// end up Failed with a Cancelled kind.
    pub fn abort(&self) {
        warn!("Abort requested");
        let _ = self.cancel_tx.send(true);
    }

    /// Execute the entire pipeline and reduce the overall status
    pub async fn run(&self, pipeline: &mut Pipeline, ctx: &JobContext) -> PipelineReport {
        let run_id = pipeline.state.run_id;
        info!(pipeline = %pipeline.name, %run_id, "Starting pipeline run");

        self.emit(ExecutionEvent::PipelineStarted {
            run_id,
            pipeline_name: pipeline.name.clone(),
        });

        pipeline.state.begin_loading();
        pipeline.state.begin_scheduling(pipeline.jobs.len());

        // Deploy jobs wait for the trust gate
        let hold: HashSet<String> = pipeline.deploy_jobs().into_iter().collect();
        let scheduler = DependencyScheduler::new(pipeline.max_parallel);

        pipeline.state.begin_running();
        let mut results = scheduler
            .run(
                pipeline,
                self.runner.clone(),
                ctx,
                &hold,
                &self.cancel_rx,
                |event| self.emit_scheduler_event(event),
            )
            .await;

        // Gate phase: deploy jobs whose needs all succeeded
        for name in pipeline.deploy_jobs() {
            let job = match pipeline.job(&name) {
                Some(job) if job.status == JobStatus::Pending => job.clone(),
                _ => continue, // skipped via a failed need, or cancelled
            };

            self.emit(ExecutionEvent::JobStarted {
                job: name.clone(),
            });
            let result = self.run_deploy_job(&job, ctx).await;
            if let Some(job) = pipeline.job_mut(&name) {
                job.status = result.status;
            }
            self.emit_finished(&result);
            if result.status == JobStatus::Failed {
                for skipped in pipeline.skip_blocked_jobs() {
                    self.emit(ExecutionEvent::JobSkipped { job: skipped });
                }
            }
            results.push(result);
        }

        // Jobs depending on a deploy job become schedulable only now
        if !pipeline.is_settled() {
            results.extend(
                scheduler
                    .run(
                        pipeline,
                        self.runner.clone(),
                        ctx,
                        &HashSet::new(),
                        &self.cancel_rx,
                        |event| self.emit_scheduler_event(event),
                    )
                    .await,
            );
        }

        pipeline.refresh_counts();
        let status = pipeline.overall_status();
        pipeline.state.complete(status);

        info!(pipeline = %pipeline.name, ?status, "Pipeline run finished");
        self.emit(ExecutionEvent::PipelineCompleted { run_id, status });

        PipelineReport { status, results }
    }

    fn emit_scheduler_event(&self, event: SchedulerEvent<'_>) {
        match event {
            SchedulerEvent::JobStarted(job) => self.emit(ExecutionEvent::JobStarted {
                job: job.to_string(),
            }),
            SchedulerEvent::JobFinished(result) => self.emit_finished(result),
            SchedulerEvent::JobSkipped(job) => self.emit(ExecutionEvent::JobSkipped {
                job: job.to_string(),
            }),
        }
    }

    fn emit_finished(&self, result: &RunResult) {
        if result.succeeded() {
            self.emit(ExecutionEvent::JobSucceeded {
                job: result.job.clone(),
                duration_ms: result.duration().as_millis() as u64,
            });
        } else {
            self.emit(ExecutionEvent::JobFailed {
                job: result.job.clone(),
                failure: result
                    .failure
                    .as_ref()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }
    }

    /// The only point where secret material is consulted: authenticate,
    /// then build/push/remote-execute, then any declared steps with the
    /// opaque session env.
    async fn run_deploy_job(&self, job: &Job, ctx: &JobContext) -> RunResult {
        let started_at = Utc::now();
        let mut log = String::new();

        let spec = match &job.deploy {
            Some(spec) => spec.clone(),
            None => {
                // Deploy jobs always carry a spec; guard anyway
                return self.runner.run(job, ctx).await;
            }
        };

        let session = match self.gate.authenticate(&spec.registry).await {
            Ok(session) => {
                self.emit(ExecutionEvent::GatePassed {
                    job: job.name.clone(),
                    registry: spec.registry.clone(),
                });
                log.push_str(&format!("Authenticated against {}\n", spec.registry));
                session
            }
            Err(e) => {
                let reason = mask_secrets(&e.to_string(), &self.secret_values);
                warn!(job = %job.name, registry = %spec.registry, %reason, "Deploy gate denied");
                self.emit(ExecutionEvent::GateDenied {
                    job: job.name.clone(),
                    registry: spec.registry.clone(),
                    reason: reason.clone(),
                });
                log.push_str(&format!("Deploy gate denied: {}\n", reason));
                return RunResult {
                    job: job.name.clone(),
                    status: JobStatus::Failed,
                    failure: Some(FailureKind::GateDenied),
                    log,
                    started_at,
                    finished_at: Utc::now(),
                };
            }
        };

        if let Some(failure) = self
            .deploy_collaborators(&spec, ctx, &session, &mut log)
            .await
        {
            return RunResult {
                job: job.name.clone(),
                status: JobStatus::Failed,
                failure: Some(failure),
                log,
                started_at,
                finished_at: Utc::now(),
            };
        }

        // Declared steps run last, with the session env injected
        if !job.steps.is_empty() {
            let step_ctx = ctx.with_extra_env(session.env().clone());
            let mut result = self.runner.run(job, &step_ctx).await;
            result.log = format!("{}{}", log, result.log);
            result.started_at = started_at;
            return result;
        }

        RunResult {
            job: job.name.clone(),
            status: JobStatus::Succeeded,
            failure: None,
            log,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Container build/push and remote execution for the deploy spec
    async fn deploy_collaborators(
        &self,
        spec: &DeploySpec,
        ctx: &JobContext,
        session: &crate::collab::Session,
        log: &mut String,
    ) -> Option<FailureKind> {
        if let Some(image) = &spec.image {
            let context = ctx.workdir.join(&image.context);
            let built = match self.container.build(&context, &image.tag).await {
                Ok(id) => {
                    log.push_str(&format!("Built image {}\n", id));
                    id
                }
                Err(e) => {
                    log.push_str(&format!("Image build failed: {}\n", e));
                    return Some(FailureKind::Step {
                        step: "docker-build".to_string(),
                        exit_code: e.exit_code(),
                    });
                }
            };

            if let Err(e) = self
                .container
                .push(&built, &spec.registry, session)
                .await
            {
                log.push_str(&format!("Image push failed: {}\n", e));
                return Some(FailureKind::Step {
                    step: "push".to_string(),
                    exit_code: e.exit_code(),
                });
            }
            log.push_str(&format!("Pushed {} to {}\n", built, spec.registry));
        }

        if let Some(remote) = &spec.remote {
            match self
                .gate
                .remote_execute(&remote.host, &remote.command, session)
                .await
            {
                Ok(0) => {
                    log.push_str(&format!("Remote deploy on {} succeeded\n", remote.host));
                }
                Ok(exit_code) => {
                    log.push_str(&format!(
                        "Remote deploy on {} exited with {}\n",
                        remote.host, exit_code
                    ));
                    return Some(FailureKind::Step {
                        step: "remote-deploy".to_string(),
                        exit_code,
                    });
                }
                Err(GateError::Denied(reason)) => {
                    log.push_str(&format!("Remote deploy denied: {}\n", reason));
                    return Some(FailureKind::GateDenied);
                }
                Err(e) => {
                    log.push_str(&format!("Remote deploy failed: {}\n", e));
                    return Some(FailureKind::Internal(e.to_string()));
                }
            }
        }

        None
    }
}
