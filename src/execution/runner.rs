//! Job runner - executes one job's steps in order, fail-fast

use crate::{
    cache::{render_key, CacheStore},
    collab::{mask_secrets, VcsProvider},
    core::{
        job::{FailureKind, Job, JobStatus, RunResult},
        step::{CacheSpec, Step, StepKind},
    },
    execution::executor::{ExecError, StepExecutor},
};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Per-run context shared by every job
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    /// Pipeline-level environment
    pub env: HashMap<String, String>,

    /// Working directory jobs start in (checkout steps switch it)
    pub workdir: PathBuf,

    /// Extra environment overlaid last (the deploy session env)
    pub extra_env: HashMap<String, String>,
}

impl JobContext {
    pub fn new(env: HashMap<String, String>, workdir: PathBuf) -> Self {
        Self {
            env,
            workdir,
            extra_env: HashMap::new(),
        }
    }

    /// Same context with a session environment overlaid
    pub fn with_extra_env(&self, extra_env: HashMap<String, String>) -> Self {
        Self {
            env: self.env.clone(),
            workdir: self.workdir.clone(),
            extra_env,
        }
    }
}

/// Executes jobs: steps strictly in declared order, first failure marks
/// the job Failed and skips the rest.
pub struct JobRunner {
    executor: StepExecutor,
    cache: Arc<CacheStore>,
    vcs: Arc<dyn VcsProvider>,
    masked_values: Vec<String>,
}

/// Outcome of a single dispatched step
enum StepOutcome {
    Ok,
    Failed(FailureKind),
}

impl JobRunner {
    pub fn new(
        executor: StepExecutor,
        cache: Arc<CacheStore>,
        vcs: Arc<dyn VcsProvider>,
    ) -> Self {
        Self {
            executor,
            cache,
            vcs,
            masked_values: Vec::new(),
        }
    }

    /// Secret values scrubbed from every captured log
    pub fn with_masked_values(mut self, values: Vec<String>) -> Self {
        self.masked_values = values;
        self
    }

    /// Run a job to completion and produce its read-only result
    pub async fn run(&self, job: &Job, ctx: &JobContext) -> RunResult {
        let started_at = Utc::now();
        let mut log = String::new();
        let mut workdir = ctx.workdir.clone();

        info!(job = %job.name, steps = job.steps.len(), "Job started");

        for (index, step) in job.steps.iter().enumerate() {
            log.push_str(&format!("--- step: {} ---\n", step.name));

            let outcome = self
                .dispatch(job, step, ctx, &mut workdir, &mut log)
                .await;

            if let StepOutcome::Failed(failure) = outcome {
                let remaining = job.steps.len() - index - 1;
                if remaining > 0 {
                    log.push_str(&format!(
                        "Skipping {} remaining step(s) after failure\n",
                        remaining
                    ));
                }
                warn!(job = %job.name, step = %step.name, %failure, "Job failed");
                return RunResult {
                    job: job.name.clone(),
                    status: JobStatus::Failed,
                    failure: Some(failure),
                    log,
                    started_at,
                    finished_at: Utc::now(),
                };
            }
        }

        info!(job = %job.name, "Job succeeded");
        RunResult {
            job: job.name.clone(),
            status: JobStatus::Succeeded,
            failure: None,
            log,
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// The dispatch table over builtin step kinds
    async fn dispatch(
        &self,
        job: &Job,
        step: &Step,
        ctx: &JobContext,
        workdir: &mut PathBuf,
        log: &mut String,
    ) -> StepOutcome {
        match &step.kind {
            StepKind::Checkout { reference } => {
                self.run_checkout(reference.as_deref(), workdir, log).await
            }
            StepKind::CacheRestore(spec) => self.run_cache_restore(spec, workdir, log).await,
            StepKind::CacheSave(spec) => self.run_cache_save(spec, workdir, log).await,
            StepKind::Run { command } => {
                let env = self.step_env(job, step, ctx);
                self.run_command(step, command, &env, workdir, log).await
            }
        }
    }

    /// Environment layering: pipeline < job < step < session
    fn step_env(&self, job: &Job, step: &Step, ctx: &JobContext) -> HashMap<String, String> {
        let mut env = ctx.env.clone();
        env.extend(job.env.clone());
        env.extend(step.env.clone());
        env.extend(ctx.extra_env.clone());
        env
    }

    async fn run_checkout(
        &self,
        reference: Option<&str>,
        workdir: &mut PathBuf,
        log: &mut String,
    ) -> StepOutcome {
        let reference = reference.unwrap_or("HEAD");
        match self.vcs.checkout(reference).await {
            Ok(path) => {
                log.push_str(&format!(
                    "Checked out '{}' into {}\n",
                    reference,
                    path.display()
                ));
                *workdir = path;
                StepOutcome::Ok
            }
            Err(e) => {
                log.push_str(&format!("Checkout failed: {}\n", e));
                StepOutcome::Failed(FailureKind::Internal(e.to_string()))
            }
        }
    }

    /// A miss is never an error: the job builds from scratch.
    async fn run_cache_restore(
        &self,
        spec: &CacheSpec,
        workdir: &Path,
        log: &mut String,
    ) -> StepOutcome {
        let key = render_key(&spec.key, workdir);

        let entry = match self.cache.restore(&key, &spec.restore_keys).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                log.push_str(&format!(
                    "Cache miss for key '{}', building from scratch\n",
                    key
                ));
                return StepOutcome::Ok;
            }
            Err(e) => {
                warn!(key, error = %e, "Cache restore error, treating as miss");
                log.push_str(&format!("Cache unavailable ({}), building from scratch\n", e));
                return StepOutcome::Ok;
            }
        };

        let archive = std::env::temp_dir().join(format!("conveyor-restore-{}", Uuid::new_v4()));
        let unpack = async {
            tokio::fs::write(&archive, &entry.payload).await?;
            let command = format!("tar -xzf '{}'", archive.display());
            self.executor
                .execute(&command, 600, workdir, &HashMap::new())
                .await
                .map_err(|e| std::io::Error::other(e.to_string()))
        }
        .await;
        let _ = tokio::fs::remove_file(&archive).await;

        match unpack {
            Ok(output) if output.success() => {
                log.push_str(&format!(
                    "Cache {} for key '{}' ({} bytes)\n",
                    if entry.exact { "hit" } else { "restored from prefix" },
                    entry.key,
                    entry.payload.len()
                ));
                StepOutcome::Ok
            }
            _ => {
                // A corrupt archive degrades to a miss
                warn!(key = %entry.key, "Cache entry could not be unpacked, ignoring");
                log.push_str("Cached archive unusable, building from scratch\n");
                StepOutcome::Ok
            }
        }
    }

    /// Save failures are warnings: the build result stands either way.
    async fn run_cache_save(
        &self,
        spec: &CacheSpec,
        workdir: &Path,
        log: &mut String,
    ) -> StepOutcome {
        let key = render_key(&spec.key, workdir);
        let archive = std::env::temp_dir().join(format!("conveyor-save-{}", Uuid::new_v4()));

        let command = format!("tar -czf '{}' '{}'", archive.display(), spec.path);
        let packed = self
            .executor
            .execute(&command, 600, workdir, &HashMap::new())
            .await;

        match packed {
            Ok(output) if output.success() => match tokio::fs::read(&archive).await {
                Ok(payload) => {
                    let bytes = payload.len();
                    if let Err(e) = self.cache.put(&key, &payload).await {
                        warn!(key, error = %e, "Cache save failed");
                        log.push_str(&format!("Cache save failed: {}\n", e));
                    } else {
                        log.push_str(&format!(
                            "Saved cache key '{}' ({} bytes)\n",
                            key, bytes
                        ));
                    }
                }
                Err(e) => {
                    warn!(key, error = %e, "Cache archive unreadable");
                    log.push_str(&format!("Cache save failed: {}\n", e));
                }
            },
            _ => {
                warn!(key, path = %spec.path, "Cache archive creation failed");
                log.push_str(&format!("Could not archive '{}' for caching\n", spec.path));
            }
        }

        let _ = tokio::fs::remove_file(&archive).await;
        StepOutcome::Ok
    }

    async fn run_command(
        &self,
        step: &Step,
        command: &str,
        env: &HashMap<String, String>,
        workdir: &Path,
        log: &mut String,
    ) -> StepOutcome {
        match self
            .executor
            .execute(command, step.timeout_secs, workdir, env)
            .await
        {
            Ok(output) => {
                log.push_str(&mask_secrets(&output.stdout, &self.masked_values));
                if !output.stderr.is_empty() {
                    log.push_str(&mask_secrets(&output.stderr, &self.masked_values));
                }

                if output.success() {
                    StepOutcome::Ok
                } else {
                    StepOutcome::Failed(FailureKind::Step {
                        step: step.name.clone(),
                        exit_code: output.exit_code,
                    })
                }
            }
            Err(ExecError::Timeout(secs)) => {
                log.push_str(&format!("Timed out after {} seconds\n", secs));
                StepOutcome::Failed(FailureKind::Timeout {
                    step: step.name.clone(),
                })
            }
            Err(ExecError::Cancelled) => {
                log.push_str("Cancelled\n");
                StepOutcome::Failed(FailureKind::Cancelled)
            }
            Err(e) => {
                log.push_str(&format!("Failed to execute: {}\n", e));
                StepOutcome::Failed(FailureKind::Internal(e.to_string()))
            }
        }
    }
}
