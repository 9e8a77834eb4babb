//! Pipeline domain model

use crate::core::{
    config::PipelineConfig,
    job::{Job, JobStatus},
    state::{OverallStatus, PipelineState},
    step::StepDefaults,
};
use std::collections::{HashMap, HashSet};

/// Default parallelism bound when the definition doesn't set one
pub const DEFAULT_MAX_PARALLEL: usize = 4;

/// An immutable pipeline definition plus its run state
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Pipeline name
    pub name: String,

    /// Repository for checkout steps (path or URL)
    pub repository: Option<String>,

    /// Environment variables shared by all jobs
    pub env: HashMap<String, String>,

    /// Jobs keyed by name
    pub jobs: HashMap<String, Job>,

    /// Parallelism bound for the scheduler
    pub max_parallel: usize,

    /// Run state
    pub state: PipelineState,

    /// Job names in topological order (not serialized)
    execution_order: Vec<String>,
}

impl Pipeline {
    /// Create a pipeline from a validated configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let defaults = StepDefaults {
            timeout_secs: config.default_timeout_secs.unwrap_or(600),
        };

        let jobs: HashMap<String, Job> = config
            .jobs
            .iter()
            .map(|job_config| {
                let job = Job::from_config(job_config, &defaults);
                (job.name.clone(), job)
            })
            .collect();

        let execution_order = Self::topological_sort(&jobs);

        Pipeline {
            name: config.name.clone(),
            repository: config.repository.clone(),
            env: config.env.clone(),
            jobs,
            max_parallel: config.max_parallel.unwrap_or(DEFAULT_MAX_PARALLEL),
            state: PipelineState::new(),
            execution_order,
        }
    }

    /// Get a job by name
    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.get(name)
    }

    /// Get a mutable job by name
    pub fn job_mut(&mut self, name: &str) -> Option<&mut Job> {
        self.jobs.get_mut(name)
    }

    /// Names of jobs carrying a deploy block, in topological order
    pub fn deploy_jobs(&self) -> Vec<String> {
        self.execution_order
            .iter()
            .filter(|name| self.jobs.get(*name).is_some_and(|j| j.is_deploy()))
            .cloned()
            .collect()
    }

    /// Jobs ready to run: Pending, not held back, all `needs` Succeeded
    ///
    /// Returned in topological order so dispatch is deterministic.
    pub fn ready_jobs(&self, hold: &HashSet<String>) -> Vec<String> {
        let succeeded: HashSet<String> = self
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Succeeded)
            .map(|j| j.name.clone())
            .collect();

        self.execution_order
            .iter()
            .filter(|name| {
                !hold.contains(*name)
                    && self.jobs.get(*name).is_some_and(|j| {
                        j.status == JobStatus::Pending && j.needs_met(&succeeded)
                    })
            })
            .cloned()
            .collect()
    }

    /// Count of currently running jobs
    pub fn running_jobs(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .count()
    }

    /// Whether every job has reached a terminal status
    pub fn is_settled(&self) -> bool {
        self.jobs.values().all(|j| j.status.is_terminal())
    }

    /// Mark every Pending job transitively depending on a non-succeeded
    /// dependency as Skipped. Returns the names that were skipped.
    pub fn skip_blocked_jobs(&mut self) -> Vec<String> {
        let mut skipped = Vec::new();

        // Iterate to a fixpoint so skips propagate through chains
        loop {
            let blocked: Vec<String> = self
                .jobs
                .values()
                .filter(|j| {
                    j.status == JobStatus::Pending
                        && j.needs.iter().any(|dep| {
                            self.jobs.get(dep).is_some_and(|d| {
                                matches!(d.status, JobStatus::Failed | JobStatus::Skipped)
                            })
                        })
                })
                .map(|j| j.name.clone())
                .collect();

            if blocked.is_empty() {
                break;
            }

            for name in blocked {
                if let Some(job) = self.jobs.get_mut(&name) {
                    job.status = JobStatus::Skipped;
                }
                skipped.push(name);
            }
        }

        skipped
    }

    /// Overall status: Failure iff any job Failed.
    ///
    /// A pure reduction over terminal statuses; Skipped jobs do not count
    /// on their own (the failure that caused the skip already does).
    pub fn overall_status(&self) -> OverallStatus {
        if self.jobs.values().any(|j| j.status == JobStatus::Failed) {
            OverallStatus::Failure
        } else {
            OverallStatus::Success
        }
    }

    /// Update state counters from current job statuses
    pub fn refresh_counts(&mut self) {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut running = 0;

        for job in self.jobs.values() {
            match job.status {
                JobStatus::Succeeded => succeeded += 1,
                JobStatus::Failed => failed += 1,
                JobStatus::Skipped => skipped += 1,
                JobStatus::Running => running += 1,
                JobStatus::Pending => {}
            }
        }

        self.state.update_counts(succeeded, failed, skipped, running);
    }

    /// Get execution order (topological sort)
    pub fn execution_order(&self) -> &[String] {
        &self.execution_order
    }

    /// Calculate topological sort of jobs based on `needs`
    ///
    /// Cycles were already rejected at config validation.
    fn topological_sort(jobs: &HashMap<String, Job>) -> Vec<String> {
        let mut result = Vec::new();
        let mut visited = HashSet::new();

        // Sort for deterministic order
        let mut job_names: Vec<_> = jobs.keys().cloned().collect();
        job_names.sort();

        for name in job_names {
            if !visited.contains(&name) {
                Self::visit(&name, jobs, &mut visited, &mut result);
            }
        }

        result
    }

    fn visit(
        name: &str,
        jobs: &HashMap<String, Job>,
        visited: &mut HashSet<String>,
        result: &mut Vec<String>,
    ) {
        if visited.contains(name) {
            return;
        }
        visited.insert(name.to_string());

        if let Some(job) = jobs.get(name) {
            for dep in &job.needs {
                Self::visit(dep, jobs, visited, result);
            }
        }

        result.push(name.to_string());
    }
}
