//! Run lifecycle state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Overall outcome of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Success,
    Failure,
}

/// Phase of the whole run
///
/// Phases only move forward; a new run is a fresh state with a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunPhase {
    /// Nothing loaded yet
    Idle,
    /// Parsing and validating the definition
    Loading,
    /// Building the job graph
    Scheduling,
    /// Jobs are executing
    Running,
    /// Terminal: every job terminal, none failed
    CompletedSuccess,
    /// Terminal: at least one job failed, or the run was aborted
    CompletedFailure,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::CompletedSuccess | RunPhase::CompletedFailure)
    }
}

/// State of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique run ID
    pub run_id: Uuid,

    /// Current phase
    pub phase: RunPhase,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed
    pub completed_at: Option<DateTime<Utc>>,

    /// Total number of jobs
    pub total_jobs: usize,

    /// Number of succeeded jobs
    pub succeeded_jobs: usize,

    /// Number of failed jobs
    pub failed_jobs: usize,

    /// Number of skipped jobs
    pub skipped_jobs: usize,

    /// Number of currently running jobs
    pub running_jobs: usize,
}

impl PipelineState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase: RunPhase::Idle,
            started_at: None,
            completed_at: None,
            total_jobs: 0,
            succeeded_jobs: 0,
            failed_jobs: 0,
            skipped_jobs: 0,
            running_jobs: 0,
        }
    }

    /// Enter the Loading phase
    pub fn begin_loading(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Loading;
        }
    }

    /// Enter the Scheduling phase
    pub fn begin_scheduling(&mut self, total_jobs: usize) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Scheduling;
            self.total_jobs = total_jobs;
        }
    }

    /// Enter the Running phase
    pub fn begin_running(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = RunPhase::Running;
            self.started_at = Some(Utc::now());
        }
    }

    /// Enter a terminal phase
    pub fn complete(&mut self, status: OverallStatus) {
        if !self.phase.is_terminal() {
            self.phase = match status {
                OverallStatus::Success => RunPhase::CompletedSuccess,
                OverallStatus::Failure => RunPhase::CompletedFailure,
            };
            self.completed_at = Some(Utc::now());
        }
    }

    /// Update job counts
    pub fn update_counts(
        &mut self,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        running: usize,
    ) {
        self.succeeded_jobs = succeeded;
        self.failed_jobs = failed;
        self.skipped_jobs = skipped;
        self.running_jobs = running;
    }

    /// Calculate progress percentage (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_jobs == 0 {
            return 0.0;
        }
        (self.succeeded_jobs + self.failed_jobs + self.skipped_jobs) as f64
            / self.total_jobs as f64
    }

    /// Overall status implied by a terminal phase
    pub fn overall(&self) -> Option<OverallStatus> {
        match self.phase {
            RunPhase::CompletedSuccess => Some(OverallStatus::Success),
            RunPhase::CompletedFailure => Some(OverallStatus::Failure),
            _ => None,
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}
