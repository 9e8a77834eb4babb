//! Persistence layer for pipeline run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunStore;

use crate::core::{OverallStatus, Pipeline};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique run ID
    pub run_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Overall outcome
    pub status: OverallStatus,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run completed
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of succeeded jobs
    pub succeeded_jobs: usize,

    /// Number of failed jobs
    pub failed_jobs: usize,

    /// Number of skipped jobs
    pub skipped_jobs: usize,

    /// Total number of jobs
    pub total_jobs: usize,
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save a pipeline run
    async fn save_run(&self, record: &RunRecord) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunRecord>>;

    /// List all runs for a pipeline
    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunRecord>>;

    /// List all pipeline names
    async fn list_pipelines(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryStore {
    runs: tokio::sync::RwLock<std::collections::HashMap<Uuid, RunRecord>>,
    by_pipeline: tokio::sync::RwLock<std::collections::HashMap<String, Vec<Uuid>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            runs: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            by_pipeline: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryStore {
    async fn save_run(&self, record: &RunRecord) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(record.run_id, record.clone());

        let mut by_pipeline = self.by_pipeline.write().await;
        by_pipeline
            .entry(record.pipeline_name.clone())
            .or_insert_with(Vec::new)
            .push(record.run_id);

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, pipeline_name: &str) -> Result<Vec<RunRecord>> {
        let runs = self.runs.read().await;
        let by_pipeline = self.by_pipeline.read().await;

        if let Some(ids) = by_pipeline.get(pipeline_name) {
            let mut result = Vec::new();
            for id in ids {
                if let Some(record) = runs.get(id) {
                    result.push(record.clone());
                }
            }
            Ok(result)
        } else {
            Ok(Vec::new())
        }
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let by_pipeline = self.by_pipeline.read().await;
        Ok(by_pipeline.keys().cloned().collect())
    }
}

/// Create a run record from a finished pipeline
pub fn record_from(pipeline: &Pipeline) -> RunRecord {
    RunRecord {
        run_id: pipeline.state.run_id,
        pipeline_name: pipeline.name.clone(),
        status: pipeline.state.overall().unwrap_or(OverallStatus::Failure),
        started_at: pipeline.state.started_at.unwrap_or_else(Utc::now),
        completed_at: pipeline.state.completed_at,
        succeeded_jobs: pipeline.state.succeeded_jobs,
        failed_jobs: pipeline.state.failed_jobs,
        skipped_jobs: pipeline.state.skipped_jobs,
        total_jobs: pipeline.state.total_jobs,
    }
}
