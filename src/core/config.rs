//! Pipeline configuration from YAML

use crate::core::Pipeline;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Errors produced while loading or validating a pipeline definition.
///
/// All of these are fatal before any job runs; the CLI maps them to exit
/// code 2.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read pipeline file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pipeline YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Duplicate job name: {0}")]
    DuplicateJob(String),

    #[error("Job '{job}' needs unknown job '{needs}'")]
    UnknownDependency { job: String, needs: String },

    #[error("Cycle detected in job dependencies involving '{0}'")]
    Cycle(String),

    #[error("Job '{job}', step '{step}': {reason}")]
    MalformedStep {
        job: String,
        step: String,
        reason: String,
    },

    #[error("Job '{job}' declares neither steps nor a deploy block")]
    EmptyJob { job: String },

    #[error("More than one deploy job declared ('{first}' and '{second}')")]
    MultipleDeployJobs { first: String, second: String },
}

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Pipeline version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Repository to check out (path or URL); defaults to the current directory
    #[serde(default)]
    pub repository: Option<String>,

    /// Maximum number of jobs to run concurrently
    #[serde(default)]
    pub max_parallel: Option<usize>,

    /// Default timeout for steps (in seconds)
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Environment variables available to all jobs
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Pipeline jobs
    pub jobs: Vec<JobConfig>,
}

/// Job configuration as defined in YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Unique job name
    pub name: String,

    /// Names of jobs that must succeed before this one starts
    #[serde(default)]
    pub needs: Vec<String>,

    /// Ordered steps; all must succeed for the job to succeed
    #[serde(default)]
    pub steps: Vec<StepConfig>,

    /// Environment variables for every step of this job
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Present on the gated deploy job only
    #[serde(default)]
    pub deploy: Option<DeployConfig>,
}

/// Step configuration as defined in YAML
///
/// Exactly one of `run` (a shell command) or `uses` (a builtin step kind)
/// must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Human-readable step name
    pub name: String,

    /// Shell command to execute
    #[serde(default)]
    pub run: Option<String>,

    /// Builtin step kind (checkout / cache-restore / cache-save)
    #[serde(default)]
    pub uses: Option<BuiltinKind>,

    /// Ref to check out (checkout builtin only)
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,

    /// Cache key spec (cache builtins only)
    #[serde(default)]
    pub cache: Option<CacheSpecConfig>,

    /// Timeout for this step (overrides the pipeline default)
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Extra environment variables for this step
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Builtin step kinds, the engine's stand-in for hosted `uses:` actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuiltinKind {
    Checkout,
    CacheRestore,
    CacheSave,
}

/// Cache key specification for cache builtins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSpecConfig {
    /// Key template; may contain `{{ hashFiles('Cargo.lock') }}` segments
    pub key: String,

    /// Prefixes tried in order when the exact key misses
    #[serde(default)]
    pub restore_keys: Vec<String>,

    /// Path (relative to the job workspace) to cache
    pub path: String,
}

/// Deploy block marking a job as the gated deploy job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Registry the trust gate authenticates against
    pub registry: String,

    /// Image to build and push after the gate passes
    #[serde(default)]
    pub image: Option<ImageConfig>,

    /// Command to run on the deploy target after the push
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

/// Container image build configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Build context directory
    pub context: String,

    /// Image tag
    pub tag: String,
}

/// Remote execution target for the deploy job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Host (user@host form accepted)
    pub host: String,

    /// Command to run on the host
    pub command: String,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the pipeline configuration
    ///
    /// Runs fully before any execution: duplicate job names, unknown
    /// `needs` references, malformed steps and dependency cycles are all
    /// rejected here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Job names must be unique
        let mut seen = std::collections::HashSet::new();
        for job in &self.jobs {
            if !seen.insert(job.name.as_str()) {
                return Err(ConfigError::DuplicateJob(job.name.clone()));
            }
        }

        // All `needs` must reference existing jobs
        let job_names: std::collections::HashSet<_> =
            self.jobs.iter().map(|j| j.name.as_str()).collect();
        let mut deploy_job: Option<&str> = None;
        for job in &self.jobs {
            for dep in &job.needs {
                if !job_names.contains(dep.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        job: job.name.clone(),
                        needs: dep.clone(),
                    });
                }
            }

            if job.steps.is_empty() && job.deploy.is_none() {
                return Err(ConfigError::EmptyJob {
                    job: job.name.clone(),
                });
            }

            if job.deploy.is_some() {
                if let Some(first) = deploy_job {
                    return Err(ConfigError::MultipleDeployJobs {
                        first: first.to_string(),
                        second: job.name.clone(),
                    });
                }
                deploy_job = Some(&job.name);
            }

            for step in &job.steps {
                Self::validate_step(&job.name, step)?;
            }
        }

        self.check_cycles()?;

        Ok(())
    }

    fn validate_step(job: &str, step: &StepConfig) -> Result<(), ConfigError> {
        let malformed = |reason: &str| ConfigError::MalformedStep {
            job: job.to_string(),
            step: step.name.clone(),
            reason: reason.to_string(),
        };

        match (&step.run, &step.uses) {
            (Some(_), Some(_)) => {
                return Err(malformed("declares both 'run' and 'uses'"));
            }
            (None, None) => {
                return Err(malformed("declares neither 'run' nor 'uses'"));
            }
            _ => {}
        }

        match step.uses {
            Some(BuiltinKind::CacheRestore) | Some(BuiltinKind::CacheSave) => {
                if step.cache.is_none() {
                    return Err(malformed("cache builtin requires a 'cache' block"));
                }
            }
            Some(BuiltinKind::Checkout) => {
                if step.cache.is_some() {
                    return Err(malformed("checkout does not take a 'cache' block"));
                }
            }
            None => {
                if step.cache.is_some() {
                    return Err(malformed("'cache' is only valid on cache builtins"));
                }
                if step.reference.is_some() {
                    return Err(malformed("'ref' is only valid on the checkout builtin"));
                }
            }
        }

        Ok(())
    }

    /// Check for cycles in the job dependency graph
    fn check_cycles(&self) -> Result<(), ConfigError> {
        let mut visited = std::collections::HashSet::new();
        let mut recursion_stack = std::collections::HashSet::new();

        for job in &self.jobs {
            if !visited.contains(&job.name) {
                self.dfs_check(&job.name, &mut visited, &mut recursion_stack)?;
            }
        }

        Ok(())
    }

    fn dfs_check(
        &self,
        job_name: &str,
        visited: &mut std::collections::HashSet<String>,
        recursion_stack: &mut std::collections::HashSet<String>,
    ) -> Result<(), ConfigError> {
        visited.insert(job_name.to_string());
        recursion_stack.insert(job_name.to_string());

        if let Some(job) = self.jobs.iter().find(|j| j.name == job_name) {
            for dep in &job.needs {
                if recursion_stack.contains(dep) {
                    return Err(ConfigError::Cycle(dep.clone()));
                }
                if !visited.contains(dep) {
                    self.dfs_check(dep, visited, recursion_stack)?;
                }
            }
        }

        recursion_stack.remove(job_name);
        Ok(())
    }

    /// Convert config to a Pipeline domain model
    pub fn to_pipeline(&self) -> Pipeline {
        Pipeline::from_config(self)
    }
}
