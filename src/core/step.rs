//! Step domain model

use crate::core::config::{BuiltinKind, CacheSpecConfig, StepConfig};
use std::collections::HashMap;

/// A single step in a job
#[derive(Debug, Clone)]
pub struct Step {
    /// Step name
    pub name: String,

    /// What this step does when dispatched by the job runner
    pub kind: StepKind,

    /// Timeout in seconds
    pub timeout_secs: u64,

    /// Extra environment variables for this step
    pub env: HashMap<String, String>,
}

/// The runner's dispatch table: hosted-style `uses:` actions become
/// builtin variants, everything else is a shell command.
#[derive(Debug, Clone)]
pub enum StepKind {
    /// Fetch the source tree via the VCS collaborator
    Checkout { reference: Option<String> },

    /// Restore a dependency cache (miss is not an error)
    CacheRestore(CacheSpec),

    /// Save a dependency cache (last writer wins)
    CacheSave(CacheSpec),

    /// Run a shell command through the step executor
    Run { command: String },
}

/// Cache key spec carried by the cache builtins
#[derive(Debug, Clone)]
pub struct CacheSpec {
    /// Key template; `{{ hashFiles('...') }}` segments are digested at run time
    pub key: String,

    /// Prefixes tried in order when the exact key misses
    pub restore_keys: Vec<String>,

    /// Path (relative to the job workspace) to cache
    pub path: String,
}

impl From<&CacheSpecConfig> for CacheSpec {
    fn from(config: &CacheSpecConfig) -> Self {
        CacheSpec {
            key: config.key.clone(),
            restore_keys: config.restore_keys.clone(),
            path: config.path.clone(),
        }
    }
}

/// Defaults applied to steps that don't override them
#[derive(Debug, Clone)]
pub struct StepDefaults {
    pub timeout_secs: u64,
}

impl Default for StepDefaults {
    fn default() -> Self {
        Self {
            timeout_secs: 600, // 10 minutes
        }
    }
}

impl Step {
    /// Create a step from a validated step config
    pub fn from_config(config: &StepConfig, defaults: &StepDefaults) -> Self {
        // Validation guarantees cache builtins carry a cache block
        let cache_spec = || {
            config
                .cache
                .as_ref()
                .map(CacheSpec::from)
                .unwrap_or(CacheSpec {
                    key: String::new(),
                    restore_keys: Vec::new(),
                    path: String::new(),
                })
        };

        let kind = match (&config.run, config.uses) {
            (Some(command), None) => StepKind::Run {
                command: command.clone(),
            },
            (None, Some(BuiltinKind::Checkout)) => StepKind::Checkout {
                reference: config.reference.clone(),
            },
            (None, Some(BuiltinKind::CacheRestore)) => StepKind::CacheRestore(cache_spec()),
            (None, Some(BuiltinKind::CacheSave)) => StepKind::CacheSave(cache_spec()),
            // Unreachable after validation; treat as a no-op command
            _ => StepKind::Run {
                command: "true".to_string(),
            },
        };

        Step {
            name: config.name.clone(),
            kind,
            timeout_secs: config.timeout_secs.unwrap_or(defaults.timeout_secs),
            env: config.env.clone(),
        }
    }

    /// Whether this step runs an external command (as opposed to a builtin)
    pub fn is_command(&self) -> bool {
        matches!(self.kind, StepKind::Run { .. })
    }
}
