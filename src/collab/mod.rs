//! External collaborators
//!
//! The engine reaches the outside world (version control, the container
//! toolchain, the deploy target) only through the traits defined here, so
//! tests can substitute mocks and the core stays free of side effects it
//! doesn't own.

pub mod container;
pub mod gate;
pub mod vcs;

use thiserror::Error;

pub use container::{ContainerBuilder, DockerCli, ImageId};
pub use gate::{mask_secrets, DeployGate, GateError, ProcessDeployGate, Secret, Secrets, Session};
pub use vcs::{GitCheckout, VcsProvider};

/// Errors from subprocess-backed collaborators
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("Command '{command}' exited with code {exit_code}: {stderr}")]
    Command {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollabError {
    /// Exit code of the failing command, if there was one
    pub fn exit_code(&self) -> i32 {
        match self {
            CollabError::Command { exit_code, .. } => *exit_code,
            CollabError::Io(_) => -1,
        }
    }
}
