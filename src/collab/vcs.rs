//! Version control collaborator

use crate::collab::CollabError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::info;
use uuid::Uuid;

/// Provides source trees for checkout steps
#[async_trait]
pub trait VcsProvider: Send + Sync {
    /// Materialize the given ref and return the working tree path
    async fn checkout(&self, reference: &str) -> Result<PathBuf, CollabError>;
}

/// Git-backed provider that clones into a per-checkout directory
pub struct GitCheckout {
    repository: String,
    base: PathBuf,
}

impl GitCheckout {
    /// `repository` is a path or URL; `base` is where working trees land
    pub fn new(repository: impl Into<String>, base: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            base: base.into(),
        }
    }

    async fn git(args: &[&str]) -> Result<(), CollabError> {
        let output = Command::new("git").args(args).output().await?;
        if !output.status.success() {
            return Err(CollabError::Command {
                command: format!("git {}", args.join(" ")),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VcsProvider for GitCheckout {
    async fn checkout(&self, reference: &str) -> Result<PathBuf, CollabError> {
        let dest = self.base.join(format!("checkout-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&self.base).await?;

        let dest_str = dest.to_string_lossy().into_owned();
        Self::git(&["clone", &self.repository, &dest_str]).await?;

        if reference != "HEAD" {
            Self::git(&["-C", &dest_str, "checkout", reference]).await?;
        }

        info!(repository = %self.repository, reference, path = %dest.display(), "Checked out source");
        Ok(dest)
    }
}
