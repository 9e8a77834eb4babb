//! Container build collaborator

use crate::collab::{gate::Session, CollabError};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Identifier of a built image (the tag for CLI-backed builds)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageId(pub String);

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds and pushes container images for the deploy job
#[async_trait]
pub trait ContainerBuilder: Send + Sync {
    /// Build an image from a context directory
    async fn build(&self, context: &Path, tag: &str) -> Result<ImageId, CollabError>;

    /// Push a built image to a registry; requires an authenticated session
    async fn push(
        &self,
        image: &ImageId,
        registry: &str,
        session: &Session,
    ) -> Result<(), CollabError>;
}

/// Docker-CLI-backed builder
pub struct DockerCli;

impl DockerCli {
    async fn docker(args: &[&str]) -> Result<(), CollabError> {
        let output = Command::new("docker").args(args).output().await?;
        if !output.status.success() {
            return Err(CollabError::Command {
                command: format!("docker {}", args.join(" ")),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerBuilder for DockerCli {
    async fn build(&self, context: &Path, tag: &str) -> Result<ImageId, CollabError> {
        let context_str = context.to_string_lossy().into_owned();
        Self::docker(&["build", "-t", tag, &context_str]).await?;

        info!(tag, context = %context.display(), "Image built");
        Ok(ImageId(tag.to_string()))
    }

    async fn push(
        &self,
        image: &ImageId,
        registry: &str,
        session: &Session,
    ) -> Result<(), CollabError> {
        let target = format!("{}/{}", registry, image.0);
        Self::docker(&["tag", &image.0, &target]).await?;
        Self::docker(&["push", &target]).await?;

        info!(image = %image, registry, session = %session.id(), "Image pushed");
        Ok(())
    }
}
