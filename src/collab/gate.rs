//! Deploy trust gate
//!
//! The only place secret material is consulted. Secrets are wrapped so
//! they never leak through `Debug` output; steps and collaborators see an
//! opaque [`Session`], and captured logs are scrubbed with
//! [`mask_secrets`] before anyone reads them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};
use uuid::Uuid;

/// Environment variable names the gate reads
pub const DOCKER_USERNAME: &str = "DOCKER_USERNAME";
pub const DOCKER_PASSWORD: &str = "DOCKER_PASSWORD";
pub const SSH_PRIVATE_KEY: &str = "SSH_PRIVATE_KEY";

#[derive(Debug, Error)]
pub enum GateError {
    #[error("Deploy gate denied: {0}")]
    Denied(String),

    #[error("Remote execution failed: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A secret value that redacts itself in debug output
#[derive(Clone, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value; call sites are the only audit surface
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// The named secrets the deploy gate consumes
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub docker_username: Secret,
    pub docker_password: Secret,
    pub ssh_private_key: Secret,
}

impl Secrets {
    /// Load from the process environment; absent variables stay empty
    pub fn from_env() -> Self {
        let read = |name: &str| Secret::new(std::env::var(name).unwrap_or_default());
        Self {
            docker_username: read(DOCKER_USERNAME),
            docker_password: read(DOCKER_PASSWORD),
            ssh_private_key: read(SSH_PRIVATE_KEY),
        }
    }

    /// Non-empty secret values, for log masking
    pub fn masked_values(&self) -> Vec<String> {
        [
            &self.docker_username,
            &self.docker_password,
            &self.ssh_private_key,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.expose().to_string())
        .collect()
    }
}

/// Opaque handle produced by a successful authentication.
///
/// Carries the environment injected into deploy steps; the values are
/// real but every log path masks them.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    env: HashMap<String, String>,
}

impl Session {
    pub fn new(env: HashMap<String, String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            env,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn env(&self) -> &HashMap<String, String> {
        &self.env
    }
}

/// Authentication and remote execution for the gated deploy job
#[async_trait]
pub trait DeployGate: Send + Sync {
    /// Authenticate against a registry, yielding an opaque session
    async fn authenticate(&self, registry: &str) -> Result<Session, GateError>;

    /// Run a command on a remote host; returns the remote exit code
    async fn remote_execute(
        &self,
        host: &str,
        command: &str,
        session: &Session,
    ) -> Result<i32, GateError>;
}

/// Gate backed by `docker login` and `ssh`
pub struct ProcessDeployGate {
    secrets: Secrets,
}

impl ProcessDeployGate {
    pub fn new(secrets: Secrets) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl DeployGate for ProcessDeployGate {
    async fn authenticate(&self, registry: &str) -> Result<Session, GateError> {
        if self.secrets.docker_username.is_empty() || self.secrets.docker_password.is_empty() {
            return Err(GateError::Denied(
                "registry credentials not configured".to_string(),
            ));
        }

        // Password goes over stdin, never onto the command line
        let mut child = Command::new("docker")
            .args([
                "login",
                "--username",
                self.secrets.docker_username.expose(),
                "--password-stdin",
                registry,
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(self.secrets.docker_password.expose().as_bytes())
                .await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(registry, "Registry authentication refused");
            return Err(GateError::Denied(mask_secrets(
                stderr.trim(),
                &self.secrets.masked_values(),
            )));
        }

        info!(registry, "Deploy gate authenticated");
        let env = HashMap::from([
            ("CONVEYOR_REGISTRY".to_string(), registry.to_string()),
            (
                DOCKER_USERNAME.to_string(),
                self.secrets.docker_username.expose().to_string(),
            ),
            (
                DOCKER_PASSWORD.to_string(),
                self.secrets.docker_password.expose().to_string(),
            ),
        ]);
        Ok(Session::new(env))
    }

    async fn remote_execute(
        &self,
        host: &str,
        command: &str,
        session: &Session,
    ) -> Result<i32, GateError> {
        if self.secrets.ssh_private_key.is_empty() {
            return Err(GateError::Denied("SSH key not configured".to_string()));
        }

        // Key material only ever touches a 0600 temp file
        let key_path =
            std::env::temp_dir().join(format!("conveyor-key-{}", session.id()));
        tokio::fs::write(&key_path, self.secrets.ssh_private_key.expose()).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }

        let key_str = key_path.to_string_lossy().into_owned();
        let result = Command::new("ssh")
            .args([
                "-i",
                &key_str,
                "-o",
                "BatchMode=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                host,
                command,
            ])
            .output()
            .await;

        let _ = tokio::fs::remove_file(&key_path).await;

        let output = result.map_err(|e| GateError::Remote(e.to_string()))?;
        let exit_code = output.status.code().unwrap_or(-1);
        info!(host, exit_code, "Remote command finished");
        Ok(exit_code)
    }
}

/// Replace secret values with `***` before output reaches a log or a user
pub fn mask_secrets(input: &str, values: &[String]) -> String {
    let mut output = input.to_string();
    for value in values {
        if value.len() > 3 {
            output = output.replace(value, "***");
        }
    }
    output
}
