//! Docker container management for grading runs

use std::collections::HashMap;

use async_trait::async_trait;
use base64::Engine;
use bollard::{
    API_DEFAULT_VERSION, Docker,
    container::LogOutput,
    exec::{CreateExecOptions, StartExecResults},
    models::{ContainerCreateBody, HostConfig, NetworkDisconnectRequest},
    query_parameters::{
        CreateContainerOptionsBuilder, CreateImageOptionsBuilder, InspectContainerOptions,
        RemoveContainerOptionsBuilder, StartContainerOptions,
    },
};
use futures::StreamExt;

use crate::config::SandboxConfig;
use crate::constants::{CONTAINER_NAME_PREFIX, SANDBOX_PIDS_LIMIT, SANDBOX_WORKDIR};

use super::{SandboxError, SandboxJob};

/// Raw bytes per injected chunk; a multiple of 3 so every chunk is valid base64 on its own
const WRITE_CHUNK_BYTES: usize = 48 * 1024;

/// Output of a command executed inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, as a user would have seen it in a terminal
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Container operations a sandbox run is driven through
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Make the base image available; failures are logged, not returned
    async fn ensure_image(&self);

    /// Create and start a fresh container for one run
    async fn create_container(&self, job: &SandboxJob, network: bool)
        -> Result<String, SandboxError>;

    /// Detach the container from every network it is connected to
    async fn isolate_network(&self, container_id: &str) -> Result<(), SandboxError>;

    /// Remove a container, stopping it first if needed
    async fn remove_container(&self, container_id: &str) -> Result<(), SandboxError>;

    /// Write a file into the container
    async fn write_file(
        &self,
        container_id: &str,
        path: &str,
        content: &[u8],
    ) -> Result<(), SandboxError>;

    /// Read a file out of the container; `None` if it does not exist
    async fn read_file(&self, container_id: &str, path: &str)
        -> Result<Option<Vec<u8>>, SandboxError>;

    /// Execute a shell command in the container working directory
    async fn exec_command(&self, container_id: &str, cmd: &str) -> Result<ExecOutput, SandboxError>;
}

/// Docker container manager for grading runs
pub struct ContainerManager {
    docker: Docker,
    config: SandboxConfig,
}

impl ContainerManager {
    /// Create a new container manager
    pub fn new(docker: Docker, config: SandboxConfig) -> Self {
        Self { docker, config }
    }

    /// Connect to the configured Docker socket, or the platform default
    pub fn connect(config: &SandboxConfig) -> Result<Docker, SandboxError> {
        let docker = match &config.docker_socket {
            Some(socket) => Docker::connect_with_socket(socket, 120, API_DEFAULT_VERSION)?,
            None => Docker::connect_with_socket_defaults()?,
        };
        Ok(docker)
    }

    /// Name of the container for a run
    pub fn container_name(job: &SandboxJob) -> String {
        format!("{}-{}", CONTAINER_NAME_PREFIX, job.run_id)
    }
}

/// Memory limit in bytes, or `None` when it does not fit the Docker API
fn memory_limit_bytes(limit_mb: u64) -> Option<i64> {
    limit_mb
        .checked_mul(1024 * 1024)
        .and_then(|bytes| i64::try_from(bytes).ok())
}

#[async_trait]
impl ContainerRuntime for ContainerManager {
    /// Pull the base image if it is not already present.
    ///
    /// Best-effort: a failed pull is logged and container creation reports the
    /// real error if the image is truly unavailable.
    async fn ensure_image(&self) {
        let image = &self.config.image;
        if self.docker.inspect_image(image).await.is_ok() {
            tracing::debug!(image = %image, "Docker image already present");
            return;
        }

        tracing::info!(image = %image, "Pulling Docker image…");
        let options = CreateImageOptionsBuilder::default().from_image(image).build();
        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            if let Err(e) = progress {
                tracing::warn!(
                    image = %image,
                    error = %e,
                    "docker pull failed, will try cached image"
                );
                return;
            }
        }
        tracing::info!(image = %image, "Docker image pulled successfully");
    }

    async fn create_container(
        &self,
        job: &SandboxJob,
        network: bool,
    ) -> Result<String, SandboxError> {
        let container_name = Self::container_name(job);

        let options = CreateContainerOptionsBuilder::default()
            .name(&container_name)
            .build();

        let memory_bytes = memory_limit_bytes(self.config.memory_limit_mb).ok_or_else(|| {
            SandboxError::Setup(format!(
                "memory limit of {} MB is out of range",
                self.config.memory_limit_mb
            ))
        })?;
        let host_config = HostConfig {
            memory: Some(memory_bytes),
            memory_swap: Some(memory_bytes),
            cpu_period: Some(100000),
            cpu_quota: Some(100000), // 1 CPU
            network_mode: if network { None } else { Some("none".to_string()) },
            pids_limit: Some(SANDBOX_PIDS_LIMIT),
            privileged: Some(false),
            ..Default::default()
        };

        let body = ContainerCreateBody {
            image: Some(self.config.image.clone()),
            // Keep the container alive between execs
            cmd: Some(vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()]),
            host_config: Some(host_config),
            working_dir: Some(SANDBOX_WORKDIR.to_string()),
            env: Some(vec!["LANG=C.UTF-8".to_string(), "PYTHONDONTWRITEBYTECODE=1".to_string()]),
            labels: Some({
                let mut labels = HashMap::new();
                labels.insert("autograder.run".to_string(), job.run_id.to_string());
                labels.insert("autograder.assignment".to_string(), job.assignment_id.to_string());
                labels.insert("autograder.submitter".to_string(), job.submitter_id.to_string());
                labels
            }),
            ..Default::default()
        };

        let container = self.docker.create_container(Some(options), body).await?;

        if let Err(e) = self
            .docker
            .start_container(&container.id, None::<StartContainerOptions>)
            .await
        {
            // Created but never started: remove before reporting
            if let Err(remove_err) = self.remove_container(&container.id).await {
                tracing::warn!(
                    container = %container.id,
                    error = %remove_err,
                    "Failed to remove unstarted container"
                );
            }
            return Err(e.into());
        }

        Ok(container.id)
    }

    async fn isolate_network(&self, container_id: &str) -> Result<(), SandboxError> {
        let info = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await?;

        let networks: Vec<String> = info
            .network_settings
            .and_then(|settings| settings.networks)
            .map(|networks| networks.into_keys().collect())
            .unwrap_or_default();

        for network in networks {
            self.docker
                .disconnect_network(
                    &network,
                    NetworkDisconnectRequest {
                        container: Some(container_id.to_string()),
                        force: Some(true),
                    },
                )
                .await?;
            tracing::debug!(
                container = %container_id,
                network = %network,
                "Disconnected sandbox network"
            );
        }

        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), SandboxError> {
        let options = RemoveContainerOptionsBuilder::default()
            .force(true)
            .build();

        self.docker.remove_container(container_id, Some(options)).await?;

        Ok(())
    }

    async fn write_file(
        &self,
        container_id: &str,
        path: &str,
        content: &[u8],
    ) -> Result<(), SandboxError> {
        let engine = base64::engine::general_purpose::STANDARD;

        // An empty file still needs to exist
        let chunks: Vec<&[u8]> = if content.is_empty() {
            vec![content]
        } else {
            content.chunks(WRITE_CHUNK_BYTES).collect()
        };

        for (i, chunk) in chunks.into_iter().enumerate() {
            let redirect = if i == 0 { ">" } else { ">>" };
            let cmd = format!(
                "echo '{}' | base64 -d {} {}",
                engine.encode(chunk),
                redirect,
                shell_quote(path)
            );
            let result = self.exec_command(container_id, &cmd).await?;
            if !result.success() {
                return Err(SandboxError::Setup(format!(
                    "failed to write {}: {}",
                    path,
                    result.combined()
                )));
            }
        }

        Ok(())
    }

    async fn read_file(
        &self,
        container_id: &str,
        path: &str,
    ) -> Result<Option<Vec<u8>>, SandboxError> {
        let quoted = shell_quote(path);
        let cmd = format!("test -f {} && base64 {}", quoted, quoted);
        let result = self.exec_command(container_id, &cmd).await?;

        if !result.success() {
            return Ok(None);
        }

        let encoded: String = result.stdout.split_whitespace().collect();
        let data = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| SandboxError::Setup(format!("failed to decode {}: {}", path, e)))?;

        Ok(Some(data))
    }

    async fn exec_command(
        &self,
        container_id: &str,
        cmd: &str,
    ) -> Result<ExecOutput, SandboxError> {
        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(vec!["/bin/sh", "-c", cmd]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(SANDBOX_WORKDIR),
                    ..Default::default()
                },
            )
            .await?;

        let output = self.docker.start_exec(&exec.id, None).await?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        if let StartExecResults::Attached { mut output, .. } = output {
            while let Some(msg) = output.next().await {
                match msg? {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    _ => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        let exit_code = inspect.exit_code.unwrap_or(-1);

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

/// Single-quote a value for `/bin/sh`
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}
