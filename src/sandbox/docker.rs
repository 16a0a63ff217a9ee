//! Docker-backed sandbox
//!
//! Every run lives on its own tokio task so that a caller abandoning the
//! request cannot interrupt teardown halfway.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::fs;

use crate::config::SandboxConfig;
use crate::constants::{SANDBOX_WORKDIR, SUBMISSION_MODULE_FILE, TEST_ENTRY_FILE};

use super::container::{ContainerManager, ContainerRuntime, shell_quote};
use super::run::{RunState, SandboxRun};
use super::{Sandbox, SandboxArtifact, SandboxError, SandboxJob};

/// Removes its container on drop unless disarmed.
///
/// The normal path removes the container explicitly; this only fires when the
/// run task unwinds before reaching teardown.
struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    container_id: Option<String>,
}

impl ContainerGuard {
    fn new(runtime: Arc<dyn ContainerRuntime>, container_id: &str) -> Self {
        Self {
            runtime,
            container_id: Some(container_id.to_string()),
        }
    }

    fn disarm(&mut self) {
        self.container_id = None;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(container_id) = self.container_id.take() else {
            return;
        };
        let runtime = self.runtime.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = runtime.remove_container(&container_id).await {
                        tracing::error!(
                            container = %container_id,
                            error = %e,
                            "Deferred container removal failed"
                        );
                    }
                });
            }
            Err(_) => {
                tracing::error!(
                    container = %container_id,
                    "No runtime available, container leaked"
                );
            }
        }
    }
}

/// Sandbox running each job in a fresh Docker container
#[derive(Clone)]
pub struct DockerSandbox {
    runtime: Arc<dyn ContainerRuntime>,
    config: Arc<SandboxConfig>,
}

impl DockerSandbox {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: SandboxConfig) -> Self {
        Self {
            runtime,
            config: Arc::new(config),
        }
    }

    /// Connect to Docker using the sandbox configuration
    pub fn connect(config: SandboxConfig) -> Result<Self, SandboxError> {
        let docker = ContainerManager::connect(&config)?;
        let manager = ContainerManager::new(docker, config.clone());
        Ok(Self::new(Arc::new(manager), config))
    }

    /// Pull the configured image ahead of the first run
    pub async fn prepare(&self) {
        self.runtime.ensure_image().await;
    }

    /// Provision, run and tear down one job
    async fn execute(
        runtime: Arc<dyn ContainerRuntime>,
        config: Arc<SandboxConfig>,
        job: SandboxJob,
        run: &mut SandboxRun,
    ) -> Result<SandboxArtifact, SandboxError> {
        let started = Instant::now();

        // Network only while packages are installed
        let install_list = config.install_list();
        let container_id = match runtime.create_container(&job, !install_list.is_empty()).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(run_id = %job.run_id, error = %e, "Failed to provision sandbox");
                run.transition(RunState::Failed);
                run.transition(RunState::Destroyed);
                return Err(e);
            }
        };
        let mut guard = ContainerGuard::new(runtime.clone(), &container_id);
        run.attach_container(&container_id);
        run.transition(RunState::Provisioned);

        let result =
            Self::drive(runtime.as_ref(), &config, &container_id, &job, &install_list, run).await;

        run.transition(match result {
            Ok(_) => RunState::Completed,
            Err(_) => RunState::Failed,
        });

        if let Err(e) = runtime.remove_container(&container_id).await {
            tracing::warn!(
                run_id = %job.run_id,
                container = %container_id,
                error = %e,
                "Failed to remove sandbox container"
            );
        }
        guard.disarm();
        run.transition(RunState::Destroyed);

        tracing::info!(
            run_id = %job.run_id,
            assignment_id = job.assignment_id,
            submitter_id = job.submitter_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Sandbox run finished"
        );

        result
    }

    /// Inject files, install packages, run the test command and collect the report
    async fn drive(
        runtime: &dyn ContainerRuntime,
        config: &SandboxConfig,
        container_id: &str,
        job: &SandboxJob,
        install_list: &[String],
        run: &mut SandboxRun,
    ) -> Result<SandboxArtifact, SandboxError> {
        // Renamed on injection: the suite imports a fixed module name
        let submission = read_input(&job.submission).await?;
        let test_suite = read_input(&job.test_suite).await?;
        runtime
            .write_file(container_id, &workdir_path(SUBMISSION_MODULE_FILE), &submission)
            .await?;
        runtime
            .write_file(container_id, &workdir_path(TEST_ENTRY_FILE), &test_suite)
            .await?;

        run.transition(RunState::Running);
        let limit = Duration::from_secs(config.timeout_secs);

        for package in install_list {
            let cmd = format!(
                "pip install --quiet --disable-pip-version-check {}",
                shell_quote(package)
            );
            let outcome =
                tokio::time::timeout(limit, runtime.exec_command(container_id, &cmd)).await;
            let failure = match outcome {
                Ok(Ok(out)) if out.success() => None,
                Ok(Ok(out)) => Some(out.combined()),
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("timed out after {}s", config.timeout_secs)),
            };
            if let Some(output) = failure {
                if config.strict_install {
                    return Err(SandboxError::InstallFailed {
                        package: package.clone(),
                        output,
                    });
                }
                tracing::warn!(
                    run_id = %job.run_id,
                    package = %package,
                    output = %output,
                    "Package install failed, continuing"
                );
            }
        }

        // Submission code never runs with a network attached
        if !install_list.is_empty() {
            runtime.isolate_network(container_id).await?;
        }

        tracing::debug!(run_id = %job.run_id, cmd = %job.test_command, "Running test command");
        let test_run = runtime.exec_command(container_id, &job.test_command);
        let output = tokio::time::timeout(limit, test_run)
            .await
            .map_err(|_| SandboxError::Timeout(config.timeout_secs))??;

        let report = if job.collect_report {
            let data = runtime
                .read_file(container_id, &workdir_path(&job.report_file))
                .await?
                .ok_or_else(|| SandboxError::MissingReport(tail(&output.combined(), 2000)))?;
            Some(data)
        } else {
            None
        };

        Ok(SandboxArtifact {
            report,
            transcript: output.combined(),
            exit_code: output.exit_code,
        })
    }
}

#[async_trait]
impl Sandbox for DockerSandbox {
    async fn run(&self, job: SandboxJob) -> Result<SandboxArtifact, SandboxError> {
        let runtime = self.runtime.clone();
        let config = self.config.clone();
        let run_id = job.run_id;

        // Detached task: dropping this future does not cancel the run or its teardown
        tokio::spawn(async move {
            let mut run = SandboxRun::new(&job);
            Self::execute(runtime, config, job, &mut run).await
        })
        .await
        .map_err(|e| {
            tracing::error!(run_id = %run_id, error = %e, "Sandbox task panicked");
            SandboxError::Setup(format!("sandbox task failed: {}", e))
        })?
    }
}

async fn read_input(path: &Path) -> Result<Vec<u8>, SandboxError> {
    fs::read(path)
        .await
        .map_err(|e| SandboxError::Setup(format!("failed to read {}: {}", path.display(), e)))
}

fn workdir_path(file: &str) -> String {
    format!("{}/{}", SANDBOX_WORKDIR, file)
}

/// Last `max` bytes of `text`, on a char boundary
fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}
