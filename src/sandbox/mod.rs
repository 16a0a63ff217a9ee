//! Sandboxed test execution
//!
//! A grading run executes untrusted code, so every run gets its own throwaway
//! container:
//!
//! 1. **Container manager** (`container.rs`): thin wrapper over the Docker API
//!    (create, exec, file transfer, network detach, removal) behind the
//!    [`ContainerRuntime`] trait.
//! 2. **Docker sandbox** (`docker.rs`): drives one [`SandboxRun`] through
//!    provision → inject → run → retrieve and always tears the container down.
//!
//! The [`Sandbox`] trait is the seam the grading service depends on.

pub mod container;
pub mod docker;
pub mod run;

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

pub use container::{ContainerManager, ContainerRuntime, ExecOutput};
pub use docker::DockerSandbox;
pub use run::{RunState, SandboxRun};

/// Everything a sandbox needs to grade one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxJob {
    /// Unique per invocation; names the container and the in-container report
    pub run_id: Uuid,
    pub assignment_id: i64,
    pub submitter_id: i64,
    /// Host path of the submission
    pub submission: PathBuf,
    /// Host path of the fixed test suite
    pub test_suite: PathBuf,
    /// Report file name inside the container working directory
    pub report_file: String,
    /// Fully substituted test command
    pub test_command: String,
    /// Whether `report_file` must be retrieved after the test command
    pub collect_report: bool,
}

/// Raw output of a sandbox run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxArtifact {
    /// Contents of the report file, when one was collected
    pub report: Option<Vec<u8>>,
    /// Combined stdout and stderr of the test command
    pub transcript: String,
    pub exit_code: i64,
}

/// Failure of the grading infrastructure, never of the submission itself
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("Docker error: {0}")]
    Docker(String),

    #[error("Test command exceeded the {0}s wall-clock limit")]
    Timeout(u64),

    #[error("Sandbox setup failed: {0}")]
    Setup(String),

    #[error("Installing '{package}' failed: {output}")]
    InstallFailed { package: String, output: String },

    #[error("No report produced: {0}")]
    MissingReport(String),
}

impl From<bollard::errors::Error> for SandboxError {
    fn from(err: bollard::errors::Error) -> Self {
        SandboxError::Docker(err.to_string())
    }
}

/// Runs a fixed test suite against one submission in isolation
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run the job to completion. Implementations must release every
    /// environment resource before returning, on success and on error.
    async fn run(&self, job: SandboxJob) -> Result<SandboxArtifact, SandboxError>;
}
