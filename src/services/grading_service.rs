//! Grading service - the single entry point for grading a submission

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::fs;
use uuid::Uuid;

use crate::{
    config::{Config, SandboxConfig, StorageConfig},
    constants::REPORT_PLACEHOLDER,
    error::{GradeError, GraderResult, InputKind},
    grading::{self, ResultExtractor, ScoreOptions, extractor},
    models::GradeResult,
    sandbox::{Sandbox, SandboxArtifact, SandboxJob},
};

/// Set of `(assignment, submitter)` pairs currently being graded
#[derive(Debug, Default, Clone)]
pub struct InFlightRegistry {
    inner: Arc<Mutex<HashSet<(i64, i64)>>>,
}

/// Releases its registry slot on drop
#[derive(Debug)]
pub struct InFlightGuard {
    registry: InFlightRegistry,
    key: (i64, i64),
}

impl InFlightRegistry {
    /// Claim the slot for a pair, or `None` if a run already holds it
    pub fn try_acquire(&self, assignment_id: i64, submitter_id: i64) -> Option<InFlightGuard> {
        let key = (assignment_id, submitter_id);
        let mut set = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key) {
            return None;
        }
        Some(InFlightGuard {
            registry: self.clone(),
            key,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut set = self.registry.inner.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.key);
    }
}

/// Grading service wiring sandbox, extractor and scorer into one call
pub struct GradingService {
    sandbox: Arc<dyn Sandbox>,
    extractor: Box<dyn ResultExtractor>,
    storage: StorageConfig,
    sandbox_config: SandboxConfig,
    options: ScoreOptions,
    in_flight: Option<InFlightRegistry>,
}

impl GradingService {
    /// Build a service on top of any sandbox implementation
    pub fn new(config: &Config, sandbox: Arc<dyn Sandbox>) -> Self {
        Self {
            sandbox,
            extractor: extractor::build(config.grading.extractor),
            storage: config.storage.clone(),
            sandbox_config: config.sandbox.clone(),
            options: ScoreOptions {
                letter_grade: config.grading.letter_grade,
                malformed_policy: config.grading.malformed_policy,
            },
            in_flight: config
                .grading
                .reject_duplicates
                .then(InFlightRegistry::default),
        }
    }

    /// Grade the submission of `submitter_id` for `assignment_id`.
    ///
    /// Every call runs the sandbox again; nothing is cached. An `Err` means
    /// grading could not produce a result and must not be shown as a mark.
    pub async fn grade(&self, assignment_id: i64, submitter_id: i64) -> GraderResult<GradeResult> {
        let _slot = match &self.in_flight {
            Some(registry) => Some(
                registry
                    .try_acquire(assignment_id, submitter_id)
                    .ok_or(GradeError::AlreadyGrading {
                        assignment_id,
                        submitter_id,
                    })?,
            ),
            None => None,
        };

        let submission = self.storage.submission_path(assignment_id, submitter_id);
        let test_suite = self.storage.test_suite_path(assignment_id);
        ensure_input(&submission, InputKind::Submission).await?;
        ensure_input(&test_suite, InputKind::TestSuite).await?;

        let job = self.build_job(assignment_id, submitter_id, submission, test_suite);
        let run_id = job.run_id;

        tracing::info!(
            run_id = %run_id,
            assignment_id,
            submitter_id,
            extractor = %self.extractor.kind(),
            "Grading submission"
        );

        let artifact = self.sandbox.run(job).await.map_err(|e| {
            tracing::error!(
                run_id = %run_id,
                assignment_id,
                submitter_id,
                error = %e,
                "Grading infrastructure failure"
            );
            GradeError::from(e)
        })?;

        self.persist_artifact(assignment_id, submitter_id, run_id, &artifact)
            .await?;

        let outcomes = self.extractor.extract(&artifact).map_err(|e| {
            tracing::error!(run_id = %run_id, error = %e, "Report could not be parsed");
            GradeError::from(e)
        })?;

        let result =
            grading::score(outcomes, self.options).map_err(GradeError::MalformedIdentifier)?;

        tracing::info!(
            run_id = %run_id,
            assignment_id,
            submitter_id,
            mark = ?result.mark,
            pass_points = result.pass_points,
            fail_points = result.fail_points,
            aborted = result.aborted,
            quarantined = result.quarantined.len(),
            "Grading complete"
        );

        Ok(result)
    }

    fn build_job(
        &self,
        assignment_id: i64,
        submitter_id: i64,
        submission: std::path::PathBuf,
        test_suite: std::path::PathBuf,
    ) -> SandboxJob {
        let kind = self.extractor.kind();
        let run_id = Uuid::new_v4();
        let report_file = format!("report-{}.{}", run_id, kind.artifact_extension());

        let template = self.sandbox_config.test_command(kind);
        if kind.expects_report_file() && !template.contains(REPORT_PLACEHOLDER) {
            tracing::warn!(
                command = %template,
                "Test command has no {{report}} placeholder, report retrieval will fail"
            );
        }

        SandboxJob {
            run_id,
            assignment_id,
            submitter_id,
            submission,
            test_suite,
            test_command: template.replace(REPORT_PLACEHOLDER, &report_file),
            report_file,
            collect_report: kind.expects_report_file(),
        }
    }

    /// Store the raw artifact under its durable per-submission name.
    ///
    /// Written to a run-specific temp file first so concurrent runs never
    /// observe a half-written report.
    async fn persist_artifact(
        &self,
        assignment_id: i64,
        submitter_id: i64,
        run_id: Uuid,
        artifact: &SandboxArtifact,
    ) -> GraderResult<()> {
        let kind = self.extractor.kind();
        let path = self
            .storage
            .report_path(assignment_id, submitter_id, kind.artifact_extension());

        let data: &[u8] = match (&artifact.report, kind.expects_report_file()) {
            (Some(report), true) => report,
            _ => artifact.transcript.as_bytes(),
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension(format!("{}.tmp", run_id));
        fs::write(&tmp, data).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(
            run_id = %run_id,
            path = %path.display(),
            bytes = data.len(),
            "Report artifact stored"
        );
        Ok(())
    }
}

async fn ensure_input(path: &Path, kind: InputKind) -> GraderResult<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => {
            tracing::warn!(path = %path.display(), "{}", kind);
            Err(GradeError::InputNotFound(kind, path.display().to_string()))
        }
    }
}
