//! Custom error types and handling
//!
//! This module defines the grader's error taxonomy. Environment-level problems
//! always fail the whole run and are kept apart from a genuine low mark, which
//! is a normal [`GradeResult`](crate::models::GradeResult).

use std::fmt;

use crate::grading::{ExtractError, WeightError};
use crate::sandbox::SandboxError;

/// Which grading input was missing from durable storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Submission,
    TestSuite,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submission => write!(f, "submission not found"),
            Self::TestSuite => write!(f, "test suite not found"),
        }
    }
}

/// Grader-wide error type
#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error("{0}: {1}")]
    InputNotFound(InputKind, String),

    #[error("Malformed test identifier: {0}")]
    MalformedIdentifier(#[source] WeightError),

    #[error("Report corrupt: {0}")]
    ReportCorrupt(String),

    #[error("Grading infrastructure failure: {0}")]
    Infrastructure(#[from] SandboxError),

    #[error("Submission {submitter_id} for assignment {assignment_id} is already being graded")]
    AlreadyGrading { assignment_id: i64, submitter_id: i64 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GradeError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InputNotFound(InputKind::Submission, _) => "SUBMISSION_NOT_FOUND",
            Self::InputNotFound(InputKind::TestSuite, _) => "TEST_SUITE_NOT_FOUND",
            Self::MalformedIdentifier(_) => "MALFORMED_IDENTIFIER",
            Self::ReportCorrupt(_) => "REPORT_CORRUPT",
            Self::Infrastructure(_) => "INFRASTRUCTURE_FAILURE",
            Self::AlreadyGrading { .. } => "ALREADY_GRADING",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }

    /// True when grading could not run at all and the caller should retry or contact staff
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Infrastructure(_) | Self::ReportCorrupt(_) | Self::Io(_) | Self::Configuration(_)
        )
    }

    /// Process exit code used by the CLI
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InputNotFound(..) => 2,
            Self::MalformedIdentifier(_) => 3,
            Self::AlreadyGrading { .. } => 4,
            Self::ReportCorrupt(_) => 5,
            Self::Infrastructure(_) | Self::Io(_) | Self::Configuration(_) => 10,
        }
    }
}

impl From<ExtractError> for GradeError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::ReportCorrupt(msg) => GradeError::ReportCorrupt(msg),
        }
    }
}

impl From<crate::config::ConfigError> for GradeError {
    fn from(err: crate::config::ConfigError) -> Self {
        GradeError::Configuration(err.to_string())
    }
}

/// Result type alias using GradeError
pub type GraderResult<T> = Result<T, GradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_is_distinct_from_input_errors() {
        let infra = GradeError::from(SandboxError::Docker("connection refused".to_string()));
        assert!(infra.is_infrastructure());
        assert_eq!(infra.error_code(), "INFRASTRUCTURE_FAILURE");

        let missing = GradeError::InputNotFound(InputKind::Submission, "HW/HW_1_2.py".to_string());
        assert!(!missing.is_infrastructure());
        assert_eq!(missing.error_code(), "SUBMISSION_NOT_FOUND");
        assert_eq!(missing.to_string(), "submission not found: HW/HW_1_2.py");
    }

    #[test]
    fn test_report_corrupt_from_extractor() {
        let err = GradeError::from(ExtractError::ReportCorrupt("missing tests".to_string()));
        assert_eq!(err.error_code(), "REPORT_CORRUPT");
        assert_eq!(err.exit_code(), 5);
    }
}
