//! Result extraction
//!
//! Two interchangeable backends turn a sandbox artifact into an ordered list
//! of [`TestOutcome`]s:
//!
//! 1. **JSON report** (`json_report.rs`): parses the document written by the
//!    `pytest-json-report` plugin. This is the preferred backend.
//! 2. **Text log** (`text_log.rs`): scrapes the verbose pytest transcript, for
//!    images that cannot produce a structured report.
//!
//! The backend is picked once from configuration via [`build`].

pub mod json_report;
pub mod text_log;

use std::str::FromStr;

use crate::constants::{JSON_REPORT_TEST_COMMAND, TEXT_LOG_TEST_COMMAND};
use crate::models::TestOutcome;
use crate::sandbox::SandboxArtifact;

pub use json_report::JsonReportExtractor;
pub use text_log::TextLogExtractor;

/// Extraction failure; always fatal to the grading run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("{0}")]
    ReportCorrupt(String),
}

/// Turns raw sandbox output into test outcomes
pub trait ResultExtractor: Send + Sync {
    /// Which backend this is
    fn kind(&self) -> ExtractorKind;

    /// Extract outcomes in execution order. Zero tests yields an empty list.
    fn extract(&self, artifact: &SandboxArtifact) -> Result<Vec<TestOutcome>, ExtractError>;
}

/// Available extraction backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    JsonReport,
    TextLog,
}

impl ExtractorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonReport => "json-report",
            Self::TextLog => "text-log",
        }
    }

    /// Test command used when none is configured
    pub fn default_test_command(&self) -> &'static str {
        match self {
            Self::JsonReport => JSON_REPORT_TEST_COMMAND,
            Self::TextLog => TEXT_LOG_TEST_COMMAND,
        }
    }

    /// Whether a report file must be retrieved from the sandbox
    pub fn expects_report_file(&self) -> bool {
        matches!(self, Self::JsonReport)
    }

    /// Extension of the durable artifact
    pub fn artifact_extension(&self) -> &'static str {
        match self {
            Self::JsonReport => "json",
            Self::TextLog => "log",
        }
    }
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "json-report" | "json" => Ok(Self::JsonReport),
            "text-log" | "text" | "log" => Ok(Self::TextLog),
            other => Err(format!("unknown extractor: {}", other)),
        }
    }
}

impl std::fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Build the extractor for a configured backend
pub fn build(kind: ExtractorKind) -> Box<dyn ResultExtractor> {
    match kind {
        ExtractorKind::JsonReport => Box::new(JsonReportExtractor::new()),
        ExtractorKind::TextLog => Box::new(TextLogExtractor::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!("json".parse::<ExtractorKind>(), Ok(ExtractorKind::JsonReport));
        assert_eq!("JSON_REPORT".parse::<ExtractorKind>(), Ok(ExtractorKind::JsonReport));
        assert_eq!("text-log".parse::<ExtractorKind>(), Ok(ExtractorKind::TextLog));
        assert!("xml".parse::<ExtractorKind>().is_err());
    }

    #[test]
    fn test_build_matches_kind() {
        assert_eq!(build(ExtractorKind::JsonReport).kind(), ExtractorKind::JsonReport);
        assert_eq!(build(ExtractorKind::TextLog).kind(), ExtractorKind::TextLog);
    }
}
