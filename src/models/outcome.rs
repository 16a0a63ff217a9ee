//! Test outcome model

use serde::{Deserialize, Serialize};

/// Status of a single executed test case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Errored,
    Skipped,
}

impl TestStatus {
    /// Get status as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Errored => "errored",
            Self::Skipped => "skipped",
        }
    }

    /// Failed and Errored both count against the submission
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Errored)
    }
}

impl std::fmt::Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row per executed test case, in execution order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub identifier: String,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
}

impl TestOutcome {
    /// Build an outcome; a detail attached to a passing test is discarded
    pub fn new(identifier: impl Into<String>, status: TestStatus, detail: Option<String>) -> Self {
        let failure_detail = match status {
            TestStatus::Passed => None,
            _ => detail,
        };
        Self {
            identifier: identifier.into(),
            status,
            failure_detail,
        }
    }

    pub fn passed(identifier: impl Into<String>) -> Self {
        Self::new(identifier, TestStatus::Passed, None)
    }

    pub fn failed(identifier: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(identifier, TestStatus::Failed, Some(detail.into()))
    }

    pub fn errored(identifier: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(identifier, TestStatus::Errored, Some(detail.into()))
    }

    pub fn skipped(identifier: impl Into<String>) -> Self {
        Self::new(identifier, TestStatus::Skipped, None)
    }

    /// Failure detail, or a generic line naming the test when none was captured
    pub fn detail_or_default(&self) -> String {
        self.failure_detail
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.identifier, self.status))
    }
}
