//! pytest-json-report parser

use serde::Deserialize;

use crate::models::{TestOutcome, TestStatus};
use crate::sandbox::SandboxArtifact;

use super::{ExtractError, ExtractorKind, ResultExtractor};

#[derive(Debug, Deserialize)]
struct Report {
    tests: Vec<ReportTest>,
}

#[derive(Debug, Deserialize)]
struct ReportTest {
    nodeid: String,
    outcome: String,
    #[serde(default)]
    setup: Option<Stage>,
    #[serde(default)]
    call: Option<Stage>,
    #[serde(default)]
    teardown: Option<Stage>,
}

#[derive(Debug, Deserialize)]
struct Stage {
    #[serde(default)]
    crash: Option<Crash>,
    #[serde(default)]
    longrepr: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Crash {
    #[serde(default)]
    message: Option<String>,
}

impl ReportTest {
    fn stages(&self) -> impl Iterator<Item = &Stage> {
        [&self.call, &self.setup, &self.teardown]
            .into_iter()
            .filter_map(Option::as_ref)
    }

    /// First crash message, then first longrepr, across call/setup/teardown
    fn failure_message(&self) -> Option<String> {
        self.stages()
            .find_map(|s| s.crash.as_ref().and_then(|c| c.message.clone()))
            .or_else(|| self.stages().find_map(|s| s.longrepr.as_ref().map(render_longrepr)))
            .filter(|m| !m.trim().is_empty())
    }
}

fn render_longrepr(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Map a pytest outcome string onto a [`TestStatus`]
fn parse_outcome(outcome: &str) -> Option<TestStatus> {
    match outcome {
        "passed" | "xpassed" => Some(TestStatus::Passed),
        "failed" => Some(TestStatus::Failed),
        "error" => Some(TestStatus::Errored),
        "skipped" | "xfailed" => Some(TestStatus::Skipped),
        _ => None,
    }
}

/// Structured-report backend
#[derive(Debug, Default)]
pub struct JsonReportExtractor;

impl JsonReportExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw report document
    pub fn parse(&self, data: &[u8]) -> Result<Vec<TestOutcome>, ExtractError> {
        let report: Report = serde_json::from_slice(data)
            .map_err(|e| ExtractError::ReportCorrupt(format!("invalid json report: {}", e)))?;

        report
            .tests
            .into_iter()
            .map(|test| {
                let status = parse_outcome(&test.outcome).ok_or_else(|| {
                    ExtractError::ReportCorrupt(format!(
                        "unknown outcome '{}' for {}",
                        test.outcome, test.nodeid
                    ))
                })?;

                let detail = match status {
                    TestStatus::Passed => None,
                    TestStatus::Skipped => test.failure_message(),
                    TestStatus::Failed | TestStatus::Errored => Some(
                        test.failure_message()
                            .unwrap_or_else(|| format!("{} {}", test.nodeid, test.outcome)),
                    ),
                };

                Ok(TestOutcome::new(test.nodeid, status, detail))
            })
            .collect()
    }
}

impl ResultExtractor for JsonReportExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::JsonReport
    }

    fn extract(&self, artifact: &SandboxArtifact) -> Result<Vec<TestOutcome>, ExtractError> {
        let data = artifact
            .report
            .as_deref()
            .ok_or_else(|| ExtractError::ReportCorrupt("no report artifact".to_string()))?;
        self.parse(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = r#"{
        "created": 1700000000.0,
        "exitcode": 1,
        "summary": {"passed": 2, "failed": 1, "skipped": 1, "total": 4},
        "tests": [
            {
                "nodeid": "test_HW.py::test_add_1",
                "outcome": "skipped",
                "setup": {"outcome": "skipped", "longrepr": "('test_HW.py', 9, 'Skipped: needs numpy')"}
            },
            {
                "nodeid": "test_HW.py::test_add2_2_mandatory",
                "outcome": "passed",
                "call": {"outcome": "passed"}
            },
            {
                "nodeid": "test_HW.py::test_add3_3",
                "outcome": "failed",
                "call": {
                    "outcome": "failed",
                    "crash": {"path": "/test_HW.py", "lineno": 17, "message": "assert 4 == 5"},
                    "longrepr": "def test_add3_3():\n>       assert add(2,2) == 5"
                }
            },
            {
                "nodeid": "test_HW.py::test_add4_4",
                "outcome": "passed"
            }
        ]
    }"#;

    fn artifact(report: &str) -> SandboxArtifact {
        SandboxArtifact {
            report: Some(report.as_bytes().to_vec()),
            transcript: String::new(),
            exit_code: 1,
        }
    }

    #[test]
    fn test_extract_preserves_order_and_details() {
        let outcomes = JsonReportExtractor::new().extract(&artifact(REPORT)).unwrap();

        assert_eq!(
            outcomes,
            vec![
                TestOutcome::new(
                    "test_HW.py::test_add_1",
                    TestStatus::Skipped,
                    Some("('test_HW.py', 9, 'Skipped: needs numpy')".to_string())
                ),
                TestOutcome::passed("test_HW.py::test_add2_2_mandatory"),
                TestOutcome::failed("test_HW.py::test_add3_3", "assert 4 == 5"),
                TestOutcome::passed("test_HW.py::test_add4_4"),
            ]
        );
    }

    #[test]
    fn test_extract_is_repeatable() {
        let extractor = JsonReportExtractor::new();
        let first = extractor.extract(&artifact(REPORT)).unwrap();
        let second = extractor.extract(&artifact(REPORT)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_error_outcome_uses_setup_crash() {
        let report = r#"{"tests": [{
            "nodeid": "test_HW.py::test_io_2",
            "outcome": "error",
            "setup": {"crash": {"message": "fixture 'tmp' not found"}}
        }]}"#;
        let outcomes = JsonReportExtractor::new().extract(&artifact(report)).unwrap();
        assert_eq!(
            outcomes,
            vec![TestOutcome::errored("test_HW.py::test_io_2", "fixture 'tmp' not found")]
        );
    }

    #[test]
    fn test_failure_without_message_gets_default() {
        let report = r#"{"tests": [{"nodeid": "t_3", "outcome": "failed"}]}"#;
        let outcomes = JsonReportExtractor::new().extract(&artifact(report)).unwrap();
        assert_eq!(outcomes[0].failure_detail.as_deref(), Some("t_3 failed"));
    }

    #[test]
    fn test_xfail_and_xpass() {
        let report = r#"{"tests": [
            {"nodeid": "t_1", "outcome": "xfailed"},
            {"nodeid": "t_2", "outcome": "xpassed"}
        ]}"#;
        let outcomes = JsonReportExtractor::new().extract(&artifact(report)).unwrap();
        assert_eq!(outcomes[0].status, TestStatus::Skipped);
        assert_eq!(outcomes[1].status, TestStatus::Passed);
    }

    #[test]
    fn test_zero_tests() {
        let outcomes = JsonReportExtractor::new()
            .extract(&artifact(r#"{"tests": []}"#))
            .unwrap();
        assert!(outcomes.is_empty());
    }

    #[test]
    fn test_corrupt_reports() {
        let extractor = JsonReportExtractor::new();
        for report in [
            "",
            "not json",
            r#"{"summary": {}}"#,
            r#"{"tests": [{"outcome": "passed"}]}"#,
            r#"{"tests": [{"nodeid": "t_1"}]}"#,
            r#"{"tests": [{"nodeid": "t_1", "outcome": "exploded"}]}"#,
        ] {
            assert!(
                matches!(extractor.extract(&artifact(report)), Err(ExtractError::ReportCorrupt(_))),
                "expected corrupt for {:?}",
                report
            );
        }
    }

    #[test]
    fn test_missing_artifact_is_corrupt() {
        let artifact = SandboxArtifact {
            report: None,
            transcript: "collected 1 item".to_string(),
            exit_code: 0,
        };
        assert!(JsonReportExtractor::new().extract(&artifact).is_err());
    }
}
