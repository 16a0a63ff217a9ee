//! Verbose pytest transcript scraper
//!
//! Expects `pytest -v` output: a `collected N items` marker followed by one
//! `<node id> <OUTCOME> ... [ NN%]` line per test. Failure messages are taken
//! from the `short test summary info` block when pytest prints one.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{TestOutcome, TestStatus};
use crate::sandbox::SandboxArtifact;

use super::{ExtractError, ExtractorKind, ResultExtractor};

static COLLECTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"collected\s+(\d+)\s+items?").expect("valid regex"));

static SUMMARY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:FAILED|ERROR)\s+(\S+)\s+-\s+(.+?)\s*$").expect("valid regex")
});

fn parse_token(token: &str) -> Option<TestStatus> {
    match token {
        "PASSED" | "XPASS" => Some(TestStatus::Passed),
        "FAILED" => Some(TestStatus::Failed),
        "ERROR" => Some(TestStatus::Errored),
        "SKIPPED" | "XFAIL" => Some(TestStatus::Skipped),
        _ => None,
    }
}

/// Free-text log backend
#[derive(Debug, Default)]
pub struct TextLogExtractor;

impl TextLogExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse a raw transcript
    pub fn parse(&self, transcript: &str) -> Result<Vec<TestOutcome>, ExtractError> {
        let collected = COLLECTED_RE.captures(transcript).ok_or_else(|| {
            ExtractError::ReportCorrupt("no 'collected N items' marker in transcript".to_string())
        })?;

        let expected: usize = collected[1]
            .parse()
            .map_err(|_| ExtractError::ReportCorrupt("unreadable test count".to_string()))?;
        if expected == 0 {
            return Ok(Vec::new());
        }

        // Entries start on the line after the marker
        let marker_end = collected.get(0).map(|m| m.end()).unwrap_or(0);
        let rest = &transcript[marker_end..];
        let rest = rest.split_once('\n').map(|(_, tail)| tail).unwrap_or("");

        let details = failure_details(transcript);

        let mut outcomes = Vec::with_capacity(expected);
        for line in rest.lines().filter(|l| !l.trim().is_empty()).take(expected) {
            let mut parts = line.split_whitespace();
            let (Some(identifier), Some(token)) = (parts.next(), parts.next()) else {
                return Err(ExtractError::ReportCorrupt(format!(
                    "unreadable test entry: {}",
                    line.trim()
                )));
            };

            let status = parse_token(token).ok_or_else(|| {
                ExtractError::ReportCorrupt(format!(
                    "unknown outcome '{}' for {}",
                    token, identifier
                ))
            })?;

            let detail = match status {
                TestStatus::Passed | TestStatus::Skipped => None,
                TestStatus::Failed | TestStatus::Errored => Some(
                    details
                        .get(identifier)
                        .cloned()
                        .unwrap_or_else(|| format!("{} {}", identifier, token)),
                ),
            };

            outcomes.push(TestOutcome::new(identifier, status, detail));
        }

        if outcomes.len() != expected {
            return Err(ExtractError::ReportCorrupt(format!(
                "transcript lists {} of {} collected tests",
                outcomes.len(),
                expected
            )));
        }

        Ok(outcomes)
    }
}

/// `FAILED <id> - <message>` lines from the short test summary
fn failure_details(transcript: &str) -> HashMap<&str, String> {
    SUMMARY_RE
        .captures_iter(transcript)
        .filter_map(|caps| {
            let id = caps.get(1)?.as_str();
            let message = caps.get(2)?.as_str().to_string();
            Some((id, message))
        })
        .collect()
}

impl ResultExtractor for TextLogExtractor {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::TextLog
    }

    fn extract(&self, artifact: &SandboxArtifact) -> Result<Vec<TestOutcome>, ExtractError> {
        self.parse(&artifact.transcript)
    }
}
