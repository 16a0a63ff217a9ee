//! Grade result model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::letter_thresholds;

use super::outcome::{TestOutcome, TestStatus};

/// Letter grade derived from a mark
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LetterGrade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl LetterGrade {
    /// Map a percentage mark onto a letter. E starts at 51, so [50, 51) is an F.
    pub fn from_mark(mark: f64) -> Self {
        if mark >= letter_thresholds::A {
            Self::A
        } else if mark >= letter_thresholds::B {
            Self::B
        } else if mark >= letter_thresholds::C {
            Self::C
        } else if mark >= letter_thresholds::D {
            Self::D
        } else if mark >= letter_thresholds::E {
            Self::E
        } else {
            Self::F
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
            Self::F => "F",
        }
    }
}

impl std::fmt::Display for LetterGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An outcome whose identifier could not be decoded into a weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantinedTest {
    pub identifier: String,
    pub status: TestStatus,
    pub reason: String,
}

/// Final grade handed back to the caller
///
/// `mark` is `None` when nothing could be weighted; callers render that as
/// "ungraded", which is not the same as a mark of zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeResult {
    pub mark: Option<f64>,
    pub pass_points: u32,
    pub fail_points: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub letter_grade: Option<LetterGrade>,
    pub error_messages: Vec<String>,
    pub aborted: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quarantined: Vec<QuarantinedTest>,
    #[serde(default)]
    pub outcomes: Vec<TestOutcome>,
    pub graded_at: DateTime<Utc>,
}

impl GradeResult {
    /// True when no test could be weighted
    pub fn is_ungraded(&self) -> bool {
        self.mark.is_none()
    }

    /// Human-readable per-test summary followed by a totals line
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.outcomes.len() + 2);

        for outcome in &self.outcomes {
            match outcome.status {
                TestStatus::Passed => lines.push(format!("✅ {}", outcome.identifier)),
                TestStatus::Skipped => lines.push(format!("⏭️ {}", outcome.identifier)),
                TestStatus::Failed | TestStatus::Errored => {
                    lines.push(format!("❌ {}", outcome.identifier));
                    if let Some(detail) = &outcome.failure_detail {
                        lines.push(format!("  {}", detail));
                    }
                }
            }
        }

        if self.aborted {
            lines.push("Mandatory test failed, submission scored 0".to_string());
        }

        let mark = match self.mark {
            Some(mark) => format!("{:.2}", mark),
            None => "ungraded".to_string(),
        };
        let letter = self
            .letter_grade
            .map(|g| format!(" ({})", g))
            .unwrap_or_default();
        lines.push(format!(
            "Grade: {}{}, total_points: {} passed, {} failed",
            mark, letter, self.pass_points, self.fail_points
        ));

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_boundaries() {
        assert_eq!(LetterGrade::from_mark(100.0), LetterGrade::A);
        assert_eq!(LetterGrade::from_mark(90.0), LetterGrade::A);
        assert_eq!(LetterGrade::from_mark(89.99), LetterGrade::B);
        assert_eq!(LetterGrade::from_mark(80.0), LetterGrade::B);
        assert_eq!(LetterGrade::from_mark(70.0), LetterGrade::C);
        assert_eq!(LetterGrade::from_mark(60.0), LetterGrade::D);
        assert_eq!(LetterGrade::from_mark(59.99), LetterGrade::E);
        assert_eq!(LetterGrade::from_mark(55.0), LetterGrade::E);
        assert_eq!(LetterGrade::from_mark(51.0), LetterGrade::E);
        assert_eq!(LetterGrade::from_mark(50.9), LetterGrade::F);
        assert_eq!(LetterGrade::from_mark(0.0), LetterGrade::F);
    }

    #[test]
    fn test_summary_lines() {
        let result = GradeResult {
            mark: Some(62.5),
            pass_points: 5,
            fail_points: 3,
            letter_grade: Some(LetterGrade::D),
            error_messages: vec!["assert 4 == 5".to_string()],
            aborted: false,
            quarantined: Vec::new(),
            outcomes: vec![
                TestOutcome::passed("test_HW.py::test_a_5"),
                TestOutcome::failed("test_HW.py::test_b_3", "assert 4 == 5"),
            ],
            graded_at: Utc::now(),
        };

        assert_eq!(
            result.summary_lines(),
            vec![
                "✅ test_HW.py::test_a_5",
                "❌ test_HW.py::test_b_3",
                "  assert 4 == 5",
                "Grade: 62.50 (D), total_points: 5 passed, 3 failed",
            ]
        );
    }
}
