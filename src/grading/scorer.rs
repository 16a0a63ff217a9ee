//! Scoring engine
//!
//! Converts decoded outcomes into point totals, a percentage mark and an
//! optional letter grade. A failed mandatory test short-circuits everything:
//! the submission is marked 0 and no partial credit is computed.

use std::str::FromStr;

use chrono::Utc;

use crate::models::{GradeResult, LetterGrade, QuarantinedTest, TestOutcome, TestStatus};

use super::weight::{self, WeightError, WeightSpec};

/// What to do with an outcome whose identifier carries no weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Leave it out of scoring and report it in `quarantined`
    #[default]
    Exclude,
    /// Fail the whole run
    Abort,
}

impl FromStr for MalformedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exclude" => Ok(Self::Exclude),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown malformed identifier policy: {}", other)),
        }
    }
}

/// Per-run scoring options
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreOptions {
    pub letter_grade: bool,
    pub malformed_policy: MalformedPolicy,
}

/// Round to two decimal places
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage of weight earned; `None` when nothing carried weight
pub fn compute_mark(pass_points: u32, fail_points: u32) -> Option<f64> {
    let total = pass_points as u64 + fail_points as u64;
    if total == 0 {
        return None;
    }
    Some(round2(pass_points as f64 / total as f64 * 100.0))
}

/// Score a run's outcomes.
///
/// Only fails under [`MalformedPolicy::Abort`]; every other input, including an
/// empty one, produces a [`GradeResult`].
pub fn score(
    outcomes: Vec<TestOutcome>,
    options: ScoreOptions,
) -> Result<GradeResult, WeightError> {
    let mut weighted: Vec<(usize, WeightSpec)> = Vec::with_capacity(outcomes.len());
    let mut quarantined = Vec::new();
    // Diagnostics for quarantined outcomes, keyed by position so they interleave in order
    let mut quarantine_notes: Vec<(usize, String)> = Vec::new();

    for (idx, outcome) in outcomes.iter().enumerate() {
        match weight::decode(&outcome.identifier) {
            Ok(spec) => weighted.push((idx, spec)),
            Err(err) => {
                if options.malformed_policy == MalformedPolicy::Abort {
                    return Err(err);
                }
                tracing::warn!(
                    identifier = %outcome.identifier,
                    reason = err.reason(),
                    "Excluding test with malformed identifier from scoring"
                );
                quarantine_notes.push((
                    idx,
                    format!(
                        "Invalid test name '{}' ({}), contact your instructor.",
                        outcome.identifier,
                        err.reason()
                    ),
                ));
                quarantined.push(QuarantinedTest {
                    identifier: outcome.identifier.clone(),
                    status: outcome.status,
                    reason: err.reason().to_string(),
                });
            }
        }
    }

    let mandatory_failures: Vec<String> = weighted
        .iter()
        .filter(|(idx, spec)| spec.mandatory && outcomes[*idx].status.is_failure())
        .map(|(idx, _)| outcomes[*idx].detail_or_default())
        .collect();

    if !mandatory_failures.is_empty() {
        tracing::info!(
            failures = mandatory_failures.len(),
            "Mandatory test failed, submission scored 0"
        );
        return Ok(GradeResult {
            mark: Some(0.0),
            pass_points: 0,
            fail_points: 0,
            letter_grade: options.letter_grade.then(|| LetterGrade::from_mark(0.0)),
            error_messages: mandatory_failures,
            aborted: true,
            quarantined,
            outcomes,
            graded_at: Utc::now(),
        });
    }

    let mut pass_points: u32 = 0;
    let mut fail_points: u32 = 0;
    let mut messages: Vec<(usize, String)> = Vec::new();

    for (idx, spec) in &weighted {
        if spec.mandatory {
            continue;
        }
        let outcome = &outcomes[*idx];
        if outcome.status.is_failure() {
            fail_points = fail_points.saturating_add(spec.points);
            messages.push((*idx, outcome.detail_or_default()));
        } else if outcome.status == TestStatus::Passed {
            pass_points = pass_points.saturating_add(spec.points);
        }
    }

    messages.extend(quarantine_notes);
    messages.sort_by_key(|(idx, _)| *idx);

    let mark = compute_mark(pass_points, fail_points);

    Ok(GradeResult {
        mark,
        pass_points,
        fail_points,
        letter_grade: if options.letter_grade {
            mark.map(LetterGrade::from_mark)
        } else {
            None
        },
        error_messages: messages.into_iter().map(|(_, m)| m).collect(),
        aborted: false,
        quarantined,
        outcomes,
        graded_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_letters() -> ScoreOptions {
        ScoreOptions {
            letter_grade: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_weighted_mark() {
        let result = score(
            vec![TestOutcome::passed("t_5"), TestOutcome::failed("t_3", "assert False")],
            ScoreOptions::default(),
        )
        .unwrap();

        assert_eq!(result.pass_points, 5);
        assert_eq!(result.fail_points, 3);
        assert_eq!(result.mark, Some(62.5));
        assert_eq!(result.letter_grade, None);
        assert_eq!(result.error_messages, vec!["assert False"]);
        assert!(!result.aborted);
    }

    #[test]
    fn test_mandatory_failure_zeroes_submission() {
        let result = score(
            vec![
                TestOutcome::failed("t_2_mandatory", "must import"),
                TestOutcome::passed("t_9"),
                TestOutcome::failed("t_1", "other failure"),
            ],
            ScoreOptions::default(),
        )
        .unwrap();

        assert!(result.aborted);
        assert_eq!(result.mark, Some(0.0));
        assert_eq!(result.pass_points, 0);
        assert_eq!(result.fail_points, 0);
        assert_eq!(result.error_messages, vec!["must import"]);
    }

    #[test]
    fn test_errored_mandatory_also_aborts() {
        let result = score(
            vec![TestOutcome::errored("t_1_mandatory", "fixture error")],
            with_letters(),
        )
        .unwrap();
        assert!(result.aborted);
        assert_eq!(result.letter_grade, Some(LetterGrade::F));
    }

    #[test]
    fn test_unweighted_mandatory_failure_zeroes_submission() {
        for policy in [MalformedPolicy::Exclude, MalformedPolicy::Abort] {
            let options = ScoreOptions {
                malformed_policy: policy,
                ..Default::default()
            };
            let result = score(
                vec![
                    TestOutcome::failed("test_HW.py::test_imports_mandatory", "ImportError"),
                    TestOutcome::passed("test_HW.py::test_add_9"),
                ],
                options,
            )
            .unwrap();

            assert!(result.aborted, "{:?}", policy);
            assert_eq!(result.mark, Some(0.0));
            assert_eq!(result.error_messages, vec!["ImportError"]);
            assert!(result.quarantined.is_empty());
        }
    }

    #[test]
    fn test_unweighted_mandatory_pass_is_neutral() {
        for policy in [MalformedPolicy::Exclude, MalformedPolicy::Abort] {
            let options = ScoreOptions {
                malformed_policy: policy,
                ..Default::default()
            };
            let result = score(
                vec![
                    TestOutcome::passed("test_HW.py::test_x_mandatory"),
                    TestOutcome::passed("test_HW.py::test_add_3"),
                    TestOutcome::failed("test_HW.py::test_sub_1", "assert 0 == 1"),
                ],
                options,
            )
            .unwrap();

            assert!(!result.aborted, "{:?}", policy);
            assert!(result.quarantined.is_empty());
            assert_eq!(result.pass_points, 3);
            assert_eq!(result.fail_points, 1);
            assert_eq!(result.mark, Some(75.0));
        }
    }

    #[test]
    fn test_errored_unweighted_mandatory_aborts() {
        let result = score(
            vec![
                TestOutcome::passed("t_4"),
                TestOutcome::errored("test_x_mandatory", "fixture 'db' not found"),
            ],
            with_letters(),
        )
        .unwrap();
        assert!(result.aborted);
        assert_eq!(result.letter_grade, Some(LetterGrade::F));
    }

    #[test]
    fn test_passing_mandatory_carries_no_points() {
        let result = score(
            vec![TestOutcome::passed("t_2_mandatory"), TestOutcome::passed("t_4")],
            ScoreOptions::default(),
        )
        .unwrap();
        assert!(!result.aborted);
        assert_eq!(result.pass_points, 4);
        assert_eq!(result.mark, Some(100.0));
    }

    #[test]
    fn test_empty_is_ungraded() {
        let result = score(Vec::new(), with_letters()).unwrap();
        assert_eq!(result.mark, None);
        assert!(result.is_ungraded());
        assert_eq!(result.pass_points, 0);
        assert_eq!(result.fail_points, 0);
        assert_eq!(result.letter_grade, None);
        assert!(!result.aborted);
    }

    #[test]
    fn test_skipped_contributes_nothing() {
        let result = score(
            vec![TestOutcome::skipped("t_1"), TestOutcome::skipped("t_7")],
            ScoreOptions::default(),
        )
        .unwrap();
        assert_eq!(result.mark, None);
        assert!(result.error_messages.is_empty());
    }

    #[test]
    fn test_all_failed_is_zero_not_ungraded() {
        let result =
            score(vec![TestOutcome::failed("t_3", "nope")], ScoreOptions::default()).unwrap();
        assert_eq!(result.mark, Some(0.0));
        assert!(!result.is_ungraded());
    }

    #[test]
    fn test_zero_weight_only_is_ungraded() {
        let result = score(
            vec![TestOutcome::passed("t_0"), TestOutcome::failed("u_0", "x")],
            ScoreOptions::default(),
        )
        .unwrap();
        assert_eq!(result.mark, None);
    }

    #[test]
    fn test_malformed_identifier_is_quarantined() {
        let result = score(
            vec![
                TestOutcome::passed("t_5"),
                TestOutcome::failed("foo_bar", "boom"),
                TestOutcome::failed("t_5", "late failure"),
            ],
            ScoreOptions::default(),
        )
        .unwrap();

        assert_eq!(result.pass_points, 5);
        assert_eq!(result.fail_points, 5);
        assert_eq!(result.mark, Some(50.0));
        assert_eq!(
            result.quarantined,
            vec![QuarantinedTest {
                identifier: "foo_bar".to_string(),
                status: TestStatus::Failed,
                reason: "no weight segment".to_string(),
            }]
        );
        assert_eq!(result.error_messages.len(), 2);
        assert!(result.error_messages[0].contains("foo_bar"));
        assert_eq!(result.error_messages[1], "late failure");
    }

    #[test]
    fn test_malformed_identifier_abort_policy() {
        let options = ScoreOptions {
            malformed_policy: MalformedPolicy::Abort,
            ..Default::default()
        };
        let err = score(vec![TestOutcome::passed("foo_bar")], options).unwrap_err();
        assert_eq!(err.identifier(), "foo_bar");
    }

    #[test]
    fn test_letter_grades() {
        // 11/20 = 55% is an E; 509/1000 = 50.9% is an F
        let result = score(
            vec![TestOutcome::passed("t_11"), TestOutcome::failed("t_9", "x")],
            with_letters(),
        )
        .unwrap();
        assert_eq!(result.mark, Some(55.0));
        assert_eq!(result.letter_grade, Some(LetterGrade::E));

        let result = score(
            vec![TestOutcome::passed("t_509"), TestOutcome::failed("t_491", "x")],
            with_letters(),
        )
        .unwrap();
        assert_eq!(result.mark, Some(50.9));
        assert_eq!(result.letter_grade, Some(LetterGrade::F));
    }

    #[test]
    fn test_mark_rounding() {
        assert_eq!(compute_mark(1, 2), Some(33.33));
        assert_eq!(compute_mark(2, 1), Some(66.67));
        assert_eq!(compute_mark(0, 0), None);
        assert_eq!(compute_mark(u32::MAX, u32::MAX), Some(50.0));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("Abort".parse::<MalformedPolicy>(), Ok(MalformedPolicy::Abort));
        assert_eq!("exclude".parse::<MalformedPolicy>(), Ok(MalformedPolicy::Exclude));
        assert!("ignore".parse::<MalformedPolicy>().is_err());
    }
}
