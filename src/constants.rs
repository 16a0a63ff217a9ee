//! Application-wide constants
//!
//! This module contains all constant values used throughout the grader.
//! Constants are grouped by their purpose for better organization.

// =============================================================================
// STORAGE DEFAULTS
// =============================================================================

/// Default directory holding uploaded submissions
pub const DEFAULT_SUBMISSIONS_PATH: &str = "./HW";

/// Default directory holding instructor test suites
pub const DEFAULT_TEST_SUITES_PATH: &str = "./TESTS";

/// Default directory receiving retrieved report artifacts
pub const DEFAULT_REPORTS_PATH: &str = "./HW";

// =============================================================================
// SANDBOX DEFAULTS
// =============================================================================

/// Default base image for grading containers
pub const DEFAULT_SANDBOX_IMAGE: &str = "python:latest";

/// Default wall-clock limit for the test command, in seconds
pub const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 120;

/// Default memory limit per grading container, in megabytes
pub const DEFAULT_SANDBOX_MEMORY_LIMIT_MB: u64 = 512;

/// Largest accepted memory limit, in megabytes (1 TiB)
pub const MAX_SANDBOX_MEMORY_LIMIT_MB: u64 = 1024 * 1024;

/// Maximum number of processes inside a grading container
pub const SANDBOX_PIDS_LIMIT: i64 = 128;

/// Prefix for grading container names
pub const CONTAINER_NAME_PREFIX: &str = "autograder";

/// Working directory inside the container
pub const SANDBOX_WORKDIR: &str = "/workspace";

/// Name the test suite imports the submission under
pub const SUBMISSION_MODULE_FILE: &str = "HW.py";

/// Name the test suite is injected under
pub const TEST_ENTRY_FILE: &str = "test_HW.py";

/// Placeholder in the test command replaced by the per-run report file name
pub const REPORT_PLACEHOLDER: &str = "{report}";

/// Test command emitting a pytest-json-report document
pub const JSON_REPORT_TEST_COMMAND: &str =
    "pytest test_HW.py -q --json-report --json-report-file={report}";

/// Test command emitting a verbose pytest transcript
pub const TEXT_LOG_TEST_COMMAND: &str = "pytest test_HW.py -v";

/// Packages always installed before the test command when installation is enabled
pub const JSON_REPORT_PACKAGES: &[&str] = &["pytest", "pytest-json-report"];

// =============================================================================
// GRADING
// =============================================================================

/// Segment marking a test whose failure zeroes the submission
pub const MANDATORY_MARKER: &str = "mandatory";

/// Separator between path components of a pytest node id
pub const NODE_ID_SEPARATOR: &str = "::";

/// Letter grade thresholds, checked in order against the mark
pub mod letter_thresholds {
    pub const A: f64 = 90.0;
    pub const B: f64 = 80.0;
    pub const C: f64 = 70.0;
    pub const D: f64 = 60.0;
    /// E starts at 51, not 50
    pub const E: f64 = 51.0;
}

// =============================================================================
// ARTIFACT NAMING
// =============================================================================

/// File name of a submission for `(assignment, submitter)`
pub fn submission_file_name(assignment_id: i64, submitter_id: i64) -> String {
    format!("HW_{}_{}.py", assignment_id, submitter_id)
}

/// File name of the fixed test suite for an assignment
pub fn test_suite_file_name(assignment_id: i64) -> String {
    format!("test_HW_{}.py", assignment_id)
}

/// Durable report file name for `(assignment, submitter)`
pub fn report_file_name(assignment_id: i64, submitter_id: i64, extension: &str) -> String {
    format!("HW_{}_{}_report.{}", assignment_id, submitter_id, extension)
}
