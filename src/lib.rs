//! Autograder - Sandboxed pytest grading for homework submissions
//!
//! Runs an instructor's fixed test suite against a student's submission inside
//! a throwaway container and turns the outcomes into a weighted mark.
//!
//! # Architecture
//!
//! - **Sandbox**: provisions the container, injects files, runs the tests
//! - **Grading**: extracts per-test outcomes, decodes weights, scores
//! - **Services**: the single `grade(assignment, submitter)` entry point
//! - **Models**: outcomes and grade results

pub mod config;
pub mod constants;
pub mod error;
pub mod grading;
pub mod models;
pub mod sandbox;
pub mod services;

// Re-export commonly used types
pub use config::Config;
pub use error::{GradeError, GraderResult};
pub use models::GradeResult;
pub use services::GradingService;
