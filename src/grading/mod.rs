//! Grading pipeline
//!
//! Everything between a raw sandbox artifact and a [`GradeResult`](crate::models::GradeResult):
//!
//! - `extractor`: artifact → ordered test outcomes
//! - `weight`: test identifier → points and mandatory flag
//! - `scorer`: weighted outcomes → mark, letter grade and diagnostics

pub mod extractor;
pub mod scorer;
pub mod weight;

pub use extractor::{ExtractError, ExtractorKind, ResultExtractor};
pub use scorer::{MalformedPolicy, ScoreOptions, score};
pub use weight::{WeightError, WeightSpec, decode};
