//! Domain models
//!
//! This module contains the types exchanged between the grading stages and
//! handed back to callers.

pub mod grade;
pub mod outcome;

pub use grade::*;
pub use outcome::*;
