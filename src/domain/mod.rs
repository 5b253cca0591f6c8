//! Domain layer types and invariants.

pub mod birth;
pub mod error;
pub mod report;
