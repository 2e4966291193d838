//! CLI command implementations.

pub mod job;
pub mod queue;
pub mod schedule;
