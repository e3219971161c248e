//! Conformance harness for prepio buffered files.
//!
//! This crate provides:
//! - Fixtures: JSON scenario sets describing open/write/read/flush/close steps
//! - Runner: executes scenarios against `prepio-core` in a working directory
//! - Report: the line-oriented results file plus a JSON summary
//! - Structured logging: one JSONL record per executed step

#![forbid(unsafe_code)]

pub mod fixtures;
pub mod report;
pub mod runner;
pub mod structured_log;

pub use fixtures::{Scenario, ScenarioSet, Step};
pub use report::RunSummary;
pub use runner::{ScenarioResult, ScenarioRunner};
