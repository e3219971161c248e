//! Fixture loading and management.
//!
//! A fixture is a named sequence of steps against one file. Scenarios in a
//! set share the working directory and run in order, so a later scenario
//! may depend on the file a previous one left behind.

use serde::{Deserialize, Serialize};

/// Built-in scenario set mirroring the reference buffered-I/O driver.
const BUILTIN_BUFFERED_IO: &str = include_str!("../fixtures/buffered_io.v1.json");

#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("fixture io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("fixture json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown open flag '{0}'")]
    UnknownFlag(String),
    #[error("invalid permission bits '{0}' (expected octal like \"0644\")")]
    BadMode(String),
}

/// One operation inside a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Open the scenario file. Closes any handle still open.
    Open {
        /// Symbolic flags, e.g. `["O_RDWR", "O_PREAPPEND"]`.
        flags: Vec<String>,
        /// Octal permission bits used with `O_CREAT`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<String>,
    },
    /// Buffered write of `data`, `repeat` times.
    Write {
        data: String,
        #[serde(default = "one")]
        repeat: usize,
    },
    /// Buffered read of `len` bytes; the delivered bytes must equal `expect`.
    Read { len: usize, expect: String },
    Flush,
    Close,
    /// Read the file directly (bypassing the handle) and compare.
    ExpectFile { content: String },
    /// Replace the file's content directly before the next step.
    SeedFile { content: String },
}

fn one() -> usize {
    1
}

impl Step {
    /// Short operation name used in logs and failure details.
    #[must_use]
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Write { .. } => "write",
            Self::Read { .. } => "read",
            Self::Flush => "flush",
            Self::Close => "close",
            Self::ExpectFile { .. } => "expect_file",
            Self::SeedFile { .. } => "seed_file",
        }
    }
}

/// A single scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Result name (e.g. `TEST_BUFFERED_OPEN`).
    pub name: String,
    /// File name, relative to the working directory.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<Step>,
}

/// A collection of scenarios for one family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSet {
    /// Schema version.
    pub version: String,
    /// Scenario family name.
    pub family: String,
    pub cases: Vec<Scenario>,
}

impl ScenarioSet {
    /// Load scenario set from JSON string.
    pub fn from_json(json: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize scenario set to JSON string.
    pub fn to_json(&self) -> Result<String, FixtureError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load scenario set from a file path.
    pub fn from_file(path: &std::path::Path) -> Result<Self, FixtureError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// The built-in buffered-I/O scenario set.
    pub fn builtin() -> Result<Self, FixtureError> {
        Self::from_json(BUILTIN_BUFFERED_IO)
    }

    /// Check every step's flags and modes resolve, before anything runs.
    pub fn validate(&self) -> Result<(), FixtureError> {
        for case in &self.cases {
            for step in &case.steps {
                if let Step::Open { flags, mode } = step {
                    parse_flags(flags)?;
                    parse_mode(mode.as_deref())?;
                }
            }
        }
        Ok(())
    }
}

/// Resolve symbolic open flags to their numeric value.
pub fn parse_flags(names: &[String]) -> Result<i32, FixtureError> {
    names.iter().try_fold(0i32, |acc, name| {
        let bit = match name.as_str() {
            "O_RDONLY" => libc::O_RDONLY,
            "O_WRONLY" => libc::O_WRONLY,
            "O_RDWR" => libc::O_RDWR,
            "O_CREAT" => libc::O_CREAT,
            "O_TRUNC" => libc::O_TRUNC,
            "O_EXCL" => libc::O_EXCL,
            "O_APPEND" => libc::O_APPEND,
            "O_PREAPPEND" => prepio_core::O_PREAPPEND,
            other => return Err(FixtureError::UnknownFlag(other.to_string())),
        };
        Ok(acc | bit)
    })
}

/// Parse octal permission bits; absent means `0`.
pub fn parse_mode(mode: Option<&str>) -> Result<u32, FixtureError> {
    match mode {
        None => Ok(0),
        Some(s) => {
            let digits = s.trim().trim_start_matches("0o");
            u32::from_str_radix(digits, 8)
                .ok()
                .filter(|m| *m <= 0o7777)
                .ok_or_else(|| FixtureError::BadMode(s.to_string()))
        }
    }
}
