//! Scenario execution engine.

use std::path::{Path, PathBuf};
use std::time::Instant;

use prepio_core::{BufferedFile, OpenOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::fixtures::{Scenario, ScenarioSet, Step, parse_flags, parse_mode};
use crate::structured_log::{LogEmitter, LogLevel, Outcome};

/// Outcome of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub passed: bool,
    /// Index of the first failing step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    /// What went wrong at `failed_step`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// SHA-256 of the scenario file after the run, when it exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_sha256: Option<String>,
}

/// Why a step failed.
#[derive(Debug)]
struct StepFailure {
    errno: Option<i32>,
    message: String,
}

impl StepFailure {
    fn msg(message: impl Into<String>) -> Self {
        Self {
            errno: None,
            message: message.into(),
        }
    }

    fn from_io(what: &str, err: prepio_core::BufferedFileError) -> Self {
        Self {
            errno: Some(err.errno()),
            message: format!("{what}: {err}"),
        }
    }
}

/// Runs scenario sets in a working directory.
pub struct ScenarioRunner {
    workdir: PathBuf,
    capacity: Option<usize>,
}

impl ScenarioRunner {
    /// Create a runner rooted at `workdir` (must exist).
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            capacity: None,
        }
    }

    /// Override the buffer capacity of every handle the runner opens.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Run every scenario in order. Later scenarios see the files earlier
    /// ones left behind.
    pub fn run_set(
        &self,
        set: &ScenarioSet,
        mut log: Option<&mut LogEmitter>,
    ) -> std::io::Result<Vec<ScenarioResult>> {
        set.cases
            .iter()
            .map(|case| self.run_scenario(case, log.as_deref_mut()))
            .collect()
    }

    /// Run one scenario, stopping at its first failing step.
    pub fn run_scenario(
        &self,
        scenario: &Scenario,
        mut log: Option<&mut LogEmitter>,
    ) -> std::io::Result<ScenarioResult> {
        let path = self.workdir.join(&scenario.file);
        let mut handle: Option<BufferedFile> = None;
        let mut failure: Option<(usize, StepFailure)> = None;

        for (index, step) in scenario.steps.iter().enumerate() {
            let started = Instant::now();
            let outcome = self.exec_step(step, &path, &mut handle);
            let elapsed = started.elapsed().as_nanos() as u64;

            if let Some(emitter) = log.as_deref_mut() {
                let mut entry = emitter
                    .entry(LogLevel::Info, "step")
                    .with_scenario(&scenario.name)
                    .with_step(index, step.op_name())
                    .with_latency_ns(elapsed);
                entry = match &outcome {
                    Ok(bytes) => {
                        let entry = entry.with_outcome(Outcome::Pass);
                        match bytes {
                            Some(n) => entry.with_bytes(*n),
                            None => entry,
                        }
                    }
                    Err(fail) => {
                        let mut entry = entry
                            .with_outcome(Outcome::Fail)
                            .with_details(serde_json::json!({ "message": fail.message }));
                        entry.level = LogLevel::Error;
                        match fail.errno {
                            Some(errno) => entry.with_errno(errno),
                            None => entry,
                        }
                    }
                };
                emitter.emit_entry(entry)?;
            }

            if let Err(fail) = outcome {
                failure = Some((index, fail));
                break;
            }
        }

        // A handle left open by the scenario (or by a failure) is closed
        // before the file is fingerprinted.
        if let Some(open) = handle.take()
            && let Err(err) = open.close()
            && failure.is_none()
        {
            failure = Some((
                scenario.steps.len(),
                StepFailure::from_io("implicit close", err),
            ));
        }

        let result = ScenarioResult {
            name: scenario.name.clone(),
            passed: failure.is_none(),
            failed_step: failure.as_ref().map(|(i, _)| *i),
            detail: failure.map(|(_, f)| f.message),
            file_sha256: sha256_file(&path),
        };

        if let Some(emitter) = log {
            let entry = emitter
                .entry(
                    if result.passed {
                        LogLevel::Info
                    } else {
                        LogLevel::Error
                    },
                    "scenario_end",
                )
                .with_scenario(&scenario.name)
                .with_outcome(if result.passed {
                    Outcome::Pass
                } else {
                    Outcome::Fail
                })
                .with_details(serde_json::to_value(&result).map_err(std::io::Error::other)?);
            emitter.emit_entry(entry)?;
        }
        Ok(result)
    }

    /// Execute one step. `Ok` carries the byte count for reads and writes.
    fn exec_step(
        &self,
        step: &Step,
        path: &Path,
        handle: &mut Option<BufferedFile>,
    ) -> Result<Option<u64>, StepFailure> {
        match step {
            Step::Open { flags, mode } => {
                if let Some(previous) = handle.take() {
                    previous
                        .close()
                        .map_err(|e| StepFailure::from_io("close before reopen", e))?;
                }
                let flags = parse_flags(flags).map_err(|e| StepFailure::msg(e.to_string()))?;
                let mode =
                    parse_mode(mode.as_deref()).map_err(|e| StepFailure::msg(e.to_string()))?;
                let mut options = OpenOptions::from_oflags(flags, mode)
                    .map_err(|e| StepFailure::from_io("open", e))?;
                if let Some(capacity) = self.capacity {
                    options = options.capacity(capacity);
                }
                let file =
                    BufferedFile::open(path, &options).map_err(|e| StepFailure::from_io("open", e))?;
                *handle = Some(file);
                Ok(None)
            }
            Step::Write { data, repeat } => {
                let file = open_handle(handle)?;
                let mut total = 0u64;
                for _ in 0..*repeat {
                    let n = file
                        .write(data.as_bytes())
                        .map_err(|e| StepFailure::from_io("write", e))?;
                    if n != data.len() {
                        return Err(StepFailure::msg(format!(
                            "write accepted {n} of {} bytes",
                            data.len()
                        )));
                    }
                    total += n as u64;
                }
                Ok(Some(total))
            }
            Step::Read { len, expect } => {
                let file = open_handle(handle)?;
                let mut buf = vec![0u8; *len];
                let n = file
                    .read(&mut buf)
                    .map_err(|e| StepFailure::from_io("read", e))?;
                if &buf[..n] != expect.as_bytes() {
                    return Err(StepFailure::msg(format!(
                        "read {n} bytes {:?}, expected {:?}",
                        String::from_utf8_lossy(&buf[..n]),
                        expect
                    )));
                }
                Ok(Some(n as u64))
            }
            Step::Flush => {
                open_handle(handle)?
                    .flush()
                    .map_err(|e| StepFailure::from_io("flush", e))?;
                Ok(None)
            }
            Step::Close => {
                let file = handle
                    .take()
                    .ok_or_else(|| StepFailure::msg("close without an open handle"))?;
                file.close().map_err(|e| StepFailure::from_io("close", e))?;
                Ok(None)
            }
            Step::ExpectFile { content } => {
                let actual = std::fs::read(path).map_err(|e| StepFailure {
                    errno: e.raw_os_error(),
                    message: format!("reading {}: {e}", path.display()),
                })?;
                if actual != content.as_bytes() {
                    return Err(StepFailure::msg(format!(
                        "file holds {:?}, expected {:?}",
                        String::from_utf8_lossy(&actual),
                        content
                    )));
                }
                Ok(Some(actual.len() as u64))
            }
            Step::SeedFile { content } => {
                std::fs::write(path, content.as_bytes()).map_err(|e| StepFailure {
                    errno: e.raw_os_error(),
                    message: format!("seeding {}: {e}", path.display()),
                })?;
                Ok(Some(content.len() as u64))
            }
        }
    }
}

fn open_handle(handle: &mut Option<BufferedFile>) -> Result<&mut BufferedFile, StepFailure> {
    handle
        .as_mut()
        .ok_or_else(|| StepFailure::msg("no open handle"))
}

pub(crate) fn hex_lower(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

fn sha256_file(path: &Path) -> Option<String> {
    let data = std::fs::read(path).ok()?;
    Some(hex_lower(&Sha256::digest(&data)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workdir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "prepio-runner-{tag}-{}-{nanos}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn scenario(steps: Vec<Step>) -> Scenario {
        Scenario {
            name: "S".into(),
            file: "f.txt".into(),
            description: None,
            steps,
        }
    }

    #[test]
    fn seeded_prepend_scenario_passes() {
        let dir = workdir("pass");
        let s = scenario(vec![
            Step::SeedFile {
                content: "world".into(),
            },
            Step::Open {
                flags: vec!["O_RDWR".into(), "O_PREAPPEND".into()],
                mode: None,
            },
            Step::Write {
                data: "hello ".into(),
                repeat: 1,
            },
            Step::Close,
            Step::ExpectFile {
                content: "hello world".into(),
            },
        ]);
        let result = ScenarioRunner::new(&dir).run_scenario(&s, None).unwrap();
        assert!(result.passed, "{result:?}");
        assert_eq!(
            result.file_sha256.as_deref(),
            Some(hex_lower(&Sha256::digest(b"hello world")).as_str())
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn first_failing_step_is_reported() {
        let dir = workdir("fail");
        let s = scenario(vec![
            Step::SeedFile {
                content: "abc".into(),
            },
            Step::Open {
                flags: vec!["O_RDONLY".into()],
                mode: None,
            },
            Step::Read {
                len: 3,
                expect: "abd".into(),
            },
            Step::Close,
        ]);
        let result = ScenarioRunner::new(&dir).run_scenario(&s, None).unwrap();
        assert!(!result.passed);
        assert_eq!(result.failed_step, Some(2));
        assert!(result.detail.unwrap().contains("expected"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn conflicting_open_fails_first_step() {
        let dir = workdir("conflict");
        let s = scenario(vec![Step::Open {
            flags: vec!["O_RDWR".into(), "O_APPEND".into(), "O_PREAPPEND".into()],
            mode: None,
        }]);
        let result = ScenarioRunner::new(&dir).run_scenario(&s, None).unwrap();
        assert!(!result.passed);
        assert_eq!(result.failed_step, Some(0));
        assert!(result.file_sha256.is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn steps_without_a_handle_fail() {
        let dir = workdir("nohandle");
        let s = scenario(vec![Step::Flush]);
        let result = ScenarioRunner::new(&dir).run_scenario(&s, None).unwrap();
        assert_eq!(result.failed_step, Some(0));
        assert_eq!(result.detail.as_deref(), Some("no open handle"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
