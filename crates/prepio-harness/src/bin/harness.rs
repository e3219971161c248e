//! CLI entrypoint for the prepio conformance harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use prepio_harness::report::{RunSummary, write_results};
use prepio_harness::structured_log::{LogEmitter, LogLevel, validate_log_file};
use prepio_harness::{ScenarioRunner, ScenarioSet};

/// Conformance tooling for prepio buffered files.
#[derive(Debug, Parser)]
#[command(name = "prepio-harness")]
#[command(about = "Scenario-driven conformance harness for prepio buffered files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a scenario set against the buffered-file implementation.
    Run {
        /// Scenario set JSON (defaults to the built-in buffered-I/O set).
        #[arg(long)]
        fixture: Option<PathBuf>,
        /// Working directory the scenario files are created in.
        #[arg(long)]
        workdir: PathBuf,
        /// Results file (`NAME, PASSED|FAILED` lines).
        #[arg(long)]
        results: Option<PathBuf>,
        /// Structured JSONL log output.
        #[arg(long)]
        log: Option<PathBuf>,
        /// JSON run summary output.
        #[arg(long)]
        summary: Option<PathBuf>,
        /// Buffer capacity for every opened handle (defaults to PREPIO_BUFSIZ).
        #[arg(long)]
        capacity: Option<usize>,
    },
    /// List the scenarios of a set.
    List {
        /// Scenario set JSON (defaults to the built-in buffered-I/O set).
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Validate a structured JSONL log.
    ValidateLog {
        /// JSONL log path.
        #[arg(long)]
        log: PathBuf,
    },
}

fn load_set(fixture: Option<&PathBuf>) -> Result<ScenarioSet, Box<dyn std::error::Error>> {
    let set = match fixture {
        Some(path) => ScenarioSet::from_file(path)
            .map_err(|err| format!("failed loading {}: {err}", path.display()))?,
        None => ScenarioSet::builtin()?,
    };
    set.validate()?;
    Ok(set)
}

fn run_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("run-{}-{nanos}", std::process::id())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            fixture,
            workdir,
            results,
            log,
            summary,
            capacity,
        } => {
            let set = load_set(fixture.as_ref())?;
            std::fs::create_dir_all(&workdir)?;

            let mut runner = ScenarioRunner::new(&workdir);
            if let Some(capacity) = capacity {
                runner = runner.with_capacity(capacity);
            }

            let mut emitter = match &log {
                Some(path) => Some(LogEmitter::to_file(path, &run_id())?),
                None => None,
            };
            if let Some(emitter) = emitter.as_mut() {
                let start = emitter
                    .entry(LogLevel::Info, "run_start")
                    .with_details(serde_json::json!({
                        "family": set.family,
                        "version": set.version,
                        "cases": set.cases.len(),
                        "workdir": workdir.display().to_string(),
                    }));
                emitter.emit_entry(start)?;
            }

            eprintln!(
                "Running {} scenarios from {} in {}",
                set.cases.len(),
                set.family,
                workdir.display()
            );
            let scenario_results = runner.run_set(&set, emitter.as_mut())?;
            for r in &scenario_results {
                match (&r.passed, &r.failed_step, &r.detail) {
                    (true, _, _) => eprintln!("  {} PASSED", r.name),
                    (false, Some(step), Some(detail)) => {
                        eprintln!("  {} FAILED at step {step}: {detail}", r.name);
                    }
                    (false, _, _) => eprintln!("  {} FAILED", r.name),
                }
            }

            if let Some(path) = &results {
                write_results(path, &scenario_results)?;
                eprintln!("Wrote results to {}", path.display());
            }

            let run_summary = RunSummary::new(&set.family, &set.version, scenario_results);
            if let Some(emitter) = emitter.as_mut() {
                let level = if run_summary.all_passed() {
                    LogLevel::Info
                } else {
                    LogLevel::Error
                };
                let end = emitter
                    .entry(level, "run_end")
                    .with_details(serde_json::json!({
                        "total": run_summary.total,
                        "passed": run_summary.passed,
                        "failed": run_summary.failed,
                        "metrics": run_summary.metrics,
                    }));
                emitter.emit_entry(end)?;
                emitter.flush()?;
            }
            if let Some(path) = &summary {
                std::fs::write(path, run_summary.to_json())?;
                eprintln!("Wrote summary to {}", path.display());
            }

            eprintln!(
                "Run complete: total={}, passed={}, failed={}",
                run_summary.total, run_summary.passed, run_summary.failed
            );
            if !run_summary.all_passed() {
                return Err("Scenario run failed".into());
            }
        }
        Command::List { fixture } => {
            let set = load_set(fixture.as_ref())?;
            println!("{} ({})", set.family, set.version);
            for case in &set.cases {
                match &case.description {
                    Some(desc) => println!(
                        "  {:<26} {:<22} {} steps  {desc}",
                        case.name,
                        case.file,
                        case.steps.len()
                    ),
                    None => println!(
                        "  {:<26} {:<22} {} steps",
                        case.name,
                        case.file,
                        case.steps.len()
                    ),
                }
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for err in &errors {
                eprintln!("{err}");
            }
            eprintln!(
                "Validated {} lines in {}: {} errors",
                lines,
                log.display(),
                errors.len()
            );
            if !errors.is_empty() {
                return Err("Structured log validation failed".into());
            }
        }
    }

    Ok(())
}
