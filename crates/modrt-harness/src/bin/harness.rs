//! CLI entry point for the modrt lifecycle harness.

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use serde::Serialize;

use modrt_harness::scenario::{ScenarioOutcome, ScenarioSet};
use modrt_harness::structured_log::{
    ArtifactIndex, LogEmitter, LogEntry, LogLevel, Outcome, validate_log_file,
};

/// Lifecycle conformance tooling for modrt.
#[derive(Debug, Parser)]
#[command(name = "modrt-harness")]
#[command(about = "Replay lifecycle scenarios and validate structured logs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay every scenario of a fixture file.
    RunScenarios {
        /// Scenario fixture JSON.
        #[arg(long, default_value = "tests/conformance/lifecycle_scenarios.v1.json")]
        fixture: PathBuf,
        /// JSONL log output path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// JSON report output path.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Artifact index output path (hashes of log and report).
        #[arg(long)]
        artifact_index: Option<PathBuf>,
        /// Run identifier used in trace ids.
        #[arg(long, default_value = "local")]
        run_id: String,
    },
    /// Validate a structured JSONL log file.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    suite: &'a str,
    run_id: &'a str,
    total: usize,
    passed: usize,
    failed: usize,
    scenarios: &'a [ScenarioOutcome],
}

fn log_outcome(emitter: &mut LogEmitter, outcome: &ScenarioOutcome) -> std::io::Result<()> {
    let (level, verdict) = if outcome.passed() {
        (LogLevel::Info, Outcome::Pass)
    } else {
        (LogLevel::Error, Outcome::Fail)
    };
    let phase = serde_json::to_value(outcome.final_phase)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let entry = LogEntry::new("", level, "scenario_result")
        .with_scenario(&outcome.name)
        .with_symbol("lifecycle")
        .with_phase(phase)
        .with_outcome(verdict)
        .with_status(outcome.start_status)
        .with_details(serde_json::json!({
            "trace": outcome.trace,
            "event_count": outcome.events.len(),
            "mismatches": outcome.mismatches,
        }));
    emitter.emit_entry(entry).map(|_| ())
}

fn run_scenarios(
    fixture: PathBuf,
    log: Option<PathBuf>,
    report: Option<PathBuf>,
    artifact_index: Option<PathBuf>,
    run_id: String,
) -> Result<bool, Box<dyn std::error::Error>> {
    let set = ScenarioSet::from_file(&fixture)?;
    eprintln!(
        "Replaying {} scenarios from {}",
        set.scenarios.len(),
        fixture.display()
    );

    let started = Instant::now();
    let outcomes = set.run_all()?;
    let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    for outcome in &outcomes {
        let mark = if outcome.passed() { "PASS" } else { "FAIL" };
        eprintln!("  [{mark}] {}", outcome.name);
        for mismatch in &outcome.mismatches {
            eprintln!("         {mismatch}");
        }
    }
    let passed = outcomes.iter().filter(|o| o.passed()).count();
    let failed = outcomes.len() - passed;
    eprintln!("{passed}/{} scenarios passed", outcomes.len());

    if let Some(path) = &log {
        let mut emitter = LogEmitter::to_file(path, &set.suite, &run_id)?;
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Info, "run_start")
                .with_details(serde_json::json!({ "fixture": fixture.display().to_string() })),
        )?;
        for outcome in &outcomes {
            log_outcome(&mut emitter, outcome)?;
        }
        let mut artifacts = vec![fixture.display().to_string()];
        artifacts.extend(report.iter().map(|p| p.display().to_string()));
        artifacts.extend(artifact_index.iter().map(|p| p.display().to_string()));
        emitter.emit_entry(
            LogEntry::new("", LogLevel::Info, "run_end")
                .with_duration_ms(elapsed_ms)
                .with_artifacts(artifacts)
                .with_details(serde_json::json!({ "passed": passed, "failed": failed })),
        )?;
        emitter.flush()?;
    }

    if let Some(path) = &report {
        let body = RunReport {
            suite: &set.suite,
            run_id: &run_id,
            total: outcomes.len(),
            passed,
            failed,
            scenarios: &outcomes,
        };
        std::fs::write(path, serde_json::to_string_pretty(&body)?)?;
    }

    if let Some(path) = &artifact_index {
        let mut index = ArtifactIndex::new(&run_id, &set.suite);
        index.add_file(&fixture, "fixture")?;
        if let Some(log) = &log {
            index.add_file(log, "log")?;
        }
        if let Some(report) = &report {
            index.add_file(report, "report")?;
        }
        std::fs::write(path, index.to_json()?)?;
    }

    Ok(failed == 0)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::RunScenarios {
            fixture,
            log,
            report,
            artifact_index,
            run_id,
        } => {
            if !run_scenarios(fixture, log, report, artifact_index, run_id)? {
                std::process::exit(1);
            }
        }
        Command::ValidateLog { log } => {
            let (lines, errors) = validate_log_file(&log)?;
            for error in &errors {
                eprintln!("{error}");
            }
            eprintln!("{lines} lines, {} errors", errors.len());
            if !errors.is_empty() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
