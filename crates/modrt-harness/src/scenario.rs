//! Lifecycle scenario fixtures and runner.
//!
//! A scenario names the entries of the four section tables, the exit
//! callbacks registered while the module runs, and how the module is torn
//! down. Every entry appends its name to a shared trace when invoked; the
//! runner replays the scenario on an isolated [`LifecycleContext`] and
//! compares trace, start status, pool policy and final phase with the
//! fixture's expectation.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use modrt_core::policy::{FixedHostVersion, VersionQueryError};
use modrt_core::{
    EventSink, ExitKind, HostVersion, InitTables, LifecycleContext, LifecycleEvent, Phase,
    PoolPolicy, PoolType, TermTables,
};

/// Fixture schema understood by this runner.
pub const FIXTURE_VERSION: &str = "v1";

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read fixture {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid fixture JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported fixture version {0:?} (expected \"v1\")")]
    UnsupportedVersion(String),
    #[error("scenario {scenario}: invalid host version: {source}")]
    InvalidHostVersion {
        scenario: String,
        #[source]
        source: VersionQueryError,
    },
    #[error("scenario {scenario} mismatched: {}", .details.join("; "))]
    Mismatch {
        scenario: String,
        details: Vec<String>,
    },
}

/// Status-returning initializer entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusEntry {
    pub name: String,
    #[serde(default)]
    pub status: i32,
}

/// Exit callback registered after a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registration {
    pub kind: ExitKind,
    pub name: String,
    /// The callback panics after recording its name.
    #[serde(default)]
    pub panics: bool,
}

/// How the scenario ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Teardown {
    #[default]
    Shutdown,
    QuickExit,
    /// Leave the module as it is after start.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Expectation {
    #[serde(default)]
    pub start_status: i32,
    pub trace: Vec<String>,
    #[serde(default)]
    pub pool_type: Option<PoolType>,
    #[serde(default)]
    pub mdl_protection: Option<u32>,
    #[serde(default)]
    pub final_phase: Option<Phase>,
    #[serde(default)]
    pub failed_registrations: usize,
    #[serde(default)]
    pub contained_panics: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// `major.minor[.build]`; absent means the version query fails.
    #[serde(default)]
    pub host_version: Option<String>,
    #[serde(default)]
    pub exit_record_limit: Option<usize>,
    #[serde(default)]
    pub status_initializers: Vec<Option<StatusEntry>>,
    #[serde(default)]
    pub initializers: Vec<Option<String>>,
    #[serde(default)]
    pub registrations: Vec<Registration>,
    #[serde(default)]
    pub pre_terminators: Vec<Option<String>>,
    #[serde(default)]
    pub terminators: Vec<Option<String>>,
    #[serde(default)]
    pub teardown: Teardown,
    pub expect: Expectation,
}

/// A fixture file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub version: String,
    pub suite: String,
    pub scenarios: Vec<Scenario>,
}

impl ScenarioSet {
    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        let set: Self = serde_json::from_str(json)?;
        if set.version != FIXTURE_VERSION {
            return Err(ScenarioError::UnsupportedVersion(set.version));
        }
        Ok(set)
    }

    pub fn from_file(path: &Path) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Run every scenario in file order.
    pub fn run_all(&self) -> Result<Vec<ScenarioOutcome>, ScenarioError> {
        self.scenarios.iter().map(Scenario::run).collect()
    }
}

/// Event sink that keeps every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: RefCell<Vec<LifecycleEvent>>,
}

impl RecordingSink {
    pub fn take_events(&self) -> Vec<LifecycleEvent> {
        self.events.take()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &LifecycleEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// What a scenario run observed.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub start_status: i32,
    pub trace: Vec<String>,
    pub policy: PoolPolicy,
    pub final_phase: Phase,
    pub failed_registrations: usize,
    pub contained_panics: usize,
    pub events: Vec<LifecycleEvent>,
    pub mismatches: Vec<String>,
}

impl ScenarioOutcome {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn ensure_passed(&self) -> Result<(), ScenarioError> {
        if self.passed() {
            return Ok(());
        }
        Err(ScenarioError::Mismatch {
            scenario: self.name.clone(),
            details: self.mismatches.clone(),
        })
    }
}

type Trace = Rc<RefCell<Vec<String>>>;
type VoidEntry = Box<dyn Fn()>;
type StatusEntryFn = Box<dyn Fn() -> i32>;

fn void_entry(trace: &Trace, name: &str) -> VoidEntry {
    let trace = Rc::clone(trace);
    let name = name.to_string();
    Box::new(move || trace.borrow_mut().push(name.clone()))
}

fn void_table(trace: &Trace, names: &[Option<String>]) -> Vec<Option<VoidEntry>> {
    names
        .iter()
        .map(|slot| slot.as_deref().map(|name| void_entry(trace, name)))
        .collect()
}

fn status_table(trace: &Trace, entries: &[Option<StatusEntry>]) -> Vec<Option<StatusEntryFn>> {
    entries
        .iter()
        .map(|slot| {
            slot.as_ref().map(|entry| {
                let trace = Rc::clone(trace);
                let name = entry.name.clone();
                let status = entry.status;
                Box::new(move || {
                    trace.borrow_mut().push(name.clone());
                    status
                }) as StatusEntryFn
            })
        })
        .collect()
}

fn registration_entry(trace: &Trace, registration: &Registration) -> VoidEntry {
    if !registration.panics {
        return void_entry(trace, &registration.name);
    }
    let trace = Rc::clone(trace);
    let name = registration.name.clone();
    Box::new(move || {
        trace.borrow_mut().push(name.clone());
        panic!("exit callback {name} panicked");
    })
}

fn compare<T: PartialEq + std::fmt::Debug>(
    mismatches: &mut Vec<String>,
    field: &str,
    expected: &T,
    actual: &T,
) {
    if expected != actual {
        mismatches.push(format!("{field}: expected {expected:?}, got {actual:?}"));
    }
}

impl Scenario {
    fn host_version(&self) -> Result<Option<HostVersion>, ScenarioError> {
        self.host_version
            .as_deref()
            .map(|raw| {
                raw.parse()
                    .map_err(|source| ScenarioError::InvalidHostVersion {
                        scenario: self.name.clone(),
                        source,
                    })
            })
            .transpose()
    }

    /// Replay the scenario on a fresh context.
    pub fn run(&self) -> Result<ScenarioOutcome, ScenarioError> {
        let version = self.host_version()?;
        let trace = Trace::default();
        let mut ctx: LifecycleContext<VoidEntry, FixedHostVersion, RecordingSink> =
            LifecycleContext::new(FixedHostVersion(version), RecordingSink::default());
        ctx.set_exit_record_limit(self.exit_record_limit);

        let xi = status_table(&trace, &self.status_initializers);
        let xc = void_table(&trace, &self.initializers);
        let start_status = match ctx.start(&InitTables::new(&xi, &xc)) {
            Ok(_) => 0,
            Err(err) => err.status_code(),
        };

        let mut failed_registrations = 0;
        if ctx.phase() == Phase::Running {
            for registration in &self.registrations {
                let callback = registration_entry(&trace, registration);
                if ctx.register(registration.kind, callback).is_err() {
                    failed_registrations += 1;
                }
            }
        }

        let xp = void_table(&trace, &self.pre_terminators);
        let xt = void_table(&trace, &self.terminators);
        let contained_panics = match self.teardown {
            Teardown::Shutdown => ctx
                .shutdown(&TermTables::new(&xp, &xt))
                .map_or(0, |report| report.normal.panicked + report.quick.panicked),
            Teardown::QuickExit => ctx.quick_exit().map_or(0, |report| report.panicked),
            Teardown::None => 0,
        };

        let mut outcome = ScenarioOutcome {
            name: self.name.clone(),
            start_status,
            trace: trace.borrow().clone(),
            policy: ctx.policy(),
            final_phase: ctx.phase(),
            failed_registrations,
            contained_panics,
            events: ctx.event_sink().take_events(),
            mismatches: Vec::new(),
        };
        outcome.mismatches = self.mismatches(&outcome);
        Ok(outcome)
    }

    fn mismatches(&self, outcome: &ScenarioOutcome) -> Vec<String> {
        let expect = &self.expect;
        let mut out = Vec::new();
        compare(&mut out, "start_status", &expect.start_status, &outcome.start_status);
        compare(&mut out, "trace", &expect.trace, &outcome.trace);
        if let Some(pool_type) = expect.pool_type {
            compare(&mut out, "pool_type", &pool_type, &outcome.policy.pool_type);
        }
        if let Some(mdl) = expect.mdl_protection {
            compare(&mut out, "mdl_protection", &mdl, &outcome.policy.mdl_protection);
        }
        if let Some(phase) = expect.final_phase {
            compare(&mut out, "final_phase", &phase, &outcome.final_phase);
        }
        compare(
            &mut out,
            "failed_registrations",
            &expect.failed_registrations,
            &outcome.failed_registrations,
        );
        compare(
            &mut out,
            "contained_panics",
            &expect.contained_panics,
            &outcome.contained_panics,
        );
        out
    }
}
