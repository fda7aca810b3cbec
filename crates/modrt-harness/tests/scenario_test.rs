//! Integration test: lifecycle scenario fixtures.
//!
//! Run: cargo test -p modrt-harness --test scenario_test

use std::path::{Path, PathBuf};

use modrt_core::{LifecycleEvent, Phase, PolicySelection};
use modrt_harness::scenario::{ScenarioError, ScenarioSet};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(Path::parent)
        .unwrap()
        .to_path_buf()
}

fn fixture_path() -> PathBuf {
    workspace_root().join("tests/conformance/lifecycle_scenarios.v1.json")
}

#[test]
fn fixture_file_loads() {
    let set = ScenarioSet::from_file(&fixture_path()).unwrap();
    assert_eq!(set.suite, "lifecycle");
    assert!(set.scenarios.len() >= 10);

    let mut names: Vec<&str> = set.scenarios.iter().map(|s| s.name.as_str()).collect();
    names.sort_unstable();
    let before = names.len();
    names.dedup();
    assert_eq!(names.len(), before, "scenario names must be unique");
}

#[test]
fn every_fixture_scenario_passes() {
    let set = ScenarioSet::from_file(&fixture_path()).unwrap();
    for outcome in set.run_all().unwrap() {
        outcome.ensure_passed().unwrap();
    }
}

#[test]
fn full_lifecycle_scenario_reports_events_in_order() {
    let set = ScenarioSet::from_file(&fixture_path()).unwrap();
    let scenario = set
        .scenarios
        .iter()
        .find(|s| s.name == "full_lifecycle_order")
        .unwrap();
    let outcome = scenario.run().unwrap();

    let names: Vec<&str> = outcome.events.iter().map(LifecycleEvent::name).collect();
    assert_eq!(names[0], "phase_changed");
    assert_eq!(names[1], "policy_selected");
    assert_eq!(names.iter().filter(|n| **n == "exit_registered").count(), 3);
    assert_eq!(names.iter().filter(|n| **n == "exit_chain_drained").count(), 2);
    assert_eq!(names.last(), Some(&"phase_changed"));
    assert!(matches!(
        outcome.events[1],
        LifecycleEvent::PolicySelected {
            selection: PolicySelection::Modern { .. },
            ..
        }
    ));
    assert_eq!(outcome.final_phase, Phase::Stopped);
}

#[test]
fn outcome_serializes_for_reports() {
    let set = ScenarioSet::from_file(&fixture_path()).unwrap();
    let outcome = set.scenarios[0].run().unwrap();
    let value = serde_json::to_value(&outcome).unwrap();
    assert_eq!(value["name"], set.scenarios[0].name);
    assert_eq!(value["final_phase"], "stopped");
    assert_eq!(value["policy"]["pool_type"], "NonPagedPoolNx");
    assert!(value["events"].as_array().unwrap().len() > 4);
}

#[test]
fn missing_fixture_is_an_io_error() {
    let err = ScenarioSet::from_file(Path::new("/nonexistent/modrt/fixture.json")).unwrap_err();
    assert!(matches!(err, ScenarioError::Io { .. }));
    assert!(err.to_string().contains("/nonexistent/modrt/fixture.json"));
}

#[test]
fn malformed_fixture_is_a_json_error() {
    let err = ScenarioSet::from_json("{ not json").unwrap_err();
    assert!(matches!(err, ScenarioError::Json(_)));
}
