//! Lifecycle scenario harness for modrt.
//!
//! This crate provides:
//! - Scenario fixtures: JSON descriptions of section tables, exit
//!   registrations and the expected callback trace
//! - Scenario runner: replays a fixture on an isolated `LifecycleContext`
//! - Structured logging: canonical JSONL records, validation, artifact index

#![forbid(unsafe_code)]

pub mod scenario;
pub mod structured_log;

pub use scenario::{Scenario, ScenarioError, ScenarioOutcome, ScenarioSet};
