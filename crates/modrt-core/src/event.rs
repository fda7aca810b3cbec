//! Lifecycle events and counters.
//!
//! Exit callbacks and void table entries have no failure channel, so
//! everything worth knowing about a startup or teardown run is reported as a
//! [`LifecycleEvent`] through an [`EventSink`]. Events serialize to one JSON
//! object each, tagged by `event`.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::lifecycle::Phase;
use crate::policy::{PolicySelection, PoolPolicy};
use crate::registry::{ExitKind, RegisterError};

/// Which function-pointer table an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    /// Status-returning initializers (`.CRT$XI*`).
    StatusInitializers,
    /// Void initializers (`.CRT$XC*`).
    Initializers,
    /// Pre-terminators (`.CRT$XP*`).
    PreTerminators,
    /// Terminators (`.CRT$XT*`).
    Terminators,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    PolicySelected {
        selection: PolicySelection,
        policy: PoolPolicy,
    },
    TableRan {
        table: TableKind,
        invoked: usize,
    },
    InitializerFailed {
        index: usize,
        status: i32,
    },
    InvalidTableRange {
        table: TableKind,
    },
    ExitRegistered {
        kind: ExitKind,
        depth: usize,
    },
    ExitRegistrationFailed {
        kind: ExitKind,
        error: RegisterError,
    },
    ExitChainDrained {
        kind: ExitKind,
        invoked: usize,
        panicked: usize,
    },
    PhaseChanged {
        from: Phase,
        to: Phase,
    },
    PhaseRejected {
        operation: &'static str,
        phase: Phase,
    },
}

impl LifecycleEvent {
    /// Stable event name, identical to the serialized `event` tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::PolicySelected { .. } => "policy_selected",
            Self::TableRan { .. } => "table_ran",
            Self::InitializerFailed { .. } => "initializer_failed",
            Self::InvalidTableRange { .. } => "invalid_table_range",
            Self::ExitRegistered { .. } => "exit_registered",
            Self::ExitRegistrationFailed { .. } => "exit_registration_failed",
            Self::ExitChainDrained { .. } => "exit_chain_drained",
            Self::PhaseChanged { .. } => "phase_changed",
            Self::PhaseRejected { .. } => "phase_rejected",
        }
    }
}

/// Receiver of lifecycle events.
pub trait EventSink {
    fn emit(&self, event: &LifecycleEvent);
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: &LifecycleEvent) {
        (**self).emit(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &LifecycleEvent) {}
}

/// Relaxed per-class event counters.
#[derive(Debug, Default)]
pub struct EventCounters {
    pub registrations: AtomicU64,
    pub registration_failures: AtomicU64,
    pub callbacks_run: AtomicU64,
    pub callback_panics: AtomicU64,
    pub table_entries_run: AtomicU64,
    pub initializer_failures: AtomicU64,
    pub invalid_ranges: AtomicU64,
    pub policy_overrides: AtomicU64,
    pub phase_rejections: AtomicU64,
}

/// Plain copy of [`EventCounters`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(C)]
pub struct CountersSnapshot {
    pub registrations: u64,
    pub registration_failures: u64,
    pub callbacks_run: u64,
    pub callback_panics: u64,
    pub table_entries_run: u64,
    pub initializer_failures: u64,
    pub invalid_ranges: u64,
    pub policy_overrides: u64,
    pub phase_rejections: u64,
}

impl EventCounters {
    /// Create zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registrations: AtomicU64::new(0),
            registration_failures: AtomicU64::new(0),
            callbacks_run: AtomicU64::new(0),
            callback_panics: AtomicU64::new(0),
            table_entries_run: AtomicU64::new(0),
            initializer_failures: AtomicU64::new(0),
            invalid_ranges: AtomicU64::new(0),
            policy_overrides: AtomicU64::new(0),
            phase_rejections: AtomicU64::new(0),
        }
    }

    /// Fold one event into the counters.
    pub fn record(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::PolicySelected { selection, .. } => {
                if matches!(selection, PolicySelection::Legacy { .. }) {
                    self.policy_overrides.fetch_add(1, Ordering::Relaxed);
                }
            }
            LifecycleEvent::TableRan { invoked, .. } => {
                self.table_entries_run
                    .fetch_add(*invoked as u64, Ordering::Relaxed);
            }
            LifecycleEvent::InitializerFailed { .. } => {
                self.initializer_failures.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleEvent::InvalidTableRange { .. } => {
                self.invalid_ranges.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleEvent::ExitRegistered { .. } => {
                self.registrations.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleEvent::ExitRegistrationFailed { .. } => {
                self.registration_failures.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleEvent::ExitChainDrained {
                invoked, panicked, ..
            } => {
                self.callbacks_run
                    .fetch_add(*invoked as u64, Ordering::Relaxed);
                self.callback_panics
                    .fetch_add(*panicked as u64, Ordering::Relaxed);
            }
            LifecycleEvent::PhaseRejected { .. } => {
                self.phase_rejections.fetch_add(1, Ordering::Relaxed);
            }
            LifecycleEvent::PhaseChanged { .. } => {}
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            registrations: self.registrations.load(Ordering::Relaxed),
            registration_failures: self.registration_failures.load(Ordering::Relaxed),
            callbacks_run: self.callbacks_run.load(Ordering::Relaxed),
            callback_panics: self.callback_panics.load(Ordering::Relaxed),
            table_entries_run: self.table_entries_run.load(Ordering::Relaxed),
            initializer_failures: self.initializer_failures.load(Ordering::Relaxed),
            invalid_ranges: self.invalid_ranges.load(Ordering::Relaxed),
            policy_overrides: self.policy_overrides.load(Ordering::Relaxed),
            phase_rejections: self.phase_rejections.load(Ordering::Relaxed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.registrations,
            &self.registration_failures,
            &self.callbacks_run,
            &self.callback_panics,
            &self.table_entries_run,
            &self.initializer_failures,
            &self.invalid_ranges,
            &self.policy_overrides,
            &self.phase_rejections,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl EventSink for EventCounters {
    fn emit(&self, event: &LifecycleEvent) {
        self.record(event);
    }
}
