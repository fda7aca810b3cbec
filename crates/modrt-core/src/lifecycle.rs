//! Module start/stop sequencing.
//!
//! Start: pool policy selection, status-returning initializers (first failure
//! aborts the start), void initializers.
//! Stop: pre-terminators, normal exit chain, quick exit chain, terminators.
//! Quick exit: quick exit chain only.
//!
//! The sequencing is written once against [`RuntimeHost`]; the state it
//! drives is either an explicit [`LifecycleContext`] or the process-wide
//! runtime of the ABI layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{EventSink, LifecycleEvent, NullSink, TableKind};
use crate::policy::{
    FixedHostVersion, HostVersionSource, PolicySelection, PoolPolicy, select_pool_policy,
};
use crate::registry::{DrainReport, ExitKind, ExitSlot, RegisterError};
use crate::table::{InitFailure, StatusTableEntry, TableEntry, run_all, run_all_or_fail};

/// Lifecycle phase of one module instance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Phase {
    #[default]
    Unloaded = 0,
    Starting = 1,
    Running = 2,
    /// A status-returning initializer failed; the load must be aborted.
    Failed = 3,
    Stopping = 4,
    Stopped = 5,
}

impl Phase {
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Unloaded),
            1 => Some(Self::Starting),
            2 => Some(Self::Running),
            3 => Some(Self::Failed),
            4 => Some(Self::Stopping),
            5 => Some(Self::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("cannot {operation} a module in phase {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },
    #[error(transparent)]
    Initializer(#[from] InitFailure),
}

impl LifecycleError {
    /// Status code for C callers: the initializer's own status, or `-1`.
    #[must_use]
    pub const fn status_code(&self) -> i32 {
        match self {
            Self::Initializer(failure) => failure.status,
            Self::InvalidPhase { .. } => -1,
        }
    }
}

/// Startup tables, bounded by the bootstrap layer.
#[derive(Debug)]
pub struct InitTables<'a, I, V> {
    pub status_initializers: &'a [Option<I>],
    pub initializers: &'a [Option<V>],
}

impl<'a, I, V> InitTables<'a, I, V> {
    #[must_use]
    pub const fn new(status_initializers: &'a [Option<I>], initializers: &'a [Option<V>]) -> Self {
        Self {
            status_initializers,
            initializers,
        }
    }
}

/// Teardown tables, bounded by the bootstrap layer.
#[derive(Debug)]
pub struct TermTables<'a, V> {
    pub pre_terminators: &'a [Option<V>],
    pub terminators: &'a [Option<V>],
}

impl<'a, V> TermTables<'a, V> {
    #[must_use]
    pub const fn new(pre_terminators: &'a [Option<V>], terminators: &'a [Option<V>]) -> Self {
        Self {
            pre_terminators,
            terminators,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StartReport {
    pub selection: PolicySelection,
    pub status_initializers_run: usize,
    pub initializers_run: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub pre_terminators_run: usize,
    pub normal: DrainReport,
    pub quick: DrainReport,
    pub terminators_run: usize,
}

/// State driven by the start/stop sequencing.
pub trait RuntimeHost {
    fn phase(&self) -> Phase;
    fn set_phase(&mut self, phase: Phase);
    /// Run the pool policy selector and return the branch taken together with
    /// the resulting values.
    fn select_policy(&mut self) -> (PolicySelection, PoolPolicy);
    /// Run and release every record of one exit chain.
    fn drain_exit_chain(&mut self, kind: ExitKind) -> DrainReport;
    fn sink(&self) -> &dyn EventSink;
}

fn move_to<H: RuntimeHost + ?Sized>(host: &mut H, to: Phase) {
    let from = host.phase();
    host.set_phase(to);
    host.sink().emit(&LifecycleEvent::PhaseChanged { from, to });
}

fn enter<H: RuntimeHost + ?Sized>(
    host: &mut H,
    operation: &'static str,
    allowed: &[Phase],
    next: Phase,
) -> Result<(), LifecycleError> {
    let phase = host.phase();
    if !allowed.contains(&phase) {
        host.sink()
            .emit(&LifecycleEvent::PhaseRejected { operation, phase });
        return Err(LifecycleError::InvalidPhase { operation, phase });
    }
    move_to(host, next);
    Ok(())
}

fn drain_and_report<H: RuntimeHost + ?Sized>(host: &mut H, kind: ExitKind) -> DrainReport {
    let report = host.drain_exit_chain(kind);
    host.sink().emit(&LifecycleEvent::ExitChainDrained {
        kind,
        invoked: report.invoked,
        panicked: report.panicked,
    });
    report
}

/// Bring a module from `Unloaded` to `Running`.
///
/// On initializer failure the module ends in `Failed`, no further initializer
/// runs, and the failing index/status is returned.
pub fn start<H, I, V>(host: &mut H, tables: &InitTables<'_, I, V>) -> Result<StartReport, LifecycleError>
where
    H: RuntimeHost + ?Sized,
    I: StatusTableEntry,
    V: TableEntry,
{
    enter(host, "start", &[Phase::Unloaded], Phase::Starting)?;

    let (selection, policy) = host.select_policy();
    host.sink()
        .emit(&LifecycleEvent::PolicySelected { selection, policy });

    let status_initializers_run = match run_all_or_fail(tables.status_initializers) {
        Ok(invoked) => invoked,
        Err(failure) => {
            host.sink().emit(&LifecycleEvent::InitializerFailed {
                index: failure.index,
                status: failure.status,
            });
            move_to(host, Phase::Failed);
            return Err(failure.into());
        }
    };
    host.sink().emit(&LifecycleEvent::TableRan {
        table: TableKind::StatusInitializers,
        invoked: status_initializers_run,
    });

    let initializers_run = run_all(tables.initializers);
    host.sink().emit(&LifecycleEvent::TableRan {
        table: TableKind::Initializers,
        invoked: initializers_run,
    });

    move_to(host, Phase::Running);
    Ok(StartReport {
        selection,
        status_initializers_run,
        initializers_run,
    })
}

/// Tear a `Running` or `Failed` module down.
///
/// User-registered callbacks run after the pre-terminators and before the
/// terminators. A failed start still releases whatever the initializers that
/// did run registered.
pub fn shutdown<H, V>(host: &mut H, tables: &TermTables<'_, V>) -> Result<ShutdownReport, LifecycleError>
where
    H: RuntimeHost + ?Sized,
    V: TableEntry,
{
    enter(
        host,
        "shutdown",
        &[Phase::Running, Phase::Failed],
        Phase::Stopping,
    )?;

    let pre_terminators_run = run_all(tables.pre_terminators);
    host.sink().emit(&LifecycleEvent::TableRan {
        table: TableKind::PreTerminators,
        invoked: pre_terminators_run,
    });

    let normal = drain_and_report(host, ExitKind::Normal);
    let quick = drain_and_report(host, ExitKind::Quick);

    let terminators_run = run_all(tables.terminators);
    host.sink().emit(&LifecycleEvent::TableRan {
        table: TableKind::Terminators,
        invoked: terminators_run,
    });

    move_to(host, Phase::Stopped);
    Ok(ShutdownReport {
        pre_terminators_run,
        normal,
        quick,
        terminators_run,
    })
}

/// Abbreviated teardown: run the quick exit chain only.
pub fn quick_exit<H: RuntimeHost + ?Sized>(host: &mut H) -> Result<DrainReport, LifecycleError> {
    enter(host, "quick_exit", &[Phase::Running], Phase::Stopping)?;
    let report = drain_and_report(host, ExitKind::Quick);
    move_to(host, Phase::Stopped);
    Ok(report)
}

/// Explicit lifecycle state for one module instance.
pub struct LifecycleContext<F, Q = FixedHostVersion, S = NullSink> {
    normal: ExitSlot<F>,
    quick: ExitSlot<F>,
    policy: PoolPolicy,
    phase: Phase,
    version_source: Q,
    sink: S,
}

impl<F, Q, S> LifecycleContext<F, Q, S>
where
    Q: HostVersionSource,
    S: EventSink,
{
    #[must_use]
    pub fn new(version_source: Q, sink: S) -> Self {
        Self {
            normal: ExitSlot::new(),
            quick: ExitSlot::new(),
            policy: PoolPolicy::modern(),
            phase: Phase::Unloaded,
            version_source,
            sink,
        }
    }

    /// Cap the number of live records of both exit chains.
    pub fn set_exit_record_limit(&mut self, limit: Option<usize>) {
        self.normal.set_limit(limit);
        self.quick.set_limit(limit);
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn policy(&self) -> PoolPolicy {
        self.policy
    }

    #[must_use]
    pub fn event_sink(&self) -> &S {
        &self.sink
    }

    #[must_use]
    pub fn slot(&self, kind: ExitKind) -> &ExitSlot<F> {
        match kind {
            ExitKind::Normal => &self.normal,
            ExitKind::Quick => &self.quick,
        }
    }

    pub fn slot_mut(&mut self, kind: ExitKind) -> &mut ExitSlot<F> {
        match kind {
            ExitKind::Normal => &mut self.normal,
            ExitKind::Quick => &mut self.quick,
        }
    }

    /// Register `callback` on the chain selected by `kind`.
    pub fn register(&mut self, kind: ExitKind, callback: F) -> Result<(), RegisterError> {
        let slot = self.slot_mut(kind);
        match slot.register(callback) {
            Ok(()) => {
                let depth = slot.len();
                self.sink
                    .emit(&LifecycleEvent::ExitRegistered { kind, depth });
                Ok(())
            }
            Err(error) => {
                self.sink
                    .emit(&LifecycleEvent::ExitRegistrationFailed { kind, error });
                Err(error)
            }
        }
    }

    pub fn at_exit(&mut self, callback: F) -> Result<(), RegisterError> {
        self.register(ExitKind::Normal, callback)
    }

    pub fn at_quick_exit(&mut self, callback: F) -> Result<(), RegisterError> {
        self.register(ExitKind::Quick, callback)
    }
}

impl<F, Q, S> LifecycleContext<F, Q, S>
where
    F: Fn(),
    Q: HostVersionSource,
    S: EventSink,
{
    pub fn start<I: StatusTableEntry, V: TableEntry>(
        &mut self,
        tables: &InitTables<'_, I, V>,
    ) -> Result<StartReport, LifecycleError> {
        start(self, tables)
    }

    pub fn shutdown<V: TableEntry>(
        &mut self,
        tables: &TermTables<'_, V>,
    ) -> Result<ShutdownReport, LifecycleError> {
        shutdown(self, tables)
    }

    pub fn quick_exit(&mut self) -> Result<DrainReport, LifecycleError> {
        quick_exit(self)
    }
}

impl<F, Q, S> RuntimeHost for LifecycleContext<F, Q, S>
where
    F: Fn(),
    Q: HostVersionSource,
    S: EventSink,
{
    fn phase(&self) -> Phase {
        self.phase
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    fn select_policy(&mut self) -> (PolicySelection, PoolPolicy) {
        let selection = select_pool_policy(&mut self.policy, &self.version_source);
        (selection, self.policy)
    }

    fn drain_exit_chain(&mut self, kind: ExitKind) -> DrainReport {
        self.slot_mut(kind).drain()
    }

    fn sink(&self) -> &dyn EventSink {
        &self.sink
    }
}

impl<F, Q, S> std::fmt::Debug for LifecycleContext<F, Q, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleContext")
            .field("phase", &self.phase)
            .field("policy", &self.policy)
            .field("normal", &self.normal)
            .field("quick", &self.quick)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::HostVersion;

    type Hook = fn();
    type StatusHook = fn() -> i32;

    fn context() -> LifecycleContext<Hook> {
        LifecycleContext::new(FixedHostVersion(Some(HostVersion::new(10, 0))), NullSink)
    }

    fn ok() -> i32 {
        0
    }

    fn noop() {}

    #[test]
    fn phase_raw_round_trip() {
        for phase in [
            Phase::Unloaded,
            Phase::Starting,
            Phase::Running,
            Phase::Failed,
            Phase::Stopping,
            Phase::Stopped,
        ] {
            assert_eq!(Phase::from_raw(phase.as_raw()), Some(phase));
        }
        assert_eq!(Phase::from_raw(9), None);
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut ctx = context();
        let status: [Option<StatusHook>; 1] = [Some(ok)];
        let void: [Option<Hook>; 1] = [Some(noop)];
        let tables = InitTables::new(&status, &void);
        let report = ctx.start(&tables).unwrap();
        assert_eq!(report.status_initializers_run, 1);
        assert_eq!(report.initializers_run, 1);
        assert_eq!(ctx.phase(), Phase::Running);

        let err = ctx.start(&tables).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::InvalidPhase {
                operation: "start",
                phase: Phase::Running
            }
        );
        assert_eq!(err.status_code(), -1);
    }

    #[test]
    fn shutdown_before_start_is_rejected() {
        let mut ctx = context();
        let empty: [Option<Hook>; 0] = [];
        let err = ctx.shutdown(&TermTables::new(&empty, &empty)).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidPhase { .. }));
        assert_eq!(ctx.phase(), Phase::Unloaded);
    }

    #[test]
    fn failed_start_reports_status_and_allows_shutdown() {
        fn fails() -> i32 {
            25
        }
        let mut ctx = context();
        let status: [Option<StatusHook>; 3] = [None, Some(fails), Some(ok)];
        let void: [Option<Hook>; 0] = [];
        let err = ctx.start(&InitTables::new(&status, &void)).unwrap_err();
        assert_eq!(err.status_code(), 25);
        assert_eq!(err.to_string(), "initializer #1 failed with status 25");
        assert_eq!(ctx.phase(), Phase::Failed);

        let empty: [Option<Hook>; 0] = [];
        ctx.shutdown(&TermTables::new(&empty, &empty)).unwrap();
        assert_eq!(ctx.phase(), Phase::Stopped);
    }

    #[test]
    fn quick_exit_requires_running_module() {
        let mut ctx = context();
        assert!(ctx.quick_exit().is_err());

        let status: [Option<StatusHook>; 0] = [];
        let void: [Option<Hook>; 0] = [];
        ctx.start(&InitTables::new(&status, &void)).unwrap();
        assert_eq!(ctx.quick_exit().unwrap(), DrainReport::default());
        assert_eq!(ctx.phase(), Phase::Stopped);

        let empty: [Option<Hook>; 0] = [];
        assert!(ctx.shutdown(&TermTables::new(&empty, &empty)).is_err());
    }

    #[test]
    fn c_function_tables_drive_start_and_shutdown() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static RAN: AtomicUsize = AtomicUsize::new(0);
        extern "C" fn c_ok() -> std::ffi::c_int {
            RAN.fetch_add(1, Ordering::SeqCst);
            0
        }
        extern "C" fn c_void() {
            RAN.fetch_add(1, Ordering::SeqCst);
        }

        let mut ctx = context();
        let xi: [Option<extern "C" fn() -> std::ffi::c_int>; 2] = [None, Some(c_ok)];
        let xc: [Option<extern "C" fn()>; 2] = [Some(c_void), None];
        let report = ctx.start(&InitTables::new(&xi, &xc)).unwrap();
        assert_eq!(report.status_initializers_run, 1);
        assert_eq!(report.initializers_run, 1);

        let xt: [Option<extern "C" fn()>; 1] = [Some(c_void)];
        let report = ctx.shutdown(&TermTables::new(&[], &xt)).unwrap();
        assert_eq!(report.terminators_run, 1);
        assert_eq!(RAN.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exit_record_limit_applies_to_both_chains() {
        let mut ctx = context();
        ctx.set_exit_record_limit(Some(1));
        ctx.at_exit(noop).unwrap();
        ctx.at_quick_exit(noop).unwrap();
        assert_eq!(
            ctx.at_exit(noop),
            Err(RegisterError::LimitReached { limit: 1 })
        );
        assert_eq!(ctx.slot(ExitKind::Normal).len(), 1);
        assert_eq!(ctx.slot(ExitKind::Quick).len(), 1);
    }
}
