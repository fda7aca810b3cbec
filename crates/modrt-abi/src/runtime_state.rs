//! Process-wide lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Mutex, MutexGuard};

use modrt_core::config::RuntimeConfig;
use modrt_core::{DrainReport, EventSink, ExitKind, Phase, PolicySelection, PoolPolicy, RuntimeHost};

use crate::event_log::ProcessSink;
use crate::onexit_abi::table_for;
use crate::pool_abi;

static PHASE: AtomicU8 = AtomicU8::new(Phase::Unloaded.as_raw());

// Held for the whole of one startup, shutdown or quick exit. Entry points use
// `try_lock`: a second lifecycle call, including one made from inside a
// running initializer or terminator, is refused instead of deadlocking.
static LIFECYCLE_LOCK: Mutex<()> = parking_lot::const_mutex(());

pub(crate) fn phase() -> Phase {
    Phase::from_raw(PHASE.load(Ordering::Acquire)).unwrap_or_default()
}

pub(crate) fn try_enter() -> Option<MutexGuard<'static, ()>> {
    LIFECYCLE_LOCK.try_lock()
}

/// The process-wide state seen through [`RuntimeHost`].
pub(crate) struct ProcessRuntime {
    config: RuntimeConfig,
}

impl ProcessRuntime {
    pub(crate) fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }
}

impl RuntimeHost for ProcessRuntime {
    fn phase(&self) -> Phase {
        phase()
    }

    fn set_phase(&mut self, phase: Phase) {
        PHASE.store(phase.as_raw(), Ordering::Release);
    }

    fn select_policy(&mut self) -> (PolicySelection, PoolPolicy) {
        pool_abi::select_and_publish(&self.config)
    }

    fn drain_exit_chain(&mut self, kind: ExitKind) -> DrainReport {
        table_for(kind).drain()
    }

    fn sink(&self) -> &dyn EventSink {
        &ProcessSink
    }
}

pub(crate) fn reset() {
    PHASE.store(Phase::Unloaded.as_raw(), Ordering::Release);
    for kind in [ExitKind::Normal, ExitKind::Quick] {
        let table = table_for(kind);
        table.discard();
        table.set_record_limit(None);
    }
    pool_abi::reset_policy();
    crate::event_log::reset_counters();
}
