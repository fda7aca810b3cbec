//! Deferred exit-callback ABI: `atexit`, `at_quick_exit`, `onexit`,
//! `_onexit`, `_register_onexit_function`, `_execute_onexit_table`.
//!
//! The process owns exactly two [`OnexitTable`]s, one per exit chain. Each
//! table guards its slot with a mutex, so concurrent registrations never lose
//! records. Draining detaches the whole chain under the lock and runs it with
//! the lock released; a callback that registers another callback therefore
//! does not deadlock, and its registration runs in a following round of the
//! same drain.

use std::ffi::c_int;

use parking_lot::Mutex;

use modrt_core::{DrainReport, EventSink, ExitKind, ExitSlot, LifecycleEvent, RegisterError};

use crate::event_log::ProcessSink;
use crate::util::{OnexitHook, VoidHook};

/// Callback stored in an exit chain.
#[derive(Debug, Clone, Copy)]
pub enum ExitHook {
    Void(VoidHook),
    /// `onexit`-style callback; the returned status is discarded.
    Onexit(OnexitHook),
}

impl ExitHook {
    pub fn invoke(&self) {
        match *self {
            Self::Void(f) => f(),
            Self::Onexit(f) => {
                let _ = f();
            }
        }
    }
}

/// One process-wide exit chain.
pub struct OnexitTable {
    kind: ExitKind,
    slot: Mutex<ExitSlot<ExitHook>>,
}

impl OnexitTable {
    const fn new(kind: ExitKind) -> Self {
        Self {
            kind,
            slot: parking_lot::const_mutex(ExitSlot::new()),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ExitKind {
        self.kind
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slot.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_empty()
    }

    pub fn set_record_limit(&self, limit: Option<usize>) {
        self.slot.lock().set_limit(limit);
    }

    /// Push `hook` on top of the chain and report the outcome.
    pub fn register(&self, hook: ExitHook) -> Result<(), RegisterError> {
        let outcome = {
            let mut slot = self.slot.lock();
            slot.register(hook).map(|()| slot.len())
        };
        let kind = self.kind;
        match outcome {
            Ok(depth) => {
                ProcessSink.emit(&LifecycleEvent::ExitRegistered { kind, depth });
                Ok(())
            }
            Err(error) => {
                ProcessSink.emit(&LifecycleEvent::ExitRegistrationFailed { kind, error });
                Err(error)
            }
        }
    }

    /// Run and release every record, most recent first, until the chain
    /// stays empty.
    pub fn drain(&self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            let chain = self.slot.lock().take();
            if chain.is_empty() {
                break;
            }
            report.merge(chain.run_with(ExitHook::invoke));
        }
        report
    }

    /// Release every record without running it.
    pub(crate) fn discard(&self) {
        drop(self.slot.lock().take());
    }
}

impl std::fmt::Debug for OnexitTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnexitTable")
            .field("kind", &self.kind)
            .field("slot", &*self.slot.lock())
            .finish()
    }
}

static NORMAL_TABLE: OnexitTable = OnexitTable::new(ExitKind::Normal);
static QUICK_TABLE: OnexitTable = OnexitTable::new(ExitKind::Quick);

/// The process-wide table of the given chain.
#[must_use]
pub fn table_for(kind: ExitKind) -> &'static OnexitTable {
    match kind {
        ExitKind::Normal => &NORMAL_TABLE,
        ExitKind::Quick => &QUICK_TABLE,
    }
}

fn status_of(result: Result<(), RegisterError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Handle of the normal exit chain, for `_register_onexit_function`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn __modrt_onexit_table() -> *const OnexitTable {
    &NORMAL_TABLE
}

/// Handle of the quick exit chain, for `_register_onexit_function`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn __modrt_quick_onexit_table() -> *const OnexitTable {
    &QUICK_TABLE
}

/// Register `function` on the chain behind `table`.
///
/// Returns 0 on success, -1 for a null table, a null function, or a failed
/// record allocation.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn _register_onexit_function(
    table: *const OnexitTable,
    function: Option<VoidHook>,
) -> c_int {
    // SAFETY: non-null handles come from `__modrt_onexit_table` or
    // `__modrt_quick_onexit_table` and point at statics.
    let Some(table) = (unsafe { table.as_ref() }) else {
        return -1;
    };
    let Some(function) = function else {
        return -1;
    };
    status_of(table.register(ExitHook::Void(function)))
}

/// Run and release every callback of the chain behind `table`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn _execute_onexit_table(table: *const OnexitTable) -> c_int {
    // SAFETY: same handle contract as `_register_onexit_function`.
    let Some(table) = (unsafe { table.as_ref() }) else {
        return -1;
    };
    let report = table.drain();
    ProcessSink.emit(&LifecycleEvent::ExitChainDrained {
        kind: table.kind(),
        invoked: report.invoked,
        panicked: report.panicked,
    });
    0
}

/// Register `function` on the normal exit chain.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn atexit(function: Option<VoidHook>) -> c_int {
    match function {
        Some(f) => status_of(NORMAL_TABLE.register(ExitHook::Void(f))),
        None => -1,
    }
}

/// Register `function` on the quick exit chain.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn at_quick_exit(function: Option<VoidHook>) -> c_int {
    match function {
        Some(f) => status_of(QUICK_TABLE.register(ExitHook::Void(f))),
        None => -1,
    }
}

/// Register `function` on the normal exit chain. Returns `function` on
/// success and null on failure.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn onexit(function: Option<OnexitHook>) -> Option<OnexitHook> {
    let f = function?;
    NORMAL_TABLE.register(ExitHook::Onexit(f)).ok().map(|()| f)
}

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn _onexit(function: Option<OnexitHook>) -> Option<OnexitHook> {
    onexit(function)
}
