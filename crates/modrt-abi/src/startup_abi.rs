//! Module bootstrap entry points.
//!
//! The entry thunk calls `__modrt_module_startup` with the bounds of the
//! status-initializer (`.CRT$XIA..XIZ`) and initializer (`.CRT$XCA..XCZ`)
//! tables; the exit thunk calls `__modrt_module_shutdown` with the
//! pre-terminator (`.CRT$XPA..XPZ`) and terminator (`.CRT$XTA..XTZ`) tables.
//! Both delegate the ordering to `modrt_core::lifecycle`.

use std::ffi::c_int;

use modrt_core::config::RuntimeConfig;
use modrt_core::event::TableKind;
use modrt_core::lifecycle::{self, InitTables, TermTables};
use modrt_core::{EventSink, ExitKind, LifecycleEvent, Phase};

use crate::event_log::ProcessSink;
use crate::onexit_abi::table_for;
use crate::runtime_state::{self, ProcessRuntime};
use crate::util::{StatusHook, VoidHook, table_from_range};

fn invalid_range(table: TableKind) -> c_int {
    ProcessSink.emit(&LifecycleEvent::InvalidTableRange { table });
    -1
}

/// Start the module: select the pool policy, run the status initializers,
/// then the void initializers.
///
/// Returns 0 on success, the failing initializer's status if one failed, and
/// -1 for an invalid table range, a module that is not `Unloaded`, or a
/// concurrent lifecycle call. After a nonzero status the loader must abort
/// the load; `__modrt_module_shutdown` still releases any registered exit
/// callbacks.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn __modrt_module_startup(
    xi_first: *const Option<StatusHook>,
    xi_last: *const Option<StatusHook>,
    xc_first: *const Option<VoidHook>,
    xc_last: *const Option<VoidHook>,
) -> c_int {
    let Some(_guard) = runtime_state::try_enter() else {
        return -1;
    };
    // SAFETY: the entry thunk passes the bounds of the `.CRT$XI*` table.
    let Some(status_initializers) = (unsafe { table_from_range(xi_first, xi_last) }) else {
        return invalid_range(TableKind::StatusInitializers);
    };
    // SAFETY: the entry thunk passes the bounds of the `.CRT$XC*` table.
    let Some(initializers) = (unsafe { table_from_range(xc_first, xc_last) }) else {
        return invalid_range(TableKind::Initializers);
    };

    let config = RuntimeConfig::from_env();
    if runtime_state::phase() == Phase::Unloaded {
        for kind in [ExitKind::Normal, ExitKind::Quick] {
            table_for(kind).set_record_limit(config.exit_record_limit);
        }
    }

    let mut runtime = ProcessRuntime::new(config);
    match lifecycle::start(&mut runtime, &InitTables::new(status_initializers, initializers)) {
        Ok(_) => 0,
        Err(err) => err.status_code(),
    }
}

/// Stop the module: pre-terminators, normal exit chain, quick exit chain,
/// terminators.
///
/// Returns 0 on success and -1 for an invalid table range, a module that is
/// neither `Running` nor `Failed`, or a concurrent lifecycle call.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn __modrt_module_shutdown(
    xp_first: *const Option<VoidHook>,
    xp_last: *const Option<VoidHook>,
    xt_first: *const Option<VoidHook>,
    xt_last: *const Option<VoidHook>,
) -> c_int {
    let Some(_guard) = runtime_state::try_enter() else {
        return -1;
    };
    // SAFETY: the exit thunk passes the bounds of the `.CRT$XP*` table.
    let Some(pre_terminators) = (unsafe { table_from_range(xp_first, xp_last) }) else {
        return invalid_range(TableKind::PreTerminators);
    };
    // SAFETY: the exit thunk passes the bounds of the `.CRT$XT*` table.
    let Some(terminators) = (unsafe { table_from_range(xt_first, xt_last) }) else {
        return invalid_range(TableKind::Terminators);
    };

    let mut runtime = ProcessRuntime::new(RuntimeConfig::from_env());
    match lifecycle::shutdown(&mut runtime, &TermTables::new(pre_terminators, terminators)) {
        Ok(_) => 0,
        Err(err) => err.status_code(),
    }
}

/// Abbreviated teardown of a `Running` module: run the quick exit chain only.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn __modrt_quick_exit() -> c_int {
    let Some(_guard) = runtime_state::try_enter() else {
        return -1;
    };
    let mut runtime = ProcessRuntime::new(RuntimeConfig::from_env());
    match lifecycle::quick_exit(&mut runtime) {
        Ok(_) => 0,
        Err(err) => err.status_code(),
    }
}

/// Current lifecycle phase as its raw discriminant.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn __modrt_lifecycle_phase() -> c_int {
    c_int::from(runtime_state::phase().as_raw())
}

/// Test hook: return the process to a freshly loaded state (`Unloaded`,
/// empty unlimited exit chains, default pool policy, zeroed counters).
/// Registered callbacks are released without running.
#[doc(hidden)]
pub fn lifecycle_reset_for_tests() {
    if let Some(_guard) = runtime_state::try_enter() {
        runtime_state::reset();
    }
}
