//! Section table walkers: `_initterm`, `_initterm_e`.
//!
//! Bounds are the linker-provided `[first, last)` pair of one `.CRT$X?A` /
//! `.CRT$X?Z` section group. Null slots are skipped.

use std::ffi::c_int;

use modrt_core::{run_all, run_all_or_fail};

use crate::util::{StatusHook, VoidHook, table_from_range};

/// Invoke every non-null entry of `[first, last)` in ascending order.
///
/// An inverted or half-null range runs nothing.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn _initterm(first: *const Option<VoidHook>, last: *const Option<VoidHook>) {
    // SAFETY: caller passes the bounds of one section table.
    if let Some(table) = unsafe { table_from_range(first, last) } {
        run_all(table);
    }
}

/// Invoke non-null entries of `[first, last)` until one returns nonzero.
///
/// Returns 0 when every entry succeeded, the first nonzero status otherwise,
/// and -1 for an inverted or half-null range. An initializer that itself
/// returns -1 is indistinguishable from a bad range; callers that must tell
/// them apart validate the bounds first, as `__modrt_module_startup` does.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn _initterm_e(
    first: *const Option<StatusHook>,
    last: *const Option<StatusHook>,
) -> c_int {
    // SAFETY: caller passes the bounds of one section table.
    let Some(table) = (unsafe { table_from_range(first, last) }) else {
        return -1;
    };
    match run_all_or_fail(table) {
        Ok(_) => 0,
        Err(failure) => failure.status,
    }
}
