//! Initializer and terminator table walking.
//!
//! A table is the slice between two linker-provided boundary markers. Entries
//! are nullable: the boundary markers themselves are null, and so is any
//! padding the linker inserts between section groups. The position of an
//! entry inside the table is its ordering contract, so walkers go strictly
//! front to back and never retry.

use std::ffi::c_int;

use serde::Serialize;
use thiserror::Error;

/// Void table entry: initializer, pre-terminator or terminator.
///
/// Implemented for Rust and C function pointers and for boxed closures.
/// `extern "C" fn` pointers do not implement `Fn`, so the walkers go
/// through this trait instead of an `Fn()` bound.
pub trait TableEntry {
    fn invoke(&self);
}

/// Status-returning table entry. Zero means success.
pub trait StatusTableEntry {
    fn invoke(&self) -> i32;
}

impl TableEntry for fn() {
    fn invoke(&self) {
        (*self)()
    }
}

impl TableEntry for extern "C" fn() {
    fn invoke(&self) {
        (*self)()
    }
}

impl<F: Fn() + ?Sized> TableEntry for Box<F> {
    fn invoke(&self) {
        (**self)()
    }
}

impl StatusTableEntry for fn() -> i32 {
    fn invoke(&self) -> i32 {
        (*self)()
    }
}

impl StatusTableEntry for extern "C" fn() -> c_int {
    fn invoke(&self) -> i32 {
        (*self)()
    }
}

impl<F: Fn() -> i32 + ?Sized> StatusTableEntry for Box<F> {
    fn invoke(&self) -> i32 {
        (**self)()
    }
}

/// First status-returning initializer that reported a nonzero status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[error("initializer #{index} failed with status {status}")]
pub struct InitFailure {
    /// Position of the failing entry in its table (null entries included).
    pub index: usize,
    /// Nonzero status returned by the entry.
    pub status: i32,
}

/// Invoke every non-null entry of `table` in order through `invoke`.
///
/// Returns the number of entries invoked.
pub fn run_all_with<F>(table: &[Option<F>], mut invoke: impl FnMut(&F)) -> usize {
    let mut invoked = 0usize;
    for hook in table.iter().flatten() {
        invoke(hook);
        invoked += 1;
    }
    invoked
}

/// Invoke non-null entries of `table` in order through `invoke` until one
/// returns nonzero.
///
/// Entries after the failing one are never invoked. Returns the number of
/// entries invoked when every entry succeeded.
pub fn run_all_or_fail_with<F>(
    table: &[Option<F>],
    mut invoke: impl FnMut(&F) -> i32,
) -> Result<usize, InitFailure> {
    let mut invoked = 0usize;
    for (index, slot) in table.iter().enumerate() {
        let Some(hook) = slot else {
            continue;
        };
        let status = invoke(hook);
        invoked += 1;
        if status != 0 {
            return Err(InitFailure { index, status });
        }
    }
    Ok(invoked)
}

/// Invoke every non-null entry of `table` in order, discarding results.
pub fn run_all<F: TableEntry>(table: &[Option<F>]) -> usize {
    run_all_with(table, F::invoke)
}

/// Invoke non-null entries of `table` in order until one returns nonzero.
pub fn run_all_or_fail<F: StatusTableEntry>(table: &[Option<F>]) -> Result<usize, InitFailure> {
    run_all_or_fail_with(table, F::invoke)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type VoidSlot<'a> = Option<Box<dyn Fn() + 'a>>;
    type StatusSlot<'a> = Option<Box<dyn Fn() -> i32 + 'a>>;

    fn hook<'a>(f: impl Fn() + 'a) -> VoidSlot<'a> {
        Some(Box::new(f))
    }

    #[test]
    fn empty_table_is_a_successful_no_op() {
        let void: [VoidSlot<'_>; 0] = [];
        let status: [StatusSlot<'_>; 0] = [];
        assert_eq!(run_all(&void), 0);
        assert_eq!(run_all_or_fail(&status), Ok(0));
    }

    #[test]
    fn null_only_table_invokes_nothing() {
        let void: [VoidSlot<'_>; 3] = [None, None, None];
        let status: [StatusSlot<'_>; 2] = [None, None];
        assert_eq!(run_all(&void), 0);
        assert_eq!(run_all_or_fail(&status), Ok(0));
    }

    #[test]
    fn run_all_preserves_table_order_and_skips_nulls() {
        let calls = RefCell::new(Vec::new());
        let table: Vec<VoidSlot<'_>> = vec![
            None,
            hook(|| calls.borrow_mut().push("xca")),
            hook(|| calls.borrow_mut().push("xcl")),
            None,
            hook(|| calls.borrow_mut().push("xcu")),
            None,
        ];
        assert_eq!(run_all(&table), 3);
        assert_eq!(*calls.borrow(), ["xca", "xcl", "xcu"]);
    }

    #[test]
    fn run_all_does_not_stop_early() {
        let count = RefCell::new(0);
        let table: Vec<VoidSlot<'_>> = (0..5).map(|_| hook(|| *count.borrow_mut() += 1)).collect();
        assert_eq!(run_all(&table), 5);
        assert_eq!(*count.borrow(), 5);
    }

    fn recorded<'a>(calls: &'a RefCell<Vec<usize>>, id: usize, status: i32) -> StatusSlot<'a> {
        Some(Box::new(move || {
            calls.borrow_mut().push(id);
            status
        }))
    }

    #[test]
    fn first_failure_stops_iteration() {
        let calls = RefCell::new(Vec::new());
        let table = vec![
            None,
            recorded(&calls, 1, 0),
            recorded(&calls, 2, 0),
            recorded(&calls, 3, 7),
            recorded(&calls, 4, 9),
            None,
        ];
        let failure = run_all_or_fail(&table).unwrap_err();
        assert_eq!(failure, InitFailure { index: 3, status: 7 });
        assert_eq!(*calls.borrow(), [1, 2, 3]);
    }

    #[test]
    fn failure_index_counts_null_entries() {
        let calls = RefCell::new(Vec::new());
        let table = vec![None, None, recorded(&calls, 0, -2)];
        let failure = run_all_or_fail(&table).unwrap_err();
        assert_eq!(failure.index, 2);
        assert_eq!(failure.status, -2);
        assert_eq!(failure.to_string(), "initializer #2 failed with status -2");
    }

    #[test]
    fn plain_function_pointers_are_walkable() {
        extern "C" fn ok() -> i32 {
            0
        }
        let ok: extern "C" fn() -> c_int = ok;
        let table = [None, Some(ok), Some(ok)];
        assert_eq!(run_all_or_fail(&table), Ok(2));
    }

    static C_CALLS: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn c_initializer() {
        C_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    extern "C" fn c_failing() -> c_int {
        -1
    }

    #[test]
    fn c_tables_walk_like_rust_tables() {
        let void: [Option<extern "C" fn()>; 4] =
            [None, Some(c_initializer), None, Some(c_initializer)];
        let before = C_CALLS.load(Ordering::SeqCst);
        assert_eq!(run_all(&void), 2);
        assert_eq!(C_CALLS.load(Ordering::SeqCst) - before, 2);

        let status: [Option<extern "C" fn() -> c_int>; 2] = [None, Some(c_failing)];
        assert_eq!(
            run_all_or_fail(&status),
            Err(InitFailure {
                index: 1,
                status: -1
            })
        );
    }

    #[test]
    fn custom_invoker_sees_entries_in_order() {
        let table = [Some(3u8), None, Some(5), Some(0), Some(9)];
        let mut seen = Vec::new();
        assert_eq!(run_all_with(&table, |v| seen.push(*v)), 4);
        assert_eq!(seen, [3, 5, 0, 9]);

        let failure = run_all_or_fail_with(&table, |v| i32::from(*v == 0)).unwrap_err();
        assert_eq!(failure, InitFailure { index: 3, status: 1 });
    }
}
