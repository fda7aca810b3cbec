//! Shared internal utilities for ABI adapters.

use std::ffi::c_int;

/// Void table entry or exit callback (`void (*)(void)`).
pub type VoidHook = extern "C" fn();

/// Status-returning table entry (`int (*)(void)`).
pub type StatusHook = extern "C" fn() -> c_int;

/// `onexit`-style callback (`int (*)(void)`); its return value is ignored.
pub type OnexitHook = extern "C" fn() -> c_int;

/// Borrow the half-open linker range `[first, last)` as a table slice.
///
/// Returns `None` when exactly one bound is null or when `last` precedes
/// `first`. Two equal bounds (including two nulls) are an empty table.
///
/// # Safety
///
/// When both bounds are non-null they must delimit a single readable array of
/// `Option<T>` that outlives `'a`.
pub unsafe fn table_from_range<'a, T>(
    first: *const Option<T>,
    last: *const Option<T>,
) -> Option<&'a [Option<T>]> {
    if first == last {
        return Some(&[]);
    }
    if first.is_null() || last.is_null() {
        return None;
    }
    // SAFETY: caller guarantees both bounds belong to the same table.
    let len = unsafe { last.offset_from(first) };
    let len = usize::try_from(len).ok()?;
    // SAFETY: `[first, first + len)` is the caller-provided readable table.
    Some(unsafe { std::slice::from_raw_parts(first, len) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    extern "C" fn noop() {}

    #[test]
    fn equal_bounds_are_empty() {
        let table: [Option<VoidHook>; 2] = [Some(noop), None];
        let p = table.as_ptr();
        // SAFETY: equal bounds never dereference.
        assert_eq!(unsafe { table_from_range(p, p) }.map(<[_]>::len), Some(0));
        // SAFETY: null bounds never dereference.
        let both_null = unsafe { table_from_range::<VoidHook>(ptr::null(), ptr::null()) };
        assert_eq!(both_null.map(<[_]>::len), Some(0));
    }

    #[test]
    fn full_range_covers_every_slot() {
        let table: [Option<VoidHook>; 3] = [None, Some(noop), None];
        let range = table.as_ptr_range();
        // SAFETY: bounds come from one live array.
        let slice = unsafe { table_from_range(range.start, range.end) }.unwrap();
        assert_eq!(slice.len(), 3);
        assert!(slice[1].is_some());
    }

    #[test]
    fn inverted_or_half_null_ranges_are_rejected() {
        let table: [Option<VoidHook>; 2] = [Some(noop), Some(noop)];
        let range = table.as_ptr_range();
        // SAFETY: bounds come from one live array; inverted order is rejected before reading.
        assert!(unsafe { table_from_range(range.end, range.start) }.is_none());
        // SAFETY: a single null bound is rejected before reading.
        assert!(unsafe { table_from_range(ptr::null(), range.end) }.is_none());
    }
}
