//! Integration tests for the exit-callback ABI.
//!
//! Run: cargo test -p modrt-abi --test onexit_abi_test

use std::ffi::c_int;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::thread;

use modrt_abi::onexit_abi::{
    __modrt_onexit_table, __modrt_quick_onexit_table, _execute_onexit_table, _onexit,
    _register_onexit_function, at_quick_exit, atexit, onexit, table_for,
};
use modrt_abi::startup_abi::lifecycle_reset_for_tests;
use modrt_core::ExitKind;

static TEST_LOCK: Mutex<()> = Mutex::new(());
static ORDER: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());
static COUNTED: AtomicUsize = AtomicUsize::new(0);

extern "C" fn first() {
    ORDER.lock().unwrap().push("first");
}

extern "C" fn second() {
    ORDER.lock().unwrap().push("second");
}

extern "C" fn onexit_style() -> c_int {
    ORDER.lock().unwrap().push("onexit");
    42
}

extern "C" fn counted() {
    COUNTED.fetch_add(1, Ordering::SeqCst);
}

fn acquire_test_lock() -> MutexGuard<'static, ()> {
    let guard = TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    lifecycle_reset_for_tests();
    ORDER.lock().unwrap().clear();
    COUNTED.store(0, Ordering::SeqCst);
    guard
}

fn execute(kind: ExitKind) -> c_int {
    let handle = match kind {
        ExitKind::Normal => __modrt_onexit_table(),
        ExitKind::Quick => __modrt_quick_onexit_table(),
    };
    // SAFETY: handle comes from the table accessors.
    unsafe { _execute_onexit_table(handle) }
}

#[test]
fn mixed_registrations_run_in_reverse_order() {
    let _guard = acquire_test_lock();
    assert_eq!(atexit(Some(first)), 0);
    assert!(onexit(Some(onexit_style)).is_some());
    // SAFETY: handle comes from the table accessor.
    let rc = unsafe { _register_onexit_function(__modrt_onexit_table(), Some(second)) };
    assert_eq!(rc, 0);
    assert_eq!(table_for(ExitKind::Normal).len(), 3);

    assert_eq!(execute(ExitKind::Normal), 0);
    assert_eq!(*ORDER.lock().unwrap(), ["second", "onexit", "first"]);
    assert!(table_for(ExitKind::Normal).is_empty());
}

#[test]
fn executing_an_empty_table_is_a_no_op() {
    let _guard = acquire_test_lock();
    assert_eq!(execute(ExitKind::Normal), 0);
    assert_eq!(execute(ExitKind::Normal), 0);
    assert!(ORDER.lock().unwrap().is_empty());
}

#[test]
fn quick_table_is_independent_of_normal_table() {
    let _guard = acquire_test_lock();
    assert_eq!(atexit(Some(first)), 0);
    assert_eq!(at_quick_exit(Some(second)), 0);

    assert_eq!(execute(ExitKind::Quick), 0);
    assert_eq!(*ORDER.lock().unwrap(), ["second"]);
    assert_eq!(table_for(ExitKind::Normal).len(), 1);

    assert_eq!(execute(ExitKind::Normal), 0);
    assert_eq!(*ORDER.lock().unwrap(), ["second", "first"]);
}

#[test]
fn underscore_alias_matches_onexit() {
    let _guard = acquire_test_lock();
    assert!(_onexit(Some(onexit_style)).is_some());
    assert!(_onexit(None).is_none());
    assert_eq!(execute(ExitKind::Normal), 0);
    assert_eq!(*ORDER.lock().unwrap(), ["onexit"]);
}

#[test]
fn concurrent_registrations_are_never_lost() {
    let _guard = acquire_test_lock();
    const THREADS: usize = 8;
    const PER_THREAD: usize = 250;

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            thread::spawn(move || {
                for _ in 0..PER_THREAD {
                    let rc = if i % 2 == 0 {
                        atexit(Some(counted))
                    } else {
                        // SAFETY: handle comes from the table accessor.
                        unsafe { _register_onexit_function(__modrt_onexit_table(), Some(counted)) }
                    };
                    assert_eq!(rc, 0);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table_for(ExitKind::Normal).len(), THREADS * PER_THREAD);
    assert_eq!(execute(ExitKind::Normal), 0);
    assert_eq!(COUNTED.load(Ordering::SeqCst), THREADS * PER_THREAD);
}

#[test]
fn record_limit_rejects_without_losing_existing_records() {
    let _guard = acquire_test_lock();
    table_for(ExitKind::Normal).set_record_limit(Some(1));
    assert_eq!(atexit(Some(first)), 0);
    assert_eq!(atexit(Some(second)), -1);
    assert!(onexit(Some(onexit_style)).is_none());

    assert_eq!(execute(ExitKind::Normal), 0);
    assert_eq!(*ORDER.lock().unwrap(), ["first"]);
}
