//! Process-wide lifecycle event reporting.
//!
//! Events from the ABI entry points are folded into one static
//! [`EventCounters`] when `MODRT_LOG` enables counters, and additionally
//! written to stderr as JSONL when it is `jsonl`. Each line is the serialized
//! [`LifecycleEvent`] with a process-local `seq` number added.

use std::ffi::c_int;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use modrt_core::config::log_mode;
use modrt_core::event::CountersSnapshot;
use modrt_core::{EventCounters, EventSink, LifecycleEvent};

static COUNTERS: EventCounters = EventCounters::new();
static LINE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Sink used by every process-wide entry point.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessSink;

impl EventSink for ProcessSink {
    fn emit(&self, event: &LifecycleEvent) {
        let mode = log_mode();
        if mode.counters_enabled() {
            COUNTERS.record(event);
        }
        if mode.lines_enabled() {
            let seq = LINE_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(line) = render_line(seq, event) {
                let mut err = std::io::stderr().lock();
                let _ = writeln!(err, "{line}");
            }
        }
    }
}

/// Serialize one event as a JSONL record carrying `seq`.
#[must_use]
pub fn render_line(seq: u64, event: &LifecycleEvent) -> Option<String> {
    let mut value = serde_json::to_value(event).ok()?;
    value
        .as_object_mut()?
        .insert("seq".to_string(), serde_json::Value::from(seq));
    serde_json::to_string(&value).ok()
}

/// Current process-wide counters.
#[must_use]
pub fn counters_snapshot() -> CountersSnapshot {
    COUNTERS.snapshot()
}

pub(crate) fn reset_counters() {
    COUNTERS.reset();
    LINE_SEQ.store(0, Ordering::Relaxed);
}

/// Copy the process-wide counters into `out`. Returns `-1` for a null `out`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn __modrt_event_snapshot(out: *mut CountersSnapshot) -> c_int {
    if out.is_null() {
        return -1;
    }
    // SAFETY: caller provides a writable snapshot buffer.
    unsafe { out.write(COUNTERS.snapshot()) };
    0
}
