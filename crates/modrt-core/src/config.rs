//! Runtime configuration.
//!
//! All knobs are read from the environment:
//! - `MODRT_LOG`: lifecycle event reporting. `off` (default) reports nothing,
//!   `counters` keeps in-process counters, `jsonl` also writes one JSON line
//!   per lifecycle event to stderr.
//! - `MODRT_EXIT_RECORD_LIMIT`: maximum number of live records per exit chain.
//!   Unset or unparsable means unlimited.
//! - `MODRT_HOST_VERSION`: overrides the host version query
//!   (`major.minor[.build]`).

use std::sync::atomic::{AtomicU8, Ordering};

use crate::policy::HostVersion;

pub const ENV_LOG: &str = "MODRT_LOG";
pub const ENV_EXIT_RECORD_LIMIT: &str = "MODRT_EXIT_RECORD_LIMIT";
pub const ENV_HOST_VERSION: &str = "MODRT_HOST_VERSION";

/// How lifecycle events are reported.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogMode {
    /// No reporting beyond the return values of the entry points.
    #[default]
    Off,
    /// Relaxed atomic counters only.
    Counters,
    /// Counters plus one JSONL line per event on stderr.
    Jsonl,
}

impl LogMode {
    /// Parse from string (case-insensitive). Unknown values fall back to `Off`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "counters" | "count" | "summary" => Self::Counters,
            "jsonl" | "json" | "trace" | "full" => Self::Jsonl,
            _ => Self::Off,
        }
    }

    #[must_use]
    pub const fn counters_enabled(self) -> bool {
        !matches!(self, Self::Off)
    }

    #[must_use]
    pub const fn lines_enabled(self) -> bool {
        matches!(self, Self::Jsonl)
    }
}

/// Snapshot of every configuration knob.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub log_mode: LogMode,
    pub exit_record_limit: Option<usize>,
    pub host_version_override: Option<HostVersion>,
}

impl RuntimeConfig {
    /// Read the configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            log_mode: lookup(ENV_LOG)
                .map(|v| LogMode::from_str_loose(&v))
                .unwrap_or_default(),
            exit_record_limit: lookup(ENV_EXIT_RECORD_LIMIT).and_then(|v| v.trim().parse().ok()),
            host_version_override: lookup(ENV_HOST_VERSION).and_then(|v| v.parse().ok()),
        }
    }
}

// Atomic cache: 0=unresolved, 1=Off, 2=Counters, 3=Jsonl, 255=resolving.
// A non-blocking state machine instead of OnceLock: the log mode is consulted
// from exit callbacks and terminators, which may run while another thread is
// still resolving it.
static CACHED_LOG_MODE: AtomicU8 = AtomicU8::new(MODE_UNRESOLVED);

const MODE_UNRESOLVED: u8 = 0;
const MODE_OFF: u8 = 1;
const MODE_COUNTERS: u8 = 2;
const MODE_JSONL: u8 = 3;
const MODE_RESOLVING: u8 = 255;

fn mode_to_u8(mode: LogMode) -> u8 {
    match mode {
        LogMode::Off => MODE_OFF,
        LogMode::Counters => MODE_COUNTERS,
        LogMode::Jsonl => MODE_JSONL,
    }
}

fn u8_to_mode(v: u8) -> LogMode {
    match v {
        MODE_COUNTERS => LogMode::Counters,
        MODE_JSONL => LogMode::Jsonl,
        _ => LogMode::Off,
    }
}

/// Configured log mode: [`RuntimeConfig::log_mode`] of the process
/// environment, resolved on first call and cached thereafter.
///
/// A caller that arrives while another call is resolving the value gets
/// `Off`.
#[must_use]
pub fn log_mode() -> LogMode {
    let cached = CACHED_LOG_MODE.load(Ordering::Relaxed);
    if cached != MODE_UNRESOLVED && cached != MODE_RESOLVING {
        return u8_to_mode(cached);
    }
    if cached == MODE_RESOLVING {
        return LogMode::Off;
    }

    if CACHED_LOG_MODE
        .compare_exchange(
            MODE_UNRESOLVED,
            MODE_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        let v = CACHED_LOG_MODE.load(Ordering::Relaxed);
        return if v != MODE_UNRESOLVED && v != MODE_RESOLVING {
            u8_to_mode(v)
        } else {
            LogMode::Off
        };
    }

    let mode = RuntimeConfig::from_env().log_mode;
    CACHED_LOG_MODE.store(mode_to_u8(mode), Ordering::Release);
    mode
}

/// Pin the cached log mode, bypassing the environment.
pub fn set_log_mode(mode: LogMode) {
    CACHED_LOG_MODE.store(mode_to_u8(mode), Ordering::Release);
}
