//! Deferred exit-callback registry.
//!
//! Each [`ExitSlot`] is a stack of callback records: registration pushes a
//! record on top, draining pops records one by one, runs the callback and
//! releases the record. The most recent registration always runs first.
//!
//! Record storage is reserved fallibly, so an allocation failure surfaces as
//! [`RegisterError`] instead of aborting the module. A slot may also carry a
//! record limit, which models a fixed-size pool.

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which exit chain a callback belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    /// Drained on normal module/process termination.
    Normal,
    /// Drained on the abbreviated quick-exit path.
    Quick,
}

/// Registration failure. The slot is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterError {
    #[error("exit record limit of {limit} reached")]
    LimitReached { limit: usize },
    #[error("exit record allocation failed")]
    AllocationFailed,
}

/// Outcome of running a detached chain.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Callbacks invoked.
    pub invoked: usize,
    /// Callbacks that panicked. Each is counted in `invoked` as well.
    pub panicked: usize,
}

impl DrainReport {
    pub fn merge(&mut self, other: DrainReport) {
        self.invoked += other.invoked;
        self.panicked += other.panicked;
    }
}

struct ExitRecord<F> {
    callback: F,
}

/// One exit chain.
pub struct ExitSlot<F> {
    records: Vec<ExitRecord<F>>,
    limit: Option<usize>,
}

impl<F> ExitSlot<F> {
    /// Create an empty, unlimited slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
            limit: None,
        }
    }

    /// Create an empty slot that accepts at most `limit` live records.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            records: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Push `callback` on top of the chain.
    ///
    /// `try_reserve` cannot be made to fail on demand, so the record limit
    /// doubles as the way to force an exhausted record pool: both paths
    /// reject before the slot changes.
    pub fn register(&mut self, callback: F) -> Result<(), RegisterError> {
        if let Some(limit) = self.limit
            && self.records.len() >= limit
        {
            return Err(RegisterError::LimitReached { limit });
        }
        self.records
            .try_reserve(1)
            .map_err(|_| RegisterError::AllocationFailed)?;
        self.records.push(ExitRecord { callback });
        Ok(())
    }

    /// Detach every record, leaving the slot empty.
    ///
    /// Callers holding a lock around the slot use this to run callbacks after
    /// releasing it.
    #[must_use]
    pub fn take(&mut self) -> DetachedChain<F> {
        DetachedChain {
            records: std::mem::take(&mut self.records),
        }
    }

    /// Detach and run the chain, invoking callbacks through `invoke`.
    pub fn drain_with(&mut self, invoke: impl FnMut(&F)) -> DrainReport {
        self.take().run_with(invoke)
    }
}

impl<F: Fn()> ExitSlot<F> {
    /// Run and release every record, most recent first.
    pub fn drain(&mut self) -> DrainReport {
        self.take().run()
    }
}

impl<F> Default for ExitSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> std::fmt::Debug for ExitSlot<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitSlot")
            .field("len", &self.records.len())
            .field("limit", &self.limit)
            .finish()
    }
}

/// Records detached from a slot, still in registration order.
#[must_use = "a detached chain releases its records without running them when dropped"]
pub struct DetachedChain<F> {
    records: Vec<ExitRecord<F>>,
}

impl<F> DetachedChain<F> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Pop records most recent first, invoke each through `invoke`, then
    /// release it. A panicking callback is contained and counted; the
    /// remaining records still run.
    pub fn run_with(mut self, mut invoke: impl FnMut(&F)) -> DrainReport {
        let mut report = DrainReport::default();
        while let Some(record) = self.records.pop() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| invoke(&record.callback)));
            report.invoked += 1;
            if outcome.is_err() {
                report.panicked += 1;
            }
        }
        report
    }
}

impl<F: Fn()> DetachedChain<F> {
    pub fn run(self) -> DrainReport {
        self.run_with(|callback| callback())
    }
}
