//! # modrt-core
//!
//! Safe building blocks of the modrt module lifecycle runtime.
//!
//! This crate knows *when* module initializers, terminators and deferred exit
//! callbacks run and in which order. It never decides what they do, and it
//! contains no `unsafe` code: the `extern "C"` surface that turns linker
//! section boundaries into slices lives in `modrt-abi`.
//!
//! # Architecture
//!
//! ```text
//! bootstrap thunk -> modrt-abi -> lifecycle::start / shutdown
//!                                   |-> policy::select_pool_policy
//!                                   |-> table::run_all_or_fail / run_all
//!                                   `-> registry::ExitSlot::drain (LIFO)
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod event;
pub mod lifecycle;
pub mod policy;
pub mod registry;
pub mod table;

pub use event::{EventCounters, EventSink, LifecycleEvent, NullSink};
pub use lifecycle::{
    InitTables, LifecycleContext, LifecycleError, Phase, RuntimeHost, ShutdownReport,
    StartReport, TermTables,
};
pub use policy::{HostVersion, HostVersionSource, PolicySelection, PoolPolicy, PoolType};
pub use registry::{DrainReport, ExitKind, ExitSlot, RegisterError};
pub use table::{
    InitFailure, StatusTableEntry, TableEntry, run_all, run_all_or_fail, run_all_or_fail_with,
    run_all_with,
};
