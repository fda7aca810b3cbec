// Every extern "C" export here takes linker-provided table boundaries or
// opaque table handles; their contract is the C runtime's, documented once
// per module instead of per function.
#![allow(clippy::missing_safety_doc)]
//! # modrt-abi
//!
//! `extern "C"` boundary of the modrt module lifecycle runtime.
//!
//! This crate produces a `cdylib` exposing the C runtime startup/teardown
//! symbols (`_initterm`, `_initterm_e`, `atexit`, `at_quick_exit`, `onexit`,
//! `_onexit`, `_register_onexit_function`, `_execute_onexit_table`,
//! `_initialize_pool`) plus the `__modrt_*` bootstrap entry points. The
//! sequencing itself lives in `modrt-core`; this layer owns the single
//! process-wide instance of the lifecycle state.
//!
//! # Architecture
//!
//! ```text
//! entry thunk -> __modrt_module_startup -> modrt_core::lifecycle::start
//! user code   -> atexit / at_quick_exit -> OnexitTable (locked slot)
//! exit thunk  -> __modrt_module_shutdown -> modrt_core::lifecycle::shutdown
//! ```
//!
//! Symbols are only unmangled in release builds so that debug test binaries
//! keep the host's own `atexit`.

pub mod event_log;
pub mod host_version;
pub mod initterm_abi;
pub mod onexit_abi;
pub mod pool_abi;
mod runtime_state;
pub mod startup_abi;
pub mod util;

pub use util::{OnexitHook, StatusHook, VoidHook};
