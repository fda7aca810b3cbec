//! Pool policy exports.
//!
//! The allocator collaborator reads the process-wide pool type, MDL
//! protection flag and pool tag through the `__modrt_default_*` getters.
//! Values start at the modern defaults and are replaced once by
//! `_initialize_pool` (or by module startup, which calls the same selector).

use std::sync::atomic::{AtomicU32, Ordering};

use modrt_core::config::RuntimeConfig;
use modrt_core::policy::select_pool_policy;
use modrt_core::{EventSink, LifecycleEvent, PolicySelection, PoolPolicy};

use crate::event_log::ProcessSink;
use crate::host_version::ProcessHostVersion;

static POOL_TYPE: AtomicU32 = AtomicU32::new(PoolPolicy::modern().pool_type.as_raw());
static MDL_PROTECTION: AtomicU32 = AtomicU32::new(PoolPolicy::modern().mdl_protection);
static POOL_TAG: AtomicU32 = AtomicU32::new(PoolPolicy::modern().pool_tag);

fn publish(policy: PoolPolicy) {
    POOL_TYPE.store(policy.pool_type.as_raw(), Ordering::Release);
    MDL_PROTECTION.store(policy.mdl_protection, Ordering::Release);
    POOL_TAG.store(policy.pool_tag, Ordering::Release);
}

/// Run the selector against the process host version and publish the
/// result. Selection always starts from the defaults, so repeated calls
/// converge on the same values.
pub(crate) fn select_and_publish(config: &RuntimeConfig) -> (PolicySelection, PoolPolicy) {
    let mut policy = PoolPolicy::modern();
    let selection = select_pool_policy(&mut policy, &ProcessHostVersion::from_config(config));
    publish(policy);
    (selection, policy)
}

pub(crate) fn reset_policy() {
    publish(PoolPolicy::modern());
}

/// Select the pool policy for this host.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn _initialize_pool() {
    let (selection, policy) = select_and_publish(&RuntimeConfig::from_env());
    ProcessSink.emit(&LifecycleEvent::PolicySelected { selection, policy });
}

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn __modrt_default_pool_type() -> u32 {
    POOL_TYPE.load(Ordering::Acquire)
}

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn __modrt_default_mdl_protection() -> u32 {
    MDL_PROTECTION.load(Ordering::Acquire)
}

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub extern "C" fn __modrt_default_pool_tag() -> u32 {
    POOL_TAG.load(Ordering::Acquire)
}
