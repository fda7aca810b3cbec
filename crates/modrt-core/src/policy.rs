//! Host-version dependent pool policy.
//!
//! Hosts older than 6.2 do not understand no-execute pool types or the
//! no-execute MDL mapping flag, so the allocator collaborator has to fall back
//! to plain non-paged pool without extra protection. The decision is made
//! once at startup. A failing version query keeps the defaults.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// MDL mapping flag requesting a non-executable system mapping.
pub const MDL_MAPPING_NO_EXECUTE: u32 = 0x4000_0000;

/// Default allocation tag, `"mdrt"` read as a little-endian `u32`.
pub const DEFAULT_POOL_TAG: u32 = u32::from_le_bytes(*b"mdrt");

/// Oldest host version that keeps the default (no-execute) policy.
pub const NX_POOL_MIN_VERSION: (u32, u32) = (6, 2);

/// Pool classification handed to the allocator collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum PoolType {
    NonPagedPool = 0,
    NonPagedPoolNx = 512,
}

impl PoolType {
    #[must_use]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::NonPagedPool),
            512 => Some(Self::NonPagedPoolNx),
            _ => None,
        }
    }
}

/// Process-wide allocation policy values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolPolicy {
    pub pool_type: PoolType,
    pub mdl_protection: u32,
    pub pool_tag: u32,
}

impl PoolPolicy {
    /// Compiled-in defaults for modern hosts.
    #[must_use]
    pub const fn modern() -> Self {
        Self {
            pool_type: PoolType::NonPagedPoolNx,
            mdl_protection: MDL_MAPPING_NO_EXECUTE,
            pool_tag: DEFAULT_POOL_TAG,
        }
    }
}

impl Default for PoolPolicy {
    fn default() -> Self {
        Self::modern()
    }
}

/// Host environment version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HostVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
}

impl HostVersion {
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            build: 0,
        }
    }

    /// True for hosts that predate no-execute pool support.
    #[must_use]
    pub const fn predates_nx_pools(self) -> bool {
        let (min_major, min_minor) = NX_POOL_MIN_VERSION;
        self.major < min_major || (self.major == min_major && self.minor < min_minor)
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.build)
    }
}

impl FromStr for HostVersion {
    type Err = VersionQueryError;

    /// Parses `major.minor[.build]`. Anything after the first non-digit of
    /// each component is ignored, so kernel release strings such as
    /// `6.1.0-18-amd64` parse as `6.1.0`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().splitn(3, '.');
        let mut component = |required: bool| -> Result<u32, VersionQueryError> {
            match parts.next() {
                Some(part) => {
                    let digits: &str = part
                        .find(|c: char| !c.is_ascii_digit())
                        .map_or(part, |end| &part[..end]);
                    if digits.is_empty() {
                        return Err(VersionQueryError::Malformed(s.to_string()));
                    }
                    digits
                        .parse()
                        .map_err(|_| VersionQueryError::Malformed(s.to_string()))
                }
                None if required => Err(VersionQueryError::Malformed(s.to_string())),
                None => Ok(0),
            }
        };
        let major = component(true)?;
        let minor = component(true)?;
        let build = component(false)?;
        Ok(Self {
            major,
            minor,
            build,
        })
    }
}

/// Why the host version could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionQueryError {
    #[error("host version query is not available")]
    Unavailable,
    #[error("malformed host version: {0:?}")]
    Malformed(String),
    #[error("host version query failed with status {0}")]
    Status(i32),
}

/// Source of the host environment version.
pub trait HostVersionSource {
    fn host_version(&self) -> Result<HostVersion, VersionQueryError>;
}

impl<F> HostVersionSource for F
where
    F: Fn() -> Result<HostVersion, VersionQueryError>,
{
    fn host_version(&self) -> Result<HostVersion, VersionQueryError> {
        self()
    }
}

/// Fixed answer, used by tests and by the `MODRT_HOST_VERSION` override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHostVersion(pub Option<HostVersion>);

impl HostVersionSource for FixedHostVersion {
    fn host_version(&self) -> Result<HostVersion, VersionQueryError> {
        self.0.ok_or(VersionQueryError::Unavailable)
    }
}

/// Which branch the selector took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "branch", rename_all = "snake_case")]
pub enum PolicySelection {
    /// Query failed; defaults kept.
    QueryFailed,
    /// Host is new enough; defaults kept.
    Modern { version: HostVersion },
    /// Host predates 6.2; legacy pool values applied.
    Legacy { version: HostVersion },
}

/// Query `source` once and adjust `policy` for legacy hosts.
pub fn select_pool_policy(
    policy: &mut PoolPolicy,
    source: &dyn HostVersionSource,
) -> PolicySelection {
    let Ok(version) = source.host_version() else {
        return PolicySelection::QueryFailed;
    };

    if version.predates_nx_pools() {
        policy.pool_type = PoolType::NonPagedPool;
        policy.mdl_protection = 0;
        PolicySelection::Legacy { version }
    } else {
        PolicySelection::Modern { version }
    }
}
