//! Host environment version query.
//!
//! `MODRT_HOST_VERSION` wins when set and parsable. Otherwise Windows hosts
//! report the OS version from `RtlGetVersion`. Every other target reports
//! the query as unavailable, which keeps the default pool policy: a Linux
//! kernel release is not a host OS version and must not reach the `< 6.2`
//! rule.

use modrt_core::config::RuntimeConfig;
use modrt_core::policy::{HostVersion, HostVersionSource, VersionQueryError};

/// Version source backed by the running process.
#[derive(Debug, Clone, Copy)]
pub struct ProcessHostVersion {
    override_version: Option<HostVersion>,
}

impl ProcessHostVersion {
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            override_version: config.host_version_override,
        }
    }
}

impl HostVersionSource for ProcessHostVersion {
    fn host_version(&self) -> Result<HostVersion, VersionQueryError> {
        match self.override_version {
            Some(version) => Ok(version),
            None => query_platform(),
        }
    }
}

#[cfg(windows)]
fn query_platform() -> Result<HostVersion, VersionQueryError> {
    use windows_sys::Wdk::System::SystemServices::RtlGetVersion;
    use windows_sys::Win32::System::SystemInformation::OSVERSIONINFOW;

    // SAFETY: OSVERSIONINFOW is plain data; all-zero is a valid value.
    let mut info: OSVERSIONINFOW = unsafe { std::mem::zeroed() };
    info.dwOSVersionInfoSize = std::mem::size_of::<OSVERSIONINFOW>() as u32;
    // SAFETY: `info` is a writable OSVERSIONINFOW with its size field set.
    let status = unsafe { RtlGetVersion(&mut info) };
    if status < 0 {
        return Err(VersionQueryError::Status(status));
    }
    Ok(HostVersion {
        major: info.dwMajorVersion,
        minor: info.dwMinorVersion,
        build: info.dwBuildNumber,
    })
}

#[cfg(not(windows))]
fn query_platform() -> Result<HostVersion, VersionQueryError> {
    Err(VersionQueryError::Unavailable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_bypasses_platform_query() {
        let config = RuntimeConfig {
            host_version_override: Some(HostVersion::new(6, 1)),
            ..RuntimeConfig::default()
        };
        let source = ProcessHostVersion::from_config(&config);
        assert_eq!(source.host_version(), Ok(HostVersion::new(6, 1)));
    }

    #[cfg(not(windows))]
    #[test]
    fn non_windows_hosts_keep_default_policy() {
        use modrt_core::policy::{PolicySelection, PoolPolicy, select_pool_policy};

        let source = ProcessHostVersion::from_config(&RuntimeConfig::default());
        assert_eq!(source.host_version(), Err(VersionQueryError::Unavailable));

        let mut policy = PoolPolicy::modern();
        assert_eq!(
            select_pool_policy(&mut policy, &source),
            PolicySelection::QueryFailed
        );
        assert_eq!(policy, PoolPolicy::modern());
    }

    #[cfg(windows)]
    #[test]
    fn windows_version_is_reported() {
        let source = ProcessHostVersion::from_config(&RuntimeConfig::default());
        let version = source.host_version().unwrap();
        assert!(version.major >= 6, "{version}");
    }
}
