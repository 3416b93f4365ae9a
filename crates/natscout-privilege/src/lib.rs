//! Discover platform privileges for ICMP probe sockets.
//!
//! The probe engine opens `IPPROTO_ICMP` datagram sockets ("ping sockets").
//! On Linux and Android these are available without any capability when the
//! effective group id of the process falls within the
//! `net.ipv4.ping_group_range` sysctl; otherwise the `CAP_NET_RAW`
//! capability is required.
//!
//! [`Privilege::acquire_privileges`]:
//!
//! - On Linux we check if `CAP_NET_RAW` is in the permitted set and if so raise it to the
//!   effective set
//! - On other Unix platforms this is a no-op
//!
//! [`Privilege::has_privileges`] (obtained via [`Privilege::discover`]):
//!
//! - On Linux this is true if the effective gid is covered by
//!   `net.ipv4.ping_group_range` or `CAP_NET_RAW` is in the effective set
//! - On other Unix platforms we check that the effective user is root
//!
//! [`Privilege::needs_privileges`] (obtained via [`Privilege::discover`]):
//!
//! - On Linux privileges are needed only when the sysctl excludes the effective gid
//! - On other Unix platforms privileges are always needed
//!
//! # Examples
//!
//! Acquire the required privileges if we can:
//!
//! ```rust
//! # fn main() -> anyhow::Result<()> {
//! # use natscout_privilege::Privilege;
//! let privilege = Privilege::acquire_privileges()?;
//! if privilege.has_privileges() {
//!     println!("You can open ICMP probe sockets");
//! } else {
//!     println!("You cannot open ICMP probe sockets");
//! }
//! # Ok(())
//! # }
//! ```

/// A privilege error result.
pub type Result<T> = std::result::Result<T, Error>;

/// A privilege error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[cfg(target_os = "linux")]
    #[error("caps error: {0}")]
    CapsError(#[from] caps::errors::CapsError),
}

/// Run-time platform privilege information.
#[derive(Debug)]
pub struct Privilege {
    has_privileges: bool,
    needs_privileges: bool,
}

impl Privilege {
    /// Discover information about the platform privileges.
    pub fn discover() -> Result<Self> {
        let has_privileges = Self::check_has_privileges()?;
        let needs_privileges = Self::check_needs_privileges();
        Ok(Self {
            has_privileges,
            needs_privileges,
        })
    }

    /// Create a new Privilege instance.
    #[must_use]
    pub const fn new(has_privileges: bool, needs_privileges: bool) -> Self {
        Self {
            has_privileges,
            needs_privileges,
        }
    }

    /// Can we open an ICMP probe socket?
    #[must_use]
    pub const fn has_privileges(&self) -> bool {
        self.has_privileges
    }

    /// Does our platform require privileges for ICMP probe sockets?
    #[must_use]
    pub const fn needs_privileges(&self) -> bool {
        self.needs_privileges
    }

    // Linux

    #[cfg(target_os = "linux")]
    /// Acquire privileges, if possible.
    ///
    /// Check if `CAP_NET_RAW` is in the permitted set and if so raise it to the effective set.
    pub fn acquire_privileges() -> Result<Self> {
        if caps::has_cap(None, caps::CapSet::Permitted, caps::Capability::CAP_NET_RAW)? {
            caps::raise(None, caps::CapSet::Effective, caps::Capability::CAP_NET_RAW)?;
        }
        Self::discover()
    }

    #[cfg(target_os = "linux")]
    /// Do we have what is needed to open an ICMP probe socket?
    ///
    /// Either the ping group range covers our effective gid or `CAP_NET_RAW` is in the
    /// effective set.
    fn check_has_privileges() -> Result<bool> {
        if ping_sockets_allowed() {
            return Ok(true);
        }
        Ok(caps::has_cap(
            None,
            caps::CapSet::Effective,
            caps::Capability::CAP_NET_RAW,
        )?)
    }

    #[cfg(target_os = "linux")]
    /// Drop all privileges.
    ///
    /// Clears the effective set.
    pub fn drop_privileges() -> Result<()> {
        caps::clear(None, caps::CapSet::Effective)?;
        Ok(())
    }

    #[cfg(target_os = "linux")]
    /// Does the platform require privileges?
    ///
    /// Only when the `net.ipv4.ping_group_range` sysctl excludes our effective gid.
    fn check_needs_privileges() -> bool {
        !ping_sockets_allowed()
    }

    // Unix (excl. Linux)

    #[cfg(all(unix, not(target_os = "linux")))]
    /// Acquire privileges, if possible.
    ///
    /// This is a no-op on non-Linux unix systems.
    pub fn acquire_privileges() -> Result<Self> {
        Self::discover()
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    #[expect(clippy::unnecessary_wraps)]
    /// Do we have the required privileges?
    ///
    /// Checks if the effective user is root.
    fn check_has_privileges() -> Result<bool> {
        Ok(nix::unistd::Uid::effective().is_root())
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    /// Drop all privileges.
    ///
    /// This is a no-op on non-Linux unix systems.
    pub const fn drop_privileges() -> Result<()> {
        Ok(())
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    /// Does the platform require privileges?
    ///
    /// Always on non-Linux unix systems.
    const fn check_needs_privileges() -> bool {
        true
    }
}

/// Is the effective gid covered by the `net.ipv4.ping_group_range` sysctl?
///
/// The kernel default of `1 0` (an empty range) disallows everyone.
#[cfg(target_os = "linux")]
fn ping_sockets_allowed() -> bool {
    std::fs::read_to_string("/proc/sys/net/ipv4/ping_group_range").is_ok_and(|contents| {
        let mut bounds = contents
            .split_whitespace()
            .filter_map(|tok| tok.parse::<u64>().ok());
        match (bounds.next(), bounds.next()) {
            (Some(low), Some(high)) => {
                let egid = u64::from(nix::unistd::Gid::effective().as_raw());
                (low..=high).contains(&egid)
            }
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let privilege = Privilege::new(true, false);
        assert!(privilege.has_privileges());
        assert!(!privilege.needs_privileges());
    }

    #[test]
    fn test_discover() -> anyhow::Result<()> {
        let privilege = Privilege::discover()?;
        let _ = privilege.has_privileges();
        let _ = privilege.needs_privileges();
        Ok(())
    }
}
