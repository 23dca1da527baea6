#![forbid(unsafe_code)]
//! Error types for relayfs.
//!
//! # Error Taxonomy
//!
//! relayfs uses a two-layer error model:
//!
//! | Layer | Type | Purpose |
//! |-------|------|---------|
//! | Request | [`Errno`] | Negative POSIX codes delivered through the result sink for every filesystem request |
//! | Lifecycle | [`MountError`] | Descriptive mount/unmount failures surfaced to the embedder |
//!
//! The two layers never mix: a dispatch handler always recovers into an
//! `Errno` and delivers it to the native sink, while mount-time failures
//! (missing mountpoint, busy device, unmount command failure) are
//! `MountError` values returned from the session API. Request errors are
//! numeric because they cross the native boundary; lifecycle errors carry
//! context because they stop at the embedder.
//!
//! All numeric values come from `libc` so platform-dependent codes
//! (`ETIMEDOUT`, `ENOTCONN`, the missing-xattr code) resolve correctly per
//! target OS.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

// ── Request-level error domain ──────────────────────────────────────────────

/// A POSIX-style error code as a small negative integer.
///
/// This is the only error representation that crosses the native boundary.
/// `Errno(0)` does not exist as an error; success is signalled by a zero
/// (or positive, for size-carrying replies) code outside this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

macro_rules! errnos {
    ($($name:ident),+ $(,)?) => {
        impl Errno {
            $(
                pub const $name: Errno = Errno(-libc::$name);
            )+
        }

        /// Symbolic names of the closed error set, in declaration order.
        pub const ERRNO_NAMES: &[(&str, Errno)] = &[
            $((stringify!($name), Errno::$name),)+
        ];
    };
}

errnos!(
    EPERM, ENOENT, ESRCH, EINTR, EIO, ENXIO, E2BIG, ENOEXEC, EBADF, ECHILD,
    EAGAIN, ENOMEM, EACCES, EFAULT, EBUSY, EEXIST, EXDEV, ENODEV, ENOTDIR,
    EISDIR, EINVAL, ENFILE, EMFILE, EFBIG, ENOSPC, ESPIPE, EROFS, EMLINK,
    EPIPE, ERANGE, ENAMETOOLONG, ENOSYS, ENOTEMPTY, ELOOP, ENODATA,
    EOVERFLOW, EOPNOTSUPP, ENOTCONN, ETIMEDOUT,
);

impl Errno {
    /// The generic failure delivered for operations the user did not
    /// implement and that have no protocol-mandated default. Matches the
    /// native driver's convention of `-1` (`EPERM`).
    pub const UNSUPPORTED: Errno = Errno::EPERM;

    /// Wrap a raw code. Positive inputs are negated so that both `-2` and
    /// `2` produce `ENOENT`.
    #[must_use]
    pub fn from_raw(code: i32) -> Errno {
        Errno(-code.abs())
    }

    /// The negative integer delivered across the native boundary.
    #[must_use]
    pub fn raw(self) -> i32 {
        self.0
    }

    /// Look up a code by symbolic name, case-insensitively.
    ///
    /// Returns `None` for names outside the closed set; callers that need
    /// the original library's lenient behavior can fall back to
    /// [`Errno::UNSUPPORTED`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Errno> {
        let upper = name.to_ascii_uppercase();
        ERRNO_NAMES
            .iter()
            .find(|(n, _)| *n == upper)
            .map(|(_, e)| *e)
    }

    /// Symbolic name, if the code is in the closed set.
    ///
    /// Aliased codes (e.g. `EOPNOTSUPP`/`ENOTSUP` on some targets) resolve
    /// to the first declared name.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        ERRNO_NAMES
            .iter()
            .find(|(_, e)| *e == self)
            .map(|(n, _)| *n)
    }

    /// The watchdog code delivered when an operation exceeds its deadline.
    ///
    /// Platform-dependent by value (`-110` on Linux, `-60` on macOS) but
    /// always `ETIMEDOUT` by name.
    #[must_use]
    pub fn timeout() -> Errno {
        Errno::ETIMEDOUT
    }

    /// The code reported by a stale mount left behind by a dead process.
    #[must_use]
    pub fn not_connected() -> Errno {
        Errno::ENOTCONN
    }

    /// The code for "no such extended attribute".
    #[must_use]
    #[cfg(target_os = "linux")]
    pub fn no_xattr() -> Errno {
        Errno::ENODATA
    }

    /// The code for "no such extended attribute".
    #[must_use]
    #[cfg(not(target_os = "linux"))]
    pub fn no_xattr() -> Errno {
        Errno(-libc::ENOATTR)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "errno {}", self.0),
        }
    }
}

/// Result alias for user operation handlers.
pub type OpResult<T> = std::result::Result<T, Errno>;

// ── Lifecycle errors ────────────────────────────────────────────────────────

/// Mount/unmount lifecycle failures.
///
/// These are descriptive and never cross the native boundary; each failed
/// lifecycle transition surfaces exactly one of these to the embedder.
/// [`MountError::UnmountCommand`] is deliberately distinct from
/// [`MountError::Driver`] so callers can tell a failed platform unmount
/// command (retryable, session still mounted) apart from a native driver
/// failure (terminal).
#[derive(Debug, Error)]
pub enum MountError {
    #[error("mountpoint does not exist: {0}")]
    MountpointMissing(PathBuf),

    #[error("mountpoint is not a directory: {0}")]
    MountpointNotDirectory(PathBuf),

    /// The mountpoint's device id differs from its parent's: another
    /// filesystem is already mounted there.
    #[error("mountpoint in use: {0}")]
    MountpointInUse(PathBuf),

    /// The platform unmount command failed. The session remains mounted
    /// and the caller may retry.
    #[error("unmount command failed: {detail}")]
    UnmountCommand { detail: String },

    /// The native driver's mount or unmount entry point failed.
    #[error("native driver error: {0}")]
    Driver(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The session is not in the `Mounted` state.
    #[error("session is not mounted")]
    NotMounted,

    /// A session is bound to one mountpoint and one operation set for its
    /// lifetime; remounting requires a new instance.
    #[error("session already used; create a new instance to remount")]
    Consumed,
}

impl MountError {
    /// True when the failure came from the platform unmount command rather
    /// than the native driver, so the close can be retried.
    #[must_use]
    pub fn is_unmount_failure(&self) -> bool {
        matches!(self, MountError::UnmountCommand { .. })
    }
}

/// Result alias for lifecycle operations.
pub type MountResult<T> = std::result::Result<T, MountError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_values_are_negative_libc_codes() {
        assert_eq!(Errno::EPERM.raw(), -1);
        assert_eq!(Errno::ENOENT.raw(), -libc::ENOENT);
        assert_eq!(Errno::EEXIST.raw(), -libc::EEXIST);
        assert_eq!(Errno::ENOTEMPTY.raw(), -libc::ENOTEMPTY);
        assert_eq!(Errno::timeout().raw(), -libc::ETIMEDOUT);
        assert_eq!(Errno::not_connected().raw(), -libc::ENOTCONN);
    }

    #[test]
    fn unsupported_is_eperm() {
        assert_eq!(Errno::UNSUPPORTED, Errno::EPERM);
        assert_eq!(Errno::UNSUPPORTED.raw(), -1);
    }

    #[test]
    fn from_name_is_case_insensitive() {
        assert_eq!(Errno::from_name("ENOENT"), Some(Errno::ENOENT));
        assert_eq!(Errno::from_name("enoent"), Some(Errno::ENOENT));
        assert_eq!(Errno::from_name("EnOtEmPtY"), Some(Errno::ENOTEMPTY));
        assert_eq!(Errno::from_name("ENOSUCHERR"), None);
    }

    #[test]
    fn name_round_trips_through_lookup() {
        for (name, errno) in ERRNO_NAMES {
            assert_eq!(Errno::from_name(name), Some(*errno));
        }
        assert_eq!(Errno::ENOENT.name(), Some("ENOENT"));
    }

    #[test]
    fn from_raw_normalizes_sign() {
        assert_eq!(Errno::from_raw(2), Errno::ENOENT);
        assert_eq!(Errno::from_raw(-2), Errno::ENOENT);
    }

    #[test]
    fn display_includes_name_and_code() {
        assert_eq!(Errno::ENOENT.to_string(), format!("ENOENT ({})", -libc::ENOENT));
        let unknown = Errno::from_raw(9999);
        assert_eq!(unknown.to_string(), "errno -9999");
    }

    #[test]
    fn unmount_failure_marker_is_distinct() {
        let cmd = MountError::UnmountCommand {
            detail: "fusermount: entry not found".into(),
        };
        let drv = MountError::Driver(std::io::Error::other("boom"));
        assert!(cmd.is_unmount_failure());
        assert!(!drv.is_unmount_failure());
    }

    #[test]
    fn lifecycle_errors_describe_the_mountpoint() {
        let err = MountError::MountpointMissing(PathBuf::from("/mnt/gone"));
        assert!(err.to_string().contains("/mnt/gone"));
        let err = MountError::MountpointNotDirectory(PathBuf::from("/mnt/file"));
        assert!(err.to_string().contains("not a directory"));
        let err = MountError::MountpointInUse(PathBuf::from("/mnt/busy"));
        assert!(err.to_string().contains("in use"));
    }
}
