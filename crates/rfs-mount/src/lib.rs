#![forbid(unsafe_code)]
//! Mount lifecycle for relayfs.
//!
//! A [`Session`] binds one mountpoint and one operation set to one native
//! driver mount for its whole life. The state machine is strictly forward:
//!
//! ```text
//! Idle → Opening → Mounted → Closing → Closed
//!            ↘ Failed ↙
//! ```
//!
//! `Opening` validates the mountpoint (existence, directory-ness, busy
//! device detection, optional auto-creation), optionally clears a stale
//! mount left by a crashed process, and then calls the native driver; the
//! transition to `Mounted` only happens once the driver's init opcode
//! actually fires. `Closing` runs the platform unmount command first and
//! touches the native driver only if that command succeeded — a failed
//! command leaves the session `Mounted` and surfaces the distinct
//! unmount-failure error so callers can retry.

mod config;
mod driver;
mod session;

pub use config::{MountConfig, option_string, option_tokens};
pub use driver::{NativeDriver, ThreadContext};
pub use session::{MountState, Session, Unmounter, unmount_path};
