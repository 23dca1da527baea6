#![forbid(unsafe_code)]
//! relayfs public API facade.
//!
//! Re-exports the user-facing surface — the error domain, wire types, the
//! capability record, the mount session, and the reference in-memory
//! filesystem — so embedders depend on one crate.

pub use rfs_dispatch::{Operations, Request, TimeoutPolicy};
pub use rfs_error::{Errno, MountError, MountResult, OpResult};
pub use rfs_memfs::MemFs;
pub use rfs_mount::{MountConfig, MountState, NativeDriver, Session, ThreadContext, unmount_path};
pub use rfs_proto::{Opcode, Payload, Reply, SharedBuffer, Stat, Statfs, Timestamp};
