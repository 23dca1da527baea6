#![forbid(unsafe_code)]
//! Wire-level protocol types for relayfs.
//!
//! Three concerns live here, all free of I/O and dispatch logic:
//!
//! - [`encode`]: fixed-width structure encoding for file and filesystem
//!   metadata, including the low/high 32-bit splitting of fields that can
//!   exceed native integer width.
//! - [`registry`]: the static opcode table mapping every named filesystem
//!   operation to its dense native opcode and, where the protocol requires
//!   a well-formed response even without a user implementation, a default
//!   reply shape.
//! - [`wire`]: the payload and buffer types that cross the native boundary.

pub mod encode;
pub mod registry;
pub mod wire;

pub use encode::{
    STAT_LEN, STATFS_LEN, Stat, StatArray, Statfs, StatfsArray, Timestamp, current_millis,
    encode_stat, encode_stat_at, encode_statfs, join_u64, split_u64, stat_offsets,
};
pub use registry::{
    DefaultReply, OPCODE_TABLE_LEN, OperationDescriptor, Opcode, OpcodeSet, REGISTRY, descriptor,
};
pub use wire::{Payload, Reply, SharedBuffer};
