//! Fixed-width metadata encoding.
//!
//! The native driver exchanges file metadata as flat unsigned-integer
//! arrays: 18 slots for a stat record, 11 for a filesystem-stat record.
//! Fields that can exceed 32 bits (`size`, `blocks`, and the three
//! timestamps) occupy two adjacent slots as (low, high) halves; everything
//! else is a single slot. Both encoders are total — absent fields become
//! zeros (link count becomes one) and no input can fail.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Encoded stat record: 18 unsigned 32-bit slots.
pub type StatArray = [u32; STAT_LEN];

/// Encoded filesystem-stat record: 11 unsigned 32-bit slots.
pub type StatfsArray = [u32; STATFS_LEN];

pub const STAT_LEN: usize = 18;
pub const STATFS_LEN: usize = 11;

/// Slot offsets inside a [`StatArray`]. Wide fields name their low half;
/// the high half is the next slot.
pub mod stat_offsets {
    pub const MODE: usize = 0;
    pub const UID: usize = 1;
    pub const GID: usize = 2;
    pub const SIZE: usize = 3;
    pub const DEV: usize = 5;
    pub const NLINK: usize = 6;
    pub const INO: usize = 7;
    pub const RDEV: usize = 8;
    pub const BLKSIZE: usize = 9;
    pub const BLOCKS: usize = 10;
    pub const ATIME: usize = 12;
    pub const MTIME: usize = 14;
    pub const CTIME: usize = 16;
}

// ── Wide-field splitting ────────────────────────────────────────────────────

/// Split a 64-bit value into (low, high) 32-bit halves.
#[must_use]
pub fn split_u64(value: u64) -> (u32, u32) {
    #[allow(clippy::cast_possible_truncation)]
    let low = value as u32;
    let high = (value >> 32) as u32;
    (low, high)
}

/// Reassemble a 64-bit value from its (low, high) halves.
#[must_use]
pub fn join_u64(low: u32, high: u32) -> u64 {
    u64::from(low) | (u64::from(high) << 32)
}

fn set_wide(arr: &mut [u32], idx: usize, value: u64) {
    let (low, high) = split_u64(value);
    arr[idx] = low;
    arr[idx + 1] = high;
}

// ── Timestamps ──────────────────────────────────────────────────────────────

/// A stat timestamp: either a point in time or a raw millisecond count.
///
/// Point-in-time values are converted to milliseconds since the Unix epoch
/// at encode time; raw counts pass through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timestamp {
    Millis(u64),
    At(SystemTime),
}

impl Timestamp {
    /// Milliseconds since the Unix epoch. Pre-epoch instants clamp to 0.
    #[must_use]
    pub fn as_millis(self) -> u64 {
        match self {
            Timestamp::Millis(ms) => ms,
            Timestamp::At(t) => t
                .duration_since(UNIX_EPOCH)
                .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
                .unwrap_or(0),
        }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(t: SystemTime) -> Self {
        Timestamp::At(t)
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn current_millis() -> u64 {
    Timestamp::At(SystemTime::now()).as_millis()
}

// ── Records ─────────────────────────────────────────────────────────────────

/// File metadata record. Every field is optional; absent fields encode as
/// zero except `nlink`, which encodes as one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    pub mode: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub size: Option<u64>,
    pub dev: Option<u32>,
    pub nlink: Option<u32>,
    pub ino: Option<u32>,
    pub rdev: Option<u32>,
    pub blksize: Option<u32>,
    pub blocks: Option<u64>,
    pub atime: Option<Timestamp>,
    pub mtime: Option<Timestamp>,
    pub ctime: Option<Timestamp>,
}

/// Filesystem metadata record. All fields are native-width; absent fields
/// encode as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statfs {
    pub bsize: Option<u32>,
    pub frsize: Option<u32>,
    pub blocks: Option<u32>,
    pub bfree: Option<u32>,
    pub bavail: Option<u32>,
    pub files: Option<u32>,
    pub ffree: Option<u32>,
    pub favail: Option<u32>,
    pub fsid: Option<u32>,
    pub flag: Option<u32>,
    pub namemax: Option<u32>,
}

// ── Encoders ────────────────────────────────────────────────────────────────

/// Encode a stat record with an explicit "now" for the top-level-absent
/// case.
///
/// The distinction this preserves: a *field* missing inside a present
/// record encodes as zero, but a missing *record* — the "no value provided"
/// shape used for default attribute responses — carries `now_ms` in all
/// three timestamp slots so the kernel sees a plausible live entry.
#[must_use]
pub fn encode_stat_at(stat: Option<&Stat>, now_ms: u64) -> StatArray {
    use stat_offsets as off;

    let mut arr = [0_u32; STAT_LEN];
    let Some(stat) = stat else {
        arr[off::NLINK] = 1;
        set_wide(&mut arr, off::ATIME, now_ms);
        set_wide(&mut arr, off::MTIME, now_ms);
        set_wide(&mut arr, off::CTIME, now_ms);
        return arr;
    };

    let ts = |t: Option<Timestamp>| t.map(Timestamp::as_millis).unwrap_or(0);

    arr[off::MODE] = stat.mode.unwrap_or(0);
    arr[off::UID] = stat.uid.unwrap_or(0);
    arr[off::GID] = stat.gid.unwrap_or(0);
    set_wide(&mut arr, off::SIZE, stat.size.unwrap_or(0));
    arr[off::DEV] = stat.dev.unwrap_or(0);
    arr[off::NLINK] = stat.nlink.unwrap_or(1);
    arr[off::INO] = stat.ino.unwrap_or(0);
    arr[off::RDEV] = stat.rdev.unwrap_or(0);
    arr[off::BLKSIZE] = stat.blksize.unwrap_or(0);
    set_wide(&mut arr, off::BLOCKS, stat.blocks.unwrap_or(0));
    set_wide(&mut arr, off::ATIME, ts(stat.atime));
    set_wide(&mut arr, off::MTIME, ts(stat.mtime));
    set_wide(&mut arr, off::CTIME, ts(stat.ctime));
    arr
}

/// Encode a stat record, using the current wall clock for the
/// top-level-absent case. See [`encode_stat_at`].
#[must_use]
pub fn encode_stat(stat: Option<&Stat>) -> StatArray {
    encode_stat_at(stat, current_millis())
}

/// Encode a filesystem-stat record. No wide fields; absent values are zero.
#[must_use]
pub fn encode_statfs(statfs: Option<&Statfs>) -> StatfsArray {
    let mut arr = [0_u32; STATFS_LEN];
    let Some(s) = statfs else {
        return arr;
    };
    arr[0] = s.bsize.unwrap_or(0);
    arr[1] = s.frsize.unwrap_or(0);
    arr[2] = s.blocks.unwrap_or(0);
    arr[3] = s.bfree.unwrap_or(0);
    arr[4] = s.bavail.unwrap_or(0);
    arr[5] = s.files.unwrap_or(0);
    arr[6] = s.ffree.unwrap_or(0);
    arr[7] = s.favail.unwrap_or(0);
    arr[8] = s.fsid.unwrap_or(0);
    arr[9] = s.flag.unwrap_or(0);
    arr[10] = s.namemax.unwrap_or(0);
    arr
}
