//! Payloads and buffers exchanged with the native driver.

use crate::encode::{StatArray, StatfsArray};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

// ── Shared buffers ──────────────────────────────────────────────────────────

/// Handle to a byte buffer owned by the native driver for the duration of
/// one request.
///
/// Handlers borrow the buffer — they read or fill it during the request
/// and must not retain the handle past completion. Timeout replies echo
/// the handle back through the payload so the driver can reclaim the
/// underlying storage; handle identity (not content) is what the driver
/// keys on, which is why equality is pointer equality.
#[derive(Clone)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// A zero-filled buffer of `len` bytes.
    #[must_use]
    pub fn zeroed(len: usize) -> SharedBuffer {
        SharedBuffer(Arc::new(Mutex::new(vec![0; len])))
    }

    /// A buffer seeded with `bytes`.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> SharedBuffer {
        SharedBuffer(Arc::new(Mutex::new(bytes)))
    }

    /// Lock the buffer contents for reading or writing.
    pub fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Snapshot of the current contents.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.lock().clone()
    }

    /// Whether two handles refer to the same underlying buffer.
    #[must_use]
    pub fn same_buffer(&self, other: &SharedBuffer) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for SharedBuffer {
    fn eq(&self, other: &SharedBuffer) -> bool {
        self.same_buffer(other)
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .finish()
    }
}

// ── Reply payloads ──────────────────────────────────────────────────────────

/// The payload half of a reply delivered to the native result sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No payload beyond the code (most mutating operations).
    None,
    /// A single value: descriptor, access result, or size probe.
    Value(u32),
    /// Encoded stat record.
    Stat(StatArray),
    /// Encoded filesystem-stat record.
    Statfs(StatfsArray),
    /// Directory listing: child names and their encoded stat records.
    Dirents {
        names: Vec<String>,
        stats: Vec<StatArray>,
    },
    /// Symlink target.
    LinkName(String),
    /// Echo of a request buffer (xattr operations).
    Buffer(SharedBuffer),
    /// Byte count plus the echoed request buffer (read/write).
    ValueWithBuffer(u32, SharedBuffer),
}

/// One response crossing the native boundary: a code (zero for success,
/// negative errno for failure, positive for size-carrying replies) and a
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub code: i32,
    pub payload: Payload,
}

impl Reply {
    #[must_use]
    pub fn new(code: i32, payload: Payload) -> Reply {
        Reply { code, payload }
    }

    /// Success with a payload.
    #[must_use]
    pub fn ok(payload: Payload) -> Reply {
        Reply { code: 0, payload }
    }

    /// True when the code signals failure.
    #[must_use]
    pub fn is_err(&self) -> bool {
        self.code < 0
    }
}
