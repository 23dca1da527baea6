//! The native kernel-interface driver, as consumed by the session.
//!
//! The driver's internals (device I/O, request buffering) are not part of
//! this crate; everything the lifecycle needs from it fits in
//! [`NativeDriver`]. The test harness provides a scripted in-process
//! implementation.

use rfs_dispatch::HandlerTable;
use rfs_proto::OPCODE_TABLE_LEN;
use std::io;
use std::path::Path;

/// Scratch buffer owned by the session and handed to the driver for its
/// dispatch-thread bookkeeping. Allocated once per mount, sized by
/// [`NativeDriver::context_size`], and kept alive until unmount.
#[derive(Debug)]
pub struct ThreadContext {
    buf: Vec<u8>,
}

impl ThreadContext {
    /// A zero-filled context of the driver's requested size.
    #[must_use]
    pub fn zeroed(size: usize) -> ThreadContext {
        ThreadContext {
            buf: vec![0; size],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Mutable view for the driver.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

/// Interface the mount lifecycle consumes from the native driver.
///
/// `mount` success is provisional: the mount is only live once the driver
/// invokes the init opcode through the handler table. A synchronous error
/// from either entry point is terminal for the session.
pub trait NativeDriver: Send + Sync {
    /// Size of the per-mount thread context the driver needs.
    fn context_size(&self) -> usize;

    /// Register the handler table and implemented-operations bitmap and
    /// start serving kernel requests for `mountpoint`.
    fn mount(
        &self,
        mountpoint: &Path,
        option_string: &str,
        ctx: &mut ThreadContext,
        handlers: HandlerTable,
        implemented: &[u32; OPCODE_TABLE_LEN],
    ) -> io::Result<()>;

    /// Stop serving requests for `mountpoint`.
    fn unmount(&self, mountpoint: &Path, ctx: &mut ThreadContext) -> io::Result<()>;
}
