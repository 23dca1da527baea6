//! Typed request arguments, one variant per opcode.
//!
//! Wide request arguments (offsets, sizes, timestamps) cross the ABI as
//! (low, high) 32-bit halves; the driver joins them with
//! [`rfs_proto::join_u64`] before constructing a variant, so everything
//! here is already native width.

use rfs_proto::{Opcode, Payload, SharedBuffer};

/// One kernel-issued request, decoded.
#[derive(Debug, Clone)]
pub enum Request {
    Init,
    Error,
    Access { path: String, mode: u32 },
    Statfs { path: String },
    Fgetattr { path: String, fd: u32 },
    Getattr { path: String },
    Flush { path: String, fd: u32 },
    Fsync { path: String, datasync: bool, fd: u32 },
    Fsyncdir { path: String, datasync: bool, fd: u32 },
    Readdir { path: String },
    Truncate { path: String, size: u64 },
    Ftruncate { path: String, fd: u32, size: u64 },
    Utimens { path: String, atime_ms: u64, mtime_ms: u64 },
    Readlink { path: String },
    Chown { path: String, uid: u32, gid: u32 },
    Chmod { path: String, mode: u32 },
    Mknod { path: String, mode: u32, dev: u32 },
    Setxattr { path: String, name: String, value: SharedBuffer, position: u32, flags: u32 },
    Getxattr { path: String, name: String, value: SharedBuffer, position: u32 },
    Listxattr { path: String, list: SharedBuffer },
    Removexattr { path: String, name: String },
    Open { path: String, flags: u32 },
    Opendir { path: String, flags: u32 },
    Read { path: String, fd: u32, buf: SharedBuffer, len: u32, offset: u64 },
    Write { path: String, fd: u32, buf: SharedBuffer, len: u32, offset: u64 },
    Release { path: String, fd: u32 },
    Releasedir { path: String, fd: u32 },
    Create { path: String, mode: u32 },
    Unlink { path: String },
    Rename { src: String, dest: String },
    Link { src: String, dest: String },
    Symlink { src: String, dest: String },
    Mkdir { path: String, mode: u32 },
    Rmdir { path: String },
}

impl Request {
    /// The opcode this request targets.
    #[must_use]
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Init => Opcode::Init,
            Request::Error => Opcode::Error,
            Request::Access { .. } => Opcode::Access,
            Request::Statfs { .. } => Opcode::Statfs,
            Request::Fgetattr { .. } => Opcode::Fgetattr,
            Request::Getattr { .. } => Opcode::Getattr,
            Request::Flush { .. } => Opcode::Flush,
            Request::Fsync { .. } => Opcode::Fsync,
            Request::Fsyncdir { .. } => Opcode::Fsyncdir,
            Request::Readdir { .. } => Opcode::Readdir,
            Request::Truncate { .. } => Opcode::Truncate,
            Request::Ftruncate { .. } => Opcode::Ftruncate,
            Request::Utimens { .. } => Opcode::Utimens,
            Request::Readlink { .. } => Opcode::Readlink,
            Request::Chown { .. } => Opcode::Chown,
            Request::Chmod { .. } => Opcode::Chmod,
            Request::Mknod { .. } => Opcode::Mknod,
            Request::Setxattr { .. } => Opcode::Setxattr,
            Request::Getxattr { .. } => Opcode::Getxattr,
            Request::Listxattr { .. } => Opcode::Listxattr,
            Request::Removexattr { .. } => Opcode::Removexattr,
            Request::Open { .. } => Opcode::Open,
            Request::Opendir { .. } => Opcode::Opendir,
            Request::Read { .. } => Opcode::Read,
            Request::Write { .. } => Opcode::Write,
            Request::Release { .. } => Opcode::Release,
            Request::Releasedir { .. } => Opcode::Releasedir,
            Request::Create { .. } => Opcode::Create,
            Request::Unlink { .. } => Opcode::Unlink,
            Request::Rename { .. } => Opcode::Rename,
            Request::Link { .. } => Opcode::Link,
            Request::Symlink { .. } => Opcode::Symlink,
            Request::Mkdir { .. } => Opcode::Mkdir,
            Request::Rmdir { .. } => Opcode::Rmdir,
        }
    }

    /// Payload a watchdog reply must carry so the driver can reclaim the
    /// request's buffers: read/write echo the data buffer with a zero
    /// count, the xattr operations echo their value/list buffer, and
    /// everything else needs nothing.
    pub(crate) fn timeout_echo(&self) -> Payload {
        match self {
            Request::Read { buf, .. } | Request::Write { buf, .. } => {
                Payload::ValueWithBuffer(0, buf.clone())
            }
            Request::Setxattr { value, .. } | Request::Getxattr { value, .. } => {
                Payload::Buffer(value.clone())
            }
            Request::Listxattr { list, .. } => Payload::Buffer(list.clone()),
            _ => Payload::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_matches_variant() {
        assert_eq!(Request::Init.opcode(), Opcode::Init);
        assert_eq!(
            Request::Rmdir {
                path: "/d".into()
            }
            .opcode(),
            Opcode::Rmdir
        );
        assert_eq!(
            Request::Read {
                path: "/f".into(),
                fd: 42,
                buf: SharedBuffer::zeroed(8),
                len: 8,
                offset: 0
            }
            .opcode(),
            Opcode::Read
        );
    }

    #[test]
    fn timeout_echo_returns_the_request_buffers() {
        let buf = SharedBuffer::zeroed(16);
        let req = Request::Write {
            path: "/f".into(),
            fd: 42,
            buf: buf.clone(),
            len: 16,
            offset: 0,
        };
        match req.timeout_echo() {
            Payload::ValueWithBuffer(0, echoed) => assert!(echoed.same_buffer(&buf)),
            other => panic!("unexpected echo {other:?}"),
        }

        let list = SharedBuffer::zeroed(4);
        let req = Request::Listxattr {
            path: "/f".into(),
            list: list.clone(),
        };
        match req.timeout_echo() {
            Payload::Buffer(echoed) => assert!(echoed.same_buffer(&list)),
            other => panic!("unexpected echo {other:?}"),
        }

        assert_eq!(
            Request::Unlink { path: "/f".into() }.timeout_echo(),
            Payload::None
        );
    }
}
