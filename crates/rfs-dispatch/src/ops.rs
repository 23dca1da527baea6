//! The user-facing capability record.
//!
//! An [`Operations`] value is a structure of optional operation slots, one
//! per registry entry. A slot that is present marks the opcode as
//! implemented; the set is computed once at construction time and never
//! consulted dynamically afterward. Handlers are plain boxed closures
//! returning boxed futures, so an implementation can capture whatever
//! shared state it needs (the reference filesystem captures its tree).

use futures::future::BoxFuture;
use rfs_error::OpResult;
use rfs_proto::{Opcode, OpcodeSet, SharedBuffer, Stat, Statfs};

/// Future returned by every user operation.
pub type OpFuture<T> = BoxFuture<'static, OpResult<T>>;

/// `init`, `error`: session-level notifications with no arguments.
pub type SessionOp = Box<dyn Fn() -> OpFuture<()> + Send + Sync>;
/// `unlink`, `rmdir`: path-only mutations.
pub type PathOp = Box<dyn Fn(String) -> OpFuture<()> + Send + Sync>;
/// `access(path, mode)`.
pub type AccessOp = Box<dyn Fn(String, u32) -> OpFuture<()> + Send + Sync>;
/// `statfs(path)`.
pub type StatfsOp = Box<dyn Fn(String) -> OpFuture<Statfs> + Send + Sync>;
/// `getattr(path)`.
pub type GetattrOp = Box<dyn Fn(String) -> OpFuture<Stat> + Send + Sync>;
/// `fgetattr(path, fd)`.
pub type FgetattrOp = Box<dyn Fn(String, u32) -> OpFuture<Stat> + Send + Sync>;
/// `flush`, `release`, `releasedir`: `(path, fd)`.
pub type FdOp = Box<dyn Fn(String, u32) -> OpFuture<()> + Send + Sync>;
/// `fsync`, `fsyncdir`: `(path, datasync, fd)`.
pub type FsyncOp = Box<dyn Fn(String, bool, u32) -> OpFuture<()> + Send + Sync>;
/// `readdir(path)` → child names and their stat records, in the
/// directory's own iteration order.
pub type ReaddirOp = Box<dyn Fn(String) -> OpFuture<(Vec<String>, Vec<Stat>)> + Send + Sync>;
/// `truncate(path, size)`.
pub type TruncateOp = Box<dyn Fn(String, u64) -> OpFuture<()> + Send + Sync>;
/// `ftruncate(path, fd, size)`.
pub type FtruncateOp = Box<dyn Fn(String, u32, u64) -> OpFuture<()> + Send + Sync>;
/// `utimens(path, atime_ms, mtime_ms)`.
pub type UtimensOp = Box<dyn Fn(String, u64, u64) -> OpFuture<()> + Send + Sync>;
/// `readlink(path)` → link target.
pub type ReadlinkOp = Box<dyn Fn(String) -> OpFuture<String> + Send + Sync>;
/// `chown(path, uid, gid)`.
pub type ChownOp = Box<dyn Fn(String, u32, u32) -> OpFuture<()> + Send + Sync>;
/// `chmod(path, mode)`, `mkdir(path, mode)`.
pub type ModeOp = Box<dyn Fn(String, u32) -> OpFuture<()> + Send + Sync>;
/// `mknod(path, mode, dev)`.
pub type MknodOp = Box<dyn Fn(String, u32, u32) -> OpFuture<()> + Send + Sync>;
/// `setxattr(path, name, value, position, flags)`.
pub type SetxattrOp =
    Box<dyn Fn(String, String, SharedBuffer, u32, u32) -> OpFuture<()> + Send + Sync>;
/// `getxattr(path, name, position)` → attribute value, or `None` when the
/// attribute does not exist.
pub type GetxattrOp = Box<dyn Fn(String, String, u32) -> OpFuture<Option<Vec<u8>>> + Send + Sync>;
/// `listxattr(path)` → attribute names.
pub type ListxattrOp = Box<dyn Fn(String) -> OpFuture<Vec<String>> + Send + Sync>;
/// `removexattr(path, name)`.
pub type RemovexattrOp = Box<dyn Fn(String, String) -> OpFuture<()> + Send + Sync>;
/// `open(path, flags)`, `opendir(path, flags)` → descriptor.
pub type OpenOp = Box<dyn Fn(String, u32) -> OpFuture<u32> + Send + Sync>;
/// `read`/`write`: `(path, fd, buffer, length, offset)` → bytes moved.
/// The buffer is borrowed from the driver for the request's duration.
pub type IoOp = Box<dyn Fn(String, u32, SharedBuffer, u32, u64) -> OpFuture<u32> + Send + Sync>;
/// `create(path, mode)` → descriptor.
pub type CreateOp = Box<dyn Fn(String, u32) -> OpFuture<u32> + Send + Sync>;
/// `rename`, `link`, `symlink`: `(src, dest)`.
pub type PathPairOp = Box<dyn Fn(String, String) -> OpFuture<()> + Send + Sync>;

/// The capability record: one optional slot per filesystem operation.
#[derive(Default)]
pub struct Operations {
    pub init: Option<SessionOp>,
    pub error: Option<SessionOp>,
    pub access: Option<AccessOp>,
    pub statfs: Option<StatfsOp>,
    pub fgetattr: Option<FgetattrOp>,
    pub getattr: Option<GetattrOp>,
    pub flush: Option<FdOp>,
    pub fsync: Option<FsyncOp>,
    pub fsyncdir: Option<FsyncOp>,
    pub readdir: Option<ReaddirOp>,
    pub truncate: Option<TruncateOp>,
    pub ftruncate: Option<FtruncateOp>,
    pub utimens: Option<UtimensOp>,
    pub readlink: Option<ReadlinkOp>,
    pub chown: Option<ChownOp>,
    pub chmod: Option<ModeOp>,
    pub mknod: Option<MknodOp>,
    pub setxattr: Option<SetxattrOp>,
    pub getxattr: Option<GetxattrOp>,
    pub listxattr: Option<ListxattrOp>,
    pub removexattr: Option<RemovexattrOp>,
    pub open: Option<OpenOp>,
    pub opendir: Option<OpenOp>,
    pub read: Option<IoOp>,
    pub write: Option<IoOp>,
    pub release: Option<FdOp>,
    pub releasedir: Option<FdOp>,
    pub create: Option<CreateOp>,
    pub unlink: Option<PathOp>,
    pub rename: Option<PathPairOp>,
    pub link: Option<PathPairOp>,
    pub symlink: Option<PathPairOp>,
    pub mkdir: Option<ModeOp>,
    pub rmdir: Option<PathOp>,
}

impl Operations {
    /// The implemented-operations set for this record.
    ///
    /// `init`, `error` and `getattr` are always present regardless of user
    /// input: the driver requires them to bring a mount up, report faults,
    /// and answer the kernel's first attribute probe.
    #[must_use]
    pub fn implemented(&self) -> OpcodeSet {
        let mut set = OpcodeSet::new();
        set.insert(Opcode::Init);
        set.insert(Opcode::Error);
        set.insert(Opcode::Getattr);

        let mut mark = |present: bool, op: Opcode| {
            if present {
                set.insert(op);
            }
        };
        mark(self.init.is_some(), Opcode::Init);
        mark(self.error.is_some(), Opcode::Error);
        mark(self.access.is_some(), Opcode::Access);
        mark(self.statfs.is_some(), Opcode::Statfs);
        mark(self.fgetattr.is_some(), Opcode::Fgetattr);
        mark(self.getattr.is_some(), Opcode::Getattr);
        mark(self.flush.is_some(), Opcode::Flush);
        mark(self.fsync.is_some(), Opcode::Fsync);
        mark(self.fsyncdir.is_some(), Opcode::Fsyncdir);
        mark(self.readdir.is_some(), Opcode::Readdir);
        mark(self.truncate.is_some(), Opcode::Truncate);
        mark(self.ftruncate.is_some(), Opcode::Ftruncate);
        mark(self.utimens.is_some(), Opcode::Utimens);
        mark(self.readlink.is_some(), Opcode::Readlink);
        mark(self.chown.is_some(), Opcode::Chown);
        mark(self.chmod.is_some(), Opcode::Chmod);
        mark(self.mknod.is_some(), Opcode::Mknod);
        mark(self.setxattr.is_some(), Opcode::Setxattr);
        mark(self.getxattr.is_some(), Opcode::Getxattr);
        mark(self.listxattr.is_some(), Opcode::Listxattr);
        mark(self.removexattr.is_some(), Opcode::Removexattr);
        mark(self.open.is_some(), Opcode::Open);
        mark(self.opendir.is_some(), Opcode::Opendir);
        mark(self.read.is_some(), Opcode::Read);
        mark(self.write.is_some(), Opcode::Write);
        mark(self.release.is_some(), Opcode::Release);
        mark(self.releasedir.is_some(), Opcode::Releasedir);
        mark(self.create.is_some(), Opcode::Create);
        mark(self.unlink.is_some(), Opcode::Unlink);
        mark(self.rename.is_some(), Opcode::Rename);
        mark(self.link.is_some(), Opcode::Link);
        mark(self.symlink.is_some(), Opcode::Symlink);
        mark(self.mkdir.is_some(), Opcode::Mkdir);
        mark(self.rmdir.is_some(), Opcode::Rmdir);
        set
    }
}

impl std::fmt::Debug for Operations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operations")
            .field("implemented", &self.implemented().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_still_carries_the_mandatory_three() {
        let set = Operations::default().implemented();
        assert_eq!(set.len(), 3);
        assert!(set.contains(Opcode::Init));
        assert!(set.contains(Opcode::Error));
        assert!(set.contains(Opcode::Getattr));
        assert!(!set.contains(Opcode::Read));
    }

    #[test]
    fn present_slots_mark_their_opcodes() {
        let ops = Operations {
            read: Some(Box::new(|_path, _fd, _buf, _len, _off| {
                Box::pin(async { Ok(0) })
            })),
            unlink: Some(Box::new(|_path| Box::pin(async { Ok(()) }))),
            ..Operations::default()
        };
        let set = ops.implemented();
        assert!(set.contains(Opcode::Read));
        assert!(set.contains(Opcode::Unlink));
        assert!(!set.contains(Opcode::Write));
        assert_eq!(set.len(), 5);
    }
}
