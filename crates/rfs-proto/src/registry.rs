//! Static opcode registry.
//!
//! One [`OperationDescriptor`] per named filesystem operation, in the fixed
//! order the native driver assigns opcode ids. The registry is pure data:
//! default replies are described by [`DefaultReply`] tags and materialized
//! into payloads by the dispatch layer at delivery time.

use crate::encode::{encode_stat, encode_statfs};
use crate::wire::Payload;

/// Size of the native driver's opcode table. The implemented-operations
/// bitmap must match this length exactly; the final slot is reserved by the
/// driver and carries no descriptor.
pub const OPCODE_TABLE_LEN: usize = 35;

/// Dense operation identifiers, one per named filesystem operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Init = 0,
    Error = 1,
    Access = 2,
    Statfs = 3,
    Fgetattr = 4,
    Getattr = 5,
    Flush = 6,
    Fsync = 7,
    Fsyncdir = 8,
    Readdir = 9,
    Truncate = 10,
    Ftruncate = 11,
    Utimens = 12,
    Readlink = 13,
    Chown = 14,
    Chmod = 15,
    Mknod = 16,
    Setxattr = 17,
    Getxattr = 18,
    Listxattr = 19,
    Removexattr = 20,
    Open = 21,
    Opendir = 22,
    Read = 23,
    Write = 24,
    Release = 25,
    Releasedir = 26,
    Create = 27,
    Unlink = 28,
    Rename = 29,
    Link = 30,
    Symlink = 31,
    Mkdir = 32,
    Rmdir = 33,
}

impl Opcode {
    /// Every opcode, ordered by id.
    pub const ALL: [Opcode; 34] = [
        Opcode::Init,
        Opcode::Error,
        Opcode::Access,
        Opcode::Statfs,
        Opcode::Fgetattr,
        Opcode::Getattr,
        Opcode::Flush,
        Opcode::Fsync,
        Opcode::Fsyncdir,
        Opcode::Readdir,
        Opcode::Truncate,
        Opcode::Ftruncate,
        Opcode::Utimens,
        Opcode::Readlink,
        Opcode::Chown,
        Opcode::Chmod,
        Opcode::Mknod,
        Opcode::Setxattr,
        Opcode::Getxattr,
        Opcode::Listxattr,
        Opcode::Removexattr,
        Opcode::Open,
        Opcode::Opendir,
        Opcode::Read,
        Opcode::Write,
        Opcode::Release,
        Opcode::Releasedir,
        Opcode::Create,
        Opcode::Unlink,
        Opcode::Rename,
        Opcode::Link,
        Opcode::Symlink,
        Opcode::Mkdir,
        Opcode::Rmdir,
    ];

    /// Table index of this opcode.
    #[must_use]
    pub fn index(self) -> usize {
        self as u32 as usize
    }

    /// Opcode for a raw table index, if one is assigned.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Opcode> {
        Opcode::ALL.get(index).copied()
    }

    /// The operation's registry name.
    #[must_use]
    pub fn name(self) -> &'static str {
        descriptor(self).name
    }
}

/// Shape of the response delivered when an operation is unimplemented or
/// completes without a payload on a path that requires one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultReply {
    /// A single zero value (descriptor, byte count, access result).
    Zero,
    /// A stat array with no record provided (live timestamps, link count 1).
    Attr,
    /// A zeroed filesystem-stat array.
    Statfs,
    /// An empty directory listing.
    Dirents,
    /// An empty link target.
    EmptyName,
}

impl DefaultReply {
    /// Materialize the default into a concrete payload.
    ///
    /// [`DefaultReply::Attr`] reads the wall clock, so materialization is
    /// deferred to delivery time rather than baked into the registry.
    #[must_use]
    pub fn materialize(self) -> Payload {
        match self {
            DefaultReply::Zero => Payload::Value(0),
            DefaultReply::Attr => Payload::Stat(encode_stat(None)),
            DefaultReply::Statfs => Payload::Statfs(encode_statfs(None)),
            DefaultReply::Dirents => Payload::Dirents {
                names: Vec::new(),
                stats: Vec::new(),
            },
            DefaultReply::EmptyName => Payload::LinkName(String::new()),
        }
    }
}

/// One registry entry: operation name, native opcode, and the default
/// reply shape when the native protocol requires some well-formed response
/// absent a user implementation. Operations without a sensible default
/// (`unlink`, `rename`, ...) have `None` here and signal "operation not
/// supported" when unimplemented.
#[derive(Debug, Clone, Copy)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub opcode: Opcode,
    pub default_reply: Option<DefaultReply>,
}

const fn desc(
    name: &'static str,
    opcode: Opcode,
    default_reply: Option<DefaultReply>,
) -> OperationDescriptor {
    OperationDescriptor {
        name,
        opcode,
        default_reply,
    }
}

/// The static, ordered operation table. Exactly one descriptor per opcode.
pub static REGISTRY: [OperationDescriptor; 34] = [
    desc("init", Opcode::Init, None),
    desc("error", Opcode::Error, None),
    desc("access", Opcode::Access, Some(DefaultReply::Zero)),
    desc("statfs", Opcode::Statfs, Some(DefaultReply::Statfs)),
    desc("fgetattr", Opcode::Fgetattr, Some(DefaultReply::Attr)),
    desc("getattr", Opcode::Getattr, Some(DefaultReply::Attr)),
    desc("flush", Opcode::Flush, None),
    desc("fsync", Opcode::Fsync, None),
    desc("fsyncdir", Opcode::Fsyncdir, None),
    desc("readdir", Opcode::Readdir, Some(DefaultReply::Dirents)),
    desc("truncate", Opcode::Truncate, None),
    desc("ftruncate", Opcode::Ftruncate, None),
    desc("utimens", Opcode::Utimens, None),
    desc("readlink", Opcode::Readlink, Some(DefaultReply::EmptyName)),
    desc("chown", Opcode::Chown, None),
    desc("chmod", Opcode::Chmod, None),
    desc("mknod", Opcode::Mknod, None),
    desc("setxattr", Opcode::Setxattr, None),
    desc("getxattr", Opcode::Getxattr, None),
    desc("listxattr", Opcode::Listxattr, None),
    desc("removexattr", Opcode::Removexattr, None),
    desc("open", Opcode::Open, Some(DefaultReply::Zero)),
    desc("opendir", Opcode::Opendir, Some(DefaultReply::Zero)),
    desc("read", Opcode::Read, Some(DefaultReply::Zero)),
    desc("write", Opcode::Write, Some(DefaultReply::Zero)),
    desc("release", Opcode::Release, None),
    desc("releasedir", Opcode::Releasedir, None),
    desc("create", Opcode::Create, Some(DefaultReply::Zero)),
    desc("unlink", Opcode::Unlink, None),
    desc("rename", Opcode::Rename, None),
    desc("link", Opcode::Link, None),
    desc("symlink", Opcode::Symlink, None),
    desc("mkdir", Opcode::Mkdir, None),
    desc("rmdir", Opcode::Rmdir, None),
];

/// Descriptor for an opcode.
#[must_use]
pub fn descriptor(opcode: Opcode) -> &'static OperationDescriptor {
    &REGISTRY[opcode.index()]
}

// ── Implemented-operations set ──────────────────────────────────────────────

/// Set of opcodes for which a concrete user operation exists.
///
/// Computed once at session construction and immutable afterward; exposed
/// to the native driver as a bitmap sized to the opcode table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpcodeSet(u64);

impl OpcodeSet {
    #[must_use]
    pub fn new() -> OpcodeSet {
        OpcodeSet(0)
    }

    pub fn insert(&mut self, opcode: Opcode) {
        self.0 |= 1 << opcode.index();
    }

    #[must_use]
    pub fn contains(self, opcode: Opcode) -> bool {
        self.0 & (1 << opcode.index()) != 0
    }

    #[must_use]
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Bitmap sized to the native opcode table, 1 per implemented opcode.
    #[must_use]
    pub fn to_bitmap(self) -> [u32; OPCODE_TABLE_LEN] {
        let mut bitmap = [0_u32; OPCODE_TABLE_LEN];
        for op in Opcode::ALL {
            if self.contains(op) {
                bitmap[op.index()] = 1;
            }
        }
        bitmap
    }
}

impl FromIterator<Opcode> for OpcodeSet {
    fn from_iter<I: IntoIterator<Item = Opcode>>(iter: I) -> OpcodeSet {
        let mut set = OpcodeSet::new();
        for op in iter {
            set.insert(op);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_are_dense_and_match_registry_order() {
        for (idx, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(op.index(), idx);
            assert_eq!(Opcode::from_index(idx), Some(*op));
            assert_eq!(REGISTRY[idx].opcode, *op, "registry slot {idx} mismatched");
        }
        assert_eq!(Opcode::from_index(34), None);
        assert!(Opcode::ALL.len() < OPCODE_TABLE_LEN);
    }

    #[test]
    fn exactly_one_descriptor_per_opcode() {
        let mut seen = OpcodeSet::new();
        for d in &REGISTRY {
            assert!(!seen.contains(d.opcode), "duplicate opcode {:?}", d.opcode);
            seen.insert(d.opcode);
        }
        assert_eq!(seen.len(), REGISTRY.len());
    }

    #[test]
    fn default_replies_match_protocol_requirements() {
        let with_defaults = [
            ("access", DefaultReply::Zero),
            ("statfs", DefaultReply::Statfs),
            ("fgetattr", DefaultReply::Attr),
            ("getattr", DefaultReply::Attr),
            ("readdir", DefaultReply::Dirents),
            ("readlink", DefaultReply::EmptyName),
            ("open", DefaultReply::Zero),
            ("opendir", DefaultReply::Zero),
            ("read", DefaultReply::Zero),
            ("write", DefaultReply::Zero),
            ("create", DefaultReply::Zero),
        ];
        for (name, expected) in with_defaults {
            let d = REGISTRY.iter().find(|d| d.name == name).unwrap();
            assert_eq!(d.default_reply, Some(expected), "{name}");
        }
        for name in ["unlink", "rename", "mkdir", "rmdir", "chmod", "setxattr"] {
            let d = REGISTRY.iter().find(|d| d.name == name).unwrap();
            assert_eq!(d.default_reply, None, "{name} should have no default");
        }
    }

    #[test]
    fn materialized_defaults_are_well_formed() {
        assert_eq!(DefaultReply::Zero.materialize(), Payload::Value(0));
        assert_eq!(
            DefaultReply::Dirents.materialize(),
            Payload::Dirents {
                names: vec![],
                stats: vec![]
            }
        );
        assert_eq!(
            DefaultReply::EmptyName.materialize(),
            Payload::LinkName(String::new())
        );
        match DefaultReply::Attr.materialize() {
            Payload::Stat(arr) => {
                assert_eq!(arr[crate::encode::stat_offsets::NLINK], 1);
                // Live timestamps, not zeros.
                assert_ne!(arr[crate::encode::stat_offsets::MTIME], 0);
            }
            other => panic!("expected stat payload, got {other:?}"),
        }
        match DefaultReply::Statfs.materialize() {
            Payload::Statfs(arr) => assert_eq!(arr, [0; crate::encode::STATFS_LEN]),
            other => panic!("expected statfs payload, got {other:?}"),
        }
    }

    #[test]
    fn bitmap_is_table_sized() {
        let set: OpcodeSet = [Opcode::Init, Opcode::Getattr, Opcode::Rmdir]
            .into_iter()
            .collect();
        let bitmap = set.to_bitmap();
        assert_eq!(bitmap.len(), OPCODE_TABLE_LEN);
        assert_eq!(bitmap[Opcode::Init.index()], 1);
        assert_eq!(bitmap[Opcode::Getattr.index()], 1);
        assert_eq!(bitmap[Opcode::Rmdir.index()], 1);
        assert_eq!(bitmap.iter().sum::<u32>(), 3);
    }
}
