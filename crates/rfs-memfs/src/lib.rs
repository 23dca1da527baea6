#![forbid(unsafe_code)]
//! Reference in-memory filesystem.
//!
//! A single-owner tree: every directory exclusively owns its children, so
//! no node is reachable from two parents and rename is a move, never an
//! alias. All operations are asynchronous in signature but execute
//! synchronously under one lock, with completion deferred one scheduling
//! tick to mirror real I/O latency and to exercise the dispatch layer's
//! deferred-delivery contract.
//!
//! This doubles as the conformance fixture: it implements every operation
//! the dispatch conformance suite drives end-to-end.

use indexmap::IndexMap;
use parking_lot::Mutex;
use rfs_dispatch::Operations;
use rfs_error::Errno;
use rfs_proto::{Stat, Timestamp};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Descriptor handed out by `open`/`opendir`/`create`. The reference
/// implementation does not model descriptor multiplexing; every open file
/// shares this placeholder.
pub const PLACEHOLDER_FD: u32 = 42;

const DIR_MODE: u32 = 0o40755;
const FILE_MODE: u32 = 0o100644;

// ── Tree ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Attrs {
    mode: u32,
    uid: u32,
    gid: u32,
    nlink: u32,
    size: u64,
    atime: SystemTime,
    mtime: SystemTime,
    ctime: SystemTime,
}

impl Attrs {
    fn new(mode: u32, uid: u32, gid: u32) -> Attrs {
        let now = SystemTime::now();
        Attrs {
            mode,
            uid,
            gid,
            nlink: 1,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
        }
    }

    fn to_stat(&self) -> Stat {
        Stat {
            mode: Some(self.mode),
            uid: Some(self.uid),
            gid: Some(self.gid),
            nlink: Some(self.nlink),
            size: Some(self.size),
            atime: Some(Timestamp::At(self.atime)),
            mtime: Some(Timestamp::At(self.mtime)),
            ctime: Some(Timestamp::At(self.ctime)),
            ..Stat::default()
        }
    }
}

#[derive(Debug)]
enum Node {
    File {
        attrs: Attrs,
        content: Vec<u8>,
    },
    Dir {
        attrs: Attrs,
        children: IndexMap<String, Node>,
    },
}

impl Node {
    fn attrs(&self) -> &Attrs {
        match self {
            Node::File { attrs, .. } | Node::Dir { attrs, .. } => attrs,
        }
    }

    fn attrs_mut(&mut self) -> &mut Attrs {
        match self {
            Node::File { attrs, .. } | Node::Dir { attrs, .. } => attrs,
        }
    }

    fn stat(&self) -> Stat {
        self.attrs().to_stat()
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn lookup<'a>(root: &'a Node, path: &str) -> Option<&'a Node> {
    let mut current = root;
    for part in segments(path) {
        let Node::Dir { children, .. } = current else {
            return None;
        };
        current = children.get(part)?;
    }
    Some(current)
}

fn lookup_mut<'a>(root: &'a mut Node, path: &str) -> Option<&'a mut Node> {
    let mut current = root;
    for part in segments(path) {
        let Node::Dir { children, .. } = current else {
            return None;
        };
        current = children.get_mut(part)?;
    }
    Some(current)
}

/// The child map that would hold `path`'s final segment, plus that
/// segment. `None` for the root, a missing intermediate, or a
/// non-directory parent.
fn parent_entry<'a>(root: &'a mut Node, path: &str) -> Option<(&'a mut IndexMap<String, Node>, String)> {
    let mut parts = segments(path);
    let name = parts.pop()?;
    let mut current = root;
    for part in parts {
        let Node::Dir { children, .. } = current else {
            return None;
        };
        current = children.get_mut(part)?;
    }
    match current {
        Node::Dir { children, .. } => Some((children, name.to_owned())),
        Node::File { .. } => None,
    }
}

/// Path of `path`'s parent directory; `None` for the root.
fn parent_path(path: &str) -> Option<String> {
    let mut parts = segments(path);
    parts.pop()?;
    Some(format!("/{}", parts.join("/")))
}

// ── The filesystem ──────────────────────────────────────────────────────────

/// In-memory filesystem. Cheap to clone into operation closures; the tree
/// lives behind one lock.
pub struct MemFs {
    root: Arc<Mutex<Node>>,
    uid: u32,
    gid: u32,
}

impl Default for MemFs {
    fn default() -> Self {
        MemFs::new()
    }
}

impl MemFs {
    /// An empty filesystem owned by uid/gid 0.
    #[must_use]
    pub fn new() -> MemFs {
        MemFs::with_owner(0, 0)
    }

    /// An empty filesystem whose nodes are created with the given owner.
    #[must_use]
    pub fn with_owner(uid: u32, gid: u32) -> MemFs {
        MemFs {
            root: Arc::new(Mutex::new(Node::Dir {
                attrs: Attrs::new(DIR_MODE, uid, gid),
                children: IndexMap::new(),
            })),
            uid,
            gid,
        }
    }

    /// The capability record exercising the full reference operation set.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn operations(&self) -> Operations {
        let uid = self.uid;
        let gid = self.gid;

        let root = Arc::clone(&self.root);
        let readdir = Box::new(move |path: String| -> rfs_dispatch::OpFuture<(Vec<String>, Vec<Stat>)> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let root = root.lock();
                let Some(Node::Dir { children, .. }) = lookup(&root, &path) else {
                    return Err(Errno::ENOENT);
                };
                let names = children.keys().cloned().collect();
                let stats = children.values().map(Node::stat).collect();
                Ok((names, stats))
            })
        });

        let root = Arc::clone(&self.root);
        let getattr = Box::new(move |path: String| -> rfs_dispatch::OpFuture<Stat> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let root = root.lock();
                lookup(&root, &path).map(Node::stat).ok_or(Errno::ENOENT)
            })
        });

        let root = Arc::clone(&self.root);
        let mkdir = Box::new(move |path: String, mode: u32| -> rfs_dispatch::OpFuture<()> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let mut root = root.lock();
                let (children, name) = parent_entry(&mut root, &path).ok_or(Errno::ENOENT)?;
                if children.contains_key(&name) {
                    return Err(Errno::EEXIST);
                }
                let mode = if mode == 0 { DIR_MODE } else { mode };
                children.insert(
                    name,
                    Node::Dir {
                        attrs: Attrs::new(mode, uid, gid),
                        children: IndexMap::new(),
                    },
                );
                Ok(())
            })
        });

        let root = Arc::clone(&self.root);
        let create = Box::new(move |path: String, mode: u32| -> rfs_dispatch::OpFuture<u32> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let mut root = root.lock();
                let (children, name) = parent_entry(&mut root, &path).ok_or(Errno::ENOENT)?;
                if children.contains_key(&name) {
                    return Err(Errno::EEXIST);
                }
                let mode = if mode == 0 { FILE_MODE } else { mode };
                children.insert(
                    name,
                    Node::File {
                        attrs: Attrs::new(mode, uid, gid),
                        content: Vec::new(),
                    },
                );
                Ok(PLACEHOLDER_FD)
            })
        });

        let root = Arc::clone(&self.root);
        let open = Box::new(move |path: String, _flags: u32| -> rfs_dispatch::OpFuture<u32> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let root = root.lock();
                match lookup(&root, &path) {
                    Some(Node::File { .. }) => Ok(PLACEHOLDER_FD),
                    _ => Err(Errno::ENOENT),
                }
            })
        });

        let root = Arc::clone(&self.root);
        let read = Box::new(
            move |path: String,
                  _fd: u32,
                  buf: rfs_proto::SharedBuffer,
                  len: u32,
                  offset: u64|
                  -> rfs_dispatch::OpFuture<u32> {
                let root = Arc::clone(&root);
                Box::pin(async move {
                    tokio::task::yield_now().await;
                    let root = root.lock();
                    let Some(Node::File { content, .. }) = lookup(&root, &path) else {
                        return Err(Errno::ENOENT);
                    };
                    let start = usize::try_from(offset).unwrap_or(usize::MAX).min(content.len());
                    let end = start.saturating_add(len as usize).min(content.len());
                    let chunk = &content[start..end];
                    {
                        let mut dst = buf.lock();
                        let n = chunk.len().min(dst.len());
                        dst[..n].copy_from_slice(&chunk[..n]);
                    }
                    Ok(u32::try_from(chunk.len()).unwrap_or(u32::MAX))
                })
            },
        );

        let root = Arc::clone(&self.root);
        let write = Box::new(
            move |path: String,
                  _fd: u32,
                  buf: rfs_proto::SharedBuffer,
                  len: u32,
                  offset: u64|
                  -> rfs_dispatch::OpFuture<u32> {
                let root = Arc::clone(&root);
                Box::pin(async move {
                    tokio::task::yield_now().await;
                    let mut root = root.lock();
                    let Some(node) = lookup_mut(&mut root, &path) else {
                        return Err(Errno::ENOENT);
                    };
                    let Node::File { attrs, content } = node else {
                        return Err(Errno::ENOENT);
                    };
                    let offset = usize::try_from(offset).map_err(|_| Errno::EFBIG)?;
                    let len = len as usize;
                    let needed = offset.saturating_add(len);
                    if content.len() < needed {
                        content.resize(needed, 0);
                    }
                    {
                        let src = buf.lock();
                        let n = len.min(src.len());
                        content[offset..offset + n].copy_from_slice(&src[..n]);
                    }
                    attrs.size = content.len() as u64;
                    attrs.mtime = SystemTime::now();
                    Ok(u32::try_from(len).unwrap_or(u32::MAX))
                })
            },
        );

        let root = Arc::clone(&self.root);
        let unlink = Box::new(move |path: String| -> rfs_dispatch::OpFuture<()> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let mut root = root.lock();
                let (children, name) = parent_entry(&mut root, &path).ok_or(Errno::ENOENT)?;
                children.shift_remove(&name).map(|_| ()).ok_or(Errno::ENOENT)
            })
        });

        let root = Arc::clone(&self.root);
        let rmdir = Box::new(move |path: String| -> rfs_dispatch::OpFuture<()> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let mut root = root.lock();
                let (entries, name) = parent_entry(&mut root, &path).ok_or(Errno::ENOENT)?;
                match entries.get(&name) {
                    Some(Node::Dir { children, .. }) => {
                        if !children.is_empty() {
                            return Err(Errno::ENOTEMPTY);
                        }
                    }
                    _ => return Err(Errno::ENOENT),
                }
                entries.shift_remove(&name);
                Ok(())
            })
        });

        let root = Arc::clone(&self.root);
        let rename = Box::new(move |src: String, dest: String| -> rfs_dispatch::OpFuture<()> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let mut root = root.lock();

                let dest_parent = parent_path(&dest).ok_or(Errno::ENOENT)?;
                if !matches!(lookup(&root, &dest_parent), Some(Node::Dir { .. })) {
                    return Err(Errno::ENOENT);
                }

                let node = {
                    let (children, name) = parent_entry(&mut root, &src).ok_or(Errno::ENOENT)?;
                    children.shift_remove(&name).ok_or(Errno::ENOENT)?
                };
                match parent_entry(&mut root, &dest) {
                    // Overwrites any existing entry of that name.
                    Some((children, name)) => {
                        children.insert(name, node);
                        Ok(())
                    }
                    None => {
                        // Destination parent was inside the detached
                        // subtree; restore the source before failing.
                        if let Some((children, name)) = parent_entry(&mut root, &src) {
                            children.insert(name, node);
                        }
                        Err(Errno::ENOENT)
                    }
                }
            })
        });

        let root = Arc::clone(&self.root);
        let chmod = Box::new(move |path: String, mode: u32| -> rfs_dispatch::OpFuture<()> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let mut root = root.lock();
                let node = lookup_mut(&mut root, &path).ok_or(Errno::ENOENT)?;
                node.attrs_mut().mode = mode;
                Ok(())
            })
        });

        let root = Arc::clone(&self.root);
        let chown = Box::new(move |path: String, uid: u32, gid: u32| -> rfs_dispatch::OpFuture<()> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let mut root = root.lock();
                let node = lookup_mut(&mut root, &path).ok_or(Errno::ENOENT)?;
                let attrs = node.attrs_mut();
                attrs.uid = uid;
                attrs.gid = gid;
                Ok(())
            })
        });

        let root = Arc::clone(&self.root);
        let utimens = Box::new(
            move |path: String, atime_ms: u64, mtime_ms: u64| -> rfs_dispatch::OpFuture<()> {
                let root = Arc::clone(&root);
                Box::pin(async move {
                    tokio::task::yield_now().await;
                    let mut root = root.lock();
                    let node = lookup_mut(&mut root, &path).ok_or(Errno::ENOENT)?;
                    let attrs = node.attrs_mut();
                    attrs.atime = UNIX_EPOCH + Duration::from_millis(atime_ms);
                    attrs.mtime = UNIX_EPOCH + Duration::from_millis(mtime_ms);
                    Ok(())
                })
            },
        );

        let root = Arc::clone(&self.root);
        let truncate = Box::new(move |path: String, size: u64| -> rfs_dispatch::OpFuture<()> {
            let root = Arc::clone(&root);
            Box::pin(async move {
                tokio::task::yield_now().await;
                let mut root = root.lock();
                let Some(node) = lookup_mut(&mut root, &path) else {
                    return Err(Errno::ENOENT);
                };
                let Node::File { attrs, content } = node else {
                    return Err(Errno::ENOENT);
                };
                let size_bytes = usize::try_from(size).map_err(|_| Errno::EFBIG)?;
                if size_bytes < content.len() {
                    content.truncate(size_bytes);
                } else if size_bytes > content.len() {
                    content.resize(size_bytes, 0);
                }
                attrs.size = size;
                attrs.mtime = SystemTime::now();
                Ok(())
            })
        });

        let flush = Box::new(|_path: String, _fd: u32| -> rfs_dispatch::OpFuture<()> {
            Box::pin(async {
                tokio::task::yield_now().await;
                Ok(())
            })
        });
        let release = Box::new(|_path: String, _fd: u32| -> rfs_dispatch::OpFuture<()> {
            Box::pin(async {
                tokio::task::yield_now().await;
                Ok(())
            })
        });
        let fsync = Box::new(
            |_path: String, _datasync: bool, _fd: u32| -> rfs_dispatch::OpFuture<()> {
                Box::pin(async {
                    tokio::task::yield_now().await;
                    Ok(())
                })
            },
        );

        Operations {
            readdir: Some(readdir),
            getattr: Some(getattr),
            mkdir: Some(mkdir),
            create: Some(create),
            open: Some(open),
            read: Some(read),
            write: Some(write),
            unlink: Some(unlink),
            rmdir: Some(rmdir),
            rename: Some(rename),
            chmod: Some(chmod),
            chown: Some(chown),
            utimens: Some(utimens),
            truncate: Some(truncate),
            flush: Some(flush),
            release: Some(release),
            fsync: Some(fsync),
            ..Operations::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfs_proto::SharedBuffer;

    fn ops() -> Operations {
        MemFs::with_owner(1000, 1000).operations()
    }

    async fn create(ops: &Operations, path: &str, mode: u32) -> Result<u32, Errno> {
        (ops.create.as_ref().unwrap())(path.to_owned(), mode).await
    }

    async fn getattr(ops: &Operations, path: &str) -> Result<Stat, Errno> {
        (ops.getattr.as_ref().unwrap())(path.to_owned()).await
    }

    async fn write(ops: &Operations, path: &str, data: &[u8], offset: u64) -> Result<u32, Errno> {
        let buf = SharedBuffer::from_vec(data.to_vec());
        (ops.write.as_ref().unwrap())(
            path.to_owned(),
            PLACEHOLDER_FD,
            buf,
            u32::try_from(data.len()).unwrap(),
            offset,
        )
        .await
    }

    async fn read(ops: &Operations, path: &str, len: u32, offset: u64) -> Result<Vec<u8>, Errno> {
        let buf = SharedBuffer::zeroed(len as usize);
        let n = (ops.read.as_ref().unwrap())(path.to_owned(), PLACEHOLDER_FD, buf.clone(), len, offset)
            .await?;
        Ok(buf.to_vec()[..n as usize].to_vec())
    }

    #[tokio::test]
    async fn create_write_read_round_trip() {
        let ops = ops();
        let fd = create(&ops, "/a", 0o644).await.unwrap();
        assert_eq!(fd, PLACEHOLDER_FD);

        let written = write(&ops, "/a", b"hello", 0).await.unwrap();
        assert_eq!(written, 5);

        let data = read(&ops, "/a", 5, 0).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn getattr_tracks_create_and_removal() {
        let ops = ops();
        (ops.mkdir.as_ref().unwrap())("/d".into(), 0o755).await.unwrap();
        let stat = getattr(&ops, "/d").await.unwrap();
        assert_eq!(stat.mode, Some(0o755));
        assert_eq!(stat.uid, Some(1000));

        create(&ops, "/d/f", 0).await.unwrap();
        let stat = getattr(&ops, "/d/f").await.unwrap();
        assert_eq!(stat.mode, Some(0o100644), "type-appropriate default mode");

        (ops.unlink.as_ref().unwrap())("/d/f".into()).await.unwrap();
        assert_eq!(getattr(&ops, "/d/f").await.unwrap_err(), Errno::ENOENT);

        (ops.rmdir.as_ref().unwrap())("/d".into()).await.unwrap();
        assert_eq!(getattr(&ops, "/d").await.unwrap_err(), Errno::ENOENT);
    }

    #[tokio::test]
    async fn rmdir_on_non_empty_directory_leaves_tree_unchanged() {
        let ops = ops();
        (ops.mkdir.as_ref().unwrap())("/d".into(), 0o755).await.unwrap();
        create(&ops, "/d/f", 0o644).await.unwrap();

        let err = (ops.rmdir.as_ref().unwrap())("/d".into()).await.unwrap_err();
        assert_eq!(err, Errno::ENOTEMPTY);
        assert!(getattr(&ops, "/d").await.is_ok());
        assert!(getattr(&ops, "/d/f").await.is_ok());

        (ops.unlink.as_ref().unwrap())("/d/f".into()).await.unwrap();
        (ops.rmdir.as_ref().unwrap())("/d".into()).await.unwrap();
        assert_eq!(getattr(&ops, "/d").await.unwrap_err(), Errno::ENOENT);
    }

    #[tokio::test]
    async fn rename_moves_the_node_and_its_attributes() {
        let ops = ops();
        create(&ops, "/a", 0o600).await.unwrap();
        write(&ops, "/a", b"payload", 0).await.unwrap();
        let before = getattr(&ops, "/a").await.unwrap();

        (ops.rename.as_ref().unwrap())("/a".into(), "/b".into()).await.unwrap();
        assert_eq!(getattr(&ops, "/a").await.unwrap_err(), Errno::ENOENT);
        let after = getattr(&ops, "/b").await.unwrap();
        assert_eq!(after.mode, before.mode);
        assert_eq!(after.size, Some(7));
        assert_eq!(read(&ops, "/b", 7, 0).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn rename_overwrites_an_existing_destination() {
        let ops = ops();
        create(&ops, "/a", 0o644).await.unwrap();
        write(&ops, "/a", b"new", 0).await.unwrap();
        create(&ops, "/b", 0o644).await.unwrap();
        write(&ops, "/b", b"old-old", 0).await.unwrap();

        (ops.rename.as_ref().unwrap())("/a".into(), "/b".into()).await.unwrap();
        assert_eq!(read(&ops, "/b", 16, 0).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn rename_to_a_missing_parent_fails_without_losing_the_source() {
        let ops = ops();
        create(&ops, "/a", 0o644).await.unwrap();
        let err = (ops.rename.as_ref().unwrap())("/a".into(), "/no/b".into())
            .await
            .unwrap_err();
        assert_eq!(err, Errno::ENOENT);
        assert!(getattr(&ops, "/a").await.is_ok());
    }

    #[tokio::test]
    async fn write_past_the_end_zero_fills_the_gap() {
        let ops = ops();
        create(&ops, "/f", 0o644).await.unwrap();
        write(&ops, "/f", b"ab", 0).await.unwrap();
        write(&ops, "/f", b"cd", 6).await.unwrap();

        let data = read(&ops, "/f", 8, 0).await.unwrap();
        assert_eq!(data, b"ab\0\0\0\0cd");
        assert_eq!(getattr(&ops, "/f").await.unwrap().size, Some(8));
    }

    #[tokio::test]
    async fn read_clamps_to_content_length() {
        let ops = ops();
        create(&ops, "/f", 0o644).await.unwrap();
        write(&ops, "/f", b"hello", 0).await.unwrap();

        assert_eq!(read(&ops, "/f", 100, 0).await.unwrap(), b"hello");
        assert_eq!(read(&ops, "/f", 3, 2).await.unwrap(), b"llo");
        // Offset past the end reads nothing.
        assert_eq!(read(&ops, "/f", 4, 99).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn truncate_shrinks_or_zero_fills() {
        let ops = ops();
        create(&ops, "/f", 0o644).await.unwrap();
        write(&ops, "/f", b"abcdef", 0).await.unwrap();

        (ops.truncate.as_ref().unwrap())("/f".into(), 3).await.unwrap();
        assert_eq!(read(&ops, "/f", 10, 0).await.unwrap(), b"abc");

        (ops.truncate.as_ref().unwrap())("/f".into(), 5).await.unwrap();
        assert_eq!(read(&ops, "/f", 10, 0).await.unwrap(), b"abc\0\0");
        assert_eq!(getattr(&ops, "/f").await.unwrap().size, Some(5));

        let err = (ops.truncate.as_ref().unwrap())("/missing".into(), 1)
            .await
            .unwrap_err();
        assert_eq!(err, Errno::ENOENT);
    }

    #[tokio::test]
    async fn readdir_lists_children_in_insertion_order() {
        let ops = ops();
        create(&ops, "/zeta", 0o644).await.unwrap();
        create(&ops, "/alpha", 0o644).await.unwrap();
        (ops.mkdir.as_ref().unwrap())("/mid".into(), 0).await.unwrap();

        let (names, stats) = (ops.readdir.as_ref().unwrap())("/".into()).await.unwrap();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(stats.len(), 3);
        assert_eq!(stats[2].mode, Some(DIR_MODE), "mkdir default mode");

        let err = (ops.readdir.as_ref().unwrap())("/zeta".into()).await.unwrap_err();
        assert_eq!(err, Errno::ENOENT, "readdir on a file is not-found");
    }

    #[tokio::test]
    async fn duplicate_creation_is_rejected() {
        let ops = ops();
        create(&ops, "/x", 0o644).await.unwrap();
        assert_eq!(create(&ops, "/x", 0o644).await.unwrap_err(), Errno::EEXIST);

        (ops.mkdir.as_ref().unwrap())("/d".into(), 0).await.unwrap();
        let err = (ops.mkdir.as_ref().unwrap())("/d".into(), 0).await.unwrap_err();
        assert_eq!(err, Errno::EEXIST);

        // Missing parent is not-found, not exists.
        assert_eq!(
            create(&ops, "/no/file", 0o644).await.unwrap_err(),
            Errno::ENOENT
        );
    }

    #[tokio::test]
    async fn open_requires_an_existing_file() {
        let ops = ops();
        assert_eq!(
            (ops.open.as_ref().unwrap())("/nope".into(), 0).await.unwrap_err(),
            Errno::ENOENT
        );
        (ops.mkdir.as_ref().unwrap())("/d".into(), 0).await.unwrap();
        assert_eq!(
            (ops.open.as_ref().unwrap())("/d".into(), 0).await.unwrap_err(),
            Errno::ENOENT,
            "directories are not openable as files"
        );
        create(&ops, "/f", 0o644).await.unwrap();
        assert_eq!(
            (ops.open.as_ref().unwrap())("/f".into(), 0).await.unwrap(),
            PLACEHOLDER_FD
        );
    }

    #[tokio::test]
    async fn chmod_chown_utimens_mutate_attributes() {
        let ops = ops();
        create(&ops, "/f", 0o644).await.unwrap();

        (ops.chmod.as_ref().unwrap())("/f".into(), 0o400).await.unwrap();
        (ops.chown.as_ref().unwrap())("/f".into(), 7, 8).await.unwrap();
        (ops.utimens.as_ref().unwrap())("/f".into(), 1_000, 2_000).await.unwrap();

        let stat = getattr(&ops, "/f").await.unwrap();
        assert_eq!(stat.mode, Some(0o400));
        assert_eq!(stat.uid, Some(7));
        assert_eq!(stat.gid, Some(8));
        assert_eq!(stat.atime.unwrap().as_millis(), 1_000);
        assert_eq!(stat.mtime.unwrap().as_millis(), 2_000);
    }

    #[tokio::test]
    async fn maintenance_operations_always_succeed() {
        let ops = ops();
        (ops.flush.as_ref().unwrap())("/anything".into(), 1).await.unwrap();
        (ops.release.as_ref().unwrap())("/anything".into(), 1).await.unwrap();
        (ops.fsync.as_ref().unwrap())("/anything".into(), true, 1).await.unwrap();
    }

    #[test]
    fn operation_set_matches_the_reference_surface() {
        use rfs_proto::Opcode;
        let set = ops().implemented();
        for op in [
            Opcode::Readdir,
            Opcode::Getattr,
            Opcode::Mkdir,
            Opcode::Create,
            Opcode::Open,
            Opcode::Read,
            Opcode::Write,
            Opcode::Unlink,
            Opcode::Rmdir,
            Opcode::Rename,
            Opcode::Chmod,
            Opcode::Chown,
            Opcode::Utimens,
            Opcode::Truncate,
            Opcode::Flush,
            Opcode::Release,
            Opcode::Fsync,
        ] {
            assert!(set.contains(op), "{op:?} should be implemented");
        }
        assert!(!set.contains(Opcode::Symlink));
        assert!(!set.contains(Opcode::Setxattr));
    }
}
