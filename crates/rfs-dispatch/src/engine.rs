//! Handler synthesis and result delivery.

use crate::ops::{OpFuture, Operations};
use crate::request::Request;
use crate::timeout::TimeoutPolicy;
use futures::FutureExt;
use parking_lot::Mutex;
use rfs_error::Errno;
use rfs_proto::{
    DefaultReply, OPCODE_TABLE_LEN, Opcode, OpcodeSet, OperationDescriptor, Payload, REGISTRY,
    Reply, Stat, Timestamp, encode_stat, encode_statfs,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{trace, warn};

/// Callback used to deliver one response back across the native boundary.
pub type ResultSink = Box<dyn FnOnce(Reply) + Send>;

/// A synthesized per-opcode handler, as invoked by the native driver.
pub type Handler = Arc<dyn Fn(ResultSink, Request) + Send + Sync>;

/// Dense handler table sized to the native opcode table. The reserved
/// final slot stays empty.
#[derive(Clone)]
pub struct HandlerTable {
    slots: Vec<Option<Handler>>,
}

impl HandlerTable {
    /// Handler for an opcode.
    #[must_use]
    pub fn handler(&self, opcode: Opcode) -> Option<Handler> {
        self.slots[opcode.index()].clone()
    }

    /// Handler for a raw table index, the way the driver addresses slots.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<Handler> {
        self.slots.get(index).cloned().flatten()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filled = self.slots.iter().filter(|s| s.is_some()).count();
        f.debug_struct("HandlerTable")
            .field("len", &self.slots.len())
            .field("filled", &filled)
            .finish()
    }
}

// ── At-most-once delivery ───────────────────────────────────────────────────

/// Guard ensuring exactly one reply reaches the sink per request.
///
/// Whichever of {watchdog fire, user completion} calls [`deliver`] first
/// consumes the sink; the loser's reply is dropped without side effects.
/// Double delivery would hand the native boundary a reply for a request it
/// has already retired, which is undefined behavior there.
///
/// [`deliver`]: DeliveryGuard::deliver
#[derive(Clone)]
pub struct DeliveryGuard {
    inner: Arc<GuardInner>,
}

struct GuardInner {
    op: &'static str,
    sink: Mutex<Option<ResultSink>>,
}

impl DeliveryGuard {
    fn new(op: &'static str, sink: ResultSink) -> DeliveryGuard {
        DeliveryGuard {
            inner: Arc::new(GuardInner {
                op,
                sink: Mutex::new(Some(sink)),
            }),
        }
    }

    /// Deliver a reply unless one was already delivered. Returns whether
    /// this call won.
    pub fn deliver(&self, source: &'static str, reply: Reply) -> bool {
        let Some(sink) = self.inner.sink.lock().take() else {
            trace!(
                op = self.inner.op,
                source,
                "late result discarded: reply already delivered"
            );
            return false;
        };
        trace!(op = self.inner.op, source, code = reply.code, "reply");
        sink(reply);
        true
    }
}

// ── Engine ──────────────────────────────────────────────────────────────────

struct EngineInner {
    ops: Operations,
    implemented: OpcodeSet,
    /// Watchdog duration per opcode, resolved once at construction.
    timeouts: [Option<Duration>; Opcode::ALL.len()],
    handle: Handle,
    /// Completed (once) when the driver's init opcode fires, moving the
    /// pending mount forward.
    init_tx: Mutex<Option<oneshot::Sender<()>>>,
}

/// Synthesizes and owns the per-opcode handlers for one mount.
#[derive(Clone)]
pub struct DispatchEngine {
    inner: Arc<EngineInner>,
}

impl DispatchEngine {
    /// Build an engine for one mount: the implemented set and per-name
    /// timeouts are resolved here and frozen.
    #[must_use]
    pub fn new(ops: Operations, timeout: &TimeoutPolicy, handle: Handle) -> DispatchEngine {
        let implemented = ops.implemented();
        let mut timeouts = [None; Opcode::ALL.len()];
        for desc in &REGISTRY {
            timeouts[desc.opcode.index()] = timeout.resolve(desc.name);
        }
        DispatchEngine {
            inner: Arc::new(EngineInner {
                ops,
                implemented,
                timeouts,
                handle,
                init_tx: Mutex::new(None),
            }),
        }
    }

    /// The implemented-operations set.
    #[must_use]
    pub fn implemented(&self) -> OpcodeSet {
        self.inner.implemented
    }

    /// Bitmap handed to the native driver at mount time.
    #[must_use]
    pub fn implemented_bitmap(&self) -> [u32; OPCODE_TABLE_LEN] {
        self.inner.implemented.to_bitmap()
    }

    /// Arm the init notification. The returned receiver resolves when the
    /// driver's init opcode fires; the mount lifecycle awaits it before
    /// reporting the mount as live.
    #[must_use]
    pub fn init_signal(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        *self.inner.init_tx.lock() = Some(tx);
        rx
    }

    /// Synthesize the dense handler table for the native driver.
    #[must_use]
    pub fn handler_table(&self) -> HandlerTable {
        let mut slots: Vec<Option<Handler>> = vec![None; OPCODE_TABLE_LEN];
        for desc in &REGISTRY {
            slots[desc.opcode.index()] = Some(self.synthesize(desc));
        }
        HandlerTable { slots }
    }

    fn synthesize(&self, desc: &'static OperationDescriptor) -> Handler {
        let implemented = self.inner.implemented.contains(desc.opcode);
        let timeout = self.inner.timeouts[desc.opcode.index()];
        let inner = Arc::clone(&self.inner);

        Arc::new(move |sink: ResultSink, request: Request| {
            let guard = DeliveryGuard::new(desc.name, sink);

            if request.opcode() != desc.opcode {
                warn!(
                    op = desc.name,
                    got = request.opcode().name(),
                    "request arguments do not match handler opcode"
                );
                inner.defer(guard, Reply::new(Errno::EINVAL.raw(), Payload::None));
                return;
            }

            if !implemented {
                let payload = desc
                    .default_reply
                    .map_or(Payload::None, DefaultReply::materialize);
                inner.defer(guard, Reply::new(Errno::UNSUPPORTED.raw(), payload));
                return;
            }

            if let Some(duration) = timeout {
                let echo = request.timeout_echo();
                let watchdog = guard.clone();
                inner.handle.spawn(async move {
                    tokio::time::sleep(duration).await;
                    watchdog.deliver("watchdog", Reply::new(Errno::timeout().raw(), echo));
                });
            }

            let task_inner = Arc::clone(&inner);
            inner.handle.spawn(async move {
                let reply = task_inner.run_op(desc, request).await;
                guard.deliver("completion", reply);
            });
        })
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("implemented", &self.inner.implemented.len())
            .finish_non_exhaustive()
    }
}

// ── Result normalization ────────────────────────────────────────────────────

/// Build the final reply: a completion that carried no payload picks up
/// the registry default, so a payloadless success on a defaulted operation
/// encodes identically to the unimplemented response.
fn finish(desc: &'static OperationDescriptor, code: i32, payload: Option<Payload>) -> Reply {
    let payload = payload
        .or_else(|| desc.default_reply.map(DefaultReply::materialize))
        .unwrap_or(Payload::None);
    Reply::new(code, payload)
}

/// Run a user future, converting panics into `EIO` so nothing unwinds
/// toward the native boundary.
async fn guarded<T>(op: &'static str, fut: OpFuture<T>) -> Result<T, Errno> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(_) => {
            warn!(op, "operation panicked; replying EIO");
            Err(Errno::EIO)
        }
    }
}

async fn unit_reply(desc: &'static OperationDescriptor, fut: OpFuture<()>) -> Reply {
    match guarded(desc.name, fut).await {
        Ok(()) => finish(desc, 0, None),
        Err(e) => finish(desc, e.raw(), None),
    }
}

fn unsupported(desc: &'static OperationDescriptor) -> Reply {
    finish(desc, Errno::UNSUPPORTED.raw(), None)
}

/// Attributes synthesized for the root when no getattr operation exists:
/// a plain directory so the kernel can complete its first probe.
fn synthetic_root() -> Stat {
    Stat {
        mode: Some(0o40755),
        size: Some(4096),
        atime: Some(Timestamp::Millis(0)),
        mtime: Some(Timestamp::Millis(0)),
        ctime: Some(Timestamp::Millis(0)),
        ..Stat::default()
    }
}

fn root_attr_reply(desc: &'static OperationDescriptor, path: &str) -> Reply {
    if path == "/" {
        Reply::ok(Payload::Stat(encode_stat(Some(&synthetic_root()))))
    } else {
        finish(desc, Errno::EPERM.raw(), None)
    }
}

impl EngineInner {
    /// Deliver from a fresh task so the reply never runs inside the native
    /// caller's stack frame.
    fn defer(&self, guard: DeliveryGuard, reply: Reply) {
        self.handle.spawn(async move {
            guard.deliver("default", reply);
        });
    }

    #[allow(clippy::too_many_lines)]
    async fn run_op(&self, desc: &'static OperationDescriptor, request: Request) -> Reply {
        match request {
            Request::Init => {
                if let Some(tx) = self.init_tx.lock().take() {
                    let _ = tx.send(());
                }
                match &self.ops.init {
                    Some(op) => unit_reply(desc, op()).await,
                    None => finish(desc, 0, None),
                }
            }
            Request::Error => match &self.ops.error {
                Some(op) => unit_reply(desc, op()).await,
                None => finish(desc, 0, None),
            },
            Request::Access { path, mode } => match &self.ops.access {
                Some(op) => unit_reply(desc, op(path, mode)).await,
                None => unsupported(desc),
            },
            Request::Statfs { path } => match &self.ops.statfs {
                Some(op) => match guarded(desc.name, op(path)).await {
                    Ok(statfs) => {
                        finish(desc, 0, Some(Payload::Statfs(encode_statfs(Some(&statfs)))))
                    }
                    Err(e) => finish(desc, e.raw(), None),
                },
                None => unsupported(desc),
            },
            Request::Getattr { path } => match &self.ops.getattr {
                Some(op) => match guarded(desc.name, op(path)).await {
                    Ok(stat) => finish(desc, 0, Some(Payload::Stat(encode_stat(Some(&stat))))),
                    Err(e) => finish(desc, e.raw(), None),
                },
                None => root_attr_reply(desc, &path),
            },
            Request::Fgetattr { path, fd } => match (&self.ops.fgetattr, &self.ops.getattr) {
                (Some(op), _) => match guarded(desc.name, op(path, fd)).await {
                    Ok(stat) => finish(desc, 0, Some(Payload::Stat(encode_stat(Some(&stat))))),
                    Err(e) => finish(desc, e.raw(), None),
                },
                (None, Some(op)) => match guarded(desc.name, op(path)).await {
                    Ok(stat) => finish(desc, 0, Some(Payload::Stat(encode_stat(Some(&stat))))),
                    Err(e) => finish(desc, e.raw(), None),
                },
                (None, None) => root_attr_reply(desc, &path),
            },
            Request::Flush { path, fd } => match &self.ops.flush {
                Some(op) => unit_reply(desc, op(path, fd)).await,
                None => unsupported(desc),
            },
            Request::Fsync { path, datasync, fd } => match &self.ops.fsync {
                Some(op) => unit_reply(desc, op(path, datasync, fd)).await,
                None => unsupported(desc),
            },
            Request::Fsyncdir { path, datasync, fd } => match &self.ops.fsyncdir {
                Some(op) => unit_reply(desc, op(path, datasync, fd)).await,
                None => unsupported(desc),
            },
            Request::Readdir { path } => match &self.ops.readdir {
                Some(op) => match guarded(desc.name, op(path)).await {
                    Ok((names, stats)) => {
                        let stats = stats.iter().map(|s| encode_stat(Some(s))).collect();
                        finish(desc, 0, Some(Payload::Dirents { names, stats }))
                    }
                    Err(e) => finish(desc, e.raw(), None),
                },
                None => unsupported(desc),
            },
            Request::Truncate { path, size } => match &self.ops.truncate {
                Some(op) => unit_reply(desc, op(path, size)).await,
                None => unsupported(desc),
            },
            Request::Ftruncate { path, fd, size } => match &self.ops.ftruncate {
                Some(op) => unit_reply(desc, op(path, fd, size)).await,
                None => unsupported(desc),
            },
            Request::Utimens {
                path,
                atime_ms,
                mtime_ms,
            } => match &self.ops.utimens {
                Some(op) => unit_reply(desc, op(path, atime_ms, mtime_ms)).await,
                None => unsupported(desc),
            },
            Request::Readlink { path } => match &self.ops.readlink {
                Some(op) => match guarded(desc.name, op(path)).await {
                    Ok(target) => finish(desc, 0, Some(Payload::LinkName(target))),
                    Err(e) => finish(desc, e.raw(), None),
                },
                None => unsupported(desc),
            },
            Request::Chown { path, uid, gid } => match &self.ops.chown {
                Some(op) => unit_reply(desc, op(path, uid, gid)).await,
                None => unsupported(desc),
            },
            Request::Chmod { path, mode } => match &self.ops.chmod {
                Some(op) => unit_reply(desc, op(path, mode)).await,
                None => unsupported(desc),
            },
            Request::Mknod { path, mode, dev } => match &self.ops.mknod {
                Some(op) => unit_reply(desc, op(path, mode, dev)).await,
                None => unsupported(desc),
            },
            Request::Setxattr {
                path,
                name,
                value,
                position,
                flags,
            } => match &self.ops.setxattr {
                Some(op) => {
                    match guarded(desc.name, op(path, name, value.clone(), position, flags)).await
                    {
                        Ok(()) => Reply::new(0, Payload::Buffer(value)),
                        Err(e) => Reply::new(e.raw(), Payload::Buffer(value)),
                    }
                }
                None => unsupported(desc),
            },
            Request::Getxattr {
                path,
                name,
                value,
                position,
            } => match &self.ops.getxattr {
                Some(op) => match guarded(desc.name, op(path, name, position)).await {
                    Ok(Some(found)) => {
                        {
                            let mut dst = value.lock();
                            let n = found.len().min(dst.len());
                            dst[..n].copy_from_slice(&found[..n]);
                        }
                        let code = i32::try_from(found.len()).unwrap_or(i32::MAX);
                        Reply::new(code, Payload::Buffer(value))
                    }
                    Ok(None) => Reply::new(Errno::no_xattr().raw(), Payload::Buffer(value)),
                    Err(e) => Reply::new(e.raw(), Payload::Buffer(value)),
                },
                None => unsupported(desc),
            },
            Request::Listxattr { path, list } => match &self.ops.listxattr {
                Some(op) => match guarded(desc.name, op(path)).await {
                    Ok(names) => {
                        if list.is_empty() {
                            // Size probe; extra headroom for the macOS
                            // driver's bookkeeping.
                            let size: usize =
                                names.iter().map(|n| n.len() + 1).sum::<usize>() + 128;
                            let code = i32::try_from(size).unwrap_or(i32::MAX);
                            Reply::new(code, Payload::Buffer(list))
                        } else {
                            let written = {
                                let mut dst = list.lock();
                                let mut ptr = 0_usize;
                                for name in &names {
                                    let bytes = name.as_bytes();
                                    if ptr + bytes.len() + 1 > dst.len() {
                                        break;
                                    }
                                    dst[ptr..ptr + bytes.len()].copy_from_slice(bytes);
                                    ptr += bytes.len();
                                    dst[ptr] = 0;
                                    ptr += 1;
                                }
                                ptr
                            };
                            let code = i32::try_from(written).unwrap_or(i32::MAX);
                            Reply::new(code, Payload::Buffer(list))
                        }
                    }
                    Err(e) => Reply::new(e.raw(), Payload::Buffer(list)),
                },
                None => unsupported(desc),
            },
            Request::Removexattr { path, name } => match &self.ops.removexattr {
                Some(op) => unit_reply(desc, op(path, name)).await,
                None => unsupported(desc),
            },
            Request::Open { path, flags } => match &self.ops.open {
                Some(op) => match guarded(desc.name, op(path, flags)).await {
                    Ok(fd) => finish(desc, 0, Some(Payload::Value(fd))),
                    Err(e) => finish(desc, e.raw(), None),
                },
                None => unsupported(desc),
            },
            Request::Opendir { path, flags } => match &self.ops.opendir {
                Some(op) => match guarded(desc.name, op(path, flags)).await {
                    Ok(fd) => finish(desc, 0, Some(Payload::Value(fd))),
                    Err(e) => finish(desc, e.raw(), None),
                },
                None => unsupported(desc),
            },
            Request::Read {
                path,
                fd,
                buf,
                len,
                offset,
            } => match &self.ops.read {
                Some(op) => match guarded(desc.name, op(path, fd, buf.clone(), len, offset)).await
                {
                    Ok(n) => Reply::new(0, Payload::ValueWithBuffer(n, buf)),
                    Err(e) => Reply::new(e.raw(), Payload::ValueWithBuffer(0, buf)),
                },
                None => unsupported(desc),
            },
            Request::Write {
                path,
                fd,
                buf,
                len,
                offset,
            } => match &self.ops.write {
                Some(op) => match guarded(desc.name, op(path, fd, buf.clone(), len, offset)).await
                {
                    Ok(n) => Reply::new(0, Payload::ValueWithBuffer(n, buf)),
                    Err(e) => Reply::new(e.raw(), Payload::ValueWithBuffer(0, buf)),
                },
                None => unsupported(desc),
            },
            Request::Release { path, fd } => match &self.ops.release {
                Some(op) => unit_reply(desc, op(path, fd)).await,
                None => unsupported(desc),
            },
            Request::Releasedir { path, fd } => match &self.ops.releasedir {
                Some(op) => unit_reply(desc, op(path, fd)).await,
                None => unsupported(desc),
            },
            Request::Create { path, mode } => match &self.ops.create {
                Some(op) => match guarded(desc.name, op(path, mode)).await {
                    Ok(fd) => finish(desc, 0, Some(Payload::Value(fd))),
                    Err(e) => finish(desc, e.raw(), None),
                },
                None => unsupported(desc),
            },
            Request::Unlink { path } => match &self.ops.unlink {
                Some(op) => unit_reply(desc, op(path)).await,
                None => unsupported(desc),
            },
            Request::Rename { src, dest } => match &self.ops.rename {
                Some(op) => unit_reply(desc, op(src, dest)).await,
                None => unsupported(desc),
            },
            Request::Link { src, dest } => match &self.ops.link {
                Some(op) => unit_reply(desc, op(src, dest)).await,
                None => unsupported(desc),
            },
            Request::Symlink { src, dest } => match &self.ops.symlink {
                Some(op) => unit_reply(desc, op(src, dest)).await,
                None => unsupported(desc),
            },
            Request::Mkdir { path, mode } => match &self.ops.mkdir {
                Some(op) => unit_reply(desc, op(path, mode)).await,
                None => unsupported(desc),
            },
            Request::Rmdir { path } => match &self.ops.rmdir {
                Some(op) => unit_reply(desc, op(path)).await,
                None => unsupported(desc),
            },
        }
    }
}
