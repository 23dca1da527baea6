#![forbid(unsafe_code)]
//! Test harness for relayfs.
//!
//! [`ScriptedDriver`] stands in for the native kernel driver: it captures
//! the handler table and implemented-operations bitmap at mount time and
//! lets tests (and the demo binary) fire opcodes as if the kernel had
//! issued them. Golden JSON fixtures validate the structure encoders
//! against precomputed arrays.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rfs_dispatch::{HandlerTable, Request, ResultSink};
use rfs_error::MountError;
use rfs_mount::{NativeDriver, ThreadContext};
use rfs_proto::{OPCODE_TABLE_LEN, Reply, Stat, Statfs};
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── Scripted driver ─────────────────────────────────────────────────────────

#[derive(Default)]
struct DriverState {
    handlers: Option<HandlerTable>,
    implemented: Option<[u32; OPCODE_TABLE_LEN]>,
    option_string: Option<String>,
    mounted_at: Option<PathBuf>,
    unmounted: bool,
}

/// In-process stand-in for the native driver.
///
/// On mount it records everything the session handed over and, unless
/// constructed with [`ScriptedDriver::without_auto_init`], immediately
/// fires the init opcode the way the real driver's dispatch thread would.
#[derive(Default)]
pub struct ScriptedDriver {
    state: Mutex<DriverState>,
    auto_init: bool,
    fail_unmount: bool,
}

impl ScriptedDriver {
    /// A driver that fires init as soon as the mount entry point is
    /// called, completing the session's pending mount.
    #[must_use]
    pub fn new() -> Arc<ScriptedDriver> {
        Arc::new(ScriptedDriver {
            auto_init: true,
            ..ScriptedDriver::default()
        })
    }

    /// A driver that accepts the mount but never delivers init, for
    /// exercising the hung-mount behavior.
    #[must_use]
    pub fn without_auto_init() -> Arc<ScriptedDriver> {
        Arc::new(ScriptedDriver::default())
    }

    /// A driver whose native unmount entry point fails.
    #[must_use]
    pub fn with_failing_unmount() -> Arc<ScriptedDriver> {
        Arc::new(ScriptedDriver {
            auto_init: true,
            fail_unmount: true,
            ..ScriptedDriver::default()
        })
    }

    /// Issue one kernel-style request and await its reply.
    ///
    /// # Panics
    /// Panics if called before a mount registered the handler table.
    pub async fn call(&self, request: Request) -> Reply {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let sink: ResultSink = Box::new(move |reply| {
            let _ = tx.send(reply);
        });
        self.fire(request, sink);
        rx.await.expect("reply delivered")
    }

    /// Issue a request with a caller-supplied sink (for delivery-counting
    /// tests).
    ///
    /// # Panics
    /// Panics if called before a mount registered the handler table.
    pub fn fire(&self, request: Request, sink: ResultSink) {
        let handler = {
            let state = self.state.lock();
            let table = state.handlers.as_ref().expect("driver is mounted");
            table
                .handler(request.opcode())
                .expect("opcode has a handler")
        };
        handler(sink, request);
    }

    /// The bitmap received at mount time.
    ///
    /// # Panics
    /// Panics if called before a mount.
    #[must_use]
    pub fn implemented_bitmap(&self) -> [u32; OPCODE_TABLE_LEN] {
        self.state.lock().implemented.expect("driver is mounted")
    }

    /// The option string received at mount time.
    #[must_use]
    pub fn option_string(&self) -> Option<String> {
        self.state.lock().option_string.clone()
    }

    #[must_use]
    pub fn mounted_at(&self) -> Option<PathBuf> {
        self.state.lock().mounted_at.clone()
    }

    #[must_use]
    pub fn is_unmounted(&self) -> bool {
        self.state.lock().unmounted
    }
}

impl NativeDriver for ScriptedDriver {
    fn context_size(&self) -> usize {
        // Matches nothing in particular; the session must allocate
        // whatever size the driver asks for.
        168
    }

    fn mount(
        &self,
        mountpoint: &Path,
        option_string: &str,
        ctx: &mut ThreadContext,
        handlers: HandlerTable,
        implemented: &[u32; OPCODE_TABLE_LEN],
    ) -> io::Result<()> {
        assert_eq!(ctx.len(), self.context_size(), "context sized by driver");
        {
            let mut state = self.state.lock();
            state.option_string = Some(option_string.to_owned());
            state.implemented = Some(*implemented);
            state.mounted_at = Some(mountpoint.to_owned());
            state.handlers = Some(handlers.clone());
        }
        if self.auto_init {
            let handler = handlers
                .handler(rfs_proto::Opcode::Init)
                .expect("init handler present");
            let sink: ResultSink = Box::new(|_reply| {});
            handler(sink, Request::Init);
        }
        Ok(())
    }

    fn unmount(&self, _mountpoint: &Path, _ctx: &mut ThreadContext) -> io::Result<()> {
        if self.fail_unmount {
            return Err(io::Error::other("native unmount failed"));
        }
        self.state.lock().unmounted = true;
        Ok(())
    }
}

/// An unmounter that always succeeds, for sessions driven entirely
/// in-process where no real mount exists to tear down.
#[must_use]
pub fn noop_unmounter() -> rfs_mount::Unmounter {
    Box::new(|_mountpoint| Ok(()))
}

/// An unmounter that always fails with the distinct unmount-failure
/// marker.
#[must_use]
pub fn failing_unmounter(detail: &str) -> rfs_mount::Unmounter {
    let detail = detail.to_owned();
    Box::new(move |_mountpoint| {
        Err(MountError::UnmountCommand {
            detail: detail.clone(),
        })
    })
}

// ── Golden fixtures ─────────────────────────────────────────────────────────

/// One stat-encoding golden case.
#[derive(Debug, Clone, Deserialize)]
pub struct StatFixture {
    pub name: String,
    pub stat: Stat,
    pub expected: Vec<u32>,
}

/// One statfs-encoding golden case.
#[derive(Debug, Clone, Deserialize)]
pub struct StatfsFixture {
    pub name: String,
    pub statfs: Statfs,
    pub expected: Vec<u32>,
}

pub fn load_stat_fixtures(path: &Path) -> Result<Vec<StatFixture>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid fixture json {}", path.display()))
}

pub fn load_statfs_fixtures(path: &Path) -> Result<Vec<StatfsFixture>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read fixture {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid fixture json {}", path.display()))
}
