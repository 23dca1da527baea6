//! The mount session state machine.

use crate::config::{MountConfig, option_string};
use crate::driver::{NativeDriver, ThreadContext};
use parking_lot::Mutex;
use rfs_dispatch::{DispatchEngine, Operations};
use rfs_error::{MountError, MountResult};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[cfg(target_os = "macos")]
const FOLDER_ICON: &str =
    "/System/Library/CoreServices/CoreTypes.bundle/Contents/Resources/GenericFolderIcon.icns";

/// Where a session is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Idle,
    Opening,
    Mounted,
    Closing,
    Closed,
    /// Terminal: an error during `Opening` or `Closing` (other than a
    /// platform unmount-command failure) consumed the session.
    Failed,
}

/// The platform unmount command, injectable for tests and embedders with
/// their own unmount strategy.
pub type Unmounter = Box<dyn Fn(&Path) -> MountResult<()> + Send + Sync>;

/// Force-unmount a path with the platform command (`diskutil unmount
/// force` on macOS, `fusermount -uz` elsewhere), independent of any
/// session.
pub fn unmount_path(mountpoint: &Path) -> MountResult<()> {
    let mut command = platform_unmount(mountpoint);
    let output = command.output().map_err(|err| MountError::UnmountCommand {
        detail: err.to_string(),
    })?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(MountError::UnmountCommand {
            detail: format!("{}: {}", output.status, stderr.trim()),
        })
    }
}

#[cfg(target_os = "macos")]
fn platform_unmount(mountpoint: &Path) -> Command {
    let mut cmd = Command::new("diskutil");
    cmd.arg("unmount").arg("force").arg(mountpoint);
    cmd
}

#[cfg(not(target_os = "macos"))]
fn platform_unmount(mountpoint: &Path) -> Command {
    let mut cmd = Command::new("fusermount");
    cmd.arg("-uz").arg(mountpoint);
    cmd
}

/// One mount: a mountpoint, an operation set, and a native driver, bound
/// together for the session's lifetime. Remounting requires a new
/// instance.
pub struct Session {
    mountpoint: PathBuf,
    config: MountConfig,
    driver: Arc<dyn NativeDriver>,
    engine: DispatchEngine,
    state: Mutex<MountState>,
    ctx: Mutex<Option<ThreadContext>>,
    unmounter: Unmounter,
    folder_icon: Option<PathBuf>,
}

impl Session {
    /// Bind `ops` to `mountpoint` behind `driver`. Handler synthesis and
    /// timeout resolution happen here, once.
    #[must_use]
    pub fn new(
        mountpoint: impl AsRef<Path>,
        ops: Operations,
        config: MountConfig,
        driver: Arc<dyn NativeDriver>,
        handle: Handle,
    ) -> Session {
        let mountpoint = mountpoint.as_ref();
        let mountpoint = std::path::absolute(mountpoint).unwrap_or_else(|_| mountpoint.to_owned());
        let engine = DispatchEngine::new(ops, &config.timeout, handle);
        Session {
            mountpoint,
            config,
            driver,
            engine,
            state: Mutex::new(MountState::Idle),
            ctx: Mutex::new(None),
            unmounter: Box::new(unmount_path),
            folder_icon: detect_folder_icon(),
        }
    }

    /// Replace the platform unmount command.
    #[must_use]
    pub fn with_unmounter(mut self, unmounter: Unmounter) -> Session {
        self.unmounter = unmounter;
        self
    }

    #[must_use]
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    #[must_use]
    pub fn state(&self) -> MountState {
        *self.state.lock()
    }

    /// The dispatch engine backing this session.
    #[must_use]
    pub fn engine(&self) -> &DispatchEngine {
        &self.engine
    }

    /// Mount. Resolves once the native driver's init opcode fires; if the
    /// driver accepts the mount but never delivers init, this never
    /// resolves (callers that need a bound can wrap it in their own
    /// timeout).
    pub async fn mount(&self) -> MountResult<()> {
        {
            let mut state = self.state.lock();
            if *state != MountState::Idle {
                return Err(MountError::Consumed);
            }
            *state = MountState::Opening;
        }
        match self.open().await {
            Ok(()) => {
                *self.state.lock() = MountState::Mounted;
                info!(mountpoint = %self.mountpoint.display(), "mounted");
                Ok(())
            }
            Err(err) => {
                *self.state.lock() = MountState::Failed;
                Err(err)
            }
        }
    }

    async fn open(&self) -> MountResult<()> {
        if self.config.force {
            self.recover_stale_mount();
        }
        self.validate_mountpoint()?;

        let init_fired = self.engine.init_signal();
        let mut ctx = ThreadContext::zeroed(self.driver.context_size());
        let options = option_string(&self.config, &self.mountpoint, self.folder_icon.as_deref());
        let handlers = self.engine.handler_table();
        let implemented = self.engine.implemented_bitmap();

        debug!(
            mountpoint = %self.mountpoint.display(),
            options,
            implemented = self.engine.implemented().len(),
            "calling native mount"
        );
        self.driver
            .mount(&self.mountpoint, &options, &mut ctx, handlers, &implemented)
            .map_err(MountError::Driver)?;
        *self.ctx.lock() = Some(ctx);

        // Native success is provisional until init fires.
        init_fired
            .await
            .map_err(|_| MountError::Driver(io::Error::other("dispatch engine shut down before init")))?;
        Ok(())
    }

    /// Probe for a mount left behind by a dead process and best-effort
    /// unmount it. Any outcome lets the mount attempt proceed.
    fn recover_stale_mount(&self) {
        let probe = self.mountpoint.join("test");
        let Err(err) = fs::metadata(&probe) else {
            return;
        };
        let stale = matches!(err.raw_os_error(), Some(code) if code == libc::ENOTCONN || code == libc::ENXIO);
        if !stale {
            return;
        }
        warn!(mountpoint = %self.mountpoint.display(), "stale mount detected; forcing unmount");
        if let Err(err) = (self.unmounter)(&self.mountpoint) {
            debug!(%err, "best-effort unmount failed; continuing");
        }
    }

    fn validate_mountpoint(&self) -> MountResult<()> {
        let mnt = &self.mountpoint;
        let meta = match fs::metadata(mnt) {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if !self.config.mkdir {
                    return Err(MountError::MountpointMissing(mnt.clone()));
                }
                fs::create_dir_all(mnt)?;
                fs::metadata(mnt)?
            }
            Err(err) => return Err(MountError::Io(err)),
        };
        if !meta.is_dir() {
            return Err(MountError::MountpointNotDirectory(mnt.clone()));
        }

        // A device id differing from the parent's means something is
        // already mounted here.
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if let Some(parent) = mnt.parent() {
                if let Ok(parent_meta) = fs::metadata(parent) {
                    if parent_meta.dev() != meta.dev() {
                        return Err(MountError::MountpointInUse(mnt.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Unmount. The platform command runs first; only on its success is
    /// the native driver's unmount entry point called. A failed command
    /// leaves the session mounted with the retryable unmount-failure
    /// error.
    pub async fn unmount(&self) -> MountResult<()> {
        {
            let mut state = self.state.lock();
            if *state != MountState::Mounted {
                return Err(MountError::NotMounted);
            }
            *state = MountState::Closing;
        }

        if let Err(err) = (self.unmounter)(&self.mountpoint) {
            *self.state.lock() = MountState::Mounted;
            return Err(err);
        }

        let mut ctx = self.ctx.lock().take();
        let result = match ctx.as_mut() {
            Some(ctx) => self
                .driver
                .unmount(&self.mountpoint, ctx)
                .map_err(MountError::Driver),
            None => Ok(()),
        };
        match result {
            Ok(()) => {
                *self.state.lock() = MountState::Closed;
                info!(mountpoint = %self.mountpoint.display(), "unmounted");
                Ok(())
            }
            Err(err) => {
                *self.state.lock() = MountState::Failed;
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("mountpoint", &self.mountpoint)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(target_os = "macos")]
fn detect_folder_icon() -> Option<PathBuf> {
    let icon = PathBuf::from(FOLDER_ICON);
    icon.exists().then_some(icon)
}

#[cfg(not(target_os = "macos"))]
fn detect_folder_icon() -> Option<PathBuf> {
    None
}
