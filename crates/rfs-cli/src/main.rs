#![forbid(unsafe_code)]
//! relayfs demo binary.
//!
//! `demo` drives the reference in-memory filesystem through a full
//! simulated mount session — handler table, bitmap, kernel-style requests,
//! unmount — and prints the transcript. `options` shows the native option
//! string a configuration projects to, and `errno` looks up symbolic error
//! codes.

use anyhow::{Context, Result, bail};
use rfs_dispatch::{Request, TimeoutPolicy};
use rfs_error::Errno;
use rfs_harness::{ScriptedDriver, noop_unmounter};
use rfs_memfs::{MemFs, PLACEHOLDER_FD};
use rfs_mount::{MountConfig, NativeDriver, Session, option_string};
use rfs_proto::{Payload, Reply, SharedBuffer, join_u64, stat_offsets};
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else {
        print_usage();
        return Ok(());
    };

    match command.as_str() {
        "demo" => demo(),
        "options" => options_cmd(args.collect()),
        "errno" => {
            let Some(name) = args.next() else {
                bail!("errno requires a symbolic name (e.g. ENOENT)");
            };
            errno_cmd(&name)
        }
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        _ => {
            print_usage();
            bail!("unknown command: {command}")
        }
    }
}

fn print_usage() {
    println!("rfs-cli\n");
    println!("USAGE:");
    println!("  rfs-cli demo");
    println!("  rfs-cli options [--allow-other] [--auto-unmount] [--debug] [--fsname NAME] [--max-read N]");
    println!("  rfs-cli errno <NAME>");
}

// ── errno lookup ────────────────────────────────────────────────────────────

fn errno_cmd(name: &str) -> Result<()> {
    match Errno::from_name(name) {
        Some(errno) => {
            println!("{errno}");
            Ok(())
        }
        None => bail!("unknown error name: {name}"),
    }
}

// ── option-string projection ────────────────────────────────────────────────

fn options_cmd(args: Vec<String>) -> Result<()> {
    let mut config = MountConfig::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--allow-other" => config.allow_other = true,
            "--auto-unmount" => config.auto_unmount = true,
            "--debug" => config.debug = true,
            "--fsname" => {
                config.fsname = Some(args.next().context("--fsname requires a value")?);
            }
            "--max-read" => {
                let value = args.next().context("--max-read requires a value")?;
                config.max_read = Some(value.parse().context("--max-read must be an integer")?);
            }
            other => bail!("unknown option: {other}"),
        }
    }
    let projected = option_string(&config, Path::new("/mnt/demo"), None);
    if projected.is_empty() {
        println!("(no options)");
    } else {
        println!("{projected}");
    }
    Ok(())
}

// ── simulated session demo ──────────────────────────────────────────────────

fn describe(reply: &Reply) -> String {
    let code = if reply.code < 0 {
        Errno::from_raw(reply.code).to_string()
    } else {
        reply.code.to_string()
    };
    match &reply.payload {
        Payload::None => code,
        Payload::Value(v) => format!("{code}, value={v}"),
        Payload::Stat(arr) => {
            let size = join_u64(arr[stat_offsets::SIZE], arr[stat_offsets::SIZE + 1]);
            format!("{code}, mode={:o}, size={size}", arr[stat_offsets::MODE])
        }
        Payload::Statfs(_) => format!("{code}, statfs"),
        Payload::Dirents { names, .. } => format!("{code}, entries={names:?}"),
        Payload::LinkName(target) => format!("{code}, target={target:?}"),
        Payload::Buffer(_) => format!("{code}, buffer"),
        Payload::ValueWithBuffer(v, _) => format!("{code}, bytes={v}"),
    }
}

fn demo() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to build runtime")?;
    let handle = runtime.handle().clone();

    runtime.block_on(async move {
        let mountdir = tempfile::tempdir().context("failed to create demo mountpoint")?;
        let driver = ScriptedDriver::new();
        let config = MountConfig {
            fsname: Some("relayfs-demo".to_owned()),
            timeout: TimeoutPolicy::default(),
            ..MountConfig::default()
        };
        let session = Session::new(
            mountdir.path(),
            MemFs::new().operations(),
            config,
            Arc::clone(&driver) as Arc<dyn NativeDriver>,
            handle,
        )
        .with_unmounter(noop_unmounter());

        session.mount().await.context("mount failed")?;
        info!(mountpoint = %session.mountpoint().display(), "demo session mounted");
        println!("mounted at {}", session.mountpoint().display());
        println!(
            "option string: {:?}",
            driver.option_string().unwrap_or_default()
        );

        let steps: Vec<(&str, Request)> = vec![
            (
                "mkdir /notes",
                Request::Mkdir {
                    path: "/notes".into(),
                    mode: 0o755,
                },
            ),
            (
                "create /notes/today.txt",
                Request::Create {
                    path: "/notes/today.txt".into(),
                    mode: 0o644,
                },
            ),
            (
                "write /notes/today.txt",
                Request::Write {
                    path: "/notes/today.txt".into(),
                    fd: PLACEHOLDER_FD,
                    buf: SharedBuffer::from_vec(b"hello from relayfs".to_vec()),
                    len: 18,
                    offset: 0,
                },
            ),
            (
                "getattr /notes/today.txt",
                Request::Getattr {
                    path: "/notes/today.txt".into(),
                },
            ),
            (
                "readdir /notes",
                Request::Readdir {
                    path: "/notes".into(),
                },
            ),
            (
                "rename to /notes/kept.txt",
                Request::Rename {
                    src: "/notes/today.txt".into(),
                    dest: "/notes/kept.txt".into(),
                },
            ),
            (
                "rmdir /notes (not empty)",
                Request::Rmdir {
                    path: "/notes".into(),
                },
            ),
            (
                "unlink /notes/kept.txt",
                Request::Unlink {
                    path: "/notes/kept.txt".into(),
                },
            ),
            (
                "rmdir /notes",
                Request::Rmdir {
                    path: "/notes".into(),
                },
            ),
            (
                "statfs / (unimplemented)",
                Request::Statfs { path: "/".into() },
            ),
        ];

        for (label, request) in steps {
            let reply = driver.call(request).await;
            println!("{label:32} -> {}", describe(&reply));
        }

        // Read back through a driver-owned buffer.
        let buf = SharedBuffer::zeroed(32);
        driver
            .call(Request::Create {
                path: "/readme".into(),
                mode: 0o644,
            })
            .await;
        driver
            .call(Request::Write {
                path: "/readme".into(),
                fd: PLACEHOLDER_FD,
                buf: SharedBuffer::from_vec(b"round trip".to_vec()),
                len: 10,
                offset: 0,
            })
            .await;
        let reply = driver
            .call(Request::Read {
                path: "/readme".into(),
                fd: PLACEHOLDER_FD,
                buf: buf.clone(),
                len: 10,
                offset: 0,
            })
            .await;
        let text = String::from_utf8_lossy(&buf.to_vec()[..10]).into_owned();
        println!("{:32} -> {}, content={text:?}", "read /readme", describe(&reply));

        session.unmount().await.context("unmount failed")?;
        println!("unmounted; session state: {:?}", session.state());
        Ok(())
    })
}
