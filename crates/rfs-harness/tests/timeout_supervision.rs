#![forbid(unsafe_code)]
//! Watchdog supervision driven through a mounted session.

use parking_lot::Mutex;
use rfs_dispatch::{Operations, Request, ResultSink, TimeoutPolicy};
use rfs_error::Errno;
use rfs_harness::{ScriptedDriver, noop_unmounter};
use rfs_mount::{MountConfig, Session};
use rfs_proto::{Payload, SharedBuffer};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;

struct Fixture {
    _mountdir: tempfile::TempDir,
    _session: Session,
    driver: Arc<ScriptedDriver>,
}

/// Mount an operation set where `read` never completes and `unlink`
/// completes only when released through the returned sender.
async fn mounted_with_stalls(timeout: TimeoutPolicy) -> Fixture {
    let ops = Operations {
        read: Some(Box::new(|_path, _fd, _buf, _len, _offset| {
            Box::pin(futures::future::pending())
        })),
        write: Some(Box::new(|_path, _fd, _buf, len, _offset| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok(len)
            })
        })),
        unlink: Some(Box::new(|_path| Box::pin(async { Ok(()) }))),
        ..Operations::default()
    };

    let mountdir = tempfile::tempdir().expect("tempdir");
    let driver = ScriptedDriver::new();
    let config = MountConfig {
        timeout,
        ..MountConfig::default()
    };
    let session = Session::new(
        mountdir.path(),
        ops,
        config,
        Arc::clone(&driver) as Arc<dyn rfs_mount::NativeDriver>,
        Handle::current(),
    )
    .with_unmounter(noop_unmounter());
    session.mount().await.expect("mount");
    Fixture {
        _mountdir: mountdir,
        _session: session,
        driver,
    }
}

#[tokio::test]
async fn stalled_read_times_out_and_echoes_the_buffer() {
    let fx = mounted_with_stalls(TimeoutPolicy::Global(Duration::from_millis(10))).await;

    let buf = SharedBuffer::zeroed(8);
    let started = Instant::now();
    let reply = fx
        .driver
        .call(Request::Read {
            path: "/f".into(),
            fd: 1,
            buf: buf.clone(),
            len: 8,
            offset: 0,
        })
        .await;
    let elapsed = started.elapsed();

    assert_eq!(reply.code, Errno::timeout().raw());
    match reply.payload {
        Payload::ValueWithBuffer(0, echoed) => assert!(echoed.same_buffer(&buf)),
        other => panic!("expected buffer echo, got {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(10), "fired early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "fired far too late: {elapsed:?}");
}

#[tokio::test]
async fn per_op_policy_supervises_only_the_named_operations() {
    let mut by_name = HashMap::new();
    by_name.insert("read".to_owned(), Duration::from_millis(10));
    // Explicit zero disables supervision for write despite its 40ms run.
    by_name.insert("write".to_owned(), Duration::ZERO);
    let fx = mounted_with_stalls(TimeoutPolicy::PerOp {
        by_name,
        default: Duration::from_millis(10),
    })
    .await;

    let reply = fx
        .driver
        .call(Request::Read {
            path: "/f".into(),
            fd: 1,
            buf: SharedBuffer::zeroed(4),
            len: 4,
            offset: 0,
        })
        .await;
    assert_eq!(reply.code, Errno::timeout().raw());

    let reply = fx
        .driver
        .call(Request::Write {
            path: "/f".into(),
            fd: 1,
            buf: SharedBuffer::from_vec(vec![7; 4]),
            len: 4,
            offset: 0,
        })
        .await;
    assert_eq!(reply.code, 0, "unsupervised write outlives the default");
}

#[tokio::test]
async fn at_most_one_delivery_per_request() {
    let fx = mounted_with_stalls(TimeoutPolicy::Global(Duration::from_millis(10))).await;

    // Stalled read: the watchdog delivers; the sink must never be hit a
    // second time.
    let deliveries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&deliveries);
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let sink: ResultSink = Box::new(move |reply| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(reply);
        }
    });
    fx.driver.fire(
        Request::Read {
            path: "/f".into(),
            fd: 1,
            buf: SharedBuffer::zeroed(4),
            len: 4,
            offset: 0,
        },
        sink,
    );
    let reply = rx.await.expect("watchdog delivery");
    assert_eq!(reply.code, Errno::timeout().raw());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);

    // Fast unlink: the completion delivers; the later watchdog fire is
    // discarded.
    let deliveries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&deliveries);
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let sink: ResultSink = Box::new(move |reply| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(reply);
        }
    });
    fx.driver.fire(Request::Unlink { path: "/f".into() }, sink);
    let reply = rx.await.expect("completion delivery");
    assert_eq!(reply.code, 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);
}
