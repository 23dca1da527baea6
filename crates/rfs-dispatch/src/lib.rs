#![forbid(unsafe_code)]
//! Operation dispatch for relayfs.
//!
//! For every opcode in the registry this crate synthesizes a handler that
//! the native driver can invoke with a result sink and the request
//! arguments. Each synthesized handler:
//!
//! 1. short-circuits to the registry default when the operation is not in
//!    the implemented set,
//! 2. otherwise invokes the user operation on the runtime,
//! 3. normalizes the result (payloadless completions pick up the registry
//!    default) and
//! 4. delivers exactly one reply per request — whichever of the user
//!    completion and the watchdog timer finishes first wins, and the loser
//!    is discarded without touching the sink.
//!
//! Delivery is always performed from a spawned task, never from the native
//! caller's stack frame, so the driver's dispatch thread is never blocked
//! inside user code.

mod engine;
mod ops;
mod request;
mod timeout;

pub use engine::{DeliveryGuard, DispatchEngine, Handler, HandlerTable, ResultSink};
pub use ops::{
    AccessOp, ChownOp, CreateOp, FdOp, FgetattrOp, FsyncOp, FtruncateOp, GetattrOp, GetxattrOp,
    IoOp, ListxattrOp, MknodOp, ModeOp, OpFuture, OpenOp, Operations, PathOp, PathPairOp,
    ReaddirOp, ReadlinkOp, RemovexattrOp, SessionOp, SetxattrOp, StatfsOp, TruncateOp, UtimensOp,
};
pub use request::Request;
pub use timeout::{DEFAULT_TIMEOUT, TimeoutPolicy};
