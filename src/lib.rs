//! Strand: composable sender/receiver pipelines with structured concurrency
//! and a work-stealing scheduler.
//!
//! # Overview
//!
//! Strand is an asynchronous-execution library built around a structured
//! pipeline model. Work is described lazily as a *sender*, wired to a
//! *receiver* by `connect`, and run by starting the resulting *operation
//! state*; exactly one completion is eventually delivered on one of three
//! channels (value, error, stopped). Pipelines compose with adaptors, run
//! on a family of schedulers, and tie their lifetimes to async scopes that
//! join to quiescence.
//!
//! # Core Guarantees
//!
//! - **One completion per operation**: completing a receiver consumes it;
//!   the type system enforces exactly-once delivery.
//! - **Lazy composition**: nothing runs at `connect`; only `start` begins
//!   execution.
//! - **Panic containment**: a panic in a user callable is caught at the
//!   adaptor boundary and redirected to the error channel.
//! - **Cooperative cancellation**: stop tokens flow through receiver
//!   environments; `when_any` and counting scopes cancel actively.
//! - **Structural joins**: a scope's join completes only when every
//!   association has been released; spawned work cannot outlive its scope.
//!
//! # Module Structure
//!
//! - [`sender`], [`receiver`], [`operation`]: the protocol contracts
//! - [`factories`]: `just`, `just_error`, `just_stopped`, `schedule`
//! - [`adaptors`]: `then`, `upon_*`, `let_*`, `bulk*`, `transfer`,
//!   `when_all`, `when_any`, the `retry` family
//! - [`consumers`]: `sync_wait`, `start_detached`
//! - [`scheduler`]: inline, run-loop, thread-pool, and work-stealing
//!   schedulers plus the lock-free MPMC ring
//! - [`scope`]: counting scopes, `associate`, `spawn`, `spawn_future`,
//!   `let_async_scope`
//! - [`env`]: receiver environments and queries
//! - [`stop`]: stop sources, tokens, and callbacks
//! - [`error`]: the error channel's `Error` type
//!
//! # Example
//!
//! ```rust
//! use strand::{just, sync_wait, SenderExt};
//!
//! let pool = strand::ThreadPool::new(2);
//! let sender = just(21)
//!     .transfer(pool.scheduler())
//!     .then(|x| x * 2);
//! assert_eq!(sync_wait(sender).unwrap(), Some(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod adaptors;
pub mod consumers;
pub mod env;
pub mod error;
pub mod factories;
pub mod operation;
pub mod receiver;
pub mod scheduler;
pub mod scope;
pub mod sender;
pub mod stop;
pub mod tracing_compat;

mod util;

// Re-exports for convenient access to the core surface.
pub use adaptors::{
    bulk, bulk_chunked, bulk_unchunked, let_error, let_stopped, let_value, retry, retry_if,
    retry_n, retry_with_backoff, then, transfer, upon_error, upon_stopped, when_all, when_all3,
    when_all4, when_all5, when_all_vec, when_any, when_any3, when_any_vec, BackoffPolicy, Policy,
    WhenAny3Result, WhenAnyResult,
};
pub use consumers::start_detached::start_detached_with_env;
pub use consumers::{start_detached, sync_wait, sync_wait_with_env};
pub use env::{Channel, Domain, Env};
pub use error::{Error, ErrorKind, PanicPayload, Result};
pub use factories::{just, just_error, just_stopped, schedule, try_schedule};
pub use operation::OperationState;
pub use receiver::Receiver;
pub use scheduler::{
    AnyScheduler, BoundedMpmc, BuildError, ForwardProgress, InlineScheduler, RunLoop,
    RunLoopScheduler, Scheduler, StatsSnapshot, ThreadPool, ThreadPoolScheduler, TryScheduler,
    WorkStealingPool, WorkStealingScheduler,
};
pub use scope::{
    associate, let_async_scope, spawn, spawn_future, spawn_future_with_env, spawn_with_env,
    AsyncScopeToken, CountingScope, CountingScopeToken, ScopeToken, SimpleCountingScope,
    SimpleScopeToken,
};
pub use sender::{Sender, SenderExt};
pub use stop::{InplaceStopSource, StopCallback, StopSource, StopToken};
