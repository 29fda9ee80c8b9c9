//! This crate runs all access to a resource which is bound to the thread that
//! created it on one dedicated worker thread. The resource is constructed on
//! the worker, and closures are submitted to it from any number of threads
//! and executed strictly one at a time, in the order they were enqueued.
//!
//! Three adapters share the same queue:
//!
//! - [`Executor::invoke`] parks the calling thread until the closure has run
//!   and returns its result.
//! - [`Executor::invoke_async`] returns a [`Task`] which may be awaited or
//!   waited on with a timeout.
//! - [`Executor::sequence`] and [`Executor::async_sequence`] return lazy
//!   sequences whose cursor is created and advanced only on the worker
//!   thread, one queued step per element.
//!
//! A panic inside a submitted closure is captured on the worker thread and
//! returned to the submitter as [`Error::Panicked`]; the worker keeps
//! serving later submissions.
//!
//! ```
//! use thread_affinity::Executor;
//!
//! let exec = Executor::create(|| vec![1, 2, 3]).unwrap();
//! exec.invoke(|items| items.push(4)).unwrap();
//! let total: i32 = exec
//!     .sequence(|items| items.clone())
//!     .map(Result::unwrap)
//!     .sum();
//! assert_eq!(total, 10);
//! exec.dispose().unwrap();
//! ```

mod config;
pub use self::config::{ExecutorConfig, DEFAULT_THREAD_NAME};

mod cursor;
pub use self::cursor::{Cursor, IterCursor, StreamCursor};

mod error;
pub use self::error::{Error, Panic};

mod executor;
pub use self::executor::{Executor, Lifecycle};

mod queue;

mod sequence;
pub use self::sequence::Sequence;

mod stream;
pub use self::stream::{AsyncSequence, Next};

mod task;
pub use self::task::Task;

mod wait;

mod worker;
