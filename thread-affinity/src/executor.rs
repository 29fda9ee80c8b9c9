use std::convert::Infallible;
use std::fmt::{self, Debug, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{
    atomic::{AtomicU64, AtomicU8, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures_core::Stream;
use tracing::{debug, warn};

use super::config::ExecutorConfig;
use super::cursor::{Cursor, IterCursor, StreamCursor};
use super::error::{Error, Panic};
use super::queue::{WorkItem, WorkQueue};
use super::sequence::Sequence;
use super::stream::AsyncSequence;
use super::task::{completion, Completion, Task};
use super::worker::{CursorId, ReleaseFn, Worker};

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const DISPOSING: u8 = 2;
const DISPOSED: u8 = 3;

/// The lifecycle state of an [`Executor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// The worker thread is constructing the resource
    Created,
    /// Work items are accepted and processed
    Running,
    /// New work is rejected and the worker is draining items accepted
    /// while running
    Disposing,
    /// The worker thread has been joined and the resource released
    Disposed,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) struct Inner<R> {
    next_cursor: AtomicU64,
    queue: WorkQueue<R>,
    release: Mutex<Option<ReleaseFn<R>>>,
    state: AtomicU8,
}

impl<R> Inner<R> {
    fn new() -> Self {
        Self {
            next_cursor: AtomicU64::new(0),
            queue: WorkQueue::new(),
            release: Mutex::new(None),
            state: AtomicU8::new(CREATED),
        }
    }

    pub(crate) fn allocate_cursor(&self) -> CursorId {
        self.next_cursor.fetch_add(1, Ordering::Relaxed)
    }

    /// Fail if the current thread is the worker thread, where blocking on a
    /// submitted item would never complete.
    pub(crate) fn check_blocking<E>(&self) -> Result<(), Error<E>> {
        if self.on_worker_thread() {
            Err(Error::Reentrant)
        } else {
            Ok(())
        }
    }

    pub(crate) fn on_worker_thread(&self) -> bool {
        self.queue
            .consumer()
            .map(|thread| thread.id() == thread::current().id())
            .unwrap_or(false)
    }

    fn lifecycle(&self) -> Lifecycle {
        match self.state.load(Ordering::Acquire) {
            CREATED => Lifecycle::Created,
            RUNNING => Lifecycle::Running,
            DISPOSING => Lifecycle::Disposing,
            _ => Lifecycle::Disposed,
        }
    }

    fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::Release);
    }
}

impl<R: 'static> Inner<R> {
    /// Enqueue a function to be run against the worker state, returning a
    /// `Task` for its outcome. This is the single submission path used by
    /// all call adapters.
    pub(crate) fn submit<T, E, F>(&self, f: F) -> Result<Task<T, E>, Error<E>>
    where
        F: FnOnce(&mut Worker<R>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        if self.state.load(Ordering::Acquire) != RUNNING {
            return Err(Error::Closed);
        }
        let (completion, task) = completion();
        let item: WorkItem<R> = Box::new(move |worker| run_item(worker, f, completion));
        match self.queue.push(item) {
            Ok(()) => Ok(task),
            Err(_) => Err(Error::Closed),
        }
    }

    /// Submit a work item releasing a cursor, without waiting for it.
    pub(crate) fn discard_cursor(&self, id: CursorId) {
        let _ = self.submit(move |worker| {
            worker.discard_cursor(id);
            Ok::<_, Infallible>(())
        });
    }
}

fn run_item<R, T, E, F>(worker: &mut Worker<R>, f: F, completion: Completion<T, E>)
where
    F: FnOnce(&mut Worker<R>) -> Result<T, E>,
{
    let outcome = match catch_unwind(AssertUnwindSafe(|| f(worker))) {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(err)) => Err(Error::Failed(err)),
        Err(payload) => {
            let panic = Panic::new(payload);
            warn!(error = %panic, "work item panicked");
            Err(Error::Panicked(panic))
        }
    };
    // the submitter may have stopped waiting, in which case the result is discarded
    completion.complete(outcome);
}

/// Cancels queued work if the worker loop unwinds.
struct Sentinel<'a, R>(&'a WorkQueue<R>);

impl<R> Drop for Sentinel<'_, R> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.close();
            let count = self.0.clear();
            warn!(canceled = count, "worker thread panicked");
        }
    }
}

fn run_worker<R, E, F>(
    inner: Arc<Inner<R>>,
    ctor: F,
    started: Completion<(), E>,
) -> Result<(), Error>
where
    F: FnOnce() -> Result<R, E>,
{
    inner.queue.register_consumer();
    let _sentinel = Sentinel(&inner.queue);

    let resource = match catch_unwind(AssertUnwindSafe(ctor)) {
        Ok(Ok(resource)) => resource,
        Ok(Err(err)) => {
            debug!("resource construction failed");
            started.complete(Err(Error::Failed(err)));
            return Ok(());
        }
        Err(payload) => {
            let panic = Panic::new(payload);
            warn!(error = %panic, "resource construction panicked");
            started.complete(Err(Error::Panicked(panic)));
            return Ok(());
        }
    };
    inner.set_state(RUNNING);
    started.complete(Ok(()));
    debug!("worker started");

    let mut worker = Worker::new(resource);
    while let Some(item) = inner.queue.recv() {
        item(&mut worker);
    }

    let release = lock(&inner.release).take();
    debug!(cursors = worker.cursor_count(), "worker stopping");
    worker.teardown(release)
}

/// Runs all access to a resource on a single dedicated worker thread.
///
/// The resource is constructed on the worker thread and never leaves it, so
/// it is not required to be `Send`. Work is submitted from any thread as a
/// closure receiving `&mut R`, and executed one item at a time in the order
/// it was enqueued, whichever adapter was used to submit it.
pub struct Executor<R> {
    inner: Arc<Inner<R>>,
    handle: Mutex<Option<JoinHandle<Result<(), Error>>>>,
    thread_name: Option<String>,
}

impl Executor<()> {
    /// Create an executor which only serializes work, without a resource.
    pub fn new() -> Result<Self, Error> {
        Self::create(|| ())
    }
}

impl<R: 'static> Executor<R> {
    /// Start a worker thread with the default configuration and construct
    /// the resource on it.
    pub fn create<F>(ctor: F) -> Result<Self, Error>
    where
        F: FnOnce() -> R + Send + 'static,
    {
        ExecutorConfig::new().build(ctor)
    }

    /// Start a worker thread with the default configuration and construct
    /// the resource on it, returning the constructor's error if it fails.
    pub fn try_create<F, E>(ctor: F) -> Result<Self, Error<E>>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        E: Send + 'static,
    {
        ExecutorConfig::new().try_build(ctor)
    }

    pub(crate) fn spawn<F, E>(config: ExecutorConfig, ctor: F) -> Result<Self, Error<E>>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        E: Send + 'static,
    {
        let inner = Arc::new(Inner::new());
        let (started, ready) = completion();
        let mut builder = thread::Builder::new();
        if let Some(name) = config.thread_name.clone() {
            builder = builder.name(name);
        }
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }
        let worker_inner = inner.clone();
        let handle = builder
            .spawn(move || run_worker(worker_inner, ctor, started))
            .map_err(Error::Spawn)?;
        match ready.wait() {
            Ok(()) => Ok(Self {
                inner,
                handle: Mutex::new(Some(handle)),
                thread_name: config.thread_name,
            }),
            Err(err) => {
                let _ = handle.join();
                Err(err)
            }
        }
    }

    /// Get the current lifecycle state.
    pub fn lifecycle(&self) -> Lifecycle {
        self.inner.lifecycle()
    }

    /// Check if the current thread is this executor's worker thread.
    pub fn is_worker_thread(&self) -> bool {
        self.inner.on_worker_thread()
    }

    /// Get the name of the worker thread, if any.
    pub fn thread_name(&self) -> Option<&str> {
        self.thread_name.as_deref()
    }

    /// Run a function on the worker thread, parking the current thread until
    /// it completes. A panic in the function is returned as
    /// `Error::Panicked`, and the worker remains available.
    pub fn invoke<F, T>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut R) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.inner.check_blocking::<Infallible>()?;
        self.invoke_async(f)?.wait()
    }

    /// Run a fallible function on the worker thread, parking the current
    /// thread until it completes. An error result is returned as
    /// `Error::Failed`.
    pub fn try_invoke<F, T, E>(&self, f: F) -> Result<T, Error<E>>
    where
        F: FnOnce(&mut R) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.inner.check_blocking::<E>()?;
        self.try_invoke_async(f)?.wait()
    }

    /// Run a function on the worker thread, parking the current thread until
    /// it completes or the timeout expires. On expiry `Error::TimedOut` is
    /// returned; the function still runs when the worker reaches it, and
    /// its result is discarded.
    pub fn invoke_timeout<F, T>(&self, f: F, timeout: Duration) -> Result<T, Error>
    where
        F: FnOnce(&mut R) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.inner.check_blocking::<Infallible>()?;
        self.invoke_async(f)?.wait_timeout(timeout)
    }

    /// Queue a function to run on the worker thread without blocking. The
    /// returned `Task` resolves to its result.
    pub fn invoke_async<F, T>(&self, f: F) -> Result<Task<T>, Error>
    where
        F: FnOnce(&mut R) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.inner
            .submit(move |worker| Ok::<_, Infallible>(f(worker.resource())))
    }

    /// Queue a fallible function to run on the worker thread without
    /// blocking.
    pub fn try_invoke_async<F, T, E>(&self, f: F) -> Result<Task<T, E>, Error<E>>
    where
        F: FnOnce(&mut R) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.inner.submit(move |worker| f(worker.resource()))
    }

    /// Create a lazy blocking sequence over the iterator returned by `f`.
    /// Nothing is run until the first element is requested; the iterator
    /// is then created and advanced only on the worker thread.
    pub fn sequence<F, I>(&self, f: F) -> Sequence<R, IterCursor<I::IntoIter>>
    where
        F: FnOnce(&mut R) -> I + Send + 'static,
        I: IntoIterator,
        I::IntoIter: 'static,
        I::Item: Send + 'static,
    {
        self.sequence_cursor(move |resource| IterCursor::new(f(resource)))
    }

    /// Create a lazy blocking sequence over a custom [`Cursor`].
    pub fn sequence_cursor<F, C>(&self, f: F) -> Sequence<R, C>
    where
        F: FnOnce(&mut R) -> C + Send + 'static,
        C: Cursor<R>,
    {
        Sequence::new(
            Arc::downgrade(&self.inner),
            self.inner.allocate_cursor(),
            Box::new(f),
        )
    }

    /// Create a lazy asynchronous sequence over the iterator returned by `f`.
    pub fn async_sequence<F, I>(&self, f: F) -> AsyncSequence<R, IterCursor<I::IntoIter>>
    where
        F: FnOnce(&mut R) -> I + Send + 'static,
        I: IntoIterator,
        I::IntoIter: 'static,
        I::Item: Send + 'static,
    {
        self.async_sequence_cursor(move |resource| IterCursor::new(f(resource)))
    }

    /// Create a lazy asynchronous sequence over a custom [`Cursor`].
    pub fn async_sequence_cursor<F, C>(&self, f: F) -> AsyncSequence<R, C>
    where
        F: FnOnce(&mut R) -> C + Send + 'static,
        C: Cursor<R>,
    {
        AsyncSequence::new(
            Arc::downgrade(&self.inner),
            self.inner.allocate_cursor(),
            Box::new(f),
        )
    }

    /// Create a lazy asynchronous sequence over a `Stream` which is created
    /// and polled only on the worker thread.
    pub fn stream_sequence<F, S>(&self, f: F) -> AsyncSequence<R, StreamCursor<S>>
    where
        F: FnOnce(&mut R) -> S + Send + 'static,
        S: Stream + Unpin + 'static,
        S::Item: Send + 'static,
    {
        self.async_sequence_cursor(move |resource| StreamCursor::new(f(resource)))
    }

    /// Close the queue, let the worker finish all queued items, release
    /// outstanding cursors and the resource on the worker thread, and join
    /// it. Calling `dispose` again has no effect.
    pub fn dispose(&self) -> Result<(), Error> {
        self.shutdown(None).map(|_| ())
    }

    /// Dispose of the executor, passing the resource to `release` on the
    /// worker thread instead of dropping it, and return its result. Returns
    /// `Error::Closed` if the executor was already disposed.
    pub fn dispose_with<F, T>(&self, release: F) -> Result<T, Error>
    where
        F: FnOnce(R) -> T + Send + 'static,
        T: Send + 'static,
    {
        let (completion, task) = completion::<T, Infallible>();
        let release: ReleaseFn<R> = Box::new(move |resource| {
            let outcome = catch_unwind(AssertUnwindSafe(move || release(resource)))
                .map_err(|payload| Error::Panicked(Panic::new(payload)));
            completion.complete(outcome);
        });
        if self.shutdown(Some(release))? {
            task.wait()
        } else {
            Err(Error::Closed)
        }
    }

    fn shutdown(&self, release: Option<ReleaseFn<R>>) -> Result<bool, Error> {
        self.inner.check_blocking::<Infallible>()?;
        // held for the duration so that concurrent callers wait for the join
        let mut handle = lock(&self.handle);
        let join = match handle.take() {
            Some(join) => join,
            None => return Ok(false),
        };
        self.inner.set_state(DISPOSING);
        if let Some(release) = release {
            lock(&self.inner.release).replace(release);
        }
        self.inner.queue.close();
        debug!(
            thread = ?self.thread_name,
            pending = self.inner.queue.len(),
            "disposing executor"
        );
        let result = match join.join() {
            Ok(result) => result,
            Err(payload) => Err(Error::Panicked(Panic::new(payload))),
        };
        self.inner.set_state(DISPOSED);
        result.map(|()| true)
    }
}

impl<R> Debug for Executor<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("thread_name", &self.thread_name)
            .field("lifecycle", &self.inner.lifecycle())
            .finish()
    }
}

impl<R> Drop for Executor<R> {
    fn drop(&mut self) {
        if self.inner.on_worker_thread() {
            // cannot join from the worker itself: stop accepting work and
            // let the thread exit once the current item returns
            self.inner.set_state(DISPOSING);
            self.inner.queue.close();
            return;
        }
        let join = lock(&self.handle).take();
        if let Some(join) = join {
            self.inner.set_state(DISPOSING);
            self.inner.queue.close();
            match join.join() {
                Ok(Ok(())) => (),
                Ok(Err(err)) => warn!(error = %err, "error disposing executor"),
                Err(_) => warn!("worker thread panicked"),
            }
            self.inner.set_state(DISPOSED);
        }
    }
}
