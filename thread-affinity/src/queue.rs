use std::sync::OnceLock;
use std::thread::{self, Thread};

use concurrent_queue::{ConcurrentQueue, PopError, PushError};

use super::worker::Worker;

/// A unit of deferred work. The completion signal for the submitter is
/// captured inside the closure.
pub(crate) type WorkItem<R> = Box<dyn FnOnce(&mut Worker<R>) + Send>;

/// An unbounded multi-producer, single-consumer queue of work items.
///
/// The consumer is the worker thread, which parks while the queue is empty
/// and is unparked by each successful push.
pub(crate) struct WorkQueue<R> {
    items: ConcurrentQueue<WorkItem<R>>,
    consumer: OnceLock<Thread>,
}

impl<R> WorkQueue<R> {
    pub fn new() -> Self {
        Self {
            items: ConcurrentQueue::unbounded(),
            consumer: OnceLock::new(),
        }
    }

    /// Register the current thread as the consumer. Must be called on the
    /// worker thread before the first `recv`.
    pub fn register_consumer(&self) {
        let _ = self.consumer.set(thread::current());
    }

    pub fn consumer(&self) -> Option<&Thread> {
        self.consumer.get()
    }

    /// Enqueue a work item. Fails with the item if the queue is closed.
    pub fn push(&self, item: WorkItem<R>) -> Result<(), WorkItem<R>> {
        match self.items.push(item) {
            Ok(()) => {
                self.wake_consumer();
                Ok(())
            }
            Err(PushError::Closed(item)) | Err(PushError::Full(item)) => Err(item),
        }
    }

    /// Wait for the next work item. Returns `None` once the queue is closed
    /// and all remaining items have been delivered.
    pub fn recv(&self) -> Option<WorkItem<R>> {
        loop {
            match self.items.pop() {
                Ok(item) => break Some(item),
                Err(PopError::Closed) => break None,
                // a push or close after this point leaves an unpark token,
                // so the park returns immediately
                Err(PopError::Empty) => thread::park(),
            }
        }
    }

    /// Stop accepting new items. Returns `true` if this call closed the queue.
    pub fn close(&self) -> bool {
        let closed = self.items.close();
        self.wake_consumer();
        closed
    }

    /// Drop any remaining items without running them. Their submitters
    /// observe `Error::Canceled`.
    pub fn clear(&self) -> usize {
        let mut count = 0;
        while self.items.pop().is_ok() {
            count += 1;
        }
        count
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    fn wake_consumer(&self) {
        if let Some(thread) = self.consumer.get() {
            thread.unpark();
        }
    }
}
