use std::convert::Infallible;
use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures_channel::oneshot;
use futures_core::FusedFuture;

use super::error::Error;
use super::wait::{block_on, block_on_deadline};

pub(crate) type Outcome<T, E> = Result<T, Error<E>>;

pub(crate) fn completion<T, E>() -> (Completion<T, E>, Task<T, E>) {
    let (sender, receiver) = oneshot::channel();
    (
        Completion { sender },
        Task {
            receiver,
            done: false,
        },
    )
}

/// The sending half of a completion signal, held by a work item.
pub(crate) struct Completion<T, E> {
    sender: oneshot::Sender<Outcome<T, E>>,
}

impl<T, E> Completion<T, E> {
    /// Deliver the outcome. Returns `false` if the `Task` was dropped and
    /// the outcome was discarded.
    pub fn complete(self, outcome: Outcome<T, E>) -> bool {
        self.sender.send(outcome).is_ok()
    }
}

/// The pending result of a work item submitted to an
/// [`Executor`](crate::Executor).
///
/// A `Task` may be awaited as a `Future`, or resolved by parking the current
/// thread using one of the `wait` methods. Dropping the `Task` does not
/// cancel the work item: it still runs on the worker thread and its result is
/// discarded.
#[must_use = "Task must be awaited"]
pub struct Task<T, E = Infallible> {
    receiver: oneshot::Receiver<Outcome<T, E>>,
    done: bool,
}

impl<T, E> Task<T, E> {
    /// Park the current thread until the result is available.
    pub fn wait(self) -> Result<T, Error<E>> {
        block_on(self)
    }

    /// Park the current thread until the result is available or the
    /// deadline is reached. On expiry `Error::TimedOut` is returned and the
    /// result of the work item, once produced, is discarded.
    pub fn wait_deadline(self, expire: Instant) -> Result<T, Error<E>> {
        block_on_deadline(self, expire).unwrap_or_else(|_| Err(Error::TimedOut))
    }

    /// Park the current thread until the result is available or the timeout
    /// expires.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, Error<E>> {
        match Instant::now().checked_add(timeout) {
            Some(expire) => self.wait_deadline(expire),
            None => self.wait(),
        }
    }
}

impl<T, E> Debug for Task<T, E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Task({:p})", self)
    }
}

impl<T, E> Future for Task<T, E> {
    type Output = Result<T, Error<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if self.done {
            return Poll::Pending;
        }
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(result) => {
                self.done = true;
                Poll::Ready(result.unwrap_or(Err(Error::Canceled)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T, E> FusedFuture for Task<T, E> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_complete() {
        let (sender, task) = completion::<u32, ()>();
        assert!(sender.complete(Ok(5)));
        assert_eq!(task.wait().ok(), Some(5));
    }

    #[test]
    fn task_canceled() {
        let (sender, task) = completion::<u32, ()>();
        drop(sender);
        assert!(matches!(task.wait(), Err(Error::Canceled)));
    }

    #[test]
    fn task_dropped() {
        let (sender, task) = completion::<u32, ()>();
        drop(task);
        assert!(!sender.complete(Ok(1)));
    }

    #[test]
    fn task_timeout() {
        let (_sender, task) = completion::<u32, ()>();
        assert!(matches!(
            task.wait_timeout(Duration::from_millis(10)),
            Err(Error::TimedOut)
        ));
    }
}
