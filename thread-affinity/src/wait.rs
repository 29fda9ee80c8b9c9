use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};
use std::time::Instant;

use futures_task::{waker, ArcWake};

struct ThreadWaker(Thread);

impl ArcWake for ThreadWaker {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.0.unpark()
    }
}

thread_local! {
    static THREAD_WAKER: Waker = waker(Arc::new(ThreadWaker(thread::current())));
}

/// Evaluate a `Future`, parking the current thread until it is resolved.
pub(crate) fn block_on<F>(fut: F) -> F::Output
where
    F: Future,
{
    futures_lite::pin!(fut);
    THREAD_WAKER.with(|waker| {
        let mut cx = Context::from_waker(waker);
        loop {
            match fut.as_mut().poll(&mut cx) {
                Poll::Ready(result) => break result,
                Poll::Pending => thread::park(),
            }
        }
    })
}

/// Evaluate a `Future`, parking the current thread until it is resolved or
/// the deadline passes. On expiry the future is returned unresolved.
pub(crate) fn block_on_deadline<F>(mut fut: F, expire: Instant) -> Result<F::Output, F>
where
    F: Future + Unpin,
{
    let result = THREAD_WAKER.with(|waker| {
        let mut cx = Context::from_waker(waker);
        loop {
            match Pin::new(&mut fut).poll(&mut cx) {
                Poll::Ready(result) => break Some(result),
                Poll::Pending => match expire.checked_duration_since(Instant::now()) {
                    Some(dur) => thread::park_timeout(dur),
                    None => break None,
                },
            }
        }
    });
    result.ok_or(fut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn block_on_ready() {
        assert_eq!(block_on(async { 25 }), 25);
    }

    #[test]
    fn block_on_deadline_expires() {
        let pending = futures_lite::future::pending::<()>();
        let expire = Instant::now() + Duration::from_millis(20);
        assert!(block_on_deadline(pending, expire).is_err());
        assert!(Instant::now() >= expire);
    }
}
