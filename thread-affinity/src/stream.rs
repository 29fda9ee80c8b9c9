use std::fmt::{self, Debug, Formatter};
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures_core::stream::{FusedStream, Stream};

use super::cursor::Cursor;
use super::error::Error;
use super::executor::Inner;
use super::sequence::Factory;
use super::task::Task;
use super::worker::{CursorId, Worker};

enum State<R, C: Cursor<R>> {
    Unrealized(Factory<R, C>),
    Realizing(Task<(), C::Error>),
    Ready,
    Advancing(Task<Option<C::Item>, C::Error>),
    Releasing(Task<(), C::Error>),
    Exhausted,
}

impl<R, C: Cursor<R>> State<R, C> {
    fn name(&self) -> &'static str {
        match self {
            Self::Unrealized(_) => "Unrealized",
            Self::Realizing(_) => "Realizing",
            Self::Ready => "Ready",
            Self::Advancing(_) => "Advancing",
            Self::Releasing(_) => "Releasing",
            Self::Exhausted => "Exhausted",
        }
    }
}

/// The asynchronous counterpart of [`Sequence`](crate::Sequence).
///
/// Each step is queued on the executor without blocking, and the stream
/// resolves when the worker has completed it. At most one step is in flight
/// at a time: the pending step is held by the `AsyncSequence` itself, so a
/// dropped [`next`](AsyncSequence::next) future does not lose its element
/// and the following call picks up where it left off.
pub struct AsyncSequence<R: 'static, C: Cursor<R>> {
    inner: Weak<Inner<R>>,
    id: CursorId,
    state: State<R, C>,
}

impl<R: 'static, C: Cursor<R>> AsyncSequence<R, C> {
    pub(crate) fn new(inner: Weak<Inner<R>>, id: CursorId, factory: Factory<R, C>) -> Self {
        Self {
            inner,
            id,
            state: State::Unrealized(factory),
        }
    }

    /// Check if creation of the cursor has been submitted to the worker
    /// thread.
    pub fn is_realized(&self) -> bool {
        !matches!(self.state, State::Unrealized(_))
    }

    /// Check if the sequence has ended, been closed, or failed.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    /// Create a future which resolves to the next element of the sequence.
    pub fn next(&mut self) -> Next<'_, R, C> {
        Next { seq: self }
    }

    /// End the sequence early, releasing the cursor on the worker thread.
    /// Any step still in flight completes first and its result is discarded.
    pub async fn close(&mut self) -> Result<(), Error<C::Error>> {
        match mem::replace(&mut self.state, State::Exhausted) {
            State::Unrealized(_) | State::Exhausted => Ok(()),
            State::Releasing(task) => task.await,
            State::Realizing(_) | State::Ready | State::Advancing(_) => {
                let id = self.id;
                self.submit(move |worker| worker.release_cursor::<C>(id))?
                    .await
            }
        }
    }

    fn submit<T, F>(&self, f: F) -> Result<Task<T, C::Error>, Error<C::Error>>
    where
        F: FnOnce(&mut Worker<R>) -> Result<T, C::Error> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.upgrade().ok_or(Error::Closed)?;
        inner.submit(f)
    }

    fn poll_step(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<C::Item, Error<C::Error>>>> {
        let id = self.id;
        loop {
            match mem::replace(&mut self.state, State::Exhausted) {
                State::Exhausted => return Poll::Ready(None),
                State::Unrealized(factory) => {
                    match self.submit(move |worker| {
                        worker.create_cursor(id, factory);
                        Ok(())
                    }) {
                        Ok(task) => self.state = State::Realizing(task),
                        Err(err) => return Poll::Ready(Some(Err(err))),
                    }
                }
                State::Realizing(mut task) => match Pin::new(&mut task).poll(cx) {
                    Poll::Pending => {
                        self.state = State::Realizing(task);
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(())) => self.state = State::Ready,
                    Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(err))),
                },
                State::Ready => {
                    match self.submit(move |worker| worker.advance_cursor::<C>(id)) {
                        Ok(task) => self.state = State::Advancing(task),
                        Err(err) => return Poll::Ready(Some(Err(err))),
                    }
                }
                State::Advancing(mut task) => match Pin::new(&mut task).poll(cx) {
                    Poll::Pending => {
                        self.state = State::Advancing(task);
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(Some(item))) => {
                        self.state = State::Ready;
                        return Poll::Ready(Some(Ok(item)));
                    }
                    Poll::Ready(Ok(None)) => {
                        match self.submit(move |worker| worker.release_cursor::<C>(id)) {
                            Ok(task) => self.state = State::Releasing(task),
                            Err(err) => return Poll::Ready(Some(Err(err))),
                        }
                    }
                    Poll::Ready(Err(err)) => {
                        if let Some(inner) = self.inner.upgrade() {
                            inner.discard_cursor(id);
                        }
                        return Poll::Ready(Some(Err(err)));
                    }
                },
                State::Releasing(mut task) => match Pin::new(&mut task).poll(cx) {
                    Poll::Pending => {
                        self.state = State::Releasing(task);
                        return Poll::Pending;
                    }
                    Poll::Ready(Ok(())) => return Poll::Ready(None),
                    Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(err))),
                },
            }
        }
    }
}

impl<R: 'static, C: Cursor<R>> Debug for AsyncSequence<R, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AsyncSequence({}, {})", self.id, self.state.name())
    }
}

impl<R: 'static, C: Cursor<R>> Drop for AsyncSequence<R, C> {
    fn drop(&mut self) {
        match self.state {
            State::Realizing(_) | State::Ready | State::Advancing(_) => {
                // queued behind any step in flight
                if let Some(inner) = self.inner.upgrade() {
                    inner.discard_cursor(self.id);
                }
            }
            _ => (),
        }
    }
}

impl<R: 'static, C: Cursor<R>> Stream for AsyncSequence<R, C> {
    type Item = Result<C::Item, Error<C::Error>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_step(cx)
    }
}

impl<R: 'static, C: Cursor<R>> FusedStream for AsyncSequence<R, C> {
    fn is_terminated(&self) -> bool {
        self.is_exhausted()
    }
}

/// A `Future` representing the next element of an [`AsyncSequence`].
pub struct Next<'n, R: 'static, C: Cursor<R>> {
    seq: &'n mut AsyncSequence<R, C>,
}

impl<R: 'static, C: Cursor<R>> Debug for Next<'_, R, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Next").field(&self.seq).finish()
    }
}

impl<R: 'static, C: Cursor<R>> Future for Next<'_, R, C> {
    type Output = Option<Result<C::Item, Error<C::Error>>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.seq.poll_step(cx)
    }
}
