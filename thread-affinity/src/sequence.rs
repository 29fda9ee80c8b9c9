use std::fmt::{self, Debug, Formatter};
use std::iter::FusedIterator;
use std::mem;
use std::sync::Weak;

use super::cursor::Cursor;
use super::error::Error;
use super::executor::Inner;
use super::worker::{CursorId, Worker};

/// Creates a cursor from the resource. Runs on the worker thread.
pub(crate) type Factory<R, C> = Box<dyn FnOnce(&mut R) -> C + Send>;

enum State<R, C> {
    Unrealized(Factory<R, C>),
    Realized,
    Exhausted,
}

/// A lazy sequence whose cursor lives on the worker thread of an
/// [`Executor`](crate::Executor).
///
/// Nothing is submitted to the executor until the first element is
/// requested. Each call to [`get_next`](Sequence::get_next) then parks the
/// current thread for one round trip through the work queue, so elements
/// are produced one at a time in order with all other submitted work.
///
/// A `Sequence` is single-pass. After it reports exhaustion or a failure,
/// every later call returns `Ok(None)` without touching the executor.
pub struct Sequence<R: 'static, C: Cursor<R>> {
    inner: Weak<Inner<R>>,
    id: CursorId,
    state: State<R, C>,
}

impl<R: 'static, C: Cursor<R>> Sequence<R, C> {
    pub(crate) fn new(inner: Weak<Inner<R>>, id: CursorId, factory: Factory<R, C>) -> Self {
        Self {
            inner,
            id,
            state: State::Unrealized(factory),
        }
    }

    /// Check if the cursor has been created on the worker thread.
    pub fn is_realized(&self) -> bool {
        !matches!(self.state, State::Unrealized(_))
    }

    /// Check if the sequence has ended, been closed, or failed.
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, State::Exhausted)
    }

    /// Produce the next element, parking the current thread until the
    /// worker has advanced the cursor.
    ///
    /// A failed step is returned as an error and ends the sequence; it is
    /// not retried.
    pub fn get_next(&mut self) -> Result<Option<C::Item>, Error<C::Error>> {
        self.check_blocking()?;
        let id = self.id;
        match mem::replace(&mut self.state, State::Exhausted) {
            State::Exhausted => return Ok(None),
            State::Realized => (),
            State::Unrealized(factory) => {
                self.invoke(move |worker| {
                    worker.create_cursor(id, factory);
                    Ok(())
                })?;
            }
        }
        match self.invoke(move |worker| worker.advance_cursor::<C>(id)) {
            Ok(Some(item)) => {
                self.state = State::Realized;
                Ok(Some(item))
            }
            Ok(None) => self.release().map(|()| None),
            Err(err) => {
                if let Some(inner) = self.inner.upgrade() {
                    inner.discard_cursor(id);
                }
                Err(err)
            }
        }
    }

    /// End the sequence early, releasing the cursor on the worker thread.
    pub fn close(&mut self) -> Result<(), Error<C::Error>> {
        self.check_blocking()?;
        match mem::replace(&mut self.state, State::Exhausted) {
            State::Realized => self.release(),
            _ => Ok(()),
        }
    }

    /// Reject a blocking call from the worker thread, leaving the state
    /// untouched.
    fn check_blocking(&self) -> Result<(), Error<C::Error>> {
        match self.inner.upgrade() {
            Some(inner) => inner.check_blocking(),
            None => Ok(()),
        }
    }

    fn release(&self) -> Result<(), Error<C::Error>> {
        let id = self.id;
        self.invoke(move |worker| worker.release_cursor::<C>(id))
    }

    fn invoke<T, F>(&self, f: F) -> Result<T, Error<C::Error>>
    where
        F: FnOnce(&mut Worker<R>) -> Result<T, C::Error> + Send + 'static,
        T: Send + 'static,
    {
        let task = {
            let inner = self.inner.upgrade().ok_or(Error::Closed)?;
            inner.check_blocking::<C::Error>()?;
            inner.submit(f)?
        };
        task.wait()
    }
}

impl<R: 'static, C: Cursor<R>> Debug for Sequence<R, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Unrealized(_) => "Unrealized",
            State::Realized => "Realized",
            State::Exhausted => "Exhausted",
        };
        write!(f, "Sequence({}, {})", self.id, state)
    }
}

impl<R: 'static, C: Cursor<R>> Drop for Sequence<R, C> {
    fn drop(&mut self) {
        if let State::Realized = self.state {
            if let Some(inner) = self.inner.upgrade() {
                inner.discard_cursor(self.id);
            }
        }
    }
}

impl<R: 'static, C: Cursor<R>> Iterator for Sequence<R, C> {
    type Item = Result<C::Item, Error<C::Error>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.get_next().transpose()
    }
}

impl<R: 'static, C: Cursor<R>> FusedIterator for Sequence<R, C> {}
