use std::convert::Infallible;
use std::fmt::{self, Debug, Formatter};

use futures_core::Stream;
use futures_lite::StreamExt;

use super::wait::block_on;

/// A stateful handle over a lazy sequence which is bound to the thread that
/// created it.
///
/// Cursors are created by a factory running on the worker thread of an
/// [`Executor`](crate::Executor) and are only ever advanced or released
/// there, so they are not required to be `Send`. Only the items and errors
/// they produce cross back to the consuming thread.
pub trait Cursor<R>: 'static {
    /// The element type of the sequence
    type Item: Send + 'static;
    /// The error produced by a failed step
    type Error: Debug + Send + 'static;

    /// Produce the next element, or `None` when the sequence is exhausted.
    fn advance(&mut self, resource: &mut R) -> Result<Option<Self::Item>, Self::Error>;

    /// Release any state held by the cursor. Called once, after exhaustion,
    /// after a failed step, or when the consumer closes the sequence early.
    fn release(self, resource: &mut R) -> Result<(), Self::Error>
    where
        Self: Sized,
    {
        let _ = resource;
        Ok(())
    }
}

/// Adapts any `Iterator` into a [`Cursor`] which ignores the resource.
pub struct IterCursor<I> {
    iter: I,
}

impl<I> IterCursor<I> {
    pub fn new<T>(iter: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            iter: iter.into_iter(),
        }
    }
}

impl<I> Debug for IterCursor<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "IterCursor({:p})", self)
    }
}

impl<R, I> Cursor<R> for IterCursor<I>
where
    I: Iterator + 'static,
    I::Item: Send + 'static,
{
    type Item = I::Item;
    type Error = Infallible;

    fn advance(&mut self, _resource: &mut R) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.iter.next())
    }
}

/// Adapts a `Stream` into a [`Cursor`]. Each step polls the stream to
/// completion on the worker thread, parking it while the stream is pending.
pub struct StreamCursor<S> {
    stream: S,
}

impl<S> StreamCursor<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }
}

impl<S> Debug for StreamCursor<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "StreamCursor({:p})", self)
    }
}

impl<R, S> Cursor<R> for StreamCursor<S>
where
    S: Stream + Unpin + 'static,
    S::Item: Send + 'static,
{
    type Item = S::Item;
    type Error = Infallible;

    fn advance(&mut self, _resource: &mut R) -> Result<Option<Self::Item>, Self::Error> {
        Ok(block_on(self.stream.next()))
    }
}
