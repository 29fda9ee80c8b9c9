use std::any::Any;
use std::convert::Infallible;
use std::fmt::{self, Debug, Display, Formatter};
use std::io;
use std::panic;

/// The payload of a panic captured on the worker thread.
pub struct Panic {
    payload: Box<dyn Any + Send + 'static>,
}

impl Panic {
    pub(crate) fn new(payload: Box<dyn Any + Send + 'static>) -> Self {
        Self { payload }
    }

    /// Get the panic message, if the payload was a string.
    pub fn message(&self) -> Option<&str> {
        if let Some(msg) = self.payload.downcast_ref::<&'static str>() {
            Some(msg)
        } else if let Some(msg) = self.payload.downcast_ref::<String>() {
            Some(msg.as_str())
        } else {
            None
        }
    }

    /// Unwrap the original panic payload.
    pub fn into_payload(self) -> Box<dyn Any + Send + 'static> {
        self.payload
    }

    /// Continue unwinding on the current thread with the original payload.
    pub fn resume(self) -> ! {
        panic::resume_unwind(self.payload)
    }
}

impl Debug for Panic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => f.debug_tuple("Panic").field(&msg).finish(),
            None => write!(f, "Panic(<opaque>)"),
        }
    }
}

impl Display for Panic {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message().unwrap_or("<opaque panic payload>"))
    }
}

/// An error returned by an executor operation.
///
/// The type parameter carries the error produced by a fallible action or
/// cursor, and defaults to [`Infallible`] for operations which cannot fail
/// on their own.
pub enum Error<E = Infallible> {
    /// The completion signal was dropped before a result was sent
    Canceled,
    /// The executor is disposing or has been disposed
    Closed,
    /// Wraps an error result from a fallible action or cursor
    Failed(E),
    /// The action panicked on the worker thread
    Panicked(Panic),
    /// A blocking call was made from the worker thread itself
    Reentrant,
    /// The worker thread could not be started
    Spawn(io::Error),
    /// Releasing outstanding cursors failed during shutdown
    Teardown(String),
    /// The deadline expired before the action completed
    TimedOut,
}

impl<E> Error<E> {
    /// Check if this error was caused by the executor shutting down.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if this error was caused by a panic on the worker thread.
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Extract the wrapped action error, if any.
    pub fn into_failed(self) -> Option<E> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Map the wrapped action error using a transformation function.
    pub fn map_failed<F, R>(self, f: F) -> Error<R>
    where
        F: FnOnce(E) -> R,
    {
        match self {
            Self::Canceled => Error::Canceled,
            Self::Closed => Error::Closed,
            Self::Failed(err) => Error::Failed(f(err)),
            Self::Panicked(panic) => Error::Panicked(panic),
            Self::Reentrant => Error::Reentrant,
            Self::Spawn(err) => Error::Spawn(err),
            Self::Teardown(msg) => Error::Teardown(msg),
            Self::TimedOut => Error::TimedOut,
        }
    }
}

impl Error<Infallible> {
    /// Widen an infallible error into one carrying an action error type.
    pub fn cast<E>(self) -> Error<E> {
        self.map_failed(|never| match never {})
    }
}

impl<E: Debug> Debug for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self {
            Self::Canceled => write!(f, "Error::Canceled"),
            Self::Closed => write!(f, "Error::Closed"),
            Self::Failed(err) => f.debug_tuple("Error::Failed").field(err).finish(),
            Self::Panicked(panic) => f.debug_tuple("Error::Panicked").field(panic).finish(),
            Self::Reentrant => write!(f, "Error::Reentrant"),
            Self::Spawn(err) => f.debug_tuple("Error::Spawn").field(err).finish(),
            Self::Teardown(msg) => f.debug_tuple("Error::Teardown").field(msg).finish(),
            Self::TimedOut => write!(f, "Error::TimedOut"),
        }
    }
}

impl<E: Display> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self {
            Self::Canceled => write!(f, "The work item was dropped before completion"),
            Self::Closed => write!(f, "The executor is closed"),
            Self::Failed(err) => write!(f, "Action error: {}", err),
            Self::Panicked(panic) => write!(f, "Action panicked: {}", panic),
            Self::Reentrant => write!(f, "Cannot block on the executor from its worker thread"),
            Self::Spawn(err) => write!(f, "Error starting worker thread: {}", err),
            Self::Teardown(msg) => write!(f, "Error releasing cursors: {}", msg),
            Self::TimedOut => write!(f, "The request timed out"),
        }
    }
}

impl<E: Debug + Display> std::error::Error for Error<E> {}

impl<E> From<Panic> for Error<E> {
    fn from(panic: Panic) -> Self {
        Self::Panicked(panic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message() {
        let panic = Panic::new(Box::new("oops"));
        assert_eq!(panic.message(), Some("oops"));
        let panic = Panic::new(Box::new(String::from("formatted")));
        assert_eq!(panic.message(), Some("formatted"));
        let panic = Panic::new(Box::new(5u32));
        assert_eq!(panic.message(), None);
        assert_eq!(format!("{:?}", panic), "Panic(<opaque>)");
    }

    #[test]
    fn error_cast() {
        let err: Error<String> = Error::Closed.cast();
        assert!(err.is_closed());
        let err: Error<u32> = Error::Failed(3u32);
        assert_eq!(err.map_failed(|e| e * 2).into_failed(), Some(6));
        assert_eq!(Error::<u32>::TimedOut.to_string(), "The request timed out");
    }
}
