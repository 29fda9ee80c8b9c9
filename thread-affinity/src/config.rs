use super::error::Error;
use super::executor::Executor;

/// The worker thread name used when none is configured.
pub const DEFAULT_THREAD_NAME: &str = "affinity-worker";

/// Configuration for the worker thread of an [`Executor`].
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    pub(crate) thread_name: Option<String>,
    pub(crate) stack_size: Option<usize>,
}

impl ExecutorConfig {
    pub fn new() -> Self {
        Self {
            thread_name: Some(DEFAULT_THREAD_NAME.to_owned()),
            stack_size: None,
        }
    }

    /// Set the name of the worker thread.
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.thread_name.replace(name.into());
        self
    }

    /// Leave the worker thread unnamed.
    pub fn unnamed(mut self) -> Self {
        self.thread_name.take();
        self
    }

    /// Set the stack size of the worker thread in bytes. A value of zero
    /// restores the platform default.
    pub fn stack_size(mut self, val: usize) -> Self {
        if val > 0 {
            self.stack_size.replace(val);
        } else {
            self.stack_size.take();
        }
        self
    }

    /// Start the worker thread and construct the resource on it.
    pub fn build<R, F>(self, ctor: F) -> Result<Executor<R>, Error>
    where
        F: FnOnce() -> R + Send + 'static,
        R: 'static,
    {
        Executor::spawn(self, move || Ok(ctor()))
    }

    /// Start the worker thread and construct the resource on it, returning
    /// the constructor's error if it fails.
    pub fn try_build<R, E, F>(self, ctor: F) -> Result<Executor<R>, Error<E>>
    where
        F: FnOnce() -> Result<R, E> + Send + 'static,
        R: 'static,
        E: Send + 'static,
    {
        Executor::spawn(self, ctor)
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::new()
    }
}
