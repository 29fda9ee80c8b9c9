use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use super::cursor::Cursor;
use super::error::{Error, Panic};

pub(crate) type CursorId = u64;

/// Consumes the resource at shutdown. Runs on the worker thread.
pub(crate) type ReleaseFn<R> = Box<dyn FnOnce(R) + Send>;

trait CursorSlot<R> {
    fn as_any(&mut self) -> &mut dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    fn release(self: Box<Self>, resource: &mut R) -> Result<(), String>;
}

struct Slot<C>(C);

impl<R, C: Cursor<R>> CursorSlot<R> for Slot<C> {
    fn as_any(&mut self) -> &mut dyn Any {
        &mut self.0
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        Box::new(self.0)
    }

    fn release(self: Box<Self>, resource: &mut R) -> Result<(), String> {
        Cursor::release(self.0, resource).map_err(|err| format!("{:?}", err))
    }
}

/// The state owned by the worker thread: the guarded resource and the table
/// of live cursors created from it.
pub(crate) struct Worker<R> {
    resource: R,
    cursors: BTreeMap<CursorId, Box<dyn CursorSlot<R>>>,
}

impl<R> Worker<R> {
    pub(crate) fn new(resource: R) -> Self {
        Self {
            resource,
            cursors: BTreeMap::new(),
        }
    }

    pub(crate) fn resource(&mut self) -> &mut R {
        &mut self.resource
    }

    pub(crate) fn cursor_count(&self) -> usize {
        self.cursors.len()
    }

    /// Run a cursor factory and store the result under an id allocated by
    /// the consumer.
    pub(crate) fn create_cursor<C, F>(&mut self, id: CursorId, factory: F)
    where
        C: Cursor<R>,
        F: FnOnce(&mut R) -> C,
    {
        let cursor = factory(&mut self.resource);
        self.cursors.insert(id, Box::new(Slot(cursor)));
    }

    pub(crate) fn advance_cursor<C: Cursor<R>>(
        &mut self,
        id: CursorId,
    ) -> Result<Option<C::Item>, C::Error> {
        let Self { resource, cursors } = self;
        match cursors
            .get_mut(&id)
            .and_then(|slot| slot.as_any().downcast_mut::<C>())
        {
            Some(cursor) => cursor.advance(resource),
            None => Ok(None),
        }
    }

    pub(crate) fn release_cursor<C: Cursor<R>>(&mut self, id: CursorId) -> Result<(), C::Error> {
        match self
            .cursors
            .remove(&id)
            .map(|slot| slot.into_any().downcast::<C>())
        {
            Some(Ok(cursor)) => Cursor::release(*cursor, &mut self.resource),
            _ => Ok(()),
        }
    }

    /// Release a cursor without reporting the outcome to a caller.
    pub(crate) fn discard_cursor(&mut self, id: CursorId) {
        if let Some(slot) = self.cursors.remove(&id) {
            if let Err(err) = slot.release(&mut self.resource) {
                warn!(cursor = id, error = %err, "error releasing discarded cursor");
            }
        }
    }

    /// Release all outstanding cursors, then the resource itself. Every step
    /// is attempted even if an earlier one fails; the first failure is
    /// returned.
    pub(crate) fn teardown(self, release: Option<ReleaseFn<R>>) -> Result<(), Error> {
        let Self {
            mut resource,
            cursors,
        } = self;
        let mut result = Ok(());
        for (id, slot) in cursors {
            let fault = match catch_unwind(AssertUnwindSafe(|| slot.release(&mut resource))) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(payload) => Panic::new(payload).to_string(),
            };
            warn!(cursor = id, error = %fault, "error releasing cursor at shutdown");
            if result.is_ok() {
                result = Err(Error::Teardown(fault));
            }
        }
        let released = catch_unwind(AssertUnwindSafe(move || match release {
            Some(release) => release(resource),
            None => drop(resource),
        }));
        if let Err(payload) = released {
            let panic = Panic::new(payload);
            warn!(error = %panic, "panic releasing resource");
            if result.is_ok() {
                result = Err(Error::Panicked(panic));
            }
        }
        result
    }
}
