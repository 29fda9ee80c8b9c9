use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub struct AtomicCounter {
    count: AtomicUsize,
}

#[allow(unused)]
impl AtomicCounter {
    pub fn new(val: usize) -> Self {
        Self {
            count: AtomicUsize::new(val),
        }
    }

    /// Increment the counter, returning the previous value.
    pub fn next(&self) -> usize {
        self.count.fetch_add(1, Ordering::SeqCst)
    }

    pub fn increment(&self) -> usize {
        self.next() + 1
    }

    pub fn value(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

impl Default for AtomicCounter {
    fn default() -> Self {
        Self::new(0)
    }
}

/// An append-only record of events shared between threads.
pub struct EventLog<T> {
    events: Mutex<Vec<T>>,
}

#[allow(unused)]
impl<T: Clone> EventLog<T> {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, event: T) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<T> {
        self.events.lock().unwrap().clone()
    }
}
