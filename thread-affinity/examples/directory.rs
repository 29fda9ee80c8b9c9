//! A toy directory service whose session handle cannot leave the thread that
//! opened it. Run with `RUST_LOG=debug` to see the worker lifecycle.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use std::thread;

use futures_executor::block_on;
use futures_lite::StreamExt;
use tracing_subscriber::EnvFilter;

use thread_affinity::{Cursor, Error, ExecutorConfig};

#[derive(Debug)]
enum DirectoryError {
    Exists(String),
    SessionClosed,
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists(name) => write!(f, "entry exists: {}", name),
            Self::SessionClosed => f.write_str("session closed"),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Entries shared with open listings through a non-atomic handle.
struct Directory {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
    open: bool,
}

impl Directory {
    fn open() -> Result<Self, DirectoryError> {
        tracing::info!(thread = ?thread::current().name(), "opened directory session");
        Ok(Self {
            entries: Rc::new(RefCell::new(BTreeMap::new())),
            open: true,
        })
    }

    fn add(&mut self, name: &str, value: &str) -> Result<(), DirectoryError> {
        if !self.open {
            return Err(DirectoryError::SessionClosed);
        }
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(name) {
            return Err(DirectoryError::Exists(name.to_owned()));
        }
        entries.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    fn list(&self, prefix: &str) -> Listing {
        Listing {
            entries: self.entries.clone(),
            prefix: prefix.to_owned(),
            last: None,
        }
    }

    fn close(mut self) -> usize {
        self.open = false;
        let count = self.entries.borrow().len();
        tracing::info!(count, "closed directory session");
        count
    }
}

/// Walks entries by key, re-reading the shared map on every step.
struct Listing {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
    prefix: String,
    last: Option<String>,
}

impl Cursor<Directory> for Listing {
    type Item = (String, String);
    type Error = DirectoryError;

    fn advance(&mut self, dir: &mut Directory) -> Result<Option<Self::Item>, Self::Error> {
        if !dir.open {
            return Err(DirectoryError::SessionClosed);
        }
        let entries = self.entries.borrow();
        let next = entries
            .iter()
            .filter(|(name, _)| self.last.as_ref().map(|l| *name > l).unwrap_or(true))
            .find(|(name, _)| name.starts_with(&self.prefix))
            .map(|(name, value)| (name.clone(), value.clone()));
        self.last = next.as_ref().map(|(name, _)| name.clone());
        Ok(next)
    }

    fn release(self, _dir: &mut Directory) -> Result<(), Self::Error> {
        tracing::debug!(prefix = %self.prefix, "listing released");
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let exec = ExecutorConfig::new()
        .thread_name("directory")
        .try_build(Directory::open)?;

    exec.try_invoke(|dir| dir.add("users/alice", "admin"))?;
    exec.try_invoke(|dir| dir.add("users/bob", "staff"))?;
    exec.try_invoke(|dir| dir.add("groups/ops", "alice,bob"))?;
    match exec.try_invoke(|dir| dir.add("users/bob", "guest")) {
        Err(Error::Failed(err)) => println!("rejected: {}", err),
        other => println!("unexpected: {:?}", other),
    }

    for entry in exec.sequence_cursor(|dir| dir.list("users/")) {
        let (name, value) = entry?;
        println!("{} = {}", name, value);
    }

    let groups: Vec<_> = block_on(
        exec.async_sequence_cursor(|dir| dir.list("groups/"))
            .map(|entry| entry.map(|(name, _)| name))
            .collect::<Vec<_>>(),
    )
    .into_iter()
    .collect::<Result<_, _>>()?;
    println!("groups: {:?}", groups);

    let count = exec.dispose_with(Directory::close)?;
    println!("closed with {} entries", count);
    Ok(())
}
