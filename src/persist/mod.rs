//! Snapshot persistence.
//!
//! The map itself is purely in-memory; persistence is a narrow adapter
//! interface it calls strictly between operations, either explicitly
//! (`save`/`load`) or on a periodic tick drained after mutations.

mod file;
mod memory;

pub use file::FileAdapter;
pub use memory::MemoryAdapter;

use crate::errinput;
use crate::error::Result;

use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Stores and retrieves snapshot blobs by name. Implementations own their
/// handles (open files, in-memory tables) and their lifecycle.
pub trait PersistenceAdapter {
    /// Persists a snapshot under the given name, replacing any previous one.
    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<()>;

    /// Retrieves the snapshot saved under the given name, or None if nothing
    /// has been saved yet. Missing storage is not an error.
    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>>;
}

/// Which adapter to persist through.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Backend {
    /// A directory of snapshot files.
    File,
    /// An in-process table, for tests and ephemeral maps.
    Memory,
    /// File when a path is configured, memory otherwise.
    #[default]
    Auto,
}

/// Persistence configuration for a map.
#[derive(Clone, Debug)]
pub struct PersistOptions {
    pub backend: Backend,
    /// Directory for the file backend.
    pub path: Option<PathBuf>,
    /// The name snapshots are saved under.
    pub name: String,
    /// Save automatically at this interval, drained between operations.
    pub save_interval: Option<Duration>,
    /// Load an existing snapshot when the map is opened.
    pub load_on_open: bool,
}

impl PersistOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            backend: Backend::Auto,
            path: None,
            name: name.into(),
            save_interval: None,
            load_on_open: true,
        }
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = Some(interval);
        self
    }

    pub fn with_load_on_open(mut self, load: bool) -> Self {
        self.load_on_open = load;
        self
    }
}

/// A configured adapter plus its periodic save tick. The tick receiver is
/// the save schedule's handle; dropping it (with the map) stops the
/// schedule.
pub(crate) struct Persistence {
    pub adapter: Box<dyn PersistenceAdapter>,
    pub name: String,
    ticker: Option<crossbeam::channel::Receiver<Instant>>,
}

impl Persistence {
    pub fn open(options: PersistOptions) -> Result<Self> {
        let adapter: Box<dyn PersistenceAdapter> = match (options.backend, &options.path) {
            (Backend::File | Backend::Auto, Some(path)) => Box::new(FileAdapter::new(path)?),
            (Backend::File, None) => return errinput!("file persistence requires a path"),
            (Backend::Memory | Backend::Auto, _) => Box::new(MemoryAdapter::new()),
        };
        let ticker = options.save_interval.map(crossbeam::channel::tick);
        Ok(Self { adapter, name: options.name, ticker })
    }

    /// True if automatic saving is configured.
    pub fn autosaves(&self) -> bool {
        self.ticker.is_some()
    }

    /// Drains the save tick, returning true if at least one interval has
    /// elapsed since the last drain.
    pub fn save_due(&mut self) -> bool {
        let Some(ticker) = &self.ticker else { return false };
        let mut due = false;
        while ticker.try_recv().is_ok() {
            due = true;
        }
        due
    }
}
