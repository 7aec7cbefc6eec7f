//! In-memory snapshot persistence, for tests and ephemeral maps.

use super::PersistenceAdapter;
use crate::error::Result;

use std::collections::HashMap;

/// Keeps snapshots in a process-local table. Contents are lost when the
/// adapter is dropped.
#[derive(Default)]
pub struct MemoryAdapter {
    snapshots: HashMap<String, Vec<u8>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        self.snapshots.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.snapshots.get(name).cloned())
    }
}
