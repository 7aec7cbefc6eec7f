//! File-system snapshot persistence.

use super::PersistenceAdapter;
use crate::error::Result;

use fs4::fs_std::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// Persists snapshots as files in a directory, one file per snapshot name.
/// Takes out an exclusive lock on a `.lock` file in the directory until the
/// adapter is dropped, or errors if the lock is already held, so two
/// processes can't clobber each other's snapshots.
///
/// Saves write to a temporary file, sync it, then rename it over the
/// previous snapshot, so a crash mid-save leaves the old snapshot intact.
pub struct FileAdapter {
    dir: PathBuf,
    _lock: File,
}

impl FileAdapter {
    /// Opens (creating if necessary) a snapshot directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let lock = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(".lock"))?;
        lock.try_lock_exclusive()?;
        log::info!("Opened snapshot directory {}", dir.display());
        Ok(Self { dir, _lock: lock })
    }
}

impl PersistenceAdapter for FileAdapter {
    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.dir.join(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
