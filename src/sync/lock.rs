//! Advisory, process-exclusive run lock.
//!
//! One lock file per beads directory. Acquisition never blocks: if another
//! process holds the lock the run fails before touching either store.

use crate::error::{Result, SyncError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lock filename inside the beads directory.
pub const LOCK_FILE: &str = "clickup-sync.lock";

/// Held for the lifetime of a run; released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock for `beads_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::SyncInProgress`] if another run holds the lock, or
    /// an I/O error if the lock file cannot be opened.
    pub fn acquire(beads_dir: &Path) -> Result<Self> {
        fs::create_dir_all(beads_dir)?;
        let dir = dunce::canonicalize(beads_dir)?;
        let path = dir.join(LOCK_FILE);

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(SyncError::SyncInProgress { path });
        }

        // Owner pid, for humans inspecting a stuck lock.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        debug!(path = %path.display(), "run lock acquired");
        Ok(Self { file, path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %err, "failed to release run lock");
        } else {
            debug!(path = %self.path.display(), "run lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_fails_while_held() {
        let temp = TempDir::new().expect("tempdir");
        let first = RunLock::acquire(temp.path()).expect("first lock");

        let err = RunLock::acquire(temp.path()).expect_err("second lock must fail");
        assert!(matches!(err, SyncError::SyncInProgress { .. }));

        drop(first);
        RunLock::acquire(temp.path()).expect("lock after release");
    }

    #[test]
    fn lock_file_records_owner_pid() {
        let temp = TempDir::new().expect("tempdir");
        let lock = RunLock::acquire(temp.path()).expect("lock");
        let contents = fs::read_to_string(lock.path()).expect("read lock");
        assert_eq!(contents.trim(), std::process::id().to_string());
    }
}
