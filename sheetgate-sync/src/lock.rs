//! Single-instance lock file.
//!
//! The lock is a file holding the owner's PID, created with `create_new` so
//! that two runs can never both succeed. An existing file always means
//! "locked": its contents are not inspected and there is no expiry, so a lock
//! left behind by a crashed run has to be removed by hand.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};

#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl LockFile {
    pub fn acquire(path: &Path) -> Result<Self, SyncError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(SyncError::Locked {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(io_err(path, e)),
        };

        let pid = std::process::id();
        let lock = Self {
            path: path.to_path_buf(),
            pid,
            released: false,
        };
        // On failure the partially written lock is removed by Drop.
        writeln!(file, "{pid}").map_err(|e| io_err(path, e))?;
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Remove the lock file, reporting failure. Dropping the lock also
    /// removes it, silently.
    pub fn release(mut self) -> Result<(), SyncError> {
        self.released = true;
        std::fs::remove_file(&self.path).map_err(|e| io_err(&self.path, e))
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            }
        }
    }
}
