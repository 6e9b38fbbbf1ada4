//! Working-directory lock that keeps two pipeline runs from building into the
//! same directory at once.
//!
//! Uses `flock` so the lock disappears with the holding process, even on crash.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use vmlite_shared::errors::{VmliteError, VmliteResult};

/// Exclusive lock on a vmlite working directory.
///
/// Released when dropped.
#[derive(Debug)]
pub struct WorkDirLock {
    file: File,
    path: PathBuf,
}

impl WorkDirLock {
    /// Acquire the lock without blocking.
    ///
    /// Fails with [`VmliteError::StateConflict`] when another run already
    /// holds the directory.
    pub fn acquire(workdir: &Path) -> VmliteResult<Self> {
        std::fs::create_dir_all(workdir).map_err(|e| {
            VmliteError::Storage(format!(
                "failed to create working dir {}: {}",
                workdir.display(),
                e
            ))
        })?;

        let lock_path = workdir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| VmliteError::Storage(format!("failed to open lock file: {}", e)))?;

        use std::os::unix::io::AsRawFd;
        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if result != 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                return Err(VmliteError::StateConflict(format!(
                    "another vmlite run is already using directory: {}",
                    workdir.display()
                )));
            }
            return Err(VmliteError::Storage(format!(
                "failed to acquire lock: {}",
                err
            )));
        }

        tracing::debug!(lock_path = %lock_path.display(), "Acquired working-dir lock");

        Ok(Self {
            file,
            path: lock_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkDirLock {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        tracing::debug!(lock_path = %self.path.display(), "Released working-dir lock");
    }
}
