//! PID lock for the local store
//!
//! sled refuses concurrent opens of the same directory; the lock turns that
//! into a clear startup error naming the PID that holds the store.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    const LOCK_FILE_NAME: &'static str = ".bedwatch.lock";

    /// Take the lock in `data_dir`, creating the directory if needed.
    /// A lock left by a process that is no longer running is replaced.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let lock_path = data_dir.join(Self::LOCK_FILE_NAME);
        if lock_path.exists() {
            match Self::holder(&lock_path) {
                Some(pid) => bail!(
                    "Local store {} is in use by bedwatch (PID {pid}); stop it or remove {}",
                    data_dir.display(),
                    lock_path.display()
                ),
                None => {
                    tracing::info!(path = %lock_path.display(), "Replacing stale lock file");
                    fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                }
            }
        }

        let pid = std::process::id();
        fs::write(&lock_path, format!("{pid}\n"))
            .with_context(|| format!("Failed to write lock file {}", lock_path.display()))?;
        tracing::debug!(pid, path = %lock_path.display(), "Acquired store lock");

        Ok(Self { lock_path, owned: true })
    }

    /// PID of a live bedwatch process holding the lock, if any
    fn holder(lock_path: &Path) -> Option<u32> {
        let pid: u32 = fs::read_to_string(lock_path).ok()?.trim().parse().ok()?;
        Self::is_bedwatch(pid).then_some(pid)
    }

    #[cfg(unix)]
    fn is_bedwatch(pid: u32) -> bool {
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .map(|cmdline| cmdline.contains("bedwatch"))
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_bedwatch(_pid: u32) -> bool {
        true
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    pub fn release(&mut self) {
        if !self.owned {
            return;
        }
        if let Err(e) = fs::remove_file(&self.lock_path) {
            tracing::warn!(error = %e, "Failed to remove lock file");
        }
        self.owned = false;
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_lock_written_and_released() {
        let dir = tempdir().unwrap();
        let path = {
            let lock = ProcessLock::acquire(dir.path()).unwrap();
            let pid: u32 = fs::read_to_string(lock.path()).unwrap().trim().parse().unwrap();
            assert_eq!(pid, std::process::id());
            lock.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_and_garbage_locks_replaced() {
        let dir = tempdir().unwrap();
        let lock_path = dir.path().join(ProcessLock::LOCK_FILE_NAME);

        fs::write(&lock_path, "999999999\n").unwrap();
        drop(ProcessLock::acquire(dir.path()).unwrap());

        fs::write(&lock_path, "not a pid").unwrap();
        let lock = ProcessLock::acquire(dir.path()).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let _lock = ProcessLock::acquire(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
