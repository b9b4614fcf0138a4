//! Single-instance guard
//! Exclusive non-blocking advisory lock held for the process lifetime

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Lock acquisition errors
#[derive(Debug, Error)]
pub enum LockError {
    #[error("another instance is already running (lock held on {0})")]
    AlreadyHeld(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Holds the exclusive advisory lock on the lock file.
///
/// The lock is taken non-blocking: a second instance fails fast instead of
/// queueing. Dropping the guard (or process exit) releases it.
#[derive(Debug)]
pub struct InstanceLock {
    // Held open for the lifetime of the guard; the kernel releases the
    // flock when the descriptor closes.
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock, writing the holder pid into the file
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self, LockError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        if let Err(err) = try_flock(&file) {
            if err.kind() == io::ErrorKind::WouldBlock {
                return Err(LockError::AlreadyHeld(path));
            }
            return Err(err.into());
        }

        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(lock = %path.display(), "acquired instance lock");

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(unix)]
fn try_flock(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_flock(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_writes_pid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rustfwd.lock");

        let lock = InstanceLock::acquire(&path).unwrap();
        assert_eq!(lock.path(), path);

        let pid: u32 = std::fs::read_to_string(&path)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[cfg(unix)]
    #[test]
    fn test_second_acquire_fails_fast() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rustfwd.lock");

        let _held = InstanceLock::acquire(&path).unwrap();
        let err = InstanceLock::acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::AlreadyHeld(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rustfwd.lock");

        drop(InstanceLock::acquire(&path).unwrap());
        let _reacquired = InstanceLock::acquire(&path).unwrap();
    }
}
