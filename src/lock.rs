//! Cross-process device lock.
//!
//! Several processes on the rig may want the sensor bus (the controller, the
//! healthcheck, ad-hoc CLI reads). A `flock`ed file serializes them; the
//! guard releases on drop so panics cannot leave the bus claimed.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Handle on the lock file. Cheap to keep around; nothing is held until
/// [`DeviceLock::acquire`].
#[derive(Debug, Clone)]
pub struct DeviceLock {
    path: PathBuf,
    timeout: Duration,
}

impl DeviceLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    /// Take the exclusive lock, polling until `timeout` elapses.
    pub fn acquire(&self) -> Result<DeviceLockGuard> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| Error::Io(format!("open {}: {e}", self.path.display())))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
            if rc == 0 {
                return Ok(DeviceLockGuard { file });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::LockTimeout {
                    path: self.path.clone(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Held lock. Dropping it unlocks the file.
#[derive(Debug)]
pub struct DeviceLockGuard {
    file: File,
}

impl Drop for DeviceLockGuard {
    fn drop(&mut self) {
        // Closing the fd would release the flock anyway; the explicit unlock
        // keeps the release visible under strace.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = DeviceLock::new(dir.path().join("dev.lock"), Duration::from_millis(100));

        let guard = lock.acquire().unwrap();
        drop(guard);
        lock.acquire().unwrap();
    }

    #[test]
    fn contention_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.lock");
        let lock = DeviceLock::new(&path, Duration::from_millis(100));

        let _held = lock.acquire().unwrap();

        // flock is per-open-file-description, so a second descriptor in the
        // same process still contends.
        let other = DeviceLock::new(&path, Duration::from_millis(100));
        let started = Instant::now();
        let err = other.acquire().unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(matches!(err, Error::LockTimeout { .. }));
    }

    #[test]
    fn released_lock_is_reacquirable_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.lock");

        let a = DeviceLock::new(&path, Duration::from_millis(100));
        drop(a.acquire().unwrap());

        let b = DeviceLock::new(&path, Duration::from_millis(100));
        b.acquire().unwrap();
    }
}
