//! Interprocess advisory lock built on `flock(2)`.
//!
//! Each host backup runs under its own lock file so two invocations of the
//! tool never back up the same host concurrently. The lock is cooperative:
//! it only excludes other processes that also take it.
//!
//! Not thread-safe: a `FileLock` is meant to be owned by a single thread.

use crate::backup::result_error::LockError;
use bon::Builder;
use getset::{CopyGetters, Getters};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

#[derive(Debug, Builder, Getters, CopyGetters)]
pub struct FileLock {
    #[builder(into)]
    #[getset(get = "pub")]
    path: PathBuf,
    /// Wait for the lock instead of failing when it is held elsewhere.
    #[builder(default)]
    #[getset(get_copy = "pub")]
    blocking: bool,
    #[builder(skip)]
    file: Option<File>,
}

impl FileLock {
    /// Non-blocking lock on `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::builder().path(path.as_ref()).build()
    }

    /// Opens (creating if needed) the lock file and takes an exclusive lock on it.
    ///
    /// On failure the file handle is closed before the error is returned.
    /// Acquiring a lock already held by `self` is a no-op.
    pub fn acquire(&mut self) -> Result<(), LockError> {
        if self.is_locked() {
            return Ok(());
        }

        let res = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .and_then(|file| {
                let locked = flock_exclusive(&file, self.blocking);
                // keep the handle around even on failure so release() is the
                // single place closing it
                self.file = Some(file);
                locked
            });

        res.map_err(|source| {
            self.release();
            LockError {
                path: self.path.clone(),
                source,
            }
        })
    }

    /// Closes the lock file, which drops the lock. Safe to call at any time.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
        }
    }

    pub fn is_locked(&self) -> bool {
        self.file.is_some()
    }

    /// Scoped acquisition: the returned guard releases the lock when dropped,
    /// whichever way the governed block is left.
    pub fn lock(&mut self) -> Result<FileLockGuard<'_>, LockError> {
        self.acquire()?;
        Ok(FileLockGuard { lock: self })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug)]
pub struct FileLockGuard<'a> {
    lock: &'a mut FileLock,
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

fn flock_exclusive(file: &File, blocking: bool) -> io::Result<()> {
    let mut operation = libc::LOCK_EX;
    if !blocking {
        operation |= libc::LOCK_NB;
    }

    loop {
        // SAFETY: flock only reads the descriptor, which stays valid for the
        // whole call since `file` is borrowed.
        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
