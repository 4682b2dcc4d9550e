//! Per-store advisory locking
//!
//! Each store directory carries a `LOCK` file locked via `flock(2)`.
//! Mutators take exclusive locks, readers shared locks; the lock is
//! released when the handle drops. Locks are advisory: they serialize
//! cooperating processes and nothing else.
//!
//! Operations spanning several stores must acquire locks in ascending
//! store-id order.

use crate::layout::PathLayout;
use gridstore_common::{Result, StoreId};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;

/// Holds an advisory lock on one store for its lifetime
pub struct StoreLock {
    _file: File,
}

impl StoreLock {
    /// Acquire an exclusive lock, blocking until available
    pub fn exclusive(layout: &PathLayout, id: StoreId) -> Result<Self> {
        Self::acquire(layout, id, libc::LOCK_EX)
    }

    /// Acquire a shared lock, blocking until available
    pub fn shared(layout: &PathLayout, id: StoreId) -> Result<Self> {
        Self::acquire(layout, id, libc::LOCK_SH)
    }

    fn acquire(layout: &PathLayout, id: StoreId, operation: libc::c_int) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(layout.lock_path(id))?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), operation) };
        if rc != 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use tempfile::tempdir;

    #[test]
    fn test_lock_lifecycle() {
        let dir = tempdir().unwrap();
        let layout = PathLayout::new(dir.path());
        let id = StoreId::new(0);
        Container::new(&layout, id).create().unwrap();

        let lock = StoreLock::exclusive(&layout, id).unwrap();
        drop(lock);

        // Reacquirable after release, and shared locks coexist.
        let _a = StoreLock::shared(&layout, id).unwrap();
        let _b = StoreLock::shared(&layout, id).unwrap();
    }
}
