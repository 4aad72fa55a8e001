//! Advisory lock serializing status document rewrites.
//!
//! On Unix an exclusive `flock` on a sidecar file keeps the app and its
//! extension processes from interleaving read-modify-write cycles. Other
//! targets only serialize writers inside the current process.

use std::path::Path;

use super::error::{StorageError, StorageResult};

#[cfg_attr(not(unix), allow(dead_code))]
fn map_io_err(err: &std::io::Error) -> StorageError {
    StorageError::Lock(err.to_string())
}

#[cfg(unix)]
mod imp {
    use std::fs::{self, File, OpenOptions};
    use std::os::raw::c_int;
    use std::os::unix::io::AsRawFd;
    use std::path::Path;
    use std::sync::Arc;

    use super::{map_io_err, StorageResult};

    const LOCK_EX: c_int = 2;
    #[cfg(test)]
    const LOCK_NB: c_int = 4;
    const LOCK_UN: c_int = 8;

    extern "C" {
        fn flock(fd: c_int, operation: c_int) -> c_int;
    }

    /// File-backed exclusive lock shared by every process using the same path.
    #[derive(Debug, Clone)]
    pub struct StatusLock {
        file: Arc<File>,
    }

    /// Holds the lock until dropped.
    #[derive(Debug)]
    pub struct StatusLockGuard {
        file: Arc<File>,
    }

    impl StatusLock {
        pub fn open(path: &Path) -> StorageResult<Self> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|err| map_io_err(&err))?;
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|err| map_io_err(&err))?;
            Ok(Self {
                file: Arc::new(file),
            })
        }

        pub fn lock(&self) -> StorageResult<StatusLockGuard> {
            // SAFETY: the descriptor stays open for as long as `self.file` lives.
            let result = unsafe { flock(self.file.as_raw_fd(), LOCK_EX) };
            if result != 0 {
                return Err(map_io_err(&std::io::Error::last_os_error()));
            }
            Ok(StatusLockGuard {
                file: Arc::clone(&self.file),
            })
        }

        #[cfg(test)]
        pub fn try_lock(&self) -> StorageResult<Option<StatusLockGuard>> {
            // SAFETY: see `lock`.
            let result = unsafe { flock(self.file.as_raw_fd(), LOCK_EX | LOCK_NB) };
            if result == 0 {
                return Ok(Some(StatusLockGuard {
                    file: Arc::clone(&self.file),
                }));
            }
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::WouldBlock {
                Ok(None)
            } else {
                Err(map_io_err(&err))
            }
        }
    }

    impl Drop for StatusLockGuard {
        fn drop(&mut self) {
            // SAFETY: see `StatusLock::lock`.
            let _ = unsafe { flock(self.file.as_raw_fd(), LOCK_UN) };
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use std::path::Path;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use super::StorageResult;

    /// In-process lock used where `flock` is unavailable.
    #[derive(Debug, Clone, Copy)]
    pub struct StatusLock;

    /// Holds the lock until dropped.
    #[derive(Debug)]
    pub struct StatusLockGuard {
        _guard: MutexGuard<'static, ()>,
    }

    static PROCESS_LOCK: Mutex<()> = Mutex::new(());

    impl StatusLock {
        pub fn open(_path: &Path) -> StorageResult<Self> {
            Ok(Self)
        }

        pub fn lock(&self) -> StorageResult<StatusLockGuard> {
            Ok(StatusLockGuard {
                _guard: PROCESS_LOCK.lock().unwrap_or_else(PoisonError::into_inner),
            })
        }
    }
}

pub use imp::{StatusLock, StatusLockGuard};

/// Opens the lock stored next to the status document.
pub(crate) fn open(path: &Path) -> StorageResult<StatusLock> {
    StatusLock::open(path)
}
