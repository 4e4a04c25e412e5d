use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use thiserror::Error;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("could not acquire lock within {timeout:?}")]
pub struct LockTimeout {
    pub timeout: Duration,
}

/// A mutex that gives up after a bounded wait instead of blocking forever.
///
/// Ownership is tied to the returned guard, so the lock is released on every
/// exit path of the holder, including `?` returns and panics.
pub struct TimeoutLock<T> {
    inner: Mutex<T>,
    timeout: Duration,
}

impl<T> TimeoutLock<T> {
    pub fn new(value: T, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(value),
            timeout,
        }
    }

    /// Acquire with the default bound given at construction.
    pub fn acquire(&self) -> Result<MutexGuard<'_, T>, LockTimeout> {
        self.acquire_for(self.timeout)
    }

    pub fn acquire_for(&self, timeout: Duration) -> Result<MutexGuard<'_, T>, LockTimeout> {
        self.inner
            .try_lock_for(timeout)
            .ok_or(LockTimeout { timeout })
    }

    /// Run `f` while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, LockTimeout> {
        let mut guard = self.acquire()?;
        Ok(f(&mut guard))
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}
