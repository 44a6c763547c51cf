use super::Gate;
use super::raw::RawMutex;
use super::retry::Completion;
use crate::domain::Promoter;
use crate::error::SyncError;
use nix::errno::Errno;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{error, warn};

/// Mutex living in the real-time domain.
///
/// Threads that are not yet domain members are promoted on their first call.
/// If promotion fails the call does nothing and is logged once per mutex; the
/// returned guard then reports [`AdaptiveMutexGuard::is_held`] as `false` and
/// refuses access to the data.
///
/// A mutex created with [`AdaptiveMutex::new`] fails open: if the underlying
/// object cannot be created even after forcing domain initialization it is
/// disabled for its whole lifetime, `lock` and `try_lock` succeed without
/// exclusion, and guards never expose the data. [`AdaptiveMutex::try_new`]
/// fails closed instead.
pub struct AdaptiveMutex<T = ()> {
    raw: Option<RawMutex>,
    gate: Gate,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for AdaptiveMutex<T> {}
unsafe impl<T: Send> Sync for AdaptiveMutex<T> {}

impl<T> std::fmt::Debug for AdaptiveMutex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveMutex")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl<T> AdaptiveMutex<T> {
    pub fn new(promoter: &Arc<Promoter>, data: T) -> Self {
        let gate = Gate::new(promoter, "mutex");
        let raw = match gate.create(RawMutex::new) {
            Ok(raw) => Some(raw),
            Err(e) => {
                error!(error = %e, "mutex disabled; continuing without mutual exclusion");
                None
            }
        };
        Self {
            raw,
            gate,
            data: UnsafeCell::new(data),
        }
    }

    pub fn try_new(promoter: &Arc<Promoter>, data: T) -> Result<Self, SyncError> {
        let gate = Gate::new(promoter, "mutex");
        let raw = gate.create(RawMutex::new)?;
        Ok(Self {
            raw: Some(raw),
            gate,
            data: UnsafeCell::new(data),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.raw.is_some()
    }

    pub fn lock(&self) -> AdaptiveMutexGuard<'_, T> {
        let held = match &self.raw {
            Some(raw) => self.succeeded("lock", self.gate.call("lock", || raw.lock())),
            None => false,
        };
        AdaptiveMutexGuard::new(self, held)
    }

    /// `None` only when the mutex is enabled and could not be taken.
    pub fn try_lock(&self) -> Option<AdaptiveMutexGuard<'_, T>> {
        match &self.raw {
            Some(raw) => self
                .succeeded("try_lock", self.gate.call("try_lock", || raw.try_lock()))
                .then(|| AdaptiveMutexGuard::new(self, true)),
            None => Some(AdaptiveMutexGuard::new(self, false)),
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }

    pub(crate) fn raw(&self) -> Option<&RawMutex> {
        self.raw.as_ref()
    }

    fn unlock(&self) {
        if let Some(raw) = &self.raw {
            self.succeeded("unlock", self.gate.call("unlock", || raw.unlock()));
        }
    }

    fn succeeded(&self, op: &'static str, completion: Completion) -> bool {
        match completion {
            Completion::Done => true,
            Completion::Failed(Errno::EBUSY) | Completion::NotMember => false,
            Completion::Failed(errno) => {
                warn!(op, errno = %errno, "mutex operation failed");
                false
            }
        }
    }
}

/// Unlocks on drop.
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct AdaptiveMutexGuard<'a, T> {
    mutex: &'a AdaptiveMutex<T>,
    held: bool,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T> AdaptiveMutexGuard<'a, T> {
    fn new(mutex: &'a AdaptiveMutex<T>, held: bool) -> Self {
        Self {
            mutex,
            held,
            _not_send: PhantomData,
        }
    }

    /// Whether this guard actually provides mutual exclusion.
    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn get(&self) -> Option<&T> {
        self.held.then(|| unsafe { &*self.mutex.data.get() })
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.held {
            Some(unsafe { &mut *self.mutex.data.get() })
        } else {
            None
        }
    }

    pub(crate) fn mutex(&self) -> &'a AdaptiveMutex<T> {
        self.mutex
    }
}

impl<T> Drop for AdaptiveMutexGuard<'_, T> {
    fn drop(&mut self) {
        if self.held {
            self.mutex.unlock();
        }
    }
}
