//! Synchronization primitives that promote their callers into the real-time
//! domain on first use.
//!
//! Every operation follows the same protocol: call the domain primitive; if
//! the caller turns out not to be a domain member, promote it and retry the
//! identical call exactly once; anything else is returned as is.

mod condvar;
mod mutex;
mod raw;
mod retry;

pub use condvar::AdaptiveCondvar;
pub use mutex::{AdaptiveMutex, AdaptiveMutexGuard};

use crate::domain::Promoter;
use crate::error::SyncError;
use nix::errno::Errno;
use retry::{Completion, Outcome, Recovery, try_or_retry};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Per-primitive entry point into the retry protocol.
pub(crate) struct Gate {
    promoter: Arc<Promoter>,
    primitive: &'static str,
    warned: AtomicBool,
}

impl Gate {
    pub(crate) fn new(promoter: &Arc<Promoter>, primitive: &'static str) -> Self {
        Self {
            promoter: promoter.clone(),
            primitive,
            warned: AtomicBool::new(false),
        }
    }

    pub(crate) fn call(&self, op: &'static str, mut f: impl FnMut() -> Result<(), Errno>) -> Completion {
        let domain = self.promoter.domain();
        let completion = try_or_retry(&self.promoter, Recovery::Promote, || {
            if !domain.is_member() {
                return Outcome::RetryNeeded;
            }
            f().into()
        });
        if completion == Completion::NotMember && !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                primitive = self.primitive,
                op, "called from a thread outside the real-time domain; operation skipped"
            );
        }
        completion
    }

    /// Creates the underlying object, forcing domain initialization once if
    /// the domain is not up yet.
    pub(crate) fn create<R>(&self, mut f: impl FnMut() -> Result<R, Errno>) -> Result<R, SyncError> {
        let domain = self.promoter.domain();
        let mut created = None;
        let completion = try_or_retry(&self.promoter, Recovery::Initialize, || {
            if !domain.is_initialized() {
                return Outcome::RetryNeeded;
            }
            match f() {
                Ok(raw) => {
                    created = Some(raw);
                    Outcome::Success
                }
                Err(e) => Outcome::PermanentFailure(e),
            }
        });
        let errno = match (completion, created) {
            (Completion::Done, Some(raw)) => {
                debug!(primitive = self.primitive, "created");
                return Ok(raw);
            }
            (Completion::Failed(errno), _) => errno,
            _ => Errno::EPERM,
        };
        Err(SyncError::InitFailed {
            primitive: self.primitive,
            errno,
        })
    }
}
