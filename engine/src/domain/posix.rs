use super::{Domain, ThreadSched, lock_memory_pages};
use nix::errno::Errno;
use nix::libc;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

thread_local! {
    static MEMBER: Cell<bool> = const { Cell::new(false) };
}

/// Domain backed by the host's POSIX threads.
///
/// Membership is tracked per thread for the whole process, so every
/// `PosixDomain` value sees the same registrations. Registration re-applies
/// the thread's own policy and priority; it never raises them.
#[derive(Debug)]
pub struct PosixDomain {
    lock_memory: bool,
    initialized: AtomicBool,
}

impl Default for PosixDomain {
    fn default() -> Self {
        Self::new(false)
    }
}

impl PosixDomain {
    pub fn new(lock_memory: bool) -> Self {
        Self {
            lock_memory,
            initialized: AtomicBool::new(false),
        }
    }
}

impl Domain for PosixDomain {
    fn label(&self) -> &'static str {
        "posix"
    }

    fn initialize(&self) -> Result<(), Errno> {
        if self.lock_memory {
            if let Err(e) = lock_memory_pages() {
                warn!(errno = %e, "mlockall(MCL_CURRENT|MCL_FUTURE) failed; memory lock not enabled");
            }
        }
        if !self.initialized.swap(true, Ordering::AcqRel) {
            debug!(lock_memory = self.lock_memory, "posix real-time domain initialized");
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn is_member(&self) -> bool {
        MEMBER.with(Cell::get)
    }

    fn register_current(&self, sched: ThreadSched) -> Result<(), Errno> {
        if !self.is_initialized() {
            return Err(Errno::EPERM);
        }
        let param = unsafe {
            let mut p = std::mem::zeroed::<libc::sched_param>();
            p.sched_priority = sched.priority;
            p
        };
        let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), sched.policy, &param) };
        if rc != 0 {
            return Err(Errno::from_raw(rc));
        }
        MEMBER.with(|m| m.set(true));
        Ok(())
    }
}
