//! Real-time scheduling domain membership.
//!
//! A [`Domain`] is the scheduling class whose synchronization calls are only
//! valid from threads registered with it. Threads are promoted lazily by the
//! [`Promoter`] on their first contact with a domain-restricted primitive.

mod posix;
pub(crate) mod promoter;

pub use posix::PosixDomain;
pub use promoter::Promoter;

use nix::errno::Errno;
use nix::libc;

/// Scheduling policy and priority of a thread as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSched {
    pub policy: i32,
    pub priority: i32,
}

impl ThreadSched {
    pub fn current() -> Result<Self, Errno> {
        let mut policy = 0_i32;
        let mut param = unsafe { std::mem::zeroed::<libc::sched_param>() };
        let rc = unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param) };
        if rc != 0 {
            return Err(Errno::from_raw(rc));
        }
        Ok(Self {
            policy,
            priority: param.sched_priority,
        })
    }

    pub fn is_realtime(&self) -> bool {
        self.policy == libc::SCHED_FIFO || self.policy == libc::SCHED_RR
    }
}

/// Locks current and future pages of the process into memory.
pub(crate) fn lock_memory_pages() -> Result<(), Errno> {
    let rc = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if rc == 0 { Ok(()) } else { Err(Errno::last()) }
}

pub trait Domain: Send + Sync + 'static {
    fn label(&self) -> &'static str;

    /// Process-wide subsystem initialization. Must be idempotent.
    fn initialize(&self) -> Result<(), Errno>;

    fn is_initialized(&self) -> bool;

    /// Whether the calling thread is registered with the domain.
    fn is_member(&self) -> bool;

    /// Register the calling thread, keeping its current policy and priority.
    fn register_current(&self, sched: ThreadSched) -> Result<(), Errno>;
}
