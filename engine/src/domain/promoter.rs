use super::{Domain, ThreadSched};
use crate::error::PromotionError;
use nix::errno::Errno;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::thread;
use tracing::{debug, error, warn};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the promoter whose domain last refused this thread.
    static REFUSED_BY: Cell<u64> = const { Cell::new(0) };
}

/// Moves threads into a [`Domain`] on demand.
///
/// One promoter is created by the owner of the domain and shared by every
/// primitive built on it. Promotion is attempted at most twice per thread:
/// once, and once more after forcing subsystem initialization. A thread the
/// domain rejects twice is remembered for the rest of its life and never
/// retried.
pub struct Promoter {
    id: u64,
    domain: Box<dyn Domain>,
    init: Once,
    attempts: AtomicU64,
}

impl std::fmt::Debug for Promoter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promoter")
            .field("domain", &self.domain.label())
            .field("attempts", &self.attempts())
            .finish()
    }
}

impl Promoter {
    pub fn new(domain: impl Domain) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            domain: Box::new(domain),
            init: Once::new(),
            attempts: AtomicU64::new(0),
        })
    }

    pub fn domain(&self) -> &dyn Domain {
        self.domain.as_ref()
    }

    /// Number of registration attempts made on behalf of non-member threads.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// One-time process-wide initialization. Later calls are no-ops.
    pub fn initialize(&self) {
        self.init.call_once(|| {
            if let Err(e) = self.domain.initialize() {
                warn!(domain = self.domain.label(), errno = %e, "real-time domain initialization failed");
            }
        });
    }

    /// Initialize again regardless of earlier attempts.
    pub fn force_initialize(&self) -> Result<(), Errno> {
        self.initialize();
        self.domain.initialize()
    }

    pub fn ensure_realtime(&self) -> Result<(), PromotionError> {
        self.initialize();
        if self.domain.is_member() {
            return Ok(());
        }
        if REFUSED_BY.with(Cell::get) == self.id {
            return Err(PromotionError::PreviouslyRefused);
        }
        self.attempts.fetch_add(1, Ordering::Relaxed);

        let sched = ThreadSched::current().map_err(|errno| self.refuse(errno))?;
        match self.domain.register_current(sched) {
            Ok(()) => {
                debug!(
                    domain = self.domain.label(),
                    thread = thread::current().name().unwrap_or("<unnamed>"),
                    policy = sched.policy,
                    priority = sched.priority,
                    "thread joined real-time domain"
                );
                Ok(())
            }
            Err(first) => {
                warn!(
                    domain = self.domain.label(),
                    errno = %first,
                    "unable to turn current thread into a real-time thread; reinitializing"
                );
                if let Err(e) = self.force_initialize() {
                    warn!(domain = self.domain.label(), errno = %e, "forced initialization failed");
                }
                match self.domain.register_current(sched) {
                    Ok(()) => {
                        debug!(domain = self.domain.label(), "thread joined real-time domain on retry");
                        Ok(())
                    }
                    Err(errno) => Err(self.refuse(errno)),
                }
            }
        }
    }

    fn refuse(&self, errno: Errno) -> PromotionError {
        error!(
            domain = self.domain.label(),
            thread = thread::current().name().unwrap_or("<unnamed>"),
            errno = %errno,
            "thread cannot use real-time primitives; continuing best effort"
        );
        REFUSED_BY.with(|r| r.set(self.id));
        PromotionError::Rejected { errno }
    }
}
