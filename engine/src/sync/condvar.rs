use super::Gate;
use super::mutex::AdaptiveMutexGuard;
use super::raw::RawCondvar;
use super::retry::Completion;
use crate::domain::Promoter;
use crate::error::SyncError;
use nix::errno::Errno;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Condition variable living in the real-time domain, paired with an
/// [`super::AdaptiveMutex`].
///
/// Waiting needs a guard that actually holds its mutex; with an unheld guard
/// (or a disabled primitive) `wait` returns at once, which callers must treat
/// like a spurious wakeup. Dropping the condition variable wakes every waiter
/// before the underlying object is destroyed.
pub struct AdaptiveCondvar {
    raw: Option<RawCondvar>,
    gate: Gate,
}

impl std::fmt::Debug for AdaptiveCondvar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveCondvar")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl AdaptiveCondvar {
    pub fn new(promoter: &Arc<Promoter>) -> Self {
        let gate = Gate::new(promoter, "condition variable");
        let raw = match gate.create(RawCondvar::new) {
            Ok(raw) => Some(raw),
            Err(e) => {
                error!(error = %e, "condition variable disabled; waits return immediately");
                None
            }
        };
        Self { raw, gate }
    }

    pub fn try_new(promoter: &Arc<Promoter>) -> Result<Self, SyncError> {
        let gate = Gate::new(promoter, "condition variable");
        let raw = gate.create(RawCondvar::new)?;
        Ok(Self { raw: Some(raw), gate })
    }

    pub fn is_enabled(&self) -> bool {
        self.raw.is_some()
    }

    pub fn wait<T>(&self, guard: &mut AdaptiveMutexGuard<'_, T>) {
        let (Some(cond), Some(mutex)) = (&self.raw, guard.mutex().raw()) else {
            return;
        };
        if !guard.is_held() {
            return;
        }
        self.report("wait", self.gate.call("wait", || cond.wait(mutex)));
    }

    /// Returns `true` if the timeout elapsed without a notification.
    pub fn wait_timeout<T>(&self, guard: &mut AdaptiveMutexGuard<'_, T>, timeout: Duration) -> bool {
        let (Some(cond), Some(mutex)) = (&self.raw, guard.mutex().raw()) else {
            return true;
        };
        if !guard.is_held() {
            return true;
        }
        match self.gate.call("wait_timeout", || cond.wait_timeout(mutex, timeout)) {
            Completion::Failed(Errno::ETIMEDOUT) => true,
            completion => {
                self.report("wait_timeout", completion);
                completion != Completion::Done
            }
        }
    }

    pub fn notify_one(&self) {
        if let Some(cond) = &self.raw {
            self.report("notify_one", self.gate.call("notify_one", || cond.signal()));
        }
    }

    pub fn notify_all(&self) {
        if let Some(cond) = &self.raw {
            self.report("notify_all", self.gate.call("notify_all", || cond.broadcast()));
        }
    }

    fn report(&self, op: &'static str, completion: Completion) {
        if let Completion::Failed(errno) = completion {
            warn!(op, errno = %errno, "condition variable operation failed");
        }
    }
}

impl Drop for AdaptiveCondvar {
    fn drop(&mut self) {
        self.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::promoter::testing::scripted;
    use crate::sync::AdaptiveMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;

    struct Gathering {
        mutex: AdaptiveMutex<(usize, bool)>,
        cond: AdaptiveCondvar,
        woken: AtomicUsize,
    }

    #[test]
    fn notify_all_wakes_every_waiter() {
        const WAITERS: usize = 6;
        let (_domain, promoter) = scripted();
        let shared = Arc::new(Gathering {
            mutex: AdaptiveMutex::new(&promoter, (0, false)),
            cond: AdaptiveCondvar::new(&promoter),
            woken: AtomicUsize::new(0),
        });

        let handles: Vec<_> = (0..WAITERS)
            .map(|_| {
                let s = shared.clone();
                thread::spawn(move || {
                    let mut g = s.mutex.lock();
                    g.get_mut().unwrap().0 += 1;
                    while !g.get().unwrap().1 {
                        s.cond.wait(&mut g);
                    }
                    drop(g);
                    s.woken.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        let started = Instant::now();
        loop {
            if shared.mutex.lock().get().unwrap().0 == WAITERS {
                break;
            }
            assert!(started.elapsed() < Duration::from_secs(5), "waiters never parked");
            thread::sleep(Duration::from_millis(1));
        }

        {
            let mut g = shared.mutex.lock();
            g.get_mut().unwrap().1 = true;
            shared.cond.notify_all();
        }

        let budget = Instant::now();
        while shared.woken.load(Ordering::SeqCst) < WAITERS {
            assert!(budget.elapsed() < Duration::from_secs(2), "notify_all did not wake everyone");
            thread::sleep(Duration::from_millis(1));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(shared.woken.load(Ordering::SeqCst), WAITERS);
    }

    #[test]
    fn notify_one_wakes_a_single_waiter() {
        let (_domain, promoter) = scripted();
        let shared = Arc::new(Gathering {
            mutex: AdaptiveMutex::new(&promoter, (0, false)),
            cond: AdaptiveCondvar::new(&promoter),
            woken: AtomicUsize::new(0),
        });
        let s = shared.clone();
        let waiter = thread::spawn(move || {
            let mut g = s.mutex.lock();
            while g.get().unwrap().0 == 0 {
                s.cond.wait(&mut g);
            }
            s.woken.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(10));
        {
            let mut g = shared.mutex.lock();
            g.get_mut().unwrap().0 = 1;
        }
        shared.cond.notify_one();
        waiter.join().unwrap();
        assert_eq!(shared.woken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wait_timeout_reports_elapsed_timeout() {
        let (_domain, promoter) = scripted();
        let mutex = AdaptiveMutex::new(&promoter, ());
        let cond = AdaptiveCondvar::new(&promoter);
        let mut g = mutex.lock();
        let started = Instant::now();
        assert!(cond.wait_timeout(&mut g, Duration::from_millis(20)));
        assert!(started.elapsed() >= Duration::from_millis(15));
        assert!(g.is_held());
    }

    #[test]
    fn disabled_condvar_never_blocks() {
        let (domain, promoter) = scripted();
        let mutex = AdaptiveMutex::new(&promoter, ());
        domain.fail_init.store(true, std::sync::atomic::Ordering::SeqCst);
        domain.initialized.store(false, std::sync::atomic::Ordering::SeqCst);
        let cond = AdaptiveCondvar::new(&promoter);
        assert!(!cond.is_enabled());
        let mut g = mutex.lock();
        cond.wait(&mut g);
        assert!(cond.wait_timeout(&mut g, Duration::from_secs(10)));
        cond.notify_all();
        assert!(AdaptiveCondvar::try_new(&promoter).is_err());
    }
}
