use crate::domain::Promoter;
use crate::error::SyncError;
use crate::sync::{AdaptiveCondvar, AdaptiveMutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

const WAIT_SLICE: Duration = Duration::from_millis(10);

/// Block-completion notification from the real-time thread.
///
/// The real-time side never blocks: it bumps a counter and broadcasts only if
/// the lock is free. Waiters sleep in short slices so a skipped broadcast
/// costs at most one slice.
#[derive(Debug)]
pub struct BlockSignal {
    completed: AtomicU64,
    closed: AtomicBool,
    lock: AdaptiveMutex,
    cond: AdaptiveCondvar,
}

impl BlockSignal {
    pub fn try_new(promoter: &Arc<Promoter>) -> Result<Self, SyncError> {
        Ok(Self {
            completed: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            lock: AdaptiveMutex::try_new(promoter, ())?,
            cond: AdaptiveCondvar::try_new(promoter)?,
        })
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn block_done(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
        self.wake();
    }

    /// Wakes every waiter for good.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let _g = self.lock.lock();
        self.cond.notify_all();
    }

    fn wake(&self) {
        if let Some(g) = self.lock.try_lock() {
            if g.is_held() {
                self.cond.notify_all();
            }
        }
    }

    /// Waits until the completed-block count reaches `target`. Returns `false`
    /// on timeout or once the signal is closed short of the target.
    pub fn wait_until(&self, target: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut g = self.lock.lock();
        loop {
            if self.completed() >= target {
                return true;
            }
            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            if g.is_held() {
                self.cond.wait_timeout(&mut g, (deadline - now).min(WAIT_SLICE));
            } else {
                drop(g);
                std::thread::sleep((deadline - now).min(WAIT_SLICE));
                g = self.lock.lock();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::promoter::testing::scripted;
    use std::thread;

    #[test]
    fn waiter_sees_blocks_from_another_thread() {
        let (_domain, promoter) = scripted();
        let signal = Arc::new(BlockSignal::try_new(&promoter).unwrap());
        let s = signal.clone();
        let rt = thread::spawn(move || {
            for _ in 0..5 {
                thread::sleep(Duration::from_millis(2));
                s.block_done();
            }
        });
        assert!(signal.wait_until(5, Duration::from_secs(5)));
        rt.join().unwrap();
        assert_eq!(signal.completed(), 5);
    }

    #[test]
    fn times_out_and_closes() {
        let (_domain, promoter) = scripted();
        let signal = BlockSignal::try_new(&promoter).unwrap();
        let started = Instant::now();
        assert!(!signal.wait_until(1, Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
        signal.close();
        assert!(!signal.wait_until(1, Duration::from_secs(10)));
    }
}
