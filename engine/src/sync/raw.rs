use nix::errno::Errno;
use nix::libc;
use std::cell::UnsafeCell;
use std::time::Duration;

fn check(rc: libc::c_int) -> Result<(), Errno> {
    if rc == 0 { Ok(()) } else { Err(Errno::from_raw(rc)) }
}

/// Heap-pinned pthread mutex. The boxed storage never moves after init.
pub(crate) struct RawMutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
}

unsafe impl Send for RawMutex {}
unsafe impl Sync for RawMutex {}

impl RawMutex {
    pub(crate) fn new() -> Result<Self, Errno> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        unsafe {
            let mut attr = std::mem::zeroed::<libc::pthread_mutexattr_t>();
            check(libc::pthread_mutexattr_init(&mut attr))?;
            #[cfg(target_os = "linux")]
            {
                let _ = libc::pthread_mutexattr_setprotocol(&mut attr, libc::PTHREAD_PRIO_INHERIT);
            }
            let rc = libc::pthread_mutex_init(inner.get(), &attr);
            libc::pthread_mutexattr_destroy(&mut attr);
            check(rc)?;
        }
        Ok(Self { inner })
    }

    pub(crate) fn lock(&self) -> Result<(), Errno> {
        check(unsafe { libc::pthread_mutex_lock(self.inner.get()) })
    }

    /// `Err(EBUSY)` when the mutex is held elsewhere.
    pub(crate) fn try_lock(&self) -> Result<(), Errno> {
        check(unsafe { libc::pthread_mutex_trylock(self.inner.get()) })
    }

    pub(crate) fn unlock(&self) -> Result<(), Errno> {
        check(unsafe { libc::pthread_mutex_unlock(self.inner.get()) })
    }

    fn as_ptr(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

impl Drop for RawMutex {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_mutex_destroy(self.inner.get());
        }
    }
}

pub(crate) struct RawCondvar {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

unsafe impl Send for RawCondvar {}
unsafe impl Sync for RawCondvar {}

impl RawCondvar {
    pub(crate) fn new() -> Result<Self, Errno> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER));
        unsafe {
            let mut attr = std::mem::zeroed::<libc::pthread_condattr_t>();
            check(libc::pthread_condattr_init(&mut attr))?;
            #[cfg(target_os = "linux")]
            {
                let _ = libc::pthread_condattr_setclock(&mut attr, libc::CLOCK_MONOTONIC);
            }
            let rc = libc::pthread_cond_init(inner.get(), &attr);
            libc::pthread_condattr_destroy(&mut attr);
            check(rc)?;
        }
        Ok(Self { inner })
    }

    /// Caller must hold `mutex`.
    pub(crate) fn wait(&self, mutex: &RawMutex) -> Result<(), Errno> {
        check(unsafe { libc::pthread_cond_wait(self.inner.get(), mutex.as_ptr()) })
    }

    /// Caller must hold `mutex`. `Err(ETIMEDOUT)` when the timeout elapsed.
    pub(crate) fn wait_timeout(&self, mutex: &RawMutex, timeout: Duration) -> Result<(), Errno> {
        let deadline = deadline_after(timeout)?;
        check(unsafe { libc::pthread_cond_timedwait(self.inner.get(), mutex.as_ptr(), &deadline) })
    }

    pub(crate) fn signal(&self) -> Result<(), Errno> {
        check(unsafe { libc::pthread_cond_signal(self.inner.get()) })
    }

    pub(crate) fn broadcast(&self) -> Result<(), Errno> {
        check(unsafe { libc::pthread_cond_broadcast(self.inner.get()) })
    }
}

impl Drop for RawCondvar {
    fn drop(&mut self) {
        unsafe {
            libc::pthread_cond_destroy(self.inner.get());
        }
    }
}

#[cfg(target_os = "linux")]
const WAIT_CLOCK: libc::clockid_t = libc::CLOCK_MONOTONIC;
#[cfg(not(target_os = "linux"))]
const WAIT_CLOCK: libc::clockid_t = libc::CLOCK_REALTIME;

fn deadline_after(timeout: Duration) -> Result<libc::timespec, Errno> {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    if unsafe { libc::clock_gettime(WAIT_CLOCK, &mut now) } != 0 {
        return Err(Errno::last());
    }
    let nanos = now.tv_nsec as i64 + timeout.subsec_nanos() as i64;
    let secs = (now.tv_sec as i64)
        .saturating_add(timeout.as_secs().min(i64::MAX as u64) as i64)
        .saturating_add(nanos / 1_000_000_000);
    Ok(libc::timespec {
        tv_sec: secs as libc::time_t,
        tv_nsec: (nanos % 1_000_000_000) as _,
    })
}
