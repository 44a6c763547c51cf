use super::event::Scheduled;
use crate::clock::Time;
use crate::domain::Promoter;
use crate::error::{SubmitError, SyncError};
use crate::sync::{AdaptiveMutex, AdaptiveMutexGuard};
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

struct Staging<E> {
    events: Vec<Scheduled<E>>,
    next_seq: u64,
}

struct QueueShared<E> {
    promoter: Arc<Promoter>,
    staging: AdaptiveMutex<Staging<E>>,
    pending: AtomicUsize,
    capacity: usize,
    retry_budget: usize,
    closed: AtomicBool,
}

/// Creates the submission handle and the real-time side of an event queue.
///
/// Both sides allocate their full capacity up front; the real-time side never
/// allocates afterwards.
pub fn event_queue<E: Send>(
    promoter: &Arc<Promoter>,
    capacity: usize,
    retry_budget: usize,
) -> Result<(Scheduler<E>, EventQueue<E>), SyncError> {
    let staging = Staging {
        events: Vec::with_capacity(capacity),
        next_seq: 0,
    };
    let shared = Arc::new(QueueShared {
        promoter: promoter.clone(),
        staging: AdaptiveMutex::try_new(promoter, staging)?,
        pending: AtomicUsize::new(0),
        capacity,
        retry_budget: retry_budget.max(1),
        closed: AtomicBool::new(false),
    });
    let queue = EventQueue {
        shared: shared.clone(),
        heap: BinaryHeap::with_capacity(capacity),
    };
    Ok((Scheduler { shared }, queue))
}

/// Cloneable handle used by non-real-time threads to schedule events.
pub struct Scheduler<E> {
    shared: Arc<QueueShared<E>>,
}

impl<E> Clone for Scheduler<E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<E> std::fmt::Debug for Scheduler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .field("capacity", &self.shared.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<E: Send> Scheduler<E> {
    /// Queues `event` to run in the block whose window contains `deadline`.
    ///
    /// Never waits longer than the retry budget for the queue lock. Events
    /// with equal deadlines run in the order their submissions succeeded.
    /// A thread the domain refused gets [`SubmitError::Refused`] on every
    /// call; `Busy` only ever means the lock stayed contended.
    pub fn submit(&self, deadline: Time, event: E) -> Result<(), SubmitError<E>> {
        let shared = &*self.shared;
        if shared.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Closed(event));
        }
        if shared.promoter.ensure_realtime().is_err() {
            return Err(SubmitError::Refused(event));
        }
        let Some(mut guard) = self.acquire() else {
            return Err(SubmitError::Busy(event));
        };
        let Some(staging) = guard.get_mut() else {
            return Err(SubmitError::Refused(event));
        };
        if shared.closed.load(Ordering::Acquire) {
            return Err(SubmitError::Closed(event));
        }
        if shared.pending.load(Ordering::Acquire) >= shared.capacity {
            return Err(SubmitError::Full(event));
        }
        let seq = staging.next_seq;
        staging.next_seq += 1;
        staging.events.push(Scheduled { deadline, seq, event });
        shared.pending.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn acquire(&self) -> Option<AdaptiveMutexGuard<'_, Staging<E>>> {
        let budget = self.shared.retry_budget;
        for attempt in 0..budget {
            if let Some(guard) = self.shared.staging.try_lock() {
                return Some(guard);
            }
            if attempt < budget / 2 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
        None
    }
}

impl<E> Scheduler<E> {
    /// Events submitted and not yet executed.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Deadline-ordered queue owned by the real-time thread.
pub struct EventQueue<E> {
    shared: Arc<QueueShared<E>>,
    heap: BinaryHeap<Scheduled<E>>,
}

impl<E> EventQueue<E> {
    /// Moves newly submitted events into the heap. A single `try_lock`: if a
    /// submitter holds the lock, its events are picked up next block.
    pub fn collect(&mut self) -> usize {
        let Some(mut guard) = self.shared.staging.try_lock() else {
            return 0;
        };
        let Some(staging) = guard.get_mut() else {
            return 0;
        };
        let n = staging.events.len();
        self.heap.extend(staging.events.drain(..));
        n
    }

    pub fn peek_deadline(&self) -> Option<Time> {
        self.heap.peek().map(|s| s.deadline)
    }

    pub fn pop(&mut self) -> Option<(Time, E)> {
        let s = self.heap.pop()?;
        self.shared.pending.fetch_sub(1, Ordering::AcqRel);
        Some((s.deadline, s.event))
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Rejects further submissions. Queued events stay until dropped.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

impl<E> Drop for EventQueue<E> {
    fn drop(&mut self) {
        self.close();
    }
}
