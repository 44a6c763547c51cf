use super::{BlockWindow, ClockState};
use atomic_float::AtomicF64;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering, fence};

/// Immutable copy of the clock as of the last completed block.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ClockSnapshot {
    pub blocks: u64,
    pub smoothed_rate: f64,
    pub nominal_rate: f64,
    pub block_increment: i64,
    pub window_start: i64,
    pub window_end: i64,
    pub sample_count: u64,
    pub host_seconds: f64,
}

/// Single-writer sequence lock. The real-time thread stores without waiting;
/// readers retry while a store is in progress.
#[derive(Debug, Default)]
pub struct ClockPublisher {
    seq: AtomicU64,
    blocks: AtomicU64,
    smoothed_rate: AtomicF64,
    nominal_rate: AtomicF64,
    block_increment: AtomicI64,
    window_start: AtomicI64,
    window_end: AtomicI64,
    sample_count: AtomicU64,
    host_seconds: AtomicF64,
}

impl ClockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Must only be called from one thread at a time.
    pub fn publish(&self, blocks: u64, state: &ClockState, window: &BlockWindow) {
        let seq = self.seq.load(Ordering::Relaxed);
        self.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);

        self.blocks.store(blocks, Ordering::Relaxed);
        self.smoothed_rate.store(state.smoothed_rate, Ordering::Relaxed);
        self.nominal_rate.store(state.nominal_rate, Ordering::Relaxed);
        self.block_increment.store(state.block_increment, Ordering::Relaxed);
        self.window_start.store(window.start.raw(), Ordering::Relaxed);
        self.window_end.store(window.end.raw(), Ordering::Relaxed);
        let (count, host) = state
            .previous
            .map(|p| (p.sample_count, p.host_seconds))
            .unwrap_or_default();
        self.sample_count.store(count, Ordering::Relaxed);
        self.host_seconds.store(host, Ordering::Relaxed);

        self.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        loop {
            let before = self.seq.load(Ordering::Acquire);
            if before & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let snap = ClockSnapshot {
                blocks: self.blocks.load(Ordering::Relaxed),
                smoothed_rate: self.smoothed_rate.load(Ordering::Relaxed),
                nominal_rate: self.nominal_rate.load(Ordering::Relaxed),
                block_increment: self.block_increment.load(Ordering::Relaxed),
                window_start: self.window_start.load(Ordering::Relaxed),
                window_end: self.window_end.load(Ordering::Relaxed),
                sample_count: self.sample_count.load(Ordering::Relaxed),
                host_seconds: self.host_seconds.load(Ordering::Relaxed),
            };
            fence(Ordering::Acquire);
            if self.seq.load(Ordering::Relaxed) == before {
                return snap;
            }
        }
    }
}
