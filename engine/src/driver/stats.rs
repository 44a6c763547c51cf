use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// Counters written by the real-time thread.
#[derive(Debug, Default)]
pub struct DriverStats {
    blocks: AtomicU64,
    events: AtomicU64,
    slips: AtomicU64,
    clock_anomalies: AtomicU64,
    xruns: AtomicU64,
    panics: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub blocks: u64,
    pub events: u64,
    pub slips: u64,
    pub clock_anomalies: u64,
    pub xruns: u64,
    pub panics: u64,
}

impl DriverStats {
    pub(crate) fn add_block(&self, events: usize, slips: usize) {
        self.events.fetch_add(events as u64, Ordering::Relaxed);
        self.slips.fetch_add(slips as u64, Ordering::Relaxed);
        self.blocks.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn add_clock_anomalies(&self, n: u64) {
        if n > 0 {
            self.clock_anomalies.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub(crate) fn add_xrun(&self) {
        self.xruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocks: self.blocks.load(Ordering::Acquire),
            events: self.events.load(Ordering::Relaxed),
            slips: self.slips.load(Ordering::Relaxed),
            clock_anomalies: self.clock_anomalies.load(Ordering::Relaxed),
            xruns: self.xruns.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
        }
    }
}

const PROFILE_INTERVAL: Duration = Duration::from_secs(1);

/// Per-second timing report of the block callback.
#[derive(Debug)]
pub(crate) struct BlockProfiler {
    report_at: Instant,
    expected_bps: f64,
    blocks: u64,
    events: u64,
    busy_ns: u128,
    max_ns: u128,
}

impl BlockProfiler {
    pub(crate) fn new(sample_rate: f64, block_frames: usize) -> Self {
        let expected_bps = if block_frames > 0 { sample_rate / block_frames as f64 } else { 0.0 };
        info!("block profile enabled: block_frames={block_frames} sample_rate={sample_rate} expected_bps={expected_bps:.1}");
        Self {
            report_at: Instant::now() + PROFILE_INTERVAL,
            expected_bps,
            blocks: 0,
            events: 0,
            busy_ns: 0,
            max_ns: 0,
        }
    }

    pub(crate) fn record(&mut self, started: Instant, events: usize) {
        let ns = started.elapsed().as_nanos();
        self.blocks += 1;
        self.events += events as u64;
        self.busy_ns += ns;
        self.max_ns = self.max_ns.max(ns);

        let now = Instant::now();
        if now < self.report_at {
            return;
        }
        let avg_us = if self.blocks > 0 {
            (self.busy_ns / self.blocks as u128) as f64 / 1_000.0
        } else {
            0.0
        };
        info!(
            "block profile: expected_bps={:.1} blocks={} events={} avg_us={:.1} max_us={:.1}",
            self.expected_bps,
            self.blocks,
            self.events,
            avg_us,
            self.max_ns as f64 / 1_000.0
        );
        self.report_at = now + PROFILE_INTERVAL;
        self.blocks = 0;
        self.events = 0;
        self.busy_ns = 0;
        self.max_ns = 0;
    }
}
