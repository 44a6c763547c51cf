#![allow(dead_code)]

use parking_lot::Mutex;
use rtblock_engine::{
    BlockContext, DriverOptions, EventContext, Frames, HwParams, PosixDomain, Processor, Promoter, StopHandle, Time,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

pub fn posix_promoter() -> Arc<Promoter> {
    Promoter::new(PosixDomain::default())
}

pub fn options() -> DriverOptions {
    DriverOptions {
        sample_rate: 48_000.0,
        block_frames: 64,
        queue_capacity: 256,
        ..DriverOptions::default()
    }
}

#[derive(Debug)]
pub enum Cue {
    Mark(u32),
    StopHere(u32),
    Panic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Applied {
    pub id: u32,
    pub deadline: Time,
    pub block_start: Time,
    pub block_end: Time,
    pub offset: usize,
    pub slipped: bool,
}

/// Records what the real-time thread did, for inspection after it stops.
#[derive(Debug, Default)]
pub struct Journal {
    pub applied: Mutex<Vec<Applied>>,
    pub blocks: Mutex<Vec<Time>>,
    pub prepared: Mutex<Option<HwParams>>,
    pub processed: AtomicU64,
}

pub struct Recorder {
    pub journal: Arc<Journal>,
    pub stop: Option<StopHandle>,
    pub panic_in_block: Option<u64>,
}

impl Recorder {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self {
            journal,
            stop: None,
            panic_in_block: None,
        }
    }

    fn record(&self, id: u32, ctx: &EventContext) {
        self.journal.applied.lock().push(Applied {
            id,
            deadline: ctx.deadline,
            block_start: ctx.block_start,
            block_end: ctx.block_end,
            offset: ctx.sample_offset,
            slipped: ctx.slipped,
        });
    }
}

impl Processor for Recorder {
    type Event = Cue;

    fn prepare(&mut self, params: &HwParams) {
        *self.journal.prepared.lock() = Some(*params);
    }

    fn apply(&mut self, event: Cue, ctx: &EventContext) {
        match event {
            Cue::Mark(id) => self.record(id, ctx),
            Cue::StopHere(id) => {
                self.record(id, ctx);
                if let Some(stop) = &self.stop {
                    stop.request_stop();
                }
            }
            Cue::Panic => panic!("cue asked to panic"),
        }
    }

    fn process(&mut self, block: &BlockContext, _input: &Frames, output: &mut Frames) {
        if self.panic_in_block == Some(block.index) {
            panic!("processing asked to panic");
        }
        self.journal.blocks.lock().push(block.window.start);
        self.journal.processed.fetch_add(1, Ordering::Relaxed);
        for ch in 0..output.channels() {
            output.channel_mut(ch).fill(0.25);
        }
    }
}
