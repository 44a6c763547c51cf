use super::stats::BlockProfiler;
use super::{DriverState, Shared};
use crate::clock::{ClockTracker, TimestampSample};
use crate::config;
use crate::domain::{Promoter, ThreadSched, lock_memory_pages};
use crate::error::HwError;
use crate::hw::{DriverOptions, Frames, Hardware, HwParams};
use crate::processor::{BlockContext, Processor};
use crate::sched::BufferScheduler;
use nix::errno::Errno;
use nix::libc;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::SyncSender;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const RT_POLICY: i32 = libc::SCHED_FIFO;

pub(super) struct Worker<H: Hardware, P: Processor> {
    pub(super) hw: H,
    pub(super) processor: P,
    pub(super) scheduler: BufferScheduler<P::Event>,
    pub(super) tracker: ClockTracker,
    pub(super) params: HwParams,
    pub(super) options: DriverOptions,
    pub(super) promoter: Arc<Promoter>,
    pub(super) shared: Arc<Shared>,
}

impl<H: Hardware, P: Processor> Worker<H, P> {
    pub(super) fn run(mut self, ready: SyncSender<Result<(), HwError>>) {
        self.setup_thread();
        if let Err(e) = self.hw.start() {
            error!("{} hardware failed to start: {}", H::LABEL, e);
            let _ = ready.send(Err(e));
            return;
        }
        self.processor.prepare(&self.params);
        self.shared.set_state(DriverState::Running);
        let _ = ready.send(Ok(()));
        drop(ready);

        let mut input = self.params.input_frames();
        let mut output = self.params.output_frames();
        let mut profiler = config::env_flag(config::PROFILE_ENV)
            .then(|| BlockProfiler::new(self.params.sample_rate, self.params.block_frames));
        let mut index = 0_u64;

        while !self.shared.stop_requested() {
            let sample = match self.hw.read_block(&mut input) {
                Ok(sample) => sample,
                Err(e) => {
                    if self.hardware_failed(e) {
                        break;
                    }
                    continue;
                }
            };
            let started = Instant::now();
            let executed = self.run_block(index, sample, &input, &mut output);
            if let Err(e) = self.hw.write_block(&output) {
                if self.hardware_failed(e) {
                    break;
                }
            }
            self.shared.signal.block_done();
            if let Some(p) = profiler.as_mut() {
                p.record(started, executed);
            }
            index += 1;
        }

        self.shared.set_state(DriverState::Stopping);
        self.scheduler.close();
        self.hw.stop();
        info!("{} driver stopped after {} blocks", H::LABEL, index);
        self.shared.set_state(DriverState::Stopped);
        self.shared.signal.close();
    }

    /// Returns whether the loop has to end.
    fn hardware_failed(&self, e: HwError) -> bool {
        match e {
            HwError::Xrun { frames } => {
                self.shared.stats.add_xrun();
                warn!("{} xrun: {} frames lost", H::LABEL, frames);
                false
            }
            HwError::Disconnected => {
                info!("{} hardware finished", H::LABEL);
                true
            }
            e => {
                error!("{} hardware error: {}", H::LABEL, e);
                true
            }
        }
    }

    fn run_block(&mut self, index: u64, sample: TimestampSample, input: &Frames, output: &mut Frames) -> usize {
        let anomalies = self.tracker.anomalies();
        let window = self.tracker.advance(sample, self.params.block_frames);
        self.shared
            .stats
            .add_clock_anomalies(self.tracker.anomalies() - anomalies);

        output.clear();
        let processor = &mut self.processor;
        let stats = &self.shared.stats;
        let dispatch = self.scheduler.dispatch(&window, |event, ctx| {
            if catch_unwind(AssertUnwindSafe(|| processor.apply(event, ctx))).is_err() {
                stats.add_panic();
                error!(
                    deadline = ctx.deadline.raw(),
                    offset = ctx.sample_offset,
                    "event panicked in real time; block continues"
                );
            }
        });

        let block = BlockContext {
            index,
            window,
            smoothed_rate: self.tracker.state().smoothed_rate,
        };
        if catch_unwind(AssertUnwindSafe(|| processor.process(&block, input, output))).is_err() {
            stats.add_panic();
            output.clear();
            error!(block = index, "block processing panicked in real time; output silenced");
        }

        stats.add_block(dispatch.executed, dispatch.slips);
        self.shared.clock.publish(index + 1, self.tracker.state(), &window);
        dispatch.executed
    }

    fn setup_thread(&self) {
        if self.options.lock_memory {
            if let Err(e) = lock_memory_pages() {
                error!("{} worker memory lock not enabled: mlockall failed with {}", H::LABEL, e);
            }
        }
        if let Some(priority) = self.options.rt_priority {
            match enter_fifo(priority) {
                Ok(sched) => info!(
                    thread = %self.options.thread_name,
                    priority = sched.priority,
                    "{} worker running SCHED_FIFO", H::LABEL
                ),
                Err(errno) => error!(
                    thread = %self.options.thread_name,
                    priority,
                    errno = %errno,
                    "{} worker realtime priority not enabled", H::LABEL
                ),
            }
        }
        match self.promoter.ensure_realtime() {
            Ok(()) => debug!("{} worker joined the {} domain", H::LABEL, self.promoter.domain().label()),
            Err(e) => error!("{} worker continues without domain membership: {}", H::LABEL, e),
        }
    }
}

/// Moves the calling thread to SCHED_FIFO at `priority` and reads the
/// result back. `EPERM` if the kernel kept a different policy.
fn enter_fifo(priority: i32) -> Result<ThreadSched, Errno> {
    let mut param = unsafe { std::mem::zeroed::<libc::sched_param>() };
    param.sched_priority = priority;
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), RT_POLICY, &param) };
    if rc != 0 {
        return Err(Errno::from_raw(rc));
    }
    let applied = ThreadSched::current()?;
    if applied.policy != RT_POLICY || applied.priority != priority {
        return Err(Errno::EPERM);
    }
    Ok(applied)
}
