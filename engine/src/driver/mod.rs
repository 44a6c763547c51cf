//! Block-synchronous audio driver.
//!
//! `Idle → Configuring → Running → Stopping → Stopped`. Configuration
//! negotiates the hardware on the caller's thread; a failure there ends in
//! `Stopped` and is returned from [`Driver::start`]. Once running, a single
//! real-time thread executes one callback per block until a stop is
//! requested or the hardware goes away. A stop request is observed at the
//! top of the next block, so the block in progress always completes.

mod signal;
mod stats;
mod worker;

pub use signal::BlockSignal;
pub use stats::{DriverStats, StatsSnapshot};

use crate::clock::{ClockPublisher, ClockSnapshot, ClockTracker, Time, TimeBase};
use crate::domain::Promoter;
use crate::error::{DriverError, HwError, SubmitError};
use crate::hw::{DriverOptions, Hardware, HwParams};
use crate::processor::Processor;
use crate::sched::{BufferScheduler, EventQueue, Scheduler, event_queue};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::sync_channel;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};
use worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum DriverState {
    Idle = 0,
    Configuring = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl DriverState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Configuring,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// State shared between the owner and the real-time thread.
#[derive(Debug)]
pub(crate) struct Shared {
    state: AtomicU8,
    stop: AtomicBool,
    pub(crate) stats: DriverStats,
    pub(crate) clock: ClockPublisher,
    pub(crate) signal: BlockSignal,
}

impl Shared {
    fn state(&self) -> DriverState {
        DriverState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: DriverState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// Cloneable handle that asks the driver to stop. Safe to call from any
/// thread, including from inside an event.
#[derive(Debug, Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }
}

pub struct Driver<E> {
    options: DriverOptions,
    promoter: Arc<Promoter>,
    shared: Arc<Shared>,
    scheduler: Scheduler<E>,
    queue: Option<EventQueue<E>>,
    params: Option<HwParams>,
    thread: Option<JoinHandle<()>>,
}

impl<E> std::fmt::Debug for Driver<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("state", &self.state())
            .field("params", &self.params)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl<E: Send + 'static> Driver<E> {
    /// Validates the options and creates the driver's synchronization
    /// objects. Any primitive that cannot be created is fatal here.
    pub fn new(options: DriverOptions, promoter: Arc<Promoter>) -> Result<Self, DriverError> {
        options.validate()?;
        let (scheduler, queue) = event_queue(&promoter, options.queue_capacity, options.submit_retry_budget)?;
        let shared = Arc::new(Shared {
            state: AtomicU8::new(DriverState::Idle as u8),
            stop: AtomicBool::new(false),
            stats: DriverStats::default(),
            clock: ClockPublisher::new(),
            signal: BlockSignal::try_new(&promoter)?,
        });
        Ok(Self {
            options,
            promoter,
            shared,
            scheduler,
            queue: Some(queue),
            params: None,
            thread: None,
        })
    }

    pub fn start<H, P>(&mut self, mut hw: H, processor: P) -> Result<HwParams, DriverError>
    where
        H: Hardware,
        P: Processor<Event = E>,
    {
        if self.state() != DriverState::Idle {
            return Err(DriverError::AlreadyStarted);
        }
        let Some(queue) = self.queue.take() else {
            return Err(DriverError::AlreadyStarted);
        };
        self.shared.set_state(DriverState::Configuring);

        let mut negotiated = self.options.clone();
        if let Some(period) = self.options.preferred_period_frames {
            if period != self.options.block_frames {
                warn!(
                    "{} period of {} frames requested; forcing it to the block size of {}",
                    H::LABEL,
                    period,
                    self.options.block_frames
                );
            }
        }
        negotiated.preferred_period_frames = Some(self.options.block_frames);

        let params = match negotiate(&mut hw, &negotiated) {
            Ok(p) => p,
            Err(e) => {
                error!("{} configuration failed: {}", H::LABEL, e);
                self.shared.set_state(DriverState::Stopped);
                self.shared.signal.close();
                return Err(e.into());
            }
        };
        info!(
            "{} configured: rate={} block={} in={}+{} out={}+{}",
            H::LABEL,
            params.sample_rate,
            params.block_frames,
            params.inputs,
            params.aux_inputs,
            params.outputs,
            params.aux_outputs
        );

        let worker = Worker {
            hw,
            processor,
            scheduler: BufferScheduler::new(queue),
            tracker: ClockTracker::new(params.sample_rate, params.block_frames, self.options.clock),
            params,
            options: self.options.clone(),
            promoter: self.promoter.clone(),
            shared: self.shared.clone(),
        };
        let (ready_tx, ready_rx) = sync_channel(1);
        let spawned = std::thread::Builder::new()
            .name(self.options.thread_name.clone())
            .spawn(move || worker.run(ready_tx));
        let handle = match spawned {
            Ok(h) => h,
            Err(e) => {
                self.shared.set_state(DriverState::Stopped);
                self.shared.signal.close();
                return Err(DriverError::ThreadSpawn(e));
            }
        };

        let started = ready_rx.recv();
        match started {
            Ok(Ok(())) => {
                self.thread = Some(handle);
                self.params = Some(params);
                Ok(params)
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.shared.set_state(DriverState::Stopped);
                self.shared.signal.close();
                Err(DriverError::Setup(e))
            }
            Err(_) => {
                let _ = handle.join();
                self.shared.set_state(DriverState::Stopped);
                self.shared.signal.close();
                Err(DriverError::Panicked)
            }
        }
    }

    /// Submission handle for non-real-time threads.
    pub fn scheduler(&self) -> Scheduler<E> {
        self.scheduler.clone()
    }

    pub fn submit(&self, deadline: Time, event: E) -> Result<(), SubmitError<E>> {
        self.scheduler.submit(deadline, event)
    }
}

impl<E> Driver<E> {
    pub fn state(&self) -> DriverState {
        self.shared.state()
    }

    pub fn params(&self) -> Option<HwParams> {
        self.params
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn time_base(&self) -> TimeBase {
        TimeBase::new(self.options.clock.time_units_per_second)
    }

    pub fn clock(&self) -> ClockSnapshot {
        self.shared.clock.snapshot()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    /// Waits for `blocks` more blocks to complete.
    pub fn wait_blocks(&self, blocks: u64, timeout: Duration) -> bool {
        let target = self.shared.signal.completed() + blocks;
        self.shared.signal.wait_until(target, timeout)
    }

    /// Waits for the real-time thread to finish without asking it to stop.
    pub fn join(&mut self) -> Result<(), DriverError> {
        let Some(handle) = self.thread.take() else {
            return match self.state() {
                DriverState::Idle => Err(DriverError::NotRunning),
                _ => Ok(()),
            };
        };
        handle.join().map_err(|_| {
            self.shared.set_state(DriverState::Stopped);
            DriverError::Panicked
        })
    }

    pub fn stop(&mut self) -> Result<(), DriverError> {
        self.request_stop();
        self.join()
    }
}

impl<E> Drop for Driver<E> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}

fn negotiate<H: Hardware>(hw: &mut H, options: &DriverOptions) -> Result<HwParams, HwError> {
    let params = hw.negotiate(options)?;
    if params.block_frames != options.block_frames || params.period_frames != options.block_frames {
        return Err(HwError::Negotiation(format!(
            "device offered block {} / period {} frames, {} required",
            params.block_frames, params.period_frames, options.block_frames
        )));
    }
    if !(params.sample_rate.is_finite() && params.sample_rate > 0.0) {
        return Err(HwError::Negotiation(format!(
            "device reported sample rate {}",
            params.sample_rate
        )));
    }
    Ok(params)
}
