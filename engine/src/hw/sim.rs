use super::{DriverOptions, Frames, Hardware, HwParams};
use crate::clock::{TimestampSample, host_seconds};
use crate::error::HwError;
use atomic_float::AtomicF32;
use nix::libc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimOptions {
    /// Deviation of the simulated crystal from the nominal rate.
    pub drift_ppm: f64,
    /// Peak random error added to each host timestamp, in microseconds.
    pub jitter_us: f64,
    /// Blocks whose host timestamp is shifted by `glitch_offset_us`.
    pub glitch_blocks: Vec<u64>,
    pub glitch_offset_us: f64,
    /// Blocks lost to an xrun instead of being delivered.
    pub xrun_blocks: Vec<u64>,
    /// Pace blocks against the host clock instead of running flat out.
    pub realtime: bool,
    /// Report the device as disconnected after this many blocks.
    pub block_limit: Option<u64>,
    pub fail_negotiation: bool,
    pub seed: u64,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            drift_ppm: 0.0,
            jitter_us: 0.0,
            glitch_blocks: Vec::new(),
            glitch_offset_us: 0.0,
            xrun_blocks: Vec::new(),
            realtime: false,
            block_limit: None,
            fail_negotiation: false,
            seed: 0x5eed,
        }
    }
}

/// Observations of a running [`SimHardware`], readable from any thread.
#[derive(Debug, Default)]
pub struct SimProbe {
    pub started: AtomicBool,
    pub stopped: AtomicBool,
    pub blocks_read: AtomicU64,
    pub blocks_written: AtomicU64,
    pub last_peak: AtomicF32,
}

/// Device without hardware behind it: a crystal running at a configurable
/// true rate, optionally paced in real time.
#[derive(Debug)]
pub struct SimHardware {
    options: SimOptions,
    params: Option<HwParams>,
    true_rate: f64,
    origin: f64,
    block: u64,
    rng: u64,
    probe: Arc<SimProbe>,
}

impl SimHardware {
    pub fn new(options: SimOptions) -> Self {
        let rng = options.seed.max(1);
        Self {
            options,
            params: None,
            true_rate: 0.0,
            origin: 0.0,
            block: 0,
            rng,
            probe: Arc::new(SimProbe::default()),
        }
    }

    pub fn probe(&self) -> Arc<SimProbe> {
        self.probe.clone()
    }

    fn next_unit(&mut self) -> f64 {
        let mut x = self.rng;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.rng = x;
        (x >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
    }

    fn sleep_until(&self, secs: f64) {
        let wake = libc::timespec {
            tv_sec: secs.trunc() as libc::time_t,
            tv_nsec: (secs.fract() * 1.0e9) as libc::c_long,
        };
        unsafe {
            libc::clock_nanosleep(libc::CLOCK_MONOTONIC, libc::TIMER_ABSTIME, &wake, std::ptr::null_mut());
        }
    }
}

impl Hardware for SimHardware {
    const LABEL: &'static str = "sim";

    fn negotiate(&mut self, options: &DriverOptions) -> Result<HwParams, HwError> {
        if self.options.fail_negotiation {
            return Err(HwError::Negotiation("simulated device refused the configuration".to_string()));
        }
        let params = HwParams {
            sample_rate: options.sample_rate,
            block_frames: options.block_frames,
            period_frames: options.block_frames,
            inputs: options.inputs,
            outputs: options.outputs,
            aux_inputs: options.aux_inputs,
            aux_outputs: options.aux_outputs,
            aux_frames: options.aux_frames(),
        };
        self.true_rate = options.sample_rate * (1.0 + self.options.drift_ppm * 1.0e-6);
        self.params = Some(params);
        Ok(params)
    }

    fn start(&mut self) -> Result<(), HwError> {
        if self.params.is_none() {
            return Err(HwError::Start("device was not negotiated".to_string()));
        }
        self.origin = host_seconds();
        self.block = 0;
        self.probe.started.store(true, Ordering::Release);
        info!(
            true_rate = self.true_rate,
            realtime = self.options.realtime,
            "simulated device started"
        );
        Ok(())
    }

    fn read_block(&mut self, input: &mut Frames) -> Result<TimestampSample, HwError> {
        let frames = input.frames() as u64;
        if self.options.block_limit.is_some_and(|limit| self.block >= limit) {
            return Err(HwError::Disconnected);
        }
        if self.options.xrun_blocks.contains(&self.block) {
            self.block += 1;
            return Err(HwError::Xrun { frames });
        }

        let sample_count = self.block * frames;
        let ideal = self.origin + sample_count as f64 / self.true_rate;
        if self.options.realtime {
            self.sleep_until(ideal);
        }
        let mut host = ideal;
        if self.options.jitter_us > 0.0 {
            host += self.next_unit() * self.options.jitter_us * 1.0e-6;
        }
        if self.options.glitch_blocks.contains(&self.block) {
            debug!(block = self.block, "injecting clock glitch");
            host += self.options.glitch_offset_us * 1.0e-6;
        }

        input.clear();
        self.block += 1;
        self.probe.blocks_read.fetch_add(1, Ordering::Relaxed);
        Ok(TimestampSample {
            sample_count,
            host_seconds: host,
        })
    }

    fn write_block(&mut self, output: &Frames) -> Result<(), HwError> {
        self.probe.last_peak.store(output.peak(), Ordering::Relaxed);
        self.probe.blocks_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.stopped.store(true, Ordering::Release);
        info!(blocks = self.block, "simulated device stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn negotiated(options: SimOptions) -> (SimHardware, HwParams) {
        let mut hw = SimHardware::new(options);
        let params = hw.negotiate(&DriverOptions::default()).unwrap();
        hw.start().unwrap();
        (hw, params)
    }

    #[test]
    fn timestamps_follow_the_drifted_rate() {
        let (mut hw, params) = negotiated(SimOptions {
            drift_ppm: 100.0,
            ..SimOptions::default()
        });
        let mut input = params.input_frames();
        let a = hw.read_block(&mut input).unwrap();
        let b = hw.read_block(&mut input).unwrap();
        assert_eq!(b.sample_count - a.sample_count, 64);
        let rate = 64.0 / (b.host_seconds - a.host_seconds);
        assert!((rate - 44_104.41).abs() < 0.01, "rate {rate}");
    }

    #[test]
    fn xruns_and_disconnects_are_reported() {
        let (mut hw, params) = negotiated(SimOptions {
            xrun_blocks: vec![1],
            block_limit: Some(3),
            ..SimOptions::default()
        });
        let mut input = params.input_frames();
        assert!(hw.read_block(&mut input).is_ok());
        assert!(matches!(hw.read_block(&mut input), Err(HwError::Xrun { frames: 64 })));
        let s = hw.read_block(&mut input).unwrap();
        assert_eq!(s.sample_count, 128);
        assert!(matches!(hw.read_block(&mut input), Err(HwError::Disconnected)));
    }

    #[test]
    fn negotiation_failure_is_injected() {
        let mut hw = SimHardware::new(SimOptions {
            fail_negotiation: true,
            ..SimOptions::default()
        });
        assert!(matches!(hw.negotiate(&DriverOptions::default()), Err(HwError::Negotiation(_))));
        assert!(matches!(hw.start(), Err(HwError::Start(_))));
    }
}
