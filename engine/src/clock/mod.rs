//! Drift-corrected mapping between the hardware sample count and the external
//! time base.
//!
//! The tracker is owned by the real-time thread and updated once per block.
//! Everything other threads see goes through [`ClockPublisher`] snapshots.

mod publish;
mod time;

pub use publish::{ClockPublisher, ClockSnapshot};
pub use time::{Time, TimeBase, host_seconds};

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockOptions {
    /// Exponential smoothing weight applied to each instantaneous rate.
    pub smoothing: f64,
    /// Largest tolerated distance of the smoothed rate from nominal, in Hz.
    pub clamp_hz: f64,
    pub time_units_per_second: u64,
}

impl Default for ClockOptions {
    fn default() -> Self {
        Self {
            smoothing: 0.002,
            clamp_hz: 10.0,
            time_units_per_second: 1 << 32,
        }
    }
}

/// Hardware position paired with the host time it was observed at.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimestampSample {
    pub sample_count: u64,
    pub host_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClockState {
    pub smoothed_rate: f64,
    pub nominal_rate: f64,
    /// External time covered by one block at the smoothed rate.
    pub block_increment: i64,
    pub previous: Option<TimestampSample>,
}

/// External-time span `[start, end)` of one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockWindow {
    pub start: Time,
    pub end: Time,
    pub frames: usize,
    pub samples_per_unit: f64,
}

impl BlockWindow {
    /// Fractional sample position of `t` relative to the window start.
    pub fn position(&self, t: Time) -> f64 {
        (t - self.start) as f64 * self.samples_per_unit
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockAnomaly {
    /// Zero or negative host-time delta, or a non-finite rate.
    Implausible { instantaneous: f64 },
    /// Smoothed estimate left the clamp band around nominal.
    Clamped { smoothed: f64 },
    /// The sample count jumped past the end of the previous block.
    Gap { frames: u64 },
}

#[derive(Debug)]
pub struct ClockTracker {
    options: ClockOptions,
    base: TimeBase,
    state: ClockState,
    next_start: Option<Time>,
    last_frames: usize,
    anomalies: u64,
}

impl ClockTracker {
    pub fn new(nominal_rate: f64, frames: usize, options: ClockOptions) -> Self {
        let mut tracker = Self {
            options,
            base: TimeBase::new(options.time_units_per_second),
            state: ClockState {
                smoothed_rate: nominal_rate,
                nominal_rate,
                block_increment: 0,
                previous: None,
            },
            next_start: None,
            last_frames: frames,
            anomalies: 0,
        };
        tracker.state.block_increment = tracker.increment(frames);
        tracker
    }

    pub fn state(&self) -> &ClockState {
        &self.state
    }

    pub fn time_base(&self) -> TimeBase {
        self.base
    }

    pub fn anomalies(&self) -> u64 {
        self.anomalies
    }

    /// Feeds this block's timestamp and returns the block's window.
    ///
    /// The first block anchors the window start at its host time; later
    /// windows start where the previous one ended. Frames the hardware
    /// skipped between two blocks move the window forward by the time they
    /// would have covered, so external time keeps following the sample count.
    pub fn advance(&mut self, sample: TimestampSample, frames: usize) -> BlockWindow {
        let mut skipped_units = 0;
        if let Some(prev) = self.state.previous {
            let expected = prev.sample_count.saturating_add(self.last_frames as u64);
            let skipped = sample.sample_count.saturating_sub(expected);
            if skipped > 0 {
                skipped_units = self.span(skipped);
                self.report(ClockAnomaly::Gap { frames: skipped });
            }
            if let Some(anomaly) = self.update_rate(prev, sample) {
                self.report(anomaly);
            }
        }
        self.state.previous = Some(sample);
        self.last_frames = frames;
        self.state.block_increment = self.increment(frames);

        let start = match self.next_start {
            Some(t) => t + skipped_units,
            None => self.base.from_secs_f64(sample.host_seconds),
        };
        let end = start + self.state.block_increment;
        self.next_start = Some(end);
        BlockWindow {
            start,
            end,
            frames,
            samples_per_unit: self.state.smoothed_rate / self.base.units_per_second() as f64,
        }
    }

    fn report(&mut self, anomaly: ClockAnomaly) {
        self.anomalies += 1;
        match anomaly {
            ClockAnomaly::Implausible { instantaneous } => warn!(
                instantaneous,
                nominal = self.state.nominal_rate,
                "implausible hardware clock rate; resetting to nominal"
            ),
            ClockAnomaly::Clamped { smoothed } => warn!(
                smoothed,
                nominal = self.state.nominal_rate,
                clamp_hz = self.options.clamp_hz,
                "clock glitch rejected; resetting to nominal"
            ),
            ClockAnomaly::Gap { frames } => warn!(
                frames,
                rate = self.state.smoothed_rate,
                "hardware skipped frames; moving the block window past them"
            ),
        }
    }

    fn update_rate(&mut self, prev: TimestampSample, now: TimestampSample) -> Option<ClockAnomaly> {
        let nominal = self.state.nominal_rate;
        let elapsed = now.host_seconds - prev.host_seconds;
        let instantaneous = (now.sample_count as f64 - prev.sample_count as f64) / elapsed;
        if !(elapsed > 0.0 && instantaneous.is_finite() && instantaneous > 0.0) {
            self.state.smoothed_rate = nominal;
            return Some(ClockAnomaly::Implausible { instantaneous });
        }
        let smoothed =
            self.state.smoothed_rate + self.options.smoothing * (instantaneous - self.state.smoothed_rate);
        if (smoothed - nominal).abs() > self.options.clamp_hz {
            self.state.smoothed_rate = nominal;
            return Some(ClockAnomaly::Clamped { smoothed });
        }
        self.state.smoothed_rate = smoothed;
        None
    }

    fn increment(&self, frames: usize) -> i64 {
        self.span(frames as u64)
    }

    fn span(&self, frames: u64) -> i64 {
        (self.base.units_per_second() as f64 * frames as f64 / self.state.smoothed_rate).floor() as i64
    }
}
