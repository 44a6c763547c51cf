use crate::clock::ClockOptions;
use crate::error::DriverError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    /// Requested nominal sample rate.
    pub sample_rate: f64,
    pub block_frames: usize,
    /// Hardware period the device would prefer. Anything other than
    /// `block_frames` is overridden.
    pub preferred_period_frames: Option<usize>,
    pub inputs: usize,
    pub outputs: usize,
    pub aux_inputs: usize,
    pub aux_outputs: usize,
    /// Auxiliary channels run this many times slower than primary ones.
    pub aux_rate_divisor: usize,
    pub queue_capacity: usize,
    /// `try_lock` attempts a submitter makes before giving up.
    pub submit_retry_budget: usize,
    /// SCHED_FIFO priority for the callback thread. `None` keeps the
    /// inherited policy.
    pub rt_priority: Option<i32>,
    pub lock_memory: bool,
    pub thread_name: String,
    pub clock: ClockOptions,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            block_frames: 64,
            preferred_period_frames: None,
            inputs: 2,
            outputs: 2,
            aux_inputs: 0,
            aux_outputs: 0,
            aux_rate_divisor: 2,
            queue_capacity: 1024,
            submit_retry_budget: 64,
            rt_priority: None,
            lock_memory: false,
            thread_name: "rtblock-audio".to_string(),
            clock: ClockOptions::default(),
        }
    }
}

impl DriverOptions {
    pub fn validate(&self) -> Result<(), DriverError> {
        let invalid = |msg: &str| Err(DriverError::InvalidOptions(msg.to_string()));
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return invalid("sample_rate must be positive");
        }
        if self.block_frames == 0 {
            return invalid("block_frames must be non-zero");
        }
        if self.aux_rate_divisor == 0 || self.block_frames % self.aux_rate_divisor != 0 {
            return invalid("aux_rate_divisor must divide block_frames");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be non-zero");
        }
        if !(self.clock.smoothing > 0.0 && self.clock.smoothing <= 1.0) {
            return invalid("clock.smoothing must be in (0, 1]");
        }
        if !(self.clock.clamp_hz.is_finite() && self.clock.clamp_hz > 0.0) {
            return invalid("clock.clamp_hz must be positive");
        }
        if self.clock.time_units_per_second == 0 {
            return invalid("clock.time_units_per_second must be non-zero");
        }
        if let Some(prio) = self.rt_priority {
            if !(1..=99).contains(&prio) {
                return invalid("rt_priority must be in 1..=99");
            }
        }
        if self.thread_name.contains('\0') {
            return invalid("thread_name must not contain NUL");
        }
        Ok(())
    }

    pub fn aux_frames(&self) -> usize {
        self.block_frames / self.aux_rate_divisor.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        DriverOptions::default().validate().unwrap();
    }

    #[test]
    fn rejects_degenerate_values() {
        let cases: Vec<Box<dyn Fn(&mut DriverOptions)>> = vec![
            Box::new(|o| o.block_frames = 0),
            Box::new(|o| o.queue_capacity = 0),
            Box::new(|o| o.clock.smoothing = 0.0),
            Box::new(|o| o.clock.smoothing = 1.5),
            Box::new(|o| o.clock.clamp_hz = -1.0),
            Box::new(|o| o.clock.time_units_per_second = 0),
            Box::new(|o| o.aux_rate_divisor = 3),
            Box::new(|o| o.sample_rate = f64::NAN),
            Box::new(|o| o.rt_priority = Some(0)),
        ];
        for (i, tweak) in cases.iter().enumerate() {
            let mut o = DriverOptions::default();
            tweak(&mut o);
            assert!(
                matches!(o.validate(), Err(DriverError::InvalidOptions(_))),
                "case {i} accepted"
            );
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let o: DriverOptions = toml::from_str("block_frames = 128\n[clock]\nclamp_hz = 4.0\n").unwrap();
        assert_eq!(o.block_frames, 128);
        assert_eq!(o.queue_capacity, 1024);
        assert_eq!(o.clock.clamp_hz, 4.0);
        assert_eq!(o.clock.smoothing, 0.002);
        assert_eq!(o.aux_frames(), 64);
    }
}
