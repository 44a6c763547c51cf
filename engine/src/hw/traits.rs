use super::{DriverOptions, Frames};
use crate::clock::TimestampSample;
use crate::error::HwError;
use serde::Serialize;

/// Parameters fixed during configuration and immutable while running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HwParams {
    pub sample_rate: f64,
    pub block_frames: usize,
    pub period_frames: usize,
    pub inputs: usize,
    pub outputs: usize,
    pub aux_inputs: usize,
    pub aux_outputs: usize,
    pub aux_frames: usize,
}

impl HwParams {
    pub fn input_frames(&self) -> Frames {
        Frames::new(self.inputs, self.block_frames, self.aux_inputs, self.aux_frames)
    }

    pub fn output_frames(&self) -> Frames {
        Frames::new(self.outputs, self.block_frames, self.aux_outputs, self.aux_frames)
    }
}

/// Audio device driven block by block from the real-time thread.
pub trait Hardware: Send + 'static {
    const LABEL: &'static str;

    /// Agree on block size, rate and channel layout. Called once, before the
    /// real-time thread exists.
    fn negotiate(&mut self, options: &DriverOptions) -> Result<HwParams, HwError>;

    fn start(&mut self) -> Result<(), HwError>;

    /// Blocks until the next period is available, fills `input`, and reports
    /// the hardware position at the start of the block.
    fn read_block(&mut self, input: &mut Frames) -> Result<TimestampSample, HwError>;

    fn write_block(&mut self, output: &Frames) -> Result<(), HwError>;

    fn stop(&mut self);
}
