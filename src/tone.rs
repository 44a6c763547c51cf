//! Sine generator whose parameters change at the exact sample an event
//! is scheduled for.

use rtblock_engine::{BlockContext, EventContext, Frames, HwParams, Processor};
use std::f32::consts::TAU;

const MAX_CHANGES_PER_BLOCK: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ToneEvent {
    Frequency(f32),
    Gain(f32),
}

#[derive(Debug)]
pub struct Tone {
    frequency: f32,
    gain: f32,
    phase: f32,
    sample_rate: f32,
    changes: Vec<(usize, ToneEvent)>,
}

impl Tone {
    pub fn new(frequency: f32, gain: f32) -> Self {
        Self {
            frequency,
            gain,
            phase: 0.0,
            sample_rate: 48_000.0,
            changes: Vec::with_capacity(MAX_CHANGES_PER_BLOCK),
        }
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    fn set(&mut self, event: ToneEvent) {
        match event {
            ToneEvent::Frequency(hz) => self.frequency = hz.max(0.0),
            ToneEvent::Gain(g) => self.gain = g.clamp(0.0, 1.0),
        }
    }
}

impl Processor for Tone {
    type Event = ToneEvent;

    fn prepare(&mut self, params: &HwParams) {
        self.sample_rate = params.sample_rate as f32;
        self.phase = 0.0;
    }

    fn apply(&mut self, event: ToneEvent, ctx: &EventContext) {
        if self.changes.len() >= MAX_CHANGES_PER_BLOCK {
            // Out of room: the earliest change moves to the start of the block.
            let (_, earliest) = self.changes.remove(0);
            self.set(earliest);
        }
        self.changes.push((ctx.sample_offset, event));
    }

    fn process(&mut self, _block: &BlockContext, _input: &Frames, output: &mut Frames) {
        let frames = output.frames();
        let channels = output.channels();
        let mut next = 0;
        for i in 0..frames {
            while next < self.changes.len() && self.changes[next].0 <= i {
                let event = self.changes[next].1;
                self.set(event);
                next += 1;
            }
            let sample = self.gain * self.phase.sin();
            for ch in 0..channels {
                output.channel_mut(ch)[i] = sample;
            }
            self.phase = (self.phase + TAU * self.frequency / self.sample_rate) % TAU;
        }
        for k in next..self.changes.len() {
            let event = self.changes[k].1;
            self.set(event);
        }
        self.changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtblock_engine::clock::BlockWindow;
    use rtblock_engine::Time;

    fn window() -> BlockWindow {
        BlockWindow {
            start: Time::from_raw(0),
            end: Time::from_raw(64),
            frames: 64,
            samples_per_unit: 1.0,
        }
    }

    fn block() -> BlockContext {
        BlockContext {
            index: 0,
            window: window(),
            smoothed_rate: 48_000.0,
        }
    }

    fn at(offset: i64) -> EventContext {
        EventContext::new(&window(), Time::from_raw(offset))
    }

    fn params() -> HwParams {
        HwParams {
            sample_rate: 48_000.0,
            block_frames: 64,
            period_frames: 64,
            inputs: 0,
            outputs: 2,
            aux_inputs: 0,
            aux_outputs: 0,
            aux_frames: 0,
        }
    }

    #[test]
    fn gain_change_lands_on_its_sample() {
        let mut tone = Tone::new(1_000.0, 0.0);
        tone.prepare(&params());
        let input = params().input_frames();
        let mut output = params().output_frames();
        tone.apply(ToneEvent::Gain(0.5), &at(10));
        tone.process(&block(), &input, &mut output);

        for ch in 0..2 {
            let out = output.channel(ch);
            assert!(out[..10].iter().all(|&s| s == 0.0));
            assert!(out[11..].iter().any(|&s| s != 0.0));
            assert!(out.iter().all(|&s| s.abs() <= 0.5));
        }
        assert_eq!(tone.gain(), 0.5);
    }

    #[test]
    fn changes_apply_in_order_within_a_block() {
        let mut tone = Tone::new(440.0, 0.1);
        tone.prepare(&params());
        let input = params().input_frames();
        let mut output = params().output_frames();
        tone.apply(ToneEvent::Frequency(880.0), &at(5));
        tone.apply(ToneEvent::Frequency(220.0), &at(40));
        tone.apply(ToneEvent::Gain(2.0), &at(63));
        tone.process(&block(), &input, &mut output);
        assert_eq!(tone.frequency(), 220.0);
        assert_eq!(tone.gain(), 1.0);
        assert!(output.peak() <= 1.0);
    }

    #[test]
    fn overflowing_changes_keep_deadline_order() {
        let mut tone = Tone::new(440.0, 0.1);
        tone.prepare(&params());
        let last = MAX_CHANGES_PER_BLOCK + 2;
        for i in 0..=last {
            tone.apply(ToneEvent::Frequency(100.0 + i as f32), &at((i as i64).min(62)));
        }
        tone.apply(ToneEvent::Gain(0.0), &at(63));
        let input = params().input_frames();
        let mut output = params().output_frames();
        tone.process(&block(), &input, &mut output);
        assert_eq!(tone.frequency(), 100.0 + last as f32);
        assert_eq!(tone.gain(), 0.0);
        assert_eq!(output.channel(0)[63], 0.0);
    }
}
