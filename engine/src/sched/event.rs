use crate::clock::{BlockWindow, Time};
use std::cmp::Ordering;

/// Where, inside the current block, a dispatched event lands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventContext {
    /// Frame index in `[0, frames - 1]`.
    pub sample_offset: usize,
    /// Fraction of a frame left over by the offset rounding, in `[0, 1)`.
    pub subsample_offset: f32,
    pub deadline: Time,
    pub block_start: Time,
    pub block_end: Time,
    /// The deadline had already passed when the event was seen.
    pub slipped: bool,
}

impl EventContext {
    pub fn new(window: &BlockWindow, deadline: Time) -> Self {
        let slipped = deadline < window.start;
        let (sample_offset, subsample_offset) = sample_offset(window, deadline);
        Self {
            sample_offset,
            subsample_offset,
            deadline,
            block_start: window.start,
            block_end: window.end,
            slipped,
        }
    }
}

/// Rounds the deadline's position in the window to a frame and clamps it to
/// the block. The sub-sample remainder is dropped when the offset is clamped.
pub fn sample_offset(window: &BlockWindow, deadline: Time) -> (usize, f32) {
    let last = window.frames.saturating_sub(1) as f64;
    let pos = window.position(deadline) + 0.5;
    let whole = pos.floor();
    if !(whole >= 0.0) {
        return (0, 0.0);
    }
    if whole > last {
        return (last as usize, 0.0);
    }
    let frac = ((pos - whole) as f32).min(1.0 - f32::EPSILON / 2.0);
    (whole as usize, frac)
}

/// Queue entry. Ordered so that a max-heap pops the earliest deadline first,
/// and the earliest submission among equal deadlines.
pub(crate) struct Scheduled<E> {
    pub(crate) deadline: Time,
    pub(crate) seq: u64,
    pub(crate) event: E,
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<E> Eq for Scheduled<E> {}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
