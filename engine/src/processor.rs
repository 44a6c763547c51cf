use crate::clock::BlockWindow;
use crate::hw::{Frames, HwParams};
use crate::sched::EventContext;

/// The block being processed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockContext {
    pub index: u64,
    pub window: BlockWindow,
    pub smoothed_rate: f64,
}

/// Signal processing driven by the real-time thread.
///
/// Every method runs on that thread and must not block. Events are applied
/// before `process` in the same block, in deadline order.
pub trait Processor: Send + 'static {
    type Event: Send + 'static;

    /// Called once, after negotiation and before the first block.
    fn prepare(&mut self, _params: &HwParams) {}

    fn apply(&mut self, event: Self::Event, ctx: &EventContext);

    fn process(&mut self, block: &BlockContext, input: &Frames, output: &mut Frames);
}
