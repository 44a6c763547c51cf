use super::event::EventContext;
use super::queue::EventQueue;
use crate::clock::BlockWindow;
use tracing::warn;

/// What one block's dispatch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatch {
    pub executed: usize,
    pub slips: usize,
}

/// Runs due events at their sample offsets, once per block.
pub struct BufferScheduler<E> {
    queue: EventQueue<E>,
}

impl<E> BufferScheduler<E> {
    pub fn new(queue: EventQueue<E>) -> Self {
        Self { queue }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Hands every event with `deadline < window.end` to `perform`, earliest
    /// first. Later events stay queued for the blocks that contain them.
    pub fn dispatch(&mut self, window: &BlockWindow, mut perform: impl FnMut(E, &EventContext)) -> Dispatch {
        self.queue.collect();
        let mut summary = Dispatch::default();
        while let Some(deadline) = self.queue.peek_deadline() {
            if deadline >= window.end {
                break;
            }
            let Some((_, event)) = self.queue.pop() else {
                break;
            };
            let ctx = EventContext::new(window, deadline);
            if ctx.slipped {
                summary.slips += 1;
                warn!(
                    deadline = deadline.raw(),
                    block_start = window.start.raw(),
                    late_units = window.start - deadline,
                    "scheduling slip; running late event at offset 0"
                );
            }
            perform(event, &ctx);
            summary.executed += 1;
        }
        summary
    }

    pub fn close(&self) {
        self.queue.close();
    }
}
