//! Buffer-synchronous event scheduling.
//!
//! Non-real-time threads submit timed events through a [`Scheduler`]; the
//! real-time thread drains them once per block through a [`BufferScheduler`],
//! which runs every due event at its sample offset before the block is
//! processed.

mod dispatch;
mod event;
mod queue;

pub use dispatch::{BufferScheduler, Dispatch};
pub use event::{EventContext, sample_offset};
pub use queue::{EventQueue, Scheduler, event_queue};
