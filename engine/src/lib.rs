#[cfg(not(unix))]
compile_error!("rtblock-engine needs POSIX threads");

pub mod clock;
pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod hw;
pub mod processor;
pub mod sched;
pub mod sync;

pub use clock::{ClockSnapshot, Time, TimeBase};
pub use domain::{Domain, PosixDomain, Promoter};
pub use driver::{Driver, DriverState, StatsSnapshot, StopHandle};
pub use error::{DriverError, HwError, PromotionError, SubmitError, SyncError};
pub use hw::{DriverOptions, Frames, Hardware, HwParams, SimHardware, SimOptions};
pub use processor::{BlockContext, Processor};
pub use sched::{EventContext, Scheduler};
