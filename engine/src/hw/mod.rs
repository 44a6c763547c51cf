mod frames;
mod options;
pub mod sim;
mod traits;

pub use frames::Frames;
pub use options::DriverOptions;
pub use sim::{SimHardware, SimOptions, SimProbe};
pub use traits::{Hardware, HwParams};
