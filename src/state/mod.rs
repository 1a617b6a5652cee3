pub mod hop;
pub mod sample;
pub mod stats;
pub mod target;

pub use hop::*;
pub use sample::*;
pub use stats::*;
pub use target::*;
