pub mod audio;
pub mod present;
pub mod sink;

pub use present::SampleStatus;
pub use sink::{FieldPass, FrameSink};
