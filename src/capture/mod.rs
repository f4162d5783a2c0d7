pub mod format;
pub mod frame;
pub mod timecode;

pub use format::{AudioSampleType, FieldDominance, PixelFormat, VideoFormat};
pub use frame::{InputAudioFrame, InputVideoFrame, SynchronizedAudioFrame};
pub use timecode::{Timecode, TimecodeSource, FLICKS_PER_SECOND};
