pub mod callbacks;
pub mod input;
pub mod source;
pub mod synthetic;

pub use callbacks::CallbackId;
pub use input::{DeviceState, InputDevice, MAX_QUEUE_LENGTH, MIN_QUEUE_LENGTH};
pub use source::{CaptureRequest, CaptureSource, InputError, SourceError, StatusSeverity};
pub use synthetic::SyntheticSource;
