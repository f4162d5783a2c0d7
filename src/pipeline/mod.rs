pub mod cell;
pub mod ingest;
pub mod queue;

pub use cell::{BufferedFrame, FrameLayout, FrameStatus};
pub use ingest::IngestHandle;
pub use queue::{FrameQueue, QueueError};
