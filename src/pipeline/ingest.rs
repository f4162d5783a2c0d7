//! Producer-side frame ingest, invoked from the capture thread
//!
//! The delivery callback holds the shared queue lock only for the copy and
//! metadata writes; listener dispatch happens after release so a slow or
//! broken listener cannot stall the render side.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam::utils::CachePadded;
use metrics::counter;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::capture::format::VideoFormat;
use crate::capture::frame::{InputAudioFrame, InputVideoFrame};
use crate::capture::timecode::Timecode;
use crate::device::callbacks::{dispatch, Listeners};
use crate::device::source::{InputError, StatusSeverity};
use crate::pipeline::cell::FrameLayout;
use crate::pipeline::queue::FrameQueue;

/// Everything guarded by the queue lock.
///
/// The lock is shared between the capture thread and the render tick; both
/// sides keep their critical sections to copies and metadata writes.
pub(crate) struct SharedState {
    pub queue: Option<FrameQueue>,
    pub format: Option<VideoFormat>,
    /// Frames lost to overwrites since the current stream epoch began.
    pub dropped_frames: u32,
    /// Queue length to apply at the next presentation tick.
    pub pending_queue_len: usize,
    /// Whether the incoming signal carries drop-frame timecode; only the
    /// delivery callback can tell, so the latest observation is cached here.
    pub is_drop_frame: bool,
    /// Timecode of the most recently presented frame.
    pub timestamp: Option<Timecode>,
    /// How long the currently shown frame has been on screen, in flicks.
    pub frame_elapsed: i64,
    pub last_error: InputError,
    pub status: Option<(String, StatusSeverity)>,
}

impl SharedState {
    pub(crate) fn new(queue_len: usize) -> Self {
        Self {
            queue: None,
            format: None,
            dropped_frames: 0,
            pending_queue_len: queue_len,
            is_drop_frame: false,
            timestamp: None,
            frame_elapsed: 0,
            last_error: InputError::NoError,
            status: None,
        }
    }
}

/// Ingest counters, written from the capture thread.
#[derive(Default)]
pub struct IngestStats {
    pub frames_received: AtomicU64,
    pub audio_packets: AtomicU64,
    pub oversize_frames: AtomicU64,
}

/// The delivery surface handed to a capture source.
///
/// Cloneable and thread-safe; the capture layer calls it from its own
/// delivery thread while the device consumes from the render tick.
#[derive(Clone)]
pub struct IngestHandle {
    pub(crate) shared: Arc<Mutex<SharedState>>,
    pub(crate) listeners: Arc<Listeners>,
    pub(crate) stats: Arc<CachePadded<IngestStats>>,
}

impl IngestHandle {
    /// Accepts one delivered frame, copying it into the queue.
    ///
    /// Frames arriving before the queue exists are discarded. Never blocks on
    /// the consumer: a full queue overwrites its oldest slot and the loss is
    /// counted instead.
    pub fn frame_arrived(&self, video: &InputVideoFrame<'_>, audio: Option<&InputAudioFrame<'_>>) {
        let (dropped, truncated) = {
            let mut state = self.shared.lock();
            let SharedState {
                queue,
                dropped_frames,
                is_drop_frame,
                ..
            } = &mut *state;

            // only receive frames once the queue has been initialized
            let Some(queue) = queue.as_mut() else {
                return;
            };

            let (cell, lost_unpresented) = queue.enqueue();
            if lost_unpresented {
                *dropped_frames += 1;
            }

            let outcome = cell.copy_from(video, audio);
            *is_drop_frame = cell.timecode().is_drop_frame();

            (lost_unpresented, !outcome.video_fit || !outcome.audio_fit)
        };

        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
        if dropped {
            counter!("chronos_frames_dropped").increment(1);
        }
        if truncated {
            self.stats.oversize_frames.fetch_add(1, Ordering::Relaxed);
            counter!("chronos_truncated_frames").increment(1);
            warn!(
                declared = video.data.len(),
                "frame payload exceeded the allocated cell, excess bytes discarded"
            );
        }

        dispatch("video_frame_arrived", &self.listeners.video, |cb| cb(video));

        if let Some(audio) = audio {
            self.stats.audio_packets.fetch_add(1, Ordering::Relaxed);
            dispatch("audio_frame_arrived", &self.listeners.audio, |cb| cb(audio));
        }
    }

    /// Rebuilds the queue for a new stream format.
    ///
    /// Allocated cells are sized for exactly one format, so the old queue is
    /// discarded wholesale and the dropped-frame count starts a new epoch.
    pub fn format_changed(&self, format: VideoFormat) {
        let mut state = self.shared.lock();
        let layout = FrameLayout::for_format(&format);

        match FrameQueue::new(state.pending_queue_len, layout) {
            Ok(queue) => {
                info!(name = %format.name, "video format changed, rebuilding frame queue");
                state.queue = Some(queue);
                state.format = Some(format);
                state.dropped_frames = 0;
            }
            Err(err) => {
                error!(%err, "could not rebuild frame queue for the new format");
            }
        }
    }

    /// Records a condition reported by the hardware layer.
    ///
    /// Conditions are surfaced to polling callers; they never interrupt the
    /// queue or unwind into the delivery thread.
    pub fn report_error(&self, error: InputError, severity: StatusSeverity, message: &str) {
        match severity {
            StatusSeverity::Info => info!(?error, message),
            StatusSeverity::Warning => warn!(?error, message),
            StatusSeverity::Error => tracing::error!(?error, message),
        }

        let mut state = self.shared.lock();
        state.last_error = error;
        state.status = Some((message.to_owned(), severity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::format::{FieldDominance, PixelFormat};
    use crate::capture::timecode::FLICKS_PER_SECOND;
    use std::sync::atomic::AtomicUsize;

    fn handle_with_queue(capacity: usize) -> IngestHandle {
        let mut state = SharedState::new(capacity);
        let format = VideoFormat::new(
            "test 30p",
            4,
            2,
            PixelFormat::Yuv8,
            FieldDominance::Progressive,
            30,
            1,
        );
        state.queue = Some(FrameQueue::new(capacity, FrameLayout::for_format(&format)).unwrap());
        state.format = Some(format);

        IngestHandle {
            shared: Arc::new(Mutex::new(state)),
            listeners: Arc::new(Listeners::default()),
            stats: Arc::new(CachePadded::new(IngestStats::default())),
        }
    }

    fn video(position: i64, data: &[u8]) -> InputVideoFrame<'_> {
        InputVideoFrame {
            data,
            width: 4,
            height: 2,
            pixel_format: PixelFormat::Yuv8,
            field_dominance: FieldDominance::Progressive,
            frame_duration: FLICKS_PER_SECOND / 30,
            hardware_reference_timestamp: 0,
            stream_timestamp: position * (FLICKS_PER_SECOND / 30),
            timecode: None,
        }
    }

    #[test]
    fn frames_before_initialization_are_discarded() {
        let handle = IngestHandle {
            shared: Arc::new(Mutex::new(SharedState::new(3))),
            listeners: Arc::new(Listeners::default()),
            stats: Arc::new(CachePadded::new(IngestStats::default())),
        };

        handle.frame_arrived(&video(0, &[0u8; 16]), None);

        assert!(handle.shared.lock().queue.is_none());
        // discarded before any accounting
        assert_eq!(handle.stats.frames_received.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn drop_counter_matches_overwrites_of_unpresented_frames() {
        let handle = handle_with_queue(2);
        let payload = [0u8; 16];

        for i in 0..6 {
            handle.frame_arrived(&video(i, &payload), None);
        }

        // first two filled the ring, the remaining four each displaced one
        assert_eq!(handle.shared.lock().dropped_frames, 4);
        assert_eq!(handle.stats.frames_received.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn format_change_resets_the_drop_epoch() {
        let handle = handle_with_queue(2);
        for i in 0..6 {
            handle.frame_arrived(&video(i, &[0u8; 16]), None);
        }
        assert!(handle.shared.lock().dropped_frames > 0);

        let new_format = VideoFormat::new(
            "test 60p",
            8,
            4,
            PixelFormat::Yuv8,
            FieldDominance::Progressive,
            60,
            1,
        );
        handle.format_changed(new_format.clone());

        let state = handle.shared.lock();
        assert_eq!(state.dropped_frames, 0);
        assert_eq!(state.format.as_ref().unwrap(), &new_format);
        assert!(state.queue.as_ref().unwrap().is_empty());
    }

    #[test]
    fn listener_panic_does_not_corrupt_ingest() {
        let handle = handle_with_queue(2);
        let delivered = Arc::new(AtomicUsize::new(0));

        handle
            .listeners
            .video
            .add(Arc::new(|_: &InputVideoFrame| panic!("broken listener")));
        let delivered_b = delivered.clone();
        handle.listeners.video.add(Arc::new(move |_: &InputVideoFrame| {
            delivered_b.fetch_add(1, Ordering::Relaxed);
        }));

        for i in 0..3 {
            handle.frame_arrived(&video(i, &[0u8; 16]), None);
        }

        // the second listener saw every frame
        assert_eq!(delivered.load(Ordering::Relaxed), 3);
        // and the queue kept filling normally
        let state = handle.shared.lock();
        assert_eq!(state.queue.as_ref().unwrap().len(), 2);
        assert_eq!(state.dropped_frames, 1);
    }

    #[test]
    fn error_reports_are_recorded_not_raised() {
        let handle = handle_with_queue(1);
        handle.report_error(
            InputError::NoInputSource,
            StatusSeverity::Error,
            "no input source",
        );

        let state = handle.shared.lock();
        assert_eq!(state.last_error, InputError::NoInputSource);
        let (message, severity) = state.status.clone().unwrap();
        assert_eq!(message, "no input source");
        assert_eq!(severity, StatusSeverity::Error);
    }
}
