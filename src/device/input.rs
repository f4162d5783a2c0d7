//! Input device lifecycle and the consumer side of the frame queue

use std::sync::Arc;
use std::time::Instant;

use crossbeam::utils::CachePadded;
use metrics::{gauge, histogram};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::capture::format::{ColorSpace, PixelFormat, TransferFunction};
use crate::capture::frame::SynchronizedAudioFrame;
use crate::capture::timecode::{Timecode, FLICKS_PER_SECOND};
use crate::device::callbacks::{
    dispatch, AudioFrameCallback, CallbackId, Listeners, SynchronizedAudioCallback,
    VideoFrameCallback,
};
use crate::device::source::{CaptureRequest, CaptureSource, InputError, StatusSeverity};
use crate::display::audio::convert_to_floats;
use crate::display::present::{field_pass, try_get_sample, SampleStatus};
use crate::display::sink::{FieldPass, FrameSink};
use crate::pipeline::cell::{BufferedFrame, FrameLayout, FrameStatus};
use crate::pipeline::ingest::{IngestHandle, IngestStats, SharedState};
use crate::pipeline::queue::FrameQueue;
use crate::DeviceConfig;

/// Smallest supported queue depth. At depth 1 the only available frame is
/// also the next overwrite target, so presentation is best-effort.
pub const MIN_QUEUE_LENGTH: usize = 1;
/// Largest supported queue depth.
pub const MAX_QUEUE_LENGTH: usize = 8;

/// Samples of headroom for converted synchronized audio.
const SYNC_AUDIO_CAPACITY: usize = 128 * 1024;

/// Lifecycle of an input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceState {
    #[default]
    Uninitialized,
    Initializing,
    Active,
    Reinitializing,
    Disposed,
}

/// Snapshot of the ingest counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub frames_received: u64,
    pub audio_packets: u64,
    pub oversize_frames: u64,
}

/// A capture input: owns the frame queue, drives the source lifecycle, and
/// presents queued frames into a [`FrameSink`].
///
/// The capture thread writes through the [`IngestHandle`] created at start;
/// every consumer entry point here takes the same lock, so configuration and
/// teardown can never preempt an in-flight delivery.
pub struct InputDevice {
    state: DeviceState,
    should_run: bool,
    preview: bool,
    synchronized: bool,
    device_selection: Option<u32>,
    queue_length: usize,
    requested_pixel_format: PixelFormat,
    requested_color_space: ColorSpace,
    requested_transfer_function: TransferFunction,
    presentation_offset: i64,
    requires_reinit: bool,
    lifecycle_dirty: bool,
    source: Box<dyn CaptureSource>,
    shared: Arc<Mutex<SharedState>>,
    listeners: Arc<Listeners>,
    stats: Arc<CachePadded<IngestStats>>,
    sync_audio: Vec<f32>,
    last_update: Option<Instant>,
}

impl InputDevice {
    pub fn new(config: DeviceConfig, source: Box<dyn CaptureSource>) -> Self {
        let queue_length = config.queue_length.clamp(MIN_QUEUE_LENGTH, MAX_QUEUE_LENGTH);
        if queue_length != config.queue_length {
            warn!(
                requested = config.queue_length,
                applied = queue_length,
                "configured queue length outside supported range"
            );
        }

        Self {
            state: DeviceState::Uninitialized,
            should_run: false,
            preview: false,
            synchronized: false,
            device_selection: None,
            queue_length,
            requested_pixel_format: config.pixel_format,
            requested_color_space: config.color_space,
            requested_transfer_function: config.transfer_function,
            presentation_offset: config.presentation_offset,
            requires_reinit: false,
            lifecycle_dirty: false,
            source,
            shared: Arc::new(Mutex::new(SharedState::new(queue_length))),
            listeners: Arc::new(Listeners::default()),
            stats: Arc::new(CachePadded::new(IngestStats::default())),
            sync_audio: Vec::with_capacity(SYNC_AUDIO_CAPACITY),
            last_update: None,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == DeviceState::Active
    }

    /// Starts or stops the device the next time the lifecycle updates.
    pub fn set_running(&mut self, running: bool) {
        self.should_run = running;
        self.lifecycle_dirty = true;
    }

    /// Keeps the device live outside of normal running, mirroring an
    /// editor-style preview.
    pub fn set_preview(&mut self, preview: bool) {
        self.preview = preview;
        self.lifecycle_dirty = true;
    }

    /// Selects which logical input to open. Changing the selection while
    /// active schedules a reinitialization.
    pub fn set_device_selection(&mut self, selection: Option<u32>) {
        if self.device_selection != selection {
            self.device_selection = selection;
            self.mark_reinit();
        }
    }

    pub fn set_pixel_format(&mut self, format: PixelFormat) {
        if self.requested_pixel_format != format {
            self.requested_pixel_format = format;
            self.mark_reinit();
        }
    }

    pub fn set_color_space(&mut self, color_space: ColorSpace) {
        if self.requested_color_space != color_space {
            self.requested_color_space = color_space;
            self.mark_reinit();
        }
    }

    pub fn set_transfer_function(&mut self, transfer_function: TransferFunction) {
        if self.requested_transfer_function != transfer_function {
            self.requested_transfer_function = transfer_function;
            self.mark_reinit();
        }
    }

    fn mark_reinit(&mut self) {
        if self.state == DeviceState::Active {
            self.requires_reinit = true;
        }
        self.lifecycle_dirty = true;
    }

    /// Applies pending lifecycle changes.
    ///
    /// Rebuilds are deferred to this safe point rather than performed inside
    /// the setters, so a configuration change can never tear the device down
    /// under a frame that is mid-delivery or mid-presentation.
    pub fn update_lifecycle(&mut self) {
        if self.state == DeviceState::Disposed {
            return;
        }
        if !self.lifecycle_dirty && !self.requires_reinit {
            return;
        }
        self.lifecycle_dirty = false;

        let should_activate =
            (self.should_run || self.preview) && self.device_selection.is_some();

        match self.state {
            DeviceState::Uninitialized if should_activate => {
                self.state = DeviceState::Initializing;
                self.state = if self.initialize() {
                    DeviceState::Active
                } else {
                    DeviceState::Uninitialized
                };
            }
            DeviceState::Active if !should_activate => {
                self.teardown();
                self.state = DeviceState::Uninitialized;
            }
            DeviceState::Active if self.requires_reinit => {
                self.state = DeviceState::Reinitializing;
                self.teardown();
                self.state = if self.initialize() {
                    DeviceState::Active
                } else {
                    DeviceState::Uninitialized
                };
            }
            _ => {}
        }

        self.requires_reinit = false;
    }

    /// Tears the device down and releases the queue. Terminal.
    pub fn dispose(&mut self) {
        if self.state == DeviceState::Disposed {
            return;
        }
        if matches!(self.state, DeviceState::Active | DeviceState::Reinitializing) {
            self.teardown();
        }
        self.state = DeviceState::Disposed;
    }

    fn initialize(&mut self) -> bool {
        {
            let mut state = self.shared.lock();
            *state = SharedState::new(self.queue_length);
        }

        let Some(selection) = self.device_selection else {
            return false;
        };

        let request = CaptureRequest {
            device_selection: selection,
            pixel_format: self.requested_pixel_format,
            color_space: self.requested_color_space,
            transfer_function: self.requested_transfer_function,
        };
        let ingest = IngestHandle {
            shared: self.shared.clone(),
            listeners: self.listeners.clone(),
            stats: self.stats.clone(),
        };

        match self.source.start(&request, ingest) {
            Ok(format) => {
                let mut state = self.shared.lock();
                let layout = FrameLayout::for_format(&format);
                match FrameQueue::new(self.queue_length, layout) {
                    Ok(queue) => {
                        info!(
                            name = %format.name,
                            queue_length = self.queue_length,
                            "capture stream started"
                        );
                        state.queue = Some(queue);
                        state.format = Some(format);
                        true
                    }
                    Err(err) => {
                        error!(%err, "could not allocate the frame queue");
                        false
                    }
                }
            }
            Err(err) => {
                warn!(%err, "could not start capture source");
                let mut state = self.shared.lock();
                state.last_error = err.input_error();
                state.status = Some((err.to_string(), StatusSeverity::Error));
                false
            }
        }
    }

    fn teardown(&mut self) {
        self.source.stop();
        self.last_update = None;

        let mut state = self.shared.lock();
        *state = SharedState::new(self.queue_length);
    }

    // ------------------------------------------------------------------
    // Presentation
    // ------------------------------------------------------------------

    /// Free-running per-tick update: shows the oldest safely presentable
    /// frame and publishes it into the sink.
    pub fn perform_update(&mut self, sink: &mut dyn FrameSink) {
        self.update_lifecycle();
        if self.state != DeviceState::Active {
            self.last_update = None;
            return;
        }

        let delta = self.tick_delta();
        let started = Instant::now();

        let pass = {
            let mut state = self.shared.lock();

            // a queue-length change waits for this tick boundary
            let pending = state.pending_queue_len;
            let Some(queue) = state.queue.as_mut() else {
                return;
            };
            if let Err(err) = queue.set_capacity(pending) {
                error!(%err, "could not apply the queued capacity change");
            }

            let occupancy = queue.len();
            gauge!("chronos_queue_occupancy").set(occupancy as f64);
            if occupancy == 0 {
                state.timestamp = None;
                return;
            }

            // Presenting the oldest frame races the capture thread, which
            // overwrites that slot next; a depth of 2 or more lets us show
            // the second-oldest instead. At depth 1 the oldest is shown
            // anyway and tearing is possible.
            let index = if occupancy > 1 { 1 } else { 0 };

            if self.synchronized {
                // an external clock presents through present_at; just track
                // the frame we would have shown
                let timecode = state
                    .queue
                    .as_ref()
                    .and_then(|q| q.get(index).ok())
                    .map(|cell| cell.timecode());
                state.timestamp = timecode;
                return;
            }

            state.present_frame(
                &self.listeners,
                &mut self.sync_audio,
                sink,
                index,
                None,
                delta,
            )
        };

        if let Some(pass) = pass {
            sink.unpack(pass);
        }
        histogram!("chronos_present_time_us").record(started.elapsed().as_micros() as f64);
    }

    /// Presents the buffered frame matching an externally supplied time.
    ///
    /// Returns how well the buffer covered the request; on anything but
    /// [`SampleStatus::DataMissing`] a frame was published as a best effort.
    pub fn present_at(&mut self, sink: &mut dyn FrameSink, time_flicks: i64) -> SampleStatus {
        if self.state != DeviceState::Active || !self.synchronized {
            return SampleStatus::DataMissing;
        }

        let delta = self.tick_delta();
        let presentation_time = time_flicks - self.presentation_offset;

        let mut unpack = None;
        let status = {
            let mut state = self.shared.lock();

            let pending = state.pending_queue_len;
            let Some(queue) = state.queue.as_mut() else {
                return SampleStatus::DataMissing;
            };
            if let Err(err) = queue.set_capacity(pending) {
                error!(%err, "could not apply the queued capacity change");
            }

            let Some((frame_duration, dominance)) = state
                .format
                .as_ref()
                .map(|f| (f.frame_duration, f.field_dominance))
            else {
                return SampleStatus::DataMissing;
            };

            let (status, sample) = {
                let Some(queue) = state.queue.as_ref() else {
                    return SampleStatus::DataMissing;
                };
                try_get_sample(queue, presentation_time, frame_duration, dominance)
            };

            if let Some((index, time_in_frame)) = sample {
                unpack = state.present_frame(
                    &self.listeners,
                    &mut self.sync_audio,
                    sink,
                    index,
                    Some(time_in_frame),
                    delta,
                );
            }
            status
        };

        if let Some(pass) = unpack {
            sink.unpack(pass);
        }
        status
    }

    fn tick_delta(&mut self) -> i64 {
        let now = Instant::now();
        let delta = match self.last_update {
            Some(previous) => {
                let seconds = now.duration_since(previous).as_secs_f64();
                (seconds * FLICKS_PER_SECOND as f64) as i64
            }
            None => 0,
        };
        self.last_update = Some(now);
        delta
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Timecode of the most recently presented frame.
    pub fn timestamp(&self) -> Option<Timecode> {
        self.shared.lock().timestamp
    }

    /// Frames lost to overwrites in the current stream epoch.
    pub fn dropped_frame_count(&self) -> u32 {
        self.shared.lock().dropped_frames
    }

    /// Number of frames currently buffered.
    pub fn queue_occupancy(&self) -> usize {
        self.shared
            .lock()
            .queue
            .as_ref()
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Timecodes of the oldest and newest buffered frames, shifted by the
    /// presentation offset. Tells an external clock what latency it can ask
    /// for.
    pub fn buffer_range(&self) -> Option<(Timecode, Timecode)> {
        if self.state != DeviceState::Active {
            return None;
        }
        let state = self.shared.lock();
        let queue = state.queue.as_ref()?;
        let oldest = queue.front().ok()?.timecode();
        let newest = queue.back().ok()?.timecode();
        Some((
            oldest.offset_by(self.presentation_offset),
            newest.offset_by(self.presentation_offset),
        ))
    }

    /// Timecode of the newest buffered frame.
    pub fn poll_timecode(&self) -> Option<Timecode> {
        let state = self.shared.lock();
        let queue = state.queue.as_ref()?;
        queue.back().ok().map(|cell| cell.timecode())
    }

    /// The stream rate as `(numerator, denominator, is_drop_frame)`; for
    /// interlaced signals this is the field rate.
    pub fn frame_rate(&self) -> Option<(u32, u32, bool)> {
        if self.state != DeviceState::Active {
            return None;
        }
        let state = self.shared.lock();
        let format = state.format.as_ref()?;
        let factor = if format.field_dominance.is_interlaced() { 2 } else { 1 };
        Some((
            format.frame_rate_num * factor,
            format.frame_rate_den,
            state.is_drop_frame,
        ))
    }

    /// The most recent condition reported by the hardware layer.
    pub fn status(&self) -> Option<(String, StatusSeverity)> {
        self.shared.lock().status.clone()
    }

    pub fn last_error(&self) -> InputError {
        self.shared.lock().last_error
    }

    pub fn stats(&self) -> StatsSnapshot {
        use std::sync::atomic::Ordering;
        StatsSnapshot {
            frames_received: self.stats.frames_received.load(Ordering::Relaxed),
            audio_packets: self.stats.audio_packets.load(Ordering::Relaxed),
            oversize_frames: self.stats.oversize_frames.load(Ordering::Relaxed),
        }
    }

    pub fn has_input_source(&self) -> bool {
        self.source.has_input_source()
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    pub fn queue_length(&self) -> usize {
        self.queue_length
    }

    /// Requests a new queue depth, applied at the next presentation tick.
    pub fn set_queue_length(&mut self, length: usize) {
        let clamped = length.clamp(MIN_QUEUE_LENGTH, MAX_QUEUE_LENGTH);
        if clamped != length {
            warn!(
                requested = length,
                applied = clamped,
                "queue length outside supported range"
            );
        }
        self.queue_length = clamped;
        self.shared.lock().pending_queue_len = clamped;
    }

    pub fn synchronized(&self) -> bool {
        self.synchronized
    }

    /// Hands presentation control to an external clock; the free-running
    /// update keeps tracking timecodes but stops publishing frames.
    pub fn set_synchronized(&mut self, synchronized: bool) {
        self.synchronized = synchronized;
    }

    pub fn presentation_offset(&self) -> i64 {
        self.presentation_offset
    }

    pub fn set_presentation_offset(&mut self, offset_flicks: i64) {
        self.presentation_offset = offset_flicks;
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub fn add_video_frame_callback(
        &self,
        callback: impl Fn(&crate::capture::frame::InputVideoFrame) + Send + Sync + 'static,
    ) -> CallbackId {
        let callback: Arc<VideoFrameCallback> = Arc::new(callback);
        self.listeners.video.add(callback)
    }

    pub fn remove_video_frame_callback(&self, id: CallbackId) -> bool {
        self.listeners.video.remove(id)
    }

    pub fn add_audio_frame_callback(
        &self,
        callback: impl Fn(&crate::capture::frame::InputAudioFrame) + Send + Sync + 'static,
    ) -> CallbackId {
        let callback: Arc<AudioFrameCallback> = Arc::new(callback);
        self.listeners.audio.add(callback)
    }

    pub fn remove_audio_frame_callback(&self, id: CallbackId) -> bool {
        self.listeners.audio.remove(id)
    }

    pub fn add_synchronized_audio_callback(
        &self,
        callback: impl Fn(&SynchronizedAudioFrame) + Send + Sync + 'static,
    ) -> CallbackId {
        let callback: Arc<SynchronizedAudioCallback> = Arc::new(callback);
        self.listeners.synchronized_audio.add(callback)
    }

    pub fn remove_synchronized_audio_callback(&self, id: CallbackId) -> bool {
        self.listeners.synchronized_audio.remove(id)
    }
}

impl Drop for InputDevice {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl SharedState {
    /// Shows the frame at `index` and stages it into the sink.
    ///
    /// Runs with the queue lock held; the returned pass must be fed to
    /// `sink.unpack` only after the lock is released.
    fn present_frame(
        &mut self,
        listeners: &Listeners,
        sync_audio: &mut Vec<f32>,
        sink: &mut dyn FrameSink,
        index: usize,
        time_in_frame: Option<i64>,
        delta_flicks: i64,
    ) -> Option<FieldPass> {
        let SharedState {
            queue,
            format,
            timestamp,
            frame_elapsed,
            ..
        } = self;
        let (Some(queue), Some(format)) = (queue.as_mut(), format.as_ref()) else {
            return None;
        };
        let Ok(cell) = queue.get_mut(index) else {
            return None;
        };

        if cell.status() == FrameStatus::Queued {
            *frame_elapsed = 0;
            // deliver the audio exactly once, before the frame counts as shown
            present_audio(cell, listeners, sync_audio);
        }

        let elapsed = time_in_frame.unwrap_or(*frame_elapsed);

        sink.upload(cell.video(), format);
        let pass = field_pass(cell.field_dominance(), elapsed, cell.frame_duration());

        cell.set_status(FrameStatus::Presented);
        *timestamp = Some(cell.timecode());

        // track how long this frame stays on screen, for field parity on
        // re-presented interlaced frames
        *frame_elapsed += delta_flicks;

        Some(pass)
    }
}

/// Converts and dispatches the audio carried by a frame that is about to be
/// shown for the first time.
fn present_audio(cell: &BufferedFrame, listeners: &Listeners, sync_audio: &mut Vec<f32>) {
    if cell.audio_len() == 0 {
        return;
    }
    // skip the conversion entirely when nobody is listening
    if listeners.synchronized_audio.is_empty() {
        return;
    }

    let count = convert_to_floats(sync_audio, cell.audio(), cell.audio_sample_type());
    let frame = SynchronizedAudioFrame {
        samples: &sync_audio[..count],
        channel_count: cell.audio_channel_count(),
    };
    dispatch("synchronized_audio", &listeners.synchronized_audio, |cb| {
        cb(&frame)
    });
}
