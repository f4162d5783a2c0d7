//! A paced signal generator standing in for capture hardware
//!
//! Plays the hardware role end to end: a dedicated delivery thread pushes
//! test-pattern frames with accompanying audio through the ingest handle at
//! the configured rate, exactly as a capture card's callback thread would.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info};

use crate::capture::format::{AudioSampleType, FieldDominance, VideoFormat};
use crate::capture::frame::{InputAudioFrame, InputVideoFrame};
use crate::capture::timecode::{Timecode, FLICKS_PER_SECOND};
use crate::device::source::{CaptureRequest, CaptureSource, SourceError};
use crate::pipeline::ingest::IngestHandle;
use crate::SyntheticConfig;

/// A software capture source generating a moving bar pattern.
pub struct SyntheticSource {
    config: SyntheticConfig,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl CaptureSource for SyntheticSource {
    fn start(
        &mut self,
        request: &CaptureRequest,
        ingest: IngestHandle,
    ) -> Result<VideoFormat, SourceError> {
        if self.worker.is_some() {
            return Err(SourceError::DeviceAlreadyUsed);
        }

        let format = VideoFormat::new(
            format!("synthetic {}x{}p{}", self.config.width, self.config.height, self.config.fps),
            self.config.width,
            self.config.height,
            request.pixel_format,
            FieldDominance::Progressive,
            self.config.fps,
            1,
        );

        info!(name = %format.name, "starting synthetic signal generator");

        self.stop.store(false, Ordering::SeqCst);
        let stop = self.stop.clone();
        let thread_format = format.clone();

        self.worker = Some(std::thread::spawn(move || {
            generate(thread_format, ingest, stop);
        }));

        Ok(format)
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            debug!("synthetic signal generator stopped");
        }
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        CaptureSource::stop(self);
    }
}

/// The delivery thread body: one frame per tick until told to stop.
fn generate(format: VideoFormat, ingest: IngestHandle, stop: Arc<AtomicBool>) {
    let frame_duration = format.frame_duration;
    let tick = Duration::from_secs_f64(
        frame_duration as f64 / FLICKS_PER_SECOND as f64,
    );
    let samples_per_frame = 48_000 / format.frame_rate_num.max(1);

    let started = Instant::now();
    let mut position: i64 = 0;

    while !stop.load(Ordering::SeqCst) {
        let stream_timestamp = position * frame_duration;
        let payload = pattern(&format, position);
        let audio = silence(samples_per_frame);

        let video = InputVideoFrame {
            data: &payload,
            width: format.width,
            height: format.height,
            pixel_format: format.pixel_format,
            field_dominance: format.field_dominance,
            frame_duration,
            hardware_reference_timestamp: (started.elapsed().as_secs_f64()
                * FLICKS_PER_SECOND as f64) as i64,
            stream_timestamp,
            timecode: Some(Timecode::from_flicks(frame_duration, stream_timestamp, false)),
        };
        let audio = InputAudioFrame {
            data: &audio,
            sample_type: AudioSampleType::Int16,
            channel_count: 2,
            sample_count: samples_per_frame,
            timestamp: stream_timestamp,
        };

        ingest.frame_arrived(&video, Some(&audio));

        position += 1;
        std::thread::sleep(tick);
    }
}

/// A horizontal bar pattern that scrolls one row per frame.
fn pattern(format: &VideoFormat, position: i64) -> Bytes {
    let row = format.byte_width.max(1);
    let mut image = vec![0u8; format.frame_bytes()];
    for (y, line) in image.chunks_mut(row).enumerate() {
        let shade = (((y as i64 + position) / 8) % 2 * 0xa0) as u8;
        line.fill(shade);
    }
    Bytes::from(image)
}

/// Interleaved stereo int16 silence.
fn silence(samples_per_frame: u32) -> Bytes {
    Bytes::from(vec![0u8; samples_per_frame as usize * 2 * 2])
}
