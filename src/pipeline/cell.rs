//! Reusable storage for one in-flight video frame and its audio payload

use crate::capture::format::{AudioLayout, AudioSampleType, FieldDominance, VideoFormat};
use crate::capture::frame::{InputAudioFrame, InputVideoFrame};
use crate::capture::timecode::Timecode;

/// Lifecycle of a queue cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStatus {
    /// Allocated but never written.
    #[default]
    Uninitialized,
    /// Holds a frame that arrived but has not been shown yet.
    Queued,
    /// Holds a frame that has been shown at least once.
    Presented,
}

/// Byte sizing for cell allocations, fixed at queue creation from the format
/// in force. A format change invalidates the layout and with it every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub video_bytes: usize,
    pub audio_bytes: usize,
}

impl FrameLayout {
    pub fn for_format(format: &VideoFormat) -> Self {
        Self {
            video_bytes: format.frame_bytes(),
            audio_bytes: AudioLayout::DEFAULT.worst_case_bytes(),
        }
    }
}

/// What a copy into a cell actually transferred.
#[derive(Debug, Clone, Copy)]
pub struct CopyOutcome {
    /// False when the declared video size exceeded the cell and was truncated.
    pub video_fit: bool,
    /// False when the audio payload exceeded the cell and was truncated.
    pub audio_fit: bool,
}

/// A fixed-capacity cell holding one decoded frame.
///
/// The backing buffers are allocated once and reused for every frame written
/// into the cell; only the metadata changes between frames.
pub struct BufferedFrame {
    status: FrameStatus,
    video: Vec<u8>,
    audio: Vec<u8>,
    frame_duration: i64,
    timecode: Timecode,
    field_dominance: FieldDominance,
    audio_len: usize,
    audio_sample_type: AudioSampleType,
    audio_channel_count: u32,
}

impl BufferedFrame {
    pub fn new(layout: FrameLayout) -> Self {
        Self {
            status: FrameStatus::Uninitialized,
            video: vec![0; layout.video_bytes],
            audio: vec![0; layout.audio_bytes],
            frame_duration: 0,
            timecode: Timecode::default(),
            field_dominance: FieldDominance::Unknown,
            audio_len: 0,
            audio_sample_type: AudioSampleType::Int16,
            audio_channel_count: 0,
        }
    }

    /// Copies a delivered frame into this cell and marks it queued.
    ///
    /// Copies are clamped to the cell capacity; a declared length larger than
    /// the allocation loses its excess bytes rather than failing the frame.
    pub fn copy_from(
        &mut self,
        video: &InputVideoFrame<'_>,
        audio: Option<&InputAudioFrame<'_>>,
    ) -> CopyOutcome {
        self.frame_duration = video.frame_duration;
        // resolve the timecode once, falling back to the stream position
        self.timecode = video.timecode_source().resolve(video.frame_duration);
        self.field_dominance = video.field_dominance;

        let video_len = video.data.len().min(self.video.len());
        self.video[..video_len].copy_from_slice(&video.data[..video_len]);

        let mut audio_fit = true;
        match audio {
            Some(packet) => {
                self.audio_sample_type = packet.sample_type;
                self.audio_channel_count = packet.channel_count;

                let declared = packet.data.len();
                self.audio_len = declared.min(self.audio.len());
                self.audio[..self.audio_len].copy_from_slice(&packet.data[..self.audio_len]);
                audio_fit = declared <= self.audio.len();
            }
            None => {
                self.audio_len = 0;
            }
        }

        self.status = FrameStatus::Queued;

        CopyOutcome {
            video_fit: video.data.len() <= self.video.len(),
            audio_fit,
        }
    }

    pub fn status(&self) -> FrameStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: FrameStatus) {
        self.status = status;
    }

    /// The full video allocation; sinks consume the whole cell image.
    pub fn video(&self) -> &[u8] {
        &self.video
    }

    /// The audio bytes carried by the current frame, empty when the frame
    /// arrived without an audio packet.
    pub fn audio(&self) -> &[u8] {
        &self.audio[..self.audio_len]
    }

    pub fn audio_len(&self) -> usize {
        self.audio_len
    }

    pub fn audio_sample_type(&self) -> AudioSampleType {
        self.audio_sample_type
    }

    pub fn audio_channel_count(&self) -> u32 {
        self.audio_channel_count
    }

    pub fn frame_duration(&self) -> i64 {
        self.frame_duration
    }

    pub fn timecode(&self) -> Timecode {
        self.timecode
    }

    pub fn field_dominance(&self) -> FieldDominance {
        self.field_dominance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::format::PixelFormat;
    use crate::capture::timecode::FLICKS_PER_SECOND;

    fn layout() -> FrameLayout {
        FrameLayout {
            video_bytes: 64,
            audio_bytes: 16,
        }
    }

    fn video_frame<'a>(data: &'a [u8]) -> InputVideoFrame<'a> {
        InputVideoFrame {
            data,
            width: 8,
            height: 4,
            pixel_format: PixelFormat::Yuv8,
            field_dominance: FieldDominance::Progressive,
            frame_duration: FLICKS_PER_SECOND / 30,
            hardware_reference_timestamp: 0,
            stream_timestamp: 0,
            timecode: None,
        }
    }

    #[test]
    fn copy_round_trips_payload_bytes() {
        let mut cell = BufferedFrame::new(layout());
        let payload: Vec<u8> = (0..64u8).collect();

        let outcome = cell.copy_from(&video_frame(&payload), None);

        assert!(outcome.video_fit);
        assert_eq!(cell.video(), payload.as_slice());
        assert_eq!(cell.status(), FrameStatus::Queued);
        assert_eq!(cell.audio_len(), 0);
    }

    #[test]
    fn oversize_video_is_truncated_not_rejected() {
        let mut cell = BufferedFrame::new(layout());
        let payload = vec![0xabu8; 100];

        let outcome = cell.copy_from(&video_frame(&payload), None);

        assert!(!outcome.video_fit);
        assert_eq!(cell.video(), &payload[..64]);
        // metadata is still recorded for the truncated frame
        assert_eq!(cell.status(), FrameStatus::Queued);
        assert_eq!(cell.frame_duration(), FLICKS_PER_SECOND / 30);
    }

    #[test]
    fn zero_length_frame_updates_metadata_only() {
        let mut cell = BufferedFrame::new(layout());
        cell.copy_from(&video_frame(&[0x11u8; 64]), None);

        cell.copy_from(&video_frame(&[]), None);

        assert_eq!(cell.status(), FrameStatus::Queued);
        // previous contents are untouched
        assert_eq!(cell.video()[0], 0x11);
    }

    #[test]
    fn audio_packet_populates_audio_metadata() {
        let mut cell = BufferedFrame::new(layout());
        let samples = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let audio = InputAudioFrame {
            data: &samples,
            sample_type: AudioSampleType::Int16,
            channel_count: 2,
            sample_count: 2,
            timestamp: 0,
        };

        let outcome = cell.copy_from(&video_frame(&[0u8; 64]), Some(&audio));

        assert!(outcome.audio_fit);
        assert_eq!(cell.audio(), &samples);
        assert_eq!(cell.audio_channel_count(), 2);

        // a following frame without audio clears the payload
        cell.copy_from(&video_frame(&[0u8; 64]), None);
        assert!(cell.audio().is_empty());
    }
}
