//! Frame descriptors delivered by the capture hardware
//!
//! The video and audio descriptors borrow memory owned by the capture layer
//! and are only valid for the duration of the delivery callback; anything that
//! outlives the callback must be copied into a queue cell first.

use crate::capture::format::{AudioSampleType, FieldDominance, PixelFormat};
use crate::capture::timecode::{Timecode, TimecodeSource};

/// One video frame as delivered by the hardware.
#[derive(Debug, Clone, Copy)]
pub struct InputVideoFrame<'a> {
    /// The frame contents, valid only for the delivery callback.
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub field_dominance: FieldDominance,
    /// Duration of the frame in flicks.
    pub frame_duration: i64,
    /// Hardware clock time at which the frame was received, in flicks. Not
    /// expected to advance a consistent amount between frames.
    pub hardware_reference_timestamp: i64,
    /// Position of the frame within the stream, in flicks. Advances one frame
    /// duration per frame and skips over frames the hardware dropped.
    pub stream_timestamp: i64,
    /// Timecode carried by the signal, when available.
    pub timecode: Option<Timecode>,
}

impl InputVideoFrame<'_> {
    /// The timecode to record for this frame, falling back to the stream
    /// position when the signal carries none.
    pub fn timecode_source(&self) -> TimecodeSource {
        match self.timecode {
            Some(timecode) => TimecodeSource::Provided(timecode),
            None => TimecodeSource::Synthesized(self.stream_timestamp),
        }
    }
}

/// One audio packet as delivered by the hardware, interleaved by channel.
#[derive(Debug, Clone, Copy)]
pub struct InputAudioFrame<'a> {
    /// The sample contents, valid only for the delivery callback.
    pub data: &'a [u8],
    pub sample_type: AudioSampleType,
    pub channel_count: u32,
    pub sample_count: u32,
    /// Stream time in flicks of the video frame this packet accompanies.
    pub timestamp: i64,
}

impl InputAudioFrame<'_> {
    /// Byte length of the packet.
    pub fn byte_len(&self) -> usize {
        self.sample_count as usize * self.channel_count as usize * self.sample_type.bytes_per_sample()
    }
}

/// Audio for one presented frame, converted to floats for playback.
#[derive(Debug, Clone, Copy)]
pub struct SynchronizedAudioFrame<'a> {
    /// Interleaved samples in the -1.0..=1.0 range.
    pub samples: &'a [f32],
    pub channel_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::timecode::FLICKS_PER_SECOND;

    #[test]
    fn timecode_falls_back_to_stream_position() {
        let duration = FLICKS_PER_SECOND / 30;
        let frame = InputVideoFrame {
            data: &[],
            width: 16,
            height: 16,
            pixel_format: PixelFormat::Yuv8,
            field_dominance: FieldDominance::Progressive,
            frame_duration: duration,
            hardware_reference_timestamp: 12_345,
            stream_timestamp: duration * 30,
            timecode: None,
        };

        let resolved = frame.timecode_source().resolve(duration);
        assert_eq!(resolved.second(), 1);
        assert_eq!(resolved.flicks(), duration * 30);
    }

    #[test]
    fn provided_timecode_wins_over_stream_position() {
        let duration = FLICKS_PER_SECOND / 30;
        let hardware = Timecode::from_components(duration, 0, 0, 10, 0, false);
        let frame = InputVideoFrame {
            data: &[],
            width: 16,
            height: 16,
            pixel_format: PixelFormat::Yuv8,
            field_dominance: FieldDominance::Progressive,
            frame_duration: duration,
            hardware_reference_timestamp: 0,
            stream_timestamp: 0,
            timecode: Some(hardware),
        };

        assert_eq!(frame.timecode_source().resolve(duration), hardware);
    }

    #[test]
    fn audio_byte_len_accounts_for_sample_width() {
        let frame = InputAudioFrame {
            data: &[],
            sample_type: AudioSampleType::Int32,
            channel_count: 2,
            sample_count: 100,
            timestamp: 0,
        };
        assert_eq!(frame.byte_len(), 800);
    }
}
