//! Video and audio format descriptors negotiated with the capture hardware

use serde::{Deserialize, Serialize};

use crate::capture::timecode::FLICKS_PER_SECOND;

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Let the hardware pick the highest-quality format the signal supports.
    UseBestQuality,
    /// 8-bit 4:2:2 packed YUV (UYVY).
    Yuv8,
    /// 10-bit 4:2:2 packed YUV (v210).
    Yuv10,
    /// 8-bit ARGB.
    Argb8,
    /// 8-bit BGRA.
    Bgra8,
    /// 10-bit RGB (r210).
    Rgb10,
}

impl PixelFormat {
    /// Row width in bytes for a frame of the given pixel width.
    pub fn byte_width(&self, width: u32) -> usize {
        let w = width as usize;
        match self {
            // the hardware resolves best-quality to a packed YUV mode
            Self::UseBestQuality | Self::Yuv8 => w * 2,
            Self::Yuv10 => (w + 47) / 48 * 128,
            Self::Argb8 | Self::Bgra8 => w * 4,
            Self::Rgb10 => (w + 63) / 64 * 256,
        }
    }

    /// Bytes per addressable texel group, used by sinks to validate staging copies.
    pub fn byte_depth(&self) -> usize {
        4
    }
}

/// Field dominance of an incoming signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldDominance {
    #[default]
    Unknown,
    /// Lower scan lines are captured first, then the upper scan lines.
    LowerFieldFirst,
    /// Upper scan lines are captured first, then the lower scan lines.
    UpperFieldFirst,
    /// All scan lines at once.
    Progressive,
    /// Progressive content carried as an upper and lower field pair.
    ProgressiveSegmented,
}

impl FieldDominance {
    /// Whether the signal carries two temporally distinct fields per frame.
    pub fn is_interlaced(&self) -> bool {
        matches!(self, Self::LowerFieldFirst | Self::UpperFieldFirst)
    }
}

/// Sample width of an incoming audio packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSampleType {
    Int16,
    Int32,
}

impl AudioSampleType {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::Int16 => 2,
            Self::Int32 => 4,
        }
    }
}

/// Color space of an incoming signal, or an override requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    #[default]
    UseDeviceSignal,
    Bt601,
    Bt709,
    Bt2020,
}

/// Transfer function of an incoming signal, or an override requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransferFunction {
    #[default]
    UseDeviceSignal,
    Sdr,
    Hlg,
    Pq,
}

/// The video configuration reported by the hardware when a stream starts or
/// changes mode. Frame storage is sized from `byte_width * byte_height`, so a
/// new descriptor invalidates every previously allocated frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFormat {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub byte_width: usize,
    pub byte_height: usize,
    pub byte_depth: usize,
    pub pixel_format: PixelFormat,
    pub color_space: ColorSpace,
    pub transfer_function: TransferFunction,
    pub field_dominance: FieldDominance,
    /// Duration of one frame in flicks.
    pub frame_duration: i64,
    pub frame_rate_num: u32,
    pub frame_rate_den: u32,
}

impl VideoFormat {
    /// Builds a descriptor with byte sizing derived from the pixel format.
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        field_dominance: FieldDominance,
        frame_rate_num: u32,
        frame_rate_den: u32,
    ) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            byte_width: pixel_format.byte_width(width),
            byte_height: height as usize,
            byte_depth: pixel_format.byte_depth(),
            pixel_format,
            color_space: ColorSpace::default(),
            transfer_function: TransferFunction::default(),
            field_dominance,
            frame_duration: FLICKS_PER_SECOND * frame_rate_den as i64 / frame_rate_num as i64,
            frame_rate_num,
            frame_rate_den,
        }
    }

    /// Total bytes of one stored video frame.
    pub fn frame_bytes(&self) -> usize {
        self.byte_width * self.byte_height
    }
}

/// The audio configuration is fixed by the capture layer, so the worst-case
/// packet size is known up front. If the configuration becomes selectable, the
/// negotiated values must be surfaced here instead.
#[derive(Debug, Clone, Copy)]
pub struct AudioLayout {
    pub channels: u32,
    pub bytes_per_sample: u32,
    pub sample_rate: u32,
    pub min_frame_rate: u32,
}

impl AudioLayout {
    pub const DEFAULT: Self = Self {
        channels: 2,
        bytes_per_sample: 2,
        sample_rate: 48_000,
        min_frame_rate: 24,
    };

    /// Largest audio payload a single frame can carry.
    pub fn worst_case_bytes(&self) -> usize {
        (self.channels * self.bytes_per_sample * self.sample_rate / self.min_frame_rate) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_width_matches_packing() {
        assert_eq!(PixelFormat::Yuv8.byte_width(1920), 3840);
        assert_eq!(PixelFormat::Bgra8.byte_width(1920), 7680);
        // v210 packs 48 pixels into 128 bytes
        assert_eq!(PixelFormat::Yuv10.byte_width(48), 128);
        assert_eq!(PixelFormat::Yuv10.byte_width(49), 256);
    }

    #[test]
    fn frame_duration_divides_evenly_for_video_rates() {
        for (num, den) in [(24, 1), (25, 1), (30, 1), (50, 1), (60, 1), (30_000, 1001), (60_000, 1001)] {
            let format = VideoFormat::new("test", 16, 16, PixelFormat::Yuv8, FieldDominance::Progressive, num, den);
            assert_eq!(
                format.frame_duration * num as i64,
                FLICKS_PER_SECOND * den as i64,
                "rate {num}/{den} should divide the tick rate exactly"
            );
        }
    }

    #[test]
    fn worst_case_audio_covers_lowest_frame_rate() {
        // 2 ch x 2 B x 48000 Hz / 24 fps
        assert_eq!(AudioLayout::DEFAULT.worst_case_bytes(), 8000);
    }
}
