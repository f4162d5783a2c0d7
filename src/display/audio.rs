//! Conversion of captured audio to floats for synchronized playback

use crate::capture::format::AudioSampleType;

/// Converts interleaved integer samples into `dst`, returning the number of
/// samples written. `dst` keeps its allocation across frames.
pub(crate) fn convert_to_floats(
    dst: &mut Vec<f32>,
    payload: &[u8],
    sample_type: AudioSampleType,
) -> usize {
    dst.clear();

    match sample_type {
        AudioSampleType::Int16 => {
            dst.extend(
                payload
                    .chunks_exact(2)
                    .map(|b| i16::from_ne_bytes([b[0], b[1]]) as f32 / i16::MAX as f32),
            );
        }
        AudioSampleType::Int32 => {
            dst.extend(
                payload
                    .chunks_exact(4)
                    .map(|b| i32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as f32 / i32::MAX as f32),
            );
        }
    }

    dst.len()
}
