//! Frame selection for the presentation path

use crate::capture::format::FieldDominance;
use crate::display::sink::FieldPass;
use crate::pipeline::queue::FrameQueue;

/// How well the buffered content covered a requested presentation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleStatus {
    /// A buffered frame overlapped the requested time.
    Ok,
    /// The requested time precedes the oldest buffered frame; the oldest was
    /// presented as a best effort.
    Ahead,
    /// The requested time is newer than everything buffered; the newest was
    /// presented as a best effort.
    Behind,
    /// Nothing is buffered.
    DataMissing,
}

/// Finds the queued frame overlapping `time_flicks`.
///
/// Returns the selected logical index and the position of the requested time
/// within that frame. The time is rounded to the nearest frame by offsetting
/// it half a frame; interlaced frames hold two fields, which moves the
/// rounding midpoint to the first quarter of the frame.
pub(crate) fn try_get_sample(
    queue: &FrameQueue,
    time_flicks: i64,
    frame_duration: i64,
    field_dominance: FieldDominance,
) -> (SampleStatus, Option<(usize, i64)>) {
    if queue.is_empty() {
        return (SampleStatus::DataMissing, None);
    }

    let offset = if field_dominance.is_interlaced() {
        frame_duration / 4
    } else {
        frame_duration / 2
    };
    let time_with_offset = time_flicks + offset;

    for (index, cell) in queue.iter().enumerate() {
        let time_in_frame = time_with_offset - cell.timecode().flicks();

        if time_in_frame < 0 {
            return (SampleStatus::Ahead, Some((index, 0)));
        }
        if time_in_frame < cell.frame_duration() {
            return (SampleStatus::Ok, Some((index, time_in_frame)));
        }
    }

    (
        SampleStatus::Behind,
        Some((queue.len() - 1, frame_duration - 1)),
    )
}

/// Picks which field to unpack for a frame that has been on screen for
/// `time_in_frame` flicks.
pub(crate) fn field_pass(
    field_dominance: FieldDominance,
    time_in_frame: i64,
    frame_duration: i64,
) -> FieldPass {
    let first_half = time_in_frame < frame_duration / 2;
    match field_dominance {
        FieldDominance::LowerFieldFirst => {
            if first_half {
                FieldPass::Lower
            } else {
                FieldPass::Upper
            }
        }
        FieldDominance::UpperFieldFirst => {
            if first_half {
                FieldPass::Upper
            } else {
                FieldPass::Lower
            }
        }
        _ => FieldPass::Full,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::format::{PixelFormat, VideoFormat};
    use crate::capture::frame::InputVideoFrame;
    use crate::pipeline::cell::FrameLayout;

    const DURATION: i64 = 3000;

    fn queue_with_timecodes(timecodes: &[i64], dominance: FieldDominance) -> FrameQueue {
        let mut queue = FrameQueue::new(
            timecodes.len().max(1),
            FrameLayout {
                video_bytes: 8,
                audio_bytes: 8,
            },
        )
        .unwrap();

        for &flicks in timecodes {
            let frame = InputVideoFrame {
                data: &[0u8; 8],
                width: 2,
                height: 2,
                pixel_format: PixelFormat::Yuv8,
                field_dominance: dominance,
                frame_duration: DURATION,
                hardware_reference_timestamp: 0,
                stream_timestamp: flicks,
                timecode: None,
            };
            let (cell, _) = queue.enqueue();
            cell.copy_from(&frame, None);
        }
        queue
    }

    #[test]
    fn matching_time_selects_the_overlapping_frame() {
        let queue = queue_with_timecodes(&[0, 3000, 6000], FieldDominance::Progressive);

        let (status, sample) = try_get_sample(&queue, 4000, DURATION, FieldDominance::Progressive);

        assert_eq!(status, SampleStatus::Ok);
        // 4000 + 1500 lands 2500 flicks into the frame at 3000
        assert_eq!(sample, Some((1, 2500)));
    }

    #[test]
    fn time_before_buffered_content_is_ahead() {
        let queue = queue_with_timecodes(&[0, 3000, 6000], FieldDominance::Progressive);

        let (status, sample) = try_get_sample(&queue, -2000, DURATION, FieldDominance::Progressive);

        assert_eq!(status, SampleStatus::Ahead);
        // best effort: the oldest frame, clamped to its start
        assert_eq!(sample, Some((0, 0)));
    }

    #[test]
    fn time_past_buffered_content_is_behind() {
        let queue = queue_with_timecodes(&[0, 3000, 6000], FieldDominance::Progressive);

        let (status, sample) = try_get_sample(&queue, 100_000, DURATION, FieldDominance::Progressive);

        assert_eq!(status, SampleStatus::Behind);
        assert_eq!(sample, Some((2, DURATION - 1)));
    }

    #[test]
    fn empty_queue_reports_data_missing() {
        let queue = FrameQueue::new(
            1,
            FrameLayout {
                video_bytes: 8,
                audio_bytes: 8,
            },
        )
        .unwrap();

        let (status, sample) = try_get_sample(&queue, 0, DURATION, FieldDominance::Progressive);

        assert_eq!(status, SampleStatus::DataMissing);
        assert_eq!(sample, None);
    }

    #[test]
    fn interlaced_rounding_uses_a_quarter_frame() {
        let queue = queue_with_timecodes(&[0, 3000], FieldDominance::LowerFieldFirst);

        // 2400 + 750 lands past the end of frame 0, into frame 1
        let (status, sample) =
            try_get_sample(&queue, 2400, DURATION, FieldDominance::LowerFieldFirst);
        assert_eq!(status, SampleStatus::Ok);
        assert_eq!(sample, Some((1, 150)));

        // the shallower interlaced offset shifts where the time lands
        let queue = queue_with_timecodes(&[0, 3000], FieldDominance::Progressive);
        let (_, sample) = try_get_sample(&queue, 2400, DURATION, FieldDominance::Progressive);
        assert_eq!(sample, Some((1, 900)));
    }

    #[test]
    fn field_choice_follows_dominance_and_elapsed_time() {
        assert_eq!(
            field_pass(FieldDominance::Progressive, 0, DURATION),
            FieldPass::Full
        );
        assert_eq!(
            field_pass(FieldDominance::LowerFieldFirst, 0, DURATION),
            FieldPass::Lower
        );
        assert_eq!(
            field_pass(FieldDominance::LowerFieldFirst, 1500, DURATION),
            FieldPass::Upper
        );
        assert_eq!(
            field_pass(FieldDominance::UpperFieldFirst, 1499, DURATION),
            FieldPass::Upper
        );
        assert_eq!(
            field_pass(FieldDominance::UpperFieldFirst, 1500, DURATION),
            FieldPass::Lower
        );
    }

    #[test]
    fn sample_scan_uses_per_cell_durations() {
        // a format change mid-queue leaves mixed durations; the scan must use
        // each cell's own duration for the overlap test
        let format = VideoFormat::new(
            "mixed",
            2,
            2,
            PixelFormat::Yuv8,
            FieldDominance::Progressive,
            30,
            1,
        );
        let mut queue =
            FrameQueue::new(2, FrameLayout::for_format(&format)).unwrap();

        for (flicks, duration) in [(0i64, 6000i64), (6000, 3000)] {
            let frame = InputVideoFrame {
                data: &[0u8; 8],
                width: 2,
                height: 2,
                pixel_format: PixelFormat::Yuv8,
                field_dominance: FieldDominance::Progressive,
                frame_duration: duration,
                hardware_reference_timestamp: 0,
                stream_timestamp: flicks,
                timecode: None,
            };
            let (cell, _) = queue.enqueue();
            cell.copy_from(&frame, None);
        }

        let (status, sample) = try_get_sample(&queue, 4000, 3000, FieldDominance::Progressive);
        assert_eq!(status, SampleStatus::Ok);
        assert_eq!(sample, Some((0, 5500)));
    }
}
