//! Broadcast timecode represented in flicks

use std::cmp;
use std::fmt;

/// Ticks per second for all frame timing arithmetic.
///
/// A flick is 1/705,600,000 of a second; every common video rate (including
/// the fractional NTSC rates) divides it without a remainder.
pub const FLICKS_PER_SECOND: i64 = 705_600_000;

/// A broadcast timecode, stored both as a flicks value and as its
/// hours:minutes:seconds:frames decomposition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timecode {
    flicks: i64,
    hour: u32,
    minute: u32,
    second: u32,
    frame: u32,
    is_drop_frame: bool,
    frame_duration: i64,
}

impl Timecode {
    /// Builds a timecode from its components.
    pub fn from_components(
        frame_duration: i64,
        hour: u32,
        minute: u32,
        second: u32,
        frame: u32,
        is_drop_frame: bool,
    ) -> Self {
        // a malformed frame can report a zero duration; degrade rather than divide by it
        if frame_duration <= 0 {
            return Self {
                is_drop_frame,
                ..Self::default()
            };
        }

        // frames per second (ceiled)
        let fps = (FLICKS_PER_SECOND + frame_duration - 1) / frame_duration;
        let fpm = fps * 60;
        let fph = fpm * 60;

        let frames =
            fph * hour as i64 + fpm * minute as i64 + fps * second as i64 + frame as i64;

        Self {
            flicks: frames * frame_duration,
            hour,
            minute,
            second,
            frame,
            is_drop_frame,
            frame_duration,
        }
    }

    /// Builds a timecode from a time in flicks.
    pub fn from_flicks(frame_duration: i64, flicks: i64, is_drop_frame: bool) -> Self {
        if frame_duration <= 0 {
            return Self {
                flicks,
                is_drop_frame,
                ..Self::default()
            };
        }

        // frames per second (ceiled)
        let fps = (FLICKS_PER_SECOND + frame_duration - 1) / frame_duration;
        let fpm = fps * 60;
        let fph = fpm * 60;

        let mut frames = flicks / frame_duration;

        let mut hours = frames / fph;
        frames -= hours * fph;

        let minutes = frames / fpm;
        frames -= minutes * fpm;

        let seconds = frames / fps;
        frames -= seconds * fps;

        // 24 hours wrapping around
        hours %= 24;

        Self {
            flicks,
            hour: hours as u32,
            minute: minutes as u32,
            second: seconds as u32,
            frame: frames as u32,
            is_drop_frame,
            frame_duration,
        }
    }

    /// Decodes a BCD timecode as delivered by capture hardware, or `None` when
    /// the hardware reports no timecode (`0xffffffff`).
    pub fn from_bcd(frame_duration: i64, bcd: u32) -> Option<Self> {
        if bcd == 0xffff_ffff {
            return None;
        }

        let t = bcd as i64;

        let hour = ((t >> 28) & 0x3) * 10 + ((t >> 24) & 0xf);
        let minute = ((t >> 20) & 0x7) * 10 + ((t >> 16) & 0xf);
        let second = ((t >> 12) & 0x7) * 10 + ((t >> 8) & 0xf);
        let mut frame = ((t >> 4) & 0x3) * 10 + (t & 0xf);

        // rates above 50 Hz carry the field number in a spare flag bit
        if frame_duration <= FLICKS_PER_SECOND / 50 {
            let field = (t >> 7) & 0x1;
            frame = 2 * frame + field;
        }

        let is_drop_frame = (t >> 6) & 0x1 != 0;

        Some(Self::from_components(
            frame_duration,
            hour as u32,
            minute as u32,
            second as u32,
            frame as u32,
            is_drop_frame,
        ))
    }

    /// Encodes this timecode as hardware BCD.
    pub fn to_bcd(&self) -> u32 {
        let mut frame = self.frame as i64;

        // divide into fields when using a frame rate over 50 Hz
        let mut field = 0i64;
        if self.frame_duration <= FLICKS_PER_SECOND / 50 {
            field = frame & 1;
            frame /= 2;
        }

        let hour = self.hour as i64;
        let minute = self.minute as i64;
        let second = self.second as i64;

        let mut bcd = 0i64;
        bcd += (hour / 10) * 0x1000_0000 + (hour % 10) * 0x0100_0000;
        bcd += (minute / 10) * 0x0010_0000 + (minute % 10) * 0x0001_0000;
        bcd += (second / 10) * 0x0000_1000 + (second % 10) * 0x0000_0100;
        bcd += field * 0x0000_0080;
        bcd += if self.is_drop_frame { 0x0000_0040 } else { 0 };
        bcd += (frame / 10) * 0x0000_0010 + (frame % 10) * 0x0000_0001;

        bcd as u32
    }

    /// The time in flicks.
    pub fn flicks(&self) -> i64 {
        self.flicks
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn second(&self) -> u32 {
        self.second
    }

    pub fn frame(&self) -> u32 {
        self.frame
    }

    pub fn is_drop_frame(&self) -> bool {
        self.is_drop_frame
    }

    /// The duration of the frame in flicks.
    pub fn frame_duration(&self) -> i64 {
        self.frame_duration
    }

    /// Returns a copy shifted by the given number of flicks.
    pub fn offset_by(&self, flicks: i64) -> Self {
        Self::from_flicks(self.frame_duration, self.flicks + flicks, self.is_drop_frame)
    }
}

impl PartialEq for Timecode {
    fn eq(&self, other: &Self) -> bool {
        self.flicks == other.flicks && self.is_drop_frame == other.is_drop_frame
    }
}

impl Eq for Timecode {}

impl PartialOrd for Timecode {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timecode {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        self.flicks
            .cmp(&other.flicks)
            .then_with(|| self.is_drop_frame.cmp(&other.is_drop_frame))
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.is_drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hour, self.minute, self.second, sep, self.frame
        )
    }
}

/// Where a frame's timecode came from.
///
/// Resolved to a concrete [`Timecode`] exactly once, when the frame is copied
/// into the queue; never recomputed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimecodeSource {
    /// A timecode delivered by the hardware alongside the frame.
    Provided(Timecode),
    /// No hardware timecode; synthesize one from the stream position in flicks.
    Synthesized(i64),
}

impl TimecodeSource {
    pub fn resolve(&self, frame_duration: i64) -> Timecode {
        match *self {
            Self::Provided(timecode) => timecode,
            Self::Synthesized(stream_flicks) => {
                Timecode::from_flicks(frame_duration, stream_flicks, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcd_round_trip() {
        // 60 Hz and 59.94 Hz
        for (mul, div) in [(1i64, 60i64), (1001, 60_000)] {
            let frame_duration = FLICKS_PER_SECOND * mul / div;
            let mut i = 0i64;
            while i < 2 * 60 * 60 * 60 {
                let t1 = i * frame_duration;
                let bcd = Timecode::from_flicks(frame_duration, t1, false).to_bcd();
                let t2 = Timecode::from_bcd(frame_duration, bcd).unwrap().flicks();
                assert_eq!(t1, t2, "frame = {i}, bcd = {bcd:#x}");
                i += 13;
            }
        }
    }

    #[test]
    fn missing_hardware_timecode_decodes_to_none() {
        assert_eq!(Timecode::from_bcd(FLICKS_PER_SECOND / 30, 0xffff_ffff), None);
    }

    #[test]
    fn drop_frame_flag_survives_bcd() {
        let frame_duration = FLICKS_PER_SECOND * 1001 / 30_000;
        let timecode = Timecode::from_components(frame_duration, 1, 2, 3, 4, true);
        let decoded = Timecode::from_bcd(frame_duration, timecode.to_bcd()).unwrap();
        assert!(decoded.is_drop_frame());
        assert_eq!(decoded.flicks(), timecode.flicks());
    }

    #[test]
    fn display_uses_drop_frame_separator() {
        let frame_duration = FLICKS_PER_SECOND / 30;
        let plain = Timecode::from_components(frame_duration, 10, 20, 30, 12, false);
        let drop = Timecode::from_components(frame_duration, 10, 20, 30, 12, true);
        assert_eq!(plain.to_string(), "10:20:30:12");
        assert_eq!(drop.to_string(), "10:20:30;12");
    }

    #[test]
    fn hours_wrap_at_midnight() {
        let frame_duration = FLICKS_PER_SECOND / 25;
        let one_day_frames = 24i64 * 60 * 60 * 25;
        let timecode = Timecode::from_flicks(frame_duration, one_day_frames * frame_duration, false);
        assert_eq!(timecode.hour(), 0);
        assert_eq!(timecode.minute(), 0);
    }

    #[test]
    fn timecodes_order_by_flicks() {
        let frame_duration = FLICKS_PER_SECOND / 30;
        let early = Timecode::from_components(frame_duration, 0, 0, 1, 0, false);
        let late = Timecode::from_components(frame_duration, 0, 0, 2, 0, false);
        assert!(early < late);
        assert!(late >= early);
        assert_eq!(early.max(late), late);
    }

    #[test]
    fn synthesized_timecode_tracks_stream_position() {
        let frame_duration = FLICKS_PER_SECOND / 24;
        let source = TimecodeSource::Synthesized(frame_duration * 48);
        let timecode = source.resolve(frame_duration);
        assert_eq!(timecode.second(), 2);
        assert_eq!(timecode.frame(), 0);
    }
}
