//! SMPTE timecode codec: time ↔ frame number ↔ `HH:MM:SS:FF` text.
//!
//! All frame math is exact integer arithmetic over the rational frame rate.
//! Seconds coming from the runtime are converted once to `i128` nanoseconds;
//! nothing is accumulated in floating point, so multi-hour positions map to
//! the same frame as the first minute does.
//!
//! # Drop-frame
//!
//! Fractional NTSC rates (29.97, 59.94, ...) skip frame *labels* `;00` and
//! `;01` (`;00`..`;03` at 59.94) at the start of every minute except every
//! tenth. Frame numbers themselves are never skipped:
//!
//! ```text
//! frame 1799 -> 00:00:59;29
//! frame 1800 -> 00:01:00;02
//! frame 17982 -> 00:10:00;00
//! ```
//!
//! `round(rate)` is only used to bucket frames into labels, never for
//! duration math.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::TimecodeError;
use super::video::Video;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Bias applied before flooring a time to a frame, absorbs binary float noise
/// on frame-boundary times (e.g. `2 * 1001 / 30000` stored as f64).
const FRAME_EPSILON_NANOS: i128 = 1_000;

/// Strict timecode shape: two-digit fields, separator picks the convention.
static TIMECODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{2}):([0-5]\d):([0-5]\d)([:;.])(\d{2})$").expect("valid timecode regex")
});

fn seconds_to_nanos(seconds: f64) -> i128 {
    (seconds * 1e9).round() as i128
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Exact rational frame rate (`30000/1001`, `25/1`, ...).
///
/// Serialized as text (`"30000/1001"`) so config files and load options stay
/// human-editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    pub const FPS_23_976: FrameRate = FrameRate { num: 24000, den: 1001 };
    pub const FPS_24: FrameRate = FrameRate { num: 24, den: 1 };
    pub const FPS_25: FrameRate = FrameRate { num: 25, den: 1 };
    pub const FPS_29_97: FrameRate = FrameRate { num: 30000, den: 1001 };
    pub const FPS_30: FrameRate = FrameRate { num: 30, den: 1 };
    pub const FPS_50: FrameRate = FrameRate { num: 50, den: 1 };
    pub const FPS_59_94: FrameRate = FrameRate { num: 60000, den: 1001 };
    pub const FPS_60: FrameRate = FrameRate { num: 60, den: 1 };

    /// Build from numerator/denominator, reduced to lowest terms.
    pub fn new(num: u32, den: u32) -> Result<Self, TimecodeError> {
        if num == 0 || den == 0 {
            return Err(TimecodeError::InvalidFrameRate(format!("{}/{}", num, den)));
        }
        let g = gcd(num, den);
        Ok(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// Build from a decimal rate. NTSC spellings (23.976, 29.97, 59.94, ...)
    /// map to their exact `n000/1001` rational.
    pub fn from_fps(fps: f64) -> Result<Self, TimecodeError> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(TimecodeError::InvalidFrameRate(fps.to_string()));
        }
        let nearest = fps.round();
        if (fps - nearest).abs() < 1e-6 {
            return Self::new(nearest as u32, 1);
        }
        let ntsc = (fps * 1.001).round();
        if ntsc >= 1.0 && (ntsc / 1.001 - fps).abs() < 0.005 {
            return Self::new(ntsc as u32 * 1000, 1001);
        }
        Self::new((fps * 1000.0).round() as u32, 1000)
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// `round(rate)`: frames per timecode second
    pub fn rounded(&self) -> u32 {
        ((self.num as u64 + self.den as u64 / 2) / self.den as u64) as u32
    }

    pub fn is_fractional(&self) -> bool {
        self.den != 1
    }

    /// Labels dropped at each non-tenth minute, `None` if the rate has no
    /// drop-frame convention.
    pub fn drop_frames_per_minute(&self) -> Option<u32> {
        let rounded = self.rounded();
        if self.is_fractional() && rounded > 0 && rounded % 30 == 0 {
            Some(rounded / 15)
        } else {
            None
        }
    }

    pub fn supports_drop_frame(&self) -> bool {
        self.drop_frames_per_minute().is_some()
    }

    /// Duration of one frame in seconds
    pub fn frame_duration(&self) -> f64 {
        self.den as f64 / self.num as f64
    }

    /// Index of the frame displayed at `seconds` (floor). Negative and NaN
    /// times map to frame 0.
    pub fn frame_at(&self, seconds: f64) -> u64 {
        if seconds.is_nan() || seconds <= 0.0 {
            return 0;
        }
        if seconds.is_infinite() {
            return u64::MAX;
        }
        let nanos = seconds_to_nanos(seconds) + FRAME_EPSILON_NANOS;
        (nanos * self.num as i128 / (self.den as i128 * NANOS_PER_SEC)) as u64
    }

    /// Number of frames needed to cover `seconds` (ceil).
    pub fn frame_count(&self, seconds: f64) -> u64 {
        if !seconds.is_finite() || seconds <= 0.0 {
            return 0;
        }
        let nanos = (seconds_to_nanos(seconds) - FRAME_EPSILON_NANOS).max(0);
        let divisor = self.den as i128 * NANOS_PER_SEC;
        ((nanos * self.num as i128 + divisor - 1) / divisor) as u64
    }

    /// Start time of `frame` in seconds
    pub fn time_of(&self, frame: u64) -> f64 {
        // Both products are exact integers in f64 for any realistic length,
        // so the single division is correctly rounded.
        frame as f64 * self.den as f64 / self.num as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for FrameRate {
    type Err = TimecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((num, den)) = s.split_once('/') {
            let num = num.trim().parse::<u32>();
            let den = den.trim().parse::<u32>();
            return match (num, den) {
                (Ok(num), Ok(den)) => Self::new(num, den),
                _ => Err(TimecodeError::InvalidFrameRate(s.to_string())),
            };
        }
        let fps = s
            .parse::<f64>()
            .map_err(|_| TimecodeError::InvalidFrameRate(s.to_string()))?;
        Self::from_fps(fps)
    }
}

impl TryFrom<String> for FrameRate {
    type Error = TimecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FrameRate> for String {
    fn from(rate: FrameRate) -> Self {
        rate.to_string()
    }
}

/// Parsed timecode fields.
///
/// `FromStr` only checks the textual shape; whether the fields make sense
/// for a given video is decided by [`parse_timecode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timecode {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub frames: u32,
    pub drop_frame: bool,
    pub audio_only: bool,
}

impl Timecode {
    /// `:` non-drop, `;` drop-frame, `.` audio-only
    pub fn separator(&self) -> char {
        if self.audio_only {
            '.'
        } else if self.drop_frame {
            ';'
        } else {
            ':'
        }
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}{}{:02}",
            self.hours,
            self.minutes,
            self.seconds,
            self.separator(),
            self.frames
        )
    }
}

impl FromStr for Timecode {
    type Err = TimecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = TIMECODE_RE
            .captures(s)
            .ok_or_else(|| TimecodeError::InvalidFormat(s.to_string()))?;

        // Regex guarantees two ASCII digits per field
        let field = |i: usize| caps[i].parse::<u32>().unwrap_or(0);
        let separator = &caps[4];

        Ok(Timecode {
            hours: field(1),
            minutes: field(2),
            seconds: field(3),
            frames: field(5),
            drop_frame: separator == ";",
            audio_only: separator == ".",
        })
    }
}

/// Convert a frame number to timecode fields.
///
/// `drop_frame` is ignored for rates without a drop-frame convention.
pub fn frame_to_timecode(frame: u64, rate: FrameRate, drop_frame: bool, audio_only: bool) -> Timecode {
    let fps = rate.rounded().max(1) as u64;
    let drop = if drop_frame { rate.drop_frames_per_minute() } else { None };

    let mut label = frame;
    if let Some(drop) = drop.map(u64::from) {
        let frames_per_minute = fps * 60 - drop;
        let frames_per_10_minutes = fps * 600 - drop * 9;
        let tens = frame / frames_per_10_minutes;
        let remainder = frame % frames_per_10_minutes;

        label += drop * 9 * tens;
        if remainder > drop {
            label += drop * ((remainder - drop) / frames_per_minute);
        }
    }

    let frames_per_hour = fps * 3600;
    let frames_per_minute = fps * 60;

    Timecode {
        hours: (label / frames_per_hour) as u32,
        minutes: ((label % frames_per_hour) / frames_per_minute) as u32,
        seconds: ((label % frames_per_minute) / fps) as u32,
        frames: (label % fps) as u32,
        drop_frame: drop.is_some(),
        audio_only,
    }
}

/// Inverse of [`frame_to_timecode`].
pub fn timecode_to_frame(tc: &Timecode, rate: FrameRate) -> Result<u64, TimecodeError> {
    let fps = rate.rounded().max(1);
    if tc.frames >= fps {
        return Err(TimecodeError::FrameOutOfRange {
            frames: tc.frames,
            max: fps - 1,
        });
    }

    let fps = fps as u64;
    let (h, m, s, f) = (
        tc.hours as u64,
        tc.minutes as u64,
        tc.seconds as u64,
        tc.frames as u64,
    );
    let mut frame = (h * 3600 + m * 60 + s) * fps + f;

    if tc.drop_frame {
        let drop = rate
            .drop_frames_per_minute()
            .ok_or_else(|| TimecodeError::DropFrameUnsupported(rate.to_string()))?
            as u64;
        if s == 0 && m % 10 != 0 && f < drop {
            return Err(TimecodeError::DroppedLabel(tc.to_string()));
        }
        let total_minutes = h * 60 + m;
        frame -= drop * (total_minutes - total_minutes / 10);
    }

    Ok(frame)
}

/// Timecode of the frame shown at `seconds` on `video`'s timeline
/// (init segment offset removed, ffom added).
pub fn format_time(seconds: f64, video: &Video) -> Timecode {
    format_frame(video.frame_at(seconds), video)
}

/// Timecode label of a media frame index on `video`'s timeline.
pub fn format_frame(frame: u64, video: &Video) -> Timecode {
    frame_to_timecode(
        frame.saturating_add(video.ffom_frame()),
        video.frame_rate,
        video.drop_frame,
        video.audio_only,
    )
}

/// Parse timecode text into a media frame index for `video`.
///
/// Rejects malformed text, drop/non-drop convention mismatches, labels that
/// drop-frame counting never produces and positions before the ffom.
pub fn parse_timecode(text: &str, video: &Video) -> Result<u64, TimecodeError> {
    let mut tc: Timecode = text.parse()?;

    if tc.audio_only {
        if !video.audio_only {
            return Err(TimecodeError::AudioOnlyMismatch(text.to_string()));
        }
        tc.drop_frame = video.drop_frame;
    } else if tc.drop_frame != video.drop_frame {
        return Err(TimecodeError::DropFrameMismatch {
            text: text.to_string(),
            video_drop_frame: video.drop_frame,
        });
    }

    let absolute = timecode_to_frame(&tc, video.frame_rate)?;
    absolute
        .checked_sub(video.ffom_frame())
        .ok_or_else(|| TimecodeError::BeforeFirstFrame {
            text: text.to_string(),
            ffom: video.ffom.map(|tc| tc.to_string()).unwrap_or_default(),
        })
}
