//! Error types for timecode conversion and player requests.
//!
//! Validation failures are returned before any runtime interaction, so a
//! caller receiving an error can assume nothing changed on the media element.

/// Timecode parsing and conversion errors
#[derive(Debug, Clone, PartialEq)]
pub enum TimecodeError {
    /// Text does not match `HH:MM:SS:FF`, `HH:MM:SS;FF` or `HH:MM:SS.FF`
    InvalidFormat(String),
    /// Drop-frame separator used against a non-drop video (or vice versa)
    DropFrameMismatch { text: String, video_drop_frame: bool },
    /// Audio-only separator used against a video with picture
    AudioOnlyMismatch(String),
    /// Frame field does not fit the frame rate
    FrameOutOfRange { frames: u32, max: u32 },
    /// Label that drop-frame counting never produces (`;00`/`;01` at a minute start)
    DroppedLabel(String),
    /// Timecode lies before the first frame of media
    BeforeFirstFrame { text: String, ffom: String },
    /// Frame rate is zero, negative or unparsable
    InvalidFrameRate(String),
    /// Drop-frame counting requested for a rate that has no drop-frame convention
    DropFrameUnsupported(String),
}

impl std::fmt::Display for TimecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimecodeError::InvalidFormat(text) => write!(f, "Invalid timecode: '{}'", text),
            TimecodeError::DropFrameMismatch { text, video_drop_frame } => {
                if *video_drop_frame {
                    write!(f, "Timecode '{}' is non-drop but video uses drop-frame", text)
                } else {
                    write!(f, "Timecode '{}' is drop-frame but video is non-drop", text)
                }
            }
            TimecodeError::AudioOnlyMismatch(text) => {
                write!(f, "Audio-only timecode '{}' used with a video track", text)
            }
            TimecodeError::FrameOutOfRange { frames, max } => {
                write!(f, "Frame field {} out of range (max {})", frames, max)
            }
            TimecodeError::DroppedLabel(text) => {
                write!(f, "Timecode '{}' names a dropped frame label", text)
            }
            TimecodeError::BeforeFirstFrame { text, ffom } => {
                write!(f, "Timecode '{}' is before first frame of media {}", text, ffom)
            }
            TimecodeError::InvalidFrameRate(rate) => write!(f, "Invalid frame rate: '{}'", rate),
            TimecodeError::DropFrameUnsupported(rate) => {
                write!(f, "Frame rate {} has no drop-frame convention", rate)
            }
        }
    }
}

impl std::error::Error for TimecodeError {}

/// Errors raised by `VideoController` requests
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerError {
    Timecode(TimecodeError),
    /// Request issued before any video was attached
    NoVideoLoaded,
    /// Time value is NaN or infinite
    InvalidTime(f64),
    /// Percent outside `[0, 100]` or not finite
    InvalidPercent(f64),
    /// Playback rate must be finite and positive
    InvalidPlaybackRate(f64),
    /// Runtime refused a request (e.g. `play()` rejected)
    Runtime(String),
    /// Source could not be loaded
    LoadFailed(String),
    /// Runtime did not acknowledge a request within the outer safety bound
    Timeout(&'static str),
    /// Request was superseded before the runtime acknowledged it
    Cancelled,
}

impl std::fmt::Display for PlayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayerError::Timecode(e) => write!(f, "{}", e),
            PlayerError::NoVideoLoaded => write!(f, "No video loaded"),
            PlayerError::InvalidTime(t) => write!(f, "Invalid time: {}", t),
            PlayerError::InvalidPercent(p) => {
                write!(f, "Invalid percent: {} (expected 0..=100)", p)
            }
            PlayerError::InvalidPlaybackRate(r) => write!(f, "Invalid playback rate: {}", r),
            PlayerError::Runtime(msg) => write!(f, "Media runtime error: {}", msg),
            PlayerError::LoadFailed(msg) => write!(f, "Failed to load video: {}", msg),
            PlayerError::Timeout(what) => write!(f, "Timed out waiting for {}", what),
            PlayerError::Cancelled => write!(f, "Request superseded"),
        }
    }
}

impl std::error::Error for PlayerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlayerError::Timecode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TimecodeError> for PlayerError {
    fn from(e: TimecodeError) -> Self {
        PlayerError::Timecode(e)
    }
}
