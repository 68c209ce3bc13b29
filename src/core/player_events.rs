//! Notifications published on the `EventBus` for UI/timeline collaborators.

use serde::Serialize;

use super::media::TimeRange;
use super::playback_state::PlaybackState;
use super::video::Video;

// === Playback ===

/// Playback flags changed (emitted only on semantic difference)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlaybackStateEvent(pub PlaybackState);

/// Position advanced while playing, or settled after a seek/pause
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VideoTimeChangeEvent {
    pub current_time: f64,
    pub frame: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlaybackRateEvent {
    pub rate: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EndedEvent;

// === Seeking ===

/// Public seek started. Only the owning (newest) request emits this.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeekingEvent {
    pub to_time: f64,
    pub to_timecode: String,
    pub from_time: f64,
    pub from_timecode: String,
}

/// Public seek settled on a frame. Superseded requests never emit this.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SeekedEvent {
    pub current_time: f64,
    pub current_timecode: String,
    pub previous_time: f64,
    pub previous_timecode: String,
}

// === Loading ===

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BufferingEvent {
    pub buffered_timespans: Vec<TimeRange>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VideoLoadedEvent {
    pub video: Video,
}

/// Load or decode failure reported by the runtime
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VideoErrorEvent {
    pub message: String,
}
