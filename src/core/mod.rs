//! Playback sync engine: timecode math, state, frame clock, sync loop and
//! the seek orchestrating controller.
//!
//! Independent of any UI; the media runtime is reached through
//! `media::MediaElement`.

pub mod controller;
pub mod error;
pub mod event_bus;
pub mod frame_clock;
pub mod media;
pub mod playback_state;
pub mod player_events;
pub mod seek_token;
pub mod sync_loop;
pub mod timecode;
pub mod video;

pub use controller::{PlaybackFuture, RequestOutcome, SeekFuture, VideoController};
pub use error::{PlayerError, TimecodeError};
pub use event_bus::EventBus;
pub use frame_clock::{FrameClock, FrameClockBackend};
pub use media::{MediaElement, MediaEvent};
pub use playback_state::{PlaybackState, PlaybackStateMachine};
pub use timecode::{FrameRate, Timecode};
pub use video::{Protocol, Video, VideoLoadOptions};
