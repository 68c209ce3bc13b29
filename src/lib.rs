//! framesync - frame-accurate playback synchronization core
//!
//! Keeps a best-effort, event-driven media runtime aligned to exact frame
//! positions expressed in SMPTE timecode (drop-frame included).

// Sync engine (timecode, state, frame clock, sync loop, controller)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod paths;
pub mod sim;

// Re-export commonly used types from core
pub use core::controller::{PlaybackFuture, RequestOutcome, SeekFuture, VideoController};
pub use core::error::{PlayerError, TimecodeError};
pub use core::event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
pub use core::media::{MediaElement, MediaEvent};
pub use core::timecode::{FrameRate, Timecode};
pub use core::video::{Video, VideoLoadOptions};
