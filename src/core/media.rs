//! Playback runtime surface consumed by the controller.
//!
//! The runtime is best-effort and event driven: setting `current_time` starts
//! a seek that completes later with `MediaEvent::Seeked`, `play()`/`pause()`
//! are acknowledged by `Playing`/`Pause`, and rendered frames are reported
//! through per-frame callbacks (or not at all for audio-only/DRM content).

use log::trace;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use super::seek_token::SeekToken;

/// How much media data the runtime holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Events emitted by the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Seeking,
    Seeked,
    Waiting,
    Playing,
    Pause,
    Progress,
    Ended,
    VolumeChange,
    RateChange,
    DurationChange,
    LoadedMetadata,
    Error(String),
}

/// One presented frame: when it hit the screen and which media time it shows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSample {
    pub presented_at: Instant,
    pub media_time: f64,
}

/// Buffered span in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

/// Mutable-position media handle.
///
/// Dropping a receiver returned by `events`, `frame_callbacks` or `audio_tap`
/// unregisters it.
pub trait MediaElement: Send + Sync + 'static {
    /// Start loading a source; completion is reported by `LoadedMetadata`
    fn load(&self, source_url: &str);
    fn current_time(&self) -> f64;
    /// Start a seek; completion is reported by `Seeked`
    fn set_current_time(&self, seconds: f64);
    fn duration(&self) -> f64;
    fn paused(&self) -> bool;
    fn ended(&self) -> bool;
    fn ready_state(&self) -> ReadyState;
    fn playback_rate(&self) -> f64;
    /// Acknowledged by `RateChange`
    fn set_playback_rate(&self, rate: f64);
    fn buffered(&self) -> Vec<TimeRange>;
    /// Request playback; acknowledged by `Playing`. Err if refused outright.
    fn play(&self) -> Result<(), String>;
    /// Acknowledged by `Pause`
    fn pause(&self);
    fn events(&self) -> broadcast::Receiver<MediaEvent>;
    /// Per-frame presentation callbacks, `None` if the runtime has none
    fn frame_callbacks(&self) -> Option<broadcast::Receiver<FrameSample>>;
    /// Ticks from a silent (zero-gain) audio processing node chained off the
    /// element, `None` without an audio graph
    fn audio_tap(&self) -> Option<broadcast::Receiver<Instant>>;
}

/// Outcome of waiting on the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Completed,
    Cancelled,
}

/// Shared handle with the waiting helpers the controller and sync loop use
#[derive(Clone)]
pub struct MediaHandle {
    element: Arc<dyn MediaElement>,
}

impl std::fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHandle")
            .field("current_time", &self.element.current_time())
            .field("paused", &self.element.paused())
            .finish()
    }
}

impl MediaHandle {
    pub fn new(element: Arc<dyn MediaElement>) -> Self {
        Self { element }
    }

    pub fn element(&self) -> &Arc<dyn MediaElement> {
        &self.element
    }

    /// Set the position and wait for `Seeked`, unless `token` is superseded
    /// first. The event subscription is taken before the write so a fast
    /// runtime cannot complete unseen.
    pub async fn seek_and_wait(&self, seconds: f64, token: &SeekToken) -> Wait {
        if token.is_cancelled() {
            return Wait::Cancelled;
        }
        let mut events = self.element.events();
        trace!("Runtime seek to {:.6}s (token {})", seconds, token.id());
        self.element.set_current_time(seconds);
        self.wait_for(&mut events, token, |e| *e == MediaEvent::Seeked).await
    }

    /// Wait for the first event matching `pred` on an existing subscription
    pub async fn wait_for(
        &self,
        events: &mut broadcast::Receiver<MediaEvent>,
        token: &SeekToken,
        pred: impl Fn(&MediaEvent) -> bool,
    ) -> Wait {
        loop {
            tokio::select! {
                _ = token.cancelled() => return Wait::Cancelled,
                received = events.recv() => match received {
                    Ok(event) if pred(&event) => return Wait::Completed,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return Wait::Cancelled,
                },
            }
        }
    }
}

impl std::ops::Deref for MediaHandle {
    type Target = dyn MediaElement;

    fn deref(&self) -> &Self::Target {
        self.element.as_ref()
    }
}
