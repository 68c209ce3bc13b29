//! Uniform stream of `{presented_at, media_time}` samples, one per rendered
//! frame while media is loaded.
//!
//! Two backends, chosen when a video is attached:
//! - `NativeFrame`: the runtime's per-frame presentation callback
//! - `AudioTick`: audio-only or DRM content (or runtimes without frame
//!   callbacks). Ticks come from a silent audio tap on the playing element,
//!   so delivery follows the audio clock instead of throttled wall timers;
//!   each tick samples the element's `current_time`.
//!
//! The clock must be destroyed and rebuilt for every loaded video. Dropping
//! it aborts the forwarding task, which drops the runtime subscription.

use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::error::PlayerError;
use super::media::{FrameSample, MediaElement};
use super::video::Video;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameClockBackend {
    NativeFrame,
    AudioTick,
}

#[derive(Debug)]
pub struct FrameClock {
    backend: FrameClockBackend,
    samples: watch::Receiver<Option<FrameSample>>,
    task: JoinHandle<()>,
}

impl FrameClock {
    /// Subscribe to `media` for `video`. Must be called inside a tokio runtime.
    pub fn attach(media: Arc<dyn MediaElement>, video: &Video) -> Result<Self, PlayerError> {
        let (tx, samples) = watch::channel(None);

        let native = if video.audio_only || video.drm {
            None
        } else {
            media.frame_callbacks()
        };

        let (backend, task) = match native {
            Some(frames) => (
                FrameClockBackend::NativeFrame,
                tokio::spawn(forward_frames(frames, tx)),
            ),
            None => {
                let ticks = media.audio_tap().ok_or_else(|| {
                    PlayerError::Runtime("runtime offers neither frame callbacks nor an audio tap".into())
                })?;
                (
                    FrameClockBackend::AudioTick,
                    tokio::spawn(forward_ticks(ticks, media, tx)),
                )
            }
        };

        debug!("FrameClock attached for {} ({:?})", video.source_url, backend);
        Ok(Self {
            backend,
            samples,
            task,
        })
    }

    pub fn backend(&self) -> FrameClockBackend {
        self.backend
    }

    /// Most recent sample, if any frame was presented yet
    pub fn latest(&self) -> Option<FrameSample> {
        *self.samples.borrow()
    }

    /// Independent receiver; `changed()` resolves on every new sample
    pub fn subscribe(&self) -> watch::Receiver<Option<FrameSample>> {
        self.samples.clone()
    }

    pub fn destroy(self) {
        // Drop aborts the task
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        self.task.abort();
        debug!("FrameClock destroyed ({:?})", self.backend);
    }
}

async fn forward_frames(
    mut frames: broadcast::Receiver<FrameSample>,
    tx: watch::Sender<Option<FrameSample>>,
) {
    loop {
        match frames.recv().await {
            Ok(sample) => {
                tx.send_replace(Some(sample));
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("FrameClock lagged, skipped {} frame callbacks", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn forward_ticks(
    mut ticks: broadcast::Receiver<tokio::time::Instant>,
    media: Arc<dyn MediaElement>,
    tx: watch::Sender<Option<FrameSample>>,
) {
    loop {
        match ticks.recv().await {
            Ok(presented_at) => {
                tx.send_replace(Some(FrameSample {
                    presented_at,
                    media_time: media.current_time(),
                }));
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
