//! Video controller: the seek orchestrator plus load, play, pause and rate.
//!
//! Public requests validate synchronously and return a boxed future for the
//! asynchronous part. Issuing a request advances the shared `SeekEpoch`
//! before anything touches the runtime, so the newest request (seek, play or
//! pause) always owns the media position. Superseded futures resolve to
//! `RequestOutcome::Cancelled` and emit nothing.
//!
//! Seek flow:
//! 1. validate and clamp (negative -> 0, past the end -> `seek_to_end`)
//! 2. emit `SeekingEvent`, set `seeking`
//! 3. runtime seek, then `SyncLoop` until the presented frame matches
//! 4. clear `seeking`, emit `SeekedEvent` + `VideoTimeChangeEvent`
//!
//! A background pump translates runtime events (waiting, playing, seeked,
//! external pause, progress, ended, rate changes, errors) and frame samples
//! while playing into state transitions and public events. While an end
//! alignment owns the epoch, `ended` is reported by that request alone.

use log::{debug, info, trace, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::error::PlayerError;
use super::event_bus::EventBus;
use super::frame_clock::FrameClock;
use super::media::{FrameSample, MediaElement, MediaEvent, MediaHandle, ReadyState, Wait};
use super::playback_state::{PlaybackState, PlaybackStateMachine};
use super::player_events::*;
use super::seek_token::{SeekEpoch, SeekToken};
use super::sync_loop::{SeekDirection, SyncLoop, SyncOutcome, SyncRequest};
use super::timecode::{FrameRate, Timecode, format_frame, format_time, parse_timecode};
use super::video::{Video, VideoLoadOptions};
use crate::config::PlayerConfig;

/// Fastest rate accepted by `set_playback_rate`
pub const MAX_PLAYBACK_RATE: f64 = 16.0;

/// Slack for "stopped mid-frame" and duration comparisons
const MID_FRAME_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestOutcome {
    /// Request finished; position it left the media at
    Completed { frame: u64, time: f64 },
    /// Superseded by a newer request
    Cancelled,
}

pub type SeekFuture = Pin<Box<dyn Future<Output = RequestOutcome> + Send + 'static>>;

/// Play, pause and rate requests can also fail at the runtime
pub type PlaybackFuture =
    Pin<Box<dyn Future<Output = Result<RequestOutcome, PlayerError>> + Send + 'static>>;

/// What a seek does besides moving the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SeekMode {
    /// Seeking/seeked notifications and the `seeking` flag
    notify: bool,
    /// Run the sync loop after the seek
    sync: bool,
}

impl SeekMode {
    const PUBLIC: SeekMode = SeekMode {
        notify: true,
        sync: true,
    };
    const QUIET_SYNC: SeekMode = SeekMode {
        notify: false,
        sync: true,
    };
    const QUIET: SeekMode = SeekMode {
        notify: false,
        sync: false,
    };
    const NOTIFY_ONLY: SeekMode = SeekMode {
        notify: true,
        sync: false,
    };
}

/// Media element bound to a video, with its frame clock and event pump
struct Attached {
    media: MediaHandle,
    video: Video,
    clock: FrameClock,
    pump: JoinHandle<()>,
}

impl Drop for Attached {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Everything a request needs, snapshotted when it is issued
#[derive(Clone)]
struct Session {
    media: MediaHandle,
    video: Video,
    samples: watch::Receiver<Option<FrameSample>>,
}

impl Session {
    fn sync_loop(&self, inner: &Inner) -> SyncLoop {
        SyncLoop::new(
            self.media.clone(),
            self.video.clone(),
            self.samples.clone(),
            inner.config.sync,
        )
    }

    fn position(&self) -> RequestOutcome {
        let time = self.media.current_time();
        RequestOutcome::Completed {
            frame: self.video.clamped_frame_at(time),
            time,
        }
    }
}

struct Inner {
    bus: EventBus,
    state: PlaybackStateMachine,
    epoch: SeekEpoch,
    /// Token id of the end alignment that owns `ended` reporting (0: none)
    end_alignment: AtomicU64,
    config: PlayerConfig,
    attached: Mutex<Option<Attached>>,
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Attached>> {
        self.attached.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session(&self) -> Result<Session, PlayerError> {
        self.lock()
            .as_ref()
            .map(|a| Session {
                media: a.media.clone(),
                video: a.video.clone(),
                samples: a.clock.subscribe(),
            })
            .ok_or(PlayerError::NoVideoLoaded)
    }

    fn video(&self) -> Option<Video> {
        self.lock().as_ref().map(|a| a.video.clone())
    }

    /// Take over a duration corrected during end alignment
    fn adopt_duration(&self, corrected: &Video) {
        let Some(duration) = corrected.corrected_duration else {
            return;
        };
        let mut attached = self.lock();
        if let Some(a) = attached.as_mut().filter(|a| a.video.id == corrected.id) {
            if a.video.apply_corrected_duration(duration) {
                info!(
                    "Duration corrected to {:.6}s ({} frames)",
                    duration, a.video.total_frames
                );
            }
        }
    }

    fn detach(&self) {
        // Drop outside the lock: clock and pump log on teardown
        let previous = self.lock().take();
        if let Some(previous) = previous {
            debug!("Detaching {}", previous.video.source_url);
        }
    }

    fn emit_time_change(&self, time: f64, video: &Video) {
        self.bus.emit(VideoTimeChangeEvent {
            current_time: time,
            frame: video.clamped_frame_at(time),
        });
    }

    fn on_media_event(&self, media: &MediaHandle, event: MediaEvent) {
        match event {
            MediaEvent::Waiting => {
                self.state.set_waiting(true);
                self.state.set_buffering(media.ready_state() < ReadyState::HaveFutureData);
            }
            MediaEvent::Playing => {
                self.state.set_playing();
            }
            MediaEvent::Seeked => {
                self.state.set_waiting(false);
            }
            MediaEvent::Pause => {
                // Controller pauses finish on their own once the frame settles
                if !self.state.state().pausing && self.state.set_paused() {
                    if let Some(video) = self.video() {
                        self.emit_time_change(media.current_time(), &video);
                    }
                }
            }
            MediaEvent::Progress => {
                self.state.set_buffering(media.ready_state() < ReadyState::HaveFutureData);
                self.bus.emit(BufferingEvent {
                    buffered_timespans: media.buffered(),
                });
            }
            MediaEvent::Ended => {
                if self.end_alignment.load(Ordering::SeqCst) == self.epoch.current() {
                    trace!("Runtime ended during end alignment");
                } else if self.state.set_ended() {
                    self.bus.emit(EndedEvent);
                }
            }
            MediaEvent::RateChange => {
                self.bus.emit(PlaybackRateEvent {
                    rate: media.playback_rate(),
                });
            }
            MediaEvent::Error(message) => {
                warn!("Media error: {}", message);
                self.bus.emit(VideoErrorEvent { message });
            }
            other => trace!("Media event {:?}", other),
        }
    }

    fn on_frame(&self, sample: FrameSample) {
        if !self.state.is_playing() {
            return;
        }
        if let Some(video) = self.video() {
            self.emit_time_change(sample.media_time, &video);
        }
    }
}

async fn event_pump(
    inner: Weak<Inner>,
    media: MediaHandle,
    mut events: broadcast::Receiver<MediaEvent>,
    mut samples: watch::Receiver<Option<FrameSample>>,
) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    let Some(inner) = inner.upgrade() else { break };
                    inner.on_media_event(&media, event);
                }
                Err(RecvError::Lagged(n)) => warn!("Event pump lagged, skipped {} media events", n),
                Err(RecvError::Closed) => break,
            },
            changed = samples.changed() => {
                if changed.is_err() {
                    break;
                }
                let sample = *samples.borrow_and_update();
                let Some(inner) = inner.upgrade() else { break };
                if let Some(sample) = sample {
                    inner.on_frame(sample);
                }
            }
        }
    }
    trace!("Event pump stopped");
}

/// Seek primitive shared by every public seek, the pause alignment and the
/// end alignment steps
async fn run_seek(
    inner: Arc<Inner>,
    session: Session,
    time: f64,
    target_frame: Option<u64>,
    mode: SeekMode,
    token: SeekToken,
) -> RequestOutcome {
    if token.is_cancelled() {
        return RequestOutcome::Cancelled;
    }
    let video = &session.video;
    let from_time = session.media.current_time();
    debug!(
        "Seek {:.6}s -> {:.6}s (frame {:?}, {:?}, token {})",
        from_time,
        time,
        target_frame,
        mode,
        token.id()
    );

    if mode.notify {
        let to_timecode = match target_frame {
            Some(frame) => format_frame(frame, video),
            None => format_time(time, video),
        };
        inner.state.set_seeking(true);
        inner.bus.emit(SeekingEvent {
            to_time: time,
            to_timecode: to_timecode.to_string(),
            from_time,
            from_timecode: format_time(from_time, video).to_string(),
        });
    }

    let mut sync = session.sync_loop(&inner);
    if sync.seek(time, &token).await == Wait::Cancelled {
        return RequestOutcome::Cancelled;
    }

    if mode.sync {
        let request = SyncRequest {
            target_frame,
            target_time: Some(time),
            baseline_time: from_time,
            direction: SeekDirection::between(from_time, time),
        };
        if sync.run(&request, &token).await == SyncOutcome::Cancelled {
            return RequestOutcome::Cancelled;
        }
    }

    if !token.is_current() {
        return RequestOutcome::Cancelled;
    }
    let current_time = session.media.current_time();
    let frame = video.clamped_frame_at(current_time);
    if mode.notify {
        inner.state.reconcile_paused(session.media.paused());
        inner.state.set_seeking(false);
        inner.bus.emit(SeekedEvent {
            current_time,
            current_timecode: format_frame(frame, video).to_string(),
            previous_time: from_time,
            previous_timecode: format_time(from_time, video).to_string(),
        });
        inner.emit_time_change(current_time, video);
    }
    RequestOutcome::Completed {
        frame,
        time: current_time,
    }
}

/// End alignment: a quiet seek to the best known duration (the runtime
/// usually corrects its duration there), a quiet seek a nudge before the
/// corrected end, then a public seek to the end that reports `ended`.
///
/// Runtime `Ended` events are left to this request while it owns the epoch,
/// so the intermediate landings on the end report nothing.
async fn run_seek_to_end(inner: Arc<Inner>, mut session: Session, token: SeekToken) -> RequestOutcome {
    if token.is_cancelled() {
        return RequestOutcome::Cancelled;
    }
    inner.end_alignment.store(token.id(), Ordering::SeqCst);

    let duration = session.video.best_duration();
    let step = run_seek(
        Arc::clone(&inner),
        session.clone(),
        duration,
        None,
        SeekMode::QUIET,
        token.clone(),
    );
    if step.await == RequestOutcome::Cancelled {
        return RequestOutcome::Cancelled;
    }

    let reported = session.media.duration();
    if reported.is_finite()
        && (reported - duration).abs() > MID_FRAME_EPSILON
        && session.video.apply_corrected_duration(reported)
    {
        debug!("Duration reported as {:.6}s after seeking to {:.6}s", reported, duration);
        inner.adopt_duration(&session.video);
    }

    let end = session.video.best_duration();
    let nudge = session.sync_loop(&inner).nudge_time();
    let step = run_seek(
        Arc::clone(&inner),
        session.clone(),
        (end - nudge).max(0.0),
        None,
        SeekMode::QUIET,
        token.clone(),
    );
    if step.await == RequestOutcome::Cancelled {
        return RequestOutcome::Cancelled;
    }

    debug!("Seek to end {:.6}s (token {})", end, token.id());
    let last_frame = session.video.last_frame();
    let outcome = run_seek(
        Arc::clone(&inner),
        session,
        end,
        Some(last_frame),
        SeekMode::NOTIFY_ONLY,
        token.clone(),
    )
    .await;
    if outcome == RequestOutcome::Cancelled || !token.is_current() {
        return RequestOutcome::Cancelled;
    }

    if inner.state.set_ended() {
        inner.bus.emit(EndedEvent);
    }
    outcome
}

/// Frame-accurate controller over one media element at a time.
///
/// Cheap to clone; clones drive the same player.
#[derive(Clone)]
pub struct VideoController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for VideoController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoController")
            .field("video", &self.inner.video().map(|v| v.source_url))
            .field("state", &self.inner.state.state())
            .field("epoch", &self.inner.epoch.current())
            .finish()
    }
}

impl Default for VideoController {
    fn default() -> Self {
        Self::new(PlayerConfig::default())
    }
}

impl VideoController {
    pub fn new(config: PlayerConfig) -> Self {
        let bus = EventBus::new();
        let state = PlaybackStateMachine::new(bus.emitter());
        Self {
            inner: Arc::new(Inner {
                bus,
                state,
                epoch: SeekEpoch::new(),
                end_alignment: AtomicU64::new(0),
                config,
                attached: Mutex::new(None),
            }),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.inner.state.state()
    }

    pub fn video(&self) -> Option<Video> {
        self.inner.video()
    }

    // === Loading ===

    /// Load `source_url` into `media` and attach the resulting video.
    ///
    /// Failures are returned and also published as `VideoErrorEvent`.
    pub async fn load_video(
        &self,
        media: Arc<dyn MediaElement>,
        source_url: &str,
        frame_rate: FrameRate,
        options: VideoLoadOptions,
    ) -> Result<Video, PlayerError> {
        let token = self.inner.epoch.advance();
        self.inner.detach();
        info!("Loading {} @ {}", source_url, frame_rate);

        let media = MediaHandle::new(media);
        let mut events = media.events();
        media.load(source_url);

        let loaded = loop {
            tokio::select! {
                _ = token.cancelled() => return Err(PlayerError::Cancelled),
                received = events.recv() => match received {
                    Ok(MediaEvent::LoadedMetadata) => break Ok(()),
                    Ok(MediaEvent::Error(message)) => break Err(message),
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break Err("media element closed".to_string()),
                },
            }
        };

        let result = loaded
            .map_err(PlayerError::LoadFailed)
            .and_then(|()| {
                Video::from_options(source_url, frame_rate, media.duration(), &options)
                    .map_err(PlayerError::from)
            })
            .and_then(|video| self.attach(media, video));

        if let Err(e) = &result {
            warn!("Failed to load {}: {}", source_url, e);
            self.inner.bus.emit(VideoErrorEvent {
                message: e.to_string(),
            });
        }
        result
    }

    /// Bind an already loaded element. Replaces (and tears down) any
    /// previous video. Must be called inside a tokio runtime.
    pub fn attach_video(&self, media: Arc<dyn MediaElement>, video: Video) -> Result<Video, PlayerError> {
        self.attach(MediaHandle::new(media), video)
    }

    fn attach(&self, media: MediaHandle, video: Video) -> Result<Video, PlayerError> {
        self.inner.epoch.cancel_all();
        self.inner.detach();

        let clock = FrameClock::attach(Arc::clone(media.element()), &video)?;
        let pump = tokio::spawn(event_pump(
            Arc::downgrade(&self.inner),
            media.clone(),
            media.events(),
            clock.subscribe(),
        ));

        self.inner.state.reset();
        *self.inner.lock() = Some(Attached {
            media,
            video: video.clone(),
            clock,
            pump,
        });

        info!(
            "Attached {}: {} fps{}, {:.3}s, {} frames",
            video.source_url,
            video.frame_rate,
            if video.drop_frame { " DF" } else { "" },
            video.duration,
            video.total_frames
        );
        self.inner.bus.emit(VideoLoadedEvent {
            video: video.clone(),
        });
        Ok(video)
    }

    /// Cancel outstanding requests and release the media element
    pub fn destroy(&self) {
        self.inner.epoch.cancel_all();
        self.inner.detach();
        self.inner.state.reset();
    }

    // === Position ===

    pub fn current_time(&self) -> Result<f64, PlayerError> {
        Ok(self.inner.session()?.media.current_time())
    }

    /// Frame on screen, clamped to the last renderable frame
    pub fn current_frame(&self) -> Result<u64, PlayerError> {
        let session = self.inner.session()?;
        Ok(session.video.clamped_frame_at(session.media.current_time()))
    }

    pub fn current_timecode(&self) -> Result<Timecode, PlayerError> {
        let session = self.inner.session()?;
        let frame = session.video.clamped_frame_at(session.media.current_time());
        Ok(format_frame(frame, &session.video))
    }

    pub fn format_timecode(&self, seconds: f64) -> Result<Timecode, PlayerError> {
        let video = self.inner.video().ok_or(PlayerError::NoVideoLoaded)?;
        Ok(format_time(seconds, &video))
    }

    pub fn parse_timecode(&self, text: &str) -> Result<u64, PlayerError> {
        let video = self.inner.video().ok_or(PlayerError::NoVideoLoaded)?;
        Ok(parse_timecode(text, &video)?)
    }

    // === Seeking ===

    pub fn seek_to_frame(&self, frame: i64) -> Result<SeekFuture, PlayerError> {
        let session = self.inner.session()?;
        let frame = frame.max(0) as u64;
        if frame >= session.video.total_frames {
            debug!("Frame {} is past the end, seeking to end", frame);
            return self.seek_to_end();
        }
        let time = session.video.time_of(frame);
        Ok(self.issue(session, time, Some(frame)))
    }

    pub fn seek_from_current_frame(&self, delta: i64) -> Result<SeekFuture, PlayerError> {
        let current = self.current_frame()?;
        self.seek_to_frame((current as i64).saturating_add(delta))
    }

    pub fn seek_to_time(&self, seconds: f64) -> Result<SeekFuture, PlayerError> {
        if !seconds.is_finite() {
            return Err(PlayerError::InvalidTime(seconds));
        }
        let session = self.inner.session()?;
        let time = seconds.max(0.0);
        if time >= session.video.best_duration() {
            debug!("Time {:.6}s is past the end, seeking to end", time);
            return self.seek_to_end();
        }
        Ok(self.issue(session, time, None))
    }

    pub fn seek_from_current_time(&self, delta: f64) -> Result<SeekFuture, PlayerError> {
        if !delta.is_finite() {
            return Err(PlayerError::InvalidTime(delta));
        }
        let current = self.current_time()?;
        self.seek_to_time(current + delta)
    }

    pub fn seek_to_timecode(&self, text: &str) -> Result<SeekFuture, PlayerError> {
        let frame = self.parse_timecode(text)?;
        self.seek_to_frame(i64::try_from(frame).unwrap_or(i64::MAX))
    }

    /// `percent` in `[0, 100]` of the best known duration
    pub fn seek_to_percent(&self, percent: f64) -> Result<SeekFuture, PlayerError> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(PlayerError::InvalidPercent(percent));
        }
        let video = self.inner.video().ok_or(PlayerError::NoVideoLoaded)?;
        self.seek_to_time(video.best_duration() * percent / 100.0)
    }

    /// Land on the last frame and report `ended`
    pub fn seek_to_end(&self) -> Result<SeekFuture, PlayerError> {
        let session = self.inner.session()?;
        let token = self.inner.epoch.advance();
        let inner = Arc::clone(&self.inner);
        Ok(Box::pin(run_seek_to_end(inner, session, token)))
    }

    /// `target_frame` pins the sync loop to a frame; without it the loop
    /// settles on whatever frame the runtime shows at `time`
    fn issue(&self, session: Session, time: f64, target_frame: Option<u64>) -> SeekFuture {
        let token = self.inner.epoch.advance();
        let inner = Arc::clone(&self.inner);
        Box::pin(run_seek(inner, session, time, target_frame, SeekMode::PUBLIC, token))
    }

    // === Playback ===

    pub fn play(&self) -> Result<PlaybackFuture, PlayerError> {
        let session = self.inner.session()?;
        let token = self.inner.epoch.advance();
        let inner = Arc::clone(&self.inner);

        Ok(Box::pin(async move {
            if token.is_cancelled() {
                return Ok(RequestOutcome::Cancelled);
            }
            let media = &session.media;
            if media.paused() {
                let mut events = media.events();
                if let Err(message) = media.play() {
                    warn!("Play refused: {}", message);
                    inner.bus.emit(VideoErrorEvent {
                        message: message.clone(),
                    });
                    return Err(PlayerError::Runtime(message));
                }
                let acknowledged = media
                    .wait_for(&mut events, &token, |e| *e == MediaEvent::Playing)
                    .await;
                if acknowledged == Wait::Cancelled {
                    return Ok(RequestOutcome::Cancelled);
                }
            }
            if !token.is_current() {
                return Ok(RequestOutcome::Cancelled);
            }
            inner.state.set_playing();
            Ok(session.position())
        }))
    }

    /// Pause, then move forward to the next frame boundary if playback
    /// stopped mid-frame. `paused` is reported only once the frame settles.
    pub fn pause(&self) -> Result<PlaybackFuture, PlayerError> {
        let session = self.inner.session()?;
        let token = self.inner.epoch.advance();
        let inner = Arc::clone(&self.inner);

        Ok(Box::pin(async move {
            if token.is_cancelled() {
                return Ok(RequestOutcome::Cancelled);
            }
            let media = &session.media;
            let video = &session.video;

            // Once the runtime is told to stop, a superseded pause still
            // leaves the flags matching the runtime
            let superseded = || -> Result<RequestOutcome, PlayerError> {
                inner.state.reconcile_paused(media.paused());
                Ok(RequestOutcome::Cancelled)
            };

            if !media.paused() {
                inner.state.set_pausing();
                let mut events = media.events();
                media.pause();
                let acknowledged = media
                    .wait_for(&mut events, &token, |e| *e == MediaEvent::Pause)
                    .await;
                if acknowledged == Wait::Cancelled {
                    return superseded();
                }
            }

            if inner.config.sync_on_pause {
                let position = media.current_time();
                let frame = video.clamped_frame_at(position);
                let mid_frame = position - video.time_of(frame) > MID_FRAME_EPSILON;
                if mid_frame && frame < video.last_frame() {
                    let next = frame + 1;
                    trace!("Paused mid-frame at {:.6}s, aligning to frame {}", position, next);
                    let outcome = run_seek(
                        Arc::clone(&inner),
                        session.clone(),
                        video.time_of(next),
                        Some(next),
                        SeekMode::QUIET_SYNC,
                        token.clone(),
                    )
                    .await;
                    if outcome == RequestOutcome::Cancelled {
                        return superseded();
                    }
                }
            }

            if !token.is_current() {
                return superseded();
            }
            inner.state.set_paused();
            let position = session.position();
            if let RequestOutcome::Completed { time, .. } = position {
                inner.emit_time_change(time, video);
            }
            Ok::<_, PlayerError>(position)
        }))
    }

    pub fn toggle_play_pause(&self) -> Result<PlaybackFuture, PlayerError> {
        if self.inner.state.is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Resolves when the runtime acknowledges the new rate, or with
    /// `PlayerError::Timeout` after `rate_change_timeout_ms`
    pub fn set_playback_rate(&self, rate: f64) -> Result<PlaybackFuture, PlayerError> {
        if !rate.is_finite() || rate <= 0.0 || rate > MAX_PLAYBACK_RATE {
            return Err(PlayerError::InvalidPlaybackRate(rate));
        }
        let session = self.inner.session()?;
        let wait = self.inner.config.rate_change_timeout();

        Ok(Box::pin(async move {
            let media = &session.media;
            if media.playback_rate() == rate {
                return Ok(session.position());
            }

            let mut events = media.events();
            media.set_playback_rate(rate);
            let acknowledged = async {
                loop {
                    match events.recv().await {
                        Ok(MediaEvent::RateChange) => return true,
                        Ok(_) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => return false,
                    }
                }
            };

            match timeout(wait, acknowledged).await {
                Ok(true) => {
                    debug!("Playback rate {}", rate);
                    Ok(session.position())
                }
                Ok(false) => Err(PlayerError::Runtime("media element closed".into())),
                Err(_) => {
                    warn!("Playback rate {} not acknowledged within {:?}", rate, wait);
                    Err(PlayerError::Timeout("playback rate change"))
                }
            }
        }))
    }
}
