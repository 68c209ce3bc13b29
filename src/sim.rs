//! Deterministic in-process media runtime.
//!
//! `SimulatedMedia` behaves like a browser media element driven by a tokio
//! clock: seeks complete after a latency with `Seeked` followed by one
//! presented frame, playback advances with wall time and presents one frame
//! per frame period, and the reported duration can be off until the first
//! seek that reaches the end of the stream.
//!
//! Rendering faults are configurable so the sync loop can be exercised
//! against slow or misbehaving runtimes. Must be used inside a tokio runtime.

use log::{debug, trace};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::core::media::{FrameSample, MediaElement, MediaEvent, ReadyState, TimeRange};
use crate::core::timecode::FrameRate;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct SimulatedMediaConfig {
    pub frame_rate: FrameRate,
    /// Actual length of the stream in seconds
    pub true_duration: f64,
    /// Added to the reported duration until the end of the stream is reached
    pub duration_error: f64,
    pub seek_latency: Duration,
    pub frame_callbacks: bool,
    pub audio_tap: bool,
    /// First presentation after a seek to a new frame still shows the
    /// previously presented frame
    pub first_render_stale: bool,
    /// Every presentation shows a neighbour of the requested frame
    pub always_stale: bool,
    /// Never acknowledge playback rate changes
    pub ignore_rate_change: bool,
    /// Fail `load` with this message
    pub load_error: Option<String>,
    /// Report `Ended` when a paused seek lands on the end of the stream
    pub ended_on_seek_to_end: bool,
    /// Media time of the frame presented after a seek trails the seek
    /// position by this share of a frame duration
    pub render_lag_pct: f64,
    /// Drop to `HaveMetadata` and report `Waiting` while a seek is pending
    pub stall_on_seek: bool,
}

impl SimulatedMediaConfig {
    pub fn new(frame_rate: FrameRate, true_duration: f64) -> Self {
        Self {
            frame_rate,
            true_duration,
            duration_error: 0.0,
            seek_latency: Duration::from_millis(10),
            frame_callbacks: true,
            audio_tap: true,
            first_render_stale: false,
            always_stale: false,
            ignore_rate_change: false,
            load_error: None,
            ended_on_seek_to_end: false,
            render_lag_pct: 0.0,
            stall_on_seek: false,
        }
    }
}

#[derive(Debug)]
struct SimState {
    source: Option<String>,
    ready: ReadyState,
    /// Position while paused, or at `playing_since` while playing
    position: f64,
    playing_since: Option<Instant>,
    rate: f64,
    reported_duration: f64,
    ended: bool,
    seek_generation: u64,
    last_seek_frame: Option<u64>,
    last_presented: Option<u64>,
    playback: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct SimShared {
    config: SimulatedMediaConfig,
    state: Mutex<SimState>,
    events: broadcast::Sender<MediaEvent>,
    frames: broadcast::Sender<FrameSample>,
    ticks: broadcast::Sender<Instant>,
}

#[derive(Debug, Clone)]
pub struct SimulatedMedia {
    shared: Arc<SimShared>,
}

impl SimulatedMedia {
    pub fn new(config: SimulatedMediaConfig) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (frames, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (ticks, _) = broadcast::channel(CHANNEL_CAPACITY);
        let state = SimState {
            source: None,
            ready: ReadyState::HaveNothing,
            position: 0.0,
            playing_since: None,
            rate: 1.0,
            reported_duration: config.true_duration + config.duration_error,
            ended: false,
            seek_generation: 0,
            last_seek_frame: None,
            last_presented: None,
            playback: None,
        };
        Self {
            shared: Arc::new(SimShared {
                config,
                state: Mutex::new(state),
                events,
                frames,
                ticks,
            }),
        }
    }

    /// Shared trait-object handle for the controller
    pub fn handle(&self) -> Arc<dyn MediaElement> {
        Arc::new(self.clone())
    }

    pub fn config(&self) -> &SimulatedMediaConfig {
        &self.shared.config
    }

    /// Live frame callback registrations
    pub fn frame_subscribers(&self) -> usize {
        self.shared.frames.receiver_count()
    }

    /// Last frame index handed to frame callbacks
    pub fn last_presented_frame(&self) -> Option<u64> {
        self.shared.lock().last_presented
    }
}

impl SimShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: MediaEvent) {
        trace!("sim event {:?}", event);
        let _ = self.events.send(event);
    }

    fn position(&self, state: &SimState) -> f64 {
        let position = match state.playing_since {
            Some(since) => state.position + since.elapsed().as_secs_f64() * state.rate,
            None => state.position,
        };
        position.clamp(0.0, self.config.true_duration)
    }

    fn last_frame(&self) -> u64 {
        self.config
            .frame_rate
            .frame_count(self.config.true_duration)
            .saturating_sub(1)
    }

    fn frame_for(&self, seconds: f64) -> u64 {
        self.config.frame_rate.frame_at(seconds).min(self.last_frame())
    }

    /// Hand one frame to the callbacks and the audio tap
    fn present(&self, state: &mut SimState, frame: u64) {
        self.present_at(state, frame, self.config.frame_rate.time_of(frame));
    }

    fn present_at(&self, state: &mut SimState, frame: u64, media_time: f64) {
        state.last_presented = Some(frame);
        let now = Instant::now();
        if self.config.frame_callbacks {
            let _ = self.frames.send(FrameSample {
                presented_at: now,
                media_time,
            });
        }
        if self.config.audio_tap {
            let _ = self.ticks.send(now);
        }
    }

    /// Frame the runtime actually shows after seeking to `frame`
    fn rendered_after_seek(&self, state: &SimState, frame: u64) -> u64 {
        if self.config.always_stale {
            return if frame < self.last_frame() {
                frame + 1
            } else {
                frame.saturating_sub(1)
            };
        }
        let distinct = state.last_seek_frame != Some(frame);
        if self.config.first_render_stale && distinct {
            return state.last_presented.unwrap_or_else(|| frame.saturating_sub(1));
        }
        frame
    }

    fn complete_seek(&self, generation: u64, seconds: f64) {
        let mut state = self.lock();
        if state.seek_generation != generation {
            trace!("sim seek to {:.6}s superseded", seconds);
            return;
        }

        let reported = state.reported_duration;
        let at_end = seconds >= self.config.true_duration.min(reported) - 1e-9;
        if at_end && reported != self.config.true_duration {
            debug!(
                "sim duration corrected {:.6}s -> {:.6}s",
                reported, self.config.true_duration
            );
            state.reported_duration = self.config.true_duration;
            self.emit(MediaEvent::DurationChange);
        }

        if self.config.stall_on_seek {
            state.ready = ReadyState::HaveEnoughData;
            self.emit(MediaEvent::Progress);
        }
        self.emit(MediaEvent::Seeked);
        let frame = self.frame_for(seconds);
        let rendered = self.rendered_after_seek(&state, frame);
        state.last_seek_frame = Some(frame);
        if self.config.render_lag_pct > 0.0 {
            let lag = self.config.render_lag_pct / 100.0 * self.config.frame_rate.frame_duration();
            self.present_at(&mut state, rendered, (seconds - lag).max(0.0));
        } else {
            self.present(&mut state, rendered);
        }

        let at_true_end = seconds >= self.config.true_duration - 1e-9;
        if self.config.ended_on_seek_to_end && at_true_end && state.playing_since.is_none() {
            state.ended = true;
            drop(state);
            self.emit(MediaEvent::Ended);
        }
    }

    /// Abort the playback clock; `position` must already hold the stop time
    fn stop_playback(&self, state: &mut SimState) -> bool {
        if let Some(task) = state.playback.take() {
            task.abort();
        }
        state.playing_since.take().is_some()
    }
}

/// Per-frame playback clock
async fn run_playback(shared: Arc<SimShared>) {
    shared.emit(MediaEvent::Playing);
    let period = shared.config.frame_rate.frame_duration();
    loop {
        let rate = shared.lock().rate;
        tokio::time::sleep(Duration::from_secs_f64(period / rate)).await;

        let mut state = shared.lock();
        let position = shared.position(&state);
        if position >= shared.config.true_duration {
            state.position = shared.config.true_duration;
            state.playing_since = None;
            state.playback = None;
            state.ended = true;
            drop(state);
            shared.emit(MediaEvent::Pause);
            shared.emit(MediaEvent::Ended);
            break;
        }
        let frame = shared.frame_for(position);
        shared.present(&mut state, frame);
    }
}

impl MediaElement for SimulatedMedia {
    fn load(&self, source_url: &str) {
        let shared = Arc::clone(&self.shared);
        let source = source_url.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(shared.config.seek_latency).await;
            if let Some(message) = shared.config.load_error.clone() {
                shared.emit(MediaEvent::Error(message));
                return;
            }
            {
                let mut state = shared.lock();
                state.source = Some(source);
                state.ready = ReadyState::HaveEnoughData;
            }
            shared.emit(MediaEvent::LoadedMetadata);
            shared.emit(MediaEvent::Progress);
        });
    }

    fn current_time(&self) -> f64 {
        let state = self.shared.lock();
        self.shared.position(&state)
    }

    fn set_current_time(&self, seconds: f64) {
        let seconds = seconds.clamp(0.0, self.shared.config.true_duration);
        let generation = {
            let mut state = self.shared.lock();
            state.position = seconds;
            if state.playing_since.is_some() {
                state.playing_since = Some(Instant::now());
            }
            state.ended = false;
            state.seek_generation += 1;
            if self.shared.config.stall_on_seek {
                state.ready = ReadyState::HaveMetadata;
            }
            state.seek_generation
        };
        self.shared.emit(MediaEvent::Seeking);
        if self.shared.config.stall_on_seek {
            self.shared.emit(MediaEvent::Waiting);
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            tokio::time::sleep(shared.config.seek_latency).await;
            shared.complete_seek(generation, seconds);
        });
    }

    fn duration(&self) -> f64 {
        self.shared.lock().reported_duration
    }

    fn paused(&self) -> bool {
        self.shared.lock().playing_since.is_none()
    }

    fn ended(&self) -> bool {
        self.shared.lock().ended
    }

    fn ready_state(&self) -> ReadyState {
        self.shared.lock().ready
    }

    fn playback_rate(&self) -> f64 {
        self.shared.lock().rate
    }

    fn set_playback_rate(&self, rate: f64) {
        if self.shared.config.ignore_rate_change {
            return;
        }
        {
            let mut state = self.shared.lock();
            if state.playing_since.is_some() {
                state.position = self.shared.position(&state);
                state.playing_since = Some(Instant::now());
            }
            state.rate = rate;
        }
        self.shared.emit(MediaEvent::RateChange);
    }

    fn buffered(&self) -> Vec<TimeRange> {
        let state = self.shared.lock();
        if state.source.is_some() {
            vec![TimeRange {
                start: 0.0,
                end: self.shared.config.true_duration,
            }]
        } else {
            Vec::new()
        }
    }

    fn play(&self) -> Result<(), String> {
        let mut state = self.shared.lock();
        if state.source.is_none() {
            return Err("no source loaded".into());
        }
        if state.playing_since.is_some() {
            return Ok(());
        }
        if state.position >= self.shared.config.true_duration {
            state.position = 0.0;
        }
        state.ended = false;
        state.playing_since = Some(Instant::now());
        state.playback = Some(tokio::spawn(run_playback(Arc::clone(&self.shared))));
        Ok(())
    }

    fn pause(&self) {
        let stopped = {
            let mut state = self.shared.lock();
            let position = self.shared.position(&state);
            state.position = position;
            self.shared.stop_playback(&mut state)
        };
        if stopped {
            self.shared.emit(MediaEvent::Pause);
        }
    }

    fn events(&self) -> broadcast::Receiver<MediaEvent> {
        self.shared.events.subscribe()
    }

    fn frame_callbacks(&self) -> Option<broadcast::Receiver<FrameSample>> {
        self.shared
            .config
            .frame_callbacks
            .then(|| self.shared.frames.subscribe())
    }

    fn audio_tap(&self) -> Option<broadcast::Receiver<Instant>> {
        self.shared
            .config
            .audio_tap
            .then(|| self.shared.ticks.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(config: SimulatedMediaConfig) -> SimulatedMedia {
        let media = SimulatedMedia::new(config);
        media.shared.lock().source = Some("sim://clip".into());
        media
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_completes_with_frame() {
        let media = loaded(SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0));
        let mut events = media.events();
        let mut frames = media.frame_callbacks().unwrap();

        media.set_current_time(2.0);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Seeking);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Seeked);
        let sample = frames.recv().await.unwrap();
        assert_eq!(FrameRate::FPS_25.frame_at(sample.media_time), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_seek_never_completes() {
        let media = loaded(SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0));
        let mut frames = media.frame_callbacks().unwrap();

        media.set_current_time(1.0);
        media.set_current_time(3.0);
        let sample = frames.recv().await.unwrap();
        assert_eq!(FrameRate::FPS_25.frame_at(sample.media_time), 75);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(frames.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duration_corrected_at_end() {
        let media = loaded(SimulatedMediaConfig {
            duration_error: 0.05,
            ..SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0)
        });
        assert!((media.duration() - 10.05).abs() < 1e-9);

        media.set_current_time(10.05);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(media.duration(), 10.0);
        assert_eq!(media.current_time(), 10.0);
        assert_eq!(media.last_presented_frame(), Some(249));
    }

    #[tokio::test(start_paused = true)]
    async fn test_playback_reaches_end() {
        let media = loaded(SimulatedMediaConfig::new(FrameRate::FPS_25, 0.2));
        let mut events = media.events();
        media.play().unwrap();
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Playing);
        assert!(!media.paused());

        assert_eq!(events.recv().await.unwrap(), MediaEvent::Pause);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Ended);
        assert!(media.paused());
        assert!(media.ended());
        assert_eq!(media.current_time(), 0.2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_mid_frame() {
        let media = loaded(SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0));
        media.play().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        media.pause();
        let t = media.current_time();
        assert!((t - 0.05).abs() < 1e-6);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(media.current_time(), t);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_to_end_reports_ended_when_configured() {
        let media = loaded(SimulatedMediaConfig {
            ended_on_seek_to_end: true,
            ..SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0)
        });
        let mut events = media.events();
        media.set_current_time(10.0);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Seeking);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Seeked);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Ended);
        assert!(media.ended());

        media.set_current_time(9.0);
        assert!(!media.ended());
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_lag_trails_seek_position() {
        let media = loaded(SimulatedMediaConfig {
            render_lag_pct: 10.0,
            ..SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0)
        });
        let mut frames = media.frame_callbacks().unwrap();
        media.set_current_time(2.0);
        let sample = frames.recv().await.unwrap();
        assert!((sample.media_time - (2.0 - 0.004)).abs() < 1e-9);
        assert_eq!(media.last_presented_frame(), Some(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_on_seek_waits_then_recovers() {
        let media = loaded(SimulatedMediaConfig {
            stall_on_seek: true,
            ..SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0)
        });
        let mut events = media.events();
        media.set_current_time(3.0);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Seeking);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Waiting);
        assert_eq!(media.ready_state(), ReadyState::HaveMetadata);

        assert_eq!(events.recv().await.unwrap(), MediaEvent::Progress);
        assert_eq!(events.recv().await.unwrap(), MediaEvent::Seeked);
        assert_eq!(media.ready_state(), ReadyState::HaveEnoughData);
    }

    #[test]
    fn test_play_without_source_is_refused() {
        let media = SimulatedMedia::new(SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0));
        assert!(media.play().is_err());
    }
}
