//! Iterative correction of the runtime position after a seek.
//!
//! A seek reports completion before the runtime has necessarily presented the
//! requested frame. The loop compares the frame implied by `current_time`
//! with the frame actually presented (latest `FrameClock` sample) and nudges
//! the position until both agree, up to `max_iterations`. Exhaustion is not
//! an error: the best-effort position is accepted.
//!
//! Every wait point races the request's `SeekToken`, so a superseded loop
//! stops touching the runtime as soon as a newer request is issued.

use log::{debug, trace, warn};
use tokio::sync::watch;
use tokio::time::timeout;

use super::media::{FrameSample, MediaHandle, Wait};
use super::seek_token::SeekToken;
use super::video::Video;
use crate::config::SyncConfig;

/// Slack for comparing media times against frame boundaries
const BOUNDARY_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
    None,
}

impl SeekDirection {
    pub fn between(from: f64, to: f64) -> Self {
        if to > from {
            SeekDirection::Forward
        } else if to < from {
            SeekDirection::Backward
        } else {
            SeekDirection::None
        }
    }
}

/// One seek to be settled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncRequest {
    pub target_frame: Option<u64>,
    /// Position the seek asked for
    pub target_time: Option<f64>,
    /// Position before the seek
    pub baseline_time: f64,
    pub direction: SeekDirection,
}

impl SyncRequest {
    pub fn to_frame(video: &Video, frame: u64, baseline_time: f64) -> Self {
        let target_time = video.time_of(frame);
        Self {
            target_frame: Some(frame),
            target_time: Some(target_time),
            baseline_time,
            direction: SeekDirection::between(baseline_time, target_time),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Settled { frame: u64, iterations: u32 },
    /// Ran out of iterations; the position is accepted as is
    Exhausted { frame: u64 },
    Cancelled,
}

/// Result of `check_if_done`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    Done,
    Adjust(SeekDirection),
}

enum Next {
    Sample(FrameSample),
    Missing,
    Cancelled,
}

/// Settles one request against one media element
#[derive(Debug)]
pub struct SyncLoop {
    media: MediaHandle,
    video: Video,
    samples: watch::Receiver<Option<FrameSample>>,
    config: SyncConfig,
}

impl SyncLoop {
    pub fn new(
        media: MediaHandle,
        video: Video,
        samples: watch::Receiver<Option<FrameSample>>,
        config: SyncConfig,
    ) -> Self {
        Self {
            media,
            video,
            samples,
            config,
        }
    }

    pub fn nudge_time(&self) -> f64 {
        self.config.nudge_fraction * self.video.frame_duration
    }

    /// Seek and wait for completion. Samples presented before the seek are
    /// marked seen, so the next `changed()` reflects this seek.
    pub async fn seek(&mut self, seconds: f64, token: &SeekToken) -> Wait {
        self.samples.borrow_and_update();
        self.media.seek_and_wait(seconds, token).await
    }

    /// Settle the position after the seek described by `request`
    pub async fn run(&mut self, request: &SyncRequest, token: &SeekToken) -> SyncOutcome {
        if let Some(target) = request.target_time {
            if target > self.video.best_duration() + BOUNDARY_EPSILON {
                debug!("Sync skipped: {:.6}s is beyond the media duration", target);
                return SyncOutcome::Cancelled;
            }
        }

        let mut iteration = 0;
        loop {
            if token.is_cancelled() {
                return SyncOutcome::Cancelled;
            }
            iteration += 1;

            if !self.media.paused() {
                let current = self.video.clamped_frame_at(self.media.current_time());
                trace!("Sync skipped: playback is running at frame {}", current);
                return SyncOutcome::Settled {
                    frame: current,
                    iterations: iteration,
                };
            }

            let sample = match self.next_sample(token).await {
                Next::Sample(sample) => Some(sample),
                Next::Missing => None,
                Next::Cancelled => return SyncOutcome::Cancelled,
            };

            let current = self.video.clamped_frame_at(self.media.current_time());
            let direction = match self.check_if_done(request, current, sample) {
                Check::Done => {
                    trace!("Sync settled on frame {} after {} iteration(s)", current, iteration);
                    return SyncOutcome::Settled {
                        frame: current,
                        iterations: iteration,
                    };
                }
                Check::Adjust(direction) => direction,
            };

            if iteration >= self.config.max_iterations {
                warn!(
                    "Sync exhausted after {} iterations, accepting frame {}",
                    iteration, current
                );
                return SyncOutcome::Exhausted { frame: current };
            }

            let position = self.correction(iteration, request, current, direction);
            trace!(
                "Sync iteration {}: frame {}, rendered {:?}, seeking {:.6}s ({:?})",
                iteration,
                current,
                sample.map(|s| self.rendered_frame(s.media_time)),
                position,
                direction
            );

            if iteration > 1 && !self.config.settle_delay().is_zero() {
                tokio::select! {
                    _ = token.cancelled() => return SyncOutcome::Cancelled,
                    _ = tokio::time::sleep(self.config.settle_delay()) => {}
                }
            }

            if self.seek(position, token).await == Wait::Cancelled {
                return SyncOutcome::Cancelled;
            }
        }
    }

    async fn next_sample(&mut self, token: &SeekToken) -> Next {
        let wait = self.config.sample_wait();
        tokio::select! {
            _ = token.cancelled() => Next::Cancelled,
            changed = timeout(wait, self.samples.changed()) => match changed {
                Ok(Ok(())) => match *self.samples.borrow_and_update() {
                    Some(sample) => Next::Sample(sample),
                    None => Next::Missing,
                },
                // Timed out, or the clock was torn down
                _ => Next::Missing,
            },
        }
    }

    /// Frame number of a presented media time. For fractional non-drop
    /// rates a sample lagging its boundary by up to the tolerance still
    /// counts as that frame.
    fn rendered_frame(&self, media_time: f64) -> u64 {
        let rate = self.video.frame_rate;
        let slack = if rate.is_fractional() && !self.video.drop_frame {
            self.config.frame_tolerance_pct / 100.0 * self.video.frame_duration
        } else {
            0.0
        };
        self.video.clamped_frame_at(media_time + slack)
    }

    fn check_if_done(&self, request: &SyncRequest, current: u64, sample: Option<FrameSample>) -> Check {
        if !self.media.paused() || current == 0 {
            return Check::Done;
        }

        let Some(sample) = sample else {
            // Nothing presented: only the reported position can be checked
            return match request.target_frame {
                Some(target) if current != target => {
                    Check::Adjust(SeekDirection::between(current as f64, target as f64))
                }
                _ => Check::Done,
            };
        };
        let rendered = self.rendered_frame(sample.media_time);

        if let Some(target) = request.target_frame {
            if current == target && rendered == target {
                return Check::Done;
            }
            let reference = if current != target { current } else { rendered };
            return Check::Adjust(SeekDirection::between(reference as f64, target as f64));
        }

        if rendered != current {
            return Check::Adjust(SeekDirection::between(current as f64, rendered as f64));
        }

        let rate = self.video.frame_rate;
        if rate.is_fractional() && !self.video.drop_frame {
            let boundary = self.video.time_of(current);
            let offset_pct = (sample.media_time - boundary) / self.video.frame_duration * 100.0;
            if offset_pct < -BOUNDARY_EPSILON * 100.0 {
                trace!("Rendered frame {} lags its boundary by {:.1}%", current, -offset_pct);
                return Check::Adjust(SeekDirection::Forward);
            }
        }
        Check::Done
    }

    /// Next position to seek to
    fn correction(&self, iteration: u32, request: &SyncRequest, current: u64, direction: SeekDirection) -> f64 {
        let now = self.media.current_time();
        if iteration == 1 {
            // Give slow runtimes a chance to catch up before nudging
            return request.target_time.unwrap_or(now);
        }

        if let Some(target) = request.target_frame {
            let start = self.video.time_of(target);
            return if current != target {
                start
            } else {
                // Stay inside the target frame
                start + self.nudge_time()
            };
        }

        let direction = match direction {
            SeekDirection::None => match request.direction {
                SeekDirection::None => SeekDirection::Forward,
                d => d,
            },
            d => d,
        };
        match direction {
            SeekDirection::Backward => (now - self.nudge_time()).max(0.0),
            _ => now + self.nudge_time(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame_clock::FrameClock;
    use crate::core::media::MediaElement;
    use crate::core::seek_token::SeekEpoch;
    use crate::core::timecode::FrameRate;
    use crate::sim::{SimulatedMedia, SimulatedMediaConfig};

    struct Rig {
        media: SimulatedMedia,
        video: Video,
        _clock: FrameClock,
        sync: SyncLoop,
    }

    fn rig(config: SimulatedMediaConfig) -> Rig {
        let video = Video::new("sim://clip", config.frame_rate, config.true_duration + config.duration_error);
        let media = SimulatedMedia::new(config);
        media.load("sim://clip");
        let clock = FrameClock::attach(media.handle(), &video).unwrap();
        let sync = SyncLoop::new(
            MediaHandle::new(media.handle()),
            video.clone(),
            clock.subscribe(),
            SyncConfig::default(),
        );
        Rig {
            media,
            video,
            _clock: clock,
            sync,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_settles_immediately_on_clean_runtime() {
        let mut r = rig(SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0));
        let token = SeekEpoch::new().advance();
        let request = SyncRequest::to_frame(&r.video, 40, 0.0);

        assert_eq!(r.sync.seek(r.video.time_of(40), &token).await, Wait::Completed);
        let outcome = r.sync.run(&request, &token).await;
        assert_eq!(outcome, SyncOutcome::Settled { frame: 40, iterations: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_first_render_settles_on_second_iteration() {
        let mut r = rig(SimulatedMediaConfig {
            first_render_stale: true,
            ..SimulatedMediaConfig::new(FrameRate::FPS_29_97, 20.0)
        });
        let token = SeekEpoch::new().advance();
        let request = SyncRequest::to_frame(&r.video, 120, 0.0);

        r.sync.seek(r.video.time_of(120), &token).await;
        let outcome = r.sync.run(&request, &token).await;
        assert_eq!(outcome, SyncOutcome::Settled { frame: 120, iterations: 2 });
        assert_eq!(r.media.last_presented_frame(), Some(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_runtime_exhausts_and_completes() {
        let mut r = rig(SimulatedMediaConfig {
            always_stale: true,
            ..SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0)
        });
        let token = SeekEpoch::new().advance();
        let request = SyncRequest::to_frame(&r.video, 100, 0.0);

        r.sync.seek(r.video.time_of(100), &token).await;
        let outcome = r.sync.run(&request, &token).await;
        assert_eq!(outcome, SyncOutcome::Exhausted { frame: 100 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_loop_cancels() {
        let mut r = rig(SimulatedMediaConfig {
            always_stale: true,
            ..SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0)
        });
        let epoch = SeekEpoch::new();
        let token = epoch.advance();
        let request = SyncRequest::to_frame(&r.video, 100, 0.0);

        r.sync.seek(r.video.time_of(100), &token).await;
        let run = r.sync.run(&request, &token);
        let supersede = async {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            epoch.advance();
        };
        let (outcome, _) = tokio::join!(run, supersede);
        assert_eq!(outcome, SyncOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_beyond_duration_self_cancels() {
        let mut r = rig(SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0));
        let token = SeekEpoch::new().advance();
        let request = SyncRequest {
            target_frame: None,
            target_time: Some(11.0),
            baseline_time: 0.0,
            direction: SeekDirection::Forward,
        };
        assert_eq!(r.sync.run(&request, &token).await, SyncOutcome::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_playback_settles_without_waiting_for_a_sample() {
        let mut r = rig(SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        r.media.play().unwrap();
        let token = SeekEpoch::new().advance();
        let request = SyncRequest::to_frame(&r.video, 40, 0.0);

        let started = tokio::time::Instant::now();
        let outcome = r.sync.run(&request, &token).await;
        assert!(matches!(outcome, SyncOutcome::Settled { iterations: 1, .. }));
        assert_eq!(started.elapsed(), std::time::Duration::ZERO);
    }

    fn settle_at(seconds: f64) -> SyncRequest {
        SyncRequest {
            target_frame: None,
            target_time: Some(seconds),
            baseline_time: 0.0,
            direction: SeekDirection::Forward,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lag_within_tolerance_nudges_forward() {
        let mut r = rig(SimulatedMediaConfig {
            render_lag_pct: 10.0,
            ..SimulatedMediaConfig::new(FrameRate::FPS_29_97, 20.0)
        });
        let token = SeekEpoch::new().advance();
        let boundary = r.video.time_of(120);
        let request = settle_at(boundary);

        r.sync.seek(boundary, &token).await;
        let outcome = r.sync.run(&request, &token).await;
        // Same frame number, but the presented time trails the boundary:
        // one repeat, then a forward nudge inside frame 120
        assert_eq!(outcome, SyncOutcome::Settled { frame: 120, iterations: 3 });
        let position = r.media.current_time();
        assert!(position > boundary);
        assert!((position - boundary - r.sync.nudge_time()).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lag_beyond_tolerance_settles_where_frames_agree() {
        let mut r = rig(SimulatedMediaConfig {
            render_lag_pct: 30.0,
            ..SimulatedMediaConfig::new(FrameRate::FPS_29_97, 20.0)
        });
        let token = SeekEpoch::new().advance();
        let boundary = r.video.time_of(120);
        let request = settle_at(boundary);

        r.sync.seek(boundary, &token).await;
        let outcome = r.sync.run(&request, &token).await;
        // Presented time reads as frame 119: nudged back until the reported
        // position agrees with it
        assert_eq!(outcome, SyncOutcome::Settled { frame: 119, iterations: 3 });
        assert!(r.media.current_time() < boundary);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lag_is_ignored_at_integer_rates_when_frames_agree() {
        let mut r = rig(SimulatedMediaConfig {
            render_lag_pct: 10.0,
            ..SimulatedMediaConfig::new(FrameRate::FPS_25, 10.0)
        });
        let token = SeekEpoch::new().advance();
        // Mid-frame: the trailing time still reads as frame 50
        let position = r.video.time_of(50) + 0.5 * r.video.frame_duration;
        let request = settle_at(position);

        r.sync.seek(position, &token).await;
        let outcome = r.sync.run(&request, &token).await;
        assert_eq!(outcome, SyncOutcome::Settled { frame: 50, iterations: 1 });
    }

    #[test]
    fn test_direction_between() {
        assert_eq!(SeekDirection::between(1.0, 2.0), SeekDirection::Forward);
        assert_eq!(SeekDirection::between(2.0, 1.0), SeekDirection::Backward);
        assert_eq!(SeekDirection::between(1.0, 1.0), SeekDirection::None);
    }
}
