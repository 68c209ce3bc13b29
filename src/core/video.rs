//! Loaded video descriptor and load options.
//!
//! A `Video` is immutable once attached, except for the duration correction
//! the runtime reports after the first seek to the end of media
//! (`corrected_duration` and the `total_frames` derived from it).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::TimecodeError;
use super::timecode::{FrameRate, Timecode, timecode_to_frame};

/// How the source is delivered. The core only records it; manifest loading
/// belongs to the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Hls,
    #[default]
    Native,
}

/// Options accepted by `VideoController::load_video`.
///
/// ```json
/// { "duration": 120.5, "ffom": "01:00:00;00", "dropFrame": true, "protocol": "hls" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VideoLoadOptions {
    /// Overrides the duration reported by the runtime
    pub duration: Option<f64>,
    /// First frame of media as timecode text
    pub ffom: Option<String>,
    pub drop_frame: Option<bool>,
    pub protocol: Option<Protocol>,
    /// Audio-only source (selects the tick frame clock)
    pub audio_only: Option<bool>,
    /// DRM-protected source (selects the tick frame clock)
    pub drm: Option<bool>,
}

/// Descriptor of the loaded media
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Video {
    pub id: Uuid,
    pub source_url: String,
    pub frame_rate: FrameRate,
    pub drop_frame: bool,
    /// Duration as first reported (seconds)
    pub duration: f64,
    /// `ceil(best duration × frame rate)`
    pub total_frames: u64,
    pub frame_duration: f64,
    /// Duration reported by the runtime after the first full seek to end
    pub corrected_duration: Option<f64>,
    pub init_segment_time_offset: Option<f64>,
    /// First frame of media
    pub ffom: Option<Timecode>,
    pub audio_only: bool,
    pub drm: bool,
    pub protocol: Protocol,
    #[serde(skip)]
    ffom_frame: u64,
}

impl Video {
    pub fn new(source_url: impl Into<String>, frame_rate: FrameRate, duration: f64) -> Self {
        let duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        };
        Self {
            id: Uuid::new_v4(),
            source_url: source_url.into(),
            frame_rate,
            drop_frame: false,
            duration,
            total_frames: frame_rate.frame_count(duration),
            frame_duration: frame_rate.frame_duration(),
            corrected_duration: None,
            init_segment_time_offset: None,
            ffom: None,
            audio_only: false,
            drm: false,
            protocol: Protocol::Native,
            ffom_frame: 0,
        }
    }

    /// Build from runtime-reported duration and caller options.
    pub fn from_options(
        source_url: impl Into<String>,
        frame_rate: FrameRate,
        reported_duration: f64,
        options: &VideoLoadOptions,
    ) -> Result<Self, TimecodeError> {
        let duration = options.duration.unwrap_or(reported_duration);
        let mut video = Video::new(source_url, frame_rate, duration)
            .with_drop_frame(options.drop_frame.unwrap_or(false))?
            .with_audio_only(options.audio_only.unwrap_or(false))
            .with_drm(options.drm.unwrap_or(false))
            .with_protocol(options.protocol.unwrap_or_default());
        if let Some(ffom) = options.ffom.as_deref() {
            video = video.with_ffom(ffom)?;
        }
        Ok(video)
    }

    /// Switch drop-frame labelling. Fails for rates without a drop-frame
    /// convention; clears a previously set ffom.
    pub fn with_drop_frame(mut self, drop_frame: bool) -> Result<Self, TimecodeError> {
        if drop_frame && !self.frame_rate.supports_drop_frame() {
            return Err(TimecodeError::DropFrameUnsupported(self.frame_rate.to_string()));
        }
        self.drop_frame = drop_frame;
        self.ffom = None;
        self.ffom_frame = 0;
        Ok(self)
    }

    /// Set the first frame of media. The text must follow the video's own
    /// drop/non-drop convention.
    pub fn with_ffom(mut self, text: &str) -> Result<Self, TimecodeError> {
        let mut tc: Timecode = text.parse()?;
        if tc.audio_only {
            tc.drop_frame = self.drop_frame;
        } else if tc.drop_frame != self.drop_frame {
            return Err(TimecodeError::DropFrameMismatch {
                text: text.to_string(),
                video_drop_frame: self.drop_frame,
            });
        }
        self.ffom_frame = timecode_to_frame(&tc, self.frame_rate)?;
        self.ffom = Some(tc);
        Ok(self)
    }

    pub fn with_init_segment_time_offset(mut self, offset: f64) -> Self {
        self.init_segment_time_offset = (offset.is_finite() && offset != 0.0).then_some(offset);
        self
    }

    pub fn with_audio_only(mut self, audio_only: bool) -> Self {
        self.audio_only = audio_only;
        self
    }

    pub fn with_drm(mut self, drm: bool) -> Self {
        self.drm = drm;
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Most accurate known duration
    pub fn best_duration(&self) -> f64 {
        self.corrected_duration.unwrap_or(self.duration)
    }

    /// Last renderable frame index
    pub fn last_frame(&self) -> u64 {
        self.total_frames.saturating_sub(1)
    }

    /// Absolute frame number of the ffom (0 without ffom)
    pub fn ffom_frame(&self) -> u64 {
        self.ffom_frame
    }

    fn offset(&self) -> f64 {
        self.init_segment_time_offset.unwrap_or(0.0)
    }

    /// Frame shown at media time `seconds`
    pub fn frame_at(&self, seconds: f64) -> u64 {
        self.frame_rate.frame_at(seconds - self.offset())
    }

    /// Frame shown at `seconds`, clamped to the last renderable frame
    pub fn clamped_frame_at(&self, seconds: f64) -> u64 {
        self.frame_at(seconds).min(self.last_frame())
    }

    /// Media time at which `frame` starts
    pub fn time_of(&self, frame: u64) -> f64 {
        self.offset() + self.frame_rate.time_of(frame)
    }

    /// Adopt the runtime's corrected duration. Only the first correction is
    /// taken; returns whether it was applied.
    pub fn apply_corrected_duration(&mut self, duration: f64) -> bool {
        if self.corrected_duration.is_some() || !duration.is_finite() || duration <= 0.0 {
            return false;
        }
        self.corrected_duration = Some(duration);
        self.total_frames = self.frame_rate.frame_count(duration);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_frames_and_duration() {
        let v = Video::new("a.mp4", FrameRate::FPS_29_97, 10.01);
        assert_eq!(v.total_frames, 300);
        assert_eq!(v.last_frame(), 299);
        assert!((v.frame_duration - 1001.0 / 30000.0).abs() < 1e-12);
        assert_eq!(v.best_duration(), 10.01);
    }

    #[test]
    fn test_clamped_frame_at_end() {
        let v = Video::new("a.mp4", FrameRate::FPS_29_97, 10.01);
        assert_eq!(v.frame_at(10.01), 300);
        assert_eq!(v.clamped_frame_at(10.01), 299);
    }

    #[test]
    fn test_corrected_duration_applies_once() {
        let mut v = Video::new("a.mp4", FrameRate::FPS_29_97, 10.03);
        assert_eq!(v.total_frames, 301);
        assert!(v.apply_corrected_duration(10.01));
        assert_eq!(v.total_frames, 300);
        assert!(!v.apply_corrected_duration(10.5));
        assert_eq!(v.best_duration(), 10.01);
    }

    #[test]
    fn test_drop_frame_requires_ntsc_rate() {
        assert!(Video::new("a.mp4", FrameRate::FPS_25, 1.0).with_drop_frame(true).is_err());
        assert!(Video::new("a.mp4", FrameRate::FPS_29_97, 1.0).with_drop_frame(true).is_ok());
    }

    #[test]
    fn test_ffom_must_match_convention() {
        let v = Video::new("a.mp4", FrameRate::FPS_29_97, 1.0);
        assert!(v.clone().with_ffom("01:00:00;00").is_err());
        let v = v.with_ffom("01:00:00:00").unwrap();
        assert_eq!(v.ffom_frame(), 108_000);
    }

    #[test]
    fn test_from_options_json() {
        let options: VideoLoadOptions = serde_json::from_str(
            r#"{ "duration": 20.0, "ffom": "00:01:00;02", "dropFrame": true, "protocol": "hls" }"#,
        )
        .unwrap();
        let v = Video::from_options("x.m3u8", FrameRate::FPS_29_97, 19.5, &options).unwrap();
        assert_eq!(v.duration, 20.0);
        assert!(v.drop_frame);
        assert_eq!(v.protocol, Protocol::Hls);
        assert_eq!(v.ffom_frame(), 1800);
    }
}
