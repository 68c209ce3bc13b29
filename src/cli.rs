use clap::{Args as ClapArgs, Parser, Subcommand};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::error::TimecodeError;
use crate::core::timecode::FrameRate;
use crate::core::video::{Video, VideoLoadOptions};

/// Frame-accurate timecode and playback sync tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Log to file instead of stderr (default: framesync.log in the data dir)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE", global = true, require_equals = true)]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the timecode of a frame or a media time
    Format {
        #[command(flatten)]
        timeline: TimelineArgs,
        /// Media time in seconds
        #[arg(long, conflicts_with = "frame", required_unless_present = "frame")]
        time: Option<f64>,
        /// Frame index
        #[arg(long)]
        frame: Option<u64>,
    },
    /// Print the frame index and start time of a timecode
    Parse {
        #[command(flatten)]
        timeline: TimelineArgs,
        #[arg(value_name = "TIMECODE")]
        timecode: String,
    },
    /// Describe a timeline of the given duration
    Frames {
        #[command(flatten)]
        timeline: TimelineArgs,
        /// Duration in seconds
        #[arg(short = 'd', long)]
        duration: f64,
        /// Print the video descriptor as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run seek/playback actions against the simulated runtime
    Simulate {
        #[command(flatten)]
        timeline: TimelineArgs,
        /// True duration of the simulated stream in seconds
        #[arg(short = 'd', long, default_value = "60")]
        duration: f64,
        /// Error of the initially reported duration in seconds
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        duration_error: f64,
        /// First render after each seek shows the previous frame
        #[arg(long)]
        stale: bool,
        /// Print the final state as JSON
        #[arg(long)]
        json: bool,
        /// frame:N, step:N, time:S, tc:TIMECODE, percent:P, end, play:MS, pause, rate:R
        #[arg(value_name = "ACTION", allow_hyphen_values = true)]
        actions: Vec<SimAction>,
    },
    /// Show the config file location and effective settings
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Timeline shared by the timecode commands
#[derive(ClapArgs, Debug, Clone)]
pub struct TimelineArgs {
    /// Frame rate: 25, 29.97, 30000/1001 ...
    #[arg(short = 'r', long = "rate", default_value = "25")]
    pub rate: FrameRate,

    /// Drop-frame labelling (29.97 and 59.94 only)
    #[arg(long = "drop-frame")]
    pub drop_frame: bool,

    /// Timecode of the first frame of media
    #[arg(long, value_name = "TIMECODE")]
    pub ffom: Option<String>,

    /// Audio-only content (`.` separator)
    #[arg(long = "audio-only")]
    pub audio_only: bool,
}

impl TimelineArgs {
    pub fn load_options(&self) -> VideoLoadOptions {
        VideoLoadOptions {
            ffom: self.ffom.clone(),
            drop_frame: Some(self.drop_frame),
            audio_only: Some(self.audio_only),
            ..VideoLoadOptions::default()
        }
    }

    /// Offline video descriptor of `duration` seconds
    pub fn video(&self, duration: f64) -> Result<Video, TimecodeError> {
        Video::from_options("cli", self.rate, duration, &self.load_options())
    }
}

/// One step of a `simulate` run
#[derive(Debug, Clone, PartialEq)]
pub enum SimAction {
    Frame(i64),
    Step(i64),
    Time(f64),
    Timecode(String),
    Percent(f64),
    End,
    /// Play for this many milliseconds
    Play(u64),
    Pause,
    Rate(f64),
}

impl FromStr for SimAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn value<T: FromStr>(key: &str, v: Option<&str>) -> Result<T, String> {
            let v = v.ok_or_else(|| format!("'{}' needs a value, e.g. {}:10", key, key))?;
            v.parse().map_err(|_| format!("invalid value for '{}': {}", key, v))
        }

        let (key, v) = match s.split_once(':') {
            Some((key, v)) => (key, Some(v)),
            None => (s, None),
        };
        match key {
            "frame" => Ok(SimAction::Frame(value(key, v)?)),
            "step" => Ok(SimAction::Step(value(key, v)?)),
            "time" => Ok(SimAction::Time(value(key, v)?)),
            "tc" => Ok(SimAction::Timecode(value(key, v)?)),
            "percent" => Ok(SimAction::Percent(value(key, v)?)),
            "play" => Ok(SimAction::Play(value(key, v)?)),
            "rate" => Ok(SimAction::Rate(value(key, v)?)),
            "end" => Ok(SimAction::End),
            "pause" => Ok(SimAction::Pause),
            _ => Err(format!("unknown action: {}", s)),
        }
    }
}

impl fmt::Display for SimAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimAction::Frame(n) => write!(f, "frame:{}", n),
            SimAction::Step(n) => write!(f, "step:{}", n),
            SimAction::Time(t) => write!(f, "time:{}", t),
            SimAction::Timecode(tc) => write!(f, "tc:{}", tc),
            SimAction::Percent(p) => write!(f, "percent:{}", p),
            SimAction::End => write!(f, "end"),
            SimAction::Play(ms) => write!(f, "play:{}", ms),
            SimAction::Pause => write!(f, "pause"),
            SimAction::Rate(r) => write!(f, "rate:{}", r),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!("frame:-5".parse(), Ok(SimAction::Frame(-5)));
        assert_eq!("tc:00:00:10:00".parse(), Ok(SimAction::Timecode("00:00:10:00".into())));
        assert_eq!("end".parse(), Ok(SimAction::End));
        assert_eq!("play:500".parse(), Ok(SimAction::Play(500)));
        assert!("frame".parse::<SimAction>().is_err());
        assert!("jump:3".parse::<SimAction>().is_err());
        assert!("rate:fast".parse::<SimAction>().is_err());
    }

    #[test]
    fn test_args_parse_subcommand_with_globals() {
        let args = Args::try_parse_from([
            "framesync", "-vv", "format", "--rate", "29.97", "--drop-frame", "--frame", "1800",
        ])
        .unwrap();
        assert_eq!(args.verbosity, 2);
        match args.command {
            Command::Format { timeline, frame, time } => {
                assert_eq!(timeline.rate, FrameRate::FPS_29_97);
                assert!(timeline.drop_frame);
                assert_eq!(frame, Some(1800));
                assert_eq!(time, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_format_needs_time_or_frame() {
        assert!(Args::try_parse_from(["framesync", "format"]).is_err());
    }

    #[test]
    fn test_timeline_video() {
        let args = Args::try_parse_from([
            "framesync", "frames", "-r", "30000/1001", "--drop-frame", "--ffom", "01:00:00;00", "-d", "10",
        ])
        .unwrap();
        let Command::Frames { timeline, duration, .. } = args.command else {
            panic!("expected frames");
        };
        let video = timeline.video(duration).unwrap();
        assert!(video.drop_frame);
        assert_eq!(video.total_frames, 300);
        assert_eq!(video.ffom_frame(), 107_892);
    }
}
