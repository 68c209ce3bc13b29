use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info};
use std::time::Duration;

use framesync::cli::{Args, Command, SimAction, TimelineArgs};
use framesync::config::{CONFIG_FILE_NAME, PlayerConfig};
use framesync::core::player_events::{EndedEvent, SeekedEvent};
use framesync::core::timecode::{format_frame, format_time, parse_timecode};
use framesync::paths::{self, PathConfig};
use framesync::sim::{SimulatedMedia, SimulatedMediaConfig};
use framesync::{RequestOutcome, VideoController};

/// Timeline length assumed by `format` and `parse` (24 hours)
const OFFLINE_DURATION: f64 = 86_400.0;

fn init_logging(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| paths::data_file("framesync.log", path_config));
        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    init_logging(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let config_path = paths::config_file(CONFIG_FILE_NAME, &path_config);
    info!("Config path: {}", config_path.display());

    match args.command {
        Command::Format {
            timeline,
            time,
            frame,
        } => {
            let video = timeline.video(OFFLINE_DURATION)?;
            let tc = match (frame, time) {
                (Some(frame), _) => format_frame(frame, &video),
                (None, Some(time)) => format_time(time, &video),
                (None, None) => bail!("either --time or --frame is required"),
            };
            println!("{}", tc);
        }
        Command::Parse { timeline, timecode } => {
            let video = timeline.video(OFFLINE_DURATION)?;
            let frame = parse_timecode(&timecode, &video)?;
            println!("{}\t{:.6}", frame, video.time_of(frame));
        }
        Command::Frames {
            timeline,
            duration,
            json,
        } => {
            let video = timeline.video(duration)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&video)?);
            } else {
                println!("rate:        {} fps", video.frame_rate);
                println!("frames:      {}", video.total_frames);
                println!("frame time:  {:.9}s", video.frame_duration);
                println!("first frame: {}", format_frame(0, &video));
                println!("last frame:  {}", format_frame(video.last_frame(), &video));
            }
        }
        Command::Simulate {
            timeline,
            duration,
            duration_error,
            stale,
            json,
            actions,
        } => {
            let config = PlayerConfig::load_or_default(&config_path)?;
            let sim = SimulatedMediaConfig {
                duration_error,
                first_render_stale: stale,
                ..SimulatedMediaConfig::new(timeline.rate, duration)
            };
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(simulate(config, sim, timeline, actions, json))?;
        }
        Command::Config { init } => {
            if init && !config_path.exists() {
                paths::ensure_dirs(&path_config)?;
                PlayerConfig::default().to_json(&config_path)?;
                println!("Wrote {}", config_path.display());
            }
            let config = PlayerConfig::load_or_default(&config_path)?;
            println!("# {}", config_path.display());
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

async fn simulate(
    config: PlayerConfig,
    sim: SimulatedMediaConfig,
    timeline: TimelineArgs,
    actions: Vec<SimAction>,
    json: bool,
) -> Result<()> {
    let media = SimulatedMedia::new(sim);
    let controller = VideoController::new(config);
    let video = controller
        .load_video(media.handle(), "sim://timeline", timeline.rate, timeline.load_options())
        .await?;
    info!("Simulating {} frames", video.total_frames);

    for action in &actions {
        let outcome = match action {
            SimAction::Frame(n) => controller.seek_to_frame(*n)?.await,
            SimAction::Step(n) => controller.seek_from_current_frame(*n)?.await,
            SimAction::Time(t) => controller.seek_to_time(*t)?.await,
            SimAction::Timecode(tc) => controller.seek_to_timecode(tc)?.await,
            SimAction::Percent(p) => controller.seek_to_percent(*p)?.await,
            SimAction::End => controller.seek_to_end()?.await,
            SimAction::Play(ms) => {
                controller.play()?.await?;
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                RequestOutcome::Completed {
                    frame: controller.current_frame()?,
                    time: controller.current_time()?,
                }
            }
            SimAction::Pause => controller.pause()?.await?,
            SimAction::Rate(r) => controller.set_playback_rate(*r)?.await?,
        };

        let seeked = controller.bus().take::<SeekedEvent>().len();
        let ended = controller.bus().take::<EndedEvent>().len();
        controller.bus().poll();
        match outcome {
            RequestOutcome::Completed { frame, time } => println!(
                "{:<16} frame {:>7}  {}  {:.6}s{}{}",
                action.to_string(),
                frame,
                controller.current_timecode()?,
                time,
                if seeked > 0 { "  seeked" } else { "" },
                if ended > 0 { "  ended" } else { "" },
            ),
            RequestOutcome::Cancelled => println!("{:<16} cancelled", action.to_string()),
        }
    }

    if json {
        let summary = serde_json::json!({
            "video": controller.video(),
            "state": controller.playback_state(),
            "frame": controller.current_frame()?,
            "timecode": controller.current_timecode()?.to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    controller.destroy();
    Ok(())
}
