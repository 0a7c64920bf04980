//! RoboReplay CLI
//!
//! Replays an MCAP robot recording frame by frame and reports the nearest
//! obstacle to the robot at every step.

use clap::Parser;
use roboreplay_core::types::timestamp_secs;
use roboreplay_core::{
    merge_log, McapLog, PlaybackDriver, PlaybackSummary, RecordDecoder, RenderSink, ReplayConfig,
    ReplayError, TimestampSource, TracingSink,
};
use roboreplay_env::{StopSignal, TokioClock};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// RoboReplay MCAP playback CLI
#[derive(Parser, Debug)]
#[command(name = "roboreplay")]
#[command(about = "Replay a robot recording with nearest-obstacle readout", long_about = None)]
struct Args {
    /// MCAP recording to replay
    #[arg(default_value = "recording.mcap")]
    path: PathBuf,

    /// JSON config file (flags below override its values)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between rendered frames
    #[arg(short, long)]
    tick_interval: Option<f64>,

    /// Channel carrying robot odometry
    #[arg(long)]
    pose_channel: Option<String>,

    /// Channel carrying tracked objects
    #[arg(long)]
    objects_channel: Option<String>,

    /// Message time used for ordering (publish_time, log_time)
    #[arg(long)]
    timestamp_source: Option<TimestampSource>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Stream frames to a spawned Rerun viewer
    #[cfg(feature = "visualization")]
    #[arg(long)]
    viewer: bool,

    /// Save frames to an .rrd file instead of spawning a viewer
    #[cfg(feature = "visualization")]
    #[arg(long)]
    save: Option<String>,
}

fn load_config(args: &Args) -> Result<ReplayConfig, ReplayError> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            ReplayConfig::from_json_file(path)?
        }
        None => ReplayConfig::default(),
    };

    if let Some(secs) = args.tick_interval {
        config.tick_interval_secs = secs;
    }
    if let Some(channel) = &args.pose_channel {
        config.pose_channel = channel.clone();
    }
    if let Some(channel) = &args.objects_channel {
        config.objects_channel = channel.clone();
    }
    if let Some(source) = args.timestamp_source {
        config.timestamp_source = source;
    }

    config.validate()?;
    Ok(config)
}

#[cfg_attr(not(feature = "visualization"), allow(unused_variables))]
fn build_sink(args: &Args, config: &ReplayConfig) -> Result<Box<dyn RenderSink>, ReplayError> {
    #[cfg(feature = "visualization")]
    {
        use roboreplay_core::RerunSink;

        if let Some(path) = &args.save {
            info!("Saving frames to {}", path);
            return Ok(Box::new(RerunSink::save("roboreplay", path, config.view_half_extent)?));
        }
        if args.viewer {
            return Ok(Box::new(RerunSink::spawn("roboreplay", config.view_half_extent)?));
        }
    }

    Ok(Box::new(TracingSink::default()))
}

async fn replay(args: &Args, stop: &StopSignal) -> Result<PlaybackSummary, ReplayError> {
    let config = load_config(args)?;
    let log = McapLog::open(&args.path, config.timestamp_source)?;
    info!("Opened {} ({} bytes)", log.path().display(), log.size());

    let topics = log.topics()?;
    let bound = [
        ("pose", Some(&config.pose_channel)),
        ("objects", Some(&config.objects_channel)),
        ("extents", config.extents_channel.as_ref()),
    ];
    for (role, channel) in bound {
        if let Some(channel) = channel {
            if !topics.contains(channel) {
                warn!("No '{}' channel in log for {} stream", channel, role);
            }
        }
    }

    let decoder = RecordDecoder::new(config.bindings());
    let extents = log.robot_extents(&decoder)?;
    let merger = merge_log(&log, &decoder)?;
    let sink = build_sink(args, &config)?;

    let mut driver = PlaybackDriver::new(merger, sink, config.tick_interval()).with_robot_extents(extents);
    let clock = TokioClock::new();

    Ok(driver.run(&clock, stop).await?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("RoboReplay v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let stop = StopSignal::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current frame");
            ctrl_c.request_stop();
        }
    });

    match replay(&args, &stop).await {
        Ok(summary) => {
            let stats = summary.merge_stats;
            info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            info!("  Finished:         {:?}", summary.reason);
            info!("  Frames rendered:  {}", summary.frames_rendered);
            info!(
                "  Events applied:   {} pose / {} objects",
                stats.pose_events, stats.object_events
            );
            if stats.decode_errors > 0 || stats.order_violations > 0 {
                warn!(
                    "  Records dropped:  {} undecodable / {} out of order",
                    stats.decode_errors, stats.order_violations
                );
            }
            match &summary.closest_approach {
                Some(c) => info!(
                    "  Closest approach: {:.2} m to '{}' at t={:.3}s",
                    c.distance,
                    c.object_id,
                    timestamp_secs(c.timestamp)
                ),
                None => info!("  Closest approach: no obstacles seen"),
            }
        }
        Err(e) => {
            error!("Replay failed: {}", e);
            std::process::exit(1);
        }
    }
}
