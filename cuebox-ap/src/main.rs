//! cuebox Audio Player (cuebox-ap) - command-line front end
//!
//! Lists output devices and plays sound files through the playback engine.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cuebox_ap::audio::output::list_devices;
use cuebox_ap::{AudioAsset, DeviceKind, EngineOptions, LoadOptions, PlayMode, PlaybackEngine};
use cuebox_common::config::resolve_config;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for cuebox-ap
#[derive(Parser, Debug)]
#[command(name = "cuebox-ap")]
#[command(about = "Sound cue player")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, global = true, env = "CUEBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List output devices
    Devices {
        /// Backend to enumerate (system, jack, asio)
        #[arg(short, long, default_value = "system")]
        kind: DeviceKind,
    },

    /// Play one or more files concurrently
    Play {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Repeat every file until stopped
        #[arg(short, long = "loop")]
        looped: bool,

        /// Decode during playback instead of up front
        #[arg(short, long)]
        streaming: bool,

        /// Per-file volume (0 to 4)
        #[arg(long, default_value = "1.0")]
        volume: f32,

        /// Master volume (0 to 1), overrides the configuration
        #[arg(short, long)]
        master: Option<f32>,

        /// Stop after this many seconds
        #[arg(long, value_parser = parse_seconds)]
        seconds: Option<Duration>,
    },
}

/// Parse a non-negative, finite number of seconds
fn parse_seconds(s: &str) -> std::result::Result<Duration, String> {
    let secs: f64 = s.trim().parse().map_err(|e| format!("invalid number {:?}: {}", s, e))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("invalid duration {:?}: {}", s, e))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cuebox_ap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match args.command {
        Command::Devices { kind } => {
            let devices = list_devices(&kind)
                .with_context(|| format!("Failed to list {} devices", kind))?;
            for device in devices {
                println!("{}\t{}", device.native_id, device.display_name);
            }
            Ok(())
        }
        Command::Play {
            files,
            looped,
            streaming,
            volume,
            master,
            seconds,
        } => {
            let config = resolve_config(args.config.as_deref(), "CUEBOX_CONFIG")
                .context("Failed to load configuration")?;
            let mode = if looped { PlayMode::Loop } else { PlayMode::Once };

            let mut options = EngineOptions::from_config(&config)?;
            if let Some(master) = master {
                options.master_volume = master;
            }
            play(options, files, mode, !streaming, volume, seconds).await
        }
    }
}

async fn play(
    options: EngineOptions,
    files: Vec<PathBuf>,
    mode: PlayMode,
    cached: bool,
    volume: f32,
    limit: Option<Duration>,
) -> Result<()> {
    info!("Opening {}", options.device);
    let engine = PlaybackEngine::new(options);
    engine.start().context("Failed to start playback engine")?;
    let format = engine
        .format()
        .context("Engine started without an output format")?;

    let load_options = LoadOptions::default()
        .target_format(format)
        .cached(cached)
        .volume(volume);

    let mut handles = Vec::new();
    for file in &files {
        let asset = AudioAsset::load(file, &load_options)
            .with_context(|| format!("Failed to load {}", file.display()))?;
        let handle = engine
            .play(&asset, mode)
            .with_context(|| format!("Failed to play {}", file.display()))?;
        handles.push(handle);
    }

    let finished = async {
        let mut ticker = tokio::time::interval(Duration::from_millis(50));
        loop {
            ticker.tick().await;
            if handles.iter().all(|h| h.is_finished()) {
                break;
            }
            if engine.has_device_error() {
                warn!("Output device reported an error");
                break;
            }
        }
    };

    let deadline = async {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = finished => info!("Playback finished"),
        _ = deadline => info!("Time limit reached"),
        _ = signal::ctrl_c() => info!("Interrupted"),
    }

    for handle in &handles {
        handle.stop();
    }
    engine.dispose();
    Ok(())
}
