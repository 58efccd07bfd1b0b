//! chime-play - play a sound event or file from the command line
//!
//! Builds a property set from the flags, plays it through a fresh context and
//! waits for the result. Exits non-zero when playback fails.

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use chime_common::config::BackendKind;
use chime_common::{EngineConfig, PlaybackState, Prop, PropertySet};
use chime_player::Context;
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for chime-play
#[derive(Parser, Debug)]
#[command(name = "chime-play")]
#[command(about = "Play a sound event from the XDG sound theme or a sound file")]
#[command(version)]
struct Args {
    /// Event sound identifier, e.g. `bell` or `dialog-warning`
    #[arg(short, long)]
    id: Option<String>,

    /// Sound file to play
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Human readable event description
    #[arg(short, long)]
    description: Option<String>,

    /// Cache control: permanent, volatile or never
    #[arg(short, long)]
    cache_control: Option<String>,

    /// Volume adjustment in dB
    #[arg(long, allow_hyphen_values = true)]
    volume: Option<f32>,

    /// Additional property, repeatable
    #[arg(short, long = "property", value_name = "KEY=VALUE")]
    properties: Vec<String>,

    /// Preferred backend (pulse, alsa, gstreamer, oss, null)
    #[arg(long)]
    driver: Option<String>,

    /// Sound theme name
    #[arg(long)]
    theme: Option<String>,

    /// Output profile used during theme lookup
    #[arg(long)]
    profile: Option<String>,

    /// Play the sound this many times
    #[arg(short, long = "loop", default_value = "1")]
    loops: u32,

    /// Configuration file
    #[arg(long, env = "CHIME_CONFIG")]
    config: Option<PathBuf>,

    /// Print the property set as JSON before playing
    #[arg(long)]
    dump_props: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chime_player={0},chime_common={0}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.id.is_none() && args.file.is_none() {
        bail!("Either --id or --file is required");
    }

    if let Some(driver) = &args.driver {
        config.driver = Some(driver.parse::<BackendKind>().context("Invalid --driver")?);
    }
    if let Some(theme) = &args.theme {
        config.theme = theme.clone();
    }
    if let Some(profile) = &args.profile {
        config.output_profile = profile.clone();
    }
    if config.application_name.is_none() {
        config.application_name = Some("chime-play".to_string());
    }

    let properties = build_properties(&args)?;
    if args.dump_props {
        println!("{}", serde_json::to_string_pretty(&properties)?);
    }

    let ctx = Context::new(config).context("Failed to create playback context")?;

    for round in 1..=args.loops.max(1) {
        let handle = ctx.play(&properties).context("Failed to start playback")?;
        info!("Playing round {} (handle {})", round, handle.id());

        let state = tokio::select! {
            state = handle.wait() => state,
            _ = signal::ctrl_c() => {
                warn!("Interrupted, canceling playback");
                handle.cancel();
                handle.wait().await
            }
        };

        match state {
            PlaybackState::Completed => {}
            PlaybackState::Canceled => {
                ctx.destroy().await;
                bail!("Playback canceled");
            }
            PlaybackState::Failed(e) => {
                ctx.destroy().await;
                bail!("Playback failed [{}]: {}", e.code(), e);
            }
            other => bail!("Playback ended in unexpected state {}", other),
        }
    }

    ctx.destroy().await;
    Ok(())
}

fn build_properties(args: &Args) -> Result<PropertySet> {
    let mut builder = PropertySet::builder();

    if let Some(id) = &args.id {
        builder = builder.set(Prop::EventId, id.as_str());
    }
    if let Some(file) = &args.file {
        builder = builder.set(Prop::MediaFilename, file.to_string_lossy().into_owned());
    }
    if let Some(description) = &args.description {
        builder = builder.set(Prop::EventDescription, description.as_str());
    }
    if let Some(mode) = &args.cache_control {
        builder = builder.set(Prop::CacheControl, mode.as_str());
    }
    if let Some(volume) = args.volume {
        builder = builder.set(Prop::Volume, volume.to_string());
    }
    for pair in &args.properties {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Property '{}' is not KEY=VALUE", pair);
        };
        builder = builder.set(key.trim(), value);
    }

    builder.build().context("Invalid properties")
}
