use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

mod audio;
mod color;
mod config;
mod display;
mod spectrum;
mod visualizer;

use audio::{AudioBackend, PulseBackend};
use config::Config;
use spectrum::{LevelMetric, WeightingCurve};
use visualizer::SmoothingMode;

#[derive(Parser, Debug)]
#[command(name = "bandscope")]
#[command(author, version, about = "Real-time octave band spectrum analyzer")]
pub struct Args {
    /// Config file path
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Capture device name substring (empty = first available)
    #[arg(short, long)]
    device: Option<String>,

    /// Sample rate in Hz
    #[arg(short = 'r', long)]
    sample_rate: Option<u32>,

    /// Samples per FFT block
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Samples shared between consecutive blocks
    #[arg(long)]
    buffer_overlap: Option<usize>,

    /// Bands per octave
    #[arg(short, long)]
    bands_per_octave: Option<u32>,

    /// Frequency weighting curve
    #[arg(short, long, value_enum)]
    weighting: Option<WeightingCurve>,

    /// Band level metric
    #[arg(short, long, value_enum)]
    level: Option<LevelMetric>,

    /// Frames averaged by the temporal smoother
    #[arg(long)]
    smoothing_window: Option<usize>,

    /// Temporal smoothing mode
    #[arg(short = 'm', long, value_enum)]
    smoothing_mode: Option<SmoothingMode>,

    /// Target frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Color scheme: spectrum, fire, ocean, monochrome
    #[arg(long)]
    colors: Option<String>,

    /// Grow bars from the middle of the screen
    #[arg(long)]
    mirror: bool,

    /// List capture devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Write a default config file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they don't tear the TUI on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bandscope=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.init_config {
        let path = Config::init_default_config()?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    if args.list_devices {
        for device in PulseBackend.list_input_devices()? {
            println!("{}", device);
        }
        return Ok(());
    }

    // Explicit path must parse; the default path falls back quietly.
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_from_default_path().unwrap_or_default(),
    };
    config.merge_args(&args);
    config.sanitize();

    if config.audio.device.is_empty() {
        info!("No capture device configured, using the first available source");
    }
    if config.audio.buffer_size > config.audio.sample_rate as usize {
        warn!(
            "buffer_size {} exceeds one second of audio; bars will lag",
            config.audio.buffer_size
        );
    }

    info!(
        "Starting bandscope at {} Hz, 1/{} octave, {} weighting",
        config.audio.sample_rate, config.spectrum.bands_per_octave, config.spectrum.weighting
    );

    display::terminal::run(config).await?;

    Ok(())
}
