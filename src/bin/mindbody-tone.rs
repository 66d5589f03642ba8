//! mindbody-tone: render and configure the ambient 432 Hz tone from the shell.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tracing::{Level, info};

use mindbody_tone::config::ToneBankConfig;
use mindbody_tone::dsp::renderer::{PreviewRequest, render_preview_wav};
use mindbody_tone::settings::{self, JsonFileStore};

#[derive(Parser, Debug)]
#[command(name = "mindbody-tone", version, about = "Ambient 432 Hz tone engine")]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the soundscape to a WAV file
    Render {
        /// Output WAV path
        #[arg(short, long, default_value = "ambient-432.wav")]
        out: PathBuf,
        /// Total length in seconds
        #[arg(short, long, default_value_t = 10.0)]
        seconds: f64,
        /// Call stop() at this time to hear the fade-out
        #[arg(long)]
        stop_at: Option<f64>,
        /// Volume in [0, 1]; defaults to the persisted setting
        #[arg(long)]
        volume: Option<f64>,
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
        /// Tone bank JSON (see `config`)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show or set the persisted volume
    Volume {
        value: Option<f64>,
    },
    /// Print the default tone bank as JSON
    Config,
}

fn open_settings(path: Option<PathBuf>) -> Result<JsonFileStore> {
    let path = match path {
        Some(p) => p,
        None => JsonFileStore::default_path().ok_or_else(|| anyhow!("no config directory on this platform"))?,
    };
    Ok(JsonFileStore::open(path)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).with_writer(std::io::stderr).init();

    match cli.command {
        Command::Render { out, seconds, stop_at, volume, sample_rate, config } => {
            let config = match config {
                Some(path) => {
                    let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
                    ToneBankConfig::from_json(&text)?
                }
                None => ToneBankConfig::default(),
            };
            let volume = match volume {
                Some(v) => settings::clamp_volume(v),
                None => settings::load_volume(&open_settings(cli.settings)?),
            };
            let request = PreviewRequest { seconds, stop_at, volume, sample_rate, config };
            let wav = render_preview_wav(&request)?;
            fs::write(&out, &wav).with_context(|| format!("writing {}", out.display()))?;
            info!(path = %out.display(), bytes = wav.len(), "preview written");
            println!("Wrote {} ({seconds:.1}s at volume {volume:.2})", out.display());
        }
        Command::Volume { value } => {
            let mut store = open_settings(cli.settings)?;
            if let Some(v) = value {
                settings::save_volume(&mut store, settings::clamp_volume(v))?;
            }
            println!("{:.2}", settings::load_volume(&store));
        }
        Command::Config => {
            println!("{}", ToneBankConfig::default().to_json_pretty()?);
        }
    }
    Ok(())
}
