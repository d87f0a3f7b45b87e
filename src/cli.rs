use clap::Parser;
use std::path::PathBuf;

use crate::audio::features::AmplitudeCurve;
use crate::render::color::ColorScheme;
use crate::render::modes::Mode;

/// Flags left unset fall back to the config file, then to built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "ledviz", about = "Audio-reactive spectrum streamer for UDP LED matrices")]
pub struct Cli {
    /// Play an audio file (WAV, MP3, FLAC, OGG) instead of capturing system audio
    pub input: Option<PathBuf>,

    /// Config file (default: ./ledviz.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Display controller address
    #[arg(long)]
    pub host: Option<String>,

    /// Display UDP port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Capture device name (substring), or "default"
    #[arg(short, long)]
    pub device: Option<String>,

    /// Capture sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Samples per audio block (one block per frame)
    #[arg(long)]
    pub block_size: Option<usize>,

    /// Initial render mode
    #[arg(short, long, value_enum)]
    pub mode: Option<Mode>,

    /// Initial color scheme
    #[arg(long, value_enum)]
    pub scheme: Option<ColorScheme>,

    /// Initial amplitude curve
    #[arg(long, value_enum)]
    pub curve: Option<AmplitudeCurve>,

    /// LED brightness (0.0-1.0)
    #[arg(short, long)]
    pub brightness: Option<f32>,

    /// Temporal smoothing, weight of the previous frame (0.0-1.0)
    #[arg(long)]
    pub smoothing: Option<f32>,

    /// Play the analysed audio this many milliseconds late to line up with the LEDs
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Do not ask the display to enter streaming mode
    #[arg(long)]
    pub no_stream_request: bool,

    /// List capture devices and exit
    #[arg(long)]
    pub list_devices: bool,
}
