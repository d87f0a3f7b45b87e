mod audio;
mod cli;
mod config;
mod input;
mod pipeline;
mod render;
mod transport;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use audio::analysis::{AnalyzerSettings, SpectrumAnalyzer};
use audio::capture::{list_devices, LoopbackCapture};
use audio::file::FileSource;
use audio::playback::DelayedMonitor;
use audio::source::AudioSource;
use cli::Cli;
use config::Config;
use input::{KeyboardInput, NoInput};
use pipeline::Pipeline;
use render::modes::Renderer;
use transport::control::StreamControl;
use transport::udp::FrameSender;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        println!("Capture devices:");
        for device in list_devices()? {
            let mut tags = Vec::new();
            if device.is_default {
                tags.push("default");
            }
            if device.is_monitor {
                tags.push("monitor");
            }
            if tags.is_empty() {
                println!("  {}", device.name);
            } else {
                println!("  {:<50} [{}]", device.name, tags.join(", "));
            }
        }
        return Ok(());
    }

    let mut cfg = match config::find_config(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };
    apply_cli(&mut cfg, &cli);
    cfg.validate()?;

    let geometry = cfg.geometry()?;
    log::info!("ledviz - audio-reactive LED streamer");
    log::info!(
        "Display: {}:{} | grid {}x{} ({} LEDs, {}x{} panels x{})",
        cfg.display.host,
        cfg.display.port,
        geometry.width,
        geometry.height,
        geometry.max_leds,
        geometry.panel_width,
        geometry.panel_height,
        geometry.panels_wide
    );

    // INIT: an audio source is required; there is no fallback device.
    let mut source: Box<dyn AudioSource> = match &cli.input {
        Some(path) => Box::new(FileSource::open(path, cfg.audio.block_size)?),
        None => Box::new(
            LoopbackCapture::open(
                cfg.audio.device.as_deref(),
                cfg.audio.sample_rate,
                cfg.audio.channels,
                cfg.audio.block_size,
            )
            .context("Could not open an audio capture device (try --list-devices)")?,
        ),
    };
    let sample_rate = source.sample_rate();
    log::info!(
        "Audio: {} Hz, {} ch, {} samples/block ({:.1} fps)",
        sample_rate,
        source.channels(),
        cfg.audio.block_size,
        sample_rate as f32 / cfg.audio.block_size as f32
    );

    let sender = FrameSender::new(&cfg.display.host, cfg.display.port, geometry.max_leds)?;
    log::info!("Frames: {} bytes per datagram to {}", sender.payload_len(), sender.target());

    let analyzer = SpectrumAnalyzer::new(AnalyzerSettings {
        bands: geometry.width,
        rows: geometry.height,
        sample_rate,
        min_freq: cfg.analysis.min_freq,
        max_freq: cfg.analysis.max_freq,
        smoothing: cfg.analysis.smoothing,
        amplitude_scale: cfg.analysis.amplitude_scale,
        band_decay: cfg.analysis.band_decay,
        peak_fall: cfg.analysis.peak_fall,
        curve: cfg.analysis.curve,
    });
    let renderer = Renderer::new(
        geometry,
        cfg.visual.brightness,
        cfg.visual.mode,
        cfg.visual.color_scheme,
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || stop.store(true, Ordering::Relaxed))
            .context("Failed to install Ctrl+C handler")?;
    }

    let mut pipeline = Pipeline::new(analyzer, renderer, sender)
        .with_stop_flag(stop)
        .with_status(true);
    if cfg.audio.delay_ms > 0 {
        match DelayedMonitor::open(
            sample_rate,
            Duration::from_millis(cfg.audio.delay_ms),
            cfg.audio.block_size,
        ) {
            Ok(monitor) => pipeline = pipeline.with_monitor(monitor),
            Err(err) => log::warn!("Delayed playback disabled: {:#}", err),
        }
    }

    // EXIT is sent when the pipeline drops, from here on.
    if cfg.display.request_stream {
        match StreamControl::new(
            &cfg.display.host,
            Duration::from_millis(cfg.display.http_timeout_ms),
        ) {
            Ok(control) => {
                control.ensure_streaming();
            }
            Err(err) => log::warn!("Skipping stream request: {:#}", err),
        }
    }

    log::info!(
        "Streaming: mode {}, scheme {}, curve {}. Keys: 1-9 mode, g/d/l/s curve, c colors, q quit",
        cfg.visual.mode.name(),
        cfg.visual.color_scheme.name(),
        cfg.analysis.curve.name()
    );

    let keyboard = KeyboardInput::open()?;
    let result = match keyboard {
        Some(mut keys) => pipeline.run(source.as_mut(), &mut keys),
        None => pipeline.run(source.as_mut(), &mut NoInput),
    };

    let stats = pipeline.stats();
    log::info!(
        "Sent {} frames ({} blocks skipped, {} stale blocks dropped, {} send failures)",
        stats.frames_sent,
        stats.blocks_skipped,
        source.dropped_blocks(),
        stats.send_failures
    );
    let reason = result?;
    log::info!("Stopped: {:?}", reason);
    Ok(())
}

/// Flags given on the command line replace config file values.
fn apply_cli(cfg: &mut Config, cli: &Cli) {
    if let Some(host) = &cli.host {
        cfg.display.host = host.clone();
    }
    if let Some(port) = cli.port {
        cfg.display.port = port;
    }
    if cli.no_stream_request {
        cfg.display.request_stream = false;
    }
    if let Some(device) = &cli.device {
        cfg.audio.device = Some(device.clone());
    }
    if let Some(rate) = cli.sample_rate {
        cfg.audio.sample_rate = rate;
    }
    if let Some(size) = cli.block_size {
        cfg.audio.block_size = size;
    }
    if let Some(delay) = cli.delay_ms {
        cfg.audio.delay_ms = delay;
    }
    if let Some(smoothing) = cli.smoothing {
        cfg.analysis.smoothing = smoothing;
    }
    if let Some(curve) = cli.curve {
        cfg.analysis.curve = curve;
    }
    if let Some(brightness) = cli.brightness {
        cfg.visual.brightness = brightness;
    }
    if let Some(mode) = cli.mode {
        cfg.visual.mode = mode;
    }
    if let Some(scheme) = cli.scheme {
        cfg.visual.color_scheme = scheme;
    }
}
