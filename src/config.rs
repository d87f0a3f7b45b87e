use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::features::AmplitudeCurve;
use crate::render::color::ColorScheme;
use crate::render::mapper::Geometry;
use crate::render::modes::Mode;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub visual: VisualConfig,
}

#[derive(Debug, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub request_stream: bool,
}

#[derive(Debug, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_side")]
    pub width: usize,
    #[serde(default = "default_grid_side")]
    pub height: usize,
    #[serde(default = "default_panel_width")]
    pub panel_width: usize,
    #[serde(default = "default_panel_height")]
    pub panel_height: usize,
    #[serde(default = "default_panels_wide")]
    pub panels_wide: usize,
    #[serde(default)]
    pub max_leds: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Capture device name (substring) or "default"; unset picks a monitor.
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "default_channels")]
    pub channels: u16,
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_min_freq")]
    pub min_freq: f32,
    #[serde(default = "default_max_freq")]
    pub max_freq: f32,
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    #[serde(default = "default_amplitude_scale")]
    pub amplitude_scale: f32,
    #[serde(default = "default_band_decay")]
    pub band_decay: f32,
    #[serde(default = "default_peak_fall")]
    pub peak_fall: f32,
    #[serde(default)]
    pub curve: AmplitudeCurve,
}

#[derive(Debug, Deserialize)]
pub struct VisualConfig {
    #[serde(default = "default_brightness")]
    pub brightness: f32,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub color_scheme: ColorScheme,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            http_timeout_ms: default_http_timeout_ms(),
            request_stream: true,
        }
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: default_grid_side(),
            height: default_grid_side(),
            panel_width: default_panel_width(),
            panel_height: default_panel_height(),
            panels_wide: default_panels_wide(),
            max_leds: None,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
            channels: default_channels(),
            delay_ms: 0,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_freq: default_min_freq(),
            max_freq: default_max_freq(),
            smoothing: default_smoothing(),
            amplitude_scale: default_amplitude_scale(),
            band_decay: default_band_decay(),
            peak_fall: default_peak_fall(),
            curve: AmplitudeCurve::default(),
        }
    }
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            brightness: default_brightness(),
            mode: Mode::default(),
            color_scheme: ColorScheme::default(),
        }
    }
}

fn default_host() -> String { "192.168.4.1".into() }
fn default_port() -> u16 { 4210 }
fn default_http_timeout_ms() -> u64 { 2000 }
fn default_true() -> bool { true }
fn default_grid_side() -> usize { 32 }
fn default_panel_width() -> usize { 32 }
fn default_panel_height() -> usize { 8 }
fn default_panels_wide() -> usize { 1 }
fn default_sample_rate() -> u32 { 48000 }
fn default_block_size() -> usize { 2000 }
fn default_channels() -> u16 { 2 }
fn default_min_freq() -> f32 { 40.0 }
fn default_max_freq() -> f32 { 16000.0 }
fn default_smoothing() -> f32 { 0.2 }
fn default_amplitude_scale() -> f32 { 0.8 }
fn default_band_decay() -> f32 { 0.995 }
fn default_peak_fall() -> f32 { 0.5 }
fn default_brightness() -> f32 { 0.3 }

impl Config {
    pub fn geometry(&self) -> Result<Geometry> {
        let g = &self.grid;
        Geometry::new(
            g.width,
            g.height,
            g.panel_width,
            g.panel_height,
            g.panels_wide,
            g.max_leds,
        )
        .context("Invalid [grid] configuration")
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        if !(0.0..=1.0).contains(&self.visual.brightness) {
            bail!("visual.brightness must be within 0.0-1.0, got {}", self.visual.brightness);
        }
        if !(0.0..1.0).contains(&a.smoothing) {
            bail!("analysis.smoothing must be within [0.0, 1.0), got {}", a.smoothing);
        }
        if !(a.min_freq > 0.0 && a.min_freq < a.max_freq) {
            bail!(
                "analysis frequency range {}-{} Hz is empty",
                a.min_freq,
                a.max_freq
            );
        }
        if !(a.band_decay > 0.0 && a.band_decay <= 1.0) {
            bail!("analysis.band_decay must be within (0.0, 1.0], got {}", a.band_decay);
        }
        if a.amplitude_scale < 0.0 || a.peak_fall < 0.0 {
            bail!("analysis.amplitude_scale and analysis.peak_fall must not be negative");
        }
        if self.audio.block_size == 0 || self.audio.sample_rate == 0 || self.audio.channels == 0 {
            bail!("audio.block_size, audio.sample_rate and audio.channels must be non-zero");
        }
        self.geometry()?;
        Ok(())
    }
}

/// Explicit path first, then `./ledviz.toml`, then `<config dir>/ledviz/config.toml`.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("ledviz.toml");
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("ledviz").join("config.toml"))
        .filter(|path| path.exists())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse config {}", path.display()))
}

pub fn parse_config(content: &str) -> Result<Config> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_canonical_tuning() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.display.port, 4210);
        assert_eq!(cfg.audio.sample_rate, 48000);
        assert_eq!(cfg.audio.block_size, 2000);
        assert_eq!(cfg.analysis.smoothing, 0.2);
        assert_eq!(cfg.analysis.curve, AmplitudeCurve::Gamma);
        assert_eq!(cfg.visual.mode, Mode::Bars);
        assert_eq!(cfg.geometry().unwrap().max_leds, 1024);
        cfg.validate().unwrap();
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = parse_config(
            r#"
            [display]
            host = "10.0.0.5"
            request_stream = false

            [grid]
            width = 64
            height = 24
            panels_wide = 2
            max_leds = 1500

            [analysis]
            curve = "sqrt"

            [visual]
            mode = "bars16"
            color_scheme = "vaporwave"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.display.host, "10.0.0.5");
        assert!(!cfg.display.request_stream);
        assert_eq!(cfg.display.port, 4210);
        assert_eq!(cfg.analysis.curve, AmplitudeCurve::Sqrt);
        assert_eq!(cfg.visual.mode, Mode::Bars16);
        assert_eq!(cfg.visual.color_scheme, ColorScheme::Vaporwave);
        let g = cfg.geometry().unwrap();
        assert_eq!((g.width, g.height, g.max_leds), (64, 24, 1500));
    }

    #[test]
    fn rejects_out_of_range_values() {
        for bad in [
            "[visual]\nbrightness = 1.5",
            "[analysis]\nsmoothing = 1.0",
            "[analysis]\nmin_freq = 5000.0\nmax_freq = 100.0",
            "[analysis]\nband_decay = 0.0",
            "[audio]\nblock_size = 0",
            "[grid]\nwidth = 64",
        ] {
            let cfg = parse_config(bad).unwrap();
            assert!(cfg.validate().is_err(), "accepted: {}", bad);
        }
    }

    #[test]
    fn rejects_unknown_keys_and_bad_names() {
        assert!(parse_config("[visual]\nmode = \"plasma\"").is_err());
        assert!(parse_config("[bogus]\nx = 1").is_err());
    }
}
