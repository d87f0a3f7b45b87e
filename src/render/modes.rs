use clap::ValueEnum;
use serde::Deserialize;

use super::beat::BeatDetector;
use super::color::{ColorScheme, Rgb};
use super::frame::PixelFrame;
use super::mapper::Geometry;
use super::spectrogram::SpectrogramHistory;
use crate::audio::features::SpectrumFrame;

/// Height at which the mirrored peak marker is drawn, as a fraction of the
/// peak row. The marker only shows on the exact integer row, so it can skip
/// frames while the peak falls.
const MIRROR_PEAK_SCALE: f32 = 0.5;
const WAVE_FREQUENCY: f32 = 0.3;
const SPECTROGRAM_THRESHOLD: f32 = 0.05;
const BEAT_FLASH_VISIBLE: f32 = 0.1;
const BEAT_IDLE_HEIGHT: f32 = 0.3;
const BEAT_IDLE_INTENSITY: f32 = 0.2;
const MIRRORED_BANDS: usize = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Bars,
    Mirror,
    Wave,
    Waveform,
    Radial,
    Beat,
    Spectrogram,
    Vu,
    Bars16,
}

impl Mode {
    pub const ALL: [Mode; 9] = [
        Mode::Bars,
        Mode::Mirror,
        Mode::Wave,
        Mode::Waveform,
        Mode::Radial,
        Mode::Beat,
        Mode::Spectrogram,
        Mode::Vu,
        Mode::Bars16,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Mode::Bars => "bars",
            Mode::Mirror => "mirror",
            Mode::Wave => "wave",
            Mode::Waveform => "waveform",
            Mode::Radial => "radial",
            Mode::Beat => "beat",
            Mode::Spectrogram => "spectrogram",
            Mode::Vu => "vu",
            Mode::Bars16 => "bars16",
        }
    }

    /// Digit key `1`..`9` selects the mode in [`Mode::ALL`] order.
    pub fn from_digit(key: char) -> Option<Mode> {
        let n = key.to_digit(10)? as usize;
        n.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }
}

/// Everything a mode needs besides its own state.
struct Canvas<'a> {
    geometry: &'a Geometry,
    scheme: ColorScheme,
    brightness: f32,
    frame: &'a mut PixelFrame,
}

impl Canvas<'_> {
    fn paint(&mut self, x: usize, y: usize, value: f32, intensity: f32) {
        let color = self.scheme.color(value, intensity).scale(self.brightness);
        self.frame.set_xy(self.geometry, x, y, color);
    }

    fn paint_peak(&mut self, x: usize, y: usize) {
        let color = Rgb::WHITE.scale(self.brightness);
        self.frame.set_xy(self.geometry, x, y, color);
    }
}

/// Owns the active mode, the color scheme and each mode's private buffers.
///
/// Mode buffers are created the first time their mode renders and are left
/// as they are when switching away.
pub struct Renderer {
    geometry: Geometry,
    brightness: f32,
    mode: Mode,
    scheme: ColorScheme,
    frame: PixelFrame,
    beat: Option<BeatDetector>,
    spectrogram: Option<SpectrogramHistory>,
}

impl Renderer {
    pub fn new(geometry: Geometry, brightness: f32, mode: Mode, scheme: ColorScheme) -> Self {
        Self {
            geometry,
            brightness: brightness.clamp(0.0, 1.0),
            mode,
            scheme,
            frame: PixelFrame::new(geometry.max_leds),
            beat: None,
            spectrogram: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn scheme(&self) -> ColorScheme {
        self.scheme
    }

    pub fn cycle_scheme(&mut self) -> ColorScheme {
        self.scheme = self.scheme.next();
        self.scheme
    }

    pub fn frame(&self) -> &PixelFrame {
        &self.frame
    }

    /// Draw one spectrum frame with the active mode and return the pixel buffer.
    pub fn render(&mut self, spectrum: &SpectrumFrame) -> &PixelFrame {
        self.frame.clear();
        let mut canvas = Canvas {
            geometry: &self.geometry,
            scheme: self.scheme,
            brightness: self.brightness,
            frame: &mut self.frame,
        };

        match self.mode {
            Mode::Bars => bars(&mut canvas, spectrum),
            Mode::Mirror => mirror(&mut canvas, spectrum),
            Mode::Wave => wave(&mut canvas, spectrum),
            Mode::Waveform => waveform(&mut canvas, spectrum),
            Mode::Radial => radial(&mut canvas, spectrum),
            Mode::Beat => {
                let beat = self.beat.get_or_insert_with(BeatDetector::new);
                beat_flash(&mut canvas, spectrum, beat)
            }
            Mode::Spectrogram => {
                let (rows, columns) = (self.geometry.height, self.geometry.width);
                let history = self
                    .spectrogram
                    .get_or_insert_with(|| SpectrogramHistory::new(rows, columns));
                spectrogram(&mut canvas, spectrum, history)
            }
            Mode::Vu => vu(&mut canvas, spectrum),
            Mode::Bars16 => bars16(&mut canvas, spectrum),
        }

        &self.frame
    }
}

fn height_at(spectrum: &SpectrumFrame, band: usize) -> f32 {
    spectrum.heights.get(band).copied().unwrap_or(0.0)
}

fn peak_at(spectrum: &SpectrumFrame, band: usize) -> f32 {
    spectrum.peaks.get(band).copied().unwrap_or(0.0)
}

/// Bottom-up bar for one column with a white peak dot; `color` picks the
/// (value, intensity) of a lit row from its distance above the floor.
fn bar_column(
    canvas: &mut Canvas,
    x: usize,
    height: f32,
    peak: f32,
    color: impl Fn(usize) -> (f32, f32),
) {
    let rows = canvas.geometry.height;
    let lit = (height * rows as f32) as usize;
    let peak_row = peak as usize;

    for y in 0..rows {
        let bar_y = rows - 1 - y;
        if bar_y < lit {
            let (value, intensity) = color(bar_y);
            canvas.paint(x, y, value, intensity);
        } else if bar_y == peak_row && peak_row > 0 {
            canvas.paint_peak(x, y);
        }
    }
}

fn bars(canvas: &mut Canvas, spectrum: &SpectrumFrame) {
    let (width, rows) = (canvas.geometry.width, canvas.geometry.height as f32);
    for x in 0..width {
        let value = x as f32 / width as f32;
        bar_column(canvas, x, height_at(spectrum, x), peak_at(spectrum, x), |bar_y| {
            (value, 0.5 + 0.5 * (bar_y as f32 / rows))
        });
    }
}

fn vu(canvas: &mut Canvas, spectrum: &SpectrumFrame) {
    let (width, rows) = (canvas.geometry.width, canvas.geometry.height as f32);
    for x in 0..width {
        bar_column(canvas, x, height_at(spectrum, x), peak_at(spectrum, x), |bar_y| {
            (bar_y as f32 / rows, 1.0)
        });
    }
}

fn bars16(canvas: &mut Canvas, spectrum: &SpectrumFrame) {
    let (width, rows) = (canvas.geometry.width, canvas.geometry.height as f32);
    let half = width / 2;
    let bands = MIRRORED_BANDS.min(width).max(1);

    for x in 0..width {
        // lowest band in the middle, mirrored out to both edges
        let band = (if x < half { half - 1 - x } else { x - half }).min(bands - 1);
        let value = band as f32 / MIRRORED_BANDS as f32;
        bar_column(canvas, x, height_at(spectrum, band), peak_at(spectrum, band), |bar_y| {
            (value, 0.5 + 0.5 * (bar_y as f32 / rows))
        });
    }
}

fn mirror(canvas: &mut Canvas, spectrum: &SpectrumFrame) {
    let (width, rows) = (canvas.geometry.width, canvas.geometry.height);
    let center = rows / 2;
    if center == 0 {
        return;
    }

    for x in 0..width {
        let value = x as f32 / width as f32;
        let half_height = (height_at(spectrum, x) * center as f32) as usize;
        let peak = peak_at(spectrum, x);
        let peak_dist = (peak * MIRROR_PEAK_SCALE) as usize;

        for y in 0..rows {
            let dist = y.abs_diff(center);
            if dist < half_height {
                let intensity = 0.3 + 0.7 * (1.0 - dist as f32 / center as f32);
                canvas.paint(x, y, value, intensity);
            } else if dist == peak_dist && peak as usize > 0 {
                canvas.paint_peak(x, y);
            }
        }
    }
}

fn wave(canvas: &mut Canvas, spectrum: &SpectrumFrame) {
    let (width, rows) = (canvas.geometry.width, canvas.geometry.height);
    let center = (rows / 2) as f32;

    for x in 0..width {
        // 3-point moving average, zero padded at the edges
        let left = x.checked_sub(1).map_or(0.0, |i| height_at(spectrum, i));
        let right = if x + 1 < width { height_at(spectrum, x + 1) } else { 0.0 };
        let smooth = (left + height_at(spectrum, x) + right) / 3.0;

        let amplitude = smooth * (rows / 2) as f32;
        let wave_y = (center + amplitude * (x as f32 * WAVE_FREQUENCY).sin()) as i64;
        let wave_y = wave_y.clamp(0, rows as i64 - 1) as usize;
        let value = x as f32 / width as f32;

        for y in 0..rows {
            let dist = y.abs_diff(wave_y);
            if dist <= 2 {
                canvas.paint(x, y, value, 1.0 - dist as f32 * 0.35);
            }
        }
    }
}

fn waveform(canvas: &mut Canvas, spectrum: &SpectrumFrame) {
    let (width, rows) = (canvas.geometry.width, canvas.geometry.height);
    let samples = &spectrum.waveform;
    if samples.is_empty() {
        return;
    }
    let step = (samples.len() / width).max(1);

    for x in 0..width {
        let sample = samples.get(x * step).copied().unwrap_or(0.0);
        let sample = if sample.is_finite() { sample.clamp(-1.0, 1.0) } else { 0.0 };
        let y_pos = ((sample + 1.0) * (rows - 1) as f32 / 2.0) as usize;
        let y_pos = y_pos.min(rows - 1);
        let value = x as f32 / width as f32;

        for y in 0..rows {
            let dist = y.abs_diff(y_pos);
            if dist <= 1 {
                canvas.paint(x, y, value, 1.0 - dist as f32 * 0.5);
            }
        }
    }
}

fn radial(canvas: &mut Canvas, spectrum: &SpectrumFrame) {
    let (width, rows) = (canvas.geometry.width, canvas.geometry.height);
    let (cx, cy) = ((width / 2) as f32, (rows / 2) as f32);
    let max_radius = cx.min(cy);
    if max_radius <= 0.0 {
        return;
    }

    for x in 0..width {
        for y in 0..rows {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let distance = (dx * dx + dy * dy).sqrt();
            let angle = dy.atan2(dx);

            let turn = (angle + std::f32::consts::PI) / std::f32::consts::TAU;
            let band = ((turn * width as f32) as usize) % width;
            let bar_length = height_at(spectrum, band) * max_radius;

            if distance <= bar_length && distance > 1.0 {
                let intensity = 0.5 + 0.5 * (1.0 - distance / max_radius);
                canvas.paint(x, y, band as f32 / width as f32, intensity);
            }
        }
    }
}

fn beat_flash(canvas: &mut Canvas, spectrum: &SpectrumFrame, beat: &mut BeatDetector) {
    beat.update(&spectrum.heights);
    let (width, rows) = (canvas.geometry.width, canvas.geometry.height);
    let value = beat.hue_offset() / 360.0;
    let flash = beat.flash();

    if flash > BEAT_FLASH_VISIBLE {
        let (cx, cy) = ((width / 2) as f32, (rows / 2) as f32);
        let reach = ((width / 2) as f32).max(1.0);
        for x in 0..width {
            for y in 0..rows {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let dist = (dx * dx + dy * dy).sqrt() / reach;
                canvas.paint(x, y, value, flash * (1.0 - dist * 0.5));
            }
        }
    } else {
        for x in 0..width {
            let lit = (height_at(spectrum, x) * rows as f32 * BEAT_IDLE_HEIGHT) as usize;
            for y in 0..rows {
                if rows - 1 - y < lit {
                    canvas.paint(x, y, value, BEAT_IDLE_INTENSITY);
                }
            }
        }
    }
}

fn spectrogram(canvas: &mut Canvas, spectrum: &SpectrumFrame, history: &mut SpectrogramHistory) {
    history.push(&spectrum.heights);
    let (width, rows) = (canvas.geometry.width, canvas.geometry.height);

    for x in 0..width {
        let value = x as f32 / width as f32;
        for y in 0..rows {
            let intensity = history.get(x, y);
            if intensity > SPECTROGRAM_THRESHOLD {
                canvas.paint(x, y, value, intensity);
            }
        }
    }
}
