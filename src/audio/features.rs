use clap::ValueEnum;
use serde::Deserialize;

/// Below this a band maximum is treated as silence and not divided by.
pub const NORM_FLOOR: f32 = 0.001;

/// Amplitude curve applied to normalized band levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AmplitudeCurve {
    #[default]
    Gamma,
    Db,
    Linear,
    Sqrt,
}

impl AmplitudeCurve {
    const GAMMA: f32 = 0.7;
    const DB_RANGE: f32 = 60.0;

    pub fn name(self) -> &'static str {
        match self {
            AmplitudeCurve::Gamma => "gamma",
            AmplitudeCurve::Db => "dB",
            AmplitudeCurve::Linear => "linear",
            AmplitudeCurve::Sqrt => "sqrt",
        }
    }

    pub fn apply(self, x: f32) -> f32 {
        let x = x.max(0.0);
        match self {
            AmplitudeCurve::Gamma => x.powf(Self::GAMMA),
            AmplitudeCurve::Db => {
                let db = 20.0 * x.max(1e-6).log10();
                ((db + Self::DB_RANGE) / Self::DB_RANGE).clamp(0.0, 1.0)
            }
            AmplitudeCurve::Linear => x,
            AmplitudeCurve::Sqrt => x.sqrt(),
        }
    }
}

/// Per-band state carried from one frame to the next. Owned by the analyzer.
#[derive(Clone, Debug)]
pub struct SpectrumState {
    /// Last frame's smoothed heights.
    pub prev_heights: Vec<f32>,
    /// Slow-decaying running maximum per band.
    pub band_max: Vec<f32>,
    /// Peak-hold marker per band, in LED rows.
    pub peaks: Vec<f32>,
}

impl SpectrumState {
    pub fn new(bands: usize) -> Self {
        Self {
            prev_heights: vec![0.0; bands],
            // seeded at full scale
            band_max: vec![1.0; bands],
            peaks: vec![0.0; bands],
        }
    }

    /// Divide each level by its band's decaying maximum.
    pub fn normalize(&mut self, levels: &mut [f32], decay: f32) {
        for (level, max) in levels.iter_mut().zip(self.band_max.iter_mut()) {
            let raw = if level.is_finite() { level.max(0.0) } else { 0.0 };
            *max = (*max * decay).max(raw).max(NORM_FLOOR);
            *level = if *max > NORM_FLOOR { raw / *max } else { raw };
            *level = level.clamp(0.0, 1.0);
        }
    }

    /// Exponential smoothing against the previous frame: `alpha` weights the past.
    pub fn smooth(&mut self, levels: &mut [f32], alpha: f32) {
        for (level, prev) in levels.iter_mut().zip(self.prev_heights.iter_mut()) {
            *level = alpha * *prev + (1.0 - alpha) * *level;
            *prev = *level;
        }
    }

    /// Peaks jump to the bar height (in whole rows) and otherwise fall by `fall` per frame.
    pub fn update_peaks(&mut self, levels: &[f32], rows: usize, fall: f32) {
        for (level, peak) in levels.iter().zip(self.peaks.iter_mut()) {
            let bar = (level * rows as f32).floor();
            if bar > *peak {
                *peak = bar;
            } else {
                *peak = (*peak - fall).max(0.0);
            }
        }
    }
}

/// One analysed audio block, handed to the renderer by value.
#[derive(Clone, Debug, Default)]
pub struct SpectrumFrame {
    /// Band heights in [0, 1], one per grid column.
    pub heights: Vec<f32>,
    /// Peak-hold rows, one per band.
    pub peaks: Vec<f32>,
    /// The mono block the heights were computed from.
    pub waveform: Vec<f32>,
}
