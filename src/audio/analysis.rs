use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::features::{AmplitudeCurve, SpectrumFrame, SpectrumState};

#[derive(Clone, Debug)]
pub struct AnalyzerSettings {
    /// Number of output bands (grid width).
    pub bands: usize,
    /// Rows a full-height bar spans; peaks are tracked in these units.
    pub rows: usize,
    pub sample_rate: u32,
    pub min_freq: f32,
    pub max_freq: f32,
    /// Weight of the previous frame in temporal smoothing.
    pub smoothing: f32,
    pub amplitude_scale: f32,
    /// Per-frame decay of each band's running maximum.
    pub band_decay: f32,
    /// Rows a peak marker falls per frame.
    pub peak_fall: f32,
    pub curve: AmplitudeCurve,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            bands: 32,
            rows: 32,
            sample_rate: 48000,
            min_freq: 40.0,
            max_freq: 16000.0,
            smoothing: 0.2,
            amplitude_scale: 0.8,
            band_decay: 0.995,
            peak_fall: 0.5,
            curve: AmplitudeCurve::Gamma,
        }
    }
}

/// Which FFT bins feed a band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BandBins {
    /// RMS over `start..end`.
    Range(usize, usize),
    /// No bin fell inside the band: use the one closest to its centre.
    Nearest(usize),
}

/// Per-block FFT plan, window and band layout for one block length.
struct BlockPlan {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Amplitude correction so a full-scale sine reads 1.0.
    gain: f32,
    bands: Vec<BandBins>,
}

/// Turns mono audio blocks into per-band bar heights.
pub struct SpectrumAnalyzer {
    settings: AnalyzerSettings,
    state: SpectrumState,
    planner: FftPlanner<f32>,
    plan: Option<(usize, BlockPlan)>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectrumAnalyzer {
    pub fn new(mut settings: AnalyzerSettings) -> Self {
        let nyquist = settings.sample_rate as f32 / 2.0;
        if settings.max_freq > nyquist {
            log::warn!(
                "max_freq {}Hz is above Nyquist at {}Hz, using {}Hz",
                settings.max_freq,
                settings.sample_rate,
                nyquist
            );
            settings.max_freq = nyquist;
        }
        if settings.min_freq >= settings.max_freq {
            log::warn!(
                "min_freq {}Hz is not below max_freq {}Hz, using {}Hz",
                settings.min_freq,
                settings.max_freq,
                settings.max_freq / 2.0
            );
            settings.min_freq = settings.max_freq / 2.0;
        }
        let state = SpectrumState::new(settings.bands);
        Self {
            settings,
            state,
            planner: FftPlanner::new(),
            plan: None,
            buffer: Vec::new(),
            scratch: Vec::new(),
            magnitudes: Vec::new(),
        }
    }

    pub fn state(&self) -> &SpectrumState {
        &self.state
    }

    pub fn curve(&self) -> AmplitudeCurve {
        self.settings.curve
    }

    /// Switch the amplitude curve; every other piece of state is kept.
    pub fn set_curve(&mut self, curve: AmplitudeCurve) {
        self.settings.curve = curve;
    }

    /// Analyse one mono block (samples in [-1, 1]).
    pub fn analyze(&mut self, block: &[f32]) -> SpectrumFrame {
        let mut levels = self.band_levels(block);

        let s = &self.settings;
        self.state.normalize(&mut levels, s.band_decay);
        for level in levels.iter_mut() {
            *level = (s.curve.apply(*level) * s.amplitude_scale).clamp(0.0, 1.0);
        }
        self.state.smooth(&mut levels, s.smoothing);
        self.state.update_peaks(&levels, s.rows, s.peak_fall);

        SpectrumFrame {
            heights: levels,
            peaks: self.state.peaks.clone(),
            waveform: block.to_vec(),
        }
    }

    /// Raw (un-normalized) level of every band for this block.
    fn band_levels(&mut self, block: &[f32]) -> Vec<f32> {
        let bands = self.settings.bands;
        if block.len() < 2 {
            return vec![0.0; bands];
        }

        let len = block.len();
        if self.plan.as_ref().map(|(n, _)| *n) != Some(len) {
            let plan = self.build_plan(len);
            log::debug!(
                "FFT plan for {} samples: {:.1} Hz per bin",
                len,
                self.settings.sample_rate as f32 / len as f32
            );
            self.scratch = vec![Complex::new(0.0, 0.0); plan.fft.get_inplace_scratch_len()];
            self.plan = Some((len, plan));
        }
        let Some((_, plan)) = self.plan.as_ref() else {
            return vec![0.0; bands];
        };

        self.buffer.clear();
        self.buffer.extend(
            block
                .iter()
                .zip(plan.window.iter())
                .map(|(&s, &w)| Complex::new(if s.is_finite() { s * w } else { 0.0 }, 0.0)),
        );
        plan.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let half = len / 2 + 1;
        self.magnitudes.clear();
        self.magnitudes
            .extend(self.buffer[..half].iter().map(|c| c.norm() * plan.gain));

        plan.bands
            .iter()
            .map(|bins| match *bins {
                BandBins::Range(start, end) => {
                    let slice = &self.magnitudes[start..end];
                    (slice.iter().map(|m| m * m).sum::<f32>() / slice.len() as f32).sqrt()
                }
                BandBins::Nearest(idx) => self.magnitudes[idx],
            })
            .collect()
    }

    fn build_plan(&mut self, len: usize) -> BlockPlan {
        let window = hann_window(len);
        let window_sum: f32 = window.iter().sum();
        let gain = if window_sum > 0.0 { 2.0 / window_sum } else { 0.0 };
        let bands = band_layout(
            self.settings.bands,
            len,
            self.settings.sample_rate,
            self.settings.min_freq,
            self.settings.max_freq,
        );
        BlockPlan {
            fft: self.planner.plan_fft_forward(len),
            window,
            gain,
            bands,
        }
    }
}

/// `bands + 1` logarithmically spaced edges from `min_freq` to `max_freq`.
pub fn band_edges(bands: usize, min_freq: f32, max_freq: f32) -> Vec<f32> {
    let ratio = max_freq / min_freq;
    (0..=bands)
        .map(|i| min_freq * ratio.powf(i as f32 / bands as f32))
        .collect()
}

fn band_layout(
    bands: usize,
    fft_len: usize,
    sample_rate: u32,
    min_freq: f32,
    max_freq: f32,
) -> Vec<BandBins> {
    let half = fft_len / 2 + 1;
    let bin_hz = sample_rate as f32 / fft_len as f32;
    let edges = band_edges(bands, min_freq, max_freq);

    edges
        .windows(2)
        .map(|edge| {
            let (low, high) = (edge[0], edge[1]);
            let start = (0..half).find(|&k| k as f32 * bin_hz >= low);
            let end = (0..half).find(|&k| k as f32 * bin_hz >= high).unwrap_or(half);
            match start {
                Some(start) if start < end => BandBins::Range(start, end),
                _ => {
                    let center = (low + high) / 2.0;
                    let nearest = ((center / bin_hz).round() as usize).min(half - 1);
                    BandBins::Nearest(nearest)
                }
            }
        })
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, amplitude: f32, len: usize, sample_rate: u32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude
                    * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
            })
            .collect()
    }

    fn settings_44k() -> AnalyzerSettings {
        AnalyzerSettings {
            sample_rate: 44100,
            ..AnalyzerSettings::default()
        }
    }

    fn band_containing(freq: f32, s: &AnalyzerSettings) -> usize {
        let edges = band_edges(s.bands, s.min_freq, s.max_freq);
        edges
            .windows(2)
            .position(|e| e[0] <= freq && freq < e[1])
            .unwrap()
    }

    #[test]
    fn edges_are_logarithmic() {
        let edges = band_edges(32, 40.0, 16000.0);
        assert_eq!(edges.len(), 33);
        assert!((edges[0] - 40.0).abs() < 1e-3);
        assert!((edges[32] - 16000.0).abs() < 0.5);
        let r0 = edges[1] / edges[0];
        let r1 = edges[20] / edges[19];
        assert!((r0 - r1).abs() < 1e-3);
    }

    #[test]
    fn narrow_low_bands_fall_back_to_nearest_bin() {
        let layout = band_layout(32, 1024, 44100, 40.0, 16000.0);
        assert_eq!(layout.len(), 32);
        assert!(layout[..8].iter().any(|b| matches!(b, BandBins::Nearest(_))));
        assert!(matches!(layout[31], BandBins::Range(_, _)));
        for bins in layout {
            match bins {
                BandBins::Range(start, end) => assert!(start < end && end <= 513),
                BandBins::Nearest(idx) => assert!(idx < 513),
            }
        }
    }

    #[test]
    fn max_freq_is_clamped_to_nyquist() {
        let analyzer = SpectrumAnalyzer::new(AnalyzerSettings {
            sample_rate: 16000,
            ..AnalyzerSettings::default()
        });
        assert_eq!(analyzer.settings.max_freq, 8000.0);
        assert_eq!(analyzer.settings.min_freq, 40.0);

        let s = &analyzer.settings;
        let layout = band_layout(s.bands, 2000, s.sample_rate, s.min_freq, s.max_freq);
        let top = BandBins::Nearest(2000 / 2);
        assert!(layout.iter().all(|b| *b != top));
        for band in &layout[s.bands - 3..] {
            assert!(matches!(band, BandBins::Range(_, _)), "{:?}", band);
        }
        match layout[s.bands - 1] {
            BandBins::Range(start, end) => {
                assert!(start > 800);
                assert_eq!(end, 1000);
            }
            other => panic!("top band fell back to {:?}", other),
        }
    }

    #[test]
    fn full_scale_sine_reads_near_unity() {
        let mut analyzer = SpectrumAnalyzer::new(settings_44k());
        let block = sine(44100.0 * 100.0 / 1024.0, 1.0, 1024, 44100);
        analyzer.band_levels(&block);
        let peak = analyzer.magnitudes.iter().copied().fold(0.0f32, f32::max);
        assert!((peak - 1.0).abs() < 0.01, "peak {}", peak);
    }

    #[test]
    fn tone_lands_in_its_band() {
        let s = settings_44k();
        let expected = band_containing(1000.0, &s);
        let mut analyzer = SpectrumAnalyzer::new(s);
        let frame = analyzer.analyze(&sine(1000.0, 0.8, 1024, 44100));

        let (loudest, _) = frame
            .heights
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &h)| if h > best.1 { (i, h) } else { best });
        assert_eq!(loudest, expected);
        assert_eq!(frame.heights.len(), 32);
        assert_eq!(frame.waveform.len(), 1024);
    }

    #[test]
    fn heights_stay_bounded() {
        let blocks: Vec<Vec<f32>> = vec![
            vec![0.0; 1024],
            vec![1.0; 1024],
            vec![-1.0; 1024],
            (0..1024).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect(),
            sine(60.0, 1.0, 1024, 44100),
            vec![f32::NAN; 1024],
            Vec::new(),
            vec![0.5],
        ];
        for curve in [
            AmplitudeCurve::Gamma,
            AmplitudeCurve::Db,
            AmplitudeCurve::Linear,
            AmplitudeCurve::Sqrt,
        ] {
            let mut analyzer = SpectrumAnalyzer::new(AnalyzerSettings {
                curve,
                amplitude_scale: 4.0,
                ..settings_44k()
            });
            for block in &blocks {
                let frame = analyzer.analyze(block);
                assert_eq!(frame.heights.len(), 32);
                for (h, p) in frame.heights.iter().zip(frame.peaks.iter()) {
                    assert!(h.is_finite() && (0.0..=1.0).contains(h), "{:?}: {}", curve, h);
                    assert!(p.is_finite() && *p >= 0.0 && *p <= 32.0);
                }
            }
        }
    }

    #[test]
    fn empty_block_on_fresh_state_is_silent() {
        let mut analyzer = SpectrumAnalyzer::new(settings_44k());
        let frame = analyzer.analyze(&[]);
        assert!(frame.heights.iter().all(|&h| h == 0.0));
        let frame = analyzer.analyze(&[0.0; 1024]);
        assert!(frame.heights.iter().all(|&h| h == 0.0));
    }

    #[test]
    fn silence_resensitizes_band() {
        let s = AnalyzerSettings {
            smoothing: 0.0,
            amplitude_scale: 1.0,
            curve: AmplitudeCurve::Linear,
            ..settings_44k()
        };
        let band = band_containing(1000.0, &s);
        let mut analyzer = SpectrumAnalyzer::new(s);

        analyzer.analyze(&sine(1000.0, 0.8, 1024, 44100));
        let loud_max = analyzer.state().band_max[band];
        assert!(loud_max > 0.1);

        // a faint tone barely registers against the loud history
        let faint = sine(1000.0, 0.01, 1024, 44100);
        let before = analyzer.analyze(&faint).heights[band];
        assert!(before < 0.05, "before {}", before);

        let silence = vec![0.0; 1024];
        let mut previous = analyzer.state().band_max[band];
        for _ in 0..1500 {
            analyzer.analyze(&silence);
            let now = analyzer.state().band_max[band];
            assert!(now <= previous);
            assert!(now >= crate::audio::features::NORM_FLOOR);
            previous = now;
        }
        assert!(previous < loud_max * 0.01);

        let after = analyzer.analyze(&faint).heights[band];
        assert!(after > 0.9, "after {}", after);
    }

    #[test]
    fn curve_switch_keeps_state() {
        let mut analyzer = SpectrumAnalyzer::new(settings_44k());
        analyzer.analyze(&sine(1000.0, 0.8, 1024, 44100));
        let maxima = analyzer.state().band_max.clone();
        let peaks = analyzer.state().peaks.clone();
        analyzer.set_curve(AmplitudeCurve::Db);
        assert_eq!(analyzer.curve(), AmplitudeCurve::Db);
        assert_eq!(analyzer.state().band_max, maxima);
        assert_eq!(analyzer.state().peaks, peaks);
    }
}
