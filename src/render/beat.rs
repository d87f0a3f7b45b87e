use std::collections::VecDeque;

const BASS_BANDS: usize = 5;
const HISTORY_LEN: usize = 30;
const TRIGGER_RATIO: f32 = 1.3;
const TRIGGER_FLOOR: f32 = 0.15;
const FLASH_DECAY: f32 = 0.85;
const HUE_STEP: f32 = 30.0;

/// Bass-energy beat tracker driving the flash mode.
#[derive(Debug, Default)]
pub struct BeatDetector {
    history: VecDeque<f32>,
    flash: f32,
    hue_offset: f32,
}

impl BeatDetector {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
            ..Self::default()
        }
    }

    /// Flash intensity in [0, 1] after this frame's update.
    ///
    /// Decay is applied in the same update that triggers a beat, so the
    /// frame a beat lands on already reads `FLASH_DECAY` (0.85), not 1.0.
    pub fn flash(&self) -> f32 {
        self.flash
    }

    /// Hue offset in degrees, advanced on every beat.
    pub fn hue_offset(&self) -> f32 {
        self.hue_offset
    }

    /// Feed one frame of band heights. Returns true when a beat fired.
    pub fn update(&mut self, heights: &[f32]) -> bool {
        let bass_bands = &heights[..heights.len().min(BASS_BANDS)];
        let bass = if bass_bands.is_empty() {
            0.0
        } else {
            bass_bands.iter().sum::<f32>() / bass_bands.len() as f32
        };

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(bass);
        let average = self.history.iter().sum::<f32>() / self.history.len() as f32;

        let beat = bass > average * TRIGGER_RATIO && bass > TRIGGER_FLOOR;
        if beat {
            self.flash = 1.0;
            self.hue_offset = (self.hue_offset + HUE_STEP) % 360.0;
        }
        self.flash *= FLASH_DECAY;
        beat
    }
}
