use clap::ValueEnum;
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Dim by a global brightness factor (truncating, like the panel expects).
    pub fn scale(self, factor: f32) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        let dim = |c: u8| (c as f32 * factor) as u8;
        Self {
            r: dim(self.r),
            g: dim(self.g),
            b: dim(self.b),
        }
    }
}

/// Sector-based HSV to RGB. `h` in degrees (wrapped), `s` and `v` in [0, 1].
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb {
    let s = if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 };
    let v = if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
    let to_byte = |c: f32| (c * 255.0).round() as u8;

    if s == 0.0 {
        let c = to_byte(v);
        return Rgb::new(c, c, c);
    }

    let h = if h.is_finite() { h.rem_euclid(360.0) } else { 0.0 } / 60.0;
    let sector = (h.floor() as u32).min(5);
    let f = h - sector as f32;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Rgb::new(to_byte(r), to_byte(g), to_byte(b))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Rainbow,
    Fire,
    Ocean,
    Matrix,
    Vaporwave,
    Xmas,
}

impl ColorScheme {
    pub const ALL: [ColorScheme; 6] = [
        ColorScheme::Rainbow,
        ColorScheme::Fire,
        ColorScheme::Ocean,
        ColorScheme::Matrix,
        ColorScheme::Vaporwave,
        ColorScheme::Xmas,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ColorScheme::Rainbow => "rainbow",
            ColorScheme::Fire => "fire",
            ColorScheme::Ocean => "ocean",
            ColorScheme::Matrix => "matrix",
            ColorScheme::Vaporwave => "vaporwave",
            ColorScheme::Xmas => "xmas",
        }
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|&s| s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Color for a normalized position `value` in [0, 1] at brightness `intensity`.
    pub fn color(self, value: f32, intensity: f32) -> Rgb {
        // saturation falls off above `knee` for a white-hot top end
        let desaturate = |knee: f32, slope: f32| 1.0 - (value - knee).max(0.0) * slope;

        match self {
            ColorScheme::Rainbow => hsv_to_rgb(value * 300.0, 1.0, intensity),
            ColorScheme::Fire => hsv_to_rgb(value * 60.0, desaturate(0.8, 5.0), intensity),
            ColorScheme::Ocean => {
                hsv_to_rgb(240.0 - value * 60.0, desaturate(0.8, 5.0), intensity)
            }
            ColorScheme::Matrix => hsv_to_rgb(
                120.0,
                desaturate(0.7, 3.3),
                intensity * (0.3 + 0.7 * value),
            ),
            ColorScheme::Vaporwave => {
                let hue = if value < 0.5 {
                    270.0 + value * 2.0 * 60.0
                } else {
                    330.0 + (value - 0.5) * 2.0 * 210.0
                };
                hsv_to_rgb(hue, 1.0, intensity)
            }
            ColorScheme::Xmas => {
                let hue = if (value * 10.0).rem_euclid(2.0) < 1.0 { 0.0 } else { 120.0 };
                hsv_to_rgb(hue, 1.0, intensity)
            }
        }
    }
}
