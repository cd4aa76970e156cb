use palette::{Hsl, IntoColor, Srgb};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    #[default]
    Spectrum,
    Fire,
    Ocean,
    Monochrome,
}

impl FromStr for ColorScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spectrum" => Ok(Self::Spectrum),
            "fire" => Ok(Self::Fire),
            "ocean" => Ok(Self::Ocean),
            "mono" | "monochrome" => Ok(Self::Monochrome),
            _ => Err(format!("Unknown color scheme: {}", s)),
        }
    }
}

impl ColorScheme {
    /// Color for a bar at `position` (0 = lowest band, 1 = highest) and
    /// `intensity` (0 = bottom row, 1 = full height).
    pub fn get_color(&self, position: f32, intensity: f32) -> (u8, u8, u8) {
        let intensity = intensity.clamp(0.0, 1.0);
        let (h, s, l) = match self {
            ColorScheme::Spectrum => {
                // Low bands violet, high bands red
                let hue = 270.0 - (position * 270.0);
                (hue, 0.9, 0.4 + intensity * 0.3)
            }
            ColorScheme::Fire => {
                // Hotter towards the top of each bar
                let hue = intensity * 60.0;
                (hue, 0.95, 0.3 + intensity * 0.4)
            }
            ColorScheme::Ocean => {
                let hue = 180.0 + position * 60.0;
                (hue, 0.8, 0.3 + intensity * 0.35)
            }
            ColorScheme::Monochrome => (0.0, 0.0, 0.3 + intensity * 0.6),
        };

        let hsl = Hsl::new(h, s, l);
        let rgb: Srgb = hsl.into_color();

        (
            (rgb.red * 255.0) as u8,
            (rgb.green * 255.0) as u8,
            (rgb.blue * 255.0) as u8,
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColorScheme::Spectrum => "spectrum",
            ColorScheme::Fire => "fire",
            ColorScheme::Ocean => "ocean",
            ColorScheme::Monochrome => "monochrome",
        }
    }

    pub fn all() -> &'static [ColorScheme] {
        &[
            ColorScheme::Spectrum,
            ColorScheme::Fire,
            ColorScheme::Ocean,
            ColorScheme::Monochrome,
        ]
    }

    pub fn next(&self) -> Self {
        let all = Self::all();
        let current = all.iter().position(|c| c == self).unwrap_or(0);
        all[(current + 1) % all.len()]
    }
}
