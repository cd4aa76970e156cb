use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Frequency weighting applied to band levels, after IEC 61672.
///
/// A, B and C approximate the ear's loudness sensitivity at different levels;
/// Z is flat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, ValueEnum, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeightingCurve {
    #[default]
    A,
    B,
    C,
    Z,
}

const F1_SQ: f64 = 20.6 * 20.6;
const F2_SQ: f64 = 107.7 * 107.7;
const F3_SQ: f64 = 737.9 * 737.9;
const F4_SQ: f64 = 12194.0 * 12194.0;
const FB_SQ: f64 = 158.5 * 158.5;

impl WeightingCurve {
    /// dB offset to add to a level measured at `hz`.
    pub fn offset_db(self, hz: f64) -> f64 {
        let f2 = hz * hz;
        match self {
            WeightingCurve::A => {
                let r = F4_SQ * f2 * f2
                    / ((f2 + F1_SQ) * ((f2 + F2_SQ) * (f2 + F3_SQ)).sqrt() * (f2 + F4_SQ));
                20.0 * r.log10() + 2.00
            }
            WeightingCurve::B => {
                let r = F4_SQ * f2 * hz / ((f2 + F1_SQ) * (f2 + FB_SQ).sqrt() * (f2 + F4_SQ));
                20.0 * r.log10() + 0.17
            }
            WeightingCurve::C => {
                let r = F4_SQ * f2 / ((f2 + F1_SQ) * (f2 + F4_SQ));
                20.0 * r.log10() + 0.06
            }
            WeightingCurve::Z => 0.0,
        }
    }

    pub fn all() -> &'static [WeightingCurve] {
        &[
            WeightingCurve::A,
            WeightingCurve::B,
            WeightingCurve::C,
            WeightingCurve::Z,
        ]
    }

    pub fn next(&self) -> Self {
        let all = Self::all();
        let current = all.iter().position(|c| c == self).unwrap_or(0);
        all[(current + 1) % all.len()]
    }
}

impl fmt::Display for WeightingCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WeightingCurve::A => "A",
            WeightingCurve::B => "B",
            WeightingCurve::C => "C",
            WeightingCurve::Z => "Z",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for WeightingCurve {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "Z" | "NONE" => Ok(Self::Z),
            _ => Err(format!("Unknown weighting curve: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z_weighting_is_flat() {
        for hz in [0.0, 1.0, 20.0, 1000.0, 12_345.6, 96_000.0, -5.0] {
            assert_eq!(WeightingCurve::Z.offset_db(hz), 0.0);
        }
    }

    #[test]
    fn weighted_curves_are_finite_for_positive_frequencies() {
        let mut hz = 0.5;
        while hz < 100_000.0 {
            for curve in [WeightingCurve::A, WeightingCurve::B, WeightingCurve::C] {
                let db = curve.offset_db(hz);
                assert!(db.is_finite(), "{} at {} Hz gave {}", curve, hz, db);
            }
            hz *= 1.3;
        }
    }

    #[test]
    fn curves_are_normalized_near_one_kilohertz() {
        for curve in [WeightingCurve::A, WeightingCurve::B, WeightingCurve::C] {
            let db = curve.offset_db(1000.0);
            assert!(db.abs() < 0.1, "{} at 1 kHz gave {}", curve, db);
        }
    }

    #[test]
    fn a_weighting_attenuates_low_frequencies() {
        // Tabulated value at 100 Hz is -19.1 dB.
        let db = WeightingCurve::A.offset_db(100.0);
        assert!((db + 19.1).abs() < 0.2, "got {}", db);
        assert!(WeightingCurve::A.offset_db(50.0) < WeightingCurve::C.offset_db(50.0));
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("a".parse::<WeightingCurve>(), Ok(WeightingCurve::A));
        assert_eq!(" C ".parse::<WeightingCurve>(), Ok(WeightingCurve::C));
        assert_eq!("none".parse::<WeightingCurve>(), Ok(WeightingCurve::Z));
        assert!("K".parse::<WeightingCurve>().is_err());
    }

    #[test]
    fn next_cycles_through_all_curves() {
        let mut curve = WeightingCurve::A;
        for _ in 0..WeightingCurve::all().len() {
            curve = curve.next();
        }
        assert_eq!(curve, WeightingCurve::A);
    }
}
