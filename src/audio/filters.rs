use std::{fmt, str::FromStr};
use tracing::debug;

use crate::error::MusicError;

/// Slowest playback rate accepted by the timescale filter.
pub const MIN_RATE: f64 = 0.5;
/// Fastest playback rate accepted by the timescale filter.
pub const MAX_RATE: f64 = 2.0;
pub const DEFAULT_RATE: f64 = 1.0;

/// One equalizer band: Lavalink band index (0-14) and gain (-0.25..1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBand {
    pub band: u8,
    pub gain: f64,
}

const fn band(band: u8, gain: f64) -> EqBand {
    EqBand { band, gain }
}

const LIGHT: &[EqBand] = &[band(0, 0.15), band(1, 0.10), band(2, 0.05)];
const MEDIUM: &[EqBand] = &[band(0, 0.25), band(1, 0.20), band(2, 0.15), band(3, 0.10)];
const HARD: &[EqBand] = &[
    band(0, 0.35),
    band(1, 0.30),
    band(2, 0.25),
    band(3, 0.20),
    band(4, 0.10),
];
const EXTREME: &[EqBand] = &[
    band(0, 0.50),
    band(1, 0.45),
    band(2, 0.40),
    band(3, 0.30),
    band(4, 0.20),
    band(5, 0.10),
];

/// Bass boost presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqPreset {
    Off,
    Light,
    Medium,
    Hard,
    Extreme,
}

impl EqPreset {
    pub const ALL: [EqPreset; 5] = [
        EqPreset::Off,
        EqPreset::Light,
        EqPreset::Medium,
        EqPreset::Hard,
        EqPreset::Extreme,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EqPreset::Off => "off",
            EqPreset::Light => "light",
            EqPreset::Medium => "medium",
            EqPreset::Hard => "hard",
            EqPreset::Extreme => "extreme",
        }
    }

    pub fn bands(self) -> &'static [EqBand] {
        match self {
            EqPreset::Off => &[],
            EqPreset::Light => LIGHT,
            EqPreset::Medium => MEDIUM,
            EqPreset::Hard => HARD,
            EqPreset::Extreme => EXTREME,
        }
    }
}

impl FromStr for EqPreset {
    type Err = MusicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        EqPreset::ALL
            .into_iter()
            .find(|preset| preset.name() == wanted)
            .ok_or_else(|| MusicError::InvalidPreset(s.to_string()))
    }
}

impl fmt::Display for EqPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Filters currently applied to a session's stream.
///
/// Always replaced as a whole: a new preset resets the rate and a new rate
/// drops the equalizer, matching how the node receives the full filter set
/// on every update.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterState {
    pub equalizer: Vec<EqBand>,
    pub rate: f64,
}

impl FilterState {
    pub fn equalizer(preset: EqPreset) -> Self {
        debug!("🎛️ Preset de ecualizador: {}", preset);
        Self {
            equalizer: preset.bands().to_vec(),
            rate: DEFAULT_RATE,
        }
    }

    /// Timescale-only filter; `rate` is clamped to `[0.5, 2.0]`.
    pub fn playback_rate(rate: f64) -> Self {
        Self {
            equalizer: Vec::new(),
            rate: clamp_rate(rate),
        }
    }

    /// True when nothing would alter the stream.
    pub fn is_neutral(&self) -> bool {
        self.equalizer.is_empty() && self.rate == DEFAULT_RATE
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            equalizer: Vec::new(),
            rate: DEFAULT_RATE,
        }
    }
}

pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_nan() {
        DEFAULT_RATE
    } else {
        rate.clamp(MIN_RATE, MAX_RATE)
    }
}
