//! Per-channel volume vectors and the arithmetic the mixer applies to them.
//!
//! Levels use the server's software volume scale: `VOLUME_NORM` is 100%,
//! `VOLUME_MUTED` is silence, and the UI allows overshoot up to
//! `VOLUME_UI_MAX` (150%).

use serde::{Deserialize, Serialize};

pub const VOLUME_MUTED: u32 = 0;
pub const VOLUME_NORM: u32 = 0x10000;
/// Ceiling for relative adjustments.
pub const VOLUME_UI_MAX: u32 = VOLUME_NORM + VOLUME_NORM / 2;
/// Largest level the server accepts at all.
pub const VOLUME_MAX: u32 = u32::MAX / 2;

/// Apply a relative percentage change to a single level.
///
/// `delta = round(pct * NORM)`. A positive delta adds, clamped at
/// `VOLUME_UI_MAX`; if the unsigned sum wraps the level is left alone. A
/// non-positive delta subtracts; if the unsigned sum does not come out below
/// the original level (underflow wrapped, or the delta was zero) the result is
/// `VOLUME_MUTED`.
pub fn pct_delta(vol: u32, pct: f64) -> u32 {
    let delta = (pct * VOLUME_NORM as f64).round() as i32;
    let sum = vol.wrapping_add(delta as u32);
    if delta > 0 {
        if sum > vol {
            sum.min(VOLUME_UI_MAX)
        } else {
            vol
        }
    } else if sum < vol {
        sum
    } else {
        VOLUME_MUTED
    }
}

/// Absolute level for a fraction of normal volume (1.0 == 100%).
pub fn from_fraction(fraction: f64) -> u32 {
    (VOLUME_NORM as f64 * fraction).clamp(0.0, VOLUME_MAX as f64) as u32
}

/// Level as a fraction of normal volume.
pub fn to_fraction(vol: u32) -> f64 {
    vol as f64 / VOLUME_NORM as f64
}

/// Software volume to decibels using the server's cubic mapping.
pub fn to_db(vol: u32) -> f64 {
    if vol == VOLUME_MUTED {
        return f64::NEG_INFINITY;
    }
    let linear = to_fraction(vol).powi(3);
    20.0 * linear.log10()
}

/// Clamp a raw meter sample into `[0, 1]`. NaN reads as silence.
pub fn clamp_peak(sample: f32) -> f32 {
    if sample.is_nan() {
        0.0
    } else {
        sample.clamp(0.0, 1.0)
    }
}

/// One speaker position of a channel map, in the server's naming
/// (`front-left`, `mono`, `lfe`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelPosition(String);

impl ChannelPosition {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Human readable form: `front-left` becomes `Front Left`.
    pub fn pretty(&self) -> String {
        if self.0 == "lfe" {
            return "LFE".to_string();
        }
        self.0
            .split('-')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Ordered per-channel levels together with their channel map.
///
/// The two vectors always have the same length.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelVolumes {
    levels: Vec<u32>,
    positions: Vec<ChannelPosition>,
}

impl ChannelVolumes {
    pub fn new(levels: Vec<u32>, positions: Vec<ChannelPosition>) -> Self {
        assert_eq!(
            levels.len(),
            positions.len(),
            "volume and channel map length differ"
        );
        Self { levels, positions }
    }

    /// Zero channels, as carried by cards.
    pub fn empty() -> Self {
        Self::default()
    }

    /// `n` channels at the same level with positions taken from a standard layout.
    pub fn uniform(n: usize, level: u32) -> Self {
        let positions = match n {
            1 => vec![ChannelPosition::new("mono")],
            2 => vec![
                ChannelPosition::new("front-left"),
                ChannelPosition::new("front-right"),
            ],
            _ => (0..n).map(|i| ChannelPosition::new(format!("aux{i}"))).collect(),
        };
        Self::new(vec![level; n], positions)
    }

    pub fn channels(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    pub fn positions(&self) -> &[ChannelPosition] {
        &self.positions
    }

    pub fn get(&self, channel: usize) -> Option<u32> {
        self.levels.get(channel).copied()
    }

    /// Integer mean of all channels; muted when there are none.
    pub fn avg(&self) -> u32 {
        if self.levels.is_empty() {
            return VOLUME_MUTED;
        }
        let sum: u64 = self.levels.iter().map(|&v| v as u64).sum();
        (sum / self.levels.len() as u64) as u32
    }

    pub fn max(&self) -> u32 {
        self.levels.iter().copied().max().unwrap_or(VOLUME_MUTED)
    }

    pub fn set_all(&mut self, level: u32) {
        for v in &mut self.levels {
            *v = level;
        }
    }

    /// Set one channel, or every channel when `channel` is `None`.
    pub fn set(&mut self, channel: Option<usize>, level: u32) {
        match channel {
            Some(ch) => {
                assert!(ch < self.levels.len(), "channel {ch} out of range");
                self.levels[ch] = level;
            }
            None => self.set_all(level),
        }
    }

    /// Relative change on one channel, or on the average of all channels
    /// (written back to every channel) when `channel` is `None`.
    pub fn apply_pct_delta(&mut self, channel: Option<usize>, pct: f64) {
        match channel {
            Some(ch) => {
                assert!(ch < self.levels.len(), "channel {ch} out of range");
                self.levels[ch] = pct_delta(self.levels[ch], pct);
            }
            None => {
                let level = pct_delta(self.avg(), pct);
                self.set_all(level);
            }
        }
    }
}
