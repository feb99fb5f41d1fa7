//! Relative/absolute volume conversion
//!
//! The receivers speak absolute volume (0..=98, half steps allowed) while
//! the exposed slider works in relative units. The two are separated by a
//! configured offset: `relative = absolute - offset`.

use serde::{Deserialize, Serialize};

/// Highest absolute volume a receiver accepts
pub const MAX_ABSOLUTE_VOLUME: f64 = 98.0;

/// Relative volume reported for a device that failed the liveness check
pub const OFFLINE_VOLUME: f64 = -99.0;

/// Offset-based converter between relative and absolute volume
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeScale {
    offset: f64,
}

impl VolumeScale {
    pub fn new(offset: f64) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn to_absolute(&self, relative: f64) -> f64 {
        relative + self.offset
    }

    pub fn to_relative(&self, absolute: f64) -> f64 {
        absolute - self.offset
    }
}

impl Default for VolumeScale {
    fn default() -> Self {
        Self::new(80.0)
    }
}

/// Round to the nearest half step the receivers understand
pub fn round_half_step(value: f64) -> f64 {
    (value * 2.0).round() / 2.0
}

/// Format an absolute volume as a HEOS direct-command level.
///
/// Whole levels are zero-padded to two digits (`5` → `"05"`), half steps
/// append a trailing `5` (`30.5` → `"305"`). Out-of-range values are
/// clamped to `0..=98`.
pub fn heos_level(absolute: f64) -> String {
    let clamped = round_half_step(absolute).clamp(0.0, MAX_ABSOLUTE_VOLUME);
    let whole = clamped.trunc() as u32;
    if clamped.fract() > 0.0 {
        format!("{:02}5", whole)
    } else {
        format!("{:02}", whole)
    }
}

/// Format a relative slider value for the Standard `PutMasterVolumeSet` verb
pub fn standard_level(relative: f64) -> String {
    let rounded = round_half_step(relative);
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{:.1}", rounded)
    }
}

/// Parse a volume value reported by a receiver.
///
/// Standard firmwares report relative dB values such as `-40.0`; the
/// `--` placeholder of a muted or powered-off zone yields `None`.
pub fn parse_level(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}
