// SPDX-License-Identifier: MIT OR Apache-2.0
//! Normalized `[min, max]` ranges.
//!
//! Used for the in/out playback range, the zoom viewport and the zoom
//! bounds each track maps through. Values are fractions of the total
//! duration.

use serde::{Deserialize, Serialize};

/// A closed range with `min <= max`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRange {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

impl NormalizedRange {
    /// The whole duration
    pub const FULL: Self = Self { min: 0.0, max: 1.0 };

    /// Create a range, returning `None` when `min > max`
    pub fn new(min: f64, max: f64) -> Option<Self> {
        if min > max || min.is_nan() || max.is_nan() {
            return None;
        }
        Some(Self { min, max })
    }

    /// Width of the range
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Midpoint of the range
    pub fn center(&self) -> f64 {
        (self.min + self.max) * 0.5
    }

    /// Whether `value` lies inside the range (inclusive)
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Clamp both ends into `[0, 1]`
    pub fn clamped_unit(&self) -> Self {
        Self {
            min: self.min.clamp(0.0, 1.0),
            max: self.max.clamp(0.0, 1.0),
        }
    }

    /// Whether both ends are inside `[0, 1]`
    pub fn is_unit(&self) -> bool {
        self.min >= 0.0 && self.max <= 1.0
    }
}

impl Default for NormalizedRange {
    fn default() -> Self {
        Self::FULL
    }
}
