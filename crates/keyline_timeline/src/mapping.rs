// SPDX-License-Identifier: MIT OR Apache-2.0
//! Screen-space to time-space mapping.
//!
//! A draw rect's horizontal extent is mapped linearly onto the visible
//! zoom viewport. Points outside the rect extrapolate instead of clamping,
//! so drags that overshoot the rect still produce usable times.

use crate::range::NormalizedRange;
use egui::Rect;

/// Linear map from `[in_min, in_max]` to `[out_min, out_max]`, unclamped
pub fn map_linear(value: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    if (in_max - in_min).abs() < f64::EPSILON {
        return out_min;
    }
    out_min + (value - in_min) / (in_max - in_min) * (out_max - out_min)
}

/// Mapping between screen x and timeline time for one draw rect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenMapping {
    /// Total timeline duration in seconds
    pub duration_seconds: f64,
    /// Left edge of the draw rect
    pub min_x: f32,
    /// Right edge of the draw rect
    pub max_x: f32,
    /// Visible normalized sub-range
    pub view: NormalizedRange,
}

impl ScreenMapping {
    /// Mapping over the horizontal extent of `rect`
    pub fn new(duration_seconds: f64, rect: Rect, view: NormalizedRange) -> Self {
        Self {
            duration_seconds,
            min_x: rect.min.x,
            max_x: rect.max.x,
            view,
        }
    }

    /// Screen x to normalized position within the whole duration
    pub fn screen_x_to_normalized(&self, x: f32) -> f64 {
        map_linear(
            x as f64,
            self.min_x as f64,
            self.max_x as f64,
            self.view.min,
            self.view.max,
        )
    }

    /// Normalized position to screen x
    pub fn normalized_to_screen_x(&self, normalized: f64) -> f32 {
        map_linear(
            normalized,
            self.view.min,
            self.view.max,
            self.min_x as f64,
            self.max_x as f64,
        ) as f32
    }

    /// Screen x to seconds
    pub fn screen_x_to_seconds(&self, x: f32) -> f64 {
        self.screen_x_to_normalized(x) * self.duration_seconds
    }

    /// Screen x to the nearest millisecond. Negative left of time zero.
    pub fn screen_x_to_millis(&self, x: f32) -> i64 {
        (self.screen_x_to_normalized(x) * self.duration_seconds * 1000.0).round() as i64
    }

    /// Milliseconds to screen x
    pub fn millis_to_screen_x(&self, millis: i64) -> f32 {
        if self.duration_seconds <= 0.0 {
            return self.min_x;
        }
        self.normalized_to_screen_x(millis as f64 / (self.duration_seconds * 1000.0))
    }

    /// Width of the mapped rect in pixels
    pub fn width(&self) -> f32 {
        self.max_x - self.min_x
    }
}
