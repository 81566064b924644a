// SPDX-License-Identifier: MIT OR Apache-2.0
//! Conversions between seconds, frames, milliseconds and timecode strings.
//!
//! Timecodes are formatted `HH:MM:SS:MLS`, the last field being
//! milliseconds.

use crate::error::{Result, TimelineError};
use serde::{Deserialize, Serialize};

/// Default frame rate
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Guards `floor` against values like `2.9999999999999996` frames
const FRAME_EPSILON: f64 = 1e-6;

/// Frame-rate aware time converter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Timecode {
    fps: f64,
}

impl Timecode {
    /// Create a converter for the given frame rate
    pub fn new(fps: f64) -> Self {
        let mut timecode = Self { fps: DEFAULT_FRAME_RATE };
        timecode.set_fps(fps);
        timecode
    }

    /// Frames per second
    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Set the frame rate. Non-positive rates are ignored.
    pub fn set_fps(&mut self, fps: f64) {
        if fps > 0.0 && fps.is_finite() {
            self.fps = fps;
        } else {
            tracing::error!("Ignoring invalid frame rate {}", fps);
        }
    }

    /// Frame containing the given time
    pub fn frame_for_seconds(&self, seconds: f64) -> i64 {
        (seconds * self.fps + FRAME_EPSILON).floor() as i64
    }

    /// Start time of the given frame
    pub fn seconds_for_frame(&self, frame: i64) -> f64 {
        frame as f64 / self.fps
    }

    /// Frame containing the given millisecond time
    pub fn frame_for_millis(&self, millis: u64) -> i64 {
        self.frame_for_seconds(millis as f64 / 1000.0)
    }

    /// Start time of the given frame in milliseconds
    pub fn millis_for_frame(&self, frame: i64) -> i64 {
        (self.seconds_for_frame(frame) * 1000.0).round() as i64
    }

    /// Parse a `HH:MM:SS:MLS` timecode into seconds
    pub fn seconds_for_timecode(&self, timecode: &str) -> Result<f64> {
        let fields: Vec<&str> = timecode.trim().split(':').collect();
        if fields.len() != 4 {
            return Err(TimelineError::InvalidTimecode(timecode.to_string()));
        }

        let mut values = [0u64; 4];
        for (value, field) in values.iter_mut().zip(&fields) {
            *value = field
                .parse::<u64>()
                .map_err(|_| TimelineError::InvalidTimecode(timecode.to_string()))?;
        }

        let [hours, minutes, seconds, millis] = values;
        if minutes >= 60 || seconds >= 60 || millis >= 1000 {
            return Err(TimelineError::InvalidTimecode(timecode.to_string()));
        }

        let whole_seconds = hours
            .checked_mul(3600)
            .and_then(|s| s.checked_add(minutes * 60 + seconds))
            .ok_or_else(|| TimelineError::InvalidTimecode(timecode.to_string()))?;
        Ok(whole_seconds as f64 + millis as f64 / 1000.0)
    }

    /// Format seconds as `HH:MM:SS:MLS`
    pub fn timecode_for_seconds(&self, seconds: f64) -> String {
        Self::timecode_for_millis((seconds.max(0.0) * 1000.0).round() as u64)
    }

    /// Format milliseconds as `HH:MM:SS:MLS`
    pub fn timecode_for_millis(millis: u64) -> String {
        let hours = millis / 3_600_000;
        let minutes = (millis / 60_000) % 60;
        let seconds = (millis / 1000) % 60;
        let millis = millis % 1000;
        format!("{:02}:{:02}:{:02}:{:03}", hours, minutes, seconds, millis)
    }
}

impl Default for Timecode {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE)
    }
}

/// Snap a millisecond time to a BPM grid of `steps` divisions per measure.
///
/// A measure is four beats. The step length is truncated to whole
/// milliseconds and a time exactly half way between two steps snaps down.
pub fn quantize_to_bpm(millis: u64, bpm: f64, steps: u64) -> u64 {
    if bpm <= 0.0 || steps == 0 {
        return millis;
    }
    let measure = 1000.0 / (bpm / 240.0);
    let step = (measure / steps as f64) as u64;
    if step == 0 {
        return millis;
    }
    let mut base = millis / step;
    if (millis % step) as f64 > step as f64 * 0.5 {
        base += 1;
    }
    base * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_round_trip_within_one_frame() {
        let timecode = Timecode::new(30.0);
        let frame_duration = 1.0 / 30.0;
        let mut t = 0.0;
        while t <= 10.0 {
            let back = timecode.seconds_for_frame(timecode.frame_for_seconds(t));
            assert!((t - back).abs() < frame_duration, "t={} back={}", t, back);
            assert!(back <= t + 1e-6);
            t += 0.0137;
        }
    }

    #[test]
    fn test_exact_frame_boundaries() {
        let timecode = Timecode::new(30.0);
        assert_eq!(timecode.frame_for_seconds(0.1), 3);
        assert_eq!(timecode.frame_for_seconds(10.0), 300);
        assert_eq!(timecode.seconds_for_frame(15), 0.5);
    }

    #[test]
    fn test_timecode_format_and_parse() {
        let timecode = Timecode::default();
        assert_eq!(timecode.timecode_for_seconds(3723.25), "01:02:03:250");
        let seconds = timecode.seconds_for_timecode("01:02:03:250").unwrap();
        assert!((seconds - 3723.25).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_timecodes() {
        let timecode = Timecode::default();
        for bad in ["", "10", "00:00:10", "aa:00:00:000", "00:61:00:000", "00:00:00:1000", "-1:00:00:000"] {
            assert!(timecode.seconds_for_timecode(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_huge_hour_field_is_rejected() {
        let timecode = Timecode::default();
        assert!(timecode.seconds_for_timecode("9999999999999999:00:00:000").is_err());
        assert!(timecode.seconds_for_timecode("99999999999999999999:00:00:000").is_err());
        let seconds = timecode.seconds_for_timecode("1000000:00:00:000").unwrap();
        assert_eq!(seconds, 3_600_000_000.0);
    }

    #[test]
    fn test_quantize_to_bpm() {
        // 120 bpm, 16 steps per measure: 125ms grid
        assert_eq!(quantize_to_bpm(62, 120.0, 16), 0);
        assert_eq!(quantize_to_bpm(63, 120.0, 16), 125);
        assert_eq!(quantize_to_bpm(1000, 120.0, 16), 1000);
        // 500ms grid, exact half snaps down
        assert_eq!(quantize_to_bpm(250, 120.0, 4), 0);
        assert_eq!(quantize_to_bpm(251, 120.0, 4), 500);
        assert_eq!(quantize_to_bpm(777, 0.0, 16), 777);
    }

    #[test]
    fn test_invalid_fps_ignored() {
        let mut timecode = Timecode::new(24.0);
        timecode.set_fps(0.0);
        assert_eq!(timecode.fps(), 24.0);
    }
}
