// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fixed timeline controls: page tabs, the in/out bar and the ticker.
//!
//! Controls don't own timeline state. They translate pointer input into
//! requests (select a page, move an in/out handle, scrub) that the
//! timeline applies.

use crate::error::{Result, TimelineError};
use crate::input::PointerEvent;
use crate::mapping::ScreenMapping;
use crate::range::NormalizedRange;
use crate::state;
use egui::Rect;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pixel distance within which an in/out handle is grabbed
pub const INOUT_HANDLE_TOLERANCE: f32 = 6.0;

/// Equal-width tabs, one per page
#[derive(Debug, Clone)]
pub struct PageTabs {
    draw_rect: Rect,
}

impl PageTabs {
    /// Create tabs with no area
    pub fn new() -> Self {
        Self { draw_rect: Rect::NOTHING }
    }

    /// Screen area
    pub fn draw_rect(&self) -> Rect {
        self.draw_rect
    }

    /// Place the tab strip
    pub fn set_draw_rect(&mut self, rect: Rect) {
        self.draw_rect = rect;
    }

    /// Tab index under a screen position
    pub fn tab_at(&self, event: &PointerEvent, page_count: usize) -> Option<usize> {
        if page_count == 0 || !self.draw_rect.contains(event.pos) {
            return None;
        }
        let tab_width = self.draw_rect.width() / page_count as f32;
        if tab_width <= 0.0 {
            return None;
        }
        let index = ((event.pos.x - self.draw_rect.min.x) / tab_width) as usize;
        Some(index.min(page_count - 1))
    }

    /// Page to switch to for a press, if any
    pub fn pointer_pressed(&mut self, event: &PointerEvent, page_count: usize) -> Option<usize> {
        self.tab_at(event, page_count)
    }
}

/// In/out handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InOutHandle {
    /// In point
    In,
    /// Out point
    Out,
}

#[derive(Serialize, Deserialize)]
struct InOutDocument {
    in_out: NormalizedRange,
}

/// Bar for dragging the in and out points
#[derive(Debug, Clone)]
pub struct InOutControl {
    draw_rect: Rect,
    drag: Option<InOutHandle>,
    file_path: Option<PathBuf>,
}

impl InOutControl {
    /// Create a control with no area
    pub fn new() -> Self {
        Self {
            draw_rect: Rect::NOTHING,
            drag: None,
            file_path: None,
        }
    }

    /// Screen area
    pub fn draw_rect(&self) -> Rect {
        self.draw_rect
    }

    /// Place the bar
    pub fn set_draw_rect(&mut self, rect: Rect) {
        self.draw_rect = rect;
    }

    /// File the range is persisted to
    pub fn set_file_path(&mut self, path: Option<PathBuf>) {
        self.file_path = path;
    }

    /// Handle being dragged
    pub fn dragging(&self) -> Option<InOutHandle> {
        self.drag
    }

    /// Grab the handle nearest the press
    pub fn pointer_pressed(&mut self, event: &PointerEvent, mapping: &ScreenMapping, range: NormalizedRange) -> bool {
        if !self.draw_rect.contains(event.pos) {
            return false;
        }
        let in_distance = (mapping.normalized_to_screen_x(range.min) - event.pos.x).abs();
        let out_distance = (mapping.normalized_to_screen_x(range.max) - event.pos.x).abs();
        self.drag = if in_distance.min(out_distance) > INOUT_HANDLE_TOLERANCE {
            None
        } else if in_distance <= out_distance {
            Some(InOutHandle::In)
        } else {
            Some(InOutHandle::Out)
        };
        self.drag.is_some()
    }

    /// New in or out point for a drag, as `(handle, percent)`
    pub fn pointer_dragged(&mut self, event: &PointerEvent, mapping: &ScreenMapping) -> Option<(InOutHandle, f64)> {
        let handle = self.drag?;
        Some((handle, mapping.screen_x_to_normalized(event.pos.x).clamp(0.0, 1.0)))
    }

    /// Release the handle. Returns whether one was held.
    pub fn pointer_released(&mut self) -> bool {
        self.drag.take().is_some()
    }

    /// Write the range to its file
    pub fn save(&self, range: NormalizedRange) -> Result<()> {
        let path = self
            .file_path
            .as_ref()
            .ok_or_else(|| TimelineError::NoFilePath("inout".to_string()))?;
        state::save_document(&InOutDocument { in_out: range }, path)
    }

    /// Read the range from its file, if it exists
    pub fn load(&self) -> Result<Option<NormalizedRange>> {
        let Some(path) = &self.file_path else {
            return Err(TimelineError::NoFilePath("inout".to_string()));
        };
        if !path.exists() {
            return Ok(None);
        }
        let document: InOutDocument = state::load_document(path)?;
        Ok(Some(document.in_out))
    }
}

/// Time ruler above the tracks; click or drag to scrub
#[derive(Debug, Clone)]
pub struct Ticker {
    draw_rect: Rect,
    scrubbing: bool,
    hover_millis: Option<u64>,
}

impl Ticker {
    /// Create a ticker with no area
    pub fn new() -> Self {
        Self {
            draw_rect: Rect::NOTHING,
            scrubbing: false,
            hover_millis: None,
        }
    }

    /// Screen area
    pub fn draw_rect(&self) -> Rect {
        self.draw_rect
    }

    /// Place the ruler
    pub fn set_draw_rect(&mut self, rect: Rect) {
        self.draw_rect = rect;
    }

    /// Whether a scrub is in progress
    pub fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }

    /// Start scrubbing, returning the time under the pointer in seconds
    pub fn pointer_pressed(&mut self, event: &PointerEvent, mapping: &ScreenMapping) -> Option<f64> {
        if !self.draw_rect.contains(event.pos) {
            return None;
        }
        self.scrubbing = true;
        Some(self.seconds_at(event, mapping))
    }

    /// Scrub time under the pointer
    pub fn pointer_dragged(&mut self, event: &PointerEvent, mapping: &ScreenMapping) -> Option<f64> {
        self.scrubbing.then(|| self.seconds_at(event, mapping))
    }

    /// Stop scrubbing
    pub fn pointer_released(&mut self) -> bool {
        std::mem::replace(&mut self.scrubbing, false)
    }

    /// Follow the pointer with the hover marker while it is over the ruler
    pub fn pointer_moved(&mut self, event: &PointerEvent, mapping: &ScreenMapping) {
        self.hover_millis = self
            .draw_rect
            .contains(event.pos)
            .then(|| (self.seconds_at(event, mapping) * 1000.0).round() as u64);
    }

    /// Time marked on the ruler, in milliseconds
    pub fn hover_time(&self) -> Option<u64> {
        self.hover_millis
    }

    /// Mark a time on the ruler, or clear the mark
    pub fn set_hover_time(&mut self, millis: Option<u64>) {
        self.hover_millis = millis;
    }

    fn seconds_at(&self, event: &PointerEvent, mapping: &ScreenMapping) -> f64 {
        mapping
            .screen_x_to_seconds(event.pos.x)
            .clamp(0.0, mapping.duration_seconds)
    }

    /// Screen x of every beat of a measure grid inside the visible range
    pub fn bpm_lines(&self, mapping: &ScreenMapping, bpm: f64) -> Vec<f32> {
        if bpm <= 0.0 || mapping.duration_seconds <= 0.0 {
            return Vec::new();
        }
        let beat_seconds = 60.0 / bpm;
        let start = mapping.view.min * mapping.duration_seconds;
        let end = mapping.view.max * mapping.duration_seconds;
        let mut beat = (start / beat_seconds).ceil() as i64;
        let mut lines = Vec::new();
        while beat as f64 * beat_seconds <= end {
            let normalized = beat as f64 * beat_seconds / mapping.duration_seconds;
            lines.push(mapping.normalized_to_screen_x(normalized));
            beat += 1;
        }
        lines
    }
}

impl Default for PageTabs {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for InOutControl {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    fn mapping() -> ScreenMapping {
        ScreenMapping::new(10.0, Rect::from_min_size(pos2(0.0, 0.0), vec2(1000.0, 10.0)), NormalizedRange::FULL)
    }

    #[test]
    fn test_tabs_pick_page() {
        let mut tabs = PageTabs::new();
        tabs.set_draw_rect(Rect::from_min_size(pos2(0.0, 0.0), vec2(300.0, 18.0)));
        assert_eq!(tabs.pointer_pressed(&PointerEvent::at(250.0, 5.0), 3), Some(2));
        assert_eq!(tabs.pointer_pressed(&PointerEvent::at(10.0, 5.0), 3), Some(0));
        assert_eq!(tabs.pointer_pressed(&PointerEvent::at(10.0, 50.0), 3), None);
        assert_eq!(tabs.pointer_pressed(&PointerEvent::at(10.0, 5.0), 0), None);
    }

    #[test]
    fn test_inout_grabs_nearest_handle() {
        let mut control = InOutControl::new();
        control.set_draw_rect(Rect::from_min_size(pos2(0.0, 0.0), vec2(1000.0, 7.0)));
        let range = NormalizedRange { min: 0.2, max: 0.8 };
        assert!(!control.pointer_pressed(&PointerEvent::at(500.0, 3.0), &mapping(), range));
        assert!(control.pointer_pressed(&PointerEvent::at(797.0, 3.0), &mapping(), range));
        assert_eq!(control.dragging(), Some(InOutHandle::Out));
        let (handle, percent) = control.pointer_dragged(&PointerEvent::at(900.0, 3.0), &mapping()).unwrap();
        assert_eq!(handle, InOutHandle::Out);
        assert!((percent - 0.9).abs() < 1e-6);
        assert!(control.pointer_released());
        assert!(control.pointer_dragged(&PointerEvent::at(900.0, 3.0), &mapping()).is_none());
    }

    #[test]
    fn test_inout_persistence() {
        let folder = std::env::temp_dir().join(format!("keyline_inout_{}", uuid::Uuid::new_v4()));
        let mut control = InOutControl::new();
        assert!(control.load().is_err());
        control.set_file_path(Some(folder.join("show_inout.ron")));
        assert_eq!(control.load().unwrap(), None);
        let range = NormalizedRange { min: 0.1, max: 0.6 };
        control.save(range).unwrap();
        assert_eq!(control.load().unwrap(), Some(range));
        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_ticker_scrub() {
        let mut ticker = Ticker::new();
        ticker.set_draw_rect(Rect::from_min_size(pos2(0.0, 0.0), vec2(1000.0, 27.0)));
        assert_eq!(ticker.pointer_pressed(&PointerEvent::at(250.0, 10.0), &mapping()), Some(2.5));
        assert_eq!(ticker.pointer_dragged(&PointerEvent::at(2000.0, 100.0), &mapping()), Some(10.0));
        assert!(ticker.pointer_released());
        assert_eq!(ticker.pointer_dragged(&PointerEvent::at(100.0, 10.0), &mapping()), None);
    }

    #[test]
    fn test_ticker_hover_time() {
        let mut ticker = Ticker::default();
        assert_eq!(ticker.hover_time(), None);
        ticker.set_draw_rect(Rect::from_min_size(pos2(0.0, 0.0), vec2(1000.0, 27.0)));
        ticker.pointer_moved(&PointerEvent::at(420.0, 10.0), &mapping());
        assert_eq!(ticker.hover_time(), Some(4200));
        ticker.pointer_moved(&PointerEvent::at(420.0, 300.0), &mapping());
        assert_eq!(ticker.hover_time(), None);
        ticker.set_hover_time(Some(750));
        assert_eq!(ticker.hover_time(), Some(750));
    }

    #[test]
    fn test_default_controls_start_without_area() {
        assert_eq!(PageTabs::default().draw_rect(), Rect::NOTHING);
        let control = InOutControl::default();
        assert_eq!(control.draw_rect(), Rect::NOTHING);
        assert_eq!(control.dragging(), None);
        let ticker = Ticker::default();
        assert_eq!(ticker.draw_rect(), Rect::NOTHING);
        assert!(!ticker.is_scrubbing());
    }

    #[test]
    fn test_bpm_lines() {
        let ticker = Ticker::new();
        // 120 bpm over 10 seconds: a beat every 0.5s, 21 lines including both ends
        let lines = ticker.bpm_lines(&mapping(), 120.0);
        assert_eq!(lines.len(), 21);
        assert_eq!(lines[1], 50.0);
    }
}
