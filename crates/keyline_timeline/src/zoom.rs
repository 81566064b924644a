// SPDX-License-Identifier: MIT OR Apache-2.0
//! Zoom viewport controller.
//!
//! The zoomer bar spans the full duration. Its highlighted window is the
//! visible sub-range: grab an edge to resize it, grab the middle to pan.

use crate::error::{Result, TimelineError};
use crate::events::{EventSink, TimelineEvent, ZoomEventArgs};
use crate::input::PointerEvent;
use crate::range::NormalizedRange;
use crate::state;
use egui::Rect;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Pixel distance within which an edge handle is grabbed
pub const HANDLE_TOLERANCE: f32 = 6.0;

/// Part of the viewport window being dragged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomHandle {
    /// Left edge
    Min,
    /// Right edge
    Max,
    /// Whole window
    Pan,
}

#[derive(Debug, Clone, Copy)]
struct ZoomDrag {
    handle: ZoomHandle,
    anchor_x: f32,
    anchor_range: NormalizedRange,
}

#[derive(Serialize, Deserialize)]
struct ZoomDocument {
    view_range: NormalizedRange,
}

/// Zoom viewport controller
#[derive(Debug)]
pub struct ZoomController {
    range: NormalizedRange,
    draw_rect: Rect,
    drag: Option<ZoomDrag>,
    file_path: Option<PathBuf>,
    events: EventSink,
}

impl ZoomController {
    /// Controller showing the whole duration
    pub fn new(events: EventSink) -> Self {
        Self {
            range: NormalizedRange::FULL,
            draw_rect: Rect::NOTHING,
            drag: None,
            file_path: None,
            events,
        }
    }

    /// Visible sub-range
    pub fn view_range(&self) -> NormalizedRange {
        self.range
    }

    /// Set the visible sub-range, clamped to `[0, 1]`. Inverted ranges are
    /// rejected.
    pub fn set_view_range(&mut self, range: NormalizedRange) -> Result<()> {
        if range.min > range.max || range.min.is_nan() || range.max.is_nan() {
            tracing::warn!("Rejected inverted zoom range {} > {}", range.min, range.max);
            return Err(TimelineError::InvalidRange {
                min: range.min,
                max: range.max,
            });
        }
        let old_zoom = self.range;
        self.range = range.clamped_unit();
        self.events.emit(TimelineEvent::ZoomEnded(ZoomEventArgs {
            current_zoom: self.range,
            old_zoom,
        }));
        Ok(())
    }

    /// Screen area of the zoomer bar
    pub fn draw_rect(&self) -> Rect {
        self.draw_rect
    }

    /// Place the zoomer bar
    pub fn set_draw_rect(&mut self, rect: Rect) {
        self.draw_rect = rect;
    }

    /// File the viewport is persisted to
    pub fn set_file_path(&mut self, path: Option<PathBuf>) {
        self.file_path = path;
    }

    /// Whether a zoom gesture is in progress
    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    fn screen_x(&self, normalized: f64) -> f32 {
        self.draw_rect.min.x + normalized as f32 * self.draw_rect.width()
    }

    /// Which part of the window is under screen x
    pub fn handle_at(&self, x: f32) -> Option<ZoomHandle> {
        let min_x = self.screen_x(self.range.min);
        let max_x = self.screen_x(self.range.max);
        if (x - min_x).abs() <= HANDLE_TOLERANCE {
            Some(ZoomHandle::Min)
        } else if (x - max_x).abs() <= HANDLE_TOLERANCE {
            Some(ZoomHandle::Max)
        } else if x > min_x && x < max_x {
            Some(ZoomHandle::Pan)
        } else {
            None
        }
    }

    // Gesture

    /// Begin a zoom gesture on `handle` at screen x
    pub fn zoom_started(&mut self, handle: ZoomHandle, x: f32) {
        self.drag = Some(ZoomDrag {
            handle,
            anchor_x: x,
            anchor_range: self.range,
        });
        self.events.emit(TimelineEvent::ZoomStarted(ZoomEventArgs {
            current_zoom: self.range,
            old_zoom: self.range,
        }));
    }

    /// Move the grabbed handle to screen x. Returns whether the viewport
    /// changed; moves that would invert the window are rejected.
    pub fn zoom_dragged(&mut self, x: f32) -> bool {
        let Some(drag) = self.drag else {
            return false;
        };
        let width = self.draw_rect.width();
        if width <= 0.0 {
            return false;
        }
        let delta = ((x - drag.anchor_x) / width) as f64;
        let anchor = drag.anchor_range;

        let candidate = match drag.handle {
            ZoomHandle::Min => NormalizedRange {
                min: (anchor.min + delta).clamp(0.0, 1.0),
                max: anchor.max,
            },
            ZoomHandle::Max => NormalizedRange {
                min: anchor.min,
                max: (anchor.max + delta).clamp(0.0, 1.0),
            },
            ZoomHandle::Pan => {
                let span = anchor.span();
                let min = (anchor.min + delta).clamp(0.0, 1.0 - span);
                NormalizedRange { min, max: min + span }
            }
        };

        if candidate.min > candidate.max {
            return false;
        }
        if candidate == self.range {
            return false;
        }
        let old_zoom = self.range;
        self.range = candidate;
        self.events.emit(TimelineEvent::ZoomDragged(ZoomEventArgs {
            current_zoom: self.range,
            old_zoom,
        }));
        true
    }

    /// Finish the gesture and persist the viewport
    pub fn zoom_ended(&mut self) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        self.events.emit(TimelineEvent::ZoomEnded(ZoomEventArgs {
            current_zoom: self.range,
            old_zoom: drag.anchor_range,
        }));
        if self.file_path.is_some() {
            if let Err(e) = self.save() {
                tracing::error!("Failed to save zoom range: {}", e);
            }
        }
    }

    // Pointer routing

    /// Start a gesture when the press lands on the window
    pub fn pointer_pressed(&mut self, event: &PointerEvent) -> bool {
        if !self.draw_rect.contains(event.pos) {
            return false;
        }
        match self.handle_at(event.pos.x) {
            Some(handle) => {
                self.zoom_started(handle, event.pos.x);
                true
            }
            None => false,
        }
    }

    /// Continue the gesture
    pub fn pointer_dragged(&mut self, event: &PointerEvent) -> bool {
        self.zoom_dragged(event.pos.x)
    }

    /// End the gesture
    pub fn pointer_released(&mut self, _event: &PointerEvent) -> bool {
        let was_dragging = self.is_dragging();
        self.zoom_ended();
        was_dragging
    }

    // Persistence

    /// Write the viewport to its file
    pub fn save(&self) -> Result<()> {
        let path = self
            .file_path
            .as_ref()
            .ok_or_else(|| TimelineError::NoFilePath("zoomer".to_string()))?;
        state::save_document(&ZoomDocument { view_range: self.range }, path)
    }

    /// Read the viewport from its file, if it exists
    pub fn load(&mut self) -> Result<()> {
        let Some(path) = self.file_path.clone() else {
            return Err(TimelineError::NoFilePath("zoomer".to_string()));
        };
        if !path.exists() {
            return Ok(());
        }
        let document: ZoomDocument = state::load_document(&path)?;
        if document.view_range.min <= document.view_range.max {
            self.range = document.view_range.clamped_unit();
        } else {
            tracing::warn!("Ignoring inverted zoom range in {:?}", path);
        }
        Ok(())
    }
}
