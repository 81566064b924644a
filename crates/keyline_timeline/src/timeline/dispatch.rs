// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input routing.
//!
//! A modal track gets every event. Otherwise pointer input goes through
//! the tabs, in/out bar, ticker, current page and zoomer in that order,
//! and keys go to the shortcut table, the arrow nudges and the page.
//! Every pointer-down and key-down opens an undo gesture, every
//! pointer-up and key-up closes it.

use super::Timeline;
use crate::controls::InOutHandle;
use crate::input::{InputEvent, KeyEvent, PointerEvent};
use egui::{vec2, Key};

impl Timeline {
    /// Route one input event. Returns whether something consumed it.
    ///
    /// Input is ignored until [`Timeline::setup`] has run and while the
    /// timeline is disabled.
    pub fn handle_input(&mut self, event: InputEvent) -> bool {
        if !self.is_setup || !self.clock.is_enabled() {
            return false;
        }
        match event {
            InputEvent::PointerPressed(e) => self.pointer_pressed(&e),
            InputEvent::PointerMoved(e) => self.pointer_moved(&e),
            InputEvent::PointerDragged(e) => self.pointer_dragged(&e),
            InputEvent::PointerReleased(e) => self.pointer_released(&e),
            InputEvent::KeyPressed(e) => self.key_pressed(&e),
            InputEvent::KeyReleased(e) => self.key_released(&e),
        }
    }

    /// Route a batch of events in order
    pub fn handle_inputs(&mut self, events: impl IntoIterator<Item = InputEvent>) {
        for event in events {
            self.handle_input(event);
        }
    }

    /// Whether the pointer was inside the timeline at the last press
    pub fn has_focus(&self) -> bool {
        self.has_focus
    }

    fn begin_gesture(&mut self) {
        let Some(page) = self.current_page.and_then(|i| self.pages.get(i)) else {
            return;
        };
        self.undo.begin_gesture(page);
    }

    fn collect_candidates(&mut self) {
        let Some(page) = self.current_page.and_then(|i| self.pages.get(i)) else {
            return;
        };
        self.undo.collect_candidates(page);
    }

    fn commit_gesture(&mut self) {
        self.key_gesture_open = false;
        self.undo.commit_gesture(&self.pages);
    }

    fn commit_key_gesture(&mut self) {
        if self.key_gesture_open {
            self.commit_gesture();
        }
    }

    fn set_focus(&mut self, focus: bool) {
        if focus == self.has_focus {
            return;
        }
        self.has_focus = focus;
        if let Some(page) = self.current_page_mut() {
            if focus {
                page.timeline_gained_focus();
            } else {
                page.timeline_lost_focus();
            }
        }
    }

    // Pointer

    fn pointer_pressed(&mut self, event: &PointerEvent) -> bool {
        self.commit_key_gesture();

        if let Some(id) = self.modal {
            self.begin_gesture();
            return self
                .with_track(id, |track, ctx| track.pointer_pressed(event, ctx))
                .unwrap_or(false);
        }

        // Hover decides which tracks are snapshotted
        self.with_current_page(|page, ctx| page.pointer_moved(event, ctx));
        self.begin_gesture();

        self.set_focus(self.draw_rect.contains(event.pos));
        if !self.has_focus {
            self.unselect_all();
            return false;
        }

        if self.pages.len() > 1 {
            if let Some(index) = self.tabs.pointer_pressed(event, self.pages.len()) {
                self.select_page(index);
                return true;
            }
        }

        let mapping = self.mapping();
        let mut consumed = self.in_out.pointer_pressed(event, &mapping, self.clock.in_out());
        if let Some(seconds) = self.ticker.pointer_pressed(event, &mapping) {
            self.set_current_time_seconds(seconds);
            consumed = true;
        }
        consumed |= self
            .with_current_page(|page, ctx| page.pointer_pressed(event, ctx))
            .unwrap_or(false);
        consumed |= self.zoom.pointer_pressed(event);

        // A click may have focused a track that wasn't a candidate yet
        self.collect_candidates();
        consumed
    }

    fn pointer_moved(&mut self, event: &PointerEvent) -> bool {
        if let Some(id) = self.modal {
            return self
                .with_track(id, |track, ctx| track.pointer_moved(event, ctx))
                .unwrap_or(false);
        }
        let mapping = self.mapping();
        self.ticker.pointer_moved(event, &mapping);
        self.with_current_page(|page, ctx| page.pointer_moved(event, ctx))
            .unwrap_or(false)
    }

    fn pointer_dragged(&mut self, event: &PointerEvent) -> bool {
        if let Some(id) = self.modal {
            return self
                .with_track(id, |track, ctx| track.pointer_dragged(event, ctx))
                .unwrap_or(false);
        }

        let mapping = self.mapping();
        if let Some((handle, percent)) = self.in_out.pointer_dragged(event, &mapping) {
            match handle {
                InOutHandle::In => self.set_in_point_at_percent(percent),
                InOutHandle::Out => self.set_out_point_at_percent(percent),
            }
            return true;
        }
        if let Some(seconds) = self.ticker.pointer_dragged(event, &mapping) {
            self.set_current_time_seconds(seconds);
            return true;
        }

        let mut consumed = self
            .with_current_page(|page, ctx| page.pointer_dragged(event, ctx))
            .unwrap_or(false);
        if self.zoom.pointer_dragged(event) {
            self.sync_zoom_bounds();
            consumed = true;
        }
        consumed
    }

    fn pointer_released(&mut self, event: &PointerEvent) -> bool {
        let consumed = if let Some(id) = self.modal {
            self.with_track(id, |track, ctx| track.pointer_released(event, ctx))
                .unwrap_or(false)
        } else {
            let mut consumed = false;
            if self.in_out.pointer_released() {
                if let Err(e) = self.in_out.save(self.clock.in_out()) {
                    tracing::error!("Failed to save in/out range: {}", e);
                }
                consumed = true;
            }
            consumed |= self.ticker.pointer_released();
            consumed |= self
                .with_current_page(|page, ctx| page.pointer_released(event, ctx))
                .unwrap_or(false);
            if self.zoom.pointer_released(event) {
                self.sync_zoom_bounds();
                consumed = true;
            }
            consumed
        };

        // Commit regardless of focus
        self.commit_gesture();
        consumed
    }

    // Keys

    fn key_pressed(&mut self, event: &KeyEvent) -> bool {
        self.commit_key_gesture();

        if let Some(id) = self.modal {
            self.begin_gesture();
            self.key_gesture_open = true;
            return self
                .with_track(id, |track, ctx| track.key_pressed(event, ctx))
                .unwrap_or(false);
        }

        if !self.has_focus {
            return false;
        }

        if self.undo.is_enabled() && event.primary() && event.key == Key::Z {
            if event.modifiers.shift {
                self.redo();
            } else {
                self.undo();
            }
            return true;
        }

        self.begin_gesture();
        self.key_gesture_open = true;

        let consumed = if event.primary() {
            self.shortcut(event)
        } else {
            let nudged = self.arrow_nudge(event);
            let handled = self
                .with_current_page(|page, ctx| page.key_pressed(event, ctx))
                .unwrap_or(false);
            nudged || handled
        };
        self.process_feedback();
        consumed
    }

    fn key_released(&mut self, _event: &KeyEvent) -> bool {
        let was_open = self.key_gesture_open;
        self.commit_key_gesture();
        was_open
    }

    fn shortcut(&mut self, event: &KeyEvent) -> bool {
        match event.key {
            Key::C => {
                let items = self.current_page().map(|page| page.copy_request()).unwrap_or_default();
                if !items.is_empty() {
                    tracing::debug!("Copied {} items", items.len());
                    self.pasteboard = items;
                }
                true
            }
            Key::X => {
                let items = self
                    .with_current_page(|page, ctx| page.cut_request(ctx))
                    .unwrap_or_default();
                if !items.is_empty() {
                    tracing::debug!("Cut {} items", items.len());
                    self.pasteboard = items;
                }
                true
            }
            Key::V => {
                if self.pasteboard.is_empty() {
                    return false;
                }
                let items = std::mem::take(&mut self.pasteboard);
                self.with_current_page(|page, ctx| page.paste_sent(&items, ctx));
                self.pasteboard = items;
                if self.settings.move_playhead_on_paste {
                    if let Some(millis) = self.latest_selected_time() {
                        self.set_current_time_millis(millis);
                    }
                }
                true
            }
            Key::A => {
                if let Some(page) = self.current_page_mut() {
                    if !event.modifiers.shift {
                        page.unselect_all();
                    }
                    page.select_all();
                }
                true
            }
            Key::S if !self.settings.autosave && self.unsaved => {
                if let Err(e) = self.save() {
                    tracing::error!("Save failed: {}", e);
                }
                true
            }
            _ => false,
        }
    }

    /// Arrows move the playhead when nothing is selected, otherwise they
    /// nudge the selection. Up and down move values only, left and right
    /// move times only. Left and down are negative.
    fn arrow_nudge(&mut self, event: &KeyEvent) -> bool {
        if !matches!(event.key, Key::ArrowLeft | Key::ArrowRight | Key::ArrowUp | Key::ArrowDown) {
            return false;
        }
        let mut nudge = if event.modifiers.shift {
            self.big_nudge_percent()
        } else {
            self.nudge_percent()
        };

        if self.total_selected_items() == 0 {
            let step = if self.clock.is_frame_based() {
                self.clock.timecode().seconds_for_frame(1)
            } else {
                nudge.x as f64 * self.clock.duration()
            };
            let time = self.current_time();
            match event.key {
                Key::ArrowLeft => self.set_current_time_seconds(time - step),
                Key::ArrowRight => self.set_current_time_seconds(time + step),
                _ => return false,
            }
            return true;
        }

        match event.key {
            Key::ArrowUp => nudge.x = 0.0,
            Key::ArrowDown => nudge = vec2(0.0, -nudge.y),
            Key::ArrowRight => nudge.y = 0.0,
            _ => nudge = vec2(-nudge.x, 0.0),
        }
        self.with_current_page(|page, ctx| page.nudge_by(nudge, ctx));
        true
    }
}
