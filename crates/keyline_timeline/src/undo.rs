// SPDX-License-Identifier: MIT OR Apache-2.0
//! Undo/redo over per-track state snapshots.
//!
//! A gesture is bracketed by [`UndoEngine::begin_gesture`] and
//! [`UndoEngine::commit_gesture`]. At the start every track that might be
//! edited (hovered, focused or holding a selection) is snapshotted. At the
//! end only the tracks that reported a modification are kept, and two
//! frames are pushed: their state before the gesture and their state after.
//! `pointer` always indexes the frame matching the current state, so undo
//! steps back one frame and redo steps forward one frame.

use crate::page::{Page, TrackLookup};
use crate::state::StateBuffer;
use crate::track::TrackId;
use indexmap::IndexSet;
use std::collections::VecDeque;

/// Default number of frames kept
pub const DEFAULT_MAX_UNDO_DEPTH: usize = 100;

/// One track's snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoItem {
    /// Track the snapshot belongs to
    pub track: TrackId,
    /// Serialized track state
    pub buffer: StateBuffer,
}

/// Snapshots captured at one point of history
pub type UndoFrame = Vec<UndoItem>;

/// Undo statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UndoStats {
    /// Frames behind the pointer
    pub undo_count: usize,
    /// Frames ahead of the pointer
    pub redo_count: usize,
    /// Bytes held by all frames
    pub memory_used: usize,
    /// Maximum frames kept, zero for unlimited
    pub max_depth: usize,
}

/// Undo/redo engine
#[derive(Debug)]
pub struct UndoEngine {
    stack: VecDeque<UndoFrame>,
    pointer: usize,
    enabled: bool,
    max_depth: usize,
    before: UndoFrame,
    touched: IndexSet<TrackId>,
}

impl UndoEngine {
    /// Create an engine keeping at most `max_depth` frames (zero for unlimited)
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: VecDeque::new(),
            pointer: 0,
            enabled: true,
            max_depth,
            before: Vec::new(),
            touched: IndexSet::new(),
        }
    }

    /// Whether gestures are recorded
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turn recording on or off. Turning it off drops any open gesture.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.before.clear();
            self.touched.clear();
        }
    }

    /// Maximum frames kept
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Change the depth limit, trimming old frames if needed
    pub fn set_max_depth(&mut self, max_depth: usize) {
        self.max_depth = max_depth;
        self.enforce_depth();
    }

    /// Index of the frame matching the current state
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Whether there is no history
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Whether [`Self::undo`] would do anything
    pub fn can_undo(&self) -> bool {
        self.pointer > 0
    }

    /// Whether [`Self::redo`] would do anything
    pub fn can_redo(&self) -> bool {
        !self.stack.is_empty() && self.pointer < self.stack.len() - 1
    }

    /// Frame at an index
    pub fn frame(&self, index: usize) -> Option<&UndoFrame> {
        self.stack.get(index)
    }

    /// Statistics
    pub fn stats(&self) -> UndoStats {
        UndoStats {
            undo_count: self.pointer,
            redo_count: self.stack.len().saturating_sub(self.pointer + 1),
            memory_used: self
                .stack
                .iter()
                .flat_map(|frame| frame.iter())
                .map(|item| item.buffer.len())
                .sum(),
            max_depth: self.max_depth,
        }
    }

    // Gestures

    /// Snapshot every track on `page` that the gesture could modify
    pub fn begin_gesture(&mut self, page: &Page) {
        self.before.clear();
        self.touched.clear();
        self.collect_candidates(page);
    }

    /// Snapshot tracks that became candidates after the gesture started,
    /// e.g. the track a click just focused
    pub fn collect_candidates(&mut self, page: &Page) {
        if !self.enabled {
            return;
        }
        for track in page.tracks().filter(|t| t.is_undo_candidate()) {
            let id = track.id();
            if self.before.iter().any(|item| item.track == id) {
                continue;
            }
            match track.serialize_state() {
                Ok(buffer) => self.before.push(UndoItem { track: id, buffer }),
                Err(e) => tracing::error!("Failed to snapshot track '{}': {}", track.name(), e),
            }
        }
    }

    /// Record that a track changed during the current gesture
    pub fn mark_touched(&mut self, track: TrackId) {
        if self.enabled {
            self.touched.insert(track);
        }
    }

    /// Whether the open gesture has touched anything
    pub fn has_touched(&self) -> bool {
        !self.touched.is_empty()
    }

    /// Close the gesture. Returns whether history grew.
    pub fn commit_gesture(&mut self, pages: &[Page]) -> bool {
        let before = std::mem::take(&mut self.before);
        let touched = std::mem::take(&mut self.touched);
        if !self.enabled || touched.is_empty() {
            return false;
        }

        let mut before_frame: UndoFrame = touched
            .iter()
            .filter_map(|id| before.iter().find(|item| item.track == *id).cloned())
            .collect();
        if before_frame.is_empty() {
            return false;
        }

        let mut after_frame = Vec::new();
        for id in &touched {
            let Some(track) = pages.find_track(*id) else {
                continue;
            };
            match track.serialize_state() {
                Ok(buffer) => after_frame.push(UndoItem { track: *id, buffer }),
                Err(e) => tracing::error!("Failed to snapshot track '{}': {}", track.name(), e),
            }
        }

        // The current frame describes the present state of its tracks. Keep
        // the ones this gesture left alone so redo can still reach them.
        if let Some(current) = self.stack.get(self.pointer) {
            before_frame.extend(current.iter().filter(|item| !touched.contains(&item.track)).cloned());
        }

        // Drop the current frame and any redo history
        self.stack.truncate(self.pointer);
        self.stack.push_back(before_frame);
        self.stack.push_back(after_frame);
        self.pointer = self.stack.len() - 1;
        self.enforce_depth();

        tracing::debug!(
            "Undo frame committed for {} track(s), {} frames, pointer {}",
            touched.len(),
            self.stack.len(),
            self.pointer
        );
        true
    }

    /// Step back one frame. Returns whether anything was restored.
    pub fn undo(&mut self, pages: &mut [Page]) -> bool {
        if self.pointer == 0 || self.stack.is_empty() {
            return false;
        }
        self.pointer -= 1;
        self.restore(self.pointer, pages);
        true
    }

    /// Step forward one frame. Returns whether anything was restored.
    pub fn redo(&mut self, pages: &mut [Page]) -> bool {
        if !self.can_redo() {
            return false;
        }
        self.pointer += 1;
        self.restore(self.pointer, pages);
        true
    }

    fn restore(&self, index: usize, pages: &mut [Page]) {
        let Some(frame) = self.stack.get(index) else {
            return;
        };
        for item in frame {
            match pages.find_track_mut(item.track) {
                Some(track) => {
                    if let Err(e) = track.restore_state(&item.buffer) {
                        tracing::error!("Failed to restore track '{}': {}", track.name(), e);
                    }
                }
                None => tracing::warn!("Undo frame references missing track {:?}", item.track),
            }
        }
    }

    /// Remove every snapshot of a track from history
    pub fn purge_track(&mut self, track: TrackId) {
        for frame in &mut self.stack {
            frame.retain(|item| item.track != track);
        }
        self.before.retain(|item| item.track != track);
        self.touched.shift_remove(&track);
    }

    /// Forget all history
    pub fn clear(&mut self) {
        self.stack.clear();
        self.pointer = 0;
        self.before.clear();
        self.touched.clear();
    }

    fn enforce_depth(&mut self) {
        if self.max_depth == 0 {
            return;
        }
        // A commit pushes two frames; never split them
        let limit = self.max_depth.max(2);
        while self.stack.len() > limit {
            self.stack.pop_front();
            self.pointer = self.pointer.saturating_sub(1);
        }
    }
}

impl Default for UndoEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UNDO_DEPTH)
    }
}
