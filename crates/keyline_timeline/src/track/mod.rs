// SPDX-License-Identifier: MIT OR Apache-2.0
//! Track capability shared by every timeline lane.
//!
//! Concrete kinds live in submodules:
//! - [`keyframes`]: curves, switches, bangs, flags and colors
//! - [`media`]: an external media player acting as the time-control delegate

pub mod keyframes;
pub mod media;

use crate::clock::PlayheadSpan;
use crate::error::{Result, TimelineError};
use crate::events::EventSink;
use crate::input::{KeyEvent, PointerEvent};
use crate::mapping::ScreenMapping;
use crate::range::NormalizedRange;
use crate::state::{self, StateBuffer};
use crate::timecode::{quantize_to_bpm, Timecode};
use egui::{Rect, Vec2};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::path::PathBuf;
use uuid::Uuid;

pub use keyframes::{KeyframeKind, KeyframeTrack};
pub use media::{MediaPlayer, MediaTrack};

/// Grid divisions per measure used when dragged items snap to BPM
pub const SNAP_STEPS: u64 = 16;

/// Pixel distance within which a dragged item snaps to another item
pub const SNAP_DISTANCE: f32 = 12.0;

/// Default lane height in pixels
pub const DEFAULT_TRACK_HEIGHT: f32 = 50.0;

/// Lane height of a collapsed track in pixels
pub const COLLAPSED_TRACK_HEIGHT: f32 = 8.0;

/// Unique identifier for a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub Uuid);

impl TrackId {
    /// Create a new random track ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TrackId {
    fn default() -> Self {
        Self::new()
    }
}

/// Kind of track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackKind {
    /// Interpolated float values
    Curves,
    /// On/off regions
    Switches,
    /// Instant triggers
    Bangs,
    /// Triggers carrying text
    Flags,
    /// Interpolated colors
    Colors,
    /// Externally decoded media
    Media,
}

impl TrackKind {
    /// Get the display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Curves => "Curves",
            Self::Switches => "Switches",
            Self::Bangs => "Bangs",
            Self::Flags => "Flags",
            Self::Colors => "Colors",
            Self::Media => "Media",
        }
    }
}

/// Fields every track carries
#[derive(Debug, Clone)]
pub struct TrackCommon {
    /// Unique track ID
    pub id: TrackId,
    /// Name, unique across the whole timeline
    pub name: String,
    /// Whether the track reacts to input and playback
    pub enabled: bool,
    /// Pointer is over the draw rect
    pub hover: bool,
    /// Track has keyboard focus on its page
    pub focused: bool,
    /// Screen area of the lane
    pub draw_rect: Rect,
    /// Preferred lane height
    pub height: f32,
    /// Shrunk to [`COLLAPSED_TRACK_HEIGHT`] in the layout
    pub collapsed: bool,
    /// Visible sub-range used for screen mapping
    pub zoom_bounds: NormalizedRange,
    /// Where the track document is persisted
    pub file_path: Option<PathBuf>,
    /// Persist on every modification
    pub autosave: bool,
}

impl TrackCommon {
    /// Create track fields with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(),
            name: name.into(),
            enabled: true,
            hover: false,
            focused: false,
            draw_rect: Rect::NOTHING,
            height: DEFAULT_TRACK_HEIGHT,
            collapsed: false,
            zoom_bounds: NormalizedRange::FULL,
            file_path: None,
            autosave: false,
        }
    }

    /// Height the lane takes in the layout
    pub fn lane_height(&self) -> f32 {
        if self.collapsed {
            COLLAPSED_TRACK_HEIGHT.min(self.height)
        } else {
            self.height
        }
    }

    /// Whether `event` lands inside the lane
    pub fn contains(&self, event: &PointerEvent) -> bool {
        self.draw_rect.contains(event.pos)
    }
}

/// Modal input requests raised by tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalRequest {
    /// Capture all input until dismissed
    Present(TrackId),
    /// Release captured input
    Dismiss(TrackId),
}

/// What tracks report back to the timeline while handling a call
#[derive(Debug, Default)]
pub struct Feedback {
    modified: IndexSet<TrackId>,
    modal: Option<ModalRequest>,
    playhead: Option<u64>,
    hover_time: Option<u64>,
}

impl Feedback {
    /// Create empty feedback
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a track changed its data
    pub fn mark_modified(&mut self, id: TrackId) {
        self.modified.insert(id);
    }

    /// Ask for exclusive input
    pub fn present_modal(&mut self, id: TrackId) {
        self.modal = Some(ModalRequest::Present(id));
    }

    /// Give exclusive input back
    pub fn dismiss_modal(&mut self, id: TrackId) {
        self.modal = Some(ModalRequest::Dismiss(id));
    }

    /// Whether `id` was marked modified
    pub fn was_modified(&self, id: TrackId) -> bool {
        self.modified.contains(&id)
    }

    /// Drain modified tracks in the order they were first marked
    pub fn take_modified(&mut self) -> Vec<TrackId> {
        self.modified.drain(..).collect()
    }

    /// Take the pending modal request
    pub fn take_modal(&mut self) -> Option<ModalRequest> {
        self.modal.take()
    }

    /// Ask for the playhead to move to a time in milliseconds
    pub fn move_playhead(&mut self, millis: u64) {
        self.playhead = Some(millis);
    }

    /// Take the pending playhead move
    pub fn take_playhead(&mut self) -> Option<u64> {
        self.playhead.take()
    }

    /// Mark a time on the ticker
    pub fn set_hover_time(&mut self, millis: u64) {
        self.hover_time = Some(millis);
    }

    /// Take the pending ticker mark
    pub fn take_hover_time(&mut self) -> Option<u64> {
        self.hover_time.take()
    }
}

/// Timeline state lent to a track for one call
pub struct TrackContext<'a> {
    /// Total duration in seconds
    pub duration_seconds: f64,
    /// Playhead in milliseconds
    pub current_millis: u64,
    /// Whether the timeline is playing
    pub is_playing: bool,
    /// Frame rate converter
    pub timecode: Timecode,
    /// BPM that dragged items snap to
    pub snap_bpm: Option<f64>,
    /// Whether dragged items snap to other items
    pub snap_to_keyframes: bool,
    /// Times of items that dragged items snap to, collected by the page
    pub snap_points: &'a [u64],
    /// Whether the playhead follows a dragged item
    pub move_playhead_on_drag: bool,
    /// Spans the playhead crossed since the previous update
    pub playhead_travel: &'a [PlayheadSpan],
    /// Where tracks publish notifications
    pub events: &'a EventSink,
    /// Changes reported back to the timeline
    pub feedback: &'a mut Feedback,
}

impl TrackContext<'_> {
    /// Screen mapping for a track's lane
    pub fn mapping(&self, common: &TrackCommon) -> ScreenMapping {
        ScreenMapping::new(self.duration_seconds, common.draw_rect, common.zoom_bounds)
    }

    /// Total duration in milliseconds
    pub fn duration_millis(&self) -> u64 {
        (self.duration_seconds * 1000.0).round() as u64
    }

    /// Clamp a millisecond time into the duration
    pub fn clamp_time(&self, millis: i64) -> u64 {
        millis.clamp(0, self.duration_millis() as i64) as u64
    }

    /// Clamp a millisecond time into the duration, snapping when enabled
    pub fn settle_time(&self, millis: i64) -> u64 {
        let clamped = self.clamp_time(millis);
        match self.snap_bpm {
            Some(bpm) => quantize_to_bpm(clamped, bpm, SNAP_STEPS).min(self.duration_millis()),
            None => clamped,
        }
    }

    /// Snap point closest to `millis` within [`SNAP_DISTANCE`] pixels
    pub fn snap_point_near(&self, millis: i64, mapping: &ScreenMapping) -> Option<u64> {
        let x = mapping.millis_to_screen_x(millis);
        self.snap_points
            .iter()
            .map(|&point| (point, (mapping.millis_to_screen_x(point as i64) - x).abs()))
            .filter(|(_, distance)| *distance <= SNAP_DISTANCE)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(point, _)| point)
    }

    /// Shorter-lived copy for a nested call, so fields can be swapped
    pub fn reborrow(&mut self) -> TrackContext<'_> {
        TrackContext {
            duration_seconds: self.duration_seconds,
            current_millis: self.current_millis,
            is_playing: self.is_playing,
            timecode: self.timecode,
            snap_bpm: self.snap_bpm,
            snap_to_keyframes: self.snap_to_keyframes,
            snap_points: self.snap_points,
            move_playhead_on_drag: self.move_playhead_on_drag,
            playhead_travel: self.playhead_travel,
            events: self.events,
            feedback: &mut *self.feedback,
        }
    }
}

/// Playback authority a track can take over from the timeline clock
pub trait TimeControl {
    /// Start playback
    fn play(&mut self);

    /// Stop playback
    fn stop(&mut self);

    /// Whether playback is running
    fn is_playing(&self) -> bool;

    /// Playback position in seconds
    fn current_time(&self) -> f64;

    /// Move the playback position
    fn set_current_time(&mut self, seconds: f64);

    /// Toggle playback, returning the new state
    fn toggle_play(&mut self) -> bool {
        if self.is_playing() {
            self.stop();
        } else {
            self.play();
        }
        self.is_playing()
    }
}

/// One lane of time-indexed data
///
/// Tracks never hold references to their page or timeline. Everything they
/// need for a call arrives in the [`TrackContext`], and everything they need
/// to report goes into its [`Feedback`].
pub trait Track: Send {
    /// Shared fields
    fn common(&self) -> &TrackCommon;

    /// Shared fields, mutable
    fn common_mut(&mut self) -> &mut TrackCommon;

    /// Kind of track
    fn kind(&self) -> TrackKind;

    /// Snapshot the dataset for the undo stack
    fn serialize_state(&self) -> Result<StateBuffer>;

    /// Replace the dataset from an undo snapshot
    fn restore_state(&mut self, buffer: &StateBuffer) -> Result<()>;

    /// Dataset as a persisted document
    fn to_document(&self) -> Result<String>;

    /// Replace the dataset from a persisted document
    fn load_document(&mut self, document: &str) -> Result<()>;

    /// Remove every item
    fn clear(&mut self);

    /// Number of selected items
    fn selected_item_count(&self) -> usize {
        0
    }

    /// Time of the first item
    fn earliest_time(&self) -> Option<u64> {
        None
    }

    /// Time of the last item
    fn latest_time(&self) -> Option<u64> {
        None
    }

    /// Time of the first selected item
    fn earliest_selected_time(&self) -> Option<u64> {
        None
    }

    /// Time of the last selected item
    fn latest_selected_time(&self) -> Option<u64> {
        None
    }

    /// Add the times of unselected items that others may snap to
    fn snap_points(&self, _points: &mut Vec<u64>) {}

    /// Select every item
    fn select_all(&mut self) {}

    /// Clear the selection
    fn unselect_all(&mut self) {}

    /// Move selected items. `nudge.x` is a fraction of the duration,
    /// `nudge.y` a fraction of the value range.
    fn nudge_by(&mut self, _nudge: Vec2, _ctx: &mut TrackContext<'_>) {}

    /// Serialized copies of the selected items
    fn copy_request(&self) -> Vec<String> {
        Vec::new()
    }

    /// Remove the selected items, returning their serialized copies
    fn cut_request(&mut self, _ctx: &mut TrackContext<'_>) -> Vec<String> {
        Vec::new()
    }

    /// Insert pasteboard items at the playhead
    fn paste_sent(&mut self, _items: &[String], _ctx: &mut TrackContext<'_>) {}

    /// Pointer pressed. Returns whether the event was consumed.
    fn pointer_pressed(&mut self, _event: &PointerEvent, _ctx: &mut TrackContext<'_>) -> bool {
        false
    }

    /// Pointer moved with no button held
    fn pointer_moved(&mut self, _event: &PointerEvent, _ctx: &mut TrackContext<'_>) -> bool {
        false
    }

    /// Pointer moved with a button held
    fn pointer_dragged(&mut self, _event: &PointerEvent, _ctx: &mut TrackContext<'_>) -> bool {
        false
    }

    /// Pointer released
    fn pointer_released(&mut self, _event: &PointerEvent, _ctx: &mut TrackContext<'_>) -> bool {
        false
    }

    /// Key pressed while the track has focus or holds modal input
    fn key_pressed(&mut self, _event: &KeyEvent, _ctx: &mut TrackContext<'_>) -> bool {
        false
    }

    /// Per-tick update
    fn update(&mut self, _ctx: &mut TrackContext<'_>) {}

    /// Playback authority, for tracks that can drive time
    fn time_control(&mut self) -> Option<&mut dyn TimeControl> {
        None
    }

    /// Playback authority, read-only
    fn time_control_ref(&self) -> Option<&dyn TimeControl> {
        None
    }

    /// Downcast support for kind-specific queries
    fn as_any(&self) -> &dyn Any;

    /// Downcast support for kind-specific edits
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Track ID
    fn id(&self) -> TrackId {
        self.common().id
    }

    /// Track name
    fn name(&self) -> &str {
        &self.common().name
    }

    /// Whether the pointer is over the lane
    fn is_hovering(&self) -> bool {
        self.common().hover
    }

    /// Whether the lane has focus
    fn has_focus(&self) -> bool {
        self.common().focused
    }

    /// Whether the undo engine should snapshot this track when a gesture begins
    fn is_undo_candidate(&self) -> bool {
        self.selected_item_count() > 0 || self.is_hovering() || self.has_focus()
    }

    /// Write the track document to its file path
    fn save(&self) -> Result<()> {
        let path = self
            .common()
            .file_path
            .as_ref()
            .ok_or_else(|| TimelineError::NoFilePath(self.name().to_string()))?;
        state::write_document(&self.to_document()?, path)?;
        tracing::debug!("Saved track '{}' to {:?}", self.name(), path);
        Ok(())
    }

    /// Read the track document from its file path. A missing file leaves
    /// the track empty.
    fn load(&mut self) -> Result<()> {
        let path = self
            .common()
            .file_path
            .clone()
            .ok_or_else(|| TimelineError::NoFilePath(self.name().to_string()))?;
        if !path.exists() {
            tracing::debug!("No saved data for track '{}' at {:?}", self.name(), path);
            return Ok(());
        }
        let document = state::read_document(&path)?;
        self.load_document(&document)?;
        tracing::debug!("Loaded track '{}' from {:?}", self.name(), path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::{pos2, vec2};

    #[test]
    fn test_feedback_deduplicates() {
        let mut feedback = Feedback::new();
        let a = TrackId::new();
        let b = TrackId::new();
        feedback.mark_modified(a);
        feedback.mark_modified(b);
        feedback.mark_modified(a);
        assert!(feedback.was_modified(b));
        assert_eq!(feedback.take_modified(), vec![a, b]);
        assert!(feedback.take_modified().is_empty());
    }

    #[test]
    fn test_modal_request_last_wins() {
        let mut feedback = Feedback::new();
        let id = TrackId::new();
        feedback.present_modal(id);
        feedback.dismiss_modal(id);
        assert_eq!(feedback.take_modal(), Some(ModalRequest::Dismiss(id)));
        assert_eq!(feedback.take_modal(), None);
    }

    #[test]
    fn test_context_settle_time() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let mut ctx = TrackContext {
            duration_seconds: 2.0,
            current_millis: 0,
            is_playing: false,
            timecode: Timecode::default(),
            snap_bpm: None,
            snap_to_keyframes: false,
            snap_points: &[],
            move_playhead_on_drag: false,
            playhead_travel: &[],
            events: &events,
            feedback: &mut feedback,
        };
        assert_eq!(ctx.settle_time(-10), 0);
        assert_eq!(ctx.settle_time(2500), 2000);
        assert_eq!(ctx.settle_time(130), 130);

        ctx.snap_bpm = Some(120.0);
        assert_eq!(ctx.settle_time(130), 125);

        let mut common = TrackCommon::new("lane");
        common.draw_rect = Rect::from_min_size(pos2(0.0, 0.0), vec2(200.0, 50.0));
        assert_eq!(ctx.mapping(&common).screen_x_to_millis(100.0), 1000);
    }

    #[test]
    fn test_snap_point_within_distance() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let points = [1000, 1300];
        let ctx = TrackContext {
            duration_seconds: 10.0,
            current_millis: 0,
            is_playing: false,
            timecode: Timecode::default(),
            snap_bpm: None,
            snap_to_keyframes: true,
            snap_points: &points,
            move_playhead_on_drag: false,
            playhead_travel: &[],
            events: &events,
            feedback: &mut feedback,
        };
        // 1000px over 10 seconds: 12px is 120ms
        let mapping = ScreenMapping::new(
            10.0,
            Rect::from_min_size(pos2(0.0, 0.0), vec2(1000.0, 50.0)),
            NormalizedRange::FULL,
        );
        assert_eq!(ctx.snap_point_near(1090, &mapping), Some(1000));
        assert_eq!(ctx.snap_point_near(1200, &mapping), Some(1300));
        assert_eq!(ctx.snap_point_near(1150, &mapping), None);
        assert_eq!(ctx.snap_point_near(5000, &mapping), None);
    }

    #[test]
    fn test_feedback_playhead_and_hover() {
        let mut feedback = Feedback::new();
        feedback.move_playhead(100);
        feedback.move_playhead(250);
        feedback.set_hover_time(40);
        assert_eq!(feedback.take_playhead(), Some(250));
        assert_eq!(feedback.take_playhead(), None);
        assert_eq!(feedback.take_hover_time(), Some(40));
        assert_eq!(feedback.take_hover_time(), None);
    }

    #[test]
    fn test_collapsed_lane_height() {
        let mut common = TrackCommon::new("lane");
        assert_eq!(common.lane_height(), DEFAULT_TRACK_HEIGHT);
        common.collapsed = true;
        assert_eq!(common.lane_height(), COLLAPSED_TRACK_HEIGHT);
    }
}
