// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pages: named, ordered stacks of tracks.
//!
//! A page exclusively owns its tracks. Insertion order is stacking order,
//! top to bottom.

use crate::error::Result;
use crate::input::{KeyEvent, PointerEvent};
use crate::range::NormalizedRange;
use crate::state::file_name_for;
use crate::track::{Track, TrackContext, TrackId};
use egui::{Pos2, Rect, Vec2};
use std::path::Path;

/// A tab of the timeline
pub struct Page {
    name: String,
    tracks: Vec<Box<dyn Track>>,
    focused: Option<TrackId>,
    origin: Pos2,
    width: f32,
    zoom_bounds: NormalizedRange,
    snap_points: Vec<u64>,
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("name", &self.name)
            .field("tracks", &self.tracks.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("focused", &self.focused)
            .finish_non_exhaustive()
    }
}

impl Page {
    /// Create an empty page
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: Vec::new(),
            focused: None,
            origin: Pos2::ZERO,
            width: 0.0,
            zoom_bounds: NormalizedRange::FULL,
            snap_points: Vec::new(),
        }
    }

    /// Page name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the page
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // Track management

    /// Append a track at the bottom of the stack
    pub fn add_track(&mut self, mut track: Box<dyn Track>) -> TrackId {
        let id = track.id();
        track.common_mut().zoom_bounds = self.zoom_bounds;
        tracing::debug!("Page '{}' added track '{}'", self.name, track.name());
        self.tracks.push(track);
        self.recalculate_layout();
        id
    }

    /// Remove a track, handing it back
    pub fn remove_track(&mut self, id: TrackId) -> Option<Box<dyn Track>> {
        let idx = self.index_of(id)?;
        if self.focused == Some(id) {
            self.focused = None;
        }
        let track = self.tracks.remove(idx);
        self.recalculate_layout();
        Some(track)
    }

    /// Move a track to the top of the stack
    pub fn bring_track_to_top(&mut self, id: TrackId) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let track = self.tracks.remove(idx);
        self.tracks.insert(0, track);
        self.recalculate_layout();
        true
    }

    /// Move a track to the bottom of the stack
    pub fn bring_track_to_bottom(&mut self, id: TrackId) -> bool {
        let Some(idx) = self.index_of(id) else {
            return false;
        };
        let track = self.tracks.remove(idx);
        self.tracks.push(track);
        self.recalculate_layout();
        true
    }

    fn index_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| t.id() == id)
    }

    /// Whether the page holds a track with this ID
    pub fn contains(&self, id: TrackId) -> bool {
        self.index_of(id).is_some()
    }

    /// Get a track by name
    pub fn track(&self, name: &str) -> Option<&dyn Track> {
        self.tracks.iter().find(|t| t.name() == name).map(|t| t.as_ref())
    }

    /// Get a mutable track by name
    pub fn track_mut(&mut self, name: &str) -> Option<&mut dyn Track> {
        match self.tracks.iter_mut().find(|t| t.name() == name) {
            Some(track) => Some(track.as_mut()),
            None => None,
        }
    }

    /// Get a track by ID
    pub fn track_by_id(&self, id: TrackId) -> Option<&dyn Track> {
        self.tracks.iter().find(|t| t.id() == id).map(|t| t.as_ref())
    }

    /// Get a mutable track by ID
    pub fn track_by_id_mut(&mut self, id: TrackId) -> Option<&mut dyn Track> {
        match self.tracks.iter_mut().find(|t| t.id() == id) {
            Some(track) => Some(track.as_mut()),
            None => None,
        }
    }

    /// Tracks, top to bottom
    pub fn tracks(&self) -> impl Iterator<Item = &dyn Track> {
        self.tracks.iter().map(|t| t.as_ref())
    }

    /// Tracks, top to bottom, mutable
    pub fn tracks_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Track>> {
        self.tracks.iter_mut()
    }

    /// Number of tracks
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Focused track ID
    pub fn focused_track(&self) -> Option<TrackId> {
        self.focused
    }

    /// Focused track, mutable
    pub fn focused_track_mut(&mut self) -> Option<&mut dyn Track> {
        let id = self.focused?;
        self.track_by_id_mut(id)
    }

    fn set_focus(&mut self, id: Option<TrackId>) {
        self.focused = id;
        for track in &mut self.tracks {
            let common = track.common_mut();
            common.focused = Some(common.id) == id;
        }
    }

    // Layout

    /// Place the page at `origin` with the given width
    pub fn set_container(&mut self, origin: Pos2, width: f32) {
        self.origin = origin;
        self.width = width;
        self.recalculate_layout();
    }

    /// Stack track rects below the container origin
    pub fn recalculate_layout(&mut self) {
        let mut y = self.origin.y;
        for track in &mut self.tracks {
            let common = track.common_mut();
            let height = common.lane_height();
            common.draw_rect = Rect::from_min_size(Pos2::new(self.origin.x, y), Vec2::new(self.width, height));
            y += height;
        }
    }

    /// Total height of the stacked tracks
    pub fn height(&self) -> f32 {
        self.tracks.iter().map(|t| t.common().lane_height()).sum()
    }

    /// Shrink every track to its collapsed height
    pub fn collapse_all_tracks(&mut self) {
        for track in &mut self.tracks {
            track.common_mut().collapsed = true;
        }
        self.recalculate_layout();
    }

    /// Give every track its full height back
    pub fn expand_all_tracks(&mut self) {
        for track in &mut self.tracks {
            track.common_mut().collapsed = false;
        }
        self.recalculate_layout();
    }

    /// Area covered by the page
    pub fn draw_rect(&self) -> Rect {
        Rect::from_min_size(self.origin, Vec2::new(self.width, self.height()))
    }

    /// Visible sub-range applied to every track
    pub fn zoom_bounds(&self) -> NormalizedRange {
        self.zoom_bounds
    }

    /// Propagate a new viewport to every track
    pub fn set_zoom_bounds(&mut self, bounds: NormalizedRange) {
        self.zoom_bounds = bounds;
        for track in &mut self.tracks {
            track.common_mut().zoom_bounds = bounds;
        }
    }

    // Aggregates

    /// Selected items across all tracks
    pub fn selected_item_count(&self) -> usize {
        self.tracks.iter().map(|t| t.selected_item_count()).sum()
    }

    /// Earliest item time across all tracks
    pub fn earliest_time(&self) -> Option<u64> {
        self.tracks.iter().filter_map(|t| t.earliest_time()).min()
    }

    /// Latest item time across all tracks
    pub fn latest_time(&self) -> Option<u64> {
        self.tracks.iter().filter_map(|t| t.latest_time()).max()
    }

    /// Earliest selected item time across all tracks
    pub fn earliest_selected_time(&self) -> Option<u64> {
        self.tracks.iter().filter_map(|t| t.earliest_selected_time()).min()
    }

    /// Latest selected item time across all tracks
    pub fn latest_selected_time(&self) -> Option<u64> {
        self.tracks.iter().filter_map(|t| t.latest_selected_time()).max()
    }

    // Editing

    /// Select every item on every track
    pub fn select_all(&mut self) {
        for track in &mut self.tracks {
            track.select_all();
        }
    }

    /// Clear every track's selection
    pub fn unselect_all(&mut self) {
        for track in &mut self.tracks {
            track.unselect_all();
        }
    }

    /// Nudge selected items on every track
    pub fn nudge_by(&mut self, nudge: Vec2, ctx: &mut TrackContext<'_>) {
        for track in &mut self.tracks {
            track.nudge_by(nudge, ctx);
        }
    }

    /// Copies of every track's selection
    pub fn copy_request(&self) -> Vec<String> {
        self.tracks.iter().flat_map(|t| t.copy_request()).collect()
    }

    /// Cut every track's selection
    pub fn cut_request(&mut self, ctx: &mut TrackContext<'_>) -> Vec<String> {
        let mut items = Vec::new();
        for track in &mut self.tracks {
            items.extend(track.cut_request(ctx));
        }
        items
    }

    /// Paste into the focused track
    pub fn paste_sent(&mut self, items: &[String], ctx: &mut TrackContext<'_>) {
        if let Some(track) = self.focused_track_mut() {
            track.paste_sent(items, ctx);
        }
    }

    // Input

    /// Pointer pressed: focus moves to the track under the pointer, which
    /// gets the event. Other tracks lose their selection unless shift is held.
    pub fn pointer_pressed(&mut self, event: &PointerEvent, ctx: &mut TrackContext<'_>) -> bool {
        let hit = self
            .tracks
            .iter()
            .find(|t| t.common().contains(event))
            .map(|t| t.id());
        self.set_focus(hit);

        let mut consumed = false;
        for track in &mut self.tracks {
            if Some(track.id()) == hit {
                consumed |= track.pointer_pressed(event, ctx);
            } else if !event.modifiers.shift {
                track.unselect_all();
            }
        }

        self.snap_points.clear();
        if consumed && ctx.snap_to_keyframes {
            for track in &self.tracks {
                track.snap_points(&mut self.snap_points);
            }
            self.snap_points.sort_unstable();
            self.snap_points.dedup();
        }
        consumed
    }

    /// Times dragged items snap to during the current press
    pub fn snap_points(&self) -> &[u64] {
        &self.snap_points
    }

    /// Pointer moved: refresh hover flags
    pub fn pointer_moved(&mut self, event: &PointerEvent, ctx: &mut TrackContext<'_>) -> bool {
        let mut consumed = false;
        for track in &mut self.tracks {
            let hover = track.common().contains(event);
            track.common_mut().hover = hover;
            if hover {
                consumed |= track.pointer_moved(event, ctx);
            }
        }
        consumed
    }

    /// Pointer dragged: goes to the focused track, along with the snap
    /// points collected on press
    pub fn pointer_dragged(&mut self, event: &PointerEvent, ctx: &mut TrackContext<'_>) -> bool {
        let Some(id) = self.focused else {
            return false;
        };
        let mut ctx = ctx.reborrow();
        ctx.snap_points = &self.snap_points;
        match self.tracks.iter_mut().find(|t| t.id() == id) {
            Some(track) => track.pointer_dragged(event, &mut ctx),
            None => false,
        }
    }

    /// Pointer released: goes to the focused track
    pub fn pointer_released(&mut self, event: &PointerEvent, ctx: &mut TrackContext<'_>) -> bool {
        self.snap_points.clear();
        match self.focused_track_mut() {
            Some(track) => track.pointer_released(event, ctx),
            None => false,
        }
    }

    /// Key pressed: goes to the focused track
    pub fn key_pressed(&mut self, event: &KeyEvent, ctx: &mut TrackContext<'_>) -> bool {
        match self.focused_track_mut() {
            Some(track) => track.key_pressed(event, ctx),
            None => false,
        }
    }

    /// Pointer entered the timeline
    pub fn timeline_gained_focus(&mut self) {
        tracing::trace!("Page '{}' gained focus", self.name);
    }

    /// Pointer left the timeline: drop focus, hover and selection
    pub fn timeline_lost_focus(&mut self) {
        self.set_focus(None);
        for track in &mut self.tracks {
            track.common_mut().hover = false;
            track.unselect_all();
        }
    }

    /// Per-tick update for every track
    pub fn update(&mut self, ctx: &mut TrackContext<'_>) {
        for track in &mut self.tracks {
            track.update(ctx);
        }
    }

    // Persistence

    /// Save every track that has a file path. Every track is attempted;
    /// the first error is returned.
    pub fn save(&self) -> Result<()> {
        let mut first_error = None;
        for track in self.tracks.iter().filter(|t| t.common().file_path.is_some()) {
            if let Err(e) = track.save() {
                tracing::error!("Failed to save track '{}': {}", track.name(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Point every track at `<folder>/<timeline>_<track>.ron` and load it
    pub fn load_tracks_from_folder(&mut self, folder: &Path, timeline_name: &str) -> Result<()> {
        let mut first_error = None;
        for track in &mut self.tracks {
            let path = folder.join(file_name_for(timeline_name, track.name()));
            track.common_mut().file_path = Some(path);
            if let Err(e) = track.load() {
                tracing::error!("Failed to load track '{}': {}", track.name(), e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Remove every item from every track
    pub fn clear(&mut self) {
        for track in &mut self.tracks {
            track.clear();
        }
    }
}

/// Track lookup across pages by ID
pub trait TrackLookup {
    /// Find a track on any page
    fn find_track(&self, id: TrackId) -> Option<&dyn Track>;

    /// Find a mutable track on any page
    fn find_track_mut(&mut self, id: TrackId) -> Option<&mut dyn Track>;
}

impl TrackLookup for [Page] {
    fn find_track(&self, id: TrackId) -> Option<&dyn Track> {
        self.iter().find_map(|page| page.track_by_id(id))
    }

    fn find_track_mut(&mut self, id: TrackId) -> Option<&mut dyn Track> {
        self.iter_mut().find_map(|page| page.track_by_id_mut(id))
    }
}
