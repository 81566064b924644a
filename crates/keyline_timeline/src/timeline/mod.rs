// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline coordinator.
//!
//! [`Timeline`] is the aggregate root. It owns the pages (which own the
//! tracks), the undo engine, the playback clock, the zoom controller and
//! the fixed controls, and routes every input event to them.
//!
//! Track factories and lookups live in `tracks`, input routing in
//! `dispatch`.

mod dispatch;
mod tracks;

use crate::clock::{LoopMode, PlaybackClock, PlaybackState, PlayheadSpan, SystemTimeSource, TimeSource};
use crate::config::TimelineSettings;
use crate::controls::{InOutControl, PageTabs, Ticker};
use crate::error::{Result, TimelineError};
use crate::events::{EventSink, TimelineEvent};
use crate::mapping::ScreenMapping;
use crate::page::{Page, TrackLookup};
use crate::range::NormalizedRange;
use crate::state::file_name_for;
use crate::timecode::{quantize_to_bpm, Timecode};
use crate::track::{Feedback, ModalRequest, TimeControl, Track, TrackContext, TrackId};
use crate::undo::{UndoEngine, UndoStats};
use crate::zoom::ZoomController;
use egui::{pos2, vec2, Pos2, Rect, Vec2};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// Height of the page tab strip when there is more than one page
pub const TAB_HEIGHT: f32 = 18.0;

/// Height of the time ruler
pub const TICKER_HEIGHT: f32 = 27.0;

/// Height of the in/out bar
pub const INOUT_HEIGHT: f32 = 7.0;

/// Height of the zoom bar
pub const ZOOMER_HEIGHT: f32 = 14.0;

/// Page created by [`Timeline::setup`] and [`Timeline::reset`]
pub const FIRST_PAGE_NAME: &str = "Page One";

/// Timeline values lent to tracks for one call
#[derive(Debug, Clone, Copy)]
struct ContextValues {
    duration_seconds: f64,
    current_millis: u64,
    is_playing: bool,
    timecode: Timecode,
    snap_bpm: Option<f64>,
    snap_to_keyframes: bool,
    move_playhead_on_drag: bool,
}

impl ContextValues {
    fn context<'a>(&self, events: &'a EventSink, feedback: &'a mut Feedback) -> TrackContext<'a> {
        TrackContext {
            duration_seconds: self.duration_seconds,
            current_millis: self.current_millis,
            is_playing: self.is_playing,
            timecode: self.timecode,
            snap_bpm: self.snap_bpm,
            snap_to_keyframes: self.snap_to_keyframes,
            snap_points: &[],
            move_playhead_on_drag: self.move_playhead_on_drag,
            playhead_travel: &[],
            events,
            feedback,
        }
    }
}

/// The timeline: pages of tracks, playback, zoom and undo
pub struct Timeline {
    settings: TimelineSettings,
    pages: Vec<Page>,
    current_page: Option<usize>,
    /// Track name to index of the page holding it
    track_pages: IndexMap<String, usize>,
    undo: UndoEngine,
    clock: PlaybackClock,
    zoom: ZoomController,
    tabs: PageTabs,
    in_out: InOutControl,
    ticker: Ticker,
    events: EventSink,
    feedback: Feedback,
    modal: Option<TrackId>,
    time_control: Option<TrackId>,
    draw_rect: Rect,
    has_focus: bool,
    is_setup: bool,
    showing: bool,
    unsaved: bool,
    user_changed_value: bool,
    key_gesture_open: bool,
    pasteboard: Vec<String>,
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("name", &self.settings.name)
            .field("pages", &self.pages)
            .field("current_page", &self.current_page)
            .field("clock", &self.clock)
            .field("modal", &self.modal)
            .field("time_control", &self.time_control)
            .finish_non_exhaustive()
    }
}

impl Timeline {
    /// Create a timeline driven by system time. Call [`Self::setup`]
    /// before adding tracks.
    pub fn new(settings: TimelineSettings) -> Self {
        Self::with_time_source(settings, Arc::new(SystemTimeSource::new()))
    }

    /// Create a timeline whose clock reads a custom time source
    pub fn with_time_source(settings: TimelineSettings, source: Arc<dyn TimeSource>) -> Self {
        let events = EventSink::new();

        let clock = PlaybackClock::with_time_source(events.clone(), source);
        if clock.set_duration(settings.duration_seconds).is_err() {
            tracing::warn!("Keeping default duration of {}s", clock.duration());
        }
        clock.set_frame_rate(settings.frame_rate);
        clock.set_frame_based(settings.frame_based);
        clock.set_loop_mode(settings.loop_mode);

        let mut undo = UndoEngine::new(settings.max_undo_depth);
        undo.set_enabled(settings.undo_enabled);

        Self {
            zoom: ZoomController::new(events.clone()),
            settings,
            pages: Vec::new(),
            current_page: None,
            track_pages: IndexMap::new(),
            undo,
            clock,
            tabs: PageTabs::new(),
            in_out: InOutControl::new(),
            ticker: Ticker::new(),
            events,
            feedback: Feedback::new(),
            modal: None,
            time_control: None,
            draw_rect: Rect::NOTHING,
            has_focus: false,
            is_setup: false,
            showing: true,
            unsaved: false,
            user_changed_value: false,
            key_gesture_open: false,
            pasteboard: Vec::new(),
        }
    }

    /// Create the first page, restore the in/out range and viewport from
    /// the working folder, and lay everything out
    pub fn setup(&mut self) {
        if self.is_setup {
            tracing::warn!("Timeline '{}' is already set up", self.settings.name);
            return;
        }
        self.is_setup = true;

        if let Err(e) = self.add_page(FIRST_PAGE_NAME) {
            tracing::error!("Failed to create first page: {}", e);
        }
        self.setup_standard_elements();

        if self.settings.threaded_playback {
            self.move_to_thread();
        }
        self.recalculate_bounding_rects();
        tracing::info!("Timeline '{}' set up", self.settings.name);
    }

    /// Whether [`Self::setup`] has run
    pub fn is_setup(&self) -> bool {
        self.is_setup
    }

    fn setup_standard_elements(&mut self) {
        let folder = self.settings.working_folder.clone();

        self.in_out
            .set_file_path(Some(folder.join(file_name_for(&self.settings.name, "inout"))));
        match self.in_out.load() {
            Ok(Some(range)) => {
                if let Err(e) = self.clock.set_in_out(range) {
                    tracing::error!("Ignoring saved in/out range: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Failed to load in/out range: {}", e),
        }

        self.zoom
            .set_file_path(Some(folder.join(file_name_for(&self.settings.name, "zoomer"))));
        if let Err(e) = self.zoom.load() {
            tracing::error!("Failed to load zoom range: {}", e);
        }
        self.sync_zoom_bounds();
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> TimelineSettings {
        TimelineSettings {
            duration_seconds: self.clock.duration(),
            frame_rate: self.clock.timecode().fps(),
            frame_based: self.clock.is_frame_based(),
            loop_mode: self.clock.loop_mode(),
            undo_enabled: self.undo.is_enabled(),
            max_undo_depth: self.undo.max_depth(),
            threaded_playback: self.clock.is_threaded(),
            ..self.settings.clone()
        }
    }

    /// Timeline name
    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Rename the timeline. Persisted file names follow the new name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        let name = name.into();
        if name != self.settings.name {
            self.settings.name = name;
            if self.is_setup {
                self.setup_standard_elements();
            }
        }
    }

    /// Folder persisted files live in
    pub fn working_folder(&self) -> &Path {
        &self.settings.working_folder
    }

    /// Move persistence to another folder, reloading the in/out range and
    /// viewport from it
    pub fn set_working_folder(&mut self, folder: impl Into<PathBuf>) {
        self.settings.working_folder = folder.into();
        if self.is_setup {
            self.setup_standard_elements();
        }
    }

    // Events

    /// Register a listener for timeline events
    pub fn subscribe(&self) -> Receiver<TimelineEvent> {
        self.events.subscribe()
    }

    /// Event sink shared with the clock and zoom controller
    pub fn events(&self) -> &EventSink {
        &self.events
    }

    // Pages

    /// Add a page and make it current. Empty and duplicate names are rejected.
    pub fn add_page(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            tracing::error!("Cannot add page with an empty name");
            return Err(TimelineError::EmptyPageName);
        }
        if self.pages.iter().any(|p| p.name() == name) {
            tracing::error!("Page '{}' already exists", name);
            return Err(TimelineError::DuplicatePage(name.to_string()));
        }

        let mut page = Page::new(name);
        page.set_zoom_bounds(self.zoom.view_range());
        self.pages.push(page);
        tracing::info!("Added page '{}'", name);
        self.select_page(self.pages.len() - 1);
        Ok(())
    }

    /// Rename the current page
    pub fn set_page_name(&mut self, name: &str) -> Result<()> {
        let index = self.current_page.ok_or(TimelineError::NotSetUp)?;
        self.set_page_name_at(index, name)
    }

    /// Rename the page at `index`
    pub fn set_page_name_at(&mut self, index: usize, name: &str) -> Result<()> {
        if index >= self.pages.len() {
            tracing::error!("Page index {} out of bounds", index);
            return Err(TimelineError::PageIndexOutOfBounds(index));
        }
        if name.is_empty() {
            tracing::error!("Cannot rename page to an empty name");
            return Err(TimelineError::EmptyPageName);
        }
        if self.pages.iter().enumerate().any(|(i, p)| i != index && p.name() == name) {
            tracing::error!("Page '{}' already exists", name);
            return Err(TimelineError::DuplicatePage(name.to_string()));
        }
        self.pages[index].set_name(name);
        Ok(())
    }

    /// Switch to the page with this name
    pub fn set_current_page_by_name(&mut self, name: &str) -> Result<()> {
        match self.pages.iter().position(|p| p.name() == name) {
            Some(index) => {
                self.select_page(index);
                Ok(())
            }
            None => {
                tracing::error!("Tabbed to nonexistent page '{}'", name);
                Err(TimelineError::PageNotFound(name.to_string()))
            }
        }
    }

    /// Switch to the page at `index`
    pub fn set_current_page(&mut self, index: usize) -> Result<()> {
        if index >= self.pages.len() {
            tracing::error!("Page index {} out of bounds", index);
            return Err(TimelineError::PageIndexOutOfBounds(index));
        }
        self.select_page(index);
        Ok(())
    }

    fn select_page(&mut self, index: usize) {
        if self.current_page == Some(index) {
            return;
        }
        let previous = self.current_page.and_then(|i| self.pages.get_mut(i)).map(|page| {
            page.unselect_all();
            page.name().to_string()
        });
        self.current_page = Some(index);
        let current = self.pages[index].name().to_string();
        tracing::debug!("Current page is now '{}'", current);
        self.events.emit(TimelineEvent::PageChanged { previous, current });
        self.view_resized();
    }

    /// All pages in tab order
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Number of pages
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page that receives input and new tracks
    pub fn current_page(&self) -> Option<&Page> {
        self.current_page.and_then(|i| self.pages.get(i))
    }

    /// Current page, mutable
    pub fn current_page_mut(&mut self) -> Option<&mut Page> {
        self.current_page.and_then(|i| self.pages.get_mut(i))
    }

    /// Index of the current page
    pub fn current_page_index(&self) -> Option<usize> {
        self.current_page
    }

    // Layout

    /// Stack tabs, ticker, in/out bar, page and zoomer below the offset
    pub fn recalculate_bounding_rects(&mut self) {
        let [x, y] = self.settings.offset;
        let width = self.settings.width;

        let tab_height = if self.pages.len() > 1 { TAB_HEIGHT } else { 0.0 };
        self.tabs.set_draw_rect(Rect::from_min_size(pos2(x, y), vec2(width, tab_height)));

        let ticker_height = if self.settings.show_ticker { TICKER_HEIGHT } else { 0.0 };
        let ticker_rect = Rect::from_min_size(pos2(x, self.tabs.draw_rect().max.y), vec2(width, ticker_height));
        self.ticker.set_draw_rect(ticker_rect);

        let inout_height = if self.settings.show_inout_control { INOUT_HEIGHT } else { 0.0 };
        let inout_rect = Rect::from_min_size(pos2(x, ticker_rect.max.y), vec2(width, inout_height));
        self.in_out.set_draw_rect(inout_rect);

        let page_origin = pos2(x, inout_rect.max.y);
        for page in &mut self.pages {
            page.set_container(page_origin, width);
        }
        let page_bottom = self.current_page().map_or(page_origin.y, |p| p.draw_rect().max.y);

        let zoomer_height = if self.settings.show_zoomer { ZOOMER_HEIGHT } else { 0.0 };
        let zoomer_rect = Rect::from_min_size(pos2(x, page_bottom), vec2(width, zoomer_height));
        self.zoom.set_draw_rect(zoomer_rect);

        self.draw_rect = Rect::from_min_max(pos2(x, y), pos2(x + width, zoomer_rect.max.y));
    }

    /// Shrink every track to a thin strip
    pub fn collapse_all_tracks(&mut self) {
        for page in &mut self.pages {
            page.collapse_all_tracks();
        }
        self.view_resized();
    }

    /// Restore every track to its full height
    pub fn expand_all_tracks(&mut self) {
        for page in &mut self.pages {
            page.expand_all_tracks();
        }
        self.view_resized();
    }

    fn view_resized(&mut self) {
        self.recalculate_bounding_rects();
        self.events.emit(TimelineEvent::ViewResized);
    }

    /// Area covered by the whole timeline
    pub fn draw_rect(&self) -> Rect {
        self.draw_rect
    }

    /// Area of the page tabs
    pub fn tabs_draw_rect(&self) -> Rect {
        self.tabs.draw_rect()
    }

    /// Area of the time ruler
    pub fn ticker_draw_rect(&self) -> Rect {
        self.ticker.draw_rect()
    }

    /// Area of the in/out bar
    pub fn in_out_draw_rect(&self) -> Rect {
        self.in_out.draw_rect()
    }

    /// Area of the zoom bar
    pub fn zoomer_draw_rect(&self) -> Rect {
        self.zoom.draw_rect()
    }

    /// Width in pixels
    pub fn width(&self) -> f32 {
        self.settings.width
    }

    /// Change the width
    pub fn set_width(&mut self, width: f32) {
        if self.settings.width != width {
            self.settings.width = width;
            self.view_resized();
        }
    }

    /// Top-left corner
    pub fn offset(&self) -> Pos2 {
        let [x, y] = self.settings.offset;
        pos2(x, y)
    }

    /// Move the top-left corner
    pub fn set_offset(&mut self, offset: Pos2) {
        if self.offset() != offset {
            self.settings.offset = [offset.x, offset.y];
            self.view_resized();
        }
    }

    /// Show or hide the time ruler
    pub fn set_show_ticker(&mut self, show: bool) {
        self.settings.show_ticker = show;
        self.view_resized();
    }

    /// Show or hide the in/out bar
    pub fn set_show_inout_control(&mut self, show: bool) {
        self.settings.show_inout_control = show;
        self.view_resized();
    }

    /// Show or hide the zoom bar
    pub fn set_show_zoomer(&mut self, show: bool) {
        self.settings.show_zoomer = show;
        self.view_resized();
    }

    /// Show or hide the ruler, in/out bar and zoom bar together
    pub fn set_show_time_controls(&mut self, show: bool) {
        self.settings.show_ticker = show;
        self.settings.show_inout_control = show;
        self.settings.show_zoomer = show;
        self.view_resized();
    }

    /// Make the timeline visible
    pub fn show(&mut self) {
        self.showing = true;
    }

    /// Hide the timeline
    pub fn hide(&mut self) {
        self.showing = false;
    }

    /// Toggle visibility, returning the new state
    pub fn toggle_show(&mut self) -> bool {
        self.showing = !self.showing;
        self.showing
    }

    /// Whether the timeline is visible
    pub fn is_showing(&self) -> bool {
        self.showing
    }

    // Coordinates

    /// Mapping from the timeline's horizontal extent onto the viewport
    pub fn mapping(&self) -> ScreenMapping {
        ScreenMapping::new(self.clock.duration(), self.draw_rect, self.zoom.view_range())
    }

    /// Screen x to milliseconds
    pub fn screen_x_to_millis(&self, x: f32) -> i64 {
        self.mapping().screen_x_to_millis(x)
    }

    /// Milliseconds to screen x
    pub fn millis_to_screen_x(&self, millis: i64) -> f32 {
        self.mapping().millis_to_screen_x(millis)
    }

    /// Screen x to a normalized position
    pub fn screen_x_to_normalized(&self, x: f32) -> f64 {
        self.mapping().screen_x_to_normalized(x)
    }

    /// Normalized position to screen x
    pub fn normalized_to_screen_x(&self, normalized: f64) -> f32 {
        self.mapping().normalized_to_screen_x(normalized)
    }

    /// Arrow-key nudge as (fraction of duration, fraction of value range)
    pub fn nudge_percent(&self) -> Vec2 {
        vec2((self.zoom.view_range().span() * 0.001) as f32, 0.001)
    }

    /// Shift+arrow nudge
    pub fn big_nudge_percent(&self) -> Vec2 {
        vec2((self.zoom.view_range().span() * 0.02) as f32, 0.02)
    }

    // Zoom

    /// Visible sub-range
    pub fn view_range(&self) -> NormalizedRange {
        self.zoom.view_range()
    }

    /// Change the visible sub-range
    pub fn set_view_range(&mut self, range: NormalizedRange) -> Result<()> {
        self.zoom.set_view_range(range)?;
        self.sync_zoom_bounds();
        Ok(())
    }

    fn sync_zoom_bounds(&mut self) {
        let bounds = self.zoom.view_range();
        for page in &mut self.pages {
            page.set_zoom_bounds(bounds);
        }
    }

    // Time

    /// Current time in seconds
    pub fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    /// Current time in milliseconds
    pub fn current_time_millis(&self) -> u64 {
        (self.clock.current_time() * 1000.0).round() as u64
    }

    /// Current frame
    pub fn current_frame(&self) -> i64 {
        self.clock.current_frame()
    }

    /// Current time as a fraction of the duration
    pub fn percent_complete(&self) -> f64 {
        self.clock.percent_complete()
    }

    /// Current time as a timecode
    pub fn current_timecode(&self) -> String {
        self.clock.timecode().timecode_for_seconds(self.clock.current_time())
    }

    /// Move the playhead. The time-control track follows.
    pub fn set_current_time_seconds(&mut self, seconds: f64) {
        if let Some(control) = self.time_control_mut() {
            control.set_current_time(seconds);
        }
        self.clock.set_current_time(seconds);
    }

    /// Move the playhead to a millisecond time
    pub fn set_current_time_millis(&mut self, millis: u64) {
        self.set_current_time_seconds(millis as f64 / 1000.0);
    }

    /// Move the playhead to a frame
    pub fn set_current_frame(&mut self, frame: i64) {
        let seconds = self.clock.timecode().seconds_for_frame(frame);
        self.set_current_time_seconds(seconds);
    }

    /// Move the playhead to a fraction of the duration
    pub fn set_percent_complete(&mut self, percent: f64) {
        self.set_current_time_seconds(percent * self.clock.duration());
    }

    /// Move the playhead to a timecode. Invalid timecodes leave it in place.
    pub fn set_current_timecode(&mut self, timecode: &str) -> Result<()> {
        let seconds = self.parse_timecode(timecode)?;
        self.set_current_time_seconds(seconds);
        Ok(())
    }

    fn parse_timecode(&self, timecode: &str) -> Result<f64> {
        self.clock.timecode().seconds_for_timecode(timecode).inspect_err(|_| {
            tracing::error!("'{}' is invalid, please use the format HH:MM:SS:MLS", timecode);
        })
    }

    /// Move the playhead to the in point
    pub fn set_current_time_to_in_point(&mut self) {
        self.set_current_time_seconds(self.in_time_seconds());
    }

    /// Move the playhead to the out point
    pub fn set_current_time_to_out_point(&mut self) {
        self.set_current_time_seconds(self.out_time_seconds());
    }

    /// Format seconds as a timecode
    pub fn format_time(&self, seconds: f64) -> String {
        self.clock.timecode().timecode_for_seconds(seconds)
    }

    /// Format milliseconds as a timecode
    pub fn format_millis(&self, millis: u64) -> String {
        Timecode::timecode_for_millis(millis)
    }

    /// Snap a millisecond time to the BPM grid with `steps` divisions per measure
    pub fn quantized_time(&self, millis: u64, steps: u64) -> u64 {
        quantize_to_bpm(millis, self.settings.bpm, steps)
    }

    // In/out range

    /// In/out range
    pub fn in_out_range(&self) -> NormalizedRange {
        self.clock.in_out()
    }

    /// Set the in/out range. Inverted ranges are rejected.
    pub fn set_in_out_range(&mut self, range: NormalizedRange) -> Result<()> {
        self.clock.set_in_out(range)
    }

    /// Reset the in/out range to the whole duration
    pub fn clear_in_out(&mut self) {
        self.clock.set_in_point(0.0);
        self.clock.set_out_point(1.0);
    }

    /// Put the in point at the playhead
    pub fn set_in_point_at_playhead(&mut self) {
        self.set_in_point_at_percent(self.percent_complete());
    }

    /// Put the in point at a fraction of the duration
    pub fn set_in_point_at_percent(&mut self, percent: f64) {
        self.clock.set_in_point(percent);
    }

    /// Put the in point at a time in seconds
    pub fn set_in_point_at_seconds(&mut self, seconds: f64) {
        self.set_in_point_at_percent(seconds / self.clock.duration());
    }

    /// Put the in point at a frame
    pub fn set_in_point_at_frame(&mut self, frame: i64) {
        self.set_in_point_at_seconds(self.clock.timecode().seconds_for_frame(frame));
    }

    /// Put the in point at a millisecond time
    pub fn set_in_point_at_millis(&mut self, millis: u64) {
        self.set_in_point_at_seconds(millis as f64 / 1000.0);
    }

    /// Put the in point at a timecode
    pub fn set_in_point_at_timecode(&mut self, timecode: &str) -> Result<()> {
        let seconds = self.parse_timecode(timecode)?;
        self.set_in_point_at_seconds(seconds);
        Ok(())
    }

    /// Put the out point at the playhead
    pub fn set_out_point_at_playhead(&mut self) {
        self.set_out_point_at_percent(self.percent_complete());
    }

    /// Put the out point at a fraction of the duration
    pub fn set_out_point_at_percent(&mut self, percent: f64) {
        self.clock.set_out_point(percent);
    }

    /// Put the out point at a time in seconds
    pub fn set_out_point_at_seconds(&mut self, seconds: f64) {
        self.set_out_point_at_percent(seconds / self.clock.duration());
    }

    /// Put the out point at a frame
    pub fn set_out_point_at_frame(&mut self, frame: i64) {
        self.set_out_point_at_seconds(self.clock.timecode().seconds_for_frame(frame));
    }

    /// Put the out point at a millisecond time
    pub fn set_out_point_at_millis(&mut self, millis: u64) {
        self.set_out_point_at_seconds(millis as f64 / 1000.0);
    }

    /// Put the out point at a timecode
    pub fn set_out_point_at_timecode(&mut self, timecode: &str) -> Result<()> {
        let seconds = self.parse_timecode(timecode)?;
        self.set_out_point_at_seconds(seconds);
        Ok(())
    }

    /// In point in seconds
    pub fn in_time_seconds(&self) -> f64 {
        self.clock.in_out().min * self.clock.duration()
    }

    /// Out point in seconds
    pub fn out_time_seconds(&self) -> f64 {
        self.clock.in_out().max * self.clock.duration()
    }

    /// In point in milliseconds
    pub fn in_time_millis(&self) -> u64 {
        (self.in_time_seconds() * 1000.0).round() as u64
    }

    /// Out point in milliseconds
    pub fn out_time_millis(&self) -> u64 {
        (self.out_time_seconds() * 1000.0).round() as u64
    }

    /// In point frame
    pub fn in_frame(&self) -> i64 {
        self.clock.timecode().frame_for_seconds(self.in_time_seconds())
    }

    /// Out point frame
    pub fn out_frame(&self) -> i64 {
        self.clock.timecode().frame_for_seconds(self.out_time_seconds())
    }

    /// In point timecode
    pub fn in_point_timecode(&self) -> String {
        self.format_time(self.in_time_seconds())
    }

    /// Out point timecode
    pub fn out_point_timecode(&self) -> String {
        self.format_time(self.out_time_seconds())
    }

    // Duration

    /// Set the duration. Non-positive durations are rejected.
    pub fn set_duration_in_seconds(&mut self, seconds: f64) -> Result<()> {
        self.clock.set_duration(seconds)?;
        let range = self.zoom.view_range();
        self.set_view_range(range)
    }

    /// Set the duration in frames
    pub fn set_duration_in_frames(&mut self, frames: i64) -> Result<()> {
        self.set_duration_in_seconds(self.clock.timecode().seconds_for_frame(frames))
    }

    /// Set the duration in milliseconds
    pub fn set_duration_in_millis(&mut self, millis: u64) -> Result<()> {
        self.set_duration_in_seconds(millis as f64 / 1000.0)
    }

    /// Set the duration from a timecode. Invalid timecodes leave it unchanged.
    pub fn set_duration_in_timecode(&mut self, timecode: &str) -> Result<()> {
        let seconds = self.parse_timecode(timecode)?;
        self.set_duration_in_seconds(seconds)
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.clock.duration()
    }

    /// Duration in frames
    pub fn duration_frames(&self) -> i64 {
        self.clock.duration_frames()
    }

    /// Duration in milliseconds
    pub fn duration_millis(&self) -> u64 {
        (self.clock.duration() * 1000.0).round() as u64
    }

    /// Duration as a timecode
    pub fn duration_timecode(&self) -> String {
        self.format_time(self.clock.duration())
    }

    // Clock modes

    /// Frame rate
    pub fn frame_rate(&self) -> f64 {
        self.clock.timecode().fps()
    }

    /// Set the frame rate
    pub fn set_frame_rate(&mut self, fps: f64) {
        self.clock.set_frame_rate(fps);
    }

    /// Frame rate converter
    pub fn timecode(&self) -> Timecode {
        self.clock.timecode()
    }

    /// Whether time advances one frame per tick
    pub fn is_frame_based(&self) -> bool {
        self.clock.is_frame_based()
    }

    /// Switch between frame-based and continuous time
    pub fn set_frame_based(&mut self, frame_based: bool) {
        self.clock.set_frame_based(frame_based);
    }

    /// Loop mode
    pub fn loop_mode(&self) -> LoopMode {
        self.clock.loop_mode()
    }

    /// Set the loop mode
    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.clock.set_loop_mode(mode);
    }

    /// Playback state of the internal clock
    pub fn playback_state(&self) -> PlaybackState {
        self.clock.state()
    }

    // Transport

    /// Start playback, or hand it to the time-control track
    pub fn play(&mut self) -> bool {
        if !self.clock.is_enabled() {
            return false;
        }
        if let Some(control) = self.time_control_mut() {
            control.play();
            return control.is_playing();
        }
        self.clock.play()
    }

    /// Stop playback
    pub fn stop(&mut self) -> bool {
        if !self.clock.is_enabled() {
            return false;
        }
        if let Some(control) = self.time_control_mut() {
            let was_playing = control.is_playing();
            control.stop();
            return was_playing;
        }
        self.clock.stop()
    }

    /// Toggle playback, returning whether it is now playing
    pub fn toggle_play(&mut self) -> bool {
        if !self.clock.is_enabled() {
            return false;
        }
        if self.is_playing() {
            self.stop();
        } else {
            self.play();
        }
        self.is_playing()
    }

    /// Whether playback is running, on the clock or the time-control track
    pub fn is_playing(&self) -> bool {
        match self.time_control_ref() {
            Some(control) => control.is_playing(),
            None => self.clock.is_playing(),
        }
    }

    /// Whether the out point was reached with looping off
    pub fn is_done(&self) -> bool {
        self.clock.is_done()
    }

    fn focused_time_control(&mut self) -> Option<&mut dyn TimeControl> {
        self.current_page_mut()?.focused_track_mut()?.time_control()
    }

    /// Start the focused track's own playback
    pub fn play_selected_track(&mut self) {
        if let Some(control) = self.focused_time_control() {
            control.play();
        }
    }

    /// Stop the focused track's own playback
    pub fn stop_selected_track(&mut self) {
        if let Some(control) = self.focused_time_control() {
            control.stop();
        }
    }

    /// Toggle the focused track's own playback
    pub fn toggle_play_selected_track(&mut self) -> bool {
        if let Some(control) = self.focused_time_control() {
            control.toggle_play();
        }
        self.is_playing()
    }

    /// Enable transport and input
    pub fn enable(&mut self) {
        self.clock.set_enabled(true);
    }

    /// Stop playback and ignore transport and input until enabled
    pub fn disable(&mut self) {
        if self.clock.is_enabled() {
            self.stop();
            self.clock.set_enabled(false);
        }
    }

    /// Toggle enabled, returning the new state
    pub fn toggle_enabled(&mut self) -> bool {
        if self.clock.is_enabled() {
            self.disable();
        } else {
            self.enable();
        }
        self.clock.is_enabled()
    }

    /// Whether transport and input are honored
    pub fn is_enabled(&self) -> bool {
        self.clock.is_enabled()
    }

    /// Run the clock on its own thread. Playback stops first.
    pub fn move_to_thread(&mut self) {
        if !self.clock.is_threaded() {
            self.stop();
            self.clock.move_to_thread();
        }
    }

    /// Go back to polled updates, waiting for the clock thread to exit.
    /// Playback stops first.
    pub fn remove_from_thread(&mut self) {
        if self.clock.is_threaded() {
            self.stop();
            self.clock.remove_from_thread();
        }
    }

    /// Whether the clock thread is running
    pub fn is_on_thread(&self) -> bool {
        self.clock.is_threaded()
    }

    /// Per-frame update: advance the clock (when polled), follow the
    /// time-control track, then let tracks fire events for every span the
    /// playhead crossed since the last update
    pub fn update(&mut self) {
        if !self.is_setup {
            return;
        }
        let delegate = self
            .time_control_ref()
            .map(|control| (control.current_time(), control.is_playing()));
        let travel = match delegate {
            Some((seconds, playing)) => {
                let before = self.current_time_millis();
                self.clock.set_current_time(seconds);
                let _ = self.clock.take_travel();
                let after = self.current_time_millis();
                if playing && after > before {
                    vec![PlayheadSpan::forward(before, after)]
                } else {
                    Vec::new()
                }
            }
            None => {
                self.clock.update_time();
                self.clock.take_travel()
            }
        };

        let values = self.context_values();
        let mut ctx = values.context(&self.events, &mut self.feedback);
        ctx.playhead_travel = &travel;
        for page in &mut self.pages {
            page.update(&mut ctx);
        }
        self.process_feedback();
    }

    // Modal and time control

    /// Give a track exclusive input
    pub fn presented_modal_content(&mut self, track: TrackId) {
        tracing::debug!("Track {:?} took modal input", track);
        self.modal = Some(track);
    }

    /// Release exclusive input
    pub fn dismissed_modal_content(&mut self) {
        self.modal = None;
    }

    /// Whether a track holds exclusive input
    pub fn is_modal(&self) -> bool {
        self.modal.is_some()
    }

    /// Track holding exclusive input
    pub fn modal_track(&self) -> Option<TrackId> {
        self.modal
    }

    /// Hand playback authority to a track, or take it back with `None`.
    /// Returns whether the delegate changed.
    pub fn set_time_control_track(&mut self, track: Option<TrackId>) -> bool {
        if let Some(id) = track {
            match self.pages.find_track(id) {
                Some(t) if t.time_control_ref().is_some() => {}
                Some(t) => {
                    tracing::warn!("Track '{}' cannot control time", t.name());
                    return false;
                }
                None => {
                    tracing::error!("Couldn't find time control track {:?}", id);
                    return false;
                }
            }
        }
        self.time_control = track;
        true
    }

    /// Track holding playback authority
    pub fn time_control_track(&self) -> Option<TrackId> {
        self.time_control
    }

    fn time_control_mut(&mut self) -> Option<&mut dyn TimeControl> {
        let id = self.time_control?;
        self.pages.find_track_mut(id)?.time_control()
    }

    fn time_control_ref(&self) -> Option<&dyn TimeControl> {
        let id = self.time_control?;
        self.pages.find_track(id)?.time_control_ref()
    }

    // Track context plumbing

    fn context_values(&self) -> ContextValues {
        ContextValues {
            duration_seconds: self.clock.duration(),
            current_millis: self.current_time_millis(),
            is_playing: self.is_playing(),
            timecode: self.clock.timecode(),
            snap_bpm: self.settings.snap_to_bpm.then_some(self.settings.bpm),
            snap_to_keyframes: self.settings.snap_to_other_keyframes,
            move_playhead_on_drag: self.settings.move_playhead_on_drag,
        }
    }

    /// Run `f` on the current page with a track context, then apply
    /// whatever the tracks reported
    fn with_current_page<R>(&mut self, f: impl FnOnce(&mut Page, &mut TrackContext<'_>) -> R) -> Option<R> {
        let values = self.context_values();
        let page = self.current_page.and_then(|i| self.pages.get_mut(i))?;
        let mut ctx = values.context(&self.events, &mut self.feedback);
        let result = f(page, &mut ctx);
        self.process_feedback();
        Some(result)
    }

    /// Run `f` on one track with a track context, then apply whatever it
    /// reported
    fn with_track<R>(&mut self, id: TrackId, f: impl FnOnce(&mut dyn Track, &mut TrackContext<'_>) -> R) -> Option<R> {
        let values = self.context_values();
        let track = self.pages.find_track_mut(id)?;
        let mut ctx = values.context(&self.events, &mut self.feedback);
        let result = f(track, &mut ctx);
        self.process_feedback();
        Some(result)
    }

    fn process_feedback(&mut self) {
        for id in self.feedback.take_modified() {
            self.flag_track_modified(id);
        }
        match self.feedback.take_modal() {
            Some(ModalRequest::Present(id)) => self.presented_modal_content(id),
            Some(ModalRequest::Dismiss(id)) if self.modal == Some(id) => self.dismissed_modal_content(),
            _ => {}
        }
        if let Some(millis) = self.feedback.take_playhead() {
            self.set_current_time_millis(millis);
        }
        if let Some(millis) = self.feedback.take_hover_time() {
            self.ticker.set_hover_time(Some(millis));
        }
    }

    fn flag_track_modified(&mut self, id: TrackId) {
        self.user_changed_value = true;
        self.undo.mark_touched(id);
        self.unsaved = true;
        if self.settings.autosave {
            if let Some(track) = self.pages.find_track(id) {
                if track.common().file_path.is_some() {
                    if let Err(e) = track.save() {
                        tracing::error!("Autosave of track '{}' failed: {}", track.name(), e);
                    }
                }
            }
        }
    }

    // Undo

    /// Step back one undo frame
    pub fn undo(&mut self) -> bool {
        let restored = self.undo.undo(&mut self.pages);
        if restored {
            self.unsaved = true;
        }
        restored
    }

    /// Step forward one undo frame
    pub fn redo(&mut self) -> bool {
        let restored = self.undo.redo(&mut self.pages);
        if restored {
            self.unsaved = true;
        }
        restored
    }

    /// Turn undo recording on or off
    pub fn enable_undo(&mut self, enabled: bool) {
        self.undo.set_enabled(enabled);
    }

    /// Whether undo is recorded
    pub fn is_undo_enabled(&self) -> bool {
        self.undo.is_enabled()
    }

    /// Undo history
    pub fn undo_engine(&self) -> &UndoEngine {
        &self.undo
    }

    /// Undo history statistics
    pub fn undo_stats(&self) -> UndoStats {
        self.undo.stats()
    }

    // Editing

    /// Items copied or cut most recently
    pub fn pasteboard(&self) -> &[String] {
        &self.pasteboard
    }

    /// Selected items on the current page
    pub fn total_selected_items(&self) -> usize {
        self.current_page().map_or(0, Page::selected_item_count)
    }

    /// Earliest item time on the current page
    pub fn earliest_time(&self) -> Option<u64> {
        self.current_page()?.earliest_time()
    }

    /// Latest item time on the current page
    pub fn latest_time(&self) -> Option<u64> {
        self.current_page()?.latest_time()
    }

    /// Earliest selected item time on the current page
    pub fn earliest_selected_time(&self) -> Option<u64> {
        self.current_page()?.earliest_selected_time()
    }

    /// Latest selected item time on the current page
    pub fn latest_selected_time(&self) -> Option<u64> {
        self.current_page()?.latest_selected_time()
    }

    /// Clear the selection on the current page
    pub fn unselect_all(&mut self) {
        if let Some(page) = self.current_page_mut() {
            page.unselect_all();
        }
    }

    /// Whether an edit happened since the last save
    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    /// Whether the user changed a value since the last call. Clears the flag.
    pub fn user_changed_value(&mut self) -> bool {
        std::mem::take(&mut self.user_changed_value)
    }

    /// Persist items immediately on every edit
    pub fn set_autosave(&mut self, autosave: bool) {
        self.settings.autosave = autosave;
        for page in &mut self.pages {
            for track in page.tracks_mut() {
                track.common_mut().autosave = autosave;
            }
        }
    }

    /// Whether edits are persisted immediately
    pub fn autosave(&self) -> bool {
        self.settings.autosave
    }

    /// Move the playhead to pasted items
    pub fn set_move_playhead_on_paste(&mut self, move_playhead: bool) {
        self.settings.move_playhead_on_paste = move_playhead;
    }

    /// Whether pasting moves the playhead
    pub fn move_playhead_on_paste(&self) -> bool {
        self.settings.move_playhead_on_paste
    }

    /// Tempo of the snap grid
    pub fn bpm(&self) -> f64 {
        self.settings.bpm
    }

    /// Set the tempo of the snap grid
    pub fn set_bpm(&mut self, bpm: f64) {
        self.settings.bpm = bpm;
    }

    /// Snap dragged item times to the BPM grid
    pub fn enable_snap_to_bpm(&mut self, snap: bool) {
        self.settings.snap_to_bpm = snap;
    }

    /// Toggle BPM snapping, returning the new state
    pub fn toggle_snap_to_bpm(&mut self) -> bool {
        self.settings.snap_to_bpm = !self.settings.snap_to_bpm;
        self.settings.snap_to_bpm
    }

    /// Whether dragged item times snap to the BPM grid
    pub fn snap_to_bpm(&self) -> bool {
        self.settings.snap_to_bpm
    }

    /// Snap dragged keyframes to keyframes on the other tracks
    pub fn enable_snap_to_other_keyframes(&mut self, snap: bool) {
        self.settings.snap_to_other_keyframes = snap;
    }

    /// Toggle keyframe snapping, returning the new state
    pub fn toggle_snap_to_other_keyframes(&mut self) -> bool {
        self.settings.snap_to_other_keyframes = !self.settings.snap_to_other_keyframes;
        self.settings.snap_to_other_keyframes
    }

    /// Whether dragged keyframes snap to keyframes on the other tracks
    pub fn snap_to_other_keyframes(&self) -> bool {
        self.settings.snap_to_other_keyframes
    }

    /// Keep the playhead on the keyframe being dragged
    pub fn set_move_playhead_on_drag(&mut self, follow: bool) {
        self.settings.move_playhead_on_drag = follow;
    }

    /// Whether dragging a keyframe moves the playhead
    pub fn move_playhead_on_drag(&self) -> bool {
        self.settings.move_playhead_on_drag
    }

    /// Mark a time on the ruler, `None` to clear it
    pub fn set_hover_time(&mut self, millis: Option<u64>) {
        self.ticker.set_hover_time(millis);
    }

    /// Time marked on the ruler, if any
    pub fn hover_time(&self) -> Option<u64> {
        self.ticker.hover_time()
    }

    /// Screen x of every beat in view, for drawing a BPM grid
    pub fn bpm_grid(&self) -> Vec<f32> {
        self.ticker.bpm_lines(&self.mapping(), self.settings.bpm)
    }

    // Persistence

    /// Save every track, the viewport and the in/out range. Everything is
    /// attempted; the first error is returned.
    pub fn save(&mut self) -> Result<()> {
        let mut first_error = None;
        for page in &self.pages {
            if let Err(e) = page.save() {
                first_error.get_or_insert(e);
            }
        }
        if self.is_setup {
            if let Err(e) = self.zoom.save() {
                tracing::error!("Failed to save zoom range: {}", e);
                first_error.get_or_insert(e);
            }
            if let Err(e) = self.in_out.save(self.clock.in_out()) {
                tracing::error!("Failed to save in/out range: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                self.unsaved = false;
                tracing::info!("Saved timeline '{}'", self.settings.name);
                Ok(())
            }
        }
    }

    /// Load every track from `<folder>/<timeline>_<track>.ron`
    pub fn load_tracks_from_folder(&mut self, folder: &Path) -> Result<()> {
        let mut first_error = None;
        for page in &mut self.pages {
            if let Err(e) = page.load_tracks_from_folder(folder, &self.settings.name) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Remove every item from every track
    pub fn clear(&mut self) {
        for page in &mut self.pages {
            page.clear();
        }
    }

    /// Drop every page and track and start over with one empty page. The
    /// clock thread is stopped first and restarted afterwards.
    pub fn reset(&mut self) {
        let was_threaded = self.clock.is_threaded();
        self.clock.remove_from_thread();
        self.stop();

        self.undo.clear();
        self.pages.clear();
        self.track_pages.clear();
        self.current_page = None;
        self.modal = None;
        self.time_control = None;
        self.key_gesture_open = false;
        if let Err(e) = self.clock.set_in_out(NormalizedRange::FULL) {
            tracing::error!("Failed to reset in/out range: {}", e);
        }

        if self.is_setup {
            if let Err(e) = self.add_page(FIRST_PAGE_NAME) {
                tracing::error!("Failed to create first page: {}", e);
            }
        }
        if was_threaded {
            self.clock.move_to_thread();
        }
        tracing::info!("Timeline '{}' reset", self.settings.name);
    }
}

impl Drop for Timeline {
    fn drop(&mut self) {
        // Pages and tracks go after the clock thread has exited
        self.clock.remove_from_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use crate::track::KeyframeTrack;

    pub(super) struct Fixture {
        pub timeline: Timeline,
        pub time: Arc<ManualTimeSource>,
        pub rx: Receiver<TimelineEvent>,
        pub folder: PathBuf,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.folder);
        }
    }

    /// Set-up timeline with manual time, no autosave, files under a
    /// throwaway folder
    pub(super) fn fixture(duration_seconds: f64) -> Fixture {
        let folder = std::env::temp_dir().join(format!("keyline_timeline_{}", uuid::Uuid::new_v4()));
        let settings = TimelineSettings {
            working_folder: folder.clone(),
            duration_seconds,
            autosave: false,
            ..TimelineSettings::named("show")
        };
        let time = Arc::new(ManualTimeSource::new());
        let mut timeline = Timeline::with_time_source(settings, time.clone());
        let rx = timeline.subscribe();
        timeline.setup();
        Fixture { timeline, time, rx, folder }
    }

    #[test]
    fn test_setup_creates_first_page() {
        let f = fixture(10.0);
        assert!(f.timeline.is_setup());
        assert_eq!(f.timeline.page_count(), 1);
        assert_eq!(f.timeline.current_page().unwrap().name(), FIRST_PAGE_NAME);
        let events: Vec<TimelineEvent> = f.rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, TimelineEvent::PageChanged { previous: None, .. })));
    }

    #[test]
    fn test_add_page_rejects_empty_and_duplicate() {
        let mut f = fixture(10.0);
        assert!(matches!(f.timeline.add_page(""), Err(TimelineError::EmptyPageName)));
        assert!(matches!(
            f.timeline.add_page(FIRST_PAGE_NAME),
            Err(TimelineError::DuplicatePage(_))
        ));
        assert_eq!(f.timeline.page_count(), 1);

        f.timeline.add_page("Lights").unwrap();
        assert_eq!(f.timeline.page_count(), 2);
        assert_eq!(f.timeline.current_page().unwrap().name(), "Lights");
        assert!(f.timeline.set_current_page(5).is_err());
        f.timeline.set_current_page_by_name(FIRST_PAGE_NAME).unwrap();
        assert_eq!(f.timeline.current_page_index(), Some(0));
        assert!(f.timeline.set_current_page_by_name("Nope").is_err());
    }

    #[test]
    fn test_layout_stacks_controls() {
        let mut f = fixture(10.0);
        f.timeline.set_width(800.0);
        f.timeline.add_switches("a").unwrap();

        let ticker = f.timeline.ticker_draw_rect();
        let in_out = f.timeline.in_out_draw_rect();
        let zoomer = f.timeline.zoomer_draw_rect();
        assert_eq!(f.timeline.tabs_draw_rect().height(), 0.0);
        assert_eq!(ticker.min.y, 0.0);
        assert_eq!(in_out.min.y, TICKER_HEIGHT);
        assert_eq!(zoomer.min.y, TICKER_HEIGHT + INOUT_HEIGHT + crate::track::DEFAULT_TRACK_HEIGHT);
        assert_eq!(f.timeline.draw_rect().max.y, zoomer.max.y);
        assert_eq!(f.timeline.draw_rect().width(), 800.0);

        f.timeline.add_page("Two").unwrap();
        assert_eq!(f.timeline.tabs_draw_rect().height(), TAB_HEIGHT);
        assert_eq!(f.timeline.ticker_draw_rect().min.y, TAB_HEIGHT);
    }

    #[test]
    fn test_width_change_emits_view_resized() {
        let mut f = fixture(10.0);
        let _: Vec<_> = f.rx.try_iter().collect();
        f.timeline.set_width(f.timeline.width());
        assert!(f.rx.try_recv().is_err());
        f.timeline.set_width(640.0);
        assert_eq!(f.rx.try_recv().unwrap(), TimelineEvent::ViewResized);
        f.timeline.set_offset(pos2(10.0, 20.0));
        assert_eq!(f.rx.try_recv().unwrap(), TimelineEvent::ViewResized);
        assert_eq!(f.timeline.draw_rect().min, pos2(10.0, 20.0));
    }

    #[test]
    fn test_invalid_duration_keeps_previous() {
        let mut f = fixture(10.0);
        assert!(f.timeline.set_duration_in_seconds(0.0).is_err());
        assert!(f.timeline.set_duration_in_seconds(-3.0).is_err());
        assert!(f.timeline.set_duration_in_timecode("00:00:xx:000").is_err());
        assert!(f.timeline.set_duration_in_timecode("00:00:00:000").is_err());
        assert!(f.timeline.set_duration_in_timecode("9999999999999999:00:00:000").is_err());
        assert!(f.timeline.set_duration_in_timecode("4000000000000000:00:00:000").is_err());
        assert!(f.timeline.set_duration_in_seconds(f64::MAX).is_err());
        assert_eq!(f.timeline.duration_seconds(), 10.0);

        f.timeline.set_duration_in_timecode("00:01:00:500").unwrap();
        assert_eq!(f.timeline.duration_seconds(), 60.5);
        assert_eq!(f.timeline.duration_timecode(), "00:01:00:500");
        f.timeline.set_duration_in_frames(90).unwrap();
        assert_eq!(f.timeline.duration_seconds(), 3.0);
        assert_eq!(f.timeline.duration_millis(), 3000);
    }

    #[test]
    fn test_invalid_timecode_keeps_time() {
        let mut f = fixture(10.0);
        f.timeline.set_current_time_seconds(2.0);
        assert!(f.timeline.set_current_timecode("2 seconds").is_err());
        assert!(f.timeline.set_current_timecode("9999999999999999:00:00:000").is_err());
        assert_eq!(f.timeline.current_time(), 2.0);
        f.timeline.set_current_timecode("00:00:05:250").unwrap();
        assert_eq!(f.timeline.current_time_millis(), 5250);
        assert_eq!(f.timeline.current_timecode(), "00:00:05:250");
    }

    #[test]
    fn test_in_out_setters() {
        let mut f = fixture(10.0);
        f.timeline.set_in_out_range(NormalizedRange { min: 0.25, max: 0.5 }).unwrap();
        assert_eq!(f.timeline.in_out_range(), NormalizedRange { min: 0.25, max: 0.5 });
        assert!(f
            .timeline
            .set_in_out_range(NormalizedRange { min: 0.8, max: 0.2 })
            .is_err());
        assert_eq!(f.timeline.in_out_range(), NormalizedRange { min: 0.25, max: 0.5 });

        assert_eq!(f.timeline.in_time_millis(), 2500);
        assert_eq!(f.timeline.out_frame(), 150);
        assert_eq!(f.timeline.in_point_timecode(), "00:00:02:500");

        f.timeline.set_out_point_at_seconds(8.0);
        assert!((f.timeline.in_out_range().max - 0.8).abs() < 1e-9);
        f.timeline.set_in_point_at_timecode("00:00:01:000").unwrap();
        assert!((f.timeline.in_out_range().min - 0.1).abs() < 1e-9);
        assert!(f.timeline.set_in_point_at_timecode("nope").is_err());

        f.timeline.set_current_time_to_out_point();
        assert!((f.timeline.current_time() - 8.0).abs() < 1e-9);
        f.timeline.clear_in_out();
        assert_eq!(f.timeline.in_out_range(), NormalizedRange::FULL);
    }

    #[test]
    fn test_loop_scenario() {
        let mut f = fixture(10.0);
        f.timeline.set_loop_mode(LoopMode::Normal);
        f.timeline.set_current_time_seconds(9.9);
        assert!(f.timeline.play());
        f.time.advance(0.1);
        f.timeline.update();
        f.time.advance(0.1);
        f.timeline.update();
        assert!(f.timeline.is_playing());
        assert!(f.timeline.current_time() < 1.0);

        let looped = f
            .rx
            .try_iter()
            .filter(|e| matches!(e, TimelineEvent::PlaybackLooped(_)))
            .count();
        assert_eq!(looped, 1);
    }

    #[test]
    fn test_stops_at_out_point_without_loop() {
        let mut f = fixture(10.0);
        f.timeline.set_current_time_seconds(9.9);
        f.timeline.play();
        f.time.advance(0.2);
        f.timeline.update();
        assert!(!f.timeline.is_playing());
        assert_eq!(f.timeline.current_time(), 10.0);
        assert!(f.timeline.is_done());

        // Playing again from the end rewinds to the in point
        f.timeline.play();
        assert_eq!(f.timeline.current_time(), 0.0);
    }

    #[test]
    fn test_disabled_timeline_ignores_transport() {
        let mut f = fixture(10.0);
        f.timeline.play();
        f.timeline.disable();
        assert!(!f.timeline.is_playing());
        assert!(!f.timeline.play());
        assert!(!f.timeline.toggle_play());
        assert!(f.timeline.toggle_enabled());
        assert!(f.timeline.toggle_play());
    }

    #[test]
    fn test_unsaved_and_user_changed_flags() {
        let mut f = fixture(10.0);
        let id = f.timeline.add_bangs("hits").unwrap();
        assert!(!f.timeline.has_unsaved_changes());
        f.timeline.flag_track_modified(id);
        assert!(f.timeline.has_unsaved_changes());
        assert!(f.timeline.user_changed_value());
        assert!(!f.timeline.user_changed_value());
        f.timeline.save().unwrap();
        assert!(!f.timeline.has_unsaved_changes());
    }

    #[test]
    fn test_autosave_writes_modified_track() {
        let mut f = fixture(10.0);
        f.timeline.set_autosave(true);
        let id = f.timeline.add_switches("doors").unwrap();
        let path = f.timeline.get_track("doors").unwrap().common().file_path.clone().unwrap();
        assert!(!path.exists());
        f.timeline.flag_track_modified(id);
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), "show_doors.ron");
    }

    #[test]
    fn test_save_then_load_into_fresh_timeline() {
        let mut f = fixture(10.0);
        f.timeline.add_curves("level", 0.0, 1.0, 0.0).unwrap();
        f.timeline
            .get_track_mut("level")
            .and_then(|t| t.as_any_mut().downcast_mut::<KeyframeTrack>())
            .unwrap()
            .add_keyframe(1000, crate::keyframe::KeyframeValue::Float(0.5))
            .unwrap();
        f.timeline.set_in_out_range(NormalizedRange { min: 0.1, max: 0.9 }).unwrap();
        f.timeline.save().unwrap();

        let settings = TimelineSettings {
            working_folder: f.folder.clone(),
            duration_seconds: 10.0,
            autosave: false,
            ..TimelineSettings::named("show")
        };
        let mut restored = Timeline::with_time_source(settings, Arc::new(ManualTimeSource::new()));
        restored.setup();
        restored.add_curves("level", 0.0, 1.0, 0.0).unwrap();
        assert_eq!(restored.value_at_millis("level", 1000), Some(0.5));
        assert_eq!(restored.in_out_range(), NormalizedRange { min: 0.1, max: 0.9 });
    }

    #[test]
    fn test_reset_starts_over() {
        let mut f = fixture(10.0);
        f.timeline.add_page("Two").unwrap();
        f.timeline.add_bangs("b").unwrap();
        f.timeline.set_in_out_range(NormalizedRange { min: 0.2, max: 0.4 }).unwrap();
        f.timeline.move_to_thread();

        f.timeline.reset();
        assert!(f.timeline.is_on_thread());
        assert_eq!(f.timeline.page_count(), 1);
        assert!(!f.timeline.has_track("b"));
        assert_eq!(f.timeline.in_out_range(), NormalizedRange::FULL);
        assert!(f.timeline.undo_engine().is_empty());
        f.timeline.remove_from_thread();
        assert!(!f.timeline.is_on_thread());
    }

    #[test]
    fn test_quantized_time() {
        let mut f = fixture(10.0);
        f.timeline.set_bpm(120.0);
        assert_eq!(f.timeline.quantized_time(62, 16), 0);
        assert_eq!(f.timeline.quantized_time(63, 16), 125);
    }

    #[test]
    fn test_settings_snapshot_reflects_changes() {
        let mut f = fixture(10.0);
        f.timeline.set_frame_rate(24.0);
        f.timeline.set_loop_mode(LoopMode::Palindrome);
        f.timeline.enable_undo(false);
        let settings = f.timeline.settings();
        assert_eq!(settings.frame_rate, 24.0);
        assert_eq!(settings.loop_mode, LoopMode::Palindrome);
        assert!(!settings.undo_enabled);
        assert_eq!(settings.name, "show");
    }

    fn bang_times(rx: &Receiver<TimelineEvent>) -> Vec<u64> {
        rx.try_iter()
            .filter_map(|e| match e {
                TimelineEvent::Bang { time_millis, .. } => Some(time_millis),
                _ => None,
            })
            .collect()
    }

    fn add_hits(f: &mut Fixture, times: &[u64]) {
        f.timeline.add_bangs("hits").unwrap();
        for &time in times {
            f.timeline
                .add_keyframe("hits", time, crate::keyframe::KeyframeValue::Event(String::new()))
                .unwrap();
        }
    }

    #[test]
    fn test_bangs_fire_once_per_loop_pass() {
        let mut f = fixture(1.0);
        add_hits(&mut f, &[2, 995]);
        f.timeline.set_loop_mode(LoopMode::Normal);
        assert!(f.timeline.play());
        // 13ms ticks for just under three passes
        for _ in 0..230 {
            f.time.advance(0.013);
            f.timeline.update();
        }
        assert!(f.timeline.is_playing());
        assert_eq!(bang_times(&f.rx), vec![2, 995, 2, 995, 2]);
    }

    #[test]
    fn test_bang_near_out_point_fires_on_wrap() {
        let mut f = fixture(1.0);
        add_hits(&mut f, &[2, 995]);
        f.timeline.set_loop_mode(LoopMode::Normal);
        f.timeline.set_current_time_seconds(0.99);
        f.timeline.play();
        f.time.advance(0.013);
        f.timeline.update();
        assert!(f.timeline.current_time() < 0.01);
        assert_eq!(bang_times(&f.rx), vec![995, 2]);
    }

    #[test]
    fn test_bang_near_out_point_fires_on_stop() {
        let mut f = fixture(1.0);
        add_hits(&mut f, &[995, 1000]);
        f.timeline.set_current_time_seconds(0.99);
        f.timeline.play();
        f.time.advance(0.013);
        f.timeline.update();
        assert!(!f.timeline.is_playing());
        assert_eq!(bang_times(&f.rx), vec![995, 1000]);

        // Later updates while stopped fire nothing
        f.time.advance(0.013);
        f.timeline.update();
        assert!(bang_times(&f.rx).is_empty());
    }

    #[test]
    fn test_scrubbing_does_not_fire_bangs() {
        let mut f = fixture(1.0);
        add_hits(&mut f, &[500]);
        f.timeline.play();
        f.time.advance(0.1);
        f.timeline.update();
        f.timeline.set_current_time_seconds(0.9);
        f.time.advance(0.05);
        f.timeline.update();
        assert!(bang_times(&f.rx).is_empty());
    }

    #[test]
    fn test_drag_settings_and_snapshot() {
        let mut f = fixture(10.0);
        assert!(f.timeline.snap_to_other_keyframes());
        assert!(!f.timeline.move_playhead_on_drag());
        assert!(!f.timeline.toggle_snap_to_other_keyframes());
        f.timeline.enable_snap_to_other_keyframes(true);
        f.timeline.set_move_playhead_on_drag(true);
        let settings = f.timeline.settings();
        assert!(settings.snap_to_other_keyframes);
        assert!(settings.move_playhead_on_drag);
    }

    #[test]
    fn test_hover_time_and_collapse() {
        let mut f = fixture(10.0);
        f.timeline.add_bangs("hits").unwrap();
        assert_eq!(f.timeline.hover_time(), None);
        f.timeline.set_hover_time(Some(1500));
        assert_eq!(f.timeline.hover_time(), Some(1500));
        f.timeline.set_hover_time(None);
        assert_eq!(f.timeline.hover_time(), None);

        let full = f.timeline.draw_rect().height();
        let _ = f.rx.try_iter().count();
        f.timeline.collapse_all_tracks();
        assert!(f.timeline.draw_rect().height() < full);
        assert!(f.rx.try_iter().any(|e| matches!(e, TimelineEvent::ViewResized)));
        f.timeline.expand_all_tracks();
        assert_eq!(f.timeline.draw_rect().height(), full);
    }

    #[test]
    fn test_zoom_propagates_to_tracks() {
        let mut f = fixture(10.0);
        f.timeline.add_bangs("b").unwrap();
        let range = NormalizedRange { min: 0.25, max: 0.5 };
        f.timeline.set_view_range(range).unwrap();
        assert_eq!(f.timeline.get_track("b").unwrap().common().zoom_bounds, range);
        assert!((f.timeline.nudge_percent().x - 0.00025).abs() < 1e-7);
    }
}
