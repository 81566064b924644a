// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe-based tracks.
//!
//! One [`KeyframeTrack`] type covers every keyframe lane. The
//! [`KeyframeKind`] decides which values it accepts and how they are read:
//!
//! | Kind | Value | Read with |
//! |---|---|---|
//! | Curves | `Float` inside a value range | [`KeyframeTrack::value_at`] |
//! | Switches | `Bool`, held until the next keyframe | [`KeyframeTrack::is_on_at`] |
//! | Bangs | empty `Event` | [`TimelineEvent::Bang`] during playback |
//! | Flags | `Event` with text | [`TimelineEvent::Bang`] during playback |
//! | Colors | `Color` | [`KeyframeTrack::color_at`] |

use super::{Track, TrackCommon, TrackContext, TrackKind};
use crate::error::Result;
use crate::events::TimelineEvent;
use crate::input::{KeyEvent, PointerEvent};
use crate::keyframe::{InterpolationMode, Keyframe, KeyframeId, KeyframeSet, KeyframeValue};
use crate::mapping::map_linear;
use crate::state::{self, StateBuffer};
use egui::{Key, PointerButton, Vec2};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Pixel distance within which a click grabs a keyframe
pub const HIT_TOLERANCE: f32 = 5.0;

/// Default color for new color keyframes and empty color tracks
const WHITE: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// What a keyframe track stores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum KeyframeKind {
    /// Interpolated floats
    Curves {
        /// Lowest value
        min: f32,
        /// Highest value
        max: f32,
        /// Value reported when there are no keyframes
        default_value: f32,
    },
    /// On/off states
    Switches,
    /// Plain triggers
    Bangs,
    /// Triggers with text
    Flags,
    /// RGBA colors
    Colors,
}

impl KeyframeKind {
    /// Matching track kind
    pub fn track_kind(&self) -> TrackKind {
        match self {
            Self::Curves { .. } => TrackKind::Curves,
            Self::Switches => TrackKind::Switches,
            Self::Bangs => TrackKind::Bangs,
            Self::Flags => TrackKind::Flags,
            Self::Colors => TrackKind::Colors,
        }
    }

    /// Whether a value can live on this kind of track
    pub fn accepts(&self, value: &KeyframeValue) -> bool {
        matches!(
            (self, value),
            (Self::Curves { .. }, KeyframeValue::Float(_))
                | (Self::Switches, KeyframeValue::Bool(_))
                | (Self::Bangs | Self::Flags, KeyframeValue::Event(_))
                | (Self::Colors, KeyframeValue::Color(_))
        )
    }

    fn fires_events(&self) -> bool {
        matches!(self, Self::Bangs | Self::Flags)
    }
}

#[derive(Serialize, Deserialize)]
struct KeyframeDocument {
    kind: TrackKind,
    keyframes: Vec<Keyframe>,
}

#[derive(Debug, Clone)]
struct KeyframeDrag {
    anchor_millis: i64,
    anchor_y: f32,
    grabbed: Option<KeyframeId>,
    origin: Vec<(KeyframeId, u64, KeyframeValue)>,
}

/// A lane of keyframes
#[derive(Debug, Clone)]
pub struct KeyframeTrack {
    common: TrackCommon,
    kind: KeyframeKind,
    keys: KeyframeSet,
    drag: Option<KeyframeDrag>,
    editing_flag: Option<KeyframeId>,
}

impl KeyframeTrack {
    /// Create a track of the given kind
    pub fn new(name: impl Into<String>, kind: KeyframeKind) -> Self {
        Self {
            common: TrackCommon::new(name),
            kind,
            keys: KeyframeSet::new(),
            drag: None,
            editing_flag: None,
        }
    }

    /// Curve track over `[min, max]`, reading `min` when empty
    pub fn curves(name: impl Into<String>, min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self::new(
            name,
            KeyframeKind::Curves {
                min,
                max,
                default_value: min,
            },
        )
    }

    /// Switch track
    pub fn switches(name: impl Into<String>) -> Self {
        Self::new(name, KeyframeKind::Switches)
    }

    /// Bang track
    pub fn bangs(name: impl Into<String>) -> Self {
        Self::new(name, KeyframeKind::Bangs)
    }

    /// Flag track
    pub fn flags(name: impl Into<String>) -> Self {
        Self::new(name, KeyframeKind::Flags)
    }

    /// Color track
    pub fn colors(name: impl Into<String>) -> Self {
        Self::new(name, KeyframeKind::Colors)
    }

    /// Kind of keyframes stored
    pub fn keyframe_kind(&self) -> KeyframeKind {
        self.kind
    }

    /// Set the value curves report with no keyframes, clamped to the range
    pub fn set_default_value(&mut self, value: f32) {
        if let KeyframeKind::Curves { min, max, default_value } = &mut self.kind {
            *default_value = value.clamp(*min, *max);
        }
    }

    /// Keyframes and selection
    pub fn keys(&self) -> &KeyframeSet {
        &self.keys
    }

    /// Keyframes and selection, mutable
    pub fn keys_mut(&mut self) -> &mut KeyframeSet {
        &mut self.keys
    }

    /// Add a keyframe programmatically. Values of the wrong type are rejected.
    pub fn add_keyframe(&mut self, time: u64, value: KeyframeValue) -> Option<KeyframeId> {
        if !self.kind.accepts(&value) {
            tracing::warn!(
                "Track '{}' ({}) rejects keyframe value {:?}",
                self.common.name,
                self.kind.track_kind().name(),
                value
            );
            return None;
        }
        let value = match (self.kind, value) {
            (KeyframeKind::Curves { min, max, .. }, KeyframeValue::Float(v)) => {
                KeyframeValue::Float(v.clamp(min, max))
            }
            (_, value) => value,
        };
        let mut keyframe = Keyframe::new(time, value);
        if matches!(self.kind, KeyframeKind::Switches) {
            keyframe = keyframe.with_interpolation(InterpolationMode::Constant);
        }
        Some(self.keys.add(keyframe))
    }

    /// Curve value at a time
    pub fn value_at(&self, millis: u64) -> f32 {
        match self.kind {
            KeyframeKind::Curves { default_value, .. } => self
                .keys
                .evaluate(millis)
                .and_then(|v| v.as_float())
                .unwrap_or(default_value),
            _ => 0.0,
        }
    }

    /// Switch state at a time
    pub fn is_on_at(&self, millis: u64) -> bool {
        self.keys
            .last_at_or_before(millis)
            .and_then(|k| k.value.as_bool())
            .unwrap_or(false)
    }

    /// Color at a time
    pub fn color_at(&self, millis: u64) -> [f32; 4] {
        self.keys
            .evaluate(millis)
            .and_then(|v| v.as_color())
            .unwrap_or(WHITE)
    }

    /// Text of the flag being edited, if any
    pub fn editing_flag(&self) -> Option<KeyframeId> {
        self.editing_flag
    }

    fn value_range(&self) -> Option<(f32, f32)> {
        match self.kind {
            KeyframeKind::Curves { min, max, .. } => Some((min, max)),
            _ => None,
        }
    }

    fn value_for_new_keyframe(&self, event: &PointerEvent, millis: u64) -> KeyframeValue {
        match self.kind {
            KeyframeKind::Curves { min, max, .. } => {
                let rect = self.common.draw_rect;
                let value = map_linear(
                    event.pos.y as f64,
                    rect.max.y as f64,
                    rect.min.y as f64,
                    min as f64,
                    max as f64,
                ) as f32;
                KeyframeValue::Float(value.clamp(min, max))
            }
            KeyframeKind::Switches => KeyframeValue::Bool(!self.is_on_at(millis)),
            KeyframeKind::Bangs | KeyframeKind::Flags => KeyframeValue::Event(String::new()),
            KeyframeKind::Colors => KeyframeValue::Color(self.color_at(millis)),
        }
    }

    fn begin_drag(&mut self, event: &PointerEvent, anchor_millis: i64, grabbed: KeyframeId) {
        let origin: Vec<_> = self
            .keys
            .selected_keyframes()
            .map(|k| (k.id, k.time, k.value.clone()))
            .collect();
        self.drag = Some(KeyframeDrag {
            anchor_millis,
            anchor_y: event.pos.y,
            grabbed: origin.iter().any(|(id, ..)| *id == grabbed).then_some(grabbed),
            origin,
        });
    }

    fn finish_flag_edit(&mut self, ctx: &mut TrackContext<'_>) {
        if self.editing_flag.take().is_some() {
            ctx.feedback.dismiss_modal(self.common.id);
        }
    }

    fn edit_flag_text(&mut self, event: &KeyEvent, ctx: &mut TrackContext<'_>) -> bool {
        let Some(id) = self.editing_flag else {
            return false;
        };
        match event.key {
            Key::Enter | Key::Escape => {
                self.finish_flag_edit(ctx);
                return true;
            }
            _ => {}
        }
        let Some(KeyframeValue::Event(text)) = self.keys.keyframe_mut(id).map(|k| &mut k.value) else {
            self.finish_flag_edit(ctx);
            return true;
        };
        let changed = match event.key {
            Key::Backspace => text.pop().is_some(),
            Key::Space => {
                text.push(' ');
                true
            }
            key => {
                let name = key.name();
                if name.chars().count() == 1 {
                    if event.modifiers.shift {
                        text.push_str(name);
                    } else {
                        text.push_str(&name.to_lowercase());
                    }
                    true
                } else {
                    false
                }
            }
        };
        if changed {
            ctx.feedback.mark_modified(self.common.id);
        }
        true
    }
}

impl Track for KeyframeTrack {
    fn common(&self) -> &TrackCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut TrackCommon {
        &mut self.common
    }

    fn kind(&self) -> TrackKind {
        self.kind.track_kind()
    }

    fn serialize_state(&self) -> Result<StateBuffer> {
        StateBuffer::encode(&self.keys.keyframes())
    }

    fn restore_state(&mut self, buffer: &StateBuffer) -> Result<()> {
        let keyframes: Vec<Keyframe> = buffer.decode()?;
        self.keys.set_keyframes(keyframes);
        self.drag = None;
        Ok(())
    }

    fn to_document(&self) -> Result<String> {
        state::to_document(&KeyframeDocument {
            kind: self.kind(),
            keyframes: self.keys.keyframes().to_vec(),
        })
    }

    fn load_document(&mut self, document: &str) -> Result<()> {
        let document: KeyframeDocument = state::from_document(document)?;
        if document.kind != self.kind() {
            tracing::warn!(
                "Track '{}' is {} but its document holds {}",
                self.common.name,
                self.kind().name(),
                document.kind.name()
            );
        }
        let kind = self.kind;
        let keyframes = document
            .keyframes
            .into_iter()
            .filter(|k| kind.accepts(&k.value))
            .collect();
        self.keys.set_keyframes(keyframes);
        Ok(())
    }

    fn clear(&mut self) {
        self.keys.clear();
        self.drag = None;
        self.editing_flag = None;
    }

    fn selected_item_count(&self) -> usize {
        self.keys.selected_count()
    }

    fn earliest_time(&self) -> Option<u64> {
        self.keys.earliest_time()
    }

    fn latest_time(&self) -> Option<u64> {
        self.keys.latest_time()
    }

    fn earliest_selected_time(&self) -> Option<u64> {
        self.keys.earliest_selected_time()
    }

    fn latest_selected_time(&self) -> Option<u64> {
        self.keys.latest_selected_time()
    }

    fn snap_points(&self, points: &mut Vec<u64>) {
        points.extend(
            self.keys
                .keyframes()
                .iter()
                .filter(|k| !self.keys.is_selected(k.id))
                .map(|k| k.time),
        );
    }

    fn select_all(&mut self) {
        self.keys.select_all();
    }

    fn unselect_all(&mut self) {
        self.keys.unselect_all();
    }

    fn nudge_by(&mut self, nudge: Vec2, ctx: &mut TrackContext<'_>) {
        if self.keys.selected_count() == 0 {
            return;
        }
        let delta_millis = (nudge.x as f64 * ctx.duration_millis() as f64).round() as i64;
        let mut changed = self.keys.offset_selected(delta_millis, ctx.duration_millis());
        if let Some((min, max)) = self.value_range() {
            changed |= self.keys.offset_selected_values(nudge.y * (max - min), min, max);
        }
        if changed {
            ctx.feedback.mark_modified(self.common.id);
        }
    }

    fn copy_request(&self) -> Vec<String> {
        self.keys.copy_selected()
    }

    fn cut_request(&mut self, ctx: &mut TrackContext<'_>) -> Vec<String> {
        let items = self.keys.copy_selected();
        if self.keys.delete_selected() > 0 {
            ctx.feedback.mark_modified(self.common.id);
        }
        items
    }

    fn paste_sent(&mut self, items: &[String], ctx: &mut TrackContext<'_>) {
        let kind = self.kind;
        let pasted = self
            .keys
            .paste(items, ctx.current_millis, ctx.duration_millis(), |v| kind.accepts(v));
        if pasted > 0 {
            tracing::debug!("Pasted {} keyframes into '{}'", pasted, self.common.name);
            ctx.feedback.mark_modified(self.common.id);
        }
    }

    fn pointer_pressed(&mut self, event: &PointerEvent, ctx: &mut TrackContext<'_>) -> bool {
        if self.editing_flag.is_some() {
            // Any click ends text entry; a click elsewhere is not consumed
            self.finish_flag_edit(ctx);
            if !self.common.contains(event) {
                return false;
            }
        }
        if !self.common.enabled || !self.common.contains(event) || event.button != PointerButton::Primary {
            return false;
        }

        let mapping = ctx.mapping(&self.common);
        let millis = mapping.screen_x_to_millis(event.pos.x);

        if let Some(id) = self.keys.hit_test(&mapping, event.pos.x, HIT_TOLERANCE) {
            if event.modifiers.shift {
                self.keys.toggle_selected(id);
            } else if !self.keys.is_selected(id) {
                self.keys.select(id, false);
            }
            self.begin_drag(event, millis, id);
            return true;
        }

        if event.modifiers.command {
            let time = ctx.settle_time(millis);
            let value = self.value_for_new_keyframe(event, time);
            if let Some(id) = self.add_keyframe(time, value) {
                self.keys.select(id, event.modifiers.shift);
                ctx.feedback.mark_modified(self.common.id);
                if matches!(self.kind, KeyframeKind::Flags) {
                    self.editing_flag = Some(id);
                    ctx.feedback.present_modal(self.common.id);
                }
                self.begin_drag(event, millis, id);
            }
            return true;
        }

        if !event.modifiers.shift {
            self.keys.unselect_all();
        }
        true
    }

    fn pointer_moved(&mut self, event: &PointerEvent, ctx: &mut TrackContext<'_>) -> bool {
        if !self.common.contains(event) {
            return false;
        }
        let mapping = ctx.mapping(&self.common);
        let hovered = self
            .keys
            .hit_test(&mapping, event.pos.x, HIT_TOLERANCE)
            .and_then(|id| self.keys.keyframe(id));
        match hovered {
            Some(keyframe) => {
                ctx.feedback.set_hover_time(keyframe.time);
                true
            }
            None => false,
        }
    }

    fn pointer_dragged(&mut self, event: &PointerEvent, ctx: &mut TrackContext<'_>) -> bool {
        let Some(drag) = self.drag.clone() else {
            return false;
        };
        let mapping = ctx.mapping(&self.common);
        let mut delta_millis = mapping.screen_x_to_millis(event.pos.x) - drag.anchor_millis;
        let rect_height = self.common.draw_rect.height();
        let value_range = self.value_range();

        // The grabbed keyframe snaps to other keyframes; the rest of the
        // selection keeps its offset to it
        let grabbed_origin = drag
            .grabbed
            .and_then(|grabbed| drag.origin.iter().find(|(id, ..)| *id == grabbed))
            .map(|(_, time, _)| *time as i64);
        let mut snapped = false;
        if let Some(origin) = grabbed_origin {
            if let Some(point) = ctx.snap_point_near(origin + delta_millis, &mapping) {
                delta_millis = point as i64 - origin;
                snapped = true;
            }
        }

        let mut changed = false;
        for (id, time, value) in &drag.origin {
            let new_time = if snapped {
                ctx.clamp_time(*time as i64 + delta_millis)
            } else {
                ctx.settle_time(*time as i64 + delta_millis)
            };
            if ctx.move_playhead_on_drag && Some(*id) == drag.grabbed {
                ctx.feedback.move_playhead(new_time);
            }
            let new_value = match (value, value_range) {
                (KeyframeValue::Float(v), Some((min, max))) if rect_height > 0.0 => {
                    let delta = (drag.anchor_y - event.pos.y) / rect_height * (max - min);
                    KeyframeValue::Float((v + delta).clamp(min, max))
                }
                (value, _) => value.clone(),
            };
            if let Some(keyframe) = self.keys.keyframe_mut(*id) {
                if keyframe.time != new_time || keyframe.value != new_value {
                    keyframe.time = new_time;
                    keyframe.value = new_value;
                    changed = true;
                }
            }
        }
        if changed {
            self.keys.resort();
            ctx.feedback.mark_modified(self.common.id);
        }
        true
    }

    fn pointer_released(&mut self, _event: &PointerEvent, _ctx: &mut TrackContext<'_>) -> bool {
        self.drag.take().is_some()
    }

    fn key_pressed(&mut self, event: &KeyEvent, ctx: &mut TrackContext<'_>) -> bool {
        if self.editing_flag.is_some() {
            return self.edit_flag_text(event, ctx);
        }
        match event.key {
            Key::Delete | Key::Backspace if self.keys.selected_count() > 0 => {
                let removed = self.keys.delete_selected();
                tracing::debug!("Deleted {} keyframes from '{}'", removed, self.common.name);
                ctx.feedback.mark_modified(self.common.id);
                true
            }
            _ => false,
        }
    }

    fn update(&mut self, ctx: &mut TrackContext<'_>) {
        if !self.kind.fires_events() || !self.common.enabled {
            return;
        }
        for span in ctx.playhead_travel {
            for keyframe in self.keys.crossed_by(span) {
                ctx.events.emit(TimelineEvent::Bang {
                    track: self.common.name.clone(),
                    label: keyframe.value.as_event().unwrap_or_default().to_string(),
                    time_millis: keyframe.time,
                });
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::PlayheadSpan;
    use crate::events::EventSink;
    use crate::timecode::Timecode;
    use crate::track::Feedback;
    use egui::{pos2, vec2, Modifiers, Rect};

    fn lane<T: Track>(mut track: T) -> T {
        // 1000px for 10 seconds: 1px = 10ms
        track.common_mut().draw_rect = Rect::from_min_size(pos2(0.0, 0.0), vec2(1000.0, 100.0));
        track
    }

    fn context<'a>(events: &'a EventSink, feedback: &'a mut Feedback) -> TrackContext<'a> {
        TrackContext {
            duration_seconds: 10.0,
            current_millis: 0,
            is_playing: false,
            timecode: Timecode::default(),
            snap_bpm: None,
            snap_to_keyframes: false,
            snap_points: &[],
            move_playhead_on_drag: false,
            playhead_travel: &[],
            events,
            feedback,
        }
    }

    #[test]
    fn test_curves_value_and_default() {
        let mut track = KeyframeTrack::curves("curve", 0.0, 10.0);
        track.set_default_value(4.0);
        assert_eq!(track.value_at(500), 4.0);
        track.add_keyframe(0, KeyframeValue::Float(0.0));
        track.add_keyframe(1000, KeyframeValue::Float(20.0));
        assert_eq!(track.value_at(500), 5.0);
        assert!(track.add_keyframe(10, KeyframeValue::Bool(true)).is_none());
    }

    #[test]
    fn test_switches_hold_state() {
        let mut track = KeyframeTrack::switches("switch");
        track.add_keyframe(100, KeyframeValue::Bool(true));
        track.add_keyframe(300, KeyframeValue::Bool(false));
        assert!(!track.is_on_at(50));
        assert!(track.is_on_at(100));
        assert!(track.is_on_at(299));
        assert!(!track.is_on_at(300));
    }

    #[test]
    fn test_colors_interpolate() {
        let mut track = KeyframeTrack::colors("color");
        assert_eq!(track.color_at(0), WHITE);
        track.add_keyframe(0, KeyframeValue::Color([0.0, 0.0, 0.0, 1.0]));
        track.add_keyframe(100, KeyframeValue::Color([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(track.color_at(50), [0.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_state_round_trip() {
        let mut track = KeyframeTrack::curves("curve", 0.0, 1.0);
        track.add_keyframe(10, KeyframeValue::Float(0.5));
        let before = track.serialize_state().unwrap();
        track.add_keyframe(20, KeyframeValue::Float(0.7));
        track.restore_state(&before).unwrap();
        assert_eq!(track.keys().len(), 1);
        assert_eq!(track.serialize_state().unwrap(), before);
    }

    #[test]
    fn test_document_round_trip() {
        let mut track = KeyframeTrack::flags("flags");
        track.add_keyframe(10, KeyframeValue::Event("cue".into()));
        let document = track.to_document().unwrap();
        let mut other = KeyframeTrack::flags("flags");
        other.load_document(&document).unwrap();
        assert_eq!(other.keys().keyframes()[0].value.as_event(), Some("cue"));
    }

    #[test]
    fn test_command_click_adds_and_marks_modified() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let mut track = lane(KeyframeTrack::curves("curve", 0.0, 1.0));
        let id = track.id();
        {
            let mut ctx = context(&events, &mut feedback);
            let press = PointerEvent::at(200.0, 25.0).with_modifiers(Modifiers::COMMAND);
            assert!(track.pointer_pressed(&press, &mut ctx));
            assert!(track.pointer_released(&press, &mut ctx));
        }
        assert_eq!(track.keys().len(), 1);
        assert_eq!(track.keys().keyframes()[0].time, 2000);
        assert!((track.value_at(2000) - 0.75).abs() < 1e-4);
        assert_eq!(feedback.take_modified(), vec![id]);
    }

    #[test]
    fn test_plain_click_on_empty_unselects() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let mut track = lane(KeyframeTrack::bangs("bangs"));
        track.add_keyframe(5000, KeyframeValue::Event(String::new()));
        track.select_all();
        let mut ctx = context(&events, &mut feedback);
        assert!(track.pointer_pressed(&PointerEvent::at(100.0, 10.0), &mut ctx));
        assert_eq!(track.selected_item_count(), 0);
        assert!(!track.pointer_pressed(&PointerEvent::at(100.0, 500.0), &mut ctx));
        assert!(ctx.feedback.take_modified().is_empty());
    }

    #[test]
    fn test_drag_moves_selected() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let mut track = lane(KeyframeTrack::bangs("bangs"));
        track.add_keyframe(1000, KeyframeValue::Event(String::new()));
        let mut ctx = context(&events, &mut feedback);
        assert!(track.pointer_pressed(&PointerEvent::at(101.0, 10.0), &mut ctx));
        assert_eq!(track.selected_item_count(), 1);
        assert!(track.pointer_dragged(&PointerEvent::at(151.0, 10.0), &mut ctx));
        assert!(track.pointer_released(&PointerEvent::at(151.0, 10.0), &mut ctx));
        assert_eq!(track.keys().keyframes()[0].time, 1500);
        assert!(ctx.feedback.was_modified(track.id()));
    }

    #[test]
    fn test_nudge_and_delete() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let mut track = KeyframeTrack::curves("curve", 0.0, 10.0);
        track.add_keyframe(1000, KeyframeValue::Float(5.0));
        track.select_all();
        let mut ctx = context(&events, &mut feedback);
        track.nudge_by(vec2(0.01, 0.1), &mut ctx);
        assert_eq!(track.keys().keyframes()[0].time, 1100);
        assert!((track.value_at(1100) - 6.0).abs() < 1e-4);

        assert!(track.key_pressed(&KeyEvent::new(Key::Delete), &mut ctx));
        assert!(track.keys().is_empty());
        assert!(!track.key_pressed(&KeyEvent::new(Key::Delete), &mut ctx));
    }

    #[test]
    fn test_cut_and_paste_at_playhead() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let mut source = KeyframeTrack::switches("a");
        source.add_keyframe(100, KeyframeValue::Bool(true));
        source.add_keyframe(400, KeyframeValue::Bool(false));
        source.select_all();
        let mut ctx = context(&events, &mut feedback);
        let items = source.cut_request(&mut ctx);
        assert_eq!(items.len(), 2);
        assert!(source.keys().is_empty());

        let mut target = KeyframeTrack::switches("b");
        ctx.current_millis = 2000;
        target.paste_sent(&items, &mut ctx);
        assert_eq!(target.earliest_time(), Some(2000));
        assert_eq!(target.latest_time(), Some(2300));
        assert_eq!(target.selected_item_count(), 2);
    }

    fn fired(rx: &std::sync::mpsc::Receiver<TimelineEvent>) -> Vec<u64> {
        rx.try_iter()
            .filter_map(|e| match e {
                TimelineEvent::Bang { time_millis, .. } => Some(time_millis),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_bangs_fire_on_crossed_spans() {
        let events = EventSink::new();
        let rx = events.subscribe();
        let mut feedback = Feedback::new();
        let mut track = KeyframeTrack::bangs("hits");
        for time in [2, 500, 995, 1000] {
            track.add_keyframe(time, KeyframeValue::Event(String::new()));
        }

        // Wrap from 990 through the out point back to 20
        let wrap = [
            PlayheadSpan {
                includes_end: true,
                ..PlayheadSpan::forward(990, 1000)
            },
            PlayheadSpan::forward(0, 20),
        ];
        let back = [PlayheadSpan::backward(1000, 400)];
        let mut ctx = context(&events, &mut feedback);
        ctx.playhead_travel = &wrap;
        track.update(&mut ctx);
        assert_eq!(fired(&rx), vec![995, 1000, 2]);

        // Reverse travel fires in crossing order
        ctx.playhead_travel = &back;
        track.update(&mut ctx);
        assert_eq!(fired(&rx), vec![1000, 995, 500]);

        ctx.playhead_travel = &[];
        track.update(&mut ctx);
        assert!(fired(&rx).is_empty());

        track.common_mut().enabled = false;
        ctx.playhead_travel = &wrap;
        track.update(&mut ctx);
        assert!(fired(&rx).is_empty());
    }

    #[test]
    fn test_drag_snaps_to_nearby_keyframe() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let mut track = lane(KeyframeTrack::bangs("bangs"));
        track.add_keyframe(1000, KeyframeValue::Event(String::new()));
        track.add_keyframe(4000, KeyframeValue::Event(String::new()));
        let mut ctx = context(&events, &mut feedback);
        ctx.snap_to_keyframes = true;
        assert!(track.pointer_pressed(&PointerEvent::at(400.0, 10.0), &mut ctx));

        let mut points = Vec::new();
        track.snap_points(&mut points);
        assert_eq!(points, vec![1000]);

        ctx.snap_points = &points;
        assert!(track.pointer_dragged(&PointerEvent::at(109.0, 10.0), &mut ctx));
        assert_eq!(track.keys().keyframes()[1].time, 1000);
        assert!(track.pointer_dragged(&PointerEvent::at(160.0, 10.0), &mut ctx));
        assert_eq!(track.keys().keyframes()[1].time, 1600);
    }

    #[test]
    fn test_drag_moves_playhead_when_enabled() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let mut track = lane(KeyframeTrack::switches("switch"));
        track.add_keyframe(2000, KeyframeValue::Bool(true));
        {
            let mut ctx = context(&events, &mut feedback);
            assert!(track.pointer_pressed(&PointerEvent::at(200.0, 10.0), &mut ctx));
            assert!(track.pointer_dragged(&PointerEvent::at(250.0, 10.0), &mut ctx));
            assert_eq!(ctx.feedback.take_playhead(), None);
            ctx.move_playhead_on_drag = true;
            assert!(track.pointer_dragged(&PointerEvent::at(300.0, 10.0), &mut ctx));
        }
        assert_eq!(feedback.take_playhead(), Some(3000));
    }

    #[test]
    fn test_hover_reports_keyframe_time() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let mut track = lane(KeyframeTrack::flags("flags"));
        track.add_keyframe(700, KeyframeValue::Event("cue".into()));
        let mut ctx = context(&events, &mut feedback);
        assert!(!track.pointer_moved(&PointerEvent::at(300.0, 10.0), &mut ctx));
        assert_eq!(ctx.feedback.take_hover_time(), None);
        assert!(track.pointer_moved(&PointerEvent::at(72.0, 10.0), &mut ctx));
        assert_eq!(ctx.feedback.take_hover_time(), Some(700));
    }

    #[test]
    fn test_save_into_missing_folder() {
        let folder = std::env::temp_dir().join(format!("keyline_track_{}", uuid::Uuid::new_v4()));
        let path = folder.join("show").join("flags.ron");
        let mut track = KeyframeTrack::flags("flags");
        track.add_keyframe(40, KeyframeValue::Event("go".into()));
        track.common_mut().file_path = Some(path.clone());
        track.save().unwrap();
        assert!(path.exists());

        let mut other = KeyframeTrack::flags("flags");
        other.common_mut().file_path = Some(path);
        other.load().unwrap();
        assert_eq!(other.keys().keyframes()[0].value.as_event(), Some("go"));
        let _ = std::fs::remove_dir_all(&folder);
    }

    #[test]
    fn test_flag_text_entry_is_modal() {
        let events = EventSink::new();
        let mut feedback = Feedback::new();
        let mut track = lane(KeyframeTrack::flags("flags"));
        let id = track.id();
        let mut ctx = context(&events, &mut feedback);
        let press = PointerEvent::at(300.0, 10.0).with_modifiers(Modifiers::COMMAND);
        assert!(track.pointer_pressed(&press, &mut ctx));
        assert_eq!(ctx.feedback.take_modal(), Some(crate::track::ModalRequest::Present(id)));

        assert!(track.key_pressed(&KeyEvent::new(Key::G), &mut ctx));
        assert!(track.key_pressed(&KeyEvent::new(Key::O).with_modifiers(Modifiers::SHIFT), &mut ctx));
        assert!(track.key_pressed(&KeyEvent::new(Key::Enter), &mut ctx));
        assert_eq!(ctx.feedback.take_modal(), Some(crate::track::ModalRequest::Dismiss(id)));
        assert_eq!(track.keys().keyframes()[0].value.as_event(), Some("gO"));
    }
}
