// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyframe data shared by the keyframe-based track kinds.
//!
//! Times are milliseconds from the start of the timeline. A
//! [`KeyframeSet`] keeps its keyframes sorted by time and tracks which of
//! them are selected.

use crate::clock::PlayheadSpan;
use crate::mapping::ScreenMapping;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Unique identifier for a keyframe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyframeId(pub Uuid);

impl KeyframeId {
    /// Create a new random keyframe ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for KeyframeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpolation mode between keyframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InterpolationMode {
    /// Hold the value until the next keyframe
    Constant,
    /// Linear interpolation
    #[default]
    Linear,
    /// Ease in and out
    Smooth,
}

/// Value stored in a keyframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyframeValue {
    /// Curve value
    Float(f32),
    /// Color (RGBA, 0..1)
    Color([f32; 4]),
    /// Switch state
    Bool(bool),
    /// Bang or flag text
    Event(String),
}

impl KeyframeValue {
    /// Interpolate between two keyframe values
    pub fn interpolate(&self, other: &KeyframeValue, t: f32, mode: InterpolationMode) -> Option<KeyframeValue> {
        let t = match mode {
            InterpolationMode::Constant => return Some(self.clone()),
            InterpolationMode::Linear => t,
            InterpolationMode::Smooth => Interpolation::smoothstep(t),
        };

        match (self, other) {
            (KeyframeValue::Float(a), KeyframeValue::Float(b)) => {
                Some(KeyframeValue::Float(Interpolation::lerp(*a, *b, t)))
            }
            (KeyframeValue::Color(a), KeyframeValue::Color(b)) => {
                Some(KeyframeValue::Color(Interpolation::lerp_vec4(*a, *b, t)))
            }
            // Steps, never blended
            (KeyframeValue::Bool(a), KeyframeValue::Bool(_)) => Some(KeyframeValue::Bool(*a)),
            (KeyframeValue::Event(a), KeyframeValue::Event(_)) => Some(KeyframeValue::Event(a.clone())),
            _ => None,
        }
    }

    /// Get as float if possible
    pub fn as_float(&self) -> Option<f32> {
        match self {
            KeyframeValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as color if possible
    pub fn as_color(&self) -> Option<[f32; 4]> {
        match self {
            KeyframeValue::Color(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as switch state if possible
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            KeyframeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as event text if possible
    pub fn as_event(&self) -> Option<&str> {
        match self {
            KeyframeValue::Event(v) => Some(v),
            _ => None,
        }
    }
}

/// A keyframe in a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    /// Unique keyframe ID
    pub id: KeyframeId,
    /// Time in milliseconds
    pub time: u64,
    /// Value at this keyframe
    pub value: KeyframeValue,
    /// Interpolation mode to next keyframe
    pub interpolation: InterpolationMode,
}

impl Keyframe {
    /// Create a new keyframe
    pub fn new(time: u64, value: KeyframeValue) -> Self {
        Self {
            id: KeyframeId::new(),
            time,
            value,
            interpolation: InterpolationMode::Linear,
        }
    }

    /// Set interpolation mode
    pub fn with_interpolation(mut self, mode: InterpolationMode) -> Self {
        self.interpolation = mode;
        self
    }
}

/// Interpolation utilities
pub struct Interpolation;

impl Interpolation {
    /// Linear interpolation between two floats
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }

    /// Interpolate Vec4
    pub fn lerp_vec4(a: [f32; 4], b: [f32; 4], t: f32) -> [f32; 4] {
        [
            Self::lerp(a[0], b[0], t),
            Self::lerp(a[1], b[1], t),
            Self::lerp(a[2], b[2], t),
            Self::lerp(a[3], b[3], t),
        ]
    }

    /// Hermite ease with zero end tangents
    pub fn smoothstep(t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        t * t * (3.0 - 2.0 * t)
    }
}

/// Sorted keyframes plus selection
#[derive(Debug, Clone, Default)]
pub struct KeyframeSet {
    keyframes: Vec<Keyframe>,
    selected: HashSet<KeyframeId>,
}

impl KeyframeSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// All keyframes, sorted by time
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Get keyframe count
    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    /// Whether there are no keyframes
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Replace every keyframe. Selection is kept for ids that survive.
    pub fn set_keyframes(&mut self, keyframes: Vec<Keyframe>) {
        self.keyframes = keyframes;
        self.sort_keyframes();
        let ids: HashSet<KeyframeId> = self.keyframes.iter().map(|k| k.id).collect();
        self.selected.retain(|id| ids.contains(id));
    }

    /// Add a keyframe
    pub fn add(&mut self, keyframe: Keyframe) -> KeyframeId {
        let id = keyframe.id;
        self.keyframes.push(keyframe);
        self.sort_keyframes();
        id
    }

    /// Remove a keyframe
    pub fn remove(&mut self, id: KeyframeId) -> Option<Keyframe> {
        let idx = self.keyframes.iter().position(|k| k.id == id)?;
        self.selected.remove(&id);
        Some(self.keyframes.remove(idx))
    }

    /// Remove everything
    pub fn clear(&mut self) {
        self.keyframes.clear();
        self.selected.clear();
    }

    /// Get keyframe by ID
    pub fn keyframe(&self, id: KeyframeId) -> Option<&Keyframe> {
        self.keyframes.iter().find(|k| k.id == id)
    }

    /// Get mutable keyframe by ID. Call [`Self::resort`] after changing times.
    pub fn keyframe_mut(&mut self, id: KeyframeId) -> Option<&mut Keyframe> {
        self.keyframes.iter_mut().find(|k| k.id == id)
    }

    /// Restore time order after direct edits
    pub fn resort(&mut self) {
        self.sort_keyframes();
    }

    fn sort_keyframes(&mut self) {
        // Stable sort keeps insertion order for equal times
        self.keyframes.sort_by_key(|k| k.time);
    }

    /// Evaluate the value at a given time
    pub fn evaluate(&self, time: u64) -> Option<KeyframeValue> {
        let next_idx = self.keyframes.iter().position(|k| k.time >= time);

        match next_idx {
            None => self.keyframes.last().map(|k| k.value.clone()),
            Some(0) => self.keyframes.first().map(|k| k.value.clone()),
            Some(idx) => {
                let a = &self.keyframes[idx - 1];
                let b = &self.keyframes[idx];
                if b.time == a.time || b.time == time {
                    return Some(b.value.clone());
                }
                let t = (time - a.time) as f32 / (b.time - a.time) as f32;
                a.value.interpolate(&b.value, t, a.interpolation)
            }
        }
    }

    /// Last keyframe at or before `time`
    pub fn last_at_or_before(&self, time: u64) -> Option<&Keyframe> {
        self.keyframes.iter().rev().find(|k| k.time <= time)
    }

    /// Keyframes the playhead crossed in `span`, in crossing order
    pub fn crossed_by(&self, span: &PlayheadSpan) -> Vec<&Keyframe> {
        let mut crossed: Vec<&Keyframe> = self.keyframes.iter().filter(|k| span.contains(k.time)).collect();
        if span.reverse {
            crossed.reverse();
        }
        crossed
    }

    /// Earliest keyframe time
    pub fn earliest_time(&self) -> Option<u64> {
        self.keyframes.first().map(|k| k.time)
    }

    /// Latest keyframe time
    pub fn latest_time(&self) -> Option<u64> {
        self.keyframes.last().map(|k| k.time)
    }

    /// Earliest selected keyframe time
    pub fn earliest_selected_time(&self) -> Option<u64> {
        self.selected_keyframes().map(|k| k.time).min()
    }

    /// Latest selected keyframe time
    pub fn latest_selected_time(&self) -> Option<u64> {
        self.selected_keyframes().map(|k| k.time).max()
    }

    // Selection

    /// Whether a keyframe is selected
    pub fn is_selected(&self, id: KeyframeId) -> bool {
        self.selected.contains(&id)
    }

    /// Select a keyframe, replacing the selection unless `additive`
    pub fn select(&mut self, id: KeyframeId, additive: bool) {
        if !additive {
            self.selected.clear();
        }
        if self.keyframe(id).is_some() {
            self.selected.insert(id);
        }
    }

    /// Toggle a keyframe's selection
    pub fn toggle_selected(&mut self, id: KeyframeId) {
        if !self.selected.remove(&id) && self.keyframe(id).is_some() {
            self.selected.insert(id);
        }
    }

    /// Select every keyframe
    pub fn select_all(&mut self) {
        self.selected = self.keyframes.iter().map(|k| k.id).collect();
    }

    /// Clear the selection
    pub fn unselect_all(&mut self) {
        self.selected.clear();
    }

    /// Number of selected keyframes
    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Selected keyframes in time order
    pub fn selected_keyframes(&self) -> impl Iterator<Item = &Keyframe> {
        self.keyframes.iter().filter(|k| self.selected.contains(&k.id))
    }

    /// Nearest keyframe within `tolerance` pixels of screen x
    pub fn hit_test(&self, mapping: &ScreenMapping, x: f32, tolerance: f32) -> Option<KeyframeId> {
        self.keyframes
            .iter()
            .map(|k| (k.id, (mapping.millis_to_screen_x(k.time as i64) - x).abs()))
            .filter(|(_, distance)| *distance <= tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    // Editing selected keyframes

    /// Shift selected keyframe times by `delta` milliseconds, clamped to
    /// `[0, max_time]`. Returns whether anything moved.
    pub fn offset_selected(&mut self, delta: i64, max_time: u64) -> bool {
        let mut moved = false;
        for kf in self.keyframes.iter_mut().filter(|k| self.selected.contains(&k.id)) {
            let new_time = (kf.time as i64 + delta).clamp(0, max_time as i64) as u64;
            if new_time != kf.time {
                kf.time = new_time;
                moved = true;
            }
        }
        if moved {
            self.sort_keyframes();
        }
        moved
    }

    /// Shift selected float values by `delta`, clamped to `[min, max]`
    pub fn offset_selected_values(&mut self, delta: f32, min: f32, max: f32) -> bool {
        let mut changed = false;
        for kf in self.keyframes.iter_mut().filter(|k| self.selected.contains(&k.id)) {
            if let KeyframeValue::Float(value) = &mut kf.value {
                let new_value = (*value + delta).clamp(min, max);
                if new_value != *value {
                    *value = new_value;
                    changed = true;
                }
            }
        }
        changed
    }

    /// Delete selected keyframes, returning how many went
    pub fn delete_selected(&mut self) -> usize {
        let before = self.keyframes.len();
        let selected = std::mem::take(&mut self.selected);
        self.keyframes.retain(|k| !selected.contains(&k.id));
        before - self.keyframes.len()
    }

    /// Serialize selected keyframes for the pasteboard
    pub fn copy_selected(&self) -> Vec<String> {
        self.selected_keyframes()
            .filter_map(|k| match ron::to_string(k) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("Failed to copy keyframe: {}", e);
                    None
                }
            })
            .collect()
    }

    /// Paste pasteboard items so the earliest lands at `at_time`.
    /// Items that aren't keyframes, or whose value `accepts` rejects, are
    /// skipped. Pasted keyframes become the selection.
    pub fn paste(
        &mut self,
        items: &[String],
        at_time: u64,
        max_time: u64,
        accepts: impl Fn(&KeyframeValue) -> bool,
    ) -> usize {
        let parsed: Vec<Keyframe> = items
            .iter()
            .filter_map(|item| ron::from_str::<Keyframe>(item).ok())
            .filter(|k| accepts(&k.value))
            .collect();

        let Some(earliest) = parsed.iter().map(|k| k.time).min() else {
            return 0;
        };

        self.selected.clear();
        let count = parsed.len();
        for mut kf in parsed {
            kf.id = KeyframeId::new();
            kf.time = (at_time + (kf.time - earliest)).min(max_time);
            self.selected.insert(kf.id);
            self.keyframes.push(kf);
        }
        self.sort_keyframes();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_set() -> KeyframeSet {
        let mut set = KeyframeSet::new();
        set.add(Keyframe::new(1000, KeyframeValue::Float(0.0)));
        set.add(Keyframe::new(0, KeyframeValue::Float(1.0)));
        set.add(Keyframe::new(2000, KeyframeValue::Float(1.0)));
        set
    }

    #[test]
    fn test_sorted_on_insert() {
        let set = float_set();
        let times: Vec<u64> = set.keyframes().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0, 1000, 2000]);
    }

    #[test]
    fn test_evaluate_linear() {
        let set = float_set();
        assert_eq!(set.evaluate(500).unwrap().as_float(), Some(0.5));
        assert_eq!(set.evaluate(1500).unwrap().as_float(), Some(0.5));
        assert_eq!(set.evaluate(5000).unwrap().as_float(), Some(1.0));
    }

    #[test]
    fn test_evaluate_constant_holds() {
        let mut set = KeyframeSet::new();
        set.add(Keyframe::new(0, KeyframeValue::Float(2.0)).with_interpolation(InterpolationMode::Constant));
        set.add(Keyframe::new(100, KeyframeValue::Float(4.0)));
        assert_eq!(set.evaluate(99).unwrap().as_float(), Some(2.0));
        assert_eq!(set.evaluate(100).unwrap().as_float(), Some(4.0));
    }

    #[test]
    fn test_selection_bounds_and_delete() {
        let mut set = float_set();
        let ids: Vec<KeyframeId> = set.keyframes().iter().map(|k| k.id).collect();
        set.select(ids[1], false);
        set.select(ids[2], true);
        assert_eq!(set.selected_count(), 2);
        assert_eq!(set.earliest_selected_time(), Some(1000));
        assert_eq!(set.latest_selected_time(), Some(2000));
        assert_eq!(set.delete_selected(), 2);
        assert_eq!(set.len(), 1);
        assert_eq!(set.selected_count(), 0);
    }

    #[test]
    fn test_offset_selected_clamps() {
        let mut set = float_set();
        set.select_all();
        assert!(set.offset_selected(-500, 2000));
        let times: Vec<u64> = set.keyframes().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![0, 500, 1500]);
        assert!(!set.offset_selected(0, 2000));
    }

    #[test]
    fn test_copy_paste_at_time() {
        let mut set = float_set();
        let first = set.keyframes()[1].id;
        let second = set.keyframes()[2].id;
        set.select(first, false);
        set.select(second, true);
        let items = set.copy_selected();
        assert_eq!(items.len(), 2);

        let mut target = KeyframeSet::new();
        let pasted = target.paste(&items, 5000, 10_000, |v| v.as_float().is_some());
        assert_eq!(pasted, 2);
        let times: Vec<u64> = target.keyframes().iter().map(|k| k.time).collect();
        assert_eq!(times, vec![5000, 6000]);
        assert_eq!(target.selected_count(), 2);
        assert_ne!(target.keyframes()[0].id, first);
    }

    #[test]
    fn test_paste_rejects_foreign_values() {
        let mut set = float_set();
        set.select_all();
        let items = set.copy_selected();
        let mut target = KeyframeSet::new();
        assert_eq!(target.paste(&items, 0, 10_000, |v| v.as_bool().is_some()), 0);
        assert_eq!(target.paste(&["garbage".to_string()], 0, 10_000, |_| true), 0);
    }
}
