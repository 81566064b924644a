// SPDX-License-Identifier: MIT OR Apache-2.0
//! Track factories, lookups and removal.

use super::Timeline;
use crate::error::{Result, TimelineError};
use crate::keyframe::KeyframeValue;
use crate::state::file_name_for;
use crate::track::{KeyframeTrack, MediaPlayer, MediaTrack, Track, TrackId};

impl Timeline {
    /// `name` if no track uses it, otherwise the first free `name_N`
    pub fn confirmed_unique_name(&self, name: &str) -> String {
        if !self.track_pages.contains_key(name) {
            return name.to_string();
        }
        (0..)
            .map(|n| format!("{}_{}", name, n))
            .find(|candidate| !self.track_pages.contains_key(candidate))
            .unwrap_or_else(|| name.to_string())
    }

    /// File name a track is persisted under
    pub fn name_to_file_name(&self, track_name: &str) -> String {
        file_name_for(&self.settings.name, track_name)
    }

    /// Add a track to the current page. The name is made unique, the
    /// track is pointed at its file in the working folder and loaded.
    pub fn add_track(&mut self, mut track: Box<dyn Track>) -> Result<TrackId> {
        let Some(page_index) = self.current_page else {
            tracing::error!("Cannot add track '{}' before setup", track.name());
            return Err(TimelineError::NotSetUp);
        };

        let name = self.confirmed_unique_name(track.name());
        if name != track.name() {
            tracing::debug!("Track name '{}' taken, using '{}'", track.name(), name);
        }
        let path = self.settings.working_folder.join(self.name_to_file_name(&name));
        {
            let common = track.common_mut();
            common.name = name.clone();
            common.autosave = self.settings.autosave;
            common.file_path = Some(path);
        }
        if let Err(e) = track.load() {
            tracing::error!("Failed to load track '{}': {}", name, e);
        }

        let id = self.pages[page_index].add_track(track);
        self.pages[page_index].set_zoom_bounds(self.zoom.view_range());
        self.track_pages.insert(name.clone(), page_index);
        tracing::info!("Added track '{}' to page '{}'", name, self.pages[page_index].name());
        self.view_resized();
        Ok(id)
    }

    fn add_keyframe_track(&mut self, track: KeyframeTrack) -> Result<TrackId> {
        self.add_track(Box::new(track))
    }

    /// Add a curve track over `[min, max]` reading `default_value` when empty
    pub fn add_curves(&mut self, name: &str, min: f32, max: f32, default_value: f32) -> Result<TrackId> {
        let mut track = KeyframeTrack::curves(name, min, max);
        track.set_default_value(default_value);
        self.add_keyframe_track(track)
    }

    /// Add an on/off switch track
    pub fn add_switches(&mut self, name: &str) -> Result<TrackId> {
        self.add_keyframe_track(KeyframeTrack::switches(name))
    }

    /// Add a bang track
    pub fn add_bangs(&mut self, name: &str) -> Result<TrackId> {
        self.add_keyframe_track(KeyframeTrack::bangs(name))
    }

    /// Add a flag track (bangs with editable text)
    pub fn add_flags(&mut self, name: &str) -> Result<TrackId> {
        self.add_keyframe_track(KeyframeTrack::flags(name))
    }

    /// Add a color track
    pub fn add_colors(&mut self, name: &str) -> Result<TrackId> {
        self.add_keyframe_track(KeyframeTrack::colors(name))
    }

    /// Add a media track. When the player reports frames it takes over
    /// playback and the timeline adopts its frame rate and length.
    pub fn add_media_track(&mut self, name: &str, player: Box<dyn MediaPlayer>) -> Result<TrackId> {
        let track = MediaTrack::new(name, player);
        let frame_rate = track.frame_rate();
        let total_frames = track.player().total_frames();
        let id = self.add_track(Box::new(track))?;

        if let Some(fps) = frame_rate {
            self.set_time_control_track(Some(id));
            self.set_frame_rate(fps);
            if let Err(e) = self.set_duration_in_frames(total_frames as i64) {
                tracing::error!("Media track '{}' has an unusable length: {}", name, e);
            }
        }
        Ok(id)
    }

    // Lookup

    /// Whether a track with this name exists on any page
    pub fn has_track(&self, name: &str) -> bool {
        self.track_pages.contains_key(name)
    }

    /// ID of the named track
    pub fn track_id(&self, name: &str) -> Option<TrackId> {
        self.get_track(name).map(|t| t.id())
    }

    /// Track by name, on any page
    pub fn get_track(&self, name: &str) -> Option<&dyn Track> {
        let track = self
            .track_pages
            .get(name)
            .and_then(|&index| self.pages.get(index))
            .and_then(|page| page.track(name));
        if track.is_none() {
            tracing::error!("Couldn't find track '{}'", name);
        }
        track
    }

    /// Mutable track by name, on any page
    pub fn get_track_mut(&mut self, name: &str) -> Option<&mut dyn Track> {
        let Some(&index) = self.track_pages.get(name) else {
            tracing::error!("Couldn't find track '{}'", name);
            return None;
        };
        self.pages.get_mut(index)?.track_mut(name)
    }

    /// Page holding the named track
    pub fn page_of_track(&self, name: &str) -> Option<&str> {
        let &index = self.track_pages.get(name)?;
        self.pages.get(index).map(|page| page.name())
    }

    fn keyframe_track(&self, name: &str) -> Option<&KeyframeTrack> {
        let track = self.get_track(name)?;
        let keyframes = track.as_any().downcast_ref::<KeyframeTrack>();
        if keyframes.is_none() {
            tracing::error!("Track '{}' is a {} track", name, track.kind().name());
        }
        keyframes
    }

    /// Mutable keyframe track by name
    pub fn keyframe_track_mut(&mut self, name: &str) -> Option<&mut KeyframeTrack> {
        self.get_track_mut(name)?.as_any_mut().downcast_mut::<KeyframeTrack>()
    }

    /// Add a keyframe to the named track
    pub fn add_keyframe(&mut self, name: &str, millis: u64, value: KeyframeValue) -> Result<()> {
        let track = self
            .keyframe_track_mut(name)
            .ok_or_else(|| TimelineError::TrackNotFound(name.to_string()))?;
        if track.add_keyframe(millis, value).is_some() {
            let id = track.common().id;
            self.flag_track_modified(id);
        }
        Ok(())
    }

    // Values

    /// Curve value at the playhead
    pub fn value(&self, name: &str) -> Option<f32> {
        self.value_at_millis(name, self.current_time_millis())
    }

    /// Curve value at a time
    pub fn value_at_millis(&self, name: &str, millis: u64) -> Option<f32> {
        self.keyframe_track(name).map(|t| t.value_at(millis))
    }

    /// Switch state at the playhead
    pub fn is_switch_on(&self, name: &str) -> Option<bool> {
        self.is_switch_on_at_millis(name, self.current_time_millis())
    }

    /// Switch state at a time
    pub fn is_switch_on_at_millis(&self, name: &str, millis: u64) -> Option<bool> {
        self.keyframe_track(name).map(|t| t.is_on_at(millis))
    }

    /// Color at the playhead
    pub fn color(&self, name: &str) -> Option<[f32; 4]> {
        self.color_at_millis(name, self.current_time_millis())
    }

    /// Color at a time
    pub fn color_at_millis(&self, name: &str, millis: u64) -> Option<[f32; 4]> {
        self.keyframe_track(name).map(|t| t.color_at(millis))
    }

    // Removal and order

    /// Remove a track from the timeline and from undo history
    pub fn remove_track(&mut self, name: &str) -> Result<Box<dyn Track>> {
        let Some(index) = self.track_pages.get(name).copied() else {
            tracing::error!("Couldn't find track '{}' to remove", name);
            return Err(TimelineError::TrackNotFound(name.to_string()));
        };
        let id = self.pages[index]
            .track(name)
            .map(|t| t.id())
            .ok_or_else(|| TimelineError::TrackNotFound(name.to_string()))?;

        if self.modal == Some(id) {
            self.dismissed_modal_content();
        }
        if self.time_control == Some(id) {
            self.time_control = None;
        }
        self.undo.purge_track(id);

        let track = self.pages[index]
            .remove_track(id)
            .ok_or_else(|| TimelineError::TrackNotFound(name.to_string()))?;
        self.track_pages.shift_remove(name);
        tracing::info!("Removed track '{}'", name);
        self.view_resized();
        Ok(track)
    }

    /// Move a track to the top of its page
    pub fn bring_track_to_top(&mut self, name: &str) -> Result<()> {
        self.reorder_track(name, true)
    }

    /// Move a track to the bottom of its page
    pub fn bring_track_to_bottom(&mut self, name: &str) -> Result<()> {
        self.reorder_track(name, false)
    }

    fn reorder_track(&mut self, name: &str, to_top: bool) -> Result<()> {
        let not_found = || TimelineError::TrackNotFound(name.to_string());
        let index = self.track_pages.get(name).copied().ok_or_else(not_found)?;
        let page = &mut self.pages[index];
        let id = page.track(name).map(|t| t.id()).ok_or_else(not_found)?;
        let moved = if to_top {
            page.bring_track_to_top(id)
        } else {
            page.bring_track_to_bottom(id)
        };
        if !moved {
            return Err(not_found());
        }
        self.view_resized();
        Ok(())
    }
}
