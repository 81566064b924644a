// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline settings.
//!
//! Settings are stored as pretty RON. Files written by a newer format
//! version are refused rather than half-read.

use crate::clock::LoopMode;
use crate::error::{Result, TimelineError};
use crate::state;
use crate::timecode::DEFAULT_FRAME_RATE;
use crate::undo::DEFAULT_MAX_UNDO_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Default duration in seconds
pub const DEFAULT_DURATION_SECONDS: f64 = 100.0 / 3.0;

/// Settings applied when a timeline is created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSettings {
    /// Format version of the file
    pub format_version: u32,
    /// Timeline name, used as the prefix of every persisted file
    pub name: String,
    /// Folder persisted files live in
    pub working_folder: PathBuf,
    /// Total duration in seconds
    pub duration_seconds: f64,
    /// Frames per second
    pub frame_rate: f64,
    /// Advance one frame per tick instead of following the wall clock
    pub frame_based: bool,
    /// Loop behavior at the out point
    pub loop_mode: LoopMode,
    /// Persist tracks as soon as they change
    pub autosave: bool,
    /// Record undo history
    pub undo_enabled: bool,
    /// Undo frames kept, 0 for no limit
    pub max_undo_depth: usize,
    /// Move the playhead to the end of pasted items
    pub move_playhead_on_paste: bool,
    /// Quantize dragged item times to a measure grid
    pub snap_to_bpm: bool,
    /// Tempo of the snap grid
    pub bpm: f64,
    /// Snap dragged keyframes to keyframes on the other tracks
    pub snap_to_other_keyframes: bool,
    /// Keep the playhead on the keyframe being dragged
    pub move_playhead_on_drag: bool,
    /// Show the time ruler
    pub show_ticker: bool,
    /// Show the in/out bar
    pub show_inout_control: bool,
    /// Show the zoom bar
    pub show_zoomer: bool,
    /// Width of the timeline in pixels
    pub width: f32,
    /// Top-left corner of the timeline
    pub offset: [f32; 2],
    /// Run the playback clock on its own thread
    pub threaded_playback: bool,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            format_version: SETTINGS_FORMAT_VERSION,
            name: "timeline0".to_string(),
            working_folder: PathBuf::from("timeline0"),
            duration_seconds: DEFAULT_DURATION_SECONDS,
            frame_rate: DEFAULT_FRAME_RATE,
            frame_based: false,
            loop_mode: LoopMode::None,
            autosave: true,
            undo_enabled: true,
            max_undo_depth: DEFAULT_MAX_UNDO_DEPTH,
            move_playhead_on_paste: true,
            snap_to_bpm: false,
            bpm: 120.0,
            snap_to_other_keyframes: true,
            move_playhead_on_drag: false,
            show_ticker: true,
            show_inout_control: true,
            show_zoomer: true,
            width: 1024.0,
            offset: [0.0, 0.0],
            threaded_playback: false,
        }
    }
}

impl TimelineSettings {
    /// Settings for a named timeline whose files go in a folder of the same name
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            working_folder: PathBuf::from(&name),
            name,
            ..Self::default()
        }
    }

    /// Load settings from a RON file
    pub fn load(path: &Path) -> Result<Self> {
        let settings: TimelineSettings = state::load_document(path)?;

        if settings.format_version > SETTINGS_FORMAT_VERSION {
            return Err(TimelineError::UnsupportedVersion {
                found: settings.format_version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }

        tracing::info!("Loaded timeline settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to a RON file
    pub fn save(&self, path: &Path) -> Result<()> {
        state::save_document(self, path)?;
        tracing::info!("Saved timeline settings to {:?}", path);
        Ok(())
    }
}
