// SPDX-License-Identifier: MIT OR Apache-2.0
//! Media track wrapping an externally decoded player.
//!
//! Decoding is left to the host. The track only needs a [`MediaPlayer`] to
//! drive and can take over playback from the timeline clock.

use super::{TimeControl, Track, TrackCommon, TrackContext, TrackKind};
use crate::error::Result;
use crate::state::{self, StateBuffer};
use serde::{Deserialize, Serialize};
use std::any::Any;

/// Host-provided media playback
pub trait MediaPlayer: Send {
    /// Start playback
    fn play(&mut self);

    /// Stop playback
    fn stop(&mut self);

    /// Whether playback is running
    fn is_playing(&self) -> bool;

    /// Position in seconds
    fn position(&self) -> f64;

    /// Seek to a position in seconds
    fn set_position(&mut self, seconds: f64);

    /// Media length in seconds
    fn duration(&self) -> f64;

    /// Media length in frames, zero when unknown
    fn total_frames(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct MediaState {
    offset_millis: i64,
}

/// A lane backed by a [`MediaPlayer`]
pub struct MediaTrack {
    common: TrackCommon,
    player: Box<dyn MediaPlayer>,
    state: MediaState,
}

impl MediaTrack {
    /// Create a media track around a player
    pub fn new(name: impl Into<String>, player: Box<dyn MediaPlayer>) -> Self {
        Self {
            common: TrackCommon::new(name),
            player,
            state: MediaState { offset_millis: 0 },
        }
    }

    /// The wrapped player
    pub fn player(&self) -> &dyn MediaPlayer {
        self.player.as_ref()
    }

    /// The wrapped player, mutable
    pub fn player_mut(&mut self) -> &mut dyn MediaPlayer {
        self.player.as_mut()
    }

    /// Media frames per second, if the player reports frames
    pub fn frame_rate(&self) -> Option<f64> {
        let frames = self.player.total_frames();
        let duration = self.player.duration();
        (frames > 0 && duration > 0.0).then(|| frames as f64 / duration)
    }

    /// Where media time zero sits on the timeline
    pub fn offset_millis(&self) -> i64 {
        self.state.offset_millis
    }

    /// Move media time zero along the timeline
    pub fn set_offset_millis(&mut self, offset_millis: i64) {
        self.state.offset_millis = offset_millis;
    }

    fn offset_seconds(&self) -> f64 {
        self.state.offset_millis as f64 / 1000.0
    }
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("common", &self.common)
            .field("offset_millis", &self.state.offset_millis)
            .finish_non_exhaustive()
    }
}

impl TimeControl for MediaTrack {
    fn play(&mut self) {
        tracing::debug!("Media track '{}' playing", self.common.name);
        self.player.play();
    }

    fn stop(&mut self) {
        tracing::debug!("Media track '{}' stopped", self.common.name);
        self.player.stop();
    }

    fn is_playing(&self) -> bool {
        self.player.is_playing()
    }

    fn current_time(&self) -> f64 {
        (self.player.position() + self.offset_seconds()).max(0.0)
    }

    fn set_current_time(&mut self, seconds: f64) {
        let position = (seconds - self.offset_seconds()).clamp(0.0, self.player.duration().max(0.0));
        self.player.set_position(position);
    }
}

impl Track for MediaTrack {
    fn common(&self) -> &TrackCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut TrackCommon {
        &mut self.common
    }

    fn kind(&self) -> TrackKind {
        TrackKind::Media
    }

    fn serialize_state(&self) -> Result<StateBuffer> {
        StateBuffer::encode(&self.state)
    }

    fn restore_state(&mut self, buffer: &StateBuffer) -> Result<()> {
        self.state = buffer.decode()?;
        Ok(())
    }

    fn to_document(&self) -> Result<String> {
        state::to_document(&self.state)
    }

    fn load_document(&mut self, document: &str) -> Result<()> {
        self.state = state::from_document(document)?;
        Ok(())
    }

    fn clear(&mut self) {
        self.state.offset_millis = 0;
    }

    fn update(&mut self, ctx: &mut TrackContext<'_>) {
        // Follow the timeline when it drives time itself
        if ctx.is_playing && !self.player.is_playing() {
            let seconds = ctx.current_millis as f64 / 1000.0;
            if (self.current_time() - seconds).abs() > 1.0 / ctx.timecode.fps() {
                self.set_current_time(seconds);
            }
        }
    }

    fn time_control(&mut self) -> Option<&mut dyn TimeControl> {
        Some(self)
    }

    fn time_control_ref(&self) -> Option<&dyn TimeControl> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
