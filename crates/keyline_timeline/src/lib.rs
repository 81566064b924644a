// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline state engine for Keyline.
//!
//! This crate provides the non-drawing half of a timeline/sequencer:
//! - Pages of tracks with unique names across the whole timeline
//! - Keyframe tracks (curves, switches, bangs, flags, colors) and media tracks
//! - Gesture-based undo/redo over track state snapshots
//! - A playback clock with loop modes, polled or on its own thread
//! - A zoomable viewport and screen/time coordinate mapping
//!
//! ## Architecture
//!
//! [`Timeline`] is the aggregate root. It owns:
//! - [`Page`]s, which own their [`Track`]s
//! - the [`UndoEngine`]
//! - the [`PlaybackClock`]
//! - the [`ZoomController`] and the fixed controls
//!
//! Hosts feed it [`InputEvent`]s, call [`Timeline::update`] once per frame
//! and listen for [`TimelineEvent`]s.

pub mod clock;
pub mod config;
pub mod controls;
pub mod error;
pub mod events;
pub mod input;
pub mod keyframe;
pub mod mapping;
pub mod page;
pub mod range;
pub mod state;
pub mod timecode;
pub mod timeline;
pub mod track;
pub mod undo;
pub mod zoom;

pub use clock::{
    LoopMode, ManualTimeSource, PlaybackClock, PlaybackState, PlayheadSpan, SystemTimeSource, TimeSource,
};
pub use config::TimelineSettings;
pub use error::{Result, TimelineError};
pub use events::{EventSink, PlaybackEventArgs, TimelineEvent, ZoomEventArgs};
pub use input::{InputEvent, KeyEvent, PointerEvent, PointerTracker};
pub use keyframe::{InterpolationMode, Keyframe, KeyframeId, KeyframeSet, KeyframeValue};
pub use mapping::ScreenMapping;
pub use page::Page;
pub use range::NormalizedRange;
pub use state::StateBuffer;
pub use timecode::Timecode;
pub use timeline::Timeline;
pub use track::{KeyframeKind, KeyframeTrack, MediaPlayer, MediaTrack, TimeControl, Track, TrackId, TrackKind};
pub use undo::{UndoEngine, UndoStats};
pub use zoom::ZoomController;
