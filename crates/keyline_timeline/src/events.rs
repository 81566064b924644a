// SPDX-License-Identifier: MIT OR Apache-2.0
//! Notifications published by the timeline.
//!
//! There is no global dispatcher. Each timeline owns an [`EventSink`] and
//! hands clones of it to the components that publish (playback clock,
//! zoom controller). Listeners call [`EventSink::subscribe`] and drain
//! their receiver whenever convenient.

use crate::range::NormalizedRange;
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Snapshot of the playhead carried by playback notifications
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackEventArgs {
    /// Current time in seconds
    pub current_time: f64,
    /// Current frame
    pub current_frame: i64,
    /// Total duration in seconds
    pub duration_seconds: f64,
    /// Total duration in frames
    pub duration_frames: i64,
    /// Current time as a fraction of the duration
    pub current_percent: f64,
}

/// Old and new viewport carried by zoom notifications
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomEventArgs {
    /// Viewport after the change
    pub current_zoom: NormalizedRange,
    /// Viewport before the change
    pub old_zoom: NormalizedRange,
}

/// Events emitted by the timeline
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    /// Playback began
    PlaybackStarted(PlaybackEventArgs),
    /// Playback stopped
    PlaybackEnded(PlaybackEventArgs),
    /// Playback wrapped (or reflected) at a loop boundary
    PlaybackLooped(PlaybackEventArgs),
    /// A zoom gesture began
    ZoomStarted(ZoomEventArgs),
    /// The viewport moved during a zoom gesture
    ZoomDragged(ZoomEventArgs),
    /// A zoom gesture finished or the viewport was set directly
    ZoomEnded(ZoomEventArgs),
    /// Layout changed (width, offset, pages or tracks)
    ViewResized,
    /// The current page changed
    PageChanged {
        /// Page that was current before, if any
        previous: Option<String>,
        /// Page that is current now
        current: String,
    },
    /// The playhead crossed a bang or flag during playback
    Bang {
        /// Track the marker belongs to
        track: String,
        /// Marker text (empty for plain bangs)
        label: String,
        /// Marker time in milliseconds
        time_millis: u64,
    },
}

/// Fan-out sender shared by everything that publishes timeline events
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    subscribers: Arc<Mutex<Vec<Sender<TimelineEvent>>>>,
}

impl EventSink {
    /// Create a sink with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn subscribe(&self) -> Receiver<TimelineEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Publish an event. Subscribers whose receiver was dropped are removed.
    pub fn emit(&self, event: TimelineEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out() {
        let sink = EventSink::new();
        let a = sink.subscribe();
        let b = sink.subscribe();
        sink.emit(TimelineEvent::ViewResized);
        assert_eq!(a.try_recv().unwrap(), TimelineEvent::ViewResized);
        assert_eq!(b.try_recv().unwrap(), TimelineEvent::ViewResized);
    }

    #[test]
    fn test_dropped_subscribers_pruned() {
        let sink = EventSink::new();
        let kept = sink.subscribe();
        drop(sink.subscribe());
        sink.emit(TimelineEvent::ViewResized);
        assert_eq!(sink.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
