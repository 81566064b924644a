// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playback clock.
//!
//! Current time is derived from an anchor taken when playback starts:
//! `current = anchor_time + (now - anchor_wall)` in continuous mode, or one
//! frame per tick in frame-based mode. Ticks come either from the host
//! calling [`PlaybackClock::update_time`] once per frame, or from a
//! dedicated thread started with [`PlaybackClock::move_to_thread`]. Only
//! one of the two drives the clock at a time.
//!
//! The clock state lives behind a mutex shared with the thread. The owner
//! thread is the only one that starts or stops playback; the clock thread
//! only advances time.

use crate::error::{Result, TimelineError};
use crate::events::{EventSink, PlaybackEventArgs, TimelineEvent};
use crate::range::NormalizedRange;
use crate::timecode::Timecode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Sleep between ticks of the clock thread in continuous mode
const THREAD_TICK: Duration = Duration::from_millis(1);

/// Longest accepted duration, about 31 years
pub const MAX_DURATION_SECONDS: f64 = 1.0e9;

/// Crossed spans kept until the owner drains them
const MAX_PENDING_SPANS: usize = 256;

/// Wall-clock source
pub trait TimeSource: Send + Sync {
    /// Seconds since an arbitrary fixed origin
    fn now_seconds(&self) -> f64;
}

/// Monotonic system time
#[derive(Debug)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    /// Start counting from now
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now_seconds(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Time source that only moves when told to
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: Mutex<f64>,
}

impl ManualTimeSource {
    /// Start at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, seconds: f64) {
        *self.now.lock() += seconds;
    }

    /// Jump to an absolute time
    pub fn set(&self, seconds: f64) {
        *self.now.lock() = seconds;
    }
}

impl TimeSource for ManualTimeSource {
    fn now_seconds(&self) -> f64 {
        *self.now.lock()
    }
}

/// What happens at the out point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    /// Stop at the out point
    #[default]
    None,
    /// Jump back to the in point
    Normal,
    /// Reverse direction at either end
    Palindrome,
}

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// Not playing
    #[default]
    Stopped,
    /// Playing forward
    Playing,
    /// Playing backward (palindrome return leg)
    Reverse,
}

impl PlaybackState {
    /// Playing in either direction
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::Playing | Self::Reverse)
    }
}

/// Stretch of time the playhead crossed while playing, in milliseconds
///
/// Consecutive ticks in one direction merge into a single span. A boundary
/// (loop wrap, palindrome reflection, stop at the out point) starts a new
/// one, so every marker is crossed once per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayheadSpan {
    /// Earlier end
    pub start: u64,
    /// Later end
    pub end: u64,
    /// Whether a marker exactly at `start` was crossed
    pub includes_start: bool,
    /// Whether a marker exactly at `end` was crossed
    pub includes_end: bool,
    /// Crossed from `end` down to `start`
    pub reverse: bool,
}

impl PlayheadSpan {
    /// Forward travel over `[from, to)`
    pub fn forward(from: u64, to: u64) -> Self {
        Self {
            start: from,
            end: to,
            includes_start: true,
            includes_end: false,
            reverse: false,
        }
    }

    /// Backward travel from `from` down to `to`, over `(to, from]`
    pub fn backward(from: u64, to: u64) -> Self {
        Self {
            start: to,
            end: from,
            includes_start: false,
            includes_end: true,
            reverse: true,
        }
    }

    /// Whether the playhead crossed `millis`
    pub fn contains(&self, millis: u64) -> bool {
        (millis > self.start || (self.includes_start && millis == self.start))
            && (millis < self.end || (self.includes_end && millis == self.end))
    }

    /// Whether no time was crossed
    pub fn is_empty(&self) -> bool {
        self.start > self.end || (self.start == self.end && !(self.includes_start && self.includes_end))
    }

    /// Append `next` if it continues this span in the same direction
    fn absorb(&mut self, next: &PlayheadSpan) -> bool {
        if self.reverse != next.reverse {
            return false;
        }
        if !self.reverse && self.end == next.start && !self.includes_end && next.includes_start {
            self.end = next.end;
            self.includes_end = next.includes_end;
            return true;
        }
        if self.reverse && self.start == next.end && !self.includes_start && next.includes_end {
            self.start = next.start;
            self.includes_start = next.includes_start;
            return true;
        }
        false
    }
}

fn to_millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

enum ClockSignal {
    Ended,
    Looped,
}

#[derive(Debug)]
struct ClockCore {
    current_time: f64,
    state: PlaybackState,
    enabled: bool,
    duration: f64,
    in_out: NormalizedRange,
    loop_mode: LoopMode,
    timecode: Timecode,
    frame_based: bool,
    anchor_time: f64,
    anchor_wall: f64,
    anchor_frame: i64,
    ticks: i64,
    travel: Vec<PlayheadSpan>,
}

impl ClockCore {
    fn new() -> Self {
        Self {
            current_time: 0.0,
            state: PlaybackState::Stopped,
            enabled: true,
            duration: 1.0,
            in_out: NormalizedRange::FULL,
            loop_mode: LoopMode::None,
            timecode: Timecode::default(),
            frame_based: false,
            anchor_time: 0.0,
            anchor_wall: 0.0,
            anchor_frame: 0,
            ticks: 0,
            travel: Vec::new(),
        }
    }

    fn in_seconds(&self) -> f64 {
        self.duration * self.in_out.min
    }

    fn out_seconds(&self) -> f64 {
        self.duration * self.in_out.max
    }

    fn percent_complete(&self) -> f64 {
        self.current_time / self.duration
    }

    fn is_done(&self) -> bool {
        self.percent_complete() >= self.in_out.max && self.loop_mode == LoopMode::None
    }

    fn args(&self) -> PlaybackEventArgs {
        PlaybackEventArgs {
            current_time: self.current_time,
            current_frame: self.timecode.frame_for_seconds(self.current_time),
            duration_seconds: self.duration,
            duration_frames: self.timecode.frame_for_seconds(self.duration),
            current_percent: self.percent_complete(),
        }
    }

    fn reanchor(&mut self, now: f64) {
        self.anchor_time = self.current_time;
        self.anchor_wall = now;
        self.anchor_frame = self.timecode.frame_for_seconds(self.current_time);
        self.ticks = 0;
    }

    fn direction(&self) -> f64 {
        if self.state == PlaybackState::Reverse {
            -1.0
        } else {
            1.0
        }
    }

    fn record(&mut self, span: PlayheadSpan) {
        if span.is_empty() {
            return;
        }
        if let Some(last) = self.travel.last_mut() {
            if last.absorb(&span) {
                return;
            }
        }
        if self.travel.len() >= MAX_PENDING_SPANS {
            self.travel.remove(0);
        }
        self.travel.push(span);
    }

    fn advance(&mut self, now: f64) -> Option<ClockSignal> {
        if !self.state.is_playing() {
            return None;
        }
        let previous = self.current_time;
        if self.frame_based {
            self.ticks += 1;
            let frame = self.anchor_frame + self.ticks * self.direction() as i64;
            self.current_time = self.timecode.seconds_for_frame(frame);
        } else {
            self.current_time = self.anchor_time + (now - self.anchor_wall) * self.direction();
        }
        self.check_loop(now, previous)
    }

    /// Overshoot past a boundary folded into the loop span
    fn fold(&self, overshoot: f64) -> f64 {
        let span = self.out_seconds() - self.in_seconds();
        if span > 0.0 {
            overshoot % span
        } else {
            0.0
        }
    }

    fn check_loop(&mut self, now: f64, previous: f64) -> Option<ClockSignal> {
        let in_sec = self.in_seconds();
        let out_sec = self.out_seconds();

        match self.state {
            PlaybackState::Stopped => None,
            PlaybackState::Playing => {
                if self.current_time < in_sec {
                    self.current_time = in_sec;
                    self.reanchor(now);
                }
                let from = to_millis(previous.max(in_sec));
                if self.current_time < out_sec {
                    self.record(PlayheadSpan::forward(from, to_millis(self.current_time)));
                    return None;
                }
                self.record(PlayheadSpan {
                    includes_end: true,
                    ..PlayheadSpan::forward(from, to_millis(out_sec))
                });
                let overshoot = self.fold(self.current_time - out_sec);
                match self.loop_mode {
                    LoopMode::None => {
                        self.current_time = out_sec;
                        self.state = PlaybackState::Stopped;
                        Some(ClockSignal::Ended)
                    }
                    LoopMode::Normal => {
                        self.current_time = in_sec + overshoot;
                        self.reanchor(now);
                        self.record(PlayheadSpan::forward(to_millis(in_sec), to_millis(self.current_time)));
                        Some(ClockSignal::Looped)
                    }
                    LoopMode::Palindrome => {
                        self.current_time = out_sec - overshoot;
                        self.state = PlaybackState::Reverse;
                        self.reanchor(now);
                        // The out point itself was crossed on the way in
                        self.record(PlayheadSpan {
                            includes_end: false,
                            ..PlayheadSpan::backward(to_millis(out_sec), to_millis(self.current_time))
                        });
                        Some(ClockSignal::Looped)
                    }
                }
            }
            PlaybackState::Reverse => {
                if self.current_time > out_sec {
                    self.current_time = out_sec;
                    self.reanchor(now);
                }
                let from = to_millis(previous.min(out_sec));
                if self.current_time > in_sec {
                    self.record(PlayheadSpan::backward(from, to_millis(self.current_time)));
                    return None;
                }
                self.record(PlayheadSpan {
                    includes_start: true,
                    ..PlayheadSpan::backward(from, to_millis(in_sec))
                });
                let overshoot = self.fold(in_sec - self.current_time);
                match self.loop_mode {
                    LoopMode::None => {
                        self.current_time = in_sec;
                        self.state = PlaybackState::Stopped;
                        Some(ClockSignal::Ended)
                    }
                    LoopMode::Normal => {
                        self.current_time = out_sec - overshoot;
                        self.reanchor(now);
                        self.record(PlayheadSpan::backward(to_millis(out_sec), to_millis(self.current_time)));
                        Some(ClockSignal::Looped)
                    }
                    LoopMode::Palindrome => {
                        self.current_time = in_sec + overshoot;
                        self.state = PlaybackState::Playing;
                        self.reanchor(now);
                        // The in point itself was crossed on the way in
                        self.record(PlayheadSpan {
                            includes_start: false,
                            ..PlayheadSpan::forward(to_millis(in_sec), to_millis(self.current_time))
                        });
                        Some(ClockSignal::Looped)
                    }
                }
            }
        }
    }

    fn tick_interval(&self) -> Duration {
        if self.frame_based {
            Duration::from_secs_f64(1.0 / self.timecode.fps())
        } else {
            THREAD_TICK
        }
    }
}

struct ClockThread {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Playback clock with optional background driver
pub struct PlaybackClock {
    core: Arc<Mutex<ClockCore>>,
    source: Arc<dyn TimeSource>,
    events: EventSink,
    thread: Option<ClockThread>,
}

impl std::fmt::Debug for PlaybackClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackClock")
            .field("core", &*self.core.lock())
            .field("threaded", &self.thread.is_some())
            .finish_non_exhaustive()
    }
}

impl PlaybackClock {
    /// Clock driven by system time
    pub fn new(events: EventSink) -> Self {
        Self::with_time_source(events, Arc::new(SystemTimeSource::new()))
    }

    /// Clock driven by a custom time source
    pub fn with_time_source(events: EventSink, source: Arc<dyn TimeSource>) -> Self {
        Self {
            core: Arc::new(Mutex::new(ClockCore::new())),
            source,
            events,
            thread: None,
        }
    }

    fn publish(events: &EventSink, signal: ClockSignal, args: PlaybackEventArgs) {
        match signal {
            ClockSignal::Ended => {
                tracing::info!("Playback reached the out point at {:.3}s", args.current_time);
                events.emit(TimelineEvent::PlaybackEnded(args));
            }
            ClockSignal::Looped => {
                tracing::debug!("Playback looped to {:.3}s", args.current_time);
                events.emit(TimelineEvent::PlaybackLooped(args));
            }
        }
    }

    // Transport

    /// Start playing. Returns whether playback started.
    pub fn play(&self) -> bool {
        let now = self.source.now_seconds();
        let args = {
            let mut core = self.core.lock();
            if !core.enabled || core.state.is_playing() {
                return false;
            }
            if core.is_done() {
                core.current_time = core.in_seconds();
            }
            core.current_time = core.current_time.clamp(core.in_seconds(), core.out_seconds());
            core.state = PlaybackState::Playing;
            core.travel.clear();
            core.reanchor(now);
            core.args()
        };
        tracing::info!("Playback started at {:.3}s", args.current_time);
        self.events.emit(TimelineEvent::PlaybackStarted(args));
        true
    }

    /// Stop playing. Returns whether playback was running.
    pub fn stop(&self) -> bool {
        let args = {
            let mut core = self.core.lock();
            if !core.enabled || !core.state.is_playing() {
                return false;
            }
            core.state = PlaybackState::Stopped;
            core.args()
        };
        tracing::info!("Playback stopped at {:.3}s", args.current_time);
        self.events.emit(TimelineEvent::PlaybackEnded(args));
        true
    }

    /// Toggle playback, returning whether it is now playing
    pub fn toggle_play(&self) -> bool {
        if self.is_playing() {
            self.stop();
        } else {
            self.play();
        }
        self.is_playing()
    }

    /// Whether playing in either direction
    pub fn is_playing(&self) -> bool {
        self.core.lock().state.is_playing()
    }

    /// Current playback state
    pub fn state(&self) -> PlaybackState {
        self.core.lock().state
    }

    /// Whether the out point was reached with looping off
    pub fn is_done(&self) -> bool {
        self.core.lock().is_done()
    }

    /// Per-frame hook for hosts driving the clock. Does nothing while the
    /// clock thread is running.
    pub fn update_time(&self) {
        if self.thread.is_some() {
            return;
        }
        Self::tick(&self.core, self.source.as_ref(), &self.events);
    }

    fn tick(core: &Mutex<ClockCore>, source: &dyn TimeSource, events: &EventSink) -> Duration {
        let now = source.now_seconds();
        let (signal, args, interval) = {
            let mut core = core.lock();
            let signal = core.advance(now);
            (signal, core.args(), core.tick_interval())
        };
        if let Some(signal) = signal {
            Self::publish(events, signal, args);
        }
        interval
    }

    /// Drain the spans crossed since the last call
    pub fn take_travel(&self) -> Vec<PlayheadSpan> {
        std::mem::take(&mut self.core.lock().travel)
    }

    // Time

    /// Current time in seconds
    pub fn current_time(&self) -> f64 {
        self.core.lock().current_time
    }

    /// Move the playhead, clamped to the duration. Playback continues from
    /// the new position.
    pub fn set_current_time(&self, seconds: f64) {
        let now = self.source.now_seconds();
        let mut core = self.core.lock();
        core.current_time = seconds.clamp(0.0, core.duration);
        if core.state.is_playing() {
            core.reanchor(now);
        }
    }

    /// Current frame
    pub fn current_frame(&self) -> i64 {
        let core = self.core.lock();
        core.timecode.frame_for_seconds(core.current_time)
    }

    /// Current time as a fraction of the duration
    pub fn percent_complete(&self) -> f64 {
        self.core.lock().percent_complete()
    }

    /// Snapshot for playback notifications
    pub fn playback_args(&self) -> PlaybackEventArgs {
        self.core.lock().args()
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.core.lock().duration
    }

    /// Set the duration. Non-positive durations and durations above
    /// [`MAX_DURATION_SECONDS`] are rejected.
    pub fn set_duration(&self, seconds: f64) -> Result<()> {
        if seconds <= 0.0 || !seconds.is_finite() || seconds > MAX_DURATION_SECONDS {
            tracing::error!("Rejected invalid duration {}", seconds);
            return Err(TimelineError::InvalidDuration(seconds));
        }
        let mut core = self.core.lock();
        core.duration = seconds;
        core.current_time = core.current_time.min(seconds);
        Ok(())
    }

    /// Duration in frames
    pub fn duration_frames(&self) -> i64 {
        let core = self.core.lock();
        core.timecode.frame_for_seconds(core.duration)
    }

    // In/out range

    /// In/out range
    pub fn in_out(&self) -> NormalizedRange {
        self.core.lock().in_out
    }

    /// Set the in/out range. Ends are clamped to `[0, 1]`; an inverted
    /// range is rejected.
    pub fn set_in_out(&self, range: NormalizedRange) -> Result<()> {
        if range.min > range.max || range.min.is_nan() || range.max.is_nan() {
            tracing::warn!("Rejected inverted in/out range {} > {}", range.min, range.max);
            return Err(TimelineError::InvalidRange {
                min: range.min,
                max: range.max,
            });
        }
        self.core.lock().in_out = range.clamped_unit();
        Ok(())
    }

    /// Move the in point, clamped to `[0, out]`
    pub fn set_in_point(&self, percent: f64) {
        let mut core = self.core.lock();
        core.in_out.min = percent.clamp(0.0, core.in_out.max);
    }

    /// Move the out point, clamped to `[in, 1]`
    pub fn set_out_point(&self, percent: f64) {
        let mut core = self.core.lock();
        core.in_out.max = percent.clamp(core.in_out.min, 1.0);
    }

    // Modes

    /// Loop mode
    pub fn loop_mode(&self) -> LoopMode {
        self.core.lock().loop_mode
    }

    /// Set the loop mode
    pub fn set_loop_mode(&self, mode: LoopMode) {
        self.core.lock().loop_mode = mode;
    }

    /// Whether time advances one frame per tick
    pub fn is_frame_based(&self) -> bool {
        self.core.lock().frame_based
    }

    /// Switch between frame-based and continuous time
    pub fn set_frame_based(&self, frame_based: bool) {
        let now = self.source.now_seconds();
        let mut core = self.core.lock();
        core.frame_based = frame_based;
        core.reanchor(now);
    }

    /// Frame rate converter
    pub fn timecode(&self) -> Timecode {
        self.core.lock().timecode
    }

    /// Set the frame rate
    pub fn set_frame_rate(&self, fps: f64) {
        let now = self.source.now_seconds();
        let mut core = self.core.lock();
        core.timecode.set_fps(fps);
        core.reanchor(now);
    }

    /// Whether transport calls are honored
    pub fn is_enabled(&self) -> bool {
        self.core.lock().enabled
    }

    /// Enable or disable transport calls
    pub fn set_enabled(&self, enabled: bool) {
        self.core.lock().enabled = enabled;
    }

    // Threading

    /// Whether the clock thread is driving time
    pub fn is_threaded(&self) -> bool {
        self.thread.is_some()
    }

    /// Start the clock thread. Polled updates stop having any effect.
    pub fn move_to_thread(&mut self) {
        if self.thread.is_some() {
            return;
        }
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let core = self.core.clone();
        let source = self.source.clone();
        let events = self.events.clone();

        let spawned = std::thread::Builder::new()
            .name("keyline-clock".to_string())
            .spawn(move || {
                while thread_running.load(Ordering::Acquire) {
                    let interval = Self::tick(&core, source.as_ref(), &events);
                    std::thread::sleep(interval);
                }
            });

        match spawned {
            Ok(handle) => {
                tracing::info!("Playback clock moved to its own thread");
                self.thread = Some(ClockThread { running, handle });
            }
            Err(e) => tracing::error!("Failed to start clock thread: {}", e),
        }
    }

    /// Stop the clock thread, blocking until it exits
    pub fn remove_from_thread(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        thread.running.store(false, Ordering::Release);
        if thread.handle.join().is_err() {
            tracing::error!("Clock thread panicked");
        } else {
            tracing::info!("Playback clock back on the polled update");
        }
    }

    /// Event sink used for playback notifications
    pub fn events(&self) -> &EventSink {
        &self.events
    }
}

impl Drop for PlaybackClock {
    fn drop(&mut self) {
        self.remove_from_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::Receiver;

    fn manual_clock(duration: f64) -> (PlaybackClock, Arc<ManualTimeSource>, Receiver<TimelineEvent>) {
        let events = EventSink::new();
        let rx = events.subscribe();
        let source = Arc::new(ManualTimeSource::new());
        let clock = PlaybackClock::with_time_source(events, source.clone());
        clock.set_duration(duration).unwrap();
        (clock, source, rx)
    }

    fn count(rx: &Receiver<TimelineEvent>, pred: impl Fn(&TimelineEvent) -> bool) -> usize {
        rx.try_iter().filter(|e| pred(e)).count()
    }

    #[test]
    fn test_in_out_round_trip_and_rejection() {
        let (clock, _, _) = manual_clock(10.0);
        for (min, max) in [(0.0, 1.0), (0.25, 0.5), (0.3, 0.3), (0.0, 0.0)] {
            clock.set_in_out(NormalizedRange { min, max }).unwrap();
            assert_eq!(clock.in_out(), NormalizedRange { min, max });
        }
        clock.set_in_out(NormalizedRange { min: 0.2, max: 0.8 }).unwrap();
        assert!(clock.set_in_out(NormalizedRange { min: 0.9, max: 0.1 }).is_err());
        assert_eq!(clock.in_out(), NormalizedRange { min: 0.2, max: 0.8 });
    }

    #[test]
    fn test_in_out_points_clamp() {
        let (clock, _, _) = manual_clock(10.0);
        clock.set_out_point(0.5);
        clock.set_in_point(0.7);
        assert_eq!(clock.in_out(), NormalizedRange { min: 0.5, max: 0.5 });
        clock.set_in_point(0.1);
        clock.set_out_point(0.05);
        assert_eq!(clock.in_out(), NormalizedRange { min: 0.1, max: 0.1 });
    }

    #[test]
    fn test_invalid_duration_kept() {
        let (clock, _, _) = manual_clock(10.0);
        assert!(clock.set_duration(0.0).is_err());
        assert!(clock.set_duration(-3.0).is_err());
        assert_eq!(clock.duration(), 10.0);
    }

    #[test]
    fn test_loop_none_stops_at_out() {
        let (clock, source, rx) = manual_clock(10.0);
        clock.set_current_time(9.9);
        assert!(clock.play());
        source.advance(0.1);
        clock.update_time();
        assert_eq!(clock.current_time(), 10.0);
        assert!(!clock.is_playing());
        assert!(clock.is_done());
        let events: Vec<TimelineEvent> = rx.try_iter().collect();
        assert!(matches!(events[0], TimelineEvent::PlaybackStarted(_)));
        assert!(matches!(events[1], TimelineEvent::PlaybackEnded(_)));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_time_non_decreasing_until_out() {
        let (clock, source, _) = manual_clock(2.0);
        clock.set_in_out(NormalizedRange { min: 0.0, max: 0.5 }).unwrap();
        clock.play();
        let mut last = clock.current_time();
        while clock.is_playing() {
            source.advance(0.07);
            clock.update_time();
            assert!(clock.current_time() >= last);
            last = clock.current_time();
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn test_loop_normal_wraps_once() {
        let (clock, source, rx) = manual_clock(10.0);
        clock.set_loop_mode(LoopMode::Normal);
        clock.set_current_time(9.9);
        clock.play();

        let mut times = Vec::new();
        for _ in 0..3 {
            source.advance(0.1);
            clock.update_time();
            times.push(clock.current_time());
        }
        assert!(times[0].abs() < 1e-9);
        assert!((times[1] - 0.1).abs() < 1e-9);
        assert!((times[2] - 0.2).abs() < 1e-9);
        assert!(clock.is_playing());
        assert_eq!(count(&rx, |e| matches!(e, TimelineEvent::PlaybackLooped(_))), 1);
    }

    #[test]
    fn test_loop_normal_keeps_overshoot() {
        let (clock, source, _) = manual_clock(10.0);
        clock.set_loop_mode(LoopMode::Normal);
        clock.set_in_out(NormalizedRange { min: 0.2, max: 0.5 }).unwrap();
        clock.set_current_time(4.5);
        clock.play();
        source.advance(0.75);
        clock.update_time();
        assert!((clock.current_time() - 2.25).abs() < 1e-9);
    }

    #[test]
    fn test_palindrome_reflects() {
        let (clock, source, rx) = manual_clock(10.0);
        clock.set_loop_mode(LoopMode::Palindrome);
        clock.set_current_time(9.5);
        clock.play();
        source.advance(1.0);
        clock.update_time();
        assert!((clock.current_time() - 9.5).abs() < 1e-9);
        assert_eq!(clock.state(), PlaybackState::Reverse);

        source.advance(1.0);
        clock.update_time();
        assert!((clock.current_time() - 8.5).abs() < 1e-9);

        source.advance(9.0);
        clock.update_time();
        assert!((clock.current_time() - 0.5).abs() < 1e-9);
        assert_eq!(clock.state(), PlaybackState::Playing);
        assert_eq!(count(&rx, |e| matches!(e, TimelineEvent::PlaybackLooped(_))), 2);
    }

    #[test]
    fn test_span_contains_respects_ends() {
        let span = PlayheadSpan::forward(100, 200);
        assert!(span.contains(100));
        assert!(span.contains(199));
        assert!(!span.contains(200));
        let back = PlayheadSpan::backward(200, 100);
        assert!(!back.contains(100));
        assert!(back.contains(200));
        assert!(PlayheadSpan::forward(50, 50).is_empty());
    }

    #[test]
    fn test_travel_covers_both_sides_of_a_wrap() {
        let (clock, source, _) = manual_clock(1.0);
        clock.set_loop_mode(LoopMode::Normal);
        clock.set_current_time(0.99);
        clock.play();
        source.advance(0.02);
        clock.update_time();
        source.advance(0.01);
        clock.update_time();

        let travel = clock.take_travel();
        assert_eq!(travel.len(), 2);
        assert_eq!((travel[0].start, travel[0].end), (990, 1000));
        assert!(travel[0].includes_end);
        assert_eq!(travel[1], PlayheadSpan::forward(0, 20));
        assert!(clock.take_travel().is_empty());
    }

    #[test]
    fn test_travel_reaches_out_point_on_stop() {
        let (clock, source, _) = manual_clock(1.0);
        clock.set_current_time(0.99);
        clock.play();
        source.advance(0.05);
        clock.update_time();
        assert!(!clock.is_playing());
        let travel = clock.take_travel();
        assert_eq!(travel.len(), 1);
        assert!(travel[0].contains(995));
        assert!(travel[0].contains(1000));
    }

    #[test]
    fn test_travel_palindrome_crosses_twice() {
        let (clock, source, _) = manual_clock(10.0);
        clock.set_loop_mode(LoopMode::Palindrome);
        clock.set_current_time(9.5);
        clock.play();
        source.advance(1.0);
        clock.update_time();
        let travel = clock.take_travel();
        assert_eq!(travel.len(), 2);
        assert!(travel.iter().all(|span| span.contains(9700)));
        assert_eq!(travel.iter().filter(|span| span.contains(10_000)).count(), 1);
        assert!(travel[1].reverse);
    }

    #[test]
    fn test_frame_based_ticks() {
        let (clock, _, _) = manual_clock(10.0);
        clock.set_frame_rate(30.0);
        clock.set_frame_based(true);
        clock.play();
        for _ in 0..15 {
            clock.update_time();
        }
        assert_eq!(clock.current_frame(), 15);
        assert!((clock.current_time() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_play_rewinds_when_done() {
        let (clock, _, _) = manual_clock(10.0);
        clock.set_in_out(NormalizedRange { min: 0.1, max: 0.9 }).unwrap();
        clock.set_current_time(9.5);
        assert!(clock.is_done());
        clock.play();
        assert_eq!(clock.current_time(), 1.0);
    }

    #[test]
    fn test_seek_while_playing_reanchors() {
        let (clock, source, _) = manual_clock(10.0);
        clock.play();
        source.advance(1.0);
        clock.update_time();
        clock.set_current_time(5.0);
        source.advance(0.5);
        clock.update_time();
        assert!((clock.current_time() - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_ignores_transport() {
        let (clock, _, rx) = manual_clock(10.0);
        clock.set_enabled(false);
        assert!(!clock.play());
        assert!(!clock.is_playing());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_thread_drives_time() {
        let (mut clock, source, _) = manual_clock(10.0);
        clock.move_to_thread();
        assert!(clock.is_threaded());
        clock.play();
        source.advance(2.0);

        let deadline = Instant::now() + Duration::from_secs(5);
        while clock.current_time() < 2.0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!((clock.current_time() - 2.0).abs() < 1e-9);

        clock.remove_from_thread();
        assert!(!clock.is_threaded());
        source.advance(1.0);
        clock.update_time();
        assert!((clock.current_time() - 3.0).abs() < 1e-9);
    }
}
