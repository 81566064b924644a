// SPDX-License-Identifier: MIT OR Apache-2.0
//! Keyline Player - headless timeline playback
//!
//! Loads timeline settings (or uses the defaults), builds a small demo
//! timeline and plays it from the in point to the out point, logging
//! every event and reporting track values where it stopped.
//!
//! ```text
//! keyline_player [settings.ron]
//! ```

use keyline_timeline::{KeyframeValue, LoopMode, Page, Timeline, TimelineEvent, TimelineSettings};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const FRAME: Duration = Duration::from_millis(16);

fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("keyline_timeline=debug,keyline_player=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Keyline Player v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run() {
        tracing::error!("Player failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> keyline_timeline::Result<()> {
    let settings = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => TimelineSettings::load(&path)?,
        None => TimelineSettings {
            duration_seconds: 4.0,
            autosave: false,
            loop_mode: LoopMode::None,
            ..TimelineSettings::named("player_demo")
        },
    };

    let mut timeline = Timeline::new(settings);
    let events = timeline.subscribe();
    timeline.setup();
    add_demo_tracks(&mut timeline)?;

    if timeline.settings().threaded_playback {
        tracing::info!("Running the playback clock on its own thread");
    }
    if timeline.loop_mode() != LoopMode::None {
        tracing::warn!("Looping timeline, playing one pass of {}", timeline.duration_timecode());
    }

    timeline.set_current_time_to_in_point();
    timeline.play();

    let pass = Duration::from_secs_f64(timeline.out_time_seconds() - timeline.in_time_seconds());
    let started = std::time::Instant::now();
    while timeline.is_playing() && started.elapsed() <= pass + FRAME {
        timeline.update();
        for event in events.try_iter() {
            log_event(&event);
        }
        std::thread::sleep(FRAME);
    }
    timeline.stop();
    for event in events.try_iter() {
        log_event(&event);
    }

    tracing::info!(
        "Stopped at {} with level={:?} door={:?}",
        timeline.current_timecode(),
        timeline.value("level"),
        timeline.is_switch_on("door")
    );
    Ok(())
}

fn add_demo_tracks(timeline: &mut Timeline) -> keyline_timeline::Result<()> {
    let duration = timeline.duration_millis();

    timeline.add_curves("level", 0.0, 1.0, 0.0)?;
    timeline.add_keyframe("level", 0, KeyframeValue::Float(0.0))?;
    timeline.add_keyframe("level", duration / 2, KeyframeValue::Float(1.0))?;
    timeline.add_keyframe("level", duration, KeyframeValue::Float(0.25))?;

    timeline.add_switches("door")?;
    timeline.add_keyframe("door", duration / 4, KeyframeValue::Bool(true))?;
    timeline.add_keyframe("door", duration * 3 / 4, KeyframeValue::Bool(false))?;

    timeline.add_flags("cues")?;
    for (i, millis) in [duration / 8, duration / 2, duration * 7 / 8].into_iter().enumerate() {
        timeline.add_keyframe("cues", millis, KeyframeValue::Event(format!("cue {}", i + 1)))?;
    }

    timeline.add_colors("wash")?;
    timeline.add_keyframe("wash", 0, KeyframeValue::Color([1.0, 0.0, 0.0, 1.0]))?;
    timeline.add_keyframe("wash", duration, KeyframeValue::Color([0.0, 0.0, 1.0, 1.0]))?;

    tracing::info!(
        "Demo timeline '{}' ready: {} tracks over {}",
        timeline.name(),
        timeline.current_page().map_or(0, Page::track_count),
        timeline.duration_timecode()
    );
    Ok(())
}

fn log_event(event: &TimelineEvent) {
    match event {
        TimelineEvent::Bang { track, label, time_millis } => {
            tracing::info!("[{}] bang '{}' at {}ms", track, label, time_millis);
        }
        TimelineEvent::PlaybackStarted(args) => tracing::info!("Playback started at {:.3}s", args.current_time),
        TimelineEvent::PlaybackEnded(args) => tracing::info!("Playback ended at {:.3}s", args.current_time),
        TimelineEvent::PlaybackLooped(args) => tracing::info!("Playback looped to {:.3}s", args.current_time),
        other => tracing::debug!("{:?}", other),
    }
}
