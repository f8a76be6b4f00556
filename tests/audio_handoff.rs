// SPDX-License-Identifier: MPL-2.0
//! Shared-audio-player handoff between successive clips: the
//! silent-to-silent glitch-avoidance path, the forced swap for real
//! audio, and the single-completion latch.

mod support;

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use storyboard_player::listener::Notification;

use support::{ClipSpec, FakeAudioPlayer, FakeSink, Harness, write_rgb_clip};

fn source_duration_us(source: &storyboard_player::media::SharedSource) -> Option<i64> {
    source
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .format()
        .duration_us
}

#[test]
fn silent_transition_keeps_the_shared_source_and_extends_it() {
    let dir = tempfile::tempdir().unwrap();
    let shared = FakeAudioPlayer::create();

    // Clip 1: still image over silence, trimmed to 200 ms.
    let first = Harness::new();
    let first_uri = write_rgb_clip(&dir, "first.rgb", 8, 8);
    first.player.set_image_clip_properties(8, 8);
    first.player.set_playback_end_time(200);
    first.player.set_data_source(&first_uri).unwrap();
    first.player.prepare().unwrap();
    first.player.set_audio_player(Arc::clone(&shared)).unwrap();
    first.player.play().unwrap();

    assert!(first
        .wait_for(Duration::from_secs(3), |n| matches!(
            n,
            Notification::PlaybackComplete
        ))
        .is_some());

    let carried = shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .source()
        .expect("the shared player holds clip 1's silent source");
    assert_eq!(source_duration_us(&carried), Some(200_000));

    // Clip 2: another still image, ending at 400 ms on its own timeline.
    let second = Harness::new();
    let second_uri = write_rgb_clip(&dir, "second.rgb", 8, 8);
    second.player.set_image_clip_properties(8, 8);
    second.player.set_playback_end_time(400);
    second.player.set_data_source(&second_uri).unwrap();
    second.player.prepare().unwrap();
    second.player.set_audio_player(Arc::clone(&shared)).unwrap();

    // Glitch avoidance: no source swap, the carried source is extended.
    assert!(!second.player.is_source_swap_required());
    let after = shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .source()
        .expect("source still attached");
    assert!(
        Arc::ptr_eq(&carried, &after),
        "the shared player's source must not be swapped"
    );
    assert_eq!(source_duration_us(&after), Some(400_000));

    second.player.play().unwrap();
    assert!(second
        .wait_for(Duration::from_secs(3), |n| matches!(
            n,
            Notification::PlaybackComplete
        ))
        .is_some());
}

#[test]
fn real_audio_clip_forces_a_source_swap() {
    let dir = tempfile::tempdir().unwrap();
    let shared = FakeAudioPlayer::create();

    // Clip 1: still image over silence.
    let first = Harness::new();
    let first_uri = write_rgb_clip(&dir, "first.rgb", 8, 8);
    first.player.set_image_clip_properties(8, 8);
    first.player.set_playback_end_time(200);
    first.player.set_data_source(&first_uri).unwrap();
    first.player.prepare().unwrap();
    first.player.set_audio_player(Arc::clone(&shared)).unwrap();
    first.player.play().unwrap();
    assert!(first
        .wait_for(Duration::from_secs(3), |n| matches!(
            n,
            Notification::PlaybackComplete
        ))
        .is_some());

    let carried = shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .source()
        .expect("source attached");

    // Clip 2: real video with real PCM audio.
    let second = Harness::new();
    second.extractors.insert(
        "clip://real",
        ClipSpec {
            frame_interval_us: 50_000,
            ..ClipSpec::default()
        },
    );
    second.player.set_audio_sink(Arc::new(FakeSink));
    second.player.set_data_source("clip://real").unwrap();
    second.player.set_playback_end_time(300);
    second.player.prepare().unwrap();
    second.player.set_audio_player(Arc::clone(&shared)).unwrap();

    assert!(second.player.is_source_swap_required());

    second.player.play().unwrap();
    let swapped = shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .source()
        .expect("source attached");
    assert!(
        !Arc::ptr_eq(&carried, &swapped),
        "a real-audio clip must swap the shared player's source"
    );

    assert!(second
        .wait_for(Duration::from_secs(3), |n| matches!(
            n,
            Notification::PlaybackComplete
        ))
        .is_some());
}

#[test]
fn playback_complete_fires_again_after_replay() {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new();
    let uri = write_rgb_clip(&dir, "loop.rgb", 8, 8);
    harness.player.set_image_clip_properties(8, 8);
    harness.player.set_playback_end_time(150);
    harness.player.set_data_source(&uri).unwrap();
    harness.player.prepare().unwrap();

    harness.player.play().unwrap();
    assert!(harness
        .wait_for(Duration::from_secs(3), |n| matches!(
            n,
            Notification::PlaybackComplete
        ))
        .is_some());

    // `play` clears the completion latch, so a replayed clip completes
    // again.
    harness.player.play().unwrap();
    assert!(harness
        .wait_for(Duration::from_secs(3), |n| matches!(
            n,
            Notification::PlaybackComplete
        ))
        .is_some());

    let completions = harness
        .listener
        .log()
        .iter()
        .filter(|n| matches!(n, Notification::PlaybackComplete))
        .count();
    assert_eq!(completions, 2);
}

#[test]
fn start_next_player_fires_before_the_clip_ends() {
    let harness = Harness::new();
    harness.extractors.insert(
        "clip://prefetch",
        ClipSpec {
            frame_interval_us: 50_000,
            with_audio: false,
            ..ClipSpec::default()
        },
    );

    harness.player.set_data_source("clip://prefetch").unwrap();
    harness.player.set_playback_end_time(500);
    harness.player.prepare().unwrap();
    harness.player.play().unwrap();

    // 500 ms remaining is inside the 1.5 s prefetch threshold, so the very
    // first frame should trigger the notification.
    let start_next = harness.wait_for(Duration::from_secs(2), |n| {
        matches!(n, Notification::StartNextPlayer)
    });
    assert!(start_next.is_some());

    let log = harness.listener.log();
    let start_index = log
        .iter()
        .position(|n| matches!(n, Notification::StartNextPlayer))
        .unwrap();
    assert!(
        log.iter()
            .skip(start_index)
            .any(|n| matches!(n, Notification::PlaybackComplete))
            || harness
                .wait_for(Duration::from_secs(3), |n| matches!(
                    n,
                    Notification::PlaybackComplete
                ))
                .is_some(),
        "clip must still complete after the prefetch notification"
    );

    let count = harness
        .listener
        .log()
        .iter()
        .filter(|n| matches!(n, Notification::StartNextPlayer))
        .count();
    assert_eq!(count, 1, "prefetch fires once per session");
}
