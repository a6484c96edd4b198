//! Transport state machine tests against a scripted render service

mod helpers;

use helpers::{ScriptedOutput, ScriptedRenderer, SyntheticSource};
use tplay::error::Error;
use tplay::playback::{EngineOptions, SlotState};
use tplay::PlaybackEngine;
use tplay_common::{PlayerEvent, TransportState};

fn open(source: SyntheticSource, initial_state: TransportState) -> (PlaybackEngine, ScriptedOutput) {
    let renderer = ScriptedRenderer::new();
    let options = EngineOptions {
        initial_state,
        ..Default::default()
    };
    let engine = PlaybackEngine::with_source(Box::new(source), &options, &renderer).unwrap();
    (engine, renderer.output())
}

fn finished_engine() -> (PlaybackEngine, ScriptedOutput) {
    // End of stream on the first refill after priming
    let (engine, output) = open(
        SyntheticSource::pcm(44100, 100).eos_on_call(4),
        TransportState::Playing,
    );
    assert!(output.consume_next());
    assert_eq!(engine.state(), TransportState::Finished);
    (engine, output)
}

#[test]
fn test_open_playing_primes_every_slot_and_starts() {
    let (engine, output) = open(SyntheticSource::pcm(44100, 100), TransportState::Playing);

    assert_eq!(engine.state(), TransportState::Playing);
    assert_eq!(
        engine.slot_states(),
        vec![SlotState::Enqueued, SlotState::Enqueued, SlotState::Enqueued]
    );
    let starts: Vec<u64> = output.submissions().iter().map(|s| s.start_packet).collect();
    assert_eq!(starts, vec![0, 4410, 8820]);
    assert_eq!(output.calls(), vec!["start"]);
    assert!(output.is_running());
}

#[test]
fn test_open_paused_primes_without_starting() {
    let (engine, output) = open(SyntheticSource::pcm(44100, 100), TransportState::Paused);

    assert_eq!(engine.state(), TransportState::Paused);
    assert_eq!(output.submissions().len(), 3);
    assert!(output.calls().is_empty());
    assert!(!output.consume_next());
}

#[test]
fn test_toggle_alternates_and_drives_output() {
    let (engine, output) = open(SyntheticSource::pcm(44100, 100), TransportState::Playing);

    engine.toggle_play_pause().unwrap();
    assert_eq!(engine.state(), TransportState::Paused);
    assert!(!output.is_running());

    engine.toggle_play_pause().unwrap();
    assert_eq!(engine.state(), TransportState::Playing);
    assert!(output.is_running());
    assert_eq!(output.calls(), vec!["start", "pause", "start"]);
}

#[test]
fn test_pause_keeps_queued_buffers() {
    let (engine, output) = open(SyntheticSource::pcm(44100, 100), TransportState::Playing);
    engine.pause().unwrap();

    assert_eq!(output.queued_starts(), vec![0, 4410, 8820]);
    engine.play().unwrap();
    assert!(output.consume_next());
    assert_eq!(output.queued_starts(), vec![4410, 8820, 13230]);
}

#[test]
fn test_elapsed_follows_consumed_audio() {
    let (engine, output) = open(SyntheticSource::pcm(44100, 100), TransportState::Playing);
    assert_eq!(engine.elapsed_seconds(), 0.0);
    assert!((engine.cursor_seconds() - 0.3).abs() < 1e-9);

    assert!(output.consume_next());
    assert!((engine.elapsed_seconds() - 0.1).abs() < 1e-9);
    assert!((engine.cursor_seconds() - 0.4).abs() < 1e-9);
}

#[test]
fn test_state_change_events() {
    let (engine, _output) = open(SyntheticSource::pcm(44100, 100), TransportState::Playing);
    let mut events = engine.subscribe();

    engine.pause().unwrap();
    engine.play().unwrap();

    let transitions: Vec<(TransportState, TransportState)> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            PlayerEvent::StateChanged { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (TransportState::Playing, TransportState::Paused),
            (TransportState::Paused, TransportState::Playing),
        ]
    );
}

#[test]
fn test_commands_rejected_once_finished() {
    let (engine, _output) = finished_engine();

    assert!(matches!(
        engine.play(),
        Err(Error::InvalidState {
            operation: "play",
            state: TransportState::Finished
        })
    ));
    assert!(matches!(
        engine.pause(),
        Err(Error::InvalidState {
            operation: "pause",
            ..
        })
    ));
    assert!(matches!(
        engine.seek(-1.0),
        Err(Error::InvalidState {
            operation: "seek",
            ..
        })
    ));
    assert!(engine.toggle_play_pause().is_err());
    assert_eq!(engine.state(), TransportState::Finished);
}

#[test]
fn test_finished_tail_drains() {
    let (engine, output) = finished_engine();

    assert!(output.calls().contains(&"stop(drain)".to_string()));
    assert!(!engine.is_drained());
    assert_eq!(output.consume_all(10), 2);
    assert!(engine.is_drained());
    assert!(!output.is_running());
    // Two primed buffers after the one that triggered the refill
    assert!((engine.elapsed_seconds() - 0.3).abs() < 1e-9);
}

#[test]
fn test_quit_from_every_state() {
    let (playing, playing_out) = open(SyntheticSource::pcm(44100, 100), TransportState::Playing);
    let (paused, paused_out) = open(SyntheticSource::pcm(44100, 100), TransportState::Paused);
    let (finished, finished_out) = finished_engine();

    for (engine, output) in [
        (&playing, &playing_out),
        (&paused, &paused_out),
        (&finished, &finished_out),
    ] {
        engine.quit().unwrap();
        assert_eq!(engine.state(), TransportState::Stopped);
        assert!(engine.is_drained());
        let calls = output.calls();
        assert!(calls.contains(&"stop(immediate)".to_string()));
        assert_eq!(calls.last().map(String::as_str), Some("dispose"));
        assert!(!output.consume_next());
    }
}

#[test]
fn test_quit_is_idempotent() {
    let (engine, output) = open(SyntheticSource::pcm(44100, 100), TransportState::Playing);
    engine.quit().unwrap();
    engine.quit().unwrap();
    let disposals = output.calls().iter().filter(|c| *c == "dispose").count();
    assert_eq!(disposals, 1);
    assert!(engine.play().is_err());
}
