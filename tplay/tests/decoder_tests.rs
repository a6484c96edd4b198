//! Decoding real files and playing them end to end

mod helpers;

use helpers::{wait_until, write_tone_wav};
use tplay::audio::{AudioSource, PacketGeometry, SymphoniaDecoder};
use tplay::error::Error;
use tplay::playback::EngineOptions;
use tplay::render::NullRenderService;
use tplay::PlaybackEngine;
use tplay_common::TransportState;

#[test]
fn test_decode_wav() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_tone_wav(&path, 8000, 2, 0.5);

    let source = SymphoniaDecoder::open(&path).unwrap();
    let format = source.format();
    assert_eq!(format.sample_rate, 8000);
    assert_eq!(format.channels, 2);
    assert_eq!(format.geometry, PacketGeometry::pcm_f32(2));
    assert_eq!(source.total_packets(), 4000);
    assert!((source.duration_seconds() - 0.5).abs() < 1e-9);
}

#[test]
fn test_decoded_samples_are_normalized() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_tone_wav(&path, 8000, 1, 0.1);

    let mut source = SymphoniaDecoder::open(&path).unwrap();
    let mut storage = vec![0u8; 800 * 4];
    let read = source
        .read_packets(0, 800, &mut storage, &mut Vec::new())
        .unwrap();
    assert_eq!(read.packets, 800);

    let peak = storage
        .chunks_exact(4)
        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]).abs())
        .fold(0.0f32, f32::max);
    assert!(peak > 0.4 && peak <= 0.51, "peak {}", peak);
}

#[test]
fn test_missing_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let result = SymphoniaDecoder::open(&dir.path().join("missing.wav"));
    assert!(matches!(result, Err(Error::Open { .. })));
}

#[test]
fn test_garbage_file_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("noise.mp3");
    std::fs::write(&path, b"definitely not audio").unwrap();

    let result = PlaybackEngine::open(&path, &EngineOptions::default(), &NullRenderService::new());
    assert!(matches!(result, Err(Error::Open { .. })));
}

#[test]
fn test_wav_plays_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    write_tone_wav(&path, 8000, 2, 0.5);

    let engine = PlaybackEngine::open(
        &path,
        &EngineOptions::default(),
        &NullRenderService::with_speed(20.0),
    )
    .unwrap();

    assert!(wait_until(|| engine.is_drained()));
    assert_eq!(engine.state(), TransportState::Finished);
    assert!((engine.elapsed_seconds() - 0.5).abs() < 1e-9);
    assert_eq!(engine.render_position(), Some(4000));
}
