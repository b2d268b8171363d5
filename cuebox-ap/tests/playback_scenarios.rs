//! End-to-end playback through an offline engine
//!
//! Assets are loaded from generated WAV files and rendered by pulling the
//! offline output, exactly as a device callback would.

mod helpers;

use cuebox_ap::{
    AudioAsset, DeviceDescriptor, EngineOptions, LoadOptions, PlayMode, PlaybackEngine, PlaybackState,
    WaveFormat,
};
use helpers::{generate_sine_wav, started_offline_engine};

const RATE: u32 = 48000;

fn mono() -> WaveFormat {
    WaveFormat::new(RATE, 1).unwrap()
}

fn render(renderer: &cuebox_ap::audio::output::OfflineRenderer, total: usize, chunk: usize) -> Vec<f32> {
    let mut rendered = Vec::with_capacity(total);
    let mut out = vec![0.0; chunk];
    while rendered.len() < total {
        let n = (total - rendered.len()).min(chunk);
        assert_eq!(renderer.render(&mut out[..n]), n);
        rendered.extend_from_slice(&out[..n]);
    }
    rendered
}

#[test]
fn test_one_second_once_at_half_volume() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    let source = generate_sine_wav(&path, RATE, 1, 48000, 440.0, 0.8).unwrap();

    let engine = started_offline_engine(mono());
    let asset = AudioAsset::load(&path, &LoadOptions::default().volume(0.5)).unwrap();
    assert_eq!(asset.samples().map(|s| s.len()), Some(48000));

    let handle = engine.play(&asset, PlayMode::Once).unwrap();
    assert_eq!(handle.state(), PlaybackState::Playing);

    let renderer = engine.offline_output().unwrap();
    let rendered = render(&renderer, 48000, 480);
    for (r, s) in rendered.iter().zip(source.iter()) {
        assert_eq!(*r, s * 0.5);
    }
    assert_eq!(handle.state(), PlaybackState::Playing);

    let tail = render(&renderer, 333, 333);
    assert!(tail.iter().all(|&s| s == 0.0));
    assert_eq!(handle.state(), PlaybackState::Stopped);
    assert_eq!(engine.active_sources(), 0);
}

#[test]
fn test_one_second_loop_at_half_volume() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    let source = generate_sine_wav(&path, RATE, 1, 48000, 440.0, 0.8).unwrap();

    let engine = started_offline_engine(mono());
    let asset = AudioAsset::load(&path, &LoadOptions::default().volume(0.5)).unwrap();
    let handle = engine.play(&asset, PlayMode::Loop).unwrap();
    assert_eq!(handle.state(), PlaybackState::PlayingInLoop);

    let renderer = engine.offline_output().unwrap();
    // Chunk size does not divide the asset length
    let rendered = render(&renderer, 60000, 1023);

    assert_eq!(handle.loop_count(), 2);
    for (r, s) in rendered[48000..].iter().zip(source[..12000].iter()) {
        assert_eq!(*r, s * 0.5);
    }
}

#[test]
fn test_stop_silences_within_one_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    generate_sine_wav(&path, RATE, 1, 4800, 440.0, 0.5).unwrap();

    let engine = started_offline_engine(mono());
    let asset = AudioAsset::load(&path, &LoadOptions::default()).unwrap();
    let handle = engine.play(&asset, PlayMode::Loop).unwrap();
    let renderer = engine.offline_output().unwrap();

    render(&renderer, 2048, 512);
    handle.stop();
    assert_eq!(handle.state(), PlaybackState::StopRequested);

    let after = render(&renderer, 512, 512);
    assert!(after.iter().all(|&s| s == 0.0));
    assert_eq!(handle.state(), PlaybackState::Stopped);
    assert!(handle.is_finished());
}

#[test]
fn test_concurrent_sources_sum() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.wav");
    let b = dir.path().join("b.wav");
    let wave_a = generate_sine_wav(&a, RATE, 1, 4800, 440.0, 0.25).unwrap();
    let wave_b = generate_sine_wav(&b, RATE, 1, 2400, 660.0, 0.25).unwrap();

    let engine = started_offline_engine(mono());
    let asset_a = AudioAsset::load(&a, &LoadOptions::default()).unwrap();
    let asset_b = AudioAsset::load(&b, &LoadOptions::default().cached(false)).unwrap();
    engine.play(&asset_a, PlayMode::Once).unwrap();
    engine.play(&asset_b, PlayMode::Once).unwrap();
    assert_eq!(engine.active_sources(), 2);

    let renderer = engine.offline_output().unwrap();
    let rendered = render(&renderer, 4800, 256);
    for i in 0..4800 {
        let expected = wave_a[i] + wave_b.get(i).copied().unwrap_or(0.0);
        assert!((rendered[i] - expected).abs() < 1e-6, "sample {}", i);
    }
}

#[test]
fn test_master_volume_change_applies_to_playing_sources() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    let source = generate_sine_wav(&path, RATE, 1, 4800, 440.0, 0.5).unwrap();

    let engine = started_offline_engine(mono());
    let asset = AudioAsset::load(&path, &LoadOptions::default()).unwrap();
    engine.play(&asset, PlayMode::Once).unwrap();
    let renderer = engine.offline_output().unwrap();

    let first = render(&renderer, 1000, 1000);
    assert_eq!(first[..], source[..1000]);

    engine.set_master_volume(0.0);
    let muted = render(&renderer, 1000, 1000);
    assert!(muted.iter().all(|&s| s == 0.0));
}

#[test]
fn test_pause_holds_position() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    let source = generate_sine_wav(&path, RATE, 1, 4800, 440.0, 0.5).unwrap();

    let engine = started_offline_engine(mono());
    let asset = AudioAsset::load(&path, &LoadOptions::default()).unwrap();
    engine.play(&asset, PlayMode::Once).unwrap();
    let renderer = engine.offline_output().unwrap();

    render(&renderer, 1000, 500);
    engine.pause().unwrap();
    let paused = render(&renderer, 1000, 500);
    assert!(paused.iter().all(|&s| s == 0.0));

    engine.start().unwrap();
    let resumed = render(&renderer, 1000, 500);
    assert_eq!(resumed[..], source[1000..2000]);
}

#[test]
fn test_parallel_gain_matches_serial() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    let source = generate_sine_wav(&path, RATE, 1, 48000, 440.0, 0.8).unwrap();

    let engine = PlaybackEngine::new(
        EngineOptions::new(DeviceDescriptor::offline())
            .format(mono())
            .parallel(true),
    );
    engine.start().unwrap();
    engine.set_master_volume(0.5);

    let cached = AudioAsset::load(&path, &LoadOptions::default()).unwrap();
    let streamed = AudioAsset::load(&path, &LoadOptions::default().cached(false).volume(0.5)).unwrap();
    let first = engine.play(&cached, PlayMode::Once).unwrap();
    let second = engine.play(&streamed, PlayMode::Once).unwrap();

    // Buffers well past the rayon split size
    let renderer = engine.offline_output().unwrap();
    let rendered = render(&renderer, 48000, 9600);
    for (r, s) in rendered.iter().zip(source.iter()) {
        assert_eq!(*r, s * 0.5 + s * 0.25);
    }

    render(&renderer, 9600, 9600);
    assert!(first.is_finished());
    assert!(second.is_finished());
    assert_eq!(engine.active_sources(), 0);
}
