//! Asset loading: error classification, resampling and streaming parity

mod helpers;

use cuebox_ap::{AudioAsset, Error, LoadOptions, PlayMode, WaveFormat};
use helpers::{generate_ramp_wav, generate_sine_wav, started_offline_engine};
use std::io::Write;

#[test]
fn test_missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let result = AudioAsset::load(dir.path().join("missing.wav"), &LoadOptions::default());
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[test]
fn test_non_audio_file_is_unsupported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "this is not audio").unwrap();
    drop(file);

    for cached in [true, false] {
        let result = AudioAsset::load(&path, &LoadOptions::default().cached(cached));
        assert!(matches!(result, Err(Error::UnsupportedFormat { .. })));
    }
}

#[test]
fn test_native_format_kept_without_target() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stereo.wav");
    generate_sine_wav(&path, 22050, 2, 2205, 440.0, 0.5).unwrap();

    let asset = AudioAsset::load(&path, &LoadOptions::default()).unwrap();
    assert_eq!(asset.format(), WaveFormat::new(22050, 2).unwrap());
    assert_eq!(asset.samples().map(|s| s.len()), Some(4410));
    assert_eq!(asset.duration(), Some(std::time::Duration::from_millis(100)));
}

#[test]
fn test_resampled_load_has_target_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cd.wav");
    generate_sine_wav(&path, 44100, 1, 44100, 440.0, 0.5).unwrap();

    let target = WaveFormat::new(48000, 1).unwrap();
    let asset = AudioAsset::load(&path, &LoadOptions::default().target_format(target).quality(20)).unwrap();
    assert_eq!(asset.format(), target);
    assert_eq!(asset.source_format(), WaveFormat::new(44100, 1).unwrap());
    assert_eq!(asset.samples().map(|s| s.len()), Some(48000));
}

#[test]
fn test_target_channels_are_not_converted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mono.wav");
    generate_ramp_wav(&path, 48000, 480).unwrap();

    let asset = AudioAsset::load(
        &path,
        &LoadOptions::default().target_format(WaveFormat::new(48000, 2).unwrap()),
    )
    .unwrap();
    assert_eq!(asset.channels(), 1);
}

#[test]
fn test_streaming_matches_cached_after_resampling() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cd.wav");
    generate_sine_wav(&path, 44100, 1, 22050, 523.0, 0.6).unwrap();

    let target = WaveFormat::new(48000, 1).unwrap();
    let options = LoadOptions::default().target_format(target).quality(30);
    let cached = AudioAsset::load(&path, &options).unwrap();
    let streaming = AudioAsset::load(&path, &options.cached(false)).unwrap();
    assert!(!streaming.is_cached());
    assert_eq!(streaming.format(), cached.format());

    let expected = cached.samples().unwrap().to_vec();

    let engine = started_offline_engine(target);
    let handle = engine.play(&streaming, PlayMode::Once).unwrap();
    let renderer = engine.offline_output().unwrap();

    let mut rendered = Vec::new();
    let mut out = vec![0.0; 1000];
    while rendered.len() < expected.len() + 1000 {
        renderer.render(&mut out);
        rendered.extend_from_slice(&out);
    }

    assert!(handle.is_finished());
    for (i, (r, e)) in rendered.iter().zip(expected.iter()).enumerate() {
        assert!((r - e).abs() < 1e-6, "sample {}: {} vs {}", i, r, e);
    }
    assert!(rendered[expected.len()..].iter().all(|&s| s == 0.0));
}
