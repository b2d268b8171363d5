//! Mixer Throughput Benchmark
//!
//! Measures the output callback path: pulling looped cached sources through
//! the mixer, and the gain stage on its own.
//!
//! **Target:** rendering 16 concurrent cues should stay far above realtime

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cuebox_ap::playback::volume::apply_gain;
use cuebox_ap::{AudioAsset, DeviceDescriptor, EngineOptions, PlayMode, PlaybackEngine, WaveFormat};

const RATE: u32 = 48000;

fn offline_engine(parallel: bool) -> PlaybackEngine {
    let format = WaveFormat::new(RATE, 2).unwrap();
    let engine = PlaybackEngine::new(
        EngineOptions::new(DeviceDescriptor::offline())
            .format(format)
            .parallel(parallel),
    );
    engine.start().unwrap();
    engine
}

fn bench_mix_concurrent_sources(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixer_render");
    let format = WaveFormat::new(RATE, 2).unwrap();
    // 1s stereo tone at a non-unity volume so the multiply path runs
    let samples: Vec<f32> = (0..RATE as usize * 2).map(|i| ((i / 2) as f32 * 0.05).sin() * 0.5).collect();
    let asset = AudioAsset::from_samples(samples, format, 0.8);

    for &sources in &[1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("10ms_buffer", sources), &sources, |b, &sources| {
            let engine = offline_engine(false);
            for _ in 0..sources {
                engine.play(&asset, PlayMode::Loop).unwrap();
            }
            let renderer = engine.offline_output().unwrap();
            let mut out = vec![0.0f32; (RATE / 100) as usize * 2];

            b.iter(|| {
                renderer.render(black_box(&mut out));
                black_box(&out);
            });
        });
    }

    group.finish();
}

fn bench_gain(c: &mut Criterion) {
    let mut group = c.benchmark_group("gain");
    let original = vec![0.5f32; RATE as usize * 2 * 10];

    group.bench_function("serial_10s", |b| {
        let mut samples = original.clone();
        b.iter(|| {
            apply_gain(black_box(&mut samples), 0.999, false);
        });
    });

    group.bench_function("parallel_10s", |b| {
        let mut samples = original.clone();
        b.iter(|| {
            apply_gain(black_box(&mut samples), 0.999, true);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_mix_concurrent_sources, bench_gain);
criterion_main!(benches);
