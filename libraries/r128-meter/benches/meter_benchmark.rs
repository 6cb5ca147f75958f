//! Performance benchmarks for loudness metering
//!
//! Run with: cargo bench -p r128-meter --bench meter_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use r128_meter::{HistoryMode, Meter, MeterConfig};
use std::f32::consts::PI;

/// Generate a test signal (1kHz sine wave)
fn generate_test_signal(sample_rate: u32, duration_secs: f32, channels: usize) -> Vec<f32> {
    let num_samples = (sample_rate as f32 * duration_secs) as usize;
    let frequency = 1000.0;
    let mut samples = Vec::with_capacity(num_samples * channels);

    for i in 0..num_samples {
        let t = i as f32 / sample_rate as f32;
        let value = 0.5 * (2.0 * PI * frequency * t).sin();
        for _ in 0..channels {
            samples.push(value);
        }
    }

    samples
}

fn bench_channel_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_frames");
    let sample_rate = 48000;

    for channels in [1usize, 2, 6] {
        let input = generate_test_signal(sample_rate, 1.0, channels);
        group.throughput(Throughput::Elements(sample_rate as u64));

        group.bench_with_input(
            BenchmarkId::new("channels", channels),
            &input,
            |b, input| {
                b.iter(|| {
                    let mut meter =
                        Meter::new(MeterConfig::new(channels as u32, sample_rate)).unwrap();
                    meter.add_frames(black_box(input)).unwrap();
                    black_box(meter.integrated_loudness().ok())
                });
            },
        );
    }

    group.finish();
}

fn bench_history_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("loudness_range");
    let sample_rate = 48000;
    let input = generate_test_signal(sample_rate, 60.0, 2);

    for history in [HistoryMode::Full, HistoryMode::Histogram] {
        let mut meter =
            Meter::new(MeterConfig::new(2, sample_rate).with_history(history)).unwrap();
        meter.add_frames(&input).unwrap();

        group.bench_function(BenchmarkId::new("query", format!("{:?}", history)), |b| {
            b.iter(|| black_box(meter.loudness_range().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_channel_counts, bench_history_modes);
criterion_main!(benches);
