//! Benchmarks for the capture ring and level monitor

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::thread;

use asr_relay::audio::LevelMonitor;
use asr_relay::SegmentRing;

const SEGMENT: usize = 160; // 10ms at 16kHz

fn generate_speech_like_segment(index: usize) -> Vec<i16> {
    (0..SEGMENT)
        .map(|i| {
            let t = (index * SEGMENT + i) as f32 / 16000.0;
            let envelope = 0.5 + 0.5 * (2.0 * std::f32::consts::PI * 3.0 * t).sin();
            (envelope * 8000.0 * (2.0 * std::f32::consts::PI * 200.0 * t).sin()) as i16
        })
        .collect()
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_publish");
    let segment = generate_speech_like_segment(0);

    // One second of audio into rings of varying capacity
    for capacity in [128usize, 1024, 100_000] {
        group.bench_with_input(BenchmarkId::new("capacity", capacity), &capacity, |b, &cap| {
            b.iter_with_setup(
                || SegmentRing::new(SEGMENT, cap),
                |ring| {
                    for _ in 0..100 {
                        black_box(ring.publish(&segment));
                    }
                },
            )
        });
    }

    group.finish();
}

fn bench_producer_consumer(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring_threads");
    let segments: Vec<Vec<i16>> = (0..1000).map(generate_speech_like_segment).collect();

    // 10 seconds of audio through a producer thread and a blocking reader
    group.bench_function("10s_audio", |b| {
        b.iter_with_setup(
            || SegmentRing::new(SEGMENT, 1024),
            |ring| {
                thread::scope(|s| {
                    s.spawn(|| {
                        for segment in &segments {
                            ring.publish(segment);
                        }
                        ring.stop();
                    });

                    let mut reader = ring.reader();
                    let mut out = vec![0i16; SEGMENT];
                    while let Some(index) = reader.read_into(&mut out) {
                        black_box(index);
                    }
                });
            },
        )
    });

    group.finish();
}

fn bench_level_monitor(c: &mut Criterion) {
    let mut group = c.benchmark_group("level_monitor");
    let segments: Vec<Vec<i16>> = (0..100).map(generate_speech_like_segment).collect();

    group.bench_function("1s_audio", |b| {
        b.iter_with_setup(
            || LevelMonitor::new(0.0001),
            |monitor| {
                for segment in &segments {
                    monitor.update(segment);
                }
                black_box(monitor.level())
            },
        )
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_publish,
    bench_producer_consumer,
    bench_level_monitor
);
criterion_main!(benches);
