//! Identity Resolution Benchmarks
//!
//! # Running Benchmarks
//! ```bash
//! cargo bench --package roomsense-engine --bench resolve
//! ```
//!
//! # Metrics Measured
//! - Resolve throughput against registries of increasing size
//! - Descriptor cost per crop, single and batched

use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};
use roomsense_engine::{IdentityRegistry, RegistryConfig};
use roomsense_models::{
    AppearanceFeature, BoundingBox, CameraId, LocalTrackId, Observation, RoomId, FEATURE_DIM,
};
use roomsense_vision::{AppearanceDescriptor, OverlapMap};

/// Deterministic pseudo-random feature for person `seed`.
fn synthetic_feature(seed: u64) -> AppearanceFeature {
    let values = (0..FEATURE_DIM as u64)
        .map(|i| (((seed * 31 + i * 17) % 97) as f32) / 97.0)
        .collect();
    AppearanceFeature::new(values).unwrap_or_else(|_| AppearanceFeature::unmatchable())
}

fn observation(camera: &str, track: u64, ms: i64) -> Observation {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    Observation::new(
        CameraId::from(camera),
        LocalTrackId(track),
        BoundingBox::new(100.0, 100.0, 40.0, 120.0),
        start + ChronoDuration::milliseconds(ms),
        synthetic_feature(track),
    )
}

/// Registry holding `people` active identities seen by cam1.
fn populated_registry(people: u64) -> IdentityRegistry {
    let config = RegistryConfig {
        trust_local_tracks: false,
        ..Default::default()
    };
    let mut registry = IdentityRegistry::new(RoomId::from("bench"), config, OverlapMap::new());
    for track in 0..people {
        registry.resolve(&observation("cam1", track, 0));
    }
    registry
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    for people in [4u64, 16, 64] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("cross_camera", people),
            &people,
            |b, &people| {
                let mut registry = populated_registry(people);
                let mut track = 0;
                b.iter(|| {
                    track = (track + 1) % people;
                    let resolution = registry.resolve(black_box(&observation("cam2", track, 100)));
                    black_box(resolution)
                })
            },
        );
    }

    group.finish();
}

fn bench_descriptor(c: &mut Criterion) {
    let mut group = c.benchmark_group("descriptor");
    let descriptor = AppearanceDescriptor::default();
    let crop = RgbImage::from_fn(96, 192, |x, y| Rgb([(x * 2) as u8, (y % 256) as u8, 90]));

    group.bench_function("describe_crop", |b| {
        b.iter(|| black_box(descriptor.describe_crop(black_box(&crop))))
    });

    let crops = vec![crop.clone(); 32];
    group.throughput(Throughput::Elements(crops.len() as u64));
    group.bench_function("describe_batch_32", |b| {
        b.iter(|| black_box(descriptor.describe_batch(black_box(&crops))))
    });

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_descriptor);
criterion_main!(benches);
