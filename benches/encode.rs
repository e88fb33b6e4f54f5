use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trailcap::capture::{CaptureConfig, FrameSource, SyntheticCamera};
use trailcap::encoding::{CropPolicy, FrameEncoder};
use trailcap::metadata::{FrameStamp, MetadataEmbedder};
use trailcap::sensors::SensorSnapshot;

fn bench_encode(c: &mut Criterion) {
    let mut camera = SyntheticCamera::new();
    camera
        .open(&CaptureConfig::with_dimensions(640, 480))
        .unwrap();
    let frame = camera.next_frame().unwrap();
    let encoder = FrameEncoder::new(85);

    c.bench_function("encode_640x480", |b| {
        b.iter(|| encoder.encode(black_box(&frame), CropPolicy::Full).unwrap())
    });
}

fn bench_embed(c: &mut Criterion) {
    let mut camera = SyntheticCamera::new();
    camera
        .open(&CaptureConfig::with_dimensions(640, 480))
        .unwrap();
    let frame = camera.next_frame().unwrap();
    let jpeg = FrameEncoder::new(85)
        .encode(&frame, CropPolicy::Full)
        .unwrap()
        .bytes;

    let embedder = MetadataEmbedder::default();
    let stamp = FrameStamp {
        captured_at_ms: 1_700_000_000_000,
        sensors: SensorSnapshot::default(),
        width: 640,
        height: 480,
    };

    c.bench_function("embed_metadata", |b| {
        b.iter(|| embedder.embed(black_box(jpeg.clone()), &stamp))
    });
}

criterion_group!(benches, bench_encode, bench_embed);
criterion_main!(benches);
