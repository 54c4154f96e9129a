//! Benchmarks for particle generation and the attach/detach cycle.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use scenery::engine::SceneLifecycleManager;
use scenery::events::EventSource;
use scenery::host::HeadlessHost;
use scenery::scene::ParticleFieldGenerator;
use scenery::SceneConfig;

fn particle_generation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("particle_generation");
    for count in [1_000, 5_000, 50_000] {
        group.bench_function(format!("{count}_particles"), |b| {
            let mut generator = ParticleFieldGenerator::seeded(7);
            b.iter(|| black_box(generator.generate(black_box(count), 10.0)));
        });
    }
    group.finish();
}

fn attach_detach_benchmark(c: &mut Criterion) {
    let config = SceneConfig {
        particle_seed: Some(7),
        ..SceneConfig::default()
    };
    let host = HeadlessHost::new(1280, 720);
    let mut manager = SceneLifecycleManager::new(EventSource::new());

    c.bench_function("attach_detach_cycle", |b| {
        b.iter(|| {
            let handle = manager.attach(host.clone(), &config).unwrap();
            black_box(manager.detach(handle))
        })
    });
}

fn frame_benchmark(c: &mut Criterion) {
    let host = HeadlessHost::new(1280, 720);
    let mut manager = SceneLifecycleManager::new(EventSource::new());
    let handle = manager.attach(host.clone(), &SceneConfig::default()).unwrap();

    c.bench_function("headless_frame", |b| {
        b.iter(|| {
            let (_, ticket) = host.take_frame_requests().pop().unwrap();
            black_box(manager.frame(handle, ticket))
        })
    });
}

criterion_group!(
    benches,
    particle_generation_benchmark,
    attach_detach_benchmark,
    frame_benchmark
);
criterion_main!(benches);
