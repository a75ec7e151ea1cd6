use criterion::{
    BenchmarkId, Criterion, black_box, criterion_group, criterion_main,
};
use mpr::{
    render::{
        ImageRenderConfig, ImageSize, RenderConfig, Renderer, ThreadPool,
        TileSizes, VoxelSize,
    },
    tape::Tape,
};
use std::num::NonZeroUsize;

const BLOBS: &str = include_str!("../../models/blobs.vm");
const SPHERE: &str = include_str!("../../models/sphere.vm");

pub fn blobs_size_sweep(c: &mut Criterion) {
    let tape = &Tape::from_text(BLOBS.as_bytes()).unwrap();

    let mut group = c.benchmark_group("speed vs image size (blobs, 3d)");
    for size in [128, 256, 512] {
        let cfg = &RenderConfig {
            image_size: VoxelSize::cube(size).unwrap(),
            ..Default::default()
        };
        group.bench_function(BenchmarkId::new("oneshot", size), move |b| {
            b.iter(|| black_box(cfg.run(tape).unwrap()))
        });

        // Reuse the arena and tile lists between frames
        let mut renderer = Renderer::new(tape, cfg).unwrap();
        group.bench_function(BenchmarkId::new("reused", size), |b| {
            b.iter(|| black_box(renderer.run().unwrap()))
        });
    }
}

pub fn blobs_thread_sweep(c: &mut Criterion) {
    let tape = &Tape::from_text(BLOBS.as_bytes()).unwrap();

    let mut group = c.benchmark_group("speed vs threads (blobs, 3d) (256³)");
    for threads in [1, 2, 4, 8] {
        let pool = ThreadPool::with_threads(NonZeroUsize::new(threads))
            .unwrap();
        let cfg = RenderConfig {
            image_size: VoxelSize::cube(256).unwrap(),
            threads: &pool,
            ..Default::default()
        };
        group.bench_function(BenchmarkId::new("blobs", threads), |b| {
            b.iter(|| black_box(cfg.run(tape).unwrap()))
        });
    }
}

pub fn sphere_tile_sweep(c: &mut Criterion) {
    let tape = &Tape::from_text(SPHERE.as_bytes()).unwrap();

    let mut group = c.benchmark_group("speed vs tile sizes (sphere, 3d)");
    for tiles in [&[64, 16, 4][..], &[64, 8, 2], &[32, 8, 4, 2], &[16, 4]] {
        let cfg = RenderConfig {
            image_size: VoxelSize::cube(256).unwrap(),
            tile_sizes: TileSizes::new(tiles).unwrap(),
            ..Default::default()
        };
        let name = format!("{tiles:?}");
        group.bench_function(BenchmarkId::new("sphere", name), |b| {
            b.iter(|| black_box(cfg.run(tape).unwrap()))
        });
    }
}

pub fn blobs_slice_sweep(c: &mut Criterion) {
    let tape = &Tape::from_text(BLOBS.as_bytes()).unwrap();

    let mut group = c.benchmark_group("speed vs image size (blobs, 2d)");
    for size in [256, 512, 1024] {
        let cfg = &ImageRenderConfig {
            image_size: ImageSize::square(size).unwrap(),
            ..Default::default()
        };
        group.bench_function(BenchmarkId::new("oneshot", size), move |b| {
            b.iter(|| black_box(cfg.run(tape).unwrap()))
        });
    }
}

criterion_group!(
    benches,
    blobs_size_sweep,
    blobs_thread_sweep,
    sphere_tile_sweep,
    blobs_slice_sweep
);
criterion_main!(benches);
