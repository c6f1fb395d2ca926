//! Benchmarks for raster planning and synthetic tile rendering.
//!
//! Run with: cargo bench --package pdf-tiles-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pdf_tiles_core::{
    PageGeometry, PageGeometryEngine, PixelFormat, Rect, RenderConfig, RenderDispatcher,
    Rotation, ScalePolicy, SyntheticBackend, TileRequest, Transform, ViewerConfig,
};
use std::time::Duration;

fn letter(rotation: Rotation) -> PageGeometry {
    PageGeometry::new(Rect::new(0.0, 0.0, 612.0, 792.0), rotation)
}

fn benchmark_plans(c: &mut Criterion) {
    let engine = PageGeometryEngine::default();
    let mut group = c.benchmark_group("plans");

    for rotation in [Rotation::None, Rotation::Degrees90] {
        let page = letter(rotation);
        group.bench_with_input(
            BenchmarkId::new("full_page_plan", rotation.degrees()),
            &page,
            |b, page| b.iter(|| engine.full_page_plan(black_box(page), black_box(3.0))),
        );
        group.bench_with_input(
            BenchmarkId::new("tile_plan", rotation.degrees()),
            &page,
            |b, page| {
                b.iter(|| {
                    engine.tile_plan(
                        black_box(page),
                        black_box(4.0),
                        256,
                        256,
                        black_box(512.0),
                        black_box(-256.0),
                    )
                })
            },
        );
    }

    let transform = Transform::new(0.0, -2.0, 2.0, 0.0, 10.0, 1584.0);
    group.bench_function("transform_then_invert", |b| {
        b.iter(|| {
            black_box(transform)
                .then(&Transform::scale(1.5, -1.5))
                .invert()
        })
    });

    group.finish();
}

fn benchmark_synthetic_tiles(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let config = ViewerConfig::single_document().with_render(
        RenderConfig::default()
            .scale_policy(ScalePolicy::Unclamped)
            .pixel_format(PixelFormat::Rgba8),
    );
    let viewer = RenderDispatcher::with_backend(config, || Ok(SyntheticBackend::new()))
        .expect("synthetic dispatcher");
    runtime
        .block_on(viewer.open_document(
            SyntheticBackend::document_bytes(&[letter(Rotation::None)]),
            None,
            None,
        ))
        .expect("open document");

    let mut group = c.benchmark_group("synthetic_tiles");
    group.sample_size(20);
    group.measurement_time(Duration::from_secs(5));

    for size in [128u32, 256, 512] {
        let request = TileRequest::new(1, 2.0, size, size);
        group.bench_with_input(BenchmarkId::new("tile", size), &request, |b, request| {
            b.iter(|| runtime.block_on(viewer.tile_image(request)))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_plans, benchmark_synthetic_tiles);
criterion_main!(benches);
