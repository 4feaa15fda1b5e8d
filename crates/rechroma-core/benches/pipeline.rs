//! Benchmarks for rechroma-core pipeline operations
//!
//! Run with: cargo bench -p rechroma-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::RgbImage;
use rechroma_core::pipeline::adaptive_stretch;
use rechroma_core::plane::Plane;
use rechroma_core::tiles::soft_weight_mask;
use rechroma_core::{color, ColorizeOptions};

/// Generate a synthetic photo-like gradient image.
fn generate_test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let fx = x as f32 / width as f32;
        let fy = y as f32 / height as f32;
        image::Rgb([
            (25.0 + 200.0 * fx) as u8,
            (25.0 + 200.0 * fy) as u8,
            (25.0 + 100.0 * (fx + fy)) as u8,
        ])
    })
}

/// Generate a chroma plane with spatially varying magnitude.
fn generate_chroma_plane(width: u32, height: u32) -> Plane {
    Plane::from_fn(width, height, |x, y| {
        let fx = x as f32 / width as f32;
        let fy = y as f32 / height as f32;
        image::Luma([40.0 * (fx - 0.5) + 20.0 * (fy - 0.5)])
    })
}

fn bench_decompose(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompose");

    for size in [256u32, 512, 1024].iter() {
        let image = generate_test_image(*size, *size);
        let pixel_count = (*size as u64) * (*size as u64);
        group.throughput(Throughput::Elements(pixel_count));

        group.bench_with_input(
            BenchmarkId::new("decompose", format!("{}x{}", size, size)),
            &image,
            |b, image| {
                b.iter(|| color::decompose(black_box(image)));
            },
        );
    }

    group.finish();
}

fn bench_soft_weight_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("soft_weight_mask");
    let options = ColorizeOptions::default();

    for size in [256u32, 512, 1024].iter() {
        group.bench_with_input(
            BenchmarkId::new("build", format!("{}x{}", size, size)),
            size,
            |b, &size| {
                b.iter(|| {
                    soft_weight_mask(
                        black_box(size),
                        black_box(size),
                        options.tile_border,
                        options.mask_kernel,
                    )
                });
            },
        );
    }

    group.finish();
}

fn bench_adaptive_stretch(c: &mut Criterion) {
    let mut group = c.benchmark_group("adaptive_stretch");

    for size in [512u32, 1024, 2048].iter() {
        let pixel_count = (*size as u64) * (*size as u64);
        group.throughput(Throughput::Elements(pixel_count));

        group.bench_with_input(
            BenchmarkId::new("stretch", format!("{}x{}", size, size)),
            size,
            |b, &size| {
                let a = generate_chroma_plane(size, size);
                let b_plane = generate_chroma_plane(size, size);
                b.iter(|| {
                    let mut a = a.clone();
                    let mut b_chan = b_plane.clone();
                    adaptive_stretch(black_box(&mut a), black_box(&mut b_chan), 2.0, 0.6, 25.0);
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_decompose,
    bench_soft_weight_mask,
    bench_adaptive_stretch
);
criterion_main!(benches);
