// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the quittung-document crate: outline detection on a
// synthetic receipt photo and both enhancement modes on a small noisy scan.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;

use quittung_core::{Mode, RunId};
use quittung_document::{NoopSink, QuadDetector, ReceiptEnhancer};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// 1600x1200 black photo with a slightly rotated white receipt.
fn receipt_photo() -> DynamicImage {
    let mut img = RgbImage::from_pixel(1600, 1200, Rgb([0, 0, 0]));
    let corners = [
        Point::new(420, 180),
        Point::new(1190, 250),
        Point::new(1130, 1050),
        Point::new(360, 980),
    ];
    draw_polygon_mut(&mut img, &corners, Rgb([255, 255, 255]));
    DynamicImage::ImageRgb8(img)
}

/// 400x400 paper-coloured page with horizontal "text" bars and mild noise.
fn noisy_scan() -> DynamicImage {
    let mut state = 0x2545_f491_u32;
    let img = GrayImage::from_fn(400, 400, |_, y| {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let noise = ((state >> 16) % 21) as i32 - 10;
        let base = if y % 24 < 6 { 60 } else { 200 };
        Luma([(base + noise).clamp(0, 255) as u8])
    });
    DynamicImage::ImageLuma8(img)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_detection(c: &mut Criterion) {
    let photo = receipt_photo();
    let detector = QuadDetector::default();

    c.bench_function("detect_outline (1600x1200)", |b| {
        b.iter(|| black_box(detector.detect(black_box(&photo))));
    });
}

fn bench_enhancement(c: &mut Criterion) {
    let scan = noisy_scan();
    let mut group = c.benchmark_group("enhance (400x400)");
    group.sample_size(10);

    for mode in [Mode::Standard, Mode::Aggressive] {
        group.bench_function(mode.to_string(), |b| {
            b.iter(|| {
                let enhancer = ReceiptEnhancer::for_mode(black_box(scan.clone()), mode);
                black_box(enhancer.enhance(RunId::new(), &mut NoopSink))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_detection, bench_enhancement);
criterion_main!(benches);
