// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Single-channel filters used by the enhancement pipeline.
//
// Each filter takes a `GrayImage` and returns a new one of the same size.
// Blurs, sharpening and morphology go through `imageproc`, which replicates
// edge pixels past the border. Non-local means and CLAHE are implemented here
// and mirror the image at its border without repeating the edge pixel.

use image::{GrayImage, ImageBuffer, Luma, imageops};
use imageproc::filter::{filter3x3, separable_filter_equal};
use imageproc::morphology::{Mask, grayscale_close, grayscale_open};
use quittung_core::config::MorphOp;

/// Patch weights below this contribute nothing to non-local means.
const NLM_WEIGHT_THRESHOLD: f64 = 0.001;

/// 3x3 sharpening kernel, row-major: identity plus a full Laplacian.
pub const SHARPEN_KERNEL: [i32; 9] = [-1, -1, -1, -1, 9, -1, -1, -1, -1];

/// Mirror `i` into `0..len` without repeating the edge (`dcb|abcd|cba`).
/// `len` must be non-zero.
fn reflect101(i: i64, len: usize) -> usize {
    let n = len as i64;
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let m = i.rem_euclid(period);
    (if m >= n { period - m } else { m }) as usize
}

fn saturate(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn from_values(width: u32, height: u32, values: &[f64]) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([saturate(values[(y * width + x) as usize])])
    })
}

/// Sigma implied by a kernel size when none is given.
pub fn gaussian_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalised 1-D Gaussian kernel.
///
/// With `sigma <= 0` the small odd sizes use the binomial tables; larger sizes
/// derive sigma from `ksize`.
pub fn gaussian_kernel(ksize: u32, sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 {
        match ksize {
            1 => return vec![1.0],
            3 => return vec![0.25, 0.5, 0.25],
            5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => {
                return vec![
                    0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125,
                ];
            }
            _ => {}
        }
    }
    let sigma = if sigma > 0.0 { sigma } else { gaussian_sigma(ksize) };
    let centre = (ksize as f32 - 1.0) / 2.0;
    let scale = -0.5 / (sigma * sigma);
    let weights: Vec<f32> = (0..ksize)
        .map(|i| {
            let d = i as f32 - centre;
            (scale * d * d).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Square Gaussian blur with an odd kernel size.
///
/// Filtered at `f32` so the result is rounded rather than truncated.
pub fn gaussian_blur(image: &GrayImage, ksize: u32, sigma: f32) -> GrayImage {
    let kernel = gaussian_kernel(ksize, sigma);
    let values: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(image.width(), image.height(), |x, y| {
            Luma([image.get_pixel(x, y)[0] as f32])
        });
    let blurred = separable_filter_equal(&values, kernel.as_slice());
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([saturate(blurred.get_pixel(x, y)[0] as f64)])
    })
}

/// Non-local means denoising.
///
/// Every pixel becomes a weighted average of the pixels in its
/// `search_window` neighbourhood, weighted by `exp(-d / h^2)` where `d` is the
/// mean squared difference between the two `template_window` patches. Patch
/// distances for one offset at a time come from an integral image of squared
/// differences.
pub fn non_local_means(image: &GrayImage, h: f64, template_window: u32, search_window: u32) -> GrayImage {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return image.clone();
    }
    let ht = (template_window / 2) as usize;
    let hs = (search_window / 2) as usize;
    let tw = 2 * ht + 1;
    let pad = ht + hs;
    let pw = width + 2 * pad;
    let ph = height + 2 * pad;

    let src = image.as_raw();
    let mut padded = Vec::with_capacity(pw * ph);
    for py in 0..ph {
        let sy = reflect101(py as i64 - pad as i64, height);
        for px in 0..pw {
            let sx = reflect101(px as i64 - pad as i64, width);
            padded.push(src[sy * width + sx] as i32);
        }
    }

    let max_dist = 255 * 255;
    let weights: Vec<f64> = (0..=max_dist)
        .map(|d| {
            let w = (-(d as f64) / (h * h)).exp();
            if w < NLM_WEIGHT_THRESHOLD { 0.0 } else { w }
        })
        .collect();
    let template_area = (tw * tw) as u64;

    // Integral image over the region holding every template window of an
    // original pixel: padded coordinates [hs, hs + width + 2ht).
    let rw = width + 2 * ht;
    let rh = height + 2 * ht;
    let stride = rw + 1;
    let mut integral = vec![0u64; stride * (rh + 1)];
    let mut acc = vec![0.0f64; width * height];
    let mut norm = vec![0.0f64; width * height];

    let reach = hs as i64;
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            for ry in 0..rh {
                let py = ry + hs;
                let qy = (py as i64 + dy) as usize;
                let mut row_sum = 0u64;
                for rx in 0..rw {
                    let px = rx + hs;
                    let qx = (px as i64 + dx) as usize;
                    let d = padded[py * pw + px] - padded[qy * pw + qx];
                    row_sum += (d * d) as u64;
                    integral[(ry + 1) * stride + rx + 1] = integral[ry * stride + rx + 1] + row_sum;
                }
            }

            for y in 0..height {
                for x in 0..width {
                    let sum = (integral[(y + tw) * stride + x + tw] + integral[y * stride + x])
                        - (integral[y * stride + x + tw] + integral[(y + tw) * stride + x]);
                    let mean = ((sum + template_area / 2) / template_area) as usize;
                    let weight = weights[mean.min(max_dist)];
                    if weight == 0.0 {
                        continue;
                    }
                    let qx = (x + pad) as i64 + dx;
                    let qy = (y + pad) as i64 + dy;
                    let value = padded[qy as usize * pw + qx as usize];
                    acc[y * width + x] += weight * value as f64;
                    norm[y * width + x] += weight;
                }
            }
        }
    }

    // The zero offset always has weight 1, so `norm` is never zero.
    let values: Vec<f64> = acc.iter().zip(&norm).map(|(a, n)| a / n).collect();
    from_values(image.width(), image.height(), &values)
}

/// Clip a histogram at `clip` and spread the excess evenly over all bins.
fn clip_histogram(hist: &mut [usize; 256], clip: usize) {
    let mut excess = 0;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }

    let batch = excess / 256;
    let mut residual = excess - batch * 256;
    for count in hist.iter_mut() {
        *count += batch;
    }
    if residual > 0 {
        let step = (256 / residual).max(1);
        let mut bin = 0;
        while bin < 256 && residual > 0 {
            hist[bin] += 1;
            residual -= 1;
            bin += step;
        }
    }
}

/// Contrast-limited adaptive histogram equalisation.
///
/// The image is split into `tile_grid` tiles (the last row and column are
/// completed by mirroring), each tile gets a clipped-histogram lookup table,
/// and pixels are mapped by bilinear blending of the four nearest tables.
pub fn clahe(image: &GrayImage, clip_limit: f64, tile_grid: (u32, u32)) -> GrayImage {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return image.clone();
    }
    let tiles_x = tile_grid.0.max(1) as usize;
    let tiles_y = tile_grid.1.max(1) as usize;
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);
    let area = tile_w * tile_h;
    let clip = ((clip_limit * area as f64 / 256.0) as usize).max(1);
    let lut_scale = 255.0 / area as f64;
    let src = image.as_raw();

    let mut luts = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut hist = [0usize; 256];
            for y in ty * tile_h..(ty + 1) * tile_h {
                let sy = reflect101(y as i64, height);
                for x in tx * tile_w..(tx + 1) * tile_w {
                    let sx = reflect101(x as i64, width);
                    hist[src[sy * width + sx] as usize] += 1;
                }
            }
            clip_histogram(&mut hist, clip);

            let lut = &mut luts[ty * tiles_x + tx];
            let mut cumulative = 0;
            for (level, count) in hist.iter().enumerate() {
                cumulative += count;
                lut[level] = saturate(cumulative as f64 * lut_scale);
            }
        }
    }

    // Neighbouring tile indices and the weight of the second one.
    let neighbours = |pos: usize, tile: usize, tiles: usize| -> (usize, usize, f64) {
        let f = pos as f64 / tile as f64 - 0.5;
        let first = f.floor();
        let weight = f - first;
        let lo = first.max(0.0) as usize;
        let hi = ((first as i64 + 1).max(0) as usize).min(tiles - 1);
        (lo.min(tiles - 1), hi, weight)
    };

    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = src[y as usize * width + x as usize] as usize;
        let (x1, x2, xa) = neighbours(x as usize, tile_w, tiles_x);
        let (y1, y2, ya) = neighbours(y as usize, tile_h, tiles_y);
        let at = |tx: usize, ty: usize| luts[ty * tiles_x + tx][value] as f64;
        let top = at(x1, y1) * (1.0 - xa) + at(x2, y1) * xa;
        let bottom = at(x1, y2) * (1.0 - xa) + at(x2, y2) * xa;
        Luma([saturate(top * (1.0 - ya) + bottom * ya)])
    })
}

/// Rectangular structuring element of `kernel` (width, height), anchored at
/// `(width / 2, height / 2)`. Sides must not exceed 255.
pub fn rect_mask(kernel: (u32, u32)) -> Mask {
    let (w, h) = (kernel.0.clamp(1, 255), kernel.1.clamp(1, 255));
    let footprint = GrayImage::from_pixel(w, h, Luma([255]));
    Mask::from_image(&footprint, (w / 2) as u8, (h / 2) as u8)
}

/// Closing or opening with a rectangular kernel.
pub fn morphology(image: &GrayImage, op: MorphOp, kernel: (u32, u32)) -> GrayImage {
    let mask = rect_mask(kernel);
    match op {
        MorphOp::Close => grayscale_close(image, &mask),
        MorphOp::Open => grayscale_open(image, &mask),
    }
}

/// Binarize against a Gaussian-weighted local mean.
///
/// A pixel becomes white (255) when it exceeds its local mean minus `c`,
/// black (0) otherwise.
pub fn adaptive_threshold(image: &GrayImage, block_size: u32, c: i32) -> GrayImage {
    let mean = gaussian_blur(image, block_size, 0.0);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let diff = image.get_pixel(x, y)[0] as i32 - mean.get_pixel(x, y)[0] as i32;
        Luma([if diff > -c { 255 } else { 0 }])
    })
}

pub fn mean_intensity(image: &GrayImage) -> f64 {
    let raw = image.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    raw.iter().map(|&v| v as u64).sum::<u64>() as f64 / raw.len() as f64
}

/// Invert when the mean falls below `midpoint`, so text ends up dark on a
/// light background. Returns whether an inversion happened.
pub fn correct_polarity(mut image: GrayImage, midpoint: f64) -> (GrayImage, bool) {
    if mean_intensity(&image) < midpoint {
        imageops::invert(&mut image);
        (image, true)
    } else {
        (image, false)
    }
}

/// Convolve with [`SHARPEN_KERNEL`], saturating to 0..=255.
pub fn sharpen(image: &GrayImage) -> GrayImage {
    filter3x3::<_, i32, u8>(image, SHARPEN_KERNEL.as_slice())
}
