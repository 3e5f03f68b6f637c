// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Four-point perspective rectification.
//
// Maps a detected outline onto an upright rectangle whose size is taken from
// the outline's longest opposite edges. When there is no usable outline the
// source is passed through untouched.

use image::{DynamicImage, ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};
use imageproc::definitions::Clamp;
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use tracing::{debug, info, warn};

use crate::scan::geometry::{OrderedCorners, Quadrilateral, ScaleRatio};

/// Outcome of [`rectify`].
#[derive(Debug, Clone)]
pub struct Rectification {
    pub image: DynamicImage,
    /// Whether a warp was actually applied.
    pub outline_found: bool,
    /// Full-resolution corners used for the warp, when an outline was given.
    pub corners: Option<OrderedCorners>,
}

/// Output size for a warp of `corners`: the longer of each pair of opposite
/// edges, truncated to whole pixels.
pub fn destination_size(corners: &OrderedCorners) -> (u32, u32) {
    let width = corners.max_width().max(0.0) as u32;
    let height = corners.max_height().max(0.0) as u32;
    (width, height)
}

/// Warp the region bounded by `corners` onto an upright rectangle.
///
/// Returns `None` when the destination would be smaller than 2x2 or the
/// corners do not define a projective mapping (e.g. three are collinear).
/// Gray, gray-alpha and RGBA sources keep their channel layout and bit depth.
/// Other colour layouts become 8-bit RGB.
pub fn four_point_transform(source: &DynamicImage, corners: &OrderedCorners) -> Option<DynamicImage> {
    let (width, height) = destination_size(corners);
    if width < 2 || height < 2 {
        return None;
    }

    let (w, h) = ((width - 1) as f32, (height - 1) as f32);
    let from = corners.to_array().map(|p| p.as_f32_tuple());
    let to = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    let projection = Projection::from_control_points(from, to)?;
    let size = (width, height);

    let warped = match source {
        DynamicImage::ImageLuma8(img) => DynamicImage::ImageLuma8(warp(img, &projection, Luma([0]), size)),
        DynamicImage::ImageLumaA8(img) => {
            DynamicImage::ImageLumaA8(warp(img, &projection, LumaA([0, 255]), size))
        }
        DynamicImage::ImageLuma16(img) => DynamicImage::ImageLuma16(warp(img, &projection, Luma([0]), size)),
        DynamicImage::ImageLumaA16(img) => {
            DynamicImage::ImageLumaA16(warp(img, &projection, LumaA([0, u16::MAX]), size))
        }
        DynamicImage::ImageRgba8(img) => {
            DynamicImage::ImageRgba8(warp(img, &projection, Rgba([0, 0, 0, 255]), size))
        }
        DynamicImage::ImageRgb8(img) => DynamicImage::ImageRgb8(warp(img, &projection, Rgb([0, 0, 0]), size)),
        other => DynamicImage::ImageRgb8(warp(&other.to_rgb8(), &projection, Rgb([0, 0, 0]), size)),
    };
    Some(warped)
}

fn warp<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    projection: &Projection,
    background: P,
    (width, height): (u32, u32),
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + Send + Sync,
    P::Subpixel: Send + Sync + Into<f32> + Clamp<f32>,
{
    let mut out = ImageBuffer::new(width, height);
    warp_into(image, projection, Interpolation::Bilinear, background, &mut out);
    out
}

/// Rectify `source` using an outline found at working resolution.
///
/// `ratio` maps the outline back to `source` coordinates. A missing or
/// degenerate outline yields the original image with `outline_found` unset.
pub fn rectify(source: DynamicImage, ratio: ScaleRatio, outline: Option<&Quadrilateral>) -> Rectification {
    let Some(quad) = outline else {
        warn!("No receipt outline found, returning original image unchanged");
        return Rectification {
            image: source,
            outline_found: false,
            corners: None,
        };
    };

    let corners = quad.scaled(ratio).ordered();
    debug!(?corners, "Full-resolution corners");

    match four_point_transform(&source, &corners) {
        Some(image) => {
            info!(
                width = image.width(),
                height = image.height(),
                "Perspective rectification applied"
            );
            Rectification {
                image,
                outline_found: true,
                corners: Some(corners),
            }
        }
        None => {
            warn!(?corners, "Degenerate receipt outline, returning original image unchanged");
            Rectification {
                image: source,
                outline_found: false,
                corners: Some(corners),
            }
        }
    }
}
