// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Receipt outline detection. Finds the largest boundary in the edge map that
// simplifies to exactly four vertices.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::morphology::dilate;
use quittung_core::{DetectorConfig, Result};
use tracing::{debug, info, instrument};

use crate::scan::filters;
use crate::scan::geometry::{Contour, Point2D, Quadrilateral, ScaleRatio};

/// Result of running detection on a full-resolution source.
#[derive(Debug, Clone)]
pub struct Detection {
    /// Outline in working-resolution coordinates, if one was found.
    pub quadrilateral: Option<Quadrilateral>,
    /// Maps working coordinates back to the source.
    pub ratio: ScaleRatio,
    pub working_width: u32,
    pub working_height: u32,
    /// Number of external boundaries examined.
    pub candidates: usize,
}

/// Greedy largest-first quadrilateral detector.
///
/// There is no confidence scoring: boundaries are visited in descending
/// enclosed area and the first one whose simplified polygon has four vertices
/// wins. Finding nothing is a normal outcome, not an error.
#[derive(Debug, Clone)]
pub struct QuadDetector {
    config: DetectorConfig,
}

impl Default for QuadDetector {
    fn default() -> Self {
        Self {
            config: DetectorConfig::default(),
        }
    }
}

impl QuadDetector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Downscale `image` to the working width, keeping the aspect ratio.
    ///
    /// The source is only borrowed; the working copy is a new buffer.
    pub fn prepare_working(&self, image: &DynamicImage) -> (DynamicImage, ScaleRatio) {
        let working_width = self.config.working_width;
        let aspect = image.height() as f64 / image.width().max(1) as f64;
        let working_height = (aspect * working_width as f64).round().max(1.0) as u32;

        let working = image.resize_exact(working_width, working_height, FilterType::Triangle);
        let ratio = ScaleRatio::from_widths(image.width(), working_width);
        debug!(
            working_width,
            working_height,
            ratio = ratio.value(),
            "Working copy prepared"
        );
        (working, ratio)
    }

    /// Grayscale → Gaussian blur → Canny → optional one-pixel dilation.
    ///
    /// `canny` smooths its input again (σ 1.4) before taking gradients, so the
    /// edges come from two blur passes.
    pub fn edge_map(&self, working: &DynamicImage) -> GrayImage {
        let gray = working.to_luma8();
        let blurred = filters::gaussian_blur(&gray, self.config.blur_kernel, 0.0);
        let edges = canny(&blurred, self.config.canny_low, self.config.canny_high);
        if self.config.close_edge_gaps {
            dilate(&edges, Norm::LInf, 1)
        } else {
            edges
        }
    }

    /// Search an edge map for a four-vertex outline.
    #[instrument(skip_all, fields(width = edges.width(), height = edges.height()))]
    pub fn find_quadrilateral(&self, edges: &GrayImage) -> Option<Quadrilateral> {
        self.select(external_contours(edges))
    }

    /// Largest-first search over already extracted boundaries.
    fn select(&self, contours: Vec<Contour>) -> Option<Quadrilateral> {
        let mut candidates: Vec<(Contour, f64)> = contours
            .into_iter()
            .map(|contour| {
                let area = contour.area();
                (contour, area)
            })
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        debug!(candidates = candidates.len(), "External boundaries extracted");

        for (rank, (contour, area)) in candidates.iter().enumerate() {
            let polygon = contour.approximate(self.config.approx_epsilon_ratio);
            if let Some(quad) = Quadrilateral::from_polygon(&polygon) {
                info!(rank, area, quad_area = quad.area(), "Four-corner outline found");
                return Some(quad);
            }
        }

        info!("No four-corner outline found");
        None
    }

    /// Full detection on a source image: working copy, edge map, search.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &DynamicImage) -> Detection {
        let (working, ratio) = self.prepare_working(image);
        let edges = self.edge_map(&working);
        let contours = external_contours(&edges);
        let candidates = contours.len();
        let quadrilateral = self.select(contours);
        Detection {
            quadrilateral,
            ratio,
            working_width: working.width(),
            working_height: working.height(),
            candidates,
        }
    }
}

impl Detection {
    /// Share of the working frame enclosed by the outline, in `0.0..=1.0`.
    pub fn coverage(&self) -> Option<f64> {
        let frame = self.working_width as f64 * self.working_height as f64;
        let quad = self.quadrilateral.as_ref()?;
        (frame > 0.0).then(|| (quad.area() / frame).clamp(0.0, 1.0))
    }
}

/// Outermost boundaries of the foreground (non-zero) regions of `edges`.
///
/// Hole borders and boundaries nested inside another region are skipped.
pub fn external_contours(edges: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter(|c| c.points.len() >= 3)
        .map(|c| {
            Contour::new(
                c.points
                    .iter()
                    .map(|p| Point2D::new(p.x as f64, p.y as f64))
                    .collect(),
            )
        })
        .collect()
}
