// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Receipt enhancement pipeline. Turns a colour or grayscale photo into a
// single-channel, high-contrast image with dark glyphs on a light background.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::filter::bilateral_filter;
use quittung_core::config::{DenoiseParams, UpscaleParams};
use quittung_core::{Mode, PipelineConfig, QuittungError, Result, RunId, Stage};
use tracing::{debug, info, instrument};

use crate::buffer::channel_count;
use crate::progress::{ProgressSink, StageTimer};
use crate::scan::filters;

/// Scale factor for the conditional upscale, or `None` when the smaller side
/// already reaches the target.
pub fn upscale_factor(width: u32, height: u32, params: &UpscaleParams) -> Option<f64> {
    let min_side = width.min(height);
    if min_side == 0 || min_side >= params.target_min_dimension {
        return None;
    }
    Some((params.target_min_dimension as f64 / min_side as f64).min(params.max_factor))
}

/// Chainable enhancement stages over one working image.
///
/// Every stage consumes `self` and returns the transformed enhancer. Stages
/// after [`grayscale`](Self::grayscale) need a single-channel buffer and fail
/// with a `Processing` error otherwise.
///
/// ```ignore
/// let gray = ReceiptEnhancer::for_mode(photo, Mode::Standard)
///     .upscale()
///     .grayscale()
///     .denoise()?
///     .local_contrast()?
///     .into_gray()?;
/// ```
pub struct ReceiptEnhancer {
    image: DynamicImage,
    config: PipelineConfig,
}

impl ReceiptEnhancer {
    // -- Construction ---------------------------------------------------------

    pub fn new(image: DynamicImage, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { image, config })
    }

    /// Use the built-in constant set for `mode`.
    pub fn for_mode(image: DynamicImage, mode: Mode) -> Self {
        Self {
            image,
            config: PipelineConfig::for_mode(mode),
        }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    /// Unwrap the single-channel result.
    pub fn into_gray(self) -> Result<GrayImage> {
        match self.image {
            DynamicImage::ImageLuma8(gray) => Ok(gray),
            other => Err(QuittungError::processing(
                Stage::Grayscale,
                format!("expected a single-channel result, got {:?}", other.color()),
            )),
        }
    }

    /// Stages this configuration runs, in order.
    pub fn stages(&self) -> Vec<Stage> {
        let mut stages = vec![
            Stage::Upscale,
            Stage::Grayscale,
            Stage::Denoise,
            Stage::Contrast,
            Stage::Morphology,
            Stage::Threshold,
            Stage::Polarity,
        ];
        if self.config.sharpen {
            stages.push(Stage::Sharpen);
        }
        stages
    }

    fn luma(&self, stage: Stage) -> Result<&GrayImage> {
        self.image.as_luma8().ok_or_else(|| {
            QuittungError::processing(
                stage,
                format!("expected a single-channel buffer, got {:?}", self.image.color()),
            )
        })
    }

    fn with_gray(self, gray: GrayImage) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(gray),
            config: self.config,
        }
    }

    // -- Stages ---------------------------------------------------------------

    /// Scale up small photos so glyph strokes survive the later filters.
    #[instrument(skip(self), fields(width = self.image.width(), height = self.image.height()))]
    pub fn upscale(self) -> Self {
        let (width, height) = (self.image.width(), self.image.height());
        let Some(factor) = upscale_factor(width, height, &self.config.upscale) else {
            debug!("Upscale not needed");
            return self;
        };
        let new_width = (width as f64 * factor).round() as u32;
        let new_height = (height as f64 * factor).round() as u32;
        info!(factor, new_width, new_height, "Upscaling");
        Self {
            image: self
                .image
                .resize_exact(new_width, new_height, FilterType::CatmullRom),
            config: self.config,
        }
    }

    /// Convert to 8-bit grayscale unless already single-channel.
    pub fn grayscale(self) -> Self {
        if matches!(self.image, DynamicImage::ImageLuma8(_)) {
            return self;
        }
        let gray = self.image.to_luma8();
        self.with_gray(gray)
    }

    #[instrument(skip(self))]
    pub fn denoise(self) -> Result<Self> {
        let gray = self.luma(Stage::Denoise)?;
        if gray.width() == 0 || gray.height() == 0 {
            return Ok(self);
        }
        let denoised = match self.config.denoise {
            DenoiseParams::Bilateral {
                diameter,
                sigma_color,
                sigma_space,
            } => {
                debug!(diameter, sigma_color, sigma_space, "Bilateral filter");
                bilateral_filter(gray, diameter, sigma_color as f32, sigma_space as f32)
            }
            DenoiseParams::NonLocalMeans {
                h,
                template_window,
                search_window,
            } => {
                debug!(h, template_window, search_window, "Non-local means");
                filters::non_local_means(gray, h, template_window, search_window)
            }
        };
        Ok(self.with_gray(denoised))
    }

    /// CLAHE with the configured clip limit and tile grid.
    pub fn local_contrast(self) -> Result<Self> {
        let params = self.config.contrast;
        let gray = self.luma(Stage::Contrast)?;
        debug!(clip_limit = params.clip_limit, tiles = ?params.tile_grid, "CLAHE");
        let equalised = filters::clahe(gray, params.clip_limit, params.tile_grid);
        Ok(self.with_gray(equalised))
    }

    pub fn morphology(self) -> Result<Self> {
        let params = self.config.morphology;
        let gray = self.luma(Stage::Morphology)?;
        debug!(op = ?params.op, kernel = ?params.kernel, "Morphology");
        let cleaned = filters::morphology(gray, params.op, params.kernel);
        Ok(self.with_gray(cleaned))
    }

    /// Binarize against a Gaussian local mean.
    pub fn threshold(self) -> Result<Self> {
        let params = self.config.threshold;
        let gray = self.luma(Stage::Threshold)?;
        debug!(block_size = params.block_size, c = params.c, "Adaptive threshold");
        let binary = filters::adaptive_threshold(gray, params.block_size, params.c);
        Ok(self.with_gray(binary))
    }

    /// Invert a mostly-dark result. Returns whether it was inverted.
    pub fn correct_polarity(self) -> Result<(Self, bool)> {
        self.luma(Stage::Polarity)?;
        let midpoint = self.config.polarity_midpoint;
        let config = self.config;
        let DynamicImage::ImageLuma8(gray) = self.image else {
            return Err(QuittungError::processing(Stage::Polarity, "buffer changed layout"));
        };
        let (fixed, inverted) = filters::correct_polarity(gray, midpoint);
        if inverted {
            debug!(midpoint, "Dark background detected, inverted");
        }
        Ok((
            Self {
                image: DynamicImage::ImageLuma8(fixed),
                config,
            },
            inverted,
        ))
    }

    pub fn sharpen(self) -> Result<Self> {
        let sharpened = filters::sharpen(self.luma(Stage::Sharpen)?);
        Ok(self.with_gray(sharpened))
    }

    // -- Full pipeline --------------------------------------------------------

    fn apply(self, stage: Stage) -> Result<(Self, Option<String>)> {
        match stage {
            Stage::Upscale => {
                let factor = upscale_factor(
                    self.image.width(),
                    self.image.height(),
                    &self.config.upscale,
                );
                let note = match factor {
                    Some(f) => format!("scaled by {f:.2}"),
                    None => "kept original size".to_string(),
                };
                Ok((self.upscale(), Some(note)))
            }
            Stage::Grayscale => Ok((self.grayscale(), None)),
            Stage::Denoise => Ok((self.denoise()?, None)),
            Stage::Contrast => Ok((self.local_contrast()?, None)),
            Stage::Morphology => Ok((self.morphology()?, None)),
            Stage::Threshold => Ok((self.threshold()?, None)),
            Stage::Polarity => {
                let (next, inverted) = self.correct_polarity()?;
                Ok((next, inverted.then(|| "inverted".to_string())))
            }
            Stage::Sharpen => Ok((self.sharpen()?, None)),
            other => Err(QuittungError::processing(
                other,
                "not an enhancement stage",
            )),
        }
    }

    /// Run every configured stage in order, reporting each to `sink`.
    #[instrument(skip_all, fields(%run_id, mode = %self.config.mode))]
    pub fn enhance(self, run_id: RunId, sink: &mut dyn ProgressSink) -> Result<GrayImage> {
        info!(
            width = self.image.width(),
            height = self.image.height(),
            "Running receipt enhancement pipeline"
        );

        let stages = self.stages();
        let mut current = self;
        for stage in stages {
            let timer = StageTimer::start(stage);
            let (next, note) = current.apply(stage)?;
            current = next;
            let mut event = timer.finish(
                run_id,
                current.image.width(),
                current.image.height(),
                channel_count(&current.image),
            );
            event.note = note;
            sink.on_stage(&event);
        }

        let gray = current.into_gray()?;
        info!(
            width = gray.width(),
            height = gray.height(),
            "Enhancement complete"
        );
        Ok(gray)
    }
}
