// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.
//
// The enhancement constants come in two fixed sets selected by `Mode`. They
// are resolved once into a `PipelineConfig` at the entry point; stages only
// ever see the numeric parameters they need.

use serde::{Deserialize, Serialize};

use crate::error::{QuittungError, Result};

/// Enhancement profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Moderate denoise, gap-filling morphology, final sharpening.
    #[default]
    Standard,
    /// Heavy denoise and speck removal for very noisy or low quality photos.
    Aggressive,
}

impl Mode {
    pub fn output_suffix(&self) -> &'static str {
        match self {
            Self::Standard => "_enhanced",
            Self::Aggressive => "_aggressive",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Aggressive => f.write_str("aggressive"),
        }
    }
}

/// Conditional upscale parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpscaleParams {
    /// Images whose smaller side is below this are scaled up towards it.
    pub target_min_dimension: u32,
    /// Upper bound on the scale factor.
    pub max_factor: f64,
}

/// Noise reduction variant and strength.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenoiseParams {
    /// Edge-preserving bilateral filter over a `diameter`-wide square window.
    Bilateral {
        diameter: u32,
        sigma_color: f64,
        sigma_space: f64,
    },
    /// Non-local means: patch-similarity weighted averaging.
    NonLocalMeans {
        /// Filter strength; larger removes more noise and more detail.
        h: f64,
        template_window: u32,
        search_window: u32,
    },
}

/// Contrast-limited adaptive histogram equalisation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClaheParams {
    pub clip_limit: f64,
    /// Number of tiles along (x, y).
    pub tile_grid: (u32, u32),
}

/// Grayscale morphological operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MorphOp {
    /// Dilate then erode: fills small dark gaps inside strokes.
    Close,
    /// Erode then dilate: strips small bright specks.
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MorphologyParams {
    pub op: MorphOp,
    /// Rectangular kernel (width, height).
    pub kernel: (u32, u32),
}

/// Gaussian-weighted adaptive threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdParams {
    /// Odd neighbourhood size.
    pub block_size: u32,
    /// Subtracted from the local mean.
    pub c: i32,
}

/// Largest morphology kernel side the structuring element can represent.
pub const MAX_MORPHOLOGY_KERNEL: u32 = 255;

/// Fully resolved enhancement configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub mode: Mode,
    pub upscale: UpscaleParams,
    pub denoise: DenoiseParams,
    pub contrast: ClaheParams,
    pub morphology: MorphologyParams,
    pub threshold: ThresholdParams,
    /// Binarized images with a mean below this are inverted.
    pub polarity_midpoint: f64,
    /// Apply the 3x3 sharpening kernel as the last stage.
    pub sharpen: bool,
}

impl PipelineConfig {
    /// Resolve the constant set for `mode`.
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Standard => Self::standard(),
            Mode::Aggressive => Self::aggressive(),
        }
    }

    pub fn standard() -> Self {
        Self {
            mode: Mode::Standard,
            upscale: UpscaleParams {
                target_min_dimension: 1200,
                max_factor: 3.0,
            },
            denoise: DenoiseParams::Bilateral {
                diameter: 9,
                sigma_color: 75.0,
                sigma_space: 75.0,
            },
            contrast: ClaheParams {
                clip_limit: 2.0,
                tile_grid: (8, 8),
            },
            morphology: MorphologyParams {
                op: MorphOp::Close,
                kernel: (2, 2),
            },
            threshold: ThresholdParams {
                block_size: 11,
                c: 2,
            },
            polarity_midpoint: 127.0,
            sharpen: true,
        }
    }

    pub fn aggressive() -> Self {
        Self {
            mode: Mode::Aggressive,
            upscale: UpscaleParams {
                target_min_dimension: 1800,
                max_factor: 4.0,
            },
            denoise: DenoiseParams::NonLocalMeans {
                h: 10.0,
                template_window: 7,
                search_window: 21,
            },
            contrast: ClaheParams {
                clip_limit: 3.0,
                tile_grid: (8, 8),
            },
            morphology: MorphologyParams {
                op: MorphOp::Open,
                kernel: (3, 3),
            },
            threshold: ThresholdParams {
                block_size: 15,
                c: 3,
            },
            polarity_midpoint: 127.0,
            sharpen: false,
        }
    }

    /// Check that every parameter is usable by the filter stages.
    pub fn validate(&self) -> Result<()> {
        if self.upscale.target_min_dimension == 0 {
            return Err(QuittungError::Config(
                "upscale target dimension must be positive".into(),
            ));
        }
        if !(self.upscale.max_factor >= 1.0) {
            return Err(QuittungError::Config(format!(
                "upscale max factor must be at least 1.0, got {}",
                self.upscale.max_factor
            )));
        }
        match self.denoise {
            DenoiseParams::Bilateral {
                diameter,
                sigma_color,
                sigma_space,
            } => {
                if diameter == 0 || sigma_color <= 0.0 || sigma_space <= 0.0 {
                    return Err(QuittungError::Config(
                        "bilateral diameter and sigmas must be positive".into(),
                    ));
                }
            }
            DenoiseParams::NonLocalMeans {
                h,
                template_window,
                search_window,
            } => {
                if h <= 0.0 {
                    return Err(QuittungError::Config(
                        "non-local means strength must be positive".into(),
                    ));
                }
                require_odd("template window", template_window)?;
                require_odd("search window", search_window)?;
            }
        }
        if !(self.contrast.clip_limit > 0.0) {
            return Err(QuittungError::Config("CLAHE clip limit must be positive".into()));
        }
        if self.contrast.tile_grid.0 == 0 || self.contrast.tile_grid.1 == 0 {
            return Err(QuittungError::Config("CLAHE tile grid must be non-empty".into()));
        }
        let (kw, kh) = self.morphology.kernel;
        if !(1..=MAX_MORPHOLOGY_KERNEL).contains(&kw) || !(1..=MAX_MORPHOLOGY_KERNEL).contains(&kh) {
            return Err(QuittungError::Config(format!(
                "morphology kernel sides must be between 1 and {MAX_MORPHOLOGY_KERNEL}, got {kw}x{kh}"
            )));
        }
        require_odd("threshold block size", self.threshold.block_size)?;
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::standard()
    }
}

fn require_odd(name: &str, value: u32) -> Result<()> {
    if value < 3 || value % 2 == 0 {
        return Err(QuittungError::Config(format!(
            "{name} must be an odd number >= 3, got {value}"
        )));
    }
    Ok(())
}

/// Outline detection constants. Fixed; not selected by `Mode`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Width of the downscaled working copy used for detection.
    pub working_width: u32,
    /// Gaussian blur kernel size applied before edge detection.
    pub blur_kernel: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Polygon simplification tolerance as a fraction of the contour perimeter.
    pub approx_epsilon_ratio: f64,
    /// Dilate the edge map by one pixel so that corners broken by non-maximum
    /// suppression still form closed boundaries.
    pub close_edge_gaps: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            working_width: 500,
            blur_kernel: 5,
            canny_low: 75.0,
            canny_high: 200.0,
            approx_epsilon_ratio: 0.02,
            close_edge_gaps: true,
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.working_width == 0 {
            return Err(QuittungError::Config("working width must be positive".into()));
        }
        require_odd("blur kernel", self.blur_kernel)?;
        if self.canny_low > self.canny_high {
            return Err(QuittungError::Config(format!(
                "canny low threshold {} exceeds high threshold {}",
                self.canny_low, self.canny_high
            )));
        }
        if !(self.approx_epsilon_ratio > 0.0) {
            return Err(QuittungError::Config(
                "approximation tolerance must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_sets_are_valid() {
        PipelineConfig::standard().validate().unwrap();
        PipelineConfig::aggressive().validate().unwrap();
        DetectorConfig::default().validate().unwrap();
    }

    #[test]
    fn for_mode_selects_matching_set() {
        let standard = PipelineConfig::for_mode(Mode::Standard);
        assert_eq!(standard.mode, Mode::Standard);
        assert_eq!(standard.upscale.max_factor, 3.0);
        assert_eq!(standard.morphology.op, MorphOp::Close);
        assert!(standard.sharpen);

        let aggressive = PipelineConfig::for_mode(Mode::Aggressive);
        assert_eq!(aggressive.upscale.target_min_dimension, 1800);
        assert_eq!(aggressive.threshold, ThresholdParams { block_size: 15, c: 3 });
        assert_eq!(aggressive.morphology.op, MorphOp::Open);
        assert!(!aggressive.sharpen);
        assert!(matches!(aggressive.denoise, DenoiseParams::NonLocalMeans { .. }));
    }

    #[test]
    fn even_block_size_is_rejected() {
        let mut config = PipelineConfig::standard();
        config.threshold.block_size = 10;
        assert!(matches!(config.validate(), Err(QuittungError::Config(_))));
    }

    #[test]
    fn morphology_kernel_must_fit_structuring_element() {
        let mut config = PipelineConfig::standard();
        config.morphology.kernel = (0, 2);
        assert!(config.validate().is_err());
        config.morphology.kernel = (MAX_MORPHOLOGY_KERNEL + 1, 3);
        assert!(matches!(config.validate(), Err(QuittungError::Config(_))));
        config.morphology.kernel = (MAX_MORPHOLOGY_KERNEL, 1);
        config.validate().unwrap();
    }

    #[test]
    fn max_factor_below_one_is_rejected() {
        let mut config = PipelineConfig::aggressive();
        config.upscale.max_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_serializes_with_lowercase_mode() {
        let json = serde_json::to_value(PipelineConfig::aggressive()).unwrap();
        assert_eq!(json["mode"], "aggressive");
        assert_eq!(json["denoise"]["kind"], "non_local_means");
        assert_eq!(json["morphology"]["op"], "open");
    }
}
