// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `ocrs` backend for the `TextRecognizer` seam.
//
// Only available with the `ocr` feature. The engine needs two model files,
// `text-detection.rten` and `text-recognition.rten`, which `ocrs-cli`
// downloads into `$XDG_CACHE_HOME/ocrs` (usually `~/.cache/ocrs`) on first run.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine, OcrEngineParams, OcrInput};
use quittung_core::{QuittungError, Result};
use rten::Model;
use tracing::{debug, info, instrument};

use crate::scan::recognize::{Recognition, RecognitionHint, TextRecognizer};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, else `~/.cache/ocrs`, else `./ocrs-models`.
pub fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Where to find the two model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrConfig {
    /// Both models under `dir` with their well-known file names.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    /// Fail with a "model not found" error naming the first missing file.
    pub fn validate(&self) -> Result<()> {
        for (kind, path) in [
            ("detection", &self.detection_model_path),
            ("recognition", &self.recognition_model_path),
        ] {
            if !path.is_file() {
                return Err(QuittungError::Ocr(format!(
                    "{kind} model not found at {}; run `ocrs-cli` once to download the models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

fn load_model(kind: &str, path: &Path) -> Result<Model> {
    info!(kind, path = %path.display(), "Loading OCR model");
    Model::load_file(path).map_err(|err| {
        QuittungError::Ocr(format!(
            "failed to load {kind} model from {}: {}",
            path.display(),
            err
        ))
    })
}

/// Pure-Rust neural OCR.
///
/// Loading the models is the expensive part; build one recognizer and reuse
/// it for every image.
pub struct OcrsRecognizer {
    engine: OcrEngine,
}

impl OcrsRecognizer {
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn new(config: &OcrConfig) -> Result<Self> {
        config.validate()?;
        let detection_model = load_model("detection", &config.detection_model_path)?;
        let recognition_model = load_model("recognition", &config.recognition_model_path)?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| QuittungError::Ocr(format!("failed to initialise OCR engine: {}", err)))?;

        info!("OCR engine ready");
        Ok(Self { engine })
    }

    fn prepare(&self, image: &DynamicImage) -> Result<OcrInput> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            QuittungError::Ocr(format!(
                "failed to create image source ({}x{}): {}",
                width, height, err
            ))
        })?;
        self.engine
            .prepare_input(source)
            .map_err(|err| QuittungError::Ocr(format!("OCR preprocessing failed: {}", err)))
    }

    /// Word detection, line grouping, then per-line recognition.
    fn recognize_lines(&self, input: &OcrInput) -> Result<String> {
        let words = self
            .engine
            .detect_words(input)
            .map_err(|err| QuittungError::Ocr(format!("word detection failed: {}", err)))?;
        let lines = self.engine.find_text_lines(input, &words);
        debug!(words = words.len(), lines = lines.len(), "Text lines found");

        let texts = self
            .engine
            .recognize_text(input, &lines)
            .map_err(|err| QuittungError::Ocr(format!("line recognition failed: {}", err)))?;

        Ok(texts
            .iter()
            .flatten()
            .map(|line| line.to_string())
            .filter(|text| !text.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn name(&self) -> &str {
        "ocrs"
    }

    /// `ocrs` reports no per-word scores, so the confidence is left for the
    /// caller to estimate.
    #[instrument(skip_all, fields(width = image.width(), height = image.height(), ?hint))]
    fn recognize(&self, image: &DynamicImage, hint: RecognitionHint) -> Result<Recognition> {
        let input = self.prepare(image)?;
        let text = match hint {
            RecognitionHint::SingleBlock => self
                .engine
                .get_text(&input)
                .map_err(|err| QuittungError::Ocr(format!("OCR text recognition failed: {}", err)))?,
            RecognitionHint::SparseLines => self.recognize_lines(&input)?,
        };
        debug!(lines = text.lines().count(), chars = text.len(), "OCR complete");
        Ok(Recognition::new(text))
    }
}
