// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text recognition seam. The pipeline only talks to `TextRecognizer`; the
// concrete engine is chosen by the caller.

use image::DynamicImage;
use quittung_core::Result;
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// Cleaned text shorter than this (in characters) is logged as suspicious.
pub const MIN_USEFUL_TEXT_CHARS: usize = 10;

/// Confidence below this is logged as suspicious.
pub const MIN_CONFIDENCE: f32 = 0.3;

/// Ceiling for scores estimated from the text alone.
pub const MAX_ESTIMATED_CONFIDENCE: f32 = 0.95;

/// Layout assumption passed to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionHint {
    /// The page is one uniform block of text.
    #[default]
    SingleBlock,
    /// Detect lines individually and drop empty ones.
    SparseLines,
}

/// Raw engine output for one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recognition {
    /// Lines separated by `\n`.
    pub text: String,
    /// Mean per-word score in `0.0..=1.0`, for engines that report one.
    pub confidence: Option<f32>,
}

impl Recognition {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Cleaned text together with its confidence score.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    /// In `0.0..=1.0`, rounded to two decimals.
    pub confidence: f32,
    /// `true` when the engine gave no score and it was estimated from the text.
    pub estimated: bool,
}

/// An OCR engine.
pub trait TextRecognizer {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    fn recognize(&self, image: &DynamicImage, hint: RecognitionHint) -> Result<Recognition>;
}

/// Trim every line and keep those with at least two characters and at least
/// one letter or digit.
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| line.chars().count() >= 2)
        .filter(|line| line.chars().any(char::is_alphanumeric))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Score raw recognised text by its shape when the engine reports no
/// confidence of its own.
///
/// Starts at 0.3 and adds up to 0.3 for the share of letters and digits, up
/// to 0.2 for length, and 0.1 when the letters and digits per
/// whitespace-separated word fall between 3 and 10. Text shorter than five
/// characters scores 0.1.
pub fn estimate_confidence(text: &str) -> f32 {
    let total_chars = text.chars().count();
    if total_chars < 5 {
        return 0.1;
    }
    let alnum_count = text.chars().filter(|c| c.is_alphanumeric()).count();
    let mut confidence = 0.3 + alnum_count as f32 / total_chars as f32 * 0.3;

    confidence += match total_chars {
        n if n > 200 => 0.2,
        n if n > 100 => 0.15,
        n if n > 50 => 0.1,
        _ => 0.0,
    };

    let word_count = text.split_whitespace().count();
    if word_count > 0 {
        let avg_word_length = alnum_count as f32 / word_count as f32;
        if (3.0..=10.0).contains(&avg_word_length) {
            confidence += 0.1;
        }
    }

    confidence.min(MAX_ESTIMATED_CONFIDENCE)
}

fn round_to_hundredths(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

/// Run `recognizer`, clean its output and attach a confidence score.
///
/// The engine's own score is used when it has one; otherwise the score is
/// estimated from the raw text. Engine errors are returned unchanged. Very
/// short or low-confidence results are not an error, only a warning.
#[instrument(skip_all, fields(engine = recognizer.name(), ?hint))]
pub fn recognize_cleaned(
    recognizer: &dyn TextRecognizer,
    image: &DynamicImage,
    hint: RecognitionHint,
) -> Result<RecognizedText> {
    let raw = recognizer.recognize(image, hint)?;
    let cleaned = clean_text(&raw.text);
    let chars = cleaned.chars().count();

    let (confidence, estimated) = match raw.confidence {
        Some(score) => (score.clamp(0.0, 1.0), false),
        None => (estimate_confidence(&raw.text), true),
    };
    let confidence = round_to_hundredths(confidence);
    debug!(
        raw_len = raw.text.len(),
        chars,
        lines = cleaned.lines().count(),
        confidence,
        estimated,
        "Text cleaned"
    );

    if chars < MIN_USEFUL_TEXT_CHARS {
        warn!(chars, "Very little text recognised; the image may need the aggressive mode");
    } else if confidence < MIN_CONFIDENCE {
        warn!(confidence, "Low recognition confidence");
    }
    Ok(RecognizedText {
        text: cleaned,
        confidence,
        estimated,
    })
}

/// Returns the same text for every image. Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRecognizer {
    output: Recognition,
}

impl StaticRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            output: Recognition::new(text),
        }
    }

    /// Report `confidence` as the engine score.
    pub fn with_confidence(self, confidence: f32) -> Self {
        Self {
            output: self.output.with_confidence(confidence),
        }
    }
}

impl TextRecognizer for StaticRecognizer {
    fn name(&self) -> &str {
        "static"
    }

    fn recognize(&self, _image: &DynamicImage, _hint: RecognitionHint) -> Result<Recognition> {
        Ok(self.output.clone())
    }
}
