// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// quittung-document: image processing for the Quittung receipt pipeline.
//
// Finds the receipt outline in a photo and straightens it with a four-point
// perspective warp, runs the OCR enhancement filters (denoise, local contrast,
// morphology, adaptive threshold), and hands the result to a text recognizer.

pub mod buffer;
pub mod pipeline;
pub mod progress;
pub mod scan;

// Re-export the primary types so callers can use `quittung_document::ReceiptProcessor` etc.
pub use pipeline::{ProcessingOutcome, ReceiptProcessor};
pub use progress::{NoopSink, ProgressSink, TracingSink};
pub use scan::detect::QuadDetector;
pub use scan::enhance::ReceiptEnhancer;
pub use scan::recognize::{Recognition, RecognitionHint, RecognizedText, StaticRecognizer, TextRecognizer};

#[cfg(feature = "ocr")]
pub use scan::ocr::{OcrConfig, OcrsRecognizer};
