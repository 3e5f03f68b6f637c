// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning pipeline: outline detection, perspective rectification, OCR-oriented
// enhancement, and text recognition.

pub mod detect;
pub mod enhance;
pub mod filters;
pub mod geometry;
pub mod recognize;
pub mod rectify;

#[cfg(feature = "ocr")]
pub mod ocr;

pub use detect::{Detection, QuadDetector};
pub use enhance::ReceiptEnhancer;
pub use geometry::{OrderedCorners, Point2D, Quadrilateral, ScaleRatio};
pub use recognize::{Recognition, RecognitionHint, RecognizedText, StaticRecognizer, TextRecognizer};
pub use rectify::{Rectification, rectify};

#[cfg(feature = "ocr")]
pub use ocr::{OcrConfig, OcrsRecognizer};
