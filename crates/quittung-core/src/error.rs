// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Quittung.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Stage;

/// Top-level error type for all Quittung operations.
///
/// A missing document outline is deliberately absent: detection reports
/// `None` and the rectifier falls back to a pass-through.
#[derive(Debug, Error)]
pub enum QuittungError {
    // -- Input errors --
    #[error("input image not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("failed to decode image: {0}")]
    Decode(String),

    // -- Processing errors --
    #[error("{stage} stage failed: {message}")]
    Processing { stage: Stage, message: String },

    #[error("invalid pipeline configuration: {0}")]
    Config(String),

    #[error("failed to encode output image: {0}")]
    Encode(String),

    // -- External collaborators --
    #[error("OCR failed: {0}")]
    Ocr(String),

    // -- Storage / serialization --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QuittungError {
    /// Shorthand for a [`QuittungError::Processing`] failure in `stage`.
    pub fn processing(stage: Stage, message: impl Into<String>) -> Self {
        Self::Processing {
            stage,
            message: message.into(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QuittungError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_error_names_the_stage() {
        let err = QuittungError::processing(Stage::Threshold, "expected a grayscale buffer");
        assert_eq!(
            err.to_string(),
            "adaptive threshold stage failed: expected a grayscale buffer"
        );
    }

    #[test]
    fn input_not_found_shows_path() {
        let err = QuittungError::InputNotFound(PathBuf::from("/tmp/missing.jpg"));
        assert!(err.to_string().contains("/tmp/missing.jpg"));
    }
}
