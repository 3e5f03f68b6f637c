// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the command line.
//
// Every technical error is mapped to plain English with a clear suggestion and
// the process exit code the CLI should use.

use crate::error::QuittungError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Disk hiccup or a busy engine; running the command again may work.
    Transient,
    /// User must do something (fix the path, download models).
    ActionRequired,
    /// Retrying the same input will fail the same way.
    Permanent,
    /// The pipeline reached a state it should not; worth a bug report.
    Internal,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (first line of output).
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    /// Whether the caller may reasonably retry. The pipeline never retries itself.
    pub retriable: bool,
    pub severity: Severity,
    /// Process exit code for the CLI.
    pub exit_code: u8,
}

/// Exit codes used by the `quittung` binary.
pub mod exit_codes {
    pub const GENERAL: u8 = 1;
    pub const INPUT_NOT_FOUND: u8 = 2;
    pub const DECODE: u8 = 3;
    pub const PROCESSING: u8 = 4;
    pub const OCR: u8 = 5;
}

/// Convert a `QuittungError` into a `HumanError`.
pub fn humanize_error(err: &QuittungError) -> HumanError {
    match err {
        QuittungError::InputNotFound(path) => HumanError {
            message: format!("The image {} does not exist.", path.display()),
            suggestion: "Check the path and file name, then run the command again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
            exit_code: exit_codes::INPUT_NOT_FOUND,
        },

        QuittungError::Decode(detail) => HumanError {
            message: "The file could not be read as an image.".into(),
            suggestion: format!(
                "Make sure it is a JPEG, PNG, WebP, TIFF or BMP photo and is not truncated. ({detail})"
            ),
            retriable: false,
            severity: Severity::Permanent,
            exit_code: exit_codes::DECODE,
        },

        QuittungError::Processing { stage, message } => HumanError {
            message: format!("Processing stopped during the {stage} step."),
            suggestion: format!("This is unexpected; please report it with the image attached. ({message})"),
            retriable: false,
            severity: Severity::Internal,
            exit_code: exit_codes::PROCESSING,
        },

        QuittungError::Config(detail) => HumanError {
            message: "The pipeline configuration is invalid.".into(),
            suggestion: format!("Use one of the built-in modes (standard, aggressive). ({detail})"),
            retriable: false,
            severity: Severity::Internal,
            exit_code: exit_codes::PROCESSING,
        },

        QuittungError::Encode(detail) => HumanError {
            message: "The processed image could not be saved.".into(),
            suggestion: format!("Use a .jpg or .png input so the output can be written in the same format. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
            exit_code: exit_codes::PROCESSING,
        },

        QuittungError::Ocr(detail) => humanize_ocr_error(detail),

        QuittungError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                HumanError {
                    message: "Permission denied while reading or writing a file.".into(),
                    suggestion: "Make sure you can write to the folder that contains the image.".into(),
                    retriable: false,
                    severity: Severity::ActionRequired,
                    exit_code: exit_codes::GENERAL,
                }
            } else {
                HumanError {
                    message: "There was a problem reading or writing a file.".into(),
                    suggestion: "Try again. If this keeps happening, the disk may be full.".into(),
                    retriable: true,
                    severity: Severity::Transient,
                    exit_code: exit_codes::GENERAL,
                }
            }
        }

        QuittungError::Serialization(_) => HumanError {
            message: "An internal data problem occurred.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            retriable: true,
            severity: Severity::Transient,
            exit_code: exit_codes::GENERAL,
        },
    }
}

fn humanize_ocr_error(detail: &str) -> HumanError {
    let lower = detail.to_ascii_lowercase();

    if lower.contains("model not found") {
        HumanError {
            message: "The text recognition models are missing.".into(),
            suggestion: format!(
                "Download them once with `ocrs-cli`, pass --models DIR, or use --skip-ocr. ({detail})"
            ),
            retriable: false,
            severity: Severity::ActionRequired,
            exit_code: exit_codes::OCR,
        }
    } else if lower.contains("not compiled") {
        HumanError {
            message: "This build has no text recognition engine.".into(),
            suggestion: "Rebuild with the `ocr` feature enabled, or run with --skip-ocr.".into(),
            retriable: false,
            severity: Severity::Permanent,
            exit_code: exit_codes::OCR,
        }
    } else {
        HumanError {
            message: "Text recognition failed.".into(),
            suggestion: format!("The processed image was still saved. Try the aggressive mode. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
            exit_code: exit_codes::OCR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Stage;
    use std::path::PathBuf;

    #[test]
    fn missing_input_is_action_required() {
        let human = humanize_error(&QuittungError::InputNotFound(PathBuf::from("r.jpg")));
        assert_eq!(human.severity, Severity::ActionRequired);
        assert_eq!(human.exit_code, exit_codes::INPUT_NOT_FOUND);
        assert!(human.message.contains("r.jpg"));
    }

    #[test]
    fn decode_failure_is_permanent() {
        let human = humanize_error(&QuittungError::Decode("unexpected EOF".into()));
        assert_eq!(human.severity, Severity::Permanent);
        assert_eq!(human.exit_code, exit_codes::DECODE);
        assert!(!human.retriable);
    }

    #[test]
    fn processing_failure_mentions_stage() {
        let err = QuittungError::processing(Stage::Contrast, "empty buffer");
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Internal);
        assert!(human.message.contains("local contrast"));
    }

    #[test]
    fn missing_models_are_action_required() {
        let err = QuittungError::Ocr("detection model not found at /x/text-detection.rten".into());
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::ActionRequired);
        assert_eq!(human.exit_code, exit_codes::OCR);
    }
}
