// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Quittung receipt pipeline.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Mode;

/// Unique identifier for a single pipeline invocation.
///
/// Every [`StageEvent`] carries the id of the run that produced it so that
/// interleaved logs from independent invocations can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single step of the rectification or enhancement pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Decoding the source buffer.
    Load,
    /// Edge map + quadrilateral search on the working copy.
    Detect,
    /// Four-point perspective warp (or pass-through).
    Rectify,
    Upscale,
    Grayscale,
    Denoise,
    Contrast,
    Morphology,
    Threshold,
    Polarity,
    Sharpen,
    /// Writing the output file.
    Encode,
    /// Text recognition by the external engine.
    Ocr,
}

impl Stage {
    /// Human-readable label used in progress output and error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Detect => "outline detection",
            Self::Rectify => "perspective rectification",
            Self::Upscale => "upscale",
            Self::Grayscale => "grayscale",
            Self::Denoise => "denoise",
            Self::Contrast => "local contrast",
            Self::Morphology => "morphology",
            Self::Threshold => "adaptive threshold",
            Self::Polarity => "polarity correction",
            Self::Sharpen => "sharpen",
            Self::Encode => "encode",
            Self::Ocr => "text recognition",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which pipeline a run executes. Determines the output file suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineKind {
    /// Outline detection + perspective correction only.
    Rectify,
    /// Filter pipeline only.
    Enhance(Mode),
    /// Rectification followed by the filter pipeline.
    RectifyThenEnhance(Mode),
}

impl PipelineKind {
    /// Suffix appended to the input file stem when writing the output.
    pub fn output_suffix(&self) -> &'static str {
        match self {
            Self::Rectify => "_preprocessed",
            Self::Enhance(mode) | Self::RectifyThenEnhance(mode) => mode.output_suffix(),
        }
    }

    pub fn rectifies(&self) -> bool {
        matches!(self, Self::Rectify | Self::RectifyThenEnhance(_))
    }

    /// Enhancement mode, if this kind runs the filter pipeline.
    pub fn enhancement_mode(&self) -> Option<Mode> {
        match self {
            Self::Rectify => None,
            Self::Enhance(mode) | Self::RectifyThenEnhance(mode) => Some(*mode),
        }
    }
}

/// Notification emitted after each pipeline stage completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub run_id: RunId,
    pub stage: Stage,
    /// Output buffer width after the stage.
    pub width: u32,
    /// Output buffer height after the stage.
    pub height: u32,
    /// Channel count of the output buffer.
    pub channels: u8,
    pub elapsed: Duration,
    /// Stage-specific detail, e.g. "outline not found; passing through".
    pub note: Option<String>,
}

impl StageEvent {
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

impl std::fmt::Display for StageEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<26} {}x{} ({} ch) in {:.1} ms",
            self.stage.label(),
            self.width,
            self.height,
            self.channels,
            self.elapsed.as_secs_f64() * 1000.0
        )?;
        if let Some(note) = &self.note {
            write!(f, " - {note}")?;
        }
        Ok(())
    }
}

/// Summary of a completed pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingReport {
    pub run_id: RunId,
    pub kind: PipelineKind,
    pub started_at: DateTime<Utc>,
    pub source_width: u32,
    pub source_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    /// `Some(found)` when rectification ran, `None` otherwise.
    pub outline_found: Option<bool>,
    pub stages: Vec<StageEvent>,
}

impl ProcessingReport {
    /// Total time spent across all recorded stages.
    pub fn total_elapsed(&self) -> Duration {
        self.stages.iter().map(|event| event.elapsed).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_suffix_per_kind() {
        assert_eq!(PipelineKind::Rectify.output_suffix(), "_preprocessed");
        assert_eq!(PipelineKind::Enhance(Mode::Standard).output_suffix(), "_enhanced");
        assert_eq!(PipelineKind::Enhance(Mode::Aggressive).output_suffix(), "_aggressive");
        assert_eq!(
            PipelineKind::RectifyThenEnhance(Mode::Aggressive).output_suffix(),
            "_aggressive"
        );
    }

    #[test]
    fn stage_event_display_includes_note() {
        let event = StageEvent {
            run_id: RunId::new(),
            stage: Stage::Rectify,
            width: 640,
            height: 480,
            channels: 3,
            elapsed: Duration::from_millis(12),
            note: None,
        }
        .with_note("outline not found; passing through");

        let line = event.to_string();
        assert!(line.starts_with("perspective rectification"));
        assert!(line.contains("640x480 (3 ch)"));
        assert!(line.ends_with("outline not found; passing through"));
    }
}
