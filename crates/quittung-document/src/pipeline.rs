// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Receipt processing orchestration: load, rectify and/or enhance, write the
// output next to the input, then hand the result to a text recognizer.

use std::path::{Path, PathBuf};

use chrono::Utc;
use image::DynamicImage;
use quittung_core::{DetectorConfig, PipelineKind, ProcessingReport, Result, RunId, Stage};
use tracing::{info, instrument};

use crate::buffer;
use crate::progress::{ProgressSink, Recorder, StageTimer};
use crate::scan::detect::QuadDetector;
use crate::scan::enhance::ReceiptEnhancer;
use crate::scan::recognize::{RecognitionHint, RecognizedText, TextRecognizer, recognize_cleaned};
use crate::scan::rectify::rectify;

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    /// Final image: rectified colour, or enhanced single-channel.
    pub image: DynamicImage,
    /// Where the image was written; `None` for in-memory runs.
    pub output_path: Option<PathBuf>,
    /// Cleaned text, when a recognizer was supplied.
    pub text: Option<String>,
    /// Recognition confidence in `0.0..=1.0`, alongside `text`.
    pub confidence: Option<f32>,
    pub report: ProcessingReport,
}

/// Per-invocation state. Never shared between runs.
struct Run<'a> {
    run_id: RunId,
    started_at: chrono::DateTime<Utc>,
    recorder: Recorder<'a>,
    outline_found: Option<bool>,
    source_dims: (u32, u32),
}

impl<'a> Run<'a> {
    fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self {
            run_id: RunId::new(),
            started_at: Utc::now(),
            recorder: Recorder::new(sink),
            outline_found: None,
            source_dims: (0, 0),
        }
    }

    fn emit(&mut self, timer: StageTimer, dims: (u32, u32), channels: u8, note: Option<String>) {
        let mut event = timer.finish(self.run_id, dims.0, dims.1, channels);
        event.note = note;
        self.recorder.on_stage(&event);
    }

    fn emit_image(&mut self, timer: StageTimer, image: &DynamicImage, note: Option<String>) {
        let dims = (image.width(), image.height());
        self.emit(timer, dims, buffer::channel_count(image), note);
    }

    fn finish(
        self,
        kind: PipelineKind,
        image: DynamicImage,
        output_path: Option<PathBuf>,
        recognized: Option<RecognizedText>,
    ) -> ProcessingOutcome {
        let report = ProcessingReport {
            run_id: self.run_id,
            kind,
            started_at: self.started_at,
            source_width: self.source_dims.0,
            source_height: self.source_dims.1,
            output_width: image.width(),
            output_height: image.height(),
            outline_found: self.outline_found,
            stages: self.recorder.into_events(),
        };
        info!(
            run_id = %report.run_id,
            stages = report.stages.len(),
            total_ms = report.total_elapsed().as_secs_f64() * 1000.0,
            "Receipt processed"
        );
        let (text, confidence) = match recognized {
            Some(r) => (Some(r.text), Some(r.confidence)),
            None => (None, None),
        };
        ProcessingOutcome {
            image,
            output_path,
            text,
            confidence,
            report,
        }
    }
}

/// Runs the rectification and enhancement pipelines over receipt photos.
///
/// Holds only immutable settings, so one processor can serve many threads;
/// every call gets its own buffers and report.
#[derive(Debug, Clone, Default)]
pub struct ReceiptProcessor {
    detector: QuadDetector,
    hint: RecognitionHint,
}

impl ReceiptProcessor {
    pub fn new(detector_config: DetectorConfig) -> Result<Self> {
        Ok(Self {
            detector: QuadDetector::new(detector_config)?,
            hint: RecognitionHint::default(),
        })
    }

    /// Layout assumption passed to the recognizer.
    pub fn with_hint(mut self, hint: RecognitionHint) -> Self {
        self.hint = hint;
        self
    }

    pub fn detector(&self) -> &QuadDetector {
        &self.detector
    }

    pub fn hint(&self) -> RecognitionHint {
        self.hint
    }

    /// Process the image at `path` and write `<stem><suffix>.<ext>` beside it.
    ///
    /// A missing file fails before anything else happens. The output is
    /// written before text recognition runs, so an OCR failure still leaves
    /// the processed image on disk.
    #[instrument(skip_all, fields(path = %path.display(), ?kind))]
    pub fn process_file(
        &self,
        path: &Path,
        kind: PipelineKind,
        recognizer: Option<&dyn TextRecognizer>,
        sink: &mut dyn ProgressSink,
    ) -> Result<ProcessingOutcome> {
        let mut run = Run::new(sink);

        let timer = StageTimer::start(Stage::Load);
        let source = buffer::open(path)?;
        run.emit_image(timer, &source, None);

        let output = self.transform(&mut run, source, kind)?;

        let output_path = buffer::output_path_for(path, kind.output_suffix());
        let timer = StageTimer::start(Stage::Encode);
        buffer::save(&output, &output_path)?;
        run.emit_image(timer, &output, Some(output_path.display().to_string()));

        let recognized = recognize(&mut run, &output, recognizer, self.hint)?;
        Ok(run.finish(kind, output, Some(output_path), recognized))
    }

    /// Process an encoded image held in memory. Nothing is written to disk.
    #[instrument(skip_all, fields(data_len = data.len(), ?kind))]
    pub fn process_bytes(
        &self,
        data: &[u8],
        kind: PipelineKind,
        recognizer: Option<&dyn TextRecognizer>,
        sink: &mut dyn ProgressSink,
    ) -> Result<ProcessingOutcome> {
        let mut run = Run::new(sink);

        let timer = StageTimer::start(Stage::Load);
        let source = buffer::decode(data)?;
        run.emit_image(timer, &source, None);

        let output = self.transform(&mut run, source, kind)?;
        let recognized = recognize(&mut run, &output, recognizer, self.hint)?;
        Ok(run.finish(kind, output, None, recognized))
    }

    /// Rectify and/or enhance an already decoded image.
    pub fn process_image(
        &self,
        image: DynamicImage,
        kind: PipelineKind,
        sink: &mut dyn ProgressSink,
    ) -> Result<ProcessingOutcome> {
        let mut run = Run::new(sink);
        let output = self.transform(&mut run, image, kind)?;
        Ok(run.finish(kind, output, None, None))
    }

    fn transform(&self, run: &mut Run<'_>, source: DynamicImage, kind: PipelineKind) -> Result<DynamicImage> {
        run.source_dims = (source.width(), source.height());
        let mut image = source;

        if kind.rectifies() {
            let timer = StageTimer::start(Stage::Detect);
            let detection = self.detector.detect(&image);
            let note = match detection.coverage() {
                Some(share) => format!("four-corner outline covering {:.0}% of the frame", share * 100.0),
                None => format!("no outline among {} boundaries", detection.candidates),
            };
            run.emit(
                timer,
                (detection.working_width, detection.working_height),
                1,
                Some(note),
            );

            let timer = StageTimer::start(Stage::Rectify);
            let rectified = rectify(image, detection.ratio, detection.quadrilateral.as_ref());
            run.outline_found = Some(rectified.outline_found);
            let note = (!rectified.outline_found).then(|| "passed through unchanged".to_string());
            run.emit_image(timer, &rectified.image, note);
            image = rectified.image;
        }

        if let Some(mode) = kind.enhancement_mode() {
            let gray = ReceiptEnhancer::for_mode(image, mode).enhance(run.run_id, &mut run.recorder)?;
            image = DynamicImage::ImageLuma8(gray);
        }

        Ok(image)
    }
}

fn recognize(
    run: &mut Run<'_>,
    image: &DynamicImage,
    recognizer: Option<&dyn TextRecognizer>,
    hint: RecognitionHint,
) -> Result<Option<RecognizedText>> {
    let Some(recognizer) = recognizer else {
        return Ok(None);
    };
    let timer = StageTimer::start(Stage::Ocr);
    let recognized = recognize_cleaned(recognizer, image, hint)?;
    let note = format!(
        "{} via {}, confidence {:.2}{}",
        pluralize_lines(recognized.text.lines().count()),
        recognizer.name(),
        recognized.confidence,
        if recognized.estimated { " (estimated)" } else { "" }
    );
    run.emit_image(timer, image, Some(note));
    Ok(Some(recognized))
}

fn pluralize_lines(count: usize) -> String {
    if count == 1 {
        "1 line".to_string()
    } else {
        format!("{count} lines")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopSink;
    use crate::scan::detect::tests::{rotated_rect_corners, white_polygon_on_black};
    use crate::scan::recognize::{Recognition, StaticRecognizer};
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use quittung_core::{Mode, QuittungError, StageEvent};

    fn receipt_photo() -> DynamicImage {
        let corners = rotated_rect_corners(500.0, 375.0, 600.0, 400.0, 8.0);
        DynamicImage::ImageRgb8(white_polygon_on_black(1000, 750, &corners))
    }

    #[test]
    fn missing_file_fails_before_any_stage() {
        let dir = tempfile::tempdir().unwrap();
        let mut events = 0;
        let mut sink = |_: &StageEvent| events += 1;
        let result = ReceiptProcessor::default().process_file(
            &dir.path().join("absent.jpg"),
            PipelineKind::Rectify,
            None,
            &mut sink,
        );
        assert!(matches!(result, Err(QuittungError::InputNotFound(_))));
        assert_eq!(events, 0);
    }

    #[test]
    fn corrupt_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"\xFF\xD8 truncated").unwrap();
        let result = ReceiptProcessor::default().process_file(
            &path,
            PipelineKind::Enhance(Mode::Standard),
            None,
            &mut NoopSink,
        );
        assert!(matches!(result, Err(QuittungError::Decode(_))));
    }

    #[test]
    fn empty_bytes_are_rejected() {
        let result = ReceiptProcessor::default().process_bytes(
            &[],
            PipelineKind::Rectify,
            Some(&StaticRecognizer::new("unused")),
            &mut NoopSink,
        );
        assert!(matches!(result, Err(QuittungError::Decode(_))));
    }

    #[test]
    fn rectify_writes_preprocessed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        receipt_photo().save(&path).unwrap();

        let outcome = ReceiptProcessor::default()
            .process_file(&path, PipelineKind::Rectify, None, &mut NoopSink)
            .unwrap();

        let written = outcome.output_path.clone().unwrap();
        assert_eq!(written, dir.path().join("receipt_preprocessed.png"));
        assert!(written.is_file());
        assert_eq!(outcome.report.outline_found, Some(true));
        assert_eq!((outcome.report.source_width, outcome.report.source_height), (1000, 750));
        assert!((590..=625).contains(&outcome.report.output_width));
        assert!((390..=425).contains(&outcome.report.output_height));
        assert!(outcome.text.is_none());
        assert!(outcome.confidence.is_none());

        let detect_note = outcome.report.stages[1].note.as_deref().unwrap();
        assert!(detect_note.starts_with("four-corner outline covering"), "{detect_note}");
        assert!(detect_note.ends_with("% of the frame"), "{detect_note}");

        let stages: Vec<Stage> = outcome.report.stages.iter().map(|e| e.stage).collect();
        assert_eq!(stages, vec![Stage::Load, Stage::Detect, Stage::Rectify, Stage::Encode]);
    }

    #[test]
    fn enhance_writes_suffixed_jpeg_and_returns_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kassenbon.jpg");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(120, 90, Rgb([210, 205, 200])))
            .save(&path)
            .unwrap();

        let recognizer = StaticRecognizer::new("  BAECKEREI  \n#\nBROT 3,20\n");
        let outcome = ReceiptProcessor::default()
            .process_file(
                &path,
                PipelineKind::Enhance(Mode::Aggressive),
                Some(&recognizer),
                &mut NoopSink,
            )
            .unwrap();

        let written = outcome.output_path.unwrap();
        assert_eq!(written, dir.path().join("kassenbon_aggressive.jpg"));
        let back = buffer::open(&written).unwrap();
        assert_eq!(buffer::channel_count(&back), 1);
        assert_eq!((back.width(), back.height()), (480, 360));
        assert_eq!(outcome.text.as_deref(), Some("BAECKEREI\nBROT 3,20"));
        assert_eq!(outcome.report.outline_found, None);

        let last = outcome.report.stages.last().unwrap();
        assert_eq!(last.stage, Stage::Ocr);
        assert_eq!(
            last.note.as_deref(),
            Some("2 lines via static, confidence 0.58 (estimated)")
        );
        assert_eq!(outcome.confidence, Some(0.58));
    }

    struct LayoutEcho;

    impl TextRecognizer for LayoutEcho {
        fn name(&self) -> &str {
            "echo"
        }

        fn recognize(&self, _image: &DynamicImage, hint: RecognitionHint) -> Result<Recognition> {
            Ok(Recognition::new(format!("{hint:?}")).with_confidence(0.9))
        }
    }

    #[test]
    fn processor_forwards_its_layout_hint() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([200])));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let processor = ReceiptProcessor::default();
        assert_eq!(processor.hint(), RecognitionHint::SingleBlock);
        let outcome = processor
            .with_hint(RecognitionHint::SparseLines)
            .process_bytes(&bytes, PipelineKind::Rectify, Some(&LayoutEcho), &mut NoopSink)
            .unwrap();
        assert_eq!(outcome.text.as_deref(), Some("SparseLines"));
        assert_eq!(outcome.confidence, Some(0.9));
        let last = outcome.report.stages.last().unwrap();
        assert_eq!(last.note.as_deref(), Some("1 line via echo, confidence 0.90"));
    }

    #[test]
    fn custom_detector_settings_are_validated() {
        let bad = DetectorConfig {
            blur_kernel: 4,
            ..DetectorConfig::default()
        };
        assert!(ReceiptProcessor::new(bad).is_err());
        let processor = ReceiptProcessor::new(DetectorConfig::default()).unwrap();
        assert_eq!(processor.detector().config(), &DetectorConfig::default());
    }

    #[test]
    fn chained_pipeline_passes_blank_images_through_to_enhancement() {
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(500, 500, Luma([0])));
        let mut bytes = Vec::new();
        blank
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let outcome = ReceiptProcessor::default()
            .process_bytes(
                &bytes,
                PipelineKind::RectifyThenEnhance(Mode::Standard),
                None,
                &mut NoopSink,
            )
            .unwrap();

        assert_eq!(outcome.report.outline_found, Some(false));
        assert!(outcome.output_path.is_none());
        assert!(matches!(outcome.image, DynamicImage::ImageLuma8(_)));
        // 500 px is below the standard target, so the pass-through is upscaled.
        assert_eq!((outcome.image.width(), outcome.image.height()), (1200, 1200));

        let stages: Vec<Stage> = outcome.report.stages.iter().map(|e| e.stage).collect();
        assert_eq!(&stages[..4], &[Stage::Load, Stage::Detect, Stage::Rectify, Stage::Upscale]);
        assert_eq!(stages.len(), 11);
        let rectify_event = &outcome.report.stages[2];
        assert_eq!(rectify_event.note.as_deref(), Some("passed through unchanged"));
        assert_eq!((rectify_event.width, rectify_event.height), (500, 500));
    }

    #[test]
    fn events_share_the_report_run_id() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 40, Luma([200])));
        let mut seen = Vec::new();
        let mut sink = |e: &StageEvent| seen.push(e.run_id);
        let outcome = ReceiptProcessor::default()
            .process_image(img, PipelineKind::Enhance(Mode::Standard), &mut sink)
            .unwrap();
        assert_eq!(seen.len(), 8);
        assert!(seen.iter().all(|id| *id == outcome.report.run_id));
    }
}
