// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// quittung: straighten and clean up a receipt photo, then print its text.
//
// Progress and logs go to stderr; stdout carries only the recognised text so
// the output can be piped.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use quittung_core::human_errors::{exit_codes, humanize_error};
use quittung_core::{DetectorConfig, Mode, PipelineConfig, PipelineKind, QuittungError, StageEvent};
use quittung_document::{ReceiptProcessor, RecognitionHint, TextRecognizer};

#[derive(Parser, Debug)]
#[command(name = "quittung", version)]
#[command(about = "Straighten and clean up receipt photos for text recognition")]
struct Cli {
    /// Receipt photo (JPEG, PNG, WebP, TIFF, BMP)
    #[arg(value_name = "IMAGE", required_unless_present = "print_config")]
    image: Option<PathBuf>,

    /// Run the enhancement filters instead of perspective rectification.
    /// A bare --mode means standard; put IMAGE before it, or write
    /// --mode=aggressive, so the file name is not taken as the mode
    #[arg(
        long,
        value_enum,
        value_name = "MODE",
        num_args = 0..=1,
        default_missing_value = "standard"
    )]
    mode: Option<ModeArg>,

    /// With --mode, straighten the receipt before enhancing it
    #[arg(long, requires = "mode")]
    rectify: bool,

    /// Skip text recognition; only write the processed image
    #[arg(long)]
    skip_ocr: bool,

    /// Text layout: one block, or separate lines with empty ones dropped
    #[arg(long, value_enum, default_value = "block")]
    layout: LayoutArg,

    /// Directory containing text-detection.rten and text-recognition.rten
    #[arg(long, value_name = "DIR")]
    models: Option<PathBuf>,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Standard,
    Aggressive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LayoutArg {
    Block,
    Lines,
}

impl From<LayoutArg> for RecognitionHint {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Block => RecognitionHint::SingleBlock,
            LayoutArg::Lines => RecognitionHint::SparseLines,
        }
    }
}

impl From<ModeArg> for Mode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Standard => Mode::Standard,
            ModeArg::Aggressive => Mode::Aggressive,
        }
    }
}

impl Cli {
    fn pipeline_kind(&self) -> PipelineKind {
        match (self.mode.map(Mode::from), self.rectify) {
            (None, _) => PipelineKind::Rectify,
            (Some(mode), false) => PipelineKind::Enhance(mode),
            (Some(mode), true) => PipelineKind::RectifyThenEnhance(mode),
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn print_config(processor: &ReceiptProcessor, kind: PipelineKind) -> anyhow::Result<()> {
    let config = serde_json::json!({
        "kind": kind,
        "detector": processor.detector().config(),
        "layout": processor.hint(),
        "pipeline": kind.enhancement_mode().map(PipelineConfig::for_mode),
    });
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(feature = "ocr")]
fn build_recognizer(cli: &Cli) -> anyhow::Result<Option<Box<dyn TextRecognizer>>> {
    use quittung_document::{OcrConfig, OcrsRecognizer};

    if cli.skip_ocr {
        return Ok(None);
    }
    let config = match &cli.models {
        Some(dir) => OcrConfig::from_dir(dir),
        None => OcrConfig::default(),
    };
    Ok(Some(Box::new(OcrsRecognizer::new(&config)?)))
}

#[cfg(not(feature = "ocr"))]
fn build_recognizer(cli: &Cli) -> anyhow::Result<Option<Box<dyn TextRecognizer>>> {
    if cli.skip_ocr {
        return Ok(None);
    }
    Err(QuittungError::Ocr(format!(
        "text recognition was not compiled into this build (models: {})",
        cli.models
            .as_ref()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|| "default".into())
    ))
    .into())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let kind = cli.pipeline_kind();
    let processor = ReceiptProcessor::new(DetectorConfig::default())?.with_hint(cli.layout.into());
    if cli.print_config {
        return print_config(&processor, kind);
    }
    let Some(image) = cli.image.as_deref() else {
        anyhow::bail!("no input image given");
    };
    if !image.is_file() {
        return Err(QuittungError::InputNotFound(image.to_path_buf()).into());
    }

    // Fail on missing models before spending time on the image.
    let recognizer = build_recognizer(cli)?;

    let mut progress = |event: &StageEvent| eprintln!("  {event}");
    let outcome = processor.process_file(image, kind, recognizer.as_deref(), &mut progress)?;

    if let Some(path) = &outcome.output_path {
        eprintln!("Saved {}", path.display());
    }
    if outcome.report.outline_found == Some(false) {
        eprintln!("No receipt outline found; the photo was not straightened.");
    }
    if let Some(confidence) = outcome.confidence {
        eprintln!("Recognition confidence {confidence:.2}");
    }
    if let Some(text) = &outcome.text {
        println!("{text}");
    }
    Ok(())
}

/// Print a plain-English explanation of `err` and pick the exit code.
fn report_failure(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<QuittungError>() {
        Some(quittung_err) => {
            let human = humanize_error(quittung_err);
            eprintln!("Error: {}", human.message);
            eprintln!("  {}", human.suggestion);
            human.exit_code
        }
        None => {
            eprintln!("Error: {err:#}");
            exit_codes::GENERAL
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(?cli, "Arguments parsed");

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => ExitCode::from(report_failure(&err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("quittung").chain(args.iter().copied()))
    }

    #[test]
    fn no_mode_means_rectify_only() {
        let cli = parse(&["receipt.jpg"]).unwrap();
        assert_eq!(cli.pipeline_kind(), PipelineKind::Rectify);
        assert_eq!(cli.pipeline_kind().output_suffix(), "_preprocessed");
    }

    #[test]
    fn bare_mode_flag_selects_standard() {
        let cli = parse(&["receipt.jpg", "--mode"]).unwrap();
        assert_eq!(cli.pipeline_kind(), PipelineKind::Enhance(Mode::Standard));
    }

    #[test]
    fn aggressive_mode_with_rectify_chains() {
        let cli = parse(&["--mode", "aggressive", "--rectify", "receipt.jpg"]).unwrap();
        assert_eq!(
            cli.pipeline_kind(),
            PipelineKind::RectifyThenEnhance(Mode::Aggressive)
        );
    }

    #[test]
    fn rectify_flag_requires_mode() {
        assert!(parse(&["receipt.jpg", "--rectify"]).is_err());
    }

    #[test]
    fn image_is_required_unless_printing_config() {
        assert!(parse(&[]).is_err());
        let cli = parse(&["--print-config", "--mode", "aggressive"]).unwrap();
        assert!(cli.image.is_none());
        assert!(cli.print_config);
    }

    #[test]
    fn mode_value_needs_equals_before_the_image() {
        let cli = parse(&["--mode=aggressive", "receipt.jpg"]).unwrap();
        assert_eq!(cli.pipeline_kind(), PipelineKind::Enhance(Mode::Aggressive));
        // Without `=`, the file name is read as the mode and rejected.
        assert!(parse(&["--mode", "receipt.jpg"]).is_err());
    }

    #[test]
    fn layout_selects_the_recognition_hint() {
        let cli = parse(&["receipt.jpg"]).unwrap();
        assert_eq!(RecognitionHint::from(cli.layout), RecognitionHint::SingleBlock);
        let cli = parse(&["receipt.jpg", "--layout", "lines"]).unwrap();
        assert_eq!(RecognitionHint::from(cli.layout), RecognitionHint::SparseLines);
        assert!(parse(&["receipt.jpg", "--layout", "columns"]).is_err());
    }

    #[test]
    fn missing_input_is_reported_before_models_are_loaded() {
        let cli = parse(&["/nonexistent/receipt.jpg", "--models", "/nonexistent/models"]).unwrap();
        let err = run(&cli).unwrap_err();
        assert_eq!(report_failure(&err), exit_codes::INPUT_NOT_FOUND);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(parse(&["receipt.jpg", "--mode", "extreme"]).is_err());
    }

    #[test]
    fn quittung_errors_map_to_their_exit_codes() {
        let missing = anyhow::Error::from(QuittungError::InputNotFound("x.jpg".into()));
        assert_eq!(report_failure(&missing), exit_codes::INPUT_NOT_FOUND);

        let ocr = anyhow::Error::from(QuittungError::Ocr("recognition model not found at /m".into()));
        assert_eq!(report_failure(&ocr), exit_codes::OCR);

        let other = anyhow::anyhow!("something else");
        assert_eq!(report_failure(&other), exit_codes::GENERAL);
    }
}
