// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quittung: core types, configuration, and error definitions shared across
// all crates.

pub mod config;
pub mod error;
pub mod human_errors;
pub mod types;

pub use config::{DetectorConfig, Mode, PipelineConfig};
pub use error::{QuittungError, Result};
pub use types::*;
