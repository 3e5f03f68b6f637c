// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image buffer module: decoding, encoding, and output naming.

pub mod io;

pub use io::{channel_count, decode, encode, open, output_path_for, save};
