// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stage progress reporting.
//
// Pipelines never print. They hand a `StageEvent` to whatever sink the caller
// injected after every stage completes.

use std::time::Instant;

use quittung_core::{RunId, Stage, StageEvent};
use tracing::info;

/// Receives one event per completed pipeline stage.
pub trait ProgressSink {
    fn on_stage(&mut self, event: &StageEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(&StageEvent),
{
    fn on_stage(&mut self, event: &StageEvent) {
        self(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn on_stage(&mut self, _event: &StageEvent) {}
}

/// Forwards events to `tracing` at info level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn on_stage(&mut self, event: &StageEvent) {
        info!(
            run_id = %event.run_id,
            stage = %event.stage,
            width = event.width,
            height = event.height,
            channels = event.channels,
            elapsed_ms = event.elapsed.as_secs_f64() * 1000.0,
            note = event.note.as_deref().unwrap_or(""),
            "Stage complete"
        );
    }
}

/// Keeps a copy of every event and forwards it to an inner sink.
pub(crate) struct Recorder<'a> {
    inner: &'a mut dyn ProgressSink,
    events: Vec<StageEvent>,
}

impl<'a> Recorder<'a> {
    pub(crate) fn new(inner: &'a mut dyn ProgressSink) -> Self {
        Self {
            inner,
            events: Vec::new(),
        }
    }

    pub(crate) fn into_events(self) -> Vec<StageEvent> {
        self.events
    }
}

impl ProgressSink for Recorder<'_> {
    fn on_stage(&mut self, event: &StageEvent) {
        self.inner.on_stage(event);
        self.events.push(event.clone());
    }
}

/// Wall-clock timer for a single stage.
pub(crate) struct StageTimer {
    stage: Stage,
    started: Instant,
}

impl StageTimer {
    pub(crate) fn start(stage: Stage) -> Self {
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub(crate) fn finish(self, run_id: RunId, width: u32, height: u32, channels: u8) -> StageEvent {
        StageEvent {
            run_id,
            stage: self.stage,
            width,
            height,
            channels,
            elapsed: self.started.elapsed(),
            note: None,
        }
    }
}
