// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].
//!
//! Dropped frames and terminations the owner did not ask for are tagged
//! `DROPPED` and `ERROR` so they stand out in a scrolling log.

use std::io::Write;

use imxdisp_core::present::PresentPath;
use imxdisp_core::swap_chain::WaitOutcome;
use imxdisp_core::time::{HostTime, Timebase};
use imxdisp_core::trace::{
    AcquireEvent, BaselineRestoreEvent, FrameSummary, PhaseBeginEvent, PhaseEndEvent, PhaseKind,
    PresentEvent, TerminateEvent, TraceSink, WaitEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
    timebase: Timebase,
    quiet: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self::new(Box::new(std::io::stderr()), timebase)
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>, timebase: Timebase) -> Self {
        Self::with_writer(writer, timebase)
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self {
            writer,
            timebase,
            quiet: false,
        }
    }

    /// Skips the per-poll lines (pending acquires, timed-out waits, phases)
    /// and keeps presents, restores, summaries, and termination.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Consumes the sink and returns the writer.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn ticks_to_us(&self, ticks: u64) -> f64 {
        self.timebase.ticks_to_nanos(ticks) as f64 / 1000.0
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.ticks_to_us(t.ticks())
    }
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Acquire => "acquire",
        PhaseKind::Stage => "stage",
        PhaseKind::Scanout => "scanout",
        PhaseKind::Notify => "notify",
    }
}

fn outcome_name(outcome: WaitOutcome) -> &'static str {
    match outcome {
        WaitOutcome::NewFrame => "new-frame",
        WaitOutcome::TimedOut => "timeout",
        WaitOutcome::Terminate => "terminate",
    }
}

fn describe_path(path: &PresentPath) -> String {
    match path {
        PresentPath::Direct { address } => format!("direct addr={address:#010x}"),
        PresentPath::Staged { bytes } => format!("staged bytes={bytes}"),
        PresentPath::Dropped(reason) => format!("DROPPED ({reason})"),
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_acquire(&mut self, e: &AcquireEvent) {
        if self.quiet && !e.ready {
            return;
        }
        let state = if e.ready { "ready" } else { "pending" };
        let _ = match e.scanout_address {
            Some(address) => writeln!(
                self.writer,
                "[acquire] chain={} frame={} {state} addr={address:#010x} at {:.1}µs",
                e.chain.0,
                e.frame_index,
                self.host_us(e.timestamp),
            ),
            None => writeln!(
                self.writer,
                "[acquire] chain={} frame={} {state} at {:.1}µs",
                e.chain.0,
                e.frame_index,
                self.host_us(e.timestamp),
            ),
        };
    }

    fn on_wait(&mut self, e: &WaitEvent) {
        if self.quiet && e.outcome == WaitOutcome::TimedOut {
            return;
        }
        let waited = self.ticks_to_us(e.finished.saturating_duration_since(e.started).ticks());
        let _ = writeln!(
            self.writer,
            "[wait] chain={} frame={} {} after {waited:.1}µs",
            e.chain.0,
            e.frame_index,
            outcome_name(e.outcome),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        if self.quiet {
            return;
        }
        let _ = writeln!(
            self.writer,
            "[phase:begin] chain={} frame={} {} at {:.1}µs",
            e.chain.0,
            e.frame_index,
            phase_name(e.phase),
            self.host_us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        if self.quiet {
            return;
        }
        let _ = writeln!(
            self.writer,
            "[phase:end] chain={} frame={} {} at {:.1}µs",
            e.chain.0,
            e.frame_index,
            phase_name(e.phase),
            self.host_us(e.timestamp),
        );
    }

    fn on_present(&mut self, e: &PresentEvent) {
        let _ = writeln!(
            self.writer,
            "[present] chain={} frame={} {} at {:.1}µs",
            e.chain.0,
            e.frame_index,
            describe_path(&e.path),
            self.host_us(e.timestamp),
        );
    }

    fn on_baseline_restore(&mut self, e: &BaselineRestoreEvent) {
        let _ = writeln!(
            self.writer,
            "[restore] chain={} frame={} {:#010x} -> {:#010x} at {:.1}µs",
            e.chain.0,
            e.frame_index,
            e.from,
            e.to,
            self.host_us(e.timestamp),
        );
    }

    fn on_terminate(&mut self, e: &TerminateEvent) {
        let severity = if e.reason.is_requested() { "ok" } else { "ERROR" };
        let _ = writeln!(
            self.writer,
            "[terminate] chain={} {severity}: {} presented={} dropped={}",
            e.chain.0, e.reason, e.frames_presented, e.frames_dropped,
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let restored = if s.restored_baseline { " restored" } else { "" };
        let _ = writeln!(
            self.writer,
            "[summary] chain={} frame={} waits={} acquire={:.1}µs stage={:.1}µs \
             scanout={:.1}µs notify={:.1}µs {}{restored}",
            s.chain.0,
            s.frame_index,
            s.waits,
            self.ticks_to_us(s.acquire_ticks),
            self.ticks_to_us(s.stage_ticks),
            self.ticks_to_us(s.scanout_ticks),
            self.ticks_to_us(s.notify_ticks),
            describe_path(&s.path),
        );
    }
}
